/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Phases shared by the first step of an invocation and its continuation steps.
//!
//! - Pre-Charge: the fee payer must be able to cover the fee known before evaluation, otherwise
//!   the transaction is rejected.
//! - Suspend: the evaluation ran out of budget. The step is charged its fee and the remainder is
//!   stored as the continuation state of the invocation. No actions are applied.
//! - Complete: the evaluation finished. The returned actions are executed and the invocation
//!   becomes finished.
//! - Fail: the script failed, or its actions could not be applied. The step is charged its fee
//!   and the invocation becomes finished without any action applied.
//!
//! Every step produces a [Diff] holding the fee charge, the records of the affected transactions,
//! the new continuation state and the script counters of the step.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    blockchain::Blockchain,
    diff::Diff,
    error::{FailureReason, TransitionError},
    fee::{minimal_fee, step_fee, FeeStep},
    script::{actions_from_value, Evaluator, ScriptError, Value},
    store::ContinuationState,
    transition::TransitionResult,
    types::{
        Address, Asset, ContinuationTx, ErrorMessage, InvokeScriptResult, InvokeScriptTx,
        Transaction, TransactionInfo, TransactionKind, TxId, TxStatus,
    },
};

use super::actions;

/// Position of the applied transaction in its invocation.
pub(crate) enum StepKind<'a> {
    /// The invocation itself. `prepaid_invocations` script runs were covered by the declared fee
    /// before evaluation.
    First { prepaid_invocations: u32 },
    /// A continuation, with the current record of the invocation it advances.
    Continuation {
        tx: &'a ContinuationTx,
        invoke_info: TransactionInfo,
    },
}

/// One evaluation step of an invocation.
pub(crate) struct Step<'a> {
    pub invoke: &'a InvokeScriptTx,
    pub kind: StepKind<'a>,
    pub scripts_run: u32,
    pub scripts_complexity: u64,
}

impl<'a> Step<'a> {
    pub fn new(invoke: &'a InvokeScriptTx, kind: StepKind<'a>) -> Self {
        Self { invoke, kind, scripts_run: 0, scripts_complexity: 0 }
    }

    pub fn count_run(&mut self, complexity: u64) {
        self.scripts_run = self.scripts_run.saturating_add(1);
        self.scripts_complexity = self.scripts_complexity.saturating_add(complexity);
    }

    fn count_asset_runs(&mut self, runs: &actions::ScriptRuns) {
        self.scripts_run = self.scripts_run.saturating_add(runs.total());
        self.scripts_complexity = self.scripts_complexity.saturating_add(runs.complexity);
    }

    fn is_first(&self) -> bool {
        matches!(self.kind, StepKind::First { .. })
    }
}

/// Pre-Charge is a Phase in State Transition. The payer balance must cover `fee`.
pub(crate) fn pre_charge<B: Blockchain>(
    blockchain: &B,
    payer: &Address,
    fee: u64,
) -> Result<(), TransitionError> {
    let balance = blockchain.balance(payer, &Asset::Native);
    if (balance as i128) < fee as i128 {
        return Err(TransitionError::InsufficientBalance { balance, fee });
    }
    Ok(())
}

/// Stores `state` as the continuation state of the invocation.
pub(crate) fn suspend<B: Blockchain>(
    blockchain: &B,
    step: Step<'_>,
    fee: u64,
    state: ContinuationState,
) -> TransitionResult {
    let mut diff = charge(&step.invoke.sender, fee);
    let affected = BTreeSet::from([step.invoke.sender, step.invoke.dapp]);
    record(blockchain, &step, &mut diff, TxStatus::InProgress, fee, affected);

    if let ContinuationState::InProgress { step: index, unused_complexity, .. } = &state {
        tracing::debug!(
            invoke_id = ?step.invoke.id,
            step = index,
            unused_complexity,
            "invocation suspended"
        );
    }
    diff.continuation_states.insert(step.invoke.id, state);
    diff.scripts_run = step.scripts_run;
    diff.scripts_complexity = step.scripts_complexity;

    TransitionResult { diff, status: TxStatus::InProgress, fee }
}

/// Executes the actions of a completed callable and finishes the invocation.
pub(crate) fn complete<B: Blockchain, E: Evaluator>(
    blockchain: &B,
    evaluator: &E,
    mut step: Step<'_>,
    result: Result<Value, ScriptError>,
) -> TransitionResult {
    let actions = match result.and_then(actions_from_value) {
        Ok(actions) => actions,
        Err(error) => return fail(blockchain, step, error.into()),
    };

    let applied = match actions::apply(blockchain, evaluator, step.invoke, actions) {
        Ok(applied) => applied,
        Err(failure) => {
            step.count_asset_runs(&failure.runs);
            return fail(blockchain, step, failure.reason);
        }
    };
    step.count_asset_runs(&applied.runs);

    let fees = &blockchain.settings().fees;
    let prepaid_invocations = match step.kind {
        StepKind::First { prepaid_invocations } => Some(prepaid_invocations),
        StepKind::Continuation { .. } => None,
    };
    let fee = match prepaid_invocations {
        Some(prepaid_invocations) => {
            let declared_fee = step.invoke.fee;
            let extra_invocations = prepaid_invocations.saturating_add(applied.runs.actions);
            let required = minimal_fee(fees, TransactionKind::InvokeScript, extra_invocations);
            if declared_fee < required {
                let reason = FailureReason::InsufficientFee { required, provided: declared_fee };
                return fail(blockchain, step, reason);
            }
            step_fee(fees, TransactionKind::InvokeScript, FeeStep::First { declared_fee }, 0)
        }
        None => step_fee(
            fees,
            TransactionKind::Continuation,
            FeeStep::Final,
            applied.runs.actions,
        ),
    };

    let mut diff = match charge(&step.invoke.sender, fee).combine(applied.diff) {
        Ok(diff) => diff,
        Err(error) => return fail(blockchain, step, error.into()),
    };
    if let Err(reason) = actions::ensure_non_negative(blockchain, &diff) {
        return fail(blockchain, step, reason);
    }

    let mut affected = BTreeSet::from([step.invoke.sender, step.invoke.dapp]);
    affected.extend(applied.result.transfers.iter().map(|t| t.recipient));
    record(blockchain, &step, &mut diff, TxStatus::Succeeded, fee, affected);

    diff.continuation_states.insert(step.invoke.id, ContinuationState::Finished);
    diff.script_results.insert(step.invoke.id, applied.result);
    diff.scripts_run = step.scripts_run;
    diff.scripts_complexity = step.scripts_complexity;

    tracing::debug!(
        invoke_id = ?step.invoke.id,
        fee,
        scripts_run = step.scripts_run,
        "invocation succeeded"
    );
    TransitionResult { diff, status: TxStatus::Succeeded, fee }
}

/// Fail is a Phase that finishes the invocation without applying any action. The step is
/// still charged.
pub(crate) fn fail<B: Blockchain>(
    blockchain: &B,
    step: Step<'_>,
    reason: FailureReason,
) -> TransitionResult {
    let fee = if step.is_first() {
        step.invoke.fee
    } else {
        step_fee(
            &blockchain.settings().fees,
            TransactionKind::Continuation,
            FeeStep::Intermediate,
            0,
        )
    };

    let mut diff = charge(&step.invoke.sender, fee);
    let affected = BTreeSet::from([step.invoke.sender, step.invoke.dapp]);
    record(blockchain, &step, &mut diff, TxStatus::Failed, fee, affected);

    let error = ErrorMessage { code: reason.code(), text: reason.to_string() };
    diff.continuation_states.insert(step.invoke.id, ContinuationState::Finished);
    diff.script_results.insert(step.invoke.id, InvokeScriptResult::failed(error));
    diff.scripts_run = step.scripts_run;
    diff.scripts_complexity = step.scripts_complexity;

    tracing::debug!(invoke_id = ?step.invoke.id, fee, reason = %reason, "invocation failed");
    TransitionResult { diff, status: TxStatus::Failed, fee }
}

fn charge(payer: &Address, fee: u64) -> Diff {
    // fees above i64::MAX never pass pre-charge
    let amount = i64::try_from(fee).unwrap_or(i64::MAX);
    Diff::balance(*payer, Asset::Native, -amount)
}

/// Writes the record of the applied transaction, and rewrites the records of the invocation
/// and its earlier continuations.
///
/// `status` is the status of the invocation after this step. A continuation that leaves the
/// invocation in progress is itself recorded as succeeded. Once the invocation is finished, the
/// invocation and all of its continuations carry the final status.
fn record<B: Blockchain>(
    blockchain: &B,
    step: &Step<'_>,
    diff: &mut Diff,
    status: TxStatus,
    fee: u64,
    affected: BTreeSet<Address>,
) {
    let height = blockchain.height();
    let invoke = step.invoke;

    match &step.kind {
        StepKind::First { .. } => {
            let info = TransactionInfo {
                tx: Transaction::InvokeScript(invoke.clone()),
                height,
                status,
                fee,
                affected,
                invoke_id: None,
                continuations: Vec::new(),
            };
            diff.transactions.insert(invoke.id, info);
        }
        StepKind::Continuation { tx, invoke_info } => {
            let finished = status != TxStatus::InProgress;
            let mut replacing: BTreeMap<TxId, TransactionInfo> = BTreeMap::new();
            let mut invoke_info = invoke_info.clone();

            if finished {
                for id in &invoke_info.continuations {
                    if let Some(mut info) = blockchain.transaction_info(id) {
                        info.status = status;
                        replacing.insert(*id, info);
                    }
                }
                invoke_info.status = status;
                invoke_info.affected.extend(affected.iter().copied());
            }
            invoke_info.continuations.push(tx.id);
            replacing.insert(invoke.id, invoke_info);

            let info = TransactionInfo {
                tx: Transaction::Continuation((*tx).clone()),
                height,
                status: if finished { status } else { TxStatus::Succeeded },
                fee,
                affected,
                invoke_id: Some(invoke.id),
                continuations: Vec::new(),
            };
            diff.transactions.insert(tx.id, info);
            diff.replacing_transactions.extend(replacing);
        }
    }
}
