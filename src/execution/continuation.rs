/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Continuation steps of an invocation.
//!
//! A continuation transaction references an invocation and the step index stored with its
//! continuation state. The stored remainder is evaluated again with the per-version complexity
//! limit plus the complexity left unused by the previous step. Each step is charged the base fee
//! of a continuation, paid by the sender of the invocation; the step that completes the
//! invocation also pays the surcharges of the asset scripts run by its actions.

use crate::{
    blockchain::Blockchain,
    error::{InvariantViolation, TransitionError},
    fee::{step_fee, FeeStep},
    script::{EvaluationMode, EvaluationResult, Evaluator},
    store::ContinuationState,
    transition::TransitionResult,
    types::{ContinuationTx, Transaction, TransactionKind},
};

use super::phase::{self, Step, StepKind};

pub(crate) fn execute<B: Blockchain, E: Evaluator>(
    blockchain: &B,
    evaluator: &E,
    tx: &ContinuationTx,
) -> Result<TransitionResult, TransitionError> {
    if blockchain.transaction_info(&tx.id).is_some() {
        return Err(TransitionError::AlreadyInBlockchain);
    }

    let invoke_info = blockchain
        .transaction_info(&tx.invoke_id)
        .ok_or(TransitionError::UnknownInvocation)?;
    let invoke = match &invoke_info.tx {
        Transaction::InvokeScript(invoke) => invoke.clone(),
        Transaction::Continuation(_) => return Err(TransitionError::NotAnInvocation),
    };

    let (expression, unused_complexity) = match blockchain.continuation_state(&tx.invoke_id) {
        None => return Err(TransitionError::NoContinuationState),
        Some(ContinuationState::Finished) => {
            tracing::warn!(invoke_id = ?tx.invoke_id, "continuation of a finished invocation");
            return Err(InvariantViolation::AlreadyFinished(tx.invoke_id).into());
        }
        Some(ContinuationState::InProgress { step, expression, unused_complexity }) => {
            if step != tx.step {
                tracing::warn!(
                    invoke_id = ?tx.invoke_id,
                    stored = step,
                    actual = tx.step,
                    "continuation step mismatch"
                );
                return Err(InvariantViolation::StepMismatch { stored: step, actual: tx.step }.into());
            }
            (expression, unused_complexity)
        }
    };

    let account = blockchain
        .account_script(&invoke.dapp)
        .ok_or(TransitionError::NoDAppScript)?;

    let settings = blockchain.settings();
    // unspent complexity of the previous step is carried over in full
    let budget = settings
        .max_complexity(account.dapp.version)
        .saturating_add(unused_complexity);
    if budget == 0 {
        return Err(TransitionError::NoComplexityBudget(account.dapp.version));
    }

    let base_fee = step_fee(&settings.fees, TransactionKind::Continuation, FeeStep::Intermediate, 0);
    if tx.fee < base_fee {
        return Err(TransitionError::InsufficientFee { required: base_fee, provided: tx.fee });
    }
    phase::pre_charge(blockchain, &invoke.sender, base_fee)?;

    let evaluation =
        evaluator.evaluate(EvaluationMode::Resume { expression: &expression }, budget)?;

    let mut step = Step::new(&invoke, StepKind::Continuation { tx, invoke_info });
    match evaluation {
        EvaluationResult::Completed { result, spent_complexity } => {
            step.count_run(spent_complexity);
            Ok(phase::complete(blockchain, evaluator, step, result))
        }
        EvaluationResult::Partial { expression, unused_complexity } => {
            step.count_run(budget.saturating_sub(unused_complexity));
            let state = ContinuationState::InProgress {
                step: tx.step.saturating_add(1),
                expression,
                unused_complexity,
            };
            Ok(phase::suspend(blockchain, step, base_fee, state))
        }
    }
}
