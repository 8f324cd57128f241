/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! First step of an invocation.
//!
//! Checks that do not depend on evaluation run first, and a failing check rejects the transaction:
//! payments are positive and within the limit, the DApp exists, the declared fee covers the base fee
//! plus the surcharges known up front, the sender can pay the fee and the sender verifier (if any)
//! approves the transaction.
//!
//! The callable is then evaluated with the per-version complexity limit as budget. A completed
//! evaluation goes on to action execution and is charged the declared fee. A partial one is
//! persisted as step 0 of the invocation and charged the base fee plus the surcharges prepaid up
//! front, provided [BlockchainFeature::ContinuationTransaction] is activated; otherwise the
//! invocation fails for exceeding the complexity limit.

use crate::{
    blockchain::Blockchain,
    error::{FailureReason, TransitionError},
    fee::{minimal_fee, step_fee, FeeStep},
    params::BlockchainFeature,
    script::{EvaluationMode, EvaluationResult, Evaluator, Expr, Value},
    store::ContinuationState,
    transition::TransitionResult,
    types::{InvokeScriptTx, TransactionKind},
};

use super::phase::{self, Step, StepKind};

pub(crate) fn execute<B: Blockchain, E: Evaluator>(
    blockchain: &B,
    evaluator: &E,
    tx: &InvokeScriptTx,
) -> Result<TransitionResult, TransitionError> {
    if blockchain.transaction_info(&tx.id).is_some() {
        return Err(TransitionError::AlreadyInBlockchain);
    }

    let settings = blockchain.settings();
    let max_payments = settings.functionality.max_payments;
    if tx.payments.len() > max_payments {
        return Err(TransitionError::TooManyPayments { count: tx.payments.len(), max: max_payments });
    }
    if let Some(payment) = tx.payments.iter().find(|p| p.amount <= 0) {
        return Err(TransitionError::NonPositivePayment(payment.amount));
    }

    let account = blockchain
        .account_script(&tx.dapp)
        .ok_or(TransitionError::NoDAppScript)?;
    let sender_verifier = blockchain
        .account_script(&tx.sender)
        .and_then(|info| info.dapp.verifier);

    // surcharges known before evaluation
    let scripted_payments = tx
        .payments
        .iter()
        .filter_map(|p| p.asset.issued_id())
        .filter(|id| blockchain.asset_script(id).is_some())
        .count() as u32;
    let prepaid_invocations = scripted_payments + sender_verifier.is_some() as u32;
    let required = minimal_fee(&settings.fees, TransactionKind::InvokeScript, prepaid_invocations);
    if tx.fee < required {
        return Err(TransitionError::InsufficientFee { required, provided: tx.fee });
    }

    let budget = settings.max_complexity(account.dapp.version);
    if budget == 0 {
        return Err(TransitionError::NoComplexityBudget(account.dapp.version));
    }

    phase::pre_charge(blockchain, &tx.sender, tx.fee)?;

    let mut step = Step::new(tx, StepKind::First { prepaid_invocations });

    // sender authorization counts as a script run even without a verifier
    let verifier_complexity = match &sender_verifier {
        Some(verifier) => verify_sender(blockchain, evaluator, tx, verifier)?,
        None => 0,
    };
    step.count_run(verifier_complexity);

    tracing::debug!(
        invoke_id = ?tx.id,
        function = %tx.call.function,
        estimated_complexity = ?account.complexities_by_callable.get(&tx.call.function).copied(),
        budget,
        "evaluating callable"
    );
    let evaluation = evaluator.evaluate(
        EvaluationMode::FirstStep {
            dapp: &account.dapp,
            call: &tx.call,
            bindings: invocation_bindings(tx),
        },
        budget,
    )?;

    match evaluation {
        EvaluationResult::Completed { result, spent_complexity } => {
            step.count_run(spent_complexity);
            Ok(phase::complete(blockchain, evaluator, step, result))
        }
        EvaluationResult::Partial { expression, unused_complexity } => {
            step.count_run(budget.saturating_sub(unused_complexity));
            if !blockchain.is_feature_activated(BlockchainFeature::ContinuationTransaction) {
                return Ok(phase::fail(blockchain, step, FailureReason::ComplexityLimitExceeded));
            }
            let fee = step_fee(
                &settings.fees,
                TransactionKind::InvokeScript,
                FeeStep::FirstSuspended,
                prepaid_invocations,
            );
            let state = ContinuationState::InProgress { step: 0, expression, unused_complexity };
            Ok(phase::suspend(blockchain, step, fee, state))
        }
    }
}

/// Runs the verifier of the sender account. Returns the complexity it spent.
fn verify_sender<B: Blockchain, E: Evaluator>(
    blockchain: &B,
    evaluator: &E,
    tx: &InvokeScriptTx,
    verifier: &Expr,
) -> Result<u64, TransitionError> {
    let bindings = vec![
        ("tx.kind".to_string(), Value::Str("InvokeScript".to_string())),
        ("tx.id".to_string(), Value::Bytes(tx.id.to_vec())),
        ("tx.sender".to_string(), Value::Bytes(tx.sender.to_vec())),
        ("tx.recipient".to_string(), Value::Bytes(tx.dapp.to_vec())),
        ("tx.fee".to_string(), int_value(tx.fee)),
    ];
    let budget = blockchain.settings().max_asset_script_complexity;
    let evaluation =
        evaluator.evaluate(EvaluationMode::Verifier { script: verifier, bindings }, budget)?;

    let denial = match evaluation {
        EvaluationResult::Completed { result: Ok(Value::Bool(true)), spent_complexity } => {
            return Ok(spent_complexity)
        }
        EvaluationResult::Completed { result: Ok(_), .. } => "verifier returned false".to_string(),
        EvaluationResult::Completed { result: Err(error), .. } => error.to_string(),
        EvaluationResult::Partial { .. } => "verifier exceeds complexity limit".to_string(),
    };
    tracing::debug!(tx_id = ?tx.id, reason = %denial, "sender verifier denied invocation");
    Err(TransitionError::DeniedBySenderScript(denial))
}

/// Invocation context visible to the callable body.
fn invocation_bindings(tx: &InvokeScriptTx) -> Vec<(String, Value)> {
    let payments = tx
        .payments
        .iter()
        .map(|p| {
            let asset = p
                .asset
                .issued_id()
                .map_or(Value::Unit, |id| Value::Bytes(id.to_vec()));
            Value::List(vec![asset, Value::Int(p.amount)])
        })
        .collect();

    vec![
        ("i.caller".to_string(), Value::Bytes(tx.sender.to_vec())),
        ("i.transactionId".to_string(), Value::Bytes(tx.id.to_vec())),
        ("i.fee".to_string(), int_value(tx.fee)),
        ("i.payments".to_string(), Value::List(payments)),
    ]
}

fn int_value(amount: u64) -> Value {
    Value::Int(i64::try_from(amount).unwrap_or(i64::MAX))
}
