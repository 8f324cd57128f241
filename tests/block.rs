use continuation_runtime::{
    diff::{DiffError, VolumeUpdate},
    script::{Callable, Expr, Function},
    types::{Asset, FunctionCall, InvokeScriptTx, Transaction, TxStatus},
    Blockchain, ContinuationState, InvariantViolation, Runtime, TransitionError,
};

use crate::common::{
    TestData, CONTINUATION_FEE, DAPP, GENERATOR, INVOKE_FEE, RECIPIENT, SENDER, TIMESTAMP,
};

mod common;

fn in_progress_step(state: Option<ContinuationState>) -> u32 {
    match state {
        Some(ContinuationState::InProgress { step, .. }) => step,
        other => panic!("expected a continuation in progress, got {:?}", other),
    }
}

/// An invocation and its first continuation fit in one block. Rejected transactions do not
/// stop the block.
#[test]
fn test_block_with_invocation_and_continuation() {
    let mut bc = TestData::blockchain();
    let runtime = Runtime::new();

    let invoke = TestData::invoke("heavy", vec![], vec![], INVOKE_FEE);
    let continuation = TestData::continuation(invoke.id, 0);
    let underpaid = TestData::invoke("noop", vec![], vec![], INVOKE_FEE - 1);
    let txs = vec![
        Transaction::InvokeScript(invoke.clone()),
        Transaction::InvokeScript(underpaid.clone()),
        Transaction::Continuation(continuation.clone()),
    ];

    let block = runtime.transition_block(&bc, &txs).unwrap();
    assert_eq!(
        block.applied,
        vec![(invoke.id, TxStatus::InProgress), (continuation.id, TxStatus::InProgress)]
    );
    assert_eq!(block.rejected.len(), 1);
    assert_eq!(block.rejected[0].0, underpaid.id);
    assert!(matches!(block.rejected[0].1, TransitionError::InsufficientFee { .. }));

    let total_fee = INVOKE_FEE + CONTINUATION_FEE;
    assert_eq!(block.total_fee, total_fee);
    let diff = &block.diff;
    assert_eq!(diff.balance_change(&GENERATOR, &Asset::Native), total_fee as i64);
    assert_eq!(diff.balance_change(&SENDER, &Asset::Native), -(total_fee as i64));
    assert_eq!(diff.transactions[&continuation.id].invoke_id, Some(invoke.id));
    assert_eq!(diff.replacing_transactions[&invoke.id].continuations, vec![continuation.id]);
    assert!(!diff.transactions.contains_key(&underpaid.id));

    bc.commit(block.diff);
    assert_eq!(in_progress_step(bc.store.get(&invoke.id).unwrap()), 1);
    assert_eq!(bc.transaction_info(&invoke.id).unwrap().status, TxStatus::InProgress);

    let last = TestData::continuation(invoke.id, 1);
    let block = runtime
        .transition_block(&bc, &[Transaction::Continuation(last.clone())])
        .unwrap();
    assert_eq!(block.applied, vec![(last.id, TxStatus::Succeeded)]);
    assert!(block.rejected.is_empty());

    bc.commit(block.diff);
    assert_eq!(bc.store.get(&invoke.id).unwrap(), Some(ContinuationState::Finished));
    assert!(bc.data(&DAPP, "hash").is_some());
    for id in [invoke.id, continuation.id, last.id] {
        assert_eq!(bc.transaction_info(&id).unwrap().status, TxStatus::Succeeded);
    }
}

/// A transaction whose diff cannot be stacked is rejected, and the transactions before it keep
/// their effects
#[test]
fn test_diff_stacking_failure_keeps_block_diff() {
    let mut bc = TestData::blockchain();
    let asset = [5u8; 32];
    bc.issue_asset(asset, DAPP, i64::MAX, None);
    // a second holder, so that two burns of the full volume are both covered by balances
    bc.set_balance(RECIPIENT, Asset::Issued(asset), i64::MAX);

    let body = Expr::call(
        Function::List,
        vec![Expr::call(Function::Burn, vec![Expr::bytes(asset.to_vec()), Expr::int(i64::MAX)])],
    );
    for holder in [DAPP, RECIPIENT] {
        let mut dapp = TestData::dapp();
        dapp.callables.insert("burn_all".to_string(), Callable { params: vec![], body: body.clone() });
        bc.set_dapp(holder, dapp);
    }
    let burn_all = |dapp| {
        let call = FunctionCall { function: "burn_all".to_string(), args: vec![] };
        InvokeScriptTx::new(SENDER, dapp, call, vec![], INVOKE_FEE, TIMESTAMP)
    };
    let (first, second) = (burn_all(DAPP), burn_all(RECIPIENT));
    let txs = vec![
        Transaction::InvokeScript(first.clone()),
        Transaction::InvokeScript(second.clone()),
    ];

    let block = Runtime::new().transition_block(&bc, &txs).unwrap();
    assert_eq!(block.applied, vec![(first.id, TxStatus::Succeeded)]);
    assert_eq!(
        block.rejected,
        vec![(second.id, TransitionError::Diff(DiffError::VolumeOverflow(asset)))]
    );
    assert_eq!(block.total_fee, INVOKE_FEE);

    let diff = &block.diff;
    assert!(diff.transactions.contains_key(&first.id));
    assert!(!diff.transactions.contains_key(&second.id));
    assert_eq!(diff.updated_assets[&asset], VolumeUpdate::burn(i64::MAX));
    assert_eq!(diff.balance_change(&DAPP, &Asset::Issued(asset)), -i64::MAX);
    assert_eq!(diff.balance_change(&SENDER, &Asset::Native), -(INVOKE_FEE as i64));
    assert_eq!(diff.balance_change(&GENERATOR, &Asset::Native), INVOKE_FEE as i64);
}

/// An invariant violation aborts the block, discarding the transactions applied before it
#[test]
fn test_invariant_violation_aborts_block() {
    let mut bc = TestData::blockchain();
    let runtime = Runtime::new();

    let invoke = TestData::invoke("heavy", vec![], vec![], INVOKE_FEE);
    let block = runtime
        .transition_block(&bc, &[Transaction::InvokeScript(invoke.clone())])
        .unwrap();
    bc.commit(block.diff);

    let noop = TestData::invoke("noop", vec![], vec![], INVOKE_FEE);
    let txs = vec![
        Transaction::InvokeScript(noop),
        Transaction::Continuation(TestData::continuation(invoke.id, 5)),
    ];
    assert_eq!(
        runtime.transition_block(&bc, &txs),
        Err(TransitionError::Invariant(InvariantViolation::StepMismatch { stored: 0, actual: 5 }))
    );
}

/// Store reverts to earlier heights by rollback and by snapshot
#[test]
fn test_store_rollback_and_snapshot() {
    let mut bc = TestData::blockchain();
    let runtime = Runtime::new();

    let invoke = TestData::invoke("heavy", vec![], vec![], INVOKE_FEE);
    let block = runtime
        .transition_block(&bc, &[Transaction::InvokeScript(invoke.clone())])
        .unwrap();
    bc.commit(block.diff);
    let first_height = bc.store.height();
    let snapshot = bc.store.snapshot();

    for step in 0..2 {
        let tx = Transaction::Continuation(TestData::continuation(invoke.id, step));
        let block = runtime.transition_block(&bc, &[tx]).unwrap();
        bc.commit(block.diff);
    }
    assert_eq!(bc.store.get(&invoke.id).unwrap(), Some(ContinuationState::Finished));
    assert!(bc.store.pending().unwrap().is_empty());

    // revert the last block only
    let touched = bc.store.rollback_to(first_height + 1);
    assert_eq!(touched, vec![invoke.id]);
    assert_eq!(in_progress_step(bc.store.get(&invoke.id).unwrap()), 1);
    assert_eq!(bc.store.pending().unwrap(), vec![(invoke.id, 1)]);

    bc.store.restore(snapshot);
    assert_eq!(bc.store.height(), first_height);
    assert_eq!(in_progress_step(bc.store.get(&invoke.id).unwrap()), 0);
}
