/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! transition defines the formulation of state transition.
//!
//! ```text
//! f(BC, TX) -> D
//!
//! BC = Blockchain view the transaction is applied to
//! TX = Invocation or continuation transaction
//! D  = Diff to merge into BC
//! ```

use crate::{
    blockchain::{Blockchain, CompositeBlockchain},
    diff::Diff,
    error::TransitionError,
    execution::{continuation, invoke},
    script::{Evaluator, ScriptEvaluator},
    types::{Asset, Transaction, TxId, TxStatus},
};

/// Runtime defines the state transition function for script invocations.
#[derive(Clone, Debug, Default)]
pub struct Runtime<E: Evaluator = ScriptEvaluator> {
    evaluator: E,
}

impl Runtime<ScriptEvaluator> {
    /// Instantiate Runtime with the reference evaluator.
    pub fn new() -> Self {
        Self { evaluator: ScriptEvaluator }
    }
}

impl<E: Evaluator> Runtime<E> {
    pub fn with_evaluator(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// transition applies a single transaction on top of `blockchain`.
    ///
    /// An `Err` is a rejection: the transaction must not be included, and no state changes.
    /// A failed script is not an `Err`; it yields a diff charging the fee with status [TxStatus::Failed].
    pub fn transition<B: Blockchain>(
        &self,
        blockchain: &B,
        tx: &Transaction,
    ) -> Result<TransitionResult, TransitionError> {
        let ret = match tx {
            Transaction::InvokeScript(tx) => invoke::execute(blockchain, &self.evaluator, tx),
            Transaction::Continuation(tx) => continuation::execute(blockchain, &self.evaluator, tx),
        };
        if let Err(error) = &ret {
            tracing::debug!(tx_id = ?tx.id(), %error, "transaction rejected");
        }
        ret
    }

    /// transition_block applies the transactions of a block in order. Each transaction observes
    /// the effects of the transactions before it. Rejected transactions are skipped. An
    /// invariant violation aborts the whole block.
    ///
    /// The fees charged are credited to the block generator.
    pub fn transition_block<B: Blockchain>(
        &self,
        blockchain: &B,
        txs: &[Transaction],
    ) -> Result<BlockTransitionResult, TransitionError> {
        let mut composite = CompositeBlockchain::new(blockchain, Diff::empty());
        let mut applied = Vec::new();
        let mut rejected = Vec::new();
        let mut total_fee: u64 = 0;

        for tx in txs {
            let result = match self.transition(&composite, tx) {
                Ok(result) => result,
                Err(error) if error.is_fatal() => {
                    tracing::warn!(tx_id = ?tx.id(), %error, "block aborted");
                    return Err(error);
                }
                Err(error) => {
                    rejected.push((tx.id(), error));
                    continue;
                }
            };
            if let Err(error) = composite.apply(result.diff) {
                rejected.push((tx.id(), error.into()));
                continue;
            }
            total_fee = total_fee.saturating_add(result.fee);
            applied.push((tx.id(), result.status));
        }

        let generator = blockchain.block_header().generator;
        let reward = i64::try_from(total_fee).unwrap_or(i64::MAX);
        composite.apply(Diff::balance(generator, Asset::Native, reward))?;

        tracing::debug!(
            height = blockchain.height(),
            applied = applied.len(),
            rejected = rejected.len(),
            total_fee,
            "block applied"
        );
        Ok(BlockTransitionResult { diff: composite.into_diff(), applied, rejected, total_fee })
    }
}

/// Result of applying a single transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionResult {
    pub diff: Diff,
    /// Status of the invocation after this step.
    pub status: TxStatus,
    /// Fee charged for the step.
    pub fee: u64,
}

/// Result of applying a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTransitionResult {
    /// Cumulative diff of the block, generator reward included.
    pub diff: Diff,
    /// Applied transactions in block order, with the status of their invocation.
    pub applied: Vec<(TxId, TxStatus)>,
    pub rejected: Vec<(TxId, TransitionError)>,
    pub total_fee: u64,
}
