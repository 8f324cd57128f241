/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! error defines sets of error definitions in entire life time of state transitions.
//!
//! There are three classes:
//! - [TransitionError]: local rejection of a single transaction. No diff is produced and block
//!   processing continues with the remaining transactions. It also wraps [InvariantViolation],
//!   which must never happen under correct block validation and aborts block processing.
//! - [FailureReason]: script execution failure. The step still charges its fee but yields no
//!   positive actions; the invocation becomes failed.
//! - Budget exhaustion is not an error at all but an expected outcome, see [crate::store::ContinuationState].

use crate::{
    diff::DiffError,
    script::{EvaluationError, ScriptError, StdLibVersion},
    types::{Address, Asset, AssetId, InvocationId},
};

/// Descriptive error definitions of a rejected transaction.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// A transaction with the same id was applied before.
    #[error("transaction is already in the blockchain")]
    AlreadyInBlockchain,

    /// Invoked account carries no DApp script.
    #[error("account has no DApp script")]
    NoDAppScript,

    /// No complexity limit is configured for the script version, so no step could advance.
    #[error("no complexity budget configured for {0:?}")]
    NoComplexityBudget(StdLibVersion),

    /// Callable missing or called with wrong arguments.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("payment amount must be positive, got {0}")]
    NonPositivePayment(i64),

    #[error("{count} payments attached, at most {max} allowed")]
    TooManyPayments { count: usize, max: usize },

    /// Declared fee does not cover the fee known before evaluation.
    #[error("fee {provided} is insufficient, required {required}")]
    InsufficientFee { required: u64, provided: u64 },

    #[error("sender balance {balance} cannot cover fee {fee}")]
    InsufficientBalance { balance: i64, fee: u64 },

    /// Verifier of the sender account returned false or failed.
    #[error("transaction is not allowed by account script: {0}")]
    DeniedBySenderScript(String),

    /// Continuation references an invocation that was never applied.
    #[error("referenced invocation is unknown")]
    UnknownInvocation,

    /// Continuation references a transaction that is not an invocation.
    #[error("referenced transaction is not an invocation")]
    NotAnInvocation,

    /// Continuation references an invocation without stored continuation state.
    #[error("invocation has no continuation in progress")]
    NoContinuationState,

    /// Diff of the transaction cannot be stacked on the diff of the block.
    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl TransitionError {
    /// Invariant violations indicate a broken block, not a bad transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransitionError::Invariant(_))
    }
}

/// Consensus invariant breaches.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("invocation {0:?} is already finished")]
    AlreadyFinished(InvocationId),

    #[error("continuation step mismatch: stored {stored}, transaction {actual}")]
    StepMismatch { stored: u32, actual: u32 },
}

pub const SCRIPT_FAILURE_CODE: u32 = 1;
pub const INSUFFICIENT_FEE_CODE: u32 = 2;
pub const ASSET_SCRIPT_FAILURE_CODE: u32 = 3;
pub const INVALID_STATE_CODE: u32 = 4;

/// Reasons a script execution step fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    /// Raised by the DApp callable itself.
    #[error("{0}")]
    Script(#[from] ScriptError),

    #[error("complexity limit exceeded")]
    ComplexityLimitExceeded,

    #[error("asset script of {asset:?} rejected the action: {message}")]
    AssetScriptRejected { asset: AssetId, message: String },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("balance overflow of {asset:?} for account {address:?}")]
    BalanceOverflow { address: Address, asset: Asset },

    #[error("negative {asset:?} balance {balance} for account {address:?}")]
    NegativeBalance {
        address: Address,
        asset: Asset,
        balance: i64,
    },

    #[error("volume overflow of asset {0:?}")]
    VolumeOverflow(AssetId),

    /// Fee does not cover the script invocations triggered by the actions.
    #[error("fee {provided} is insufficient, required {required}")]
    InsufficientFee { required: u64, provided: u64 },
}

impl FailureReason {
    pub fn code(&self) -> u32 {
        match self {
            FailureReason::Script(_) | FailureReason::ComplexityLimitExceeded => SCRIPT_FAILURE_CODE,
            FailureReason::InsufficientFee { .. } => INSUFFICIENT_FEE_CODE,
            FailureReason::AssetScriptRejected { .. } => ASSET_SCRIPT_FAILURE_CODE,
            FailureReason::InvalidAction(_)
            | FailureReason::BalanceOverflow { .. }
            | FailureReason::NegativeBalance { .. }
            | FailureReason::VolumeOverflow(_) => INVALID_STATE_CODE,
        }
    }
}

impl From<DiffError> for FailureReason {
    fn from(error: DiffError) -> Self {
        match error {
            DiffError::BalanceOverflow { address, asset } => {
                FailureReason::BalanceOverflow { address, asset }
            }
            DiffError::VolumeOverflow(asset) => FailureReason::VolumeOverflow(asset),
        }
    }
}
