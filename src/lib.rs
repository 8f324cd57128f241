/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Continuation Runtime is a **State Transition Function** for script invocations whose evaluation may
//! exceed the computation budget of a single block.
//!
//! ```text
//! f(BC, TX) -> D
//!
//! BC = Blockchain view (balances, scripts, assets, stored continuation states)
//! TX = Invocation, or a continuation transaction advancing a suspended invocation by one step
//! D  = Diff, an additive delta over the blockchain state
//! ```
//!
//! ### Example
//!
//! ```rust
//! // prepare a blockchain view (bc) and a transaction (tx), and call transition.
//! let result = continuation_runtime::Runtime::new().transition(&bc, &tx);
//! ```
//!
//! An invocation is evaluated by a budget-limited [script] evaluator. When the budget runs out, the
//! remainder of the expression is stored as the invocation's [continuation state](store), and
//! continuation transactions resume it in later blocks. Once the evaluation completes, the returned
//! actions are [executed](execution) and folded into a [diff]. Every step is charged a [fee].
//! Rejections and failures are described in [error].

pub mod blockchain;
pub use blockchain::{Blockchain, CompositeBlockchain};

pub mod diff;
pub use diff::Diff;

pub mod error;
pub use error::{FailureReason, InvariantViolation, TransitionError};

pub(crate) mod execution;

pub mod fee;

pub mod params;
pub use params::{BlockHeader, BlockchainFeature, BlockchainSettings};

pub mod script;

pub mod store;
pub use store::{ContinuationState, ContinuationStateStore};

pub mod transition;
pub use transition::{BlockTransitionResult, Runtime, TransitionResult};

pub mod types;
