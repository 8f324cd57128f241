/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Step fee calculation.
//!
//! The base fee of a step is the fee of its transaction type plus one [script surcharge](FeeSettings::script_extra_fee)
//! for the callable. Every extra script run (sender verifier, asset script of a payment or of an action)
//! adds one more surcharge.
//!
//! Which fee a step is charged depends on its position in the invocation:
//! - a first step that completes is charged the fee declared by the invocation,
//! - a first step that suspends is charged the base fee plus the surcharges of the scripts run up
//!   front (sender verifier, asset scripts of the payments),
//! - an intermediate continuation step is charged the base fee only,
//! - the completing continuation step is charged the base fee plus the surcharges of the asset scripts
//!   run by the executed actions. Surcharges for payments and the sender verifier were paid up front
//!   by the invocation.

pub mod constants;

use crate::{params::FeeSettings, types::TransactionKind};

/// Position of a step in an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeeStep {
    First { declared_fee: u64 },
    FirstSuspended,
    Intermediate,
    Final,
}

/// Fee of a transaction of `kind` triggering `extra_invocations` script runs besides the callable.
pub fn minimal_fee(settings: &FeeSettings, kind: TransactionKind, extra_invocations: u32) -> u64 {
    let type_fee = match kind {
        TransactionKind::InvokeScript => settings.invoke_script_fee,
        TransactionKind::Continuation => settings.continuation_fee,
    };
    let surcharges = settings
        .script_extra_fee
        .saturating_mul(1 + extra_invocations as u64);
    type_fee.saturating_add(surcharges)
}

/// Fee charged for one step of an invocation.
pub fn step_fee(
    settings: &FeeSettings,
    kind: TransactionKind,
    step: FeeStep,
    extra_invocations: u32,
) -> u64 {
    match step {
        FeeStep::First { declared_fee } => declared_fee,
        FeeStep::Intermediate => minimal_fee(settings, kind, 0),
        FeeStep::FirstSuspended | FeeStep::Final => minimal_fee(settings, kind, extra_invocations),
    }
}
