/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implementation of the steps of an invocation.
//!
//! An [invocation](invoke) evaluates its callable within one step's budget. If it runs out of budget, the
//! remainder is persisted and later [continuation](continuation) transactions resume it, one step each.
//! Both go through the common [phases](phase): Pre-Charge, then evaluation, then either Suspend, Complete
//! or Fail. Completing executes the [actions] returned by the callable.

pub(crate) mod actions;

pub(crate) mod continuation;

pub(crate) mod invoke;

pub(crate) mod phase;
