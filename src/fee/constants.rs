/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Fee constants, in the smallest unit of the native asset. They are the defaults of
//! [FeeSettings](crate::params::FeeSettings).
//!
//! |Name                   | Constant              | Value     |
//! |:---                   |:---                   |:---       |
//! |Fee unit               | [FEE_UNIT]            | 100_000   |
//! |Invocation base fee    | [INVOKE_SCRIPT_FEE]   | 5 units   |
//! |Continuation base fee  | [CONTINUATION_FEE]    | 5 units   |
//! |Script run surcharge   | [SCRIPT_EXTRA_FEE]    | 4 units   |

pub const FEE_UNIT: u64 = 100_000;

pub const INVOKE_SCRIPT_FEE: u64 = 5 * FEE_UNIT;

pub const CONTINUATION_FEE: u64 = 5 * FEE_UNIT;

/// Charged once for the DApp callable itself and once more per extra script run.
pub const SCRIPT_EXTRA_FEE: u64 = 4 * FEE_UNIT;
