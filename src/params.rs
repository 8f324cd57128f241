/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Blockchain-wide settings and block data that are supplied to the state transition function
//! through [Blockchain](crate::blockchain::Blockchain).

use std::collections::BTreeMap;

use crate::{
    fee::constants::{CONTINUATION_FEE, INVOKE_SCRIPT_FEE, SCRIPT_EXTRA_FEE},
    script::StdLibVersion,
    types::Address,
};

/// Protocol features that are switched on at some height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockchainFeature {
    /// Invocations exceeding the per-step complexity limit are suspended and completed by
    /// continuation transactions instead of failing.
    ContinuationTransaction,
}

/// Header of the block being applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Account credited with the fees of the block.
    pub generator: Address,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockchainSettings {
    pub fees: FeeSettings,
    pub functionality: FunctionalitySettings,
    /// Per-step complexity limit of a DApp callable, by library version.
    pub max_complexity_by_version: BTreeMap<StdLibVersion, u64>,
    /// Complexity limit of a single asset script or account verifier run.
    pub max_asset_script_complexity: u64,
}

impl BlockchainSettings {
    /// Per-step budget of a callable written against `version`. Zero for unsupported versions.
    pub fn max_complexity(&self, version: StdLibVersion) -> u64 {
        self.max_complexity_by_version
            .get(&version)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for BlockchainSettings {
    fn default() -> Self {
        Self {
            fees: FeeSettings::default(),
            functionality: FunctionalitySettings::default(),
            max_complexity_by_version: BTreeMap::from([
                (StdLibVersion::V3, 4_000),
                (StdLibVersion::V4, 4_000),
                (StdLibVersion::V5, 10_000),
            ]),
            max_asset_script_complexity: 4_000,
        }
    }
}

/// Fee constants, in the smallest unit of the native asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeSettings {
    pub invoke_script_fee: u64,
    pub continuation_fee: u64,
    /// Surcharge per script run.
    pub script_extra_fee: u64,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            invoke_script_fee: INVOKE_SCRIPT_FEE,
            continuation_fee: CONTINUATION_FEE,
            script_extra_fee: SCRIPT_EXTRA_FEE,
        }
    }
}

/// Limits on the payments and actions of a single invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionalitySettings {
    pub max_payments: usize,
    pub max_transfers: usize,
    pub max_data_entries: usize,
    /// In bytes.
    pub max_key_size: usize,
}

impl Default for FunctionalitySettings {
    fn default() -> Self {
        Self {
            max_payments: 2,
            max_transfers: 10,
            max_data_entries: 100,
            max_key_size: 400,
        }
    }
}
