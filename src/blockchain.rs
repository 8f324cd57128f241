/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Read-only view of the blockchain consumed by the state transition function.
//!
//! [Blockchain] is implemented by the node's storage layer. [CompositeBlockchain] stacks a [Diff]
//! on top of another view, so that a transaction in a block observes the effects of every
//! transaction applied before it in the same block.
//!
//! In a read, the diff is accessed first. If the data is not found there, the base view is accessed.

use std::collections::BTreeMap;

use crate::{
    diff::{Diff, DiffError},
    params::{BlockHeader, BlockchainFeature, BlockchainSettings},
    script::{DApp, DataValue, Expr},
    store::ContinuationState,
    types::{Address, Asset, AssetId, InvocationId, TransactionInfo, TxId},
};

/// Script deployed on an account, with the estimated complexity of each callable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountScriptInfo {
    pub dapp: DApp,
    pub complexities_by_callable: BTreeMap<String, u64>,
}

/// Script attached to an issued asset. It approves every action involving the asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetScriptInfo {
    pub script: Expr,
    pub complexity: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetDescription {
    pub issuer: Address,
    pub name: String,
    /// Total amount in circulation.
    pub volume: i64,
    pub reissuable: bool,
}

/// Lookups the runtime performs against the state a transaction is applied to.
pub trait Blockchain {
    /// Height of the block being applied.
    fn height(&self) -> u32;

    fn block_header(&self) -> BlockHeader;

    fn settings(&self) -> &BlockchainSettings;

    fn is_feature_activated(&self, feature: BlockchainFeature) -> bool;

    fn continuation_state(&self, invoke_id: &InvocationId) -> Option<ContinuationState>;

    fn transaction_info(&self, id: &TxId) -> Option<TransactionInfo>;

    fn account_script(&self, address: &Address) -> Option<AccountScriptInfo>;

    fn account_data(&self, address: &Address, key: &str) -> Option<DataValue>;

    fn asset_script(&self, asset: &AssetId) -> Option<AssetScriptInfo>;

    fn asset_description(&self, asset: &AssetId) -> Option<AssetDescription>;

    fn balance(&self, address: &Address, asset: &Asset) -> i64;
}

/// A [Blockchain] view with a [Diff] applied on top of it.
pub struct CompositeBlockchain<'a, B: Blockchain> {
    base: &'a B,
    diff: Diff,
}

impl<'a, B: Blockchain> CompositeBlockchain<'a, B> {
    pub fn new(base: &'a B, diff: Diff) -> Self {
        Self { base, diff }
    }

    pub fn diff(&self) -> &Diff {
        &self.diff
    }

    pub fn into_diff(self) -> Diff {
        self.diff
    }

    /// Stacks `diff` after the diff already held by this view. On error the held diff is left
    /// unchanged.
    pub fn apply(&mut self, diff: Diff) -> Result<(), DiffError> {
        self.diff = self.diff.clone().combine(diff)?;
        Ok(())
    }
}

impl<'a, B: Blockchain> Blockchain for CompositeBlockchain<'a, B> {
    fn height(&self) -> u32 {
        self.base.height()
    }

    fn block_header(&self) -> BlockHeader {
        self.base.block_header()
    }

    fn settings(&self) -> &BlockchainSettings {
        self.base.settings()
    }

    fn is_feature_activated(&self, feature: BlockchainFeature) -> bool {
        self.base.is_feature_activated(feature)
    }

    fn continuation_state(&self, invoke_id: &InvocationId) -> Option<ContinuationState> {
        match self.diff.continuation_states.get(invoke_id) {
            Some(state) => Some(state.clone()),
            None => self.base.continuation_state(invoke_id),
        }
    }

    fn transaction_info(&self, id: &TxId) -> Option<TransactionInfo> {
        self.diff
            .replacing_transactions
            .get(id)
            .or_else(|| self.diff.transactions.get(id))
            .cloned()
            .or_else(|| self.base.transaction_info(id))
    }

    fn account_script(&self, address: &Address) -> Option<AccountScriptInfo> {
        self.base.account_script(address)
    }

    fn account_data(&self, address: &Address, key: &str) -> Option<DataValue> {
        match self.diff.account_data.get(address).and_then(|entries| entries.get(key)) {
            Some(value) => Some(value.clone()),
            None => self.base.account_data(address, key),
        }
    }

    fn asset_script(&self, asset: &AssetId) -> Option<AssetScriptInfo> {
        self.base.asset_script(asset)
    }

    fn asset_description(&self, asset: &AssetId) -> Option<AssetDescription> {
        let mut description = self.base.asset_description(asset)?;
        if let Some(update) = self.diff.updated_assets.get(asset) {
            let volume = description.volume as i128 + update.net_change();
            description.volume = volume.clamp(0, i64::MAX as i128) as i64;
            if let Some(reissuable) = update.reissuable() {
                description.reissuable = description.reissuable && reissuable;
            }
        }
        Some(description)
    }

    fn balance(&self, address: &Address, asset: &Asset) -> i64 {
        self.base
            .balance(address, asset)
            .saturating_add(self.diff.balance_change(address, asset))
    }
}
