/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Additive delta over blockchain state.
//!
//! Every step of an invocation produces a [Diff], and the diffs of a block are folded with
//! [Diff::combine]. A diff is never valid standalone: it is always relative to a base snapshot.
//!
//! Merge rules:
//! - balances: summed per (address, asset), overflow is an error,
//! - data entries: last write wins per (address, key),
//! - asset volumes: one-sided reissues or burns are summed, and a reissue merged with a burn
//!   becomes one signed net change,
//! - counters: summed,
//! - transaction, continuation and result maps: last write wins per key.
//!
//! `combine` is associative and the empty diff is its identity.

use std::collections::BTreeMap;

use crate::{
    script::DataValue,
    store::ContinuationState,
    types::{Address, Asset, AssetId, InvocationId, InvokeScriptResult, TransactionInfo, TxId},
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("balance overflow of {asset:?} for account {address:?}")]
    BalanceOverflow { address: Address, asset: Asset },
    #[error("volume overflow of asset {0:?}")]
    VolumeOverflow(AssetId),
}

/// Balance deltas of one account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Portfolio {
    pub balance: i64,
    pub assets: BTreeMap<AssetId, i64>,
}

impl Portfolio {
    pub fn of(asset: Asset, amount: i64) -> Self {
        let mut portfolio = Portfolio::default();
        match asset {
            Asset::Native => portfolio.balance = amount,
            Asset::Issued(id) => {
                portfolio.assets.insert(id, amount);
            }
        }
        portfolio
    }

    pub fn get(&self, asset: &Asset) -> i64 {
        match asset {
            Asset::Native => self.balance,
            Asset::Issued(id) => self.assets.get(id).copied().unwrap_or(0),
        }
    }

    /// Iterates the (asset, delta) pairs held by this portfolio.
    pub fn entries(&self) -> impl Iterator<Item = (Asset, i64)> + '_ {
        std::iter::once((Asset::Native, self.balance))
            .chain(self.assets.iter().map(|(id, v)| (Asset::Issued(*id), *v)))
    }

    fn combine(mut self, other: Portfolio) -> Result<Portfolio, Asset> {
        self.balance = self
            .balance
            .checked_add(other.balance)
            .ok_or(Asset::Native)?;
        for (id, amount) in other.assets {
            let entry = self.assets.entry(id).or_insert(0);
            *entry = entry.checked_add(amount).ok_or(Asset::Issued(id))?;
        }
        Ok(self)
    }
}

/// Change of an asset's total volume.
///
/// Updates in one direction stay one-sided. Once a diff holds both a reissue and a burn of an
/// asset, they collapse into one signed [Net](VolumeUpdate::Net) change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeUpdate {
    Reissue { amount: i64, reissuable: bool },
    Burn { amount: i64 },
    Net { change: i64, reissuable: bool },
}

impl VolumeUpdate {
    pub fn reissue(amount: i64, reissuable: bool) -> Self {
        VolumeUpdate::Reissue { amount, reissuable }
    }

    pub fn burn(amount: i64) -> Self {
        VolumeUpdate::Burn { amount }
    }

    /// Signed net change of the asset volume.
    pub fn net_change(&self) -> i128 {
        match *self {
            VolumeUpdate::Reissue { amount, .. } => amount as i128,
            VolumeUpdate::Burn { amount } => -(amount as i128),
            VolumeUpdate::Net { change, .. } => change as i128,
        }
    }

    /// Reissuable flag to apply, if this update carries a reissue.
    pub fn reissuable(&self) -> Option<bool> {
        match *self {
            VolumeUpdate::Reissue { reissuable, .. } | VolumeUpdate::Net { reissuable, .. } => {
                Some(reissuable)
            }
            VolumeUpdate::Burn { .. } => None,
        }
    }

    fn combine(self, other: VolumeUpdate) -> Option<VolumeUpdate> {
        match (self, other) {
            (
                VolumeUpdate::Reissue { amount: a, reissuable: r },
                VolumeUpdate::Reissue { amount: b, reissuable: s },
            ) => Some(VolumeUpdate::Reissue { amount: a.checked_add(b)?, reissuable: r && s }),
            (VolumeUpdate::Burn { amount: a }, VolumeUpdate::Burn { amount: b }) => {
                Some(VolumeUpdate::Burn { amount: a.checked_add(b)? })
            }
            (a, b) => {
                let change = i64::try_from(a.net_change() + b.net_change()).ok()?;
                // a mixed pair always carries at least one reissue
                let reissuable = a.reissuable().unwrap_or(true) && b.reissuable().unwrap_or(true);
                Some(VolumeUpdate::Net { change, reissuable })
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff {
    pub portfolios: BTreeMap<Address, Portfolio>,
    pub account_data: BTreeMap<Address, BTreeMap<String, DataValue>>,
    pub updated_assets: BTreeMap<AssetId, VolumeUpdate>,
    /// Transactions applied by this diff.
    pub transactions: BTreeMap<TxId, TransactionInfo>,
    /// Rewritten records of transactions applied earlier.
    pub replacing_transactions: BTreeMap<TxId, TransactionInfo>,
    pub continuation_states: BTreeMap<InvocationId, ContinuationState>,
    pub script_results: BTreeMap<InvocationId, InvokeScriptResult>,
    pub scripts_run: u32,
    pub scripts_complexity: u64,
}

impl Diff {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn balance(address: Address, asset: Asset, delta: i64) -> Self {
        let mut diff = Self::default();
        diff.portfolios.insert(address, Portfolio::of(asset, delta));
        diff
    }

    pub fn data(address: Address, key: String, value: DataValue) -> Self {
        let mut diff = Self::default();
        diff.account_data.entry(address).or_default().insert(key, value);
        diff
    }

    pub fn volume(asset: AssetId, update: VolumeUpdate) -> Self {
        let mut diff = Self::default();
        diff.updated_assets.insert(asset, update);
        diff
    }

    /// Balance delta of `address` in `asset` held by this diff.
    pub fn balance_change(&self, address: &Address, asset: &Asset) -> i64 {
        self.portfolios.get(address).map_or(0, |p| p.get(asset))
    }

    /// Merges `other`, applied after `self`, into one diff.
    pub fn combine(mut self, other: Diff) -> Result<Diff, DiffError> {
        for (address, portfolio) in other.portfolios {
            let merged = match self.portfolios.remove(&address) {
                Some(existing) => existing
                    .combine(portfolio)
                    .map_err(|asset| DiffError::BalanceOverflow { address, asset })?,
                None => portfolio,
            };
            self.portfolios.insert(address, merged);
        }

        for (address, entries) in other.account_data {
            self.account_data.entry(address).or_default().extend(entries);
        }

        for (asset, update) in other.updated_assets {
            let merged = match self.updated_assets.remove(&asset) {
                Some(existing) => existing
                    .combine(update)
                    .ok_or(DiffError::VolumeOverflow(asset))?,
                None => update,
            };
            self.updated_assets.insert(asset, merged);
        }

        self.transactions.extend(other.transactions);
        self.replacing_transactions.extend(other.replacing_transactions);
        self.continuation_states.extend(other.continuation_states);
        self.script_results.extend(other.script_results);

        self.scripts_run = self.scripts_run.saturating_add(other.scripts_run);
        self.scripts_complexity = self.scripts_complexity.saturating_add(other.scripts_complexity);

        Ok(self)
    }
}
