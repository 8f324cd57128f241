use std::collections::{BTreeMap, BTreeSet};

use continuation_runtime::{
    blockchain::{AccountScriptInfo, AssetDescription, AssetScriptInfo},
    script::{DApp, DataValue, Expr},
    store::ContinuationStateStore,
    types::{Address, Asset, AssetId, InvocationId, TransactionInfo, TxId},
    BlockHeader, Blockchain, BlockchainFeature, BlockchainSettings, ContinuationState, Diff,
};

/// In-memory blockchain. Diffs are committed one block at a time.
#[derive(Clone)]
pub struct SimulateBlockchain {
    pub height: u32,
    pub header: BlockHeader,
    pub settings: BlockchainSettings,
    pub features: BTreeSet<BlockchainFeature>,
    pub store: ContinuationStateStore,
    balances: BTreeMap<(Address, Asset), i64>,
    data: BTreeMap<(Address, String), DataValue>,
    scripts: BTreeMap<Address, AccountScriptInfo>,
    asset_scripts: BTreeMap<AssetId, AssetScriptInfo>,
    assets: BTreeMap<AssetId, AssetDescription>,
    transactions: BTreeMap<TxId, TransactionInfo>,
}

impl SimulateBlockchain {
    pub fn new() -> Self {
        Self {
            height: 1,
            header: BlockHeader::default(),
            settings: BlockchainSettings::default(),
            features: BTreeSet::from([BlockchainFeature::ContinuationTransaction]),
            store: ContinuationStateStore::new(),
            balances: BTreeMap::new(),
            data: BTreeMap::new(),
            scripts: BTreeMap::new(),
            asset_scripts: BTreeMap::new(),
            assets: BTreeMap::new(),
            transactions: BTreeMap::new(),
        }
    }

    pub fn set_balance(&mut self, address: Address, asset: Asset, balance: i64) {
        self.balances.insert((address, asset), balance);
    }

    pub fn set_dapp(&mut self, address: Address, dapp: DApp) {
        let complexities_by_callable = dapp.callables.keys().map(|name| (name.clone(), 0)).collect();
        self.scripts.insert(address, AccountScriptInfo { dapp, complexities_by_callable });
    }

    pub fn issue_asset(&mut self, id: AssetId, issuer: Address, volume: i64, script: Option<Expr>) {
        self.assets.insert(
            id,
            AssetDescription { issuer, name: "TEST".to_string(), volume, reissuable: true },
        );
        self.balances.insert((issuer, Asset::Issued(id)), volume);
        if let Some(script) = script {
            self.asset_scripts.insert(id, AssetScriptInfo { script, complexity: 0 });
        }
    }

    pub fn data(&self, address: &Address, key: &str) -> Option<&DataValue> {
        self.data.get(&(*address, key.to_string()))
    }

    /// Applies `diff` as the block at the current height and moves to the next height.
    pub fn commit(&mut self, diff: Diff) {
        for (address, portfolio) in &diff.portfolios {
            for (asset, delta) in portfolio.entries() {
                *self.balances.entry((*address, asset)).or_insert(0) += delta;
            }
        }
        for (address, entries) in diff.account_data {
            for (key, value) in entries {
                self.data.insert((address, key), value);
            }
        }
        for (id, update) in &diff.updated_assets {
            let description = self.assets.get_mut(id).unwrap();
            description.volume = (description.volume as i128 + update.net_change()) as i64;
            if let Some(reissuable) = update.reissuable() {
                description.reissuable = description.reissuable && reissuable;
            }
        }
        self.transactions.extend(diff.transactions);
        self.transactions.extend(diff.replacing_transactions);
        self.store.apply(self.height, &diff.continuation_states).unwrap();
        self.height += 1;
    }
}

impl Blockchain for SimulateBlockchain {
    fn height(&self) -> u32 {
        self.height
    }

    fn block_header(&self) -> BlockHeader {
        self.header.clone()
    }

    fn settings(&self) -> &BlockchainSettings {
        &self.settings
    }

    fn is_feature_activated(&self, feature: BlockchainFeature) -> bool {
        self.features.contains(&feature)
    }

    fn continuation_state(&self, invoke_id: &InvocationId) -> Option<ContinuationState> {
        self.store.get(invoke_id).unwrap()
    }

    fn transaction_info(&self, id: &TxId) -> Option<TransactionInfo> {
        self.transactions.get(id).cloned()
    }

    fn account_script(&self, address: &Address) -> Option<AccountScriptInfo> {
        self.scripts.get(address).cloned()
    }

    fn account_data(&self, address: &Address, key: &str) -> Option<DataValue> {
        self.data(address, key).cloned()
    }

    fn asset_script(&self, asset: &AssetId) -> Option<AssetScriptInfo> {
        self.asset_scripts.get(asset).cloned()
    }

    fn asset_description(&self, asset: &AssetId) -> Option<AssetDescription> {
        self.assets.get(asset).cloned()
    }

    fn balance(&self, address: &Address, asset: &Asset) -> i64 {
        self.balances.get(&(*address, *asset)).copied().unwrap_or(0)
    }
}
