/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Execution of the actions returned by a completed DApp callable.
//!
//! The attached payments of the invocation are applied first, as transfers from the sender to
//! the DApp. Then the actions are applied in the order the callable returned them. A payment or
//! action involving an issued asset with a script runs that script once; the script must return
//! `true` for the action to be applied.
//!
//! Execution is all-or-nothing: the first invalid action or rejecting asset script aborts the
//! whole batch. The script runs performed up to that point are still reported, since their
//! complexity was spent.

use crate::{
    blockchain::Blockchain,
    diff::{Diff, VolumeUpdate},
    error::FailureReason,
    script::{EvaluationMode, EvaluationResult, Evaluator, ScriptAction, Value},
    types::{
        Address, Asset, AssetId, BurnRecord, DataEntry, InvokeScriptResult, InvokeScriptTx,
        ReissueRecord, TransferRecord,
    },
};

/// Asset script runs performed while executing a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ScriptRuns {
    /// Runs approving attached payments.
    pub payments: u32,
    /// Runs approving actions.
    pub actions: u32,
    pub complexity: u64,
}

impl ScriptRuns {
    pub fn total(&self) -> u32 {
        self.payments.saturating_add(self.actions)
    }
}

#[derive(Debug)]
pub(crate) struct AppliedActions {
    pub diff: Diff,
    pub result: InvokeScriptResult,
    pub runs: ScriptRuns,
}

#[derive(Debug)]
pub(crate) struct ActionFailure {
    pub reason: FailureReason,
    pub runs: ScriptRuns,
}

/// Applies the payments of `invoke` and then `actions` on behalf of its DApp.
pub(crate) fn apply<B: Blockchain, E: Evaluator>(
    blockchain: &B,
    evaluator: &E,
    invoke: &InvokeScriptTx,
    actions: Vec<ScriptAction>,
) -> Result<AppliedActions, ActionFailure> {
    let mut executor = ActionExecutor {
        blockchain,
        evaluator,
        invoke,
        diff: Diff::empty(),
        result: InvokeScriptResult::default(),
        runs: ScriptRuns::default(),
    };
    match executor.execute(actions) {
        Ok(()) => Ok(AppliedActions {
            diff: executor.diff,
            result: executor.result,
            runs: executor.runs,
        }),
        Err(reason) => Err(ActionFailure { reason, runs: executor.runs }),
    }
}

/// Checks that no balance touched by `diff` becomes negative or overflows on top of `blockchain`.
pub(crate) fn ensure_non_negative<B: Blockchain>(
    blockchain: &B,
    diff: &Diff,
) -> Result<(), FailureReason> {
    for (address, portfolio) in &diff.portfolios {
        for (asset, delta) in portfolio.entries() {
            let balance = blockchain
                .balance(address, &asset)
                .checked_add(delta)
                .ok_or(FailureReason::BalanceOverflow { address: *address, asset })?;
            if balance < 0 {
                return Err(FailureReason::NegativeBalance { address: *address, asset, balance });
            }
        }
    }
    Ok(())
}

struct ActionExecutor<'a, B, E> {
    blockchain: &'a B,
    evaluator: &'a E,
    invoke: &'a InvokeScriptTx,
    diff: Diff,
    result: InvokeScriptResult,
    runs: ScriptRuns,
}

/// Kind of operation passed to asset scripts as `tx.kind`.
#[derive(Clone, Copy)]
enum AssetOperation {
    Payment,
    Transfer,
    Reissue,
    Burn,
}

impl AssetOperation {
    fn name(&self) -> &'static str {
        match self {
            AssetOperation::Payment => "Payment",
            AssetOperation::Transfer => "ScriptTransfer",
            AssetOperation::Reissue => "Reissue",
            AssetOperation::Burn => "Burn",
        }
    }
}

impl<'a, B: Blockchain, E: Evaluator> ActionExecutor<'a, B, E> {
    fn execute(&mut self, actions: Vec<ScriptAction>) -> Result<(), FailureReason> {
        self.check_limits(&actions)?;

        let invoke = self.invoke;
        for payment in &invoke.payments {
            self.check_asset_exists(&payment.asset)?;
            if let Asset::Issued(asset) = payment.asset {
                self.run_asset_script(
                    &asset,
                    AssetOperation::Payment,
                    invoke.sender,
                    Some(invoke.dapp),
                    payment.amount,
                )?;
            }
            self.add(Diff::balance(invoke.sender, payment.asset, -payment.amount))?;
            self.add(Diff::balance(invoke.dapp, payment.asset, payment.amount))?;
        }

        for action in actions {
            match action {
                ScriptAction::DataEntry { key, value } => {
                    self.add(Diff::data(invoke.dapp, key.clone(), value.clone()))?;
                    self.result.data.push(DataEntry { key, value });
                }
                ScriptAction::Transfer { recipient, asset, amount } => {
                    self.transfer(recipient, asset, amount)?
                }
                ScriptAction::Reissue { asset, amount, reissuable } => {
                    self.reissue(asset, amount, reissuable)?
                }
                ScriptAction::Burn { asset, amount } => self.burn(asset, amount)?,
            }
        }
        Ok(())
    }

    fn check_limits(&self, actions: &[ScriptAction]) -> Result<(), FailureReason> {
        let limits = &self.blockchain.settings().functionality;

        let transfers = actions
            .iter()
            .filter(|a| matches!(a, ScriptAction::Transfer { .. }))
            .count();
        if transfers > limits.max_transfers {
            return Err(FailureReason::InvalidAction(format!(
                "too many transfers: {}, max {}",
                transfers, limits.max_transfers
            )));
        }

        let mut data_entries = 0;
        for action in actions {
            if let ScriptAction::DataEntry { key, .. } = action {
                data_entries += 1;
                if key.len() > limits.max_key_size {
                    return Err(FailureReason::InvalidAction(format!(
                        "data key of {} bytes exceeds {} bytes",
                        key.len(),
                        limits.max_key_size
                    )));
                }
            }
        }
        if data_entries > limits.max_data_entries {
            return Err(FailureReason::InvalidAction(format!(
                "too many data entries: {}, max {}",
                data_entries, limits.max_data_entries
            )));
        }
        Ok(())
    }

    fn transfer(&mut self, recipient: Address, asset: Asset, amount: i64) -> Result<(), FailureReason> {
        let dapp = self.invoke.dapp;
        if amount < 0 {
            return Err(FailureReason::InvalidAction(format!("negative transfer amount {}", amount)));
        }
        if recipient == dapp {
            return Err(FailureReason::InvalidAction("DApp cannot transfer to itself".to_string()));
        }
        self.check_asset_exists(&asset)?;
        if let Asset::Issued(id) = asset {
            self.run_asset_script(&id, AssetOperation::Transfer, dapp, Some(recipient), amount)?;
        }

        self.add(Diff::balance(dapp, asset, -amount))?;
        self.add(Diff::balance(recipient, asset, amount))?;
        self.result.transfers.push(TransferRecord { recipient, asset, amount });
        Ok(())
    }

    fn reissue(&mut self, asset: AssetId, amount: i64, reissuable: bool) -> Result<(), FailureReason> {
        let dapp = self.invoke.dapp;
        if amount < 0 {
            return Err(FailureReason::InvalidAction(format!("negative reissue amount {}", amount)));
        }
        let description = self
            .blockchain
            .asset_description(&asset)
            .ok_or_else(|| unknown_asset(&asset))?;
        if description.issuer != dapp {
            return Err(FailureReason::InvalidAction(
                "asset was issued by another address".to_string(),
            ));
        }
        let pending = self.diff.updated_assets.get(&asset);
        if !description.reissuable || pending.and_then(|p| p.reissuable()) == Some(false) {
            return Err(FailureReason::InvalidAction("asset is not reissuable".to_string()));
        }
        let pending_change = pending.map_or(0, |p| p.net_change());
        let volume = description.volume as i128 + pending_change + amount as i128;
        if volume > i64::MAX as i128 {
            return Err(FailureReason::VolumeOverflow(asset));
        }
        self.run_asset_script(&asset, AssetOperation::Reissue, dapp, None, amount)?;

        self.add(Diff::balance(dapp, Asset::Issued(asset), amount))?;
        self.add(Diff::volume(asset, VolumeUpdate::reissue(amount, reissuable)))?;
        self.result.reissues.push(ReissueRecord { asset, amount, reissuable });
        Ok(())
    }

    fn burn(&mut self, asset: AssetId, amount: i64) -> Result<(), FailureReason> {
        let dapp = self.invoke.dapp;
        if amount < 0 {
            return Err(FailureReason::InvalidAction(format!("negative burn amount {}", amount)));
        }
        self.check_asset_exists(&Asset::Issued(asset))?;
        self.run_asset_script(&asset, AssetOperation::Burn, dapp, None, amount)?;

        self.add(Diff::balance(dapp, Asset::Issued(asset), -amount))?;
        self.add(Diff::volume(asset, VolumeUpdate::burn(amount)))?;
        self.result.burns.push(BurnRecord { asset, amount });
        Ok(())
    }

    fn check_asset_exists(&self, asset: &Asset) -> Result<(), FailureReason> {
        match asset {
            Asset::Native => Ok(()),
            Asset::Issued(id) => match self.blockchain.asset_description(id) {
                Some(_) => Ok(()),
                None => Err(unknown_asset(id)),
            },
        }
    }

    /// Runs the script of `asset`, if it has one. Counts the run even when it rejects.
    fn run_asset_script(
        &mut self,
        asset: &AssetId,
        operation: AssetOperation,
        sender: Address,
        recipient: Option<Address>,
        amount: i64,
    ) -> Result<(), FailureReason> {
        let Some(info) = self.blockchain.asset_script(asset) else {
            return Ok(());
        };
        let budget = self.blockchain.settings().max_asset_script_complexity;
        let bindings = vec![
            ("tx.kind".to_string(), Value::Str(operation.name().to_string())),
            ("tx.sender".to_string(), Value::Bytes(sender.to_vec())),
            (
                "tx.recipient".to_string(),
                recipient.map_or(Value::Unit, |r| Value::Bytes(r.to_vec())),
            ),
            ("tx.amount".to_string(), Value::Int(amount)),
            ("tx.assetId".to_string(), Value::Bytes(asset.to_vec())),
        ];

        match operation {
            AssetOperation::Payment => self.runs.payments += 1,
            _ => self.runs.actions += 1,
        }

        tracing::trace!(
            asset = ?asset,
            operation = operation.name(),
            estimated_complexity = info.complexity,
            budget,
            "running asset script"
        );
        let outcome = self
            .evaluator
            .evaluate(EvaluationMode::Verifier { script: &info.script, bindings }, budget);
        let rejection = match outcome {
            Ok(EvaluationResult::Completed { result, spent_complexity }) => {
                self.runs.complexity = self.runs.complexity.saturating_add(spent_complexity);
                match result {
                    Ok(Value::Bool(true)) => return Ok(()),
                    Ok(_) => "transaction is not allowed by asset script".to_string(),
                    Err(error) => error.to_string(),
                }
            }
            Ok(EvaluationResult::Partial { .. }) => {
                self.runs.complexity = self.runs.complexity.saturating_add(budget);
                "asset script exceeds complexity limit".to_string()
            }
            Err(error) => error.to_string(),
        };

        tracing::debug!(asset = ?asset, reason = %rejection, "asset script rejected action");
        Err(FailureReason::AssetScriptRejected { asset: *asset, message: rejection })
    }

    fn add(&mut self, diff: Diff) -> Result<(), FailureReason> {
        let current = std::mem::take(&mut self.diff);
        self.diff = current.combine(diff)?;
        Ok(())
    }
}

fn unknown_asset(asset: &AssetId) -> FailureReason {
    FailureReason::InvalidAction(format!("asset {:?} does not exist", asset))
}
