/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines common data structures to be used inside this library, or from outside application.
//!
//! Transactions handled by the runtime are either a fresh [InvokeScriptTx] or a [ContinuationTx]
//! that advances a suspended invocation by one step. Ids are content-derived: SHA-256 over the
//! borsh encoding of the transaction body.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use crate::script::{DataValue, Value};

pub type Sha256Hash = [u8; 32];

/// Address of an account.
pub type Address = [u8; 32];

/// Id of an issued asset.
pub type AssetId = [u8; 32];

pub type TxId = Sha256Hash;

/// An invocation is identified by the id of the transaction that created it.
pub type InvocationId = TxId;

/// Either the native token or an issued asset.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum Asset {
    Native,
    Issued(AssetId),
}

impl Asset {
    pub fn issued_id(&self) -> Option<&AssetId> {
        match self {
            Asset::Native => None,
            Asset::Issued(id) => Some(id),
        }
    }
}

/// Amount attached to an invocation, moved from the sender to the DApp on completion.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Payment {
    pub asset: Asset,
    pub amount: i64,
}

/// Name of the callable and its arguments.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FunctionCall {
    pub function: String,
    pub args: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InvokeScriptTx {
    pub id: TxId,
    pub sender: Address,
    pub dapp: Address,
    pub call: FunctionCall,
    pub payments: Vec<Payment>,
    pub fee: u64,
    pub timestamp: u64,
}

#[derive(BorshSerialize)]
struct InvokeScriptBody {
    tag: u8,
    sender: Address,
    dapp: Address,
    call: FunctionCall,
    payments: Vec<Payment>,
    fee: u64,
    timestamp: u64,
}

impl InvokeScriptTx {
    pub fn new(
        sender: Address,
        dapp: Address,
        call: FunctionCall,
        payments: Vec<Payment>,
        fee: u64,
        timestamp: u64,
    ) -> Self {
        let id = content_id(&InvokeScriptBody {
            tag: TransactionKind::InvokeScript as u8,
            sender,
            dapp,
            call: call.clone(),
            payments: payments.clone(),
            fee,
            timestamp,
        });
        Self { id, sender, dapp, call, payments, fee, timestamp }
    }
}

/// Advances the suspended computation of `invoke_id` by one step. Carries no script logic.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ContinuationTx {
    pub id: TxId,
    pub invoke_id: InvocationId,
    pub step: u32,
    pub fee: u64,
    pub timestamp: u64,
}

#[derive(BorshSerialize)]
struct ContinuationBody {
    tag: u8,
    invoke_id: InvocationId,
    step: u32,
    fee: u64,
    timestamp: u64,
}

impl ContinuationTx {
    pub fn new(invoke_id: InvocationId, step: u32, fee: u64, timestamp: u64) -> Self {
        let id = content_id(&ContinuationBody {
            tag: TransactionKind::Continuation as u8,
            invoke_id,
            step,
            fee,
            timestamp,
        });
        Self { id, invoke_id, step, fee, timestamp }
    }
}

fn content_id<T: BorshSerialize>(body: &T) -> TxId {
    // Encoding into a Vec cannot fail.
    let bytes = borsh::to_vec(body).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    InvokeScript(InvokeScriptTx),
    Continuation(ContinuationTx),
}

impl Transaction {
    pub fn id(&self) -> TxId {
        match self {
            Transaction::InvokeScript(tx) => tx.id,
            Transaction::Continuation(tx) => tx.id,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Transaction::InvokeScript(_) => TransactionKind::InvokeScript,
            Transaction::Continuation(_) => TransactionKind::Continuation,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransactionKind {
    InvokeScript = 16,
    Continuation = 18,
}

/// Application status of a transaction as reported to the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Succeeded,
    InProgress,
    Failed,
}

/// Recorded information about an applied transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionInfo {
    pub tx: Transaction,
    pub height: u32,
    pub status: TxStatus,
    /// Fee charged for this transaction.
    pub fee: u64,
    pub affected: BTreeSet<Address>,
    /// For a continuation, the invocation it advances.
    pub invoke_id: Option<InvocationId>,
    /// For an invocation, the continuations applied so far, in step order.
    pub continuations: Vec<TxId>,
}

/// Data entry written by a DApp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataEntry {
    pub key: String,
    pub value: DataValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRecord {
    pub recipient: Address,
    pub asset: Asset,
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReissueRecord {
    pub asset: AssetId,
    pub amount: i64,
    pub reissuable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurnRecord {
    pub asset: AssetId,
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMessage {
    pub code: u32,
    pub text: String,
}

/// Outcome of a finished invocation, for API and explorer consumption.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvokeScriptResult {
    pub data: Vec<DataEntry>,
    pub transfers: Vec<TransferRecord>,
    pub reissues: Vec<ReissueRecord>,
    pub burns: Vec<BurnRecord>,
    pub error: Option<ErrorMessage>,
}

impl InvokeScriptResult {
    pub fn failed(error: ErrorMessage) -> Self {
        Self { error: Some(error), ..Default::default() }
    }
}
