use std::collections::BTreeMap;

use continuation_runtime::{
    script::{Callable, DApp, Expr, Function, StdLibVersion, Value},
    types::{Address, Asset, AssetId, ContinuationTx, FunctionCall, InvocationId, InvokeScriptTx, Payment},
};

use super::SimulateBlockchain;

pub const SENDER: Address = [1u8; 32];
pub const DAPP: Address = [2u8; 32];
pub const RECIPIENT: Address = [3u8; 32];
pub const GENERATOR: Address = [9u8; 32];
pub const ASSET: AssetId = [7u8; 32];

pub const INITIAL_BALANCE: i64 = 100_000_000_000;
pub const SENDER_ASSET_BALANCE: i64 = 1_000;
pub const ASSET_VOLUME: i64 = 1_000_000;
pub const TIMESTAMP: u64 = 1_665_370_157;

/// Fee of an invocation without extra script runs.
pub const INVOKE_FEE: u64 = 900_000;
/// Base fee of a continuation step.
pub const CONTINUATION_FEE: u64 = 900_000;
pub const SCRIPT_EXTRA_FEE: u64 = 400_000;

/// Number of sha256 applications of the `heavy` callable. Needs three steps under the V5 limit.
pub const HEAVY_CHECKS: usize = 120;
/// Amounts above this are rejected by the script of [ASSET].
pub const ASSET_SCRIPT_MAX_AMOUNT: i64 = 10_000;
/// Complexity of one run of the script of [ASSET].
pub const ASSET_SCRIPT_COMPLEXITY: u64 = 3;

pub const REISSUE_AMOUNT: i64 = 500;
pub const BURN_AMOUNT: i64 = 200;
pub const TRANSFER_AMOUNT: i64 = 100;
pub const PAYMENT_AMOUNT: i64 = 50;

pub struct TestData {}

impl TestData {
    pub fn blockchain() -> SimulateBlockchain {
        let mut bc = SimulateBlockchain::new();
        bc.header.generator = GENERATOR;
        bc.header.timestamp = TIMESTAMP;
        bc.set_balance(SENDER, Asset::Native, INITIAL_BALANCE);
        bc.set_dapp(DAPP, Self::dapp());
        bc.issue_asset(ASSET, DAPP, ASSET_VOLUME, Some(Self::asset_script()));
        bc.set_balance(SENDER, Asset::Issued(ASSET), SENDER_ASSET_BALANCE);
        bc
    }

    pub fn dapp() -> DApp {
        let callables = BTreeMap::from([
            ("heavy".to_string(), callable(&[], Self::heavy_body(HEAVY_CHECKS))),
            ("act".to_string(), callable(&[], Self::act_body())),
            ("throw".to_string(), callable(&[], Expr::Throw("boom".to_string()))),
            (
                "transfer".to_string(),
                callable(
                    &["recipient", "amount"],
                    list(vec![Expr::call(
                        Function::Transfer,
                        vec![Expr::reference("recipient"), Expr::bytes(ASSET.to_vec()), Expr::reference("amount")],
                    )]),
                ),
            ),
            (
                "pay_out".to_string(),
                callable(
                    &["amount"],
                    list(vec![Expr::call(
                        Function::Transfer,
                        vec![Expr::bytes(RECIPIENT.to_vec()), Expr::Const(Value::Unit), Expr::reference("amount")],
                    )]),
                ),
            ),
            (
                "store".to_string(),
                callable(
                    &["key", "value"],
                    list(vec![Expr::call(
                        Function::DataEntry,
                        vec![Expr::reference("key"), Expr::reference("value")],
                    )]),
                ),
            ),
            ("noop".to_string(), callable(&[], Expr::Const(Value::Unit))),
        ]);
        DApp { version: StdLibVersion::V5, callables, verifier: None }
    }

    /// `n` chained sha256 checks, then the final hash written as a data entry.
    pub fn heavy_body(n: usize) -> Expr {
        Expr::let_in(
            "h",
            hash_chain(n),
            list(vec![Expr::call(
                Function::DataEntry,
                vec![Expr::string("hash"), Expr::reference("h")],
            )]),
        )
    }

    pub fn act_body() -> Expr {
        let asset = || Expr::bytes(ASSET.to_vec());
        list(vec![
            Expr::call(Function::DataEntry, vec![Expr::string("flag"), Expr::bool(true)]),
            Expr::call(Function::Reissue, vec![asset(), Expr::int(REISSUE_AMOUNT), Expr::bool(true)]),
            Expr::call(Function::Burn, vec![asset(), Expr::int(BURN_AMOUNT)]),
            Expr::call(
                Function::Transfer,
                vec![Expr::bytes(RECIPIENT.to_vec()), asset(), Expr::int(TRANSFER_AMOUNT)],
            ),
        ])
    }

    /// Approves amounts up to [ASSET_SCRIPT_MAX_AMOUNT].
    pub fn asset_script() -> Expr {
        Expr::call(
            Function::Not,
            vec![Expr::call(
                Function::Lt,
                vec![Expr::int(ASSET_SCRIPT_MAX_AMOUNT), Expr::reference("tx.amount")],
            )],
        )
    }

    pub fn invoke(function: &str, args: Vec<Value>, payments: Vec<Payment>, fee: u64) -> InvokeScriptTx {
        let call = FunctionCall { function: function.to_string(), args };
        InvokeScriptTx::new(SENDER, DAPP, call, payments, fee, TIMESTAMP)
    }

    pub fn continuation(invoke_id: InvocationId, step: u32) -> ContinuationTx {
        ContinuationTx::new(invoke_id, step, CONTINUATION_FEE, TIMESTAMP + step as u64 + 1)
    }

    pub fn asset_payment(amount: i64) -> Payment {
        Payment { asset: Asset::Issued(ASSET), amount }
    }
}

pub fn hash_chain(n: usize) -> Expr {
    (0..n).fold(Expr::bytes(b"seed".to_vec()), |acc, _| Expr::call(Function::Sha256, vec![acc]))
}

fn list(items: Vec<Expr>) -> Expr {
    Expr::call(Function::List, items)
}

fn callable(params: &[&str], body: Expr) -> Callable {
    Callable { params: params.iter().map(|p| p.to_string()).collect(), body }
}
