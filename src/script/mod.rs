/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Script model consumed by the runtime: expression trees, values, the closed set of
//! ledger [actions](ScriptAction) a DApp callable can emit, and the DApp layout itself.
//!
//! Expressions and values are borsh-serializable because a partially evaluated expression is
//! persisted between blocks as part of a [continuation state](crate::store::ContinuationState).
//! The [evaluator] module runs expressions against a complexity budget.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{Address, Asset, AssetId};

pub mod evaluator;
pub use evaluator::*;

/// Expression tree of a script.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Expr {
    Const(Value),
    Ref(String),
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    /// Explicit abort with a message.
    Throw(String),
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Const(Value::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Const(Value::Bool(value))
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Expr::Const(Value::Bytes(value.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Const(Value::Str(value.into()))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Expr::Ref(name.into())
    }

    pub fn call(function: Function, args: Vec<Expr>) -> Self {
        Expr::Call { function, args }
    }

    pub fn let_in(name: impl Into<String>, value: Expr, body: Expr) -> Self {
        Expr::Let {
            name: name.into(),
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Value {
    Unit,
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Action(ScriptAction),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Int(_) => "Int",
            Value::Bool(_) => "Boolean",
            Value::Bytes(_) => "ByteVector",
            Value::Str(_) => "String",
            Value::List(_) => "List",
            Value::Action(_) => "Action",
        }
    }
}

/// Value of a data entry written to account storage.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum DataValue {
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
}

/// Ledger action emitted by a completed callable.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ScriptAction {
    DataEntry {
        key: String,
        value: DataValue,
    },
    Transfer {
        recipient: Address,
        asset: Asset,
        amount: i64,
    },
    Reissue {
        asset: AssetId,
        amount: i64,
        reissuable: bool,
    },
    Burn {
        asset: AssetId,
        amount: i64,
    },
}

/// Extracts the actions from the terminal value of a callable. `Unit` means no actions.
pub fn actions_from_value(value: Value) -> Result<Vec<ScriptAction>, ScriptError> {
    match value {
        Value::Unit => Ok(Vec::new()),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Action(action) => Ok(action),
                other => Err(ScriptError::new(format!(
                    "callable result must contain actions only, found {}",
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(ScriptError::new(format!(
            "callable must return a list of actions, found {}",
            other.type_name()
        ))),
    }
}

/// Failure raised by a script: explicit [Throw](Expr::Throw), type mismatch or arithmetic overflow.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ScriptError(pub String);

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Built-in functions. Each has a fixed complexity charged when it is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Function {
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
    Not,
    Sha256,
    List,
    DataEntry,
    Transfer,
    Reissue,
    Burn,
}

impl Function {
    pub const fn complexity(&self) -> u64 {
        match self {
            Function::Sha256 => 200,
            _ => 1,
        }
    }

    fn arity(&self) -> Option<usize> {
        match self {
            Function::Not | Function::Sha256 => Some(1),
            Function::Add
            | Function::Sub
            | Function::Mul
            | Function::Eq
            | Function::Lt
            | Function::DataEntry
            | Function::Burn => Some(2),
            Function::Transfer | Function::Reissue => Some(3),
            Function::List => None,
        }
    }

    pub(crate) fn apply(&self, args: Vec<Value>) -> Result<Value, ScriptError> {
        if let Some(arity) = self.arity() {
            if args.len() != arity {
                return Err(ScriptError::new(format!(
                    "{:?} expects {} arguments, got {}",
                    self,
                    arity,
                    args.len()
                )));
            }
        }
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or(Value::Unit);

        match self {
            Function::Add => checked_int(next(), next(), i64::checked_add),
            Function::Sub => checked_int(next(), next(), i64::checked_sub),
            Function::Mul => checked_int(next(), next(), i64::checked_mul),
            Function::Eq => Ok(Value::Bool(next() == next())),
            Function::Lt => {
                let (a, b) = (int(next())?, int(next())?);
                Ok(Value::Bool(a < b))
            }
            Function::Not => Ok(Value::Bool(!boolean(next())?)),
            Function::Sha256 => {
                use sha2::{Digest, Sha256};
                let input = match next() {
                    Value::Bytes(bytes) => bytes,
                    Value::Str(s) => s.into_bytes(),
                    other => return Err(type_mismatch("ByteVector", &other)),
                };
                let mut hasher = Sha256::new();
                hasher.update(input);
                Ok(Value::Bytes(hasher.finalize().to_vec()))
            }
            Function::List => Ok(Value::List(args.collect())),
            Function::DataEntry => {
                let key = match next() {
                    Value::Str(key) => key,
                    other => return Err(type_mismatch("String", &other)),
                };
                let value = match next() {
                    Value::Int(v) => DataValue::Int(v),
                    Value::Bool(v) => DataValue::Bool(v),
                    Value::Bytes(v) => DataValue::Bytes(v),
                    Value::Str(v) => DataValue::Str(v),
                    other => return Err(type_mismatch("Int|Boolean|ByteVector|String", &other)),
                };
                Ok(Value::Action(ScriptAction::DataEntry { key, value }))
            }
            Function::Transfer => {
                let recipient = address(next())?;
                let asset = match next() {
                    Value::Unit => Asset::Native,
                    other => Asset::Issued(address(other)?),
                };
                let amount = int(next())?;
                Ok(Value::Action(ScriptAction::Transfer { recipient, asset, amount }))
            }
            Function::Reissue => {
                let asset = address(next())?;
                let amount = int(next())?;
                let reissuable = boolean(next())?;
                Ok(Value::Action(ScriptAction::Reissue { asset, amount, reissuable }))
            }
            Function::Burn => {
                let asset = address(next())?;
                let amount = int(next())?;
                Ok(Value::Action(ScriptAction::Burn { asset, amount }))
            }
        }
    }
}

fn type_mismatch(expected: &str, found: &Value) -> ScriptError {
    ScriptError::new(format!("expected {}, found {}", expected, found.type_name()))
}

fn int(value: Value) -> Result<i64, ScriptError> {
    match value {
        Value::Int(v) => Ok(v),
        other => Err(type_mismatch("Int", &other)),
    }
}

fn boolean(value: Value) -> Result<bool, ScriptError> {
    match value {
        Value::Bool(v) => Ok(v),
        other => Err(type_mismatch("Boolean", &other)),
    }
}

fn address(value: Value) -> Result<[u8; 32], ScriptError> {
    match value {
        Value::Bytes(bytes) => bytes
            .try_into()
            .map_err(|_| ScriptError::new("address or asset id must be 32 bytes")),
        other => Err(type_mismatch("ByteVector", &other)),
    }
}

fn checked_int(
    a: Value,
    b: Value,
    op: fn(i64, i64) -> Option<i64>,
) -> Result<Value, ScriptError> {
    op(int(a)?, int(b)?)
        .map(Value::Int)
        .ok_or_else(|| ScriptError::new("integer overflow"))
}

/// Version of the standard library a DApp is compiled against. Selects the per-step complexity limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StdLibVersion {
    V3,
    V4,
    V5,
}

/// Named entry point of a DApp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callable {
    pub params: Vec<String>,
    pub body: Expr,
}

/// Script deployed on an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DApp {
    pub version: StdLibVersion,
    pub callables: BTreeMap<String, Callable>,
    /// Authorizes transactions sent from the account.
    pub verifier: Option<Expr>,
}
