/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Budget-limited evaluation of expression trees.
//!
//! An [Evaluator] either completes an expression within the given complexity budget, or returns
//! the not-yet-evaluated remainder of it together with the budget it could not spend. Suspension
//! is a value, not a paused stack: every fully evaluated subtree is folded into a [Expr::Const]
//! in the returned remainder, so re-entering the evaluator with that remainder continues exactly
//! where the previous step stopped.
//!
//! Cost rules of [ScriptEvaluator]:
//! - `Const`, `Let` and `Throw` are free,
//! - `Ref` and `If` cost 1,
//! - `Call` costs [Function::complexity](super::Function::complexity) once all of its arguments
//!   are evaluated.
//!
//! A node is applied only when its whole cost fits into the remaining budget. Constants are free,
//! so the total complexity spent over all steps of an evaluation equals the single-step cost.
//! Expressions nested deeper than [MAX_EXPRESSION_DEPTH] fail as a script error.

use crate::types::FunctionCall;

use super::{DApp, Expr, ScriptError, Value};

const REF_COMPLEXITY: u64 = 1;
const IF_COMPLEXITY: u64 = 1;

/// Deepest expression nesting the evaluator walks into.
pub const MAX_EXPRESSION_DEPTH: usize = 512;

/// Input of an evaluation.
#[derive(Clone, Debug)]
pub enum EvaluationMode<'a> {
    /// Start a callable of a DApp. `bindings` are the invocation context values made
    /// visible to the callable body.
    FirstStep {
        dapp: &'a DApp,
        call: &'a FunctionCall,
        bindings: Vec<(String, Value)>,
    },
    /// Continue from the remainder returned by a previous partial result.
    Resume { expression: &'a Expr },
    /// Run a verifier (account or asset script) over the given bindings.
    Verifier {
        script: &'a Expr,
        bindings: Vec<(String, Value)>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvaluationResult {
    /// Terminal value, or the failure raised by the script.
    Completed {
        result: Result<Value, ScriptError>,
        spent_complexity: u64,
    },
    /// Budget exhausted before the expression finished.
    Partial {
        expression: Expr,
        unused_complexity: u64,
    },
}

/// The invocation cannot be evaluated at all. Raised before any complexity is spent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("callable `{0}` is not defined")]
    CallableNotFound(String),
    #[error("callable `{function}` expects {expected} arguments, got {actual}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },
}

/// Contract every script evaluator satisfies. Evaluation must be deterministic: the same
/// `(mode, budget)` always yields the same result and spent complexity.
pub trait Evaluator {
    fn evaluate(
        &self,
        mode: EvaluationMode<'_>,
        budget: u64,
    ) -> Result<EvaluationResult, EvaluationError>;
}

/// Reference tree-walking evaluator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptEvaluator;

impl Evaluator for ScriptEvaluator {
    fn evaluate(
        &self,
        mode: EvaluationMode<'_>,
        budget: u64,
    ) -> Result<EvaluationResult, EvaluationError> {
        let expression = match mode {
            EvaluationMode::FirstStep { dapp, call, bindings } => {
                let callable = dapp
                    .callables
                    .get(&call.function)
                    .ok_or_else(|| EvaluationError::CallableNotFound(call.function.clone()))?;
                if callable.params.len() != call.args.len() {
                    return Err(EvaluationError::ArgumentCountMismatch {
                        function: call.function.clone(),
                        expected: callable.params.len(),
                        actual: call.args.len(),
                    });
                }
                let params = callable.params.iter().cloned().zip(call.args.iter().cloned());
                wrap_in_bindings(bindings.into_iter().chain(params), &callable.body)
            }
            EvaluationMode::Resume { expression } => expression.clone(),
            EvaluationMode::Verifier { script, bindings } => {
                wrap_in_bindings(bindings.into_iter(), script)
            }
        };

        Ok(run(&expression, budget))
    }
}

/// Binds values around `body`; the first binding is the outermost one.
fn wrap_in_bindings(bindings: impl DoubleEndedIterator<Item = (String, Value)>, body: &Expr) -> Expr {
    bindings.rev().fold(body.clone(), |body, (name, value)| Expr::Let {
        name,
        value: Box::new(Expr::Const(value)),
        body: Box::new(body),
    })
}

fn run(expression: &Expr, budget: u64) -> EvaluationResult {
    let mut meter = Budget { remaining: budget };
    let mut env = Env::default();
    let result = eval(expression, &mut env, &mut meter);
    let spent_complexity = budget - meter.remaining;

    match result {
        Ok(Step::Done(value)) => EvaluationResult::Completed { result: Ok(value), spent_complexity },
        Ok(Step::Suspended(expression)) => {
            tracing::trace!(spent_complexity, unused = meter.remaining, "evaluation suspended");
            EvaluationResult::Partial { expression, unused_complexity: meter.remaining }
        }
        Err(error) => EvaluationResult::Completed { result: Err(error), spent_complexity },
    }
}

enum Step {
    Done(Value),
    Suspended(Expr),
}

struct Budget {
    remaining: u64,
}

impl Budget {
    /// Spends `cost` if it fits entirely.
    fn try_spend(&mut self, cost: u64) -> bool {
        match self.remaining.checked_sub(cost) {
            Some(remaining) => {
                self.remaining = remaining;
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct Env {
    scopes: Vec<(String, Value)>,
    depth: usize,
}

impl Env {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

fn eval(expr: &Expr, env: &mut Env, budget: &mut Budget) -> Result<Step, ScriptError> {
    if env.depth >= MAX_EXPRESSION_DEPTH {
        return Err(ScriptError::new(format!(
            "expression nesting exceeds {} levels",
            MAX_EXPRESSION_DEPTH
        )));
    }
    env.depth += 1;
    let step = eval_node(expr, env, budget);
    env.depth -= 1;
    step
}

fn eval_node(expr: &Expr, env: &mut Env, budget: &mut Budget) -> Result<Step, ScriptError> {
    match expr {
        Expr::Const(value) => Ok(Step::Done(value.clone())),

        Expr::Ref(name) => {
            if !budget.try_spend(REF_COMPLEXITY) {
                return Ok(Step::Suspended(expr.clone()));
            }
            env.lookup(name)
                .cloned()
                .map(Step::Done)
                .ok_or_else(|| ScriptError::new(format!("unbound reference `{}`", name)))
        }

        Expr::Let { name, value, body } => {
            let bound = match eval(value, env, budget)? {
                Step::Done(bound) => bound,
                Step::Suspended(rest) => {
                    return Ok(Step::Suspended(Expr::Let {
                        name: name.clone(),
                        value: Box::new(rest),
                        body: body.clone(),
                    }))
                }
            };

            env.scopes.push((name.clone(), bound));
            let result = eval(body, env, budget);
            let bound = env.scopes.pop().map(|(_, bound)| bound);

            // keep the binding around an unfinished body
            match result? {
                Step::Done(value) => Ok(Step::Done(value)),
                Step::Suspended(rest) => Ok(Step::Suspended(Expr::Let {
                    name: name.clone(),
                    value: Box::new(Expr::Const(bound.unwrap_or(Value::Unit))),
                    body: Box::new(rest),
                })),
            }
        }

        Expr::If { cond, then, otherwise } => {
            let cond = match eval(cond, env, budget)? {
                Step::Done(cond) => cond,
                Step::Suspended(rest) => {
                    return Ok(Step::Suspended(Expr::If {
                        cond: Box::new(rest),
                        then: then.clone(),
                        otherwise: otherwise.clone(),
                    }))
                }
            };
            if !budget.try_spend(IF_COMPLEXITY) {
                return Ok(Step::Suspended(Expr::If {
                    cond: Box::new(Expr::Const(cond)),
                    then: then.clone(),
                    otherwise: otherwise.clone(),
                }));
            }
            match cond {
                Value::Bool(true) => eval(then, env, budget),
                Value::Bool(false) => eval(otherwise, env, budget),
                other => Err(ScriptError::new(format!(
                    "condition must be Boolean, found {}",
                    other.type_name()
                ))),
            }
        }

        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for (i, arg) in args.iter().enumerate() {
                match eval(arg, env, budget)? {
                    Step::Done(value) => values.push(value),
                    Step::Suspended(rest) => {
                        let mut remaining: Vec<Expr> = values.into_iter().map(Expr::Const).collect();
                        remaining.push(rest);
                        remaining.extend(args[i + 1..].iter().cloned());
                        return Ok(Step::Suspended(Expr::Call {
                            function: *function,
                            args: remaining,
                        }));
                    }
                }
            }
            if !budget.try_spend(function.complexity()) {
                return Ok(Step::Suspended(Expr::Call {
                    function: *function,
                    args: values.into_iter().map(Expr::Const).collect(),
                }));
            }
            function.apply(values).map(Step::Done)
        }

        Expr::Throw(message) => Err(ScriptError::new(message.clone())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::script::{Callable, Function, StdLibVersion};

    /// `n` nested sha256 applications.
    fn hash_chain(n: usize) -> Expr {
        (0..n).fold(Expr::bytes(b"seed".to_vec()), |acc, _| {
            Expr::call(Function::Sha256, vec![acc])
        })
    }

    fn checks(n: usize) -> Expr {
        (0..n).fold(Expr::bool(true), |acc, i| {
            let check = Expr::call(
                Function::Eq,
                vec![
                    Expr::call(Function::Sha256, vec![Expr::reference("x")]),
                    Expr::call(Function::Sha256, vec![Expr::bytes(vec![i as u8])]),
                ],
            );
            Expr::if_else(acc, Expr::call(Function::Not, vec![check]), Expr::bool(false))
        })
    }

    fn evaluate_to_end(expression: &Expr, max: u64) -> (Result<Value, ScriptError>, u64, usize) {
        let evaluator = ScriptEvaluator;
        let mut expression = expression.clone();
        let mut unused = 0;
        let mut total_spent = 0;
        let mut steps = 0;
        loop {
            steps += 1;
            let budget = max + unused;
            match evaluator
                .evaluate(EvaluationMode::Resume { expression: &expression }, budget)
                .unwrap()
            {
                EvaluationResult::Completed { result, spent_complexity } => {
                    return (result, total_spent + spent_complexity, steps)
                }
                EvaluationResult::Partial { expression: rest, unused_complexity } => {
                    total_spent += budget - unused_complexity;
                    unused = unused_complexity;
                    expression = rest;
                }
            }
        }
    }

    #[test]
    fn test_completes_within_budget() {
        let expr = Expr::call(Function::Add, vec![Expr::int(1), Expr::int(2)]);
        let ret = ScriptEvaluator
            .evaluate(EvaluationMode::Resume { expression: &expr }, 10)
            .unwrap();
        assert_eq!(
            ret,
            EvaluationResult::Completed { result: Ok(Value::Int(3)), spent_complexity: 1 }
        );
    }

    #[test]
    fn test_suspends_with_evaluated_prefix() {
        // two hashes fit (400), the third does not
        let expr = hash_chain(3);
        let ret = ScriptEvaluator
            .evaluate(EvaluationMode::Resume { expression: &expr }, 450)
            .unwrap();
        let EvaluationResult::Partial { expression, unused_complexity } = ret else {
            panic!("expected partial result");
        };
        assert_eq!(unused_complexity, 50);
        match expression {
            Expr::Call { function: Function::Sha256, args } => {
                assert!(matches!(args.as_slice(), [Expr::Const(Value::Bytes(b))] if b.len() == 32))
            }
            other => panic!("unexpected remainder {:?}", other),
        }
    }

    #[test]
    fn test_resumed_result_matches_single_step() {
        let expr = hash_chain(10);
        let (single, single_spent, _) = evaluate_to_end(&expr, 10_000);
        let (stepped, stepped_spent, steps) = evaluate_to_end(&expr, 300);
        assert_eq!(single, stepped);
        assert_eq!(single_spent, 2000);
        assert_eq!(stepped_spent, single_spent);
        assert!(steps > 1);
    }

    #[test]
    fn test_let_binding_survives_suspension() {
        let expr = Expr::let_in("x", Expr::bytes(vec![1, 2, 3]), checks(5));
        let first = ScriptEvaluator
            .evaluate(EvaluationMode::Resume { expression: &expr }, 500)
            .unwrap();
        let EvaluationResult::Partial { expression, .. } = first else {
            panic!("expected partial result");
        };
        assert!(matches!(&expression, Expr::Let { name, .. } if name == "x"));

        let (result, _, _) = evaluate_to_end(&expression, 10_000);
        assert_eq!(result, Ok(Value::Bool(true)));
    }

    #[test]
    fn test_throw_completes_with_failure() {
        let expr = Expr::if_else(Expr::bool(true), Expr::Throw("denied".to_string()), Expr::int(0));
        let ret = ScriptEvaluator
            .evaluate(EvaluationMode::Resume { expression: &expr }, 100)
            .unwrap();
        assert_eq!(
            ret,
            EvaluationResult::Completed {
                result: Err(ScriptError::new("denied")),
                spent_complexity: 1
            }
        );
    }

    #[test]
    fn test_first_step_binds_arguments() {
        let mut callables = BTreeMap::new();
        callables.insert(
            "inc".to_string(),
            Callable {
                params: vec!["a".to_string()],
                body: Expr::call(Function::Add, vec![Expr::reference("a"), Expr::reference("bonus")]),
            },
        );
        let dapp = DApp { version: StdLibVersion::V5, callables, verifier: None };
        let call = FunctionCall { function: "inc".to_string(), args: vec![Value::Int(41)] };
        let ret = ScriptEvaluator
            .evaluate(
                EvaluationMode::FirstStep {
                    dapp: &dapp,
                    call: &call,
                    bindings: vec![("bonus".to_string(), Value::Int(1))],
                },
                100,
            )
            .unwrap();
        assert_eq!(
            ret,
            EvaluationResult::Completed { result: Ok(Value::Int(42)), spent_complexity: 3 }
        );

        let unknown = FunctionCall { function: "dec".to_string(), args: vec![] };
        let ret = ScriptEvaluator.evaluate(
            EvaluationMode::FirstStep { dapp: &dapp, call: &unknown, bindings: vec![] },
            100,
        );
        assert_eq!(ret, Err(EvaluationError::CallableNotFound("dec".to_string())));
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        let nested = |depth: usize| {
            (0..depth).fold(Expr::bool(true), |acc, _| Expr::call(Function::Not, vec![acc]))
        };

        let ret = ScriptEvaluator
            .evaluate(EvaluationMode::Resume { expression: &nested(100) }, 1_000)
            .unwrap();
        assert_eq!(
            ret,
            EvaluationResult::Completed { result: Ok(Value::Bool(true)), spent_complexity: 100 }
        );

        let ret = ScriptEvaluator
            .evaluate(EvaluationMode::Resume { expression: &nested(MAX_EXPRESSION_DEPTH + 1) }, 1_000)
            .unwrap();
        let EvaluationResult::Completed { result: Err(error), spent_complexity } = ret else {
            panic!("expected failed evaluation");
        };
        assert!(error.0.contains("nesting"));
        assert_eq!(spent_complexity, 0);
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_deterministic(n in 1usize..20, budget in 0u64..5_000) {
            let expr = Expr::let_in("x", Expr::bytes(vec![9]), checks(n));
            let a = ScriptEvaluator.evaluate(EvaluationMode::Resume { expression: &expr }, budget);
            let b = ScriptEvaluator.evaluate(EvaluationMode::Resume { expression: &expr }, budget);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_unused_complexity_carries_forward(n in 1usize..30, max in 200u64..2_000) {
            let expr = hash_chain(n);
            let (result, spent, _) = evaluate_to_end(&expr, max);
            prop_assert!(result.is_ok());
            prop_assert_eq!(spent, 200 * n as u64);
        }
    }
}
