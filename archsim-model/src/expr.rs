// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Expressions used for demand amounts, loop counts, branch guards and call
//! parameters, together with the variable bindings they are evaluated
//! against.

use std::collections::HashMap;
use std::fmt;

use archsim_engine::sim_error;
use archsim_engine::types::SimError;

/// A typed value produced by evaluating an [`Expr`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl Value {
    pub fn as_f64(&self) -> Result<f64, SimError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Double(d) => Ok(*d),
            Value::Bool(_) => sim_error!(format!("Expected a number, found {self}")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, SimError> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => sim_error!(format!("Expected a boolean, found {self}")),
        }
    }

    /// Interpret the value as a non-negative count.
    pub fn as_count(&self) -> Result<u64, SimError> {
        match self {
            Value::Int(i) if *i >= 0 => Ok(*i as u64),
            Value::Double(d) if *d >= 0.0 && d.fract() == 0.0 => Ok(*d as u64),
            _ => sim_error!(format!("Expected a non-negative integer, found {self}")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// A stochastic/parametric expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    #[must_use]
    pub fn int(value: i64) -> Self {
        Expr::Literal(Value::Int(value))
    }

    #[must_use]
    pub fn double(value: f64) -> Self {
        Expr::Literal(Value::Double(value))
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        Expr::Literal(Value::Bool(value))
    }

    #[must_use]
    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }
}

/// A stack of variable frames.
///
/// Lookups search from the innermost frame outwards; assignments always go
/// to the innermost frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings {
    frames: Vec<HashMap<String, Value>>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }
}

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }

    pub fn set(&mut self, name: &str, value: Value) {
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) -> Option<HashMap<String, Value>> {
        self.frames.pop()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// A copy of these bindings with a new innermost frame holding `values`.
    #[must_use]
    pub fn with_frame(&self, values: &[(String, Value)]) -> Self {
        let mut bindings = self.clone();
        bindings.push_frame();
        for (name, value) in values {
            bindings.set(name, *value);
        }
        bindings
    }
}

/// Evaluates expressions against a set of bindings.
pub trait Evaluate {
    fn evaluate(&self, expr: &Expr, bindings: &Bindings) -> Result<Value, SimError>;

    fn evaluate_f64(&self, expr: &Expr, bindings: &Bindings) -> Result<f64, SimError> {
        self.evaluate(expr, bindings)?.as_f64()
    }

    fn evaluate_bool(&self, expr: &Expr, bindings: &Bindings) -> Result<bool, SimError> {
        self.evaluate(expr, bindings)?.as_bool()
    }

    fn evaluate_count(&self, expr: &Expr, bindings: &Bindings) -> Result<u64, SimError> {
        self.evaluate(expr, bindings)?.as_count()
    }
}

/// The default evaluator for [`Expr`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEvaluator;

impl ExprEvaluator {
    fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, SimError> {
        if let (Value::Int(l), Value::Int(r)) = (lhs, rhs) {
            let result = match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        return sim_error!("Integer division by zero");
                    }
                    l.checked_div(r)
                }
                _ => return sim_error!(format!("{op:?} is not an arithmetic operator")),
            };
            return match result {
                Some(value) => Ok(Value::Int(value)),
                None => sim_error!(format!("Integer overflow evaluating {l} {op:?} {r}")),
            };
        }

        let l = lhs.as_f64()?;
        let r = rhs.as_f64()?;
        let value = match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
            _ => return sim_error!(format!("{op:?} is not an arithmetic operator")),
        };
        Ok(Value::Double(value))
    }

    fn comparison(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, SimError> {
        if let (Value::Bool(l), Value::Bool(r)) = (lhs, rhs) {
            return match op {
                BinaryOp::Eq => Ok(Value::Bool(l == r)),
                BinaryOp::Ne => Ok(Value::Bool(l != r)),
                _ => sim_error!(format!("Cannot order booleans with {op:?}")),
            };
        }

        let l = lhs.as_f64()?;
        let r = rhs.as_f64()?;
        let result = match op {
            BinaryOp::Lt => l < r,
            BinaryOp::Le => l <= r,
            BinaryOp::Gt => l > r,
            BinaryOp::Ge => l >= r,
            BinaryOp::Eq => l == r,
            BinaryOp::Ne => l != r,
            _ => return sim_error!(format!("{op:?} is not a comparison operator")),
        };
        Ok(Value::Bool(result))
    }
}

impl Evaluate for ExprEvaluator {
    fn evaluate(&self, expr: &Expr, bindings: &Bindings) -> Result<Value, SimError> {
        match expr {
            Expr::Literal(value) => Ok(*value),
            Expr::Var(name) => match bindings.get(name) {
                Some(value) => Ok(value),
                None => sim_error!(format!("Unbound variable '{name}'")),
            },
            Expr::Not(inner) => Ok(Value::Bool(!self.evaluate_bool(inner, bindings)?)),
            Expr::Binary(op, lhs, rhs) => match op {
                BinaryOp::And => Ok(Value::Bool(
                    self.evaluate_bool(lhs, bindings)? && self.evaluate_bool(rhs, bindings)?,
                )),
                BinaryOp::Or => Ok(Value::Bool(
                    self.evaluate_bool(lhs, bindings)? || self.evaluate_bool(rhs, bindings)?,
                )),
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                    let l = self.evaluate(lhs, bindings)?;
                    let r = self.evaluate(rhs, bindings)?;
                    Self::arithmetic(*op, l, r)
                }
                BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne => {
                    let l = self.evaluate(lhs, bindings)?;
                    let r = self.evaluate(rhs, bindings)?;
                    Self::comparison(*op, l, r)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frame_shadows_outer() {
        let mut bindings = Bindings::new();
        bindings.set("n", Value::Int(1));
        let inner = bindings.with_frame(&[("n".to_string(), Value::Int(2))]);
        assert_eq!(inner.get("n"), Some(Value::Int(2)));
        assert_eq!(inner.depth(), 2);
        assert_eq!(bindings.get("n"), Some(Value::Int(1)));

        let mut popped = inner.clone();
        popped.pop_frame();
        assert_eq!(popped.get("n"), Some(Value::Int(1)));
    }

    #[test]
    fn evaluate_mixed_arithmetic() {
        let mut bindings = Bindings::new();
        bindings.set("size", Value::Int(4));
        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::var("size"),
            Expr::binary(BinaryOp::Add, Expr::double(0.5), Expr::int(1)),
        );
        let value = ExprEvaluator.evaluate(&expr, &bindings).unwrap();
        assert_eq!(value, Value::Double(6.0));
    }

    #[test]
    fn operator_of_the_wrong_family_is_an_error() {
        let (one, two) = (Value::Int(1), Value::Double(2.0));
        assert!(ExprEvaluator::arithmetic(BinaryOp::Lt, one, one).is_err());
        assert!(ExprEvaluator::arithmetic(BinaryOp::And, one, two).is_err());
        assert!(ExprEvaluator::comparison(BinaryOp::Add, one, two).is_err());
    }

    #[test]
    fn evaluate_guard() {
        let mut bindings = Bindings::new();
        bindings.set("hit", Value::Bool(false));
        bindings.set("n", Value::Int(3));
        let guard = Expr::binary(
            BinaryOp::Or,
            Expr::var("hit"),
            Expr::binary(BinaryOp::Gt, Expr::var("n"), Expr::int(2)),
        );
        assert!(ExprEvaluator.evaluate_bool(&guard, &bindings).unwrap());
        assert!(
            !ExprEvaluator
                .evaluate_bool(&Expr::not(guard), &bindings)
                .unwrap()
        );
    }

    #[test]
    fn evaluation_errors() {
        let bindings = Bindings::new();
        assert!(ExprEvaluator.evaluate(&Expr::var("missing"), &bindings).is_err());
        assert!(
            ExprEvaluator
                .evaluate(
                    &Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(0)),
                    &bindings
                )
                .is_err()
        );
        assert!(ExprEvaluator.evaluate_count(&Expr::int(-1), &bindings).is_err());
        assert!(ExprEvaluator.evaluate_count(&Expr::double(1.5), &bindings).is_err());
        assert_eq!(
            ExprEvaluator.evaluate_count(&Expr::double(3.0), &bindings),
            Ok(3)
        );
    }
}
