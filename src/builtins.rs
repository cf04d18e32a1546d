//! Host function library: the primitive vocabulary used by traces and tests.
//!
//! Every builtin is an identity-stable [`Func`]: the first access constructs
//! it, later accesses return clones sharing the same [`FuncId`], so resolver
//! groups and recorded calls agree on identity. Arithmetic promotes
//! `Int`/`Float` mixtures to `Float`.
//!
//! [`FuncId`]: crate::FuncId

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::error::TapeError;
use crate::resolver::{FunctionResolver, Signature};
use crate::value::{Func, TypeTag, Value};

thread_local! {
    static REGISTRY: RefCell<FxHashMap<&'static str, Func>> =
        RefCell::new(FxHashMap::default());
}

fn cached(name: &'static str, build: fn() -> Func) -> Func {
    REGISTRY.with(|r| r.borrow_mut().entry(name).or_insert_with(build).clone())
}

fn arity(name: &str, args: &[Value], n: usize) -> Result<(), TapeError> {
    if args.len() != n {
        return Err(TapeError::eval(format!(
            "{name} expects {n} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

fn numeric_pair(name: &str, args: &[Value]) -> Result<(Value, Value), TapeError> {
    arity(name, args, 2)?;
    for a in args {
        if a.as_f64().is_none() {
            return Err(TapeError::eval(format!("{name} expects numbers, got {a}")));
        }
    }
    Ok((args[0].clone(), args[1].clone()))
}

fn binary_arith(
    name: &'static str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> impl Fn(&[Value]) -> Result<Value, TapeError> {
    move |args| {
        let (a, b) = numeric_pair(name, args)?;
        Ok(match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(int_op(x, y)),
            // Mixtures promote to float; numeric_pair already screened.
            (x, y) => Value::Float(float_op(x.as_f64().unwrap(), y.as_f64().unwrap())),
        })
    }
}

fn comparison(
    name: &'static str,
    cmp: fn(f64, f64) -> bool,
) -> impl Fn(&[Value]) -> Result<Value, TapeError> {
    move |args| {
        let (a, b) = numeric_pair(name, args)?;
        Ok(Value::Bool(cmp(a.as_f64().unwrap(), b.as_f64().unwrap())))
    }
}

/// Addition.
pub fn add() -> Func {
    cached("add", || Func::new("add", binary_arith("add", |a, b| a + b, |a, b| a + b)))
}

/// Subtraction.
pub fn sub() -> Func {
    cached("sub", || Func::new("sub", binary_arith("sub", |a, b| a - b, |a, b| a - b)))
}

/// Multiplication.
pub fn mul() -> Func {
    cached("mul", || Func::new("mul", binary_arith("mul", |a, b| a * b, |a, b| a * b)))
}

/// Division; always produces a float.
pub fn div() -> Func {
    cached("div", || {
        Func::new("div", |args| {
            let (a, b) = numeric_pair("div", args)?;
            Ok(Value::Float(a.as_f64().unwrap() / b.as_f64().unwrap()))
        })
    })
}

/// Numeric negation.
pub fn neg() -> Func {
    cached("neg", || {
        Func::new("neg", |args| {
            arity("neg", args, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(x) => Ok(Value::Float(-x)),
                other => Err(TapeError::eval(format!("neg expects a number, got {other}"))),
            }
        })
    })
}

/// Numeric `>`.
pub fn gt() -> Func {
    cached("gt", || Func::new("gt", comparison("gt", |a, b| a > b)))
}

/// Numeric `<`.
pub fn lt() -> Func {
    cached("lt", || Func::new("lt", comparison("lt", |a, b| a < b)))
}

/// Numeric `>=`.
pub fn ge() -> Func {
    cached("ge", || Func::new("ge", comparison("ge", |a, b| a >= b)))
}

/// Numeric `<=`.
pub fn le() -> Func {
    cached("le", || Func::new("le", comparison("le", |a, b| a <= b)))
}

/// Structural equality on values.
pub fn eq_of() -> Func {
    cached("eq", || {
        Func::new("eq", |args| {
            arity("eq", args, 2)?;
            Ok(Value::Bool(args[0] == args[1]))
        })
    })
}

/// Boolean negation.
pub fn not_of() -> Func {
    cached("not", || {
        Func::new("not", |args| {
            arity("not", args, 1)?;
            match &args[0] {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(TapeError::eval(format!("not expects a bool, got {other}"))),
            }
        })
    })
}

/// `tuple_get(t, i)`: the `i`-th element of a tuple, 0-based.
pub fn tuple_get() -> Func {
    cached("tuple_get", || {
        Func::new("tuple_get", |args| {
            arity("tuple_get", args, 2)?;
            let (Value::Tuple(items), Value::Int(i)) = (&args[0], &args[1]) else {
                return Err(TapeError::eval(format!(
                    "tuple_get expects (tuple, int), got ({}, {})",
                    args[0], args[1]
                )));
            };
            let idx = usize::try_from(*i)
                .ok()
                .filter(|idx| *idx < items.len())
                .ok_or_else(|| {
                    TapeError::eval(format!(
                        "tuple_get index {i} out of range for a tuple of {}",
                        items.len()
                    ))
                })?;
            Ok(items[idx].clone())
        })
    })
}

/// Pack the arguments into a tuple.
pub fn tuple_make() -> Func {
    cached("tuple", || Func::new("tuple", |args| Ok(Value::Tuple(args.to_vec()))))
}

/// Branch guard: `check_branch(actual, expected)` passes `actual` through.
///
/// Recorded under conditional control flow with the trace-time truth value as
/// the literal second argument. Divergence is enforced by the interpreter
/// when branch assertions are enabled, not by the function itself.
pub fn check_branch() -> Func {
    cached("check_branch", || {
        Func::new("check_branch", |args| {
            arity("check_branch", args, 2)?;
            Ok(args[0].clone())
        })
    })
}

/// A resolver marking every builtin as primitive at any arity.
pub fn primitives() -> FunctionResolver<()> {
    let mut r = FunctionResolver::new();
    for f in [
        add(),
        sub(),
        mul(),
        div(),
        neg(),
        gt(),
        lt(),
        ge(),
        le(),
        eq_of(),
        not_of(),
        tuple_get(),
        tuple_make(),
        check_branch(),
    ] {
        r.set(Signature::vararg(&f, [TypeTag::Any]), ());
    }
    r
}
