//! # tapir-rs: a linearized tape IR for traced computations
//!
//! A tracer runs a function on concrete values and records every primitive
//! operation it encounters into a flat, addressable list called a *tape*.
//! This crate is the tape itself and its algebra:
//!
//! - **Data model**: operations (`Input`, `Const`, `Call`, `Loop`) with
//!   identity-carrying handles, and variables that reference them either
//!   positionally or by identity
//! - **Mutation operators**: push, insert, in-place replacement, multi-op
//!   `replace`, and removal, all preserving id↔position and reference
//!   integrity
//! - **Rebinding**: a substitution engine rewriting variable references
//!   across the tape and its context
//! - **Replay**: `play` re-executes a tape on new inputs, including
//!   structured loops over sub-tapes
//! - **Primitivization**: inline every non-primitive call by tracing it and
//!   splicing its body in place
//! - **Signature resolution**: most-specific-first lookup over runtime type
//!   tuples, deciding what counts as primitive
//!
//! The tracer frontend and any compiler backend are external: the frontend
//! produces operations through the tape's mutation API, consumers read them
//! back in order.
//!
//! ## Quick start
//!
//! ```rust
//! use tapir_rs::{builtins, mkcall, Tape, Value};
//!
//! // Record y = x * 2 + 1 by hand (a tracer would do this for you).
//! let mut tape = Tape::new();
//! let ins = tape.set_inputs(vec![Value::Float(3.0)]).unwrap();
//! let y = tape
//!     .push(mkcall(builtins::mul(), [(&ins[0]).into(), 2.0.into()]).unwrap());
//! let z = tape.push(mkcall(builtins::add(), [(&y).into(), 1.0.into()]).unwrap());
//! tape.result = z;
//!
//! // The tape doubles as a reusable function.
//! assert_eq!(tape.play(vec![Value::Float(5.0)]).unwrap(), Value::Float(11.0));
//! assert_eq!(tape.play(vec![Value::Float(0.5)]).unwrap(), Value::Float(2.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
mod config;
mod error;
mod interpreter;
mod op;
mod primitivize;
mod rebind;
mod resolver;
mod tape;
mod value;
mod var;

pub use config::{
    assert_branches, set_assert_branches, set_trace_loops, trace_loops, ExecOptions,
};
pub use error::TapeError;
pub use op::{mkcall, mkcall_val, CallOp, LoopOp, Op, OpKind, OpNode, Operand};
pub use primitivize::Tracer;
pub use rebind::Subst;
pub use resolver::{call_signature, signature_of, FunctionResolver, Signature};
pub use tape::{AsId, Context, Tape, META_VARARG};
pub use value::{Func, FuncId, TypeTag, Value};
pub use var::Variable;
