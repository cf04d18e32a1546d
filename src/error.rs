//! Error type shared across the crate.

use thiserror::Error;

/// Errors surfaced by tape construction, mutation, and replay.
///
/// All errors are synchronous and none is retried internally. Host function
/// failures raised during eager evaluation or replay propagate unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TapeError {
    /// `set_inputs` was called with a value count that conflicts with the
    /// tape's declared arity (and the tape is not vararg).
    #[error("expected {expected} input values, got {actual}")]
    InputArity {
        /// Number of declared input slots.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// An operation id addressed a position outside the tape.
    #[error("operation id {id} is out of range for a tape of {len} operations")]
    OutOfRange {
        /// The offending id.
        id: usize,
        /// Current tape length.
        len: usize,
    },

    /// A call's function slot resolved to something that is not callable.
    #[error("value `{0}` is not callable")]
    NotCallable(String),

    /// An operation's value was needed but still unknown.
    #[error("operation %{0} has no concrete value")]
    UnknownValue(usize),

    /// A recorded branch condition produced a different truth value than the
    /// one observed at trace time. Raised only when branch assertions are on.
    #[error("branch condition at %{0} diverged from the recorded trace")]
    BranchDiverged(usize),

    /// A host function failed.
    #[error("{0}")]
    Eval(String),
}

impl TapeError {
    /// Shorthand for a host-function evaluation error.
    pub fn eval(msg: impl Into<String>) -> Self {
        TapeError::Eval(msg.into())
    }
}
