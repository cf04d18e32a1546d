//! Process-wide execution toggles and the per-call options struct.
//!
//! The toggles configure defaults for every tape in the process; a specific
//! replay can override them by passing an explicit [`ExecOptions`].

use std::sync::atomic::{AtomicBool, Ordering};

static TRACE_LOOPS: AtomicBool = AtomicBool::new(false);
static ASSERT_BRANCHES: AtomicBool = AtomicBool::new(false);

/// Ask tracers to record loops structurally (a Loop operation over a
/// sub-tape) instead of unrolling them.
///
/// With unrolling, replaying the tape on inputs that iterate a different
/// number of times silently returns the wrong answer; that is documented
/// behavior of unrolled traces, not an error.
pub fn set_trace_loops(on: bool) {
    TRACE_LOOPS.store(on, Ordering::Relaxed);
}

/// Current loop-tracing default.
pub fn trace_loops() -> bool {
    TRACE_LOOPS.load(Ordering::Relaxed)
}

/// Make replays verify recorded branch conditions: a condition whose fresh
/// value differs from the trace-time value fails with
/// [`TapeError::BranchDiverged`], flagging that the input followed a
/// different branch than the trace.
///
/// [`TapeError::BranchDiverged`]: crate::TapeError::BranchDiverged
pub fn set_assert_branches(on: bool) {
    ASSERT_BRANCHES.store(on, Ordering::Relaxed);
}

/// Current branch-assertion default.
pub fn assert_branches() -> bool {
    ASSERT_BRANCHES.load(Ordering::Relaxed)
}

/// Options for one replay of a tape.
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    /// Print each operation to stderr before executing it.
    pub debug: bool,
    /// Verify recorded branch conditions (see [`set_assert_branches`]).
    pub assert_branches: bool,
}

impl Default for ExecOptions {
    /// Defaults read the process-wide toggles.
    fn default() -> Self {
        Self { debug: false, assert_branches: assert_branches() }
    }
}
