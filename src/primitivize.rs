//! Primitivization: inline every non-primitive call on a tape.
//!
//! A non-primitive call is re-traced through the external tracer and the
//! resulting sub-tape body is spliced in place of the call, with the body's
//! references to the dropped sub-tape inputs threaded back to the caller's
//! arguments. The pass is a local rewrite built entirely from the tape
//! algebra (`replace` plus a substitution table).

use crate::error::TapeError;
use crate::op::{Op, OpKind, Operand};
use crate::rebind::{rebind_op, RebindMode, Subst};
use crate::resolver::{call_signature, FunctionResolver};
use crate::tape::Tape;
use crate::value::Value;
use crate::var::Variable;

/// The seam to the tracer frontend: runs `func` on concrete argument values
/// and returns the recorded tape.
///
/// By convention the returned tape's input slots are `(func, args...)`: the
/// callee itself occupies input 1, so a traced call of `n` arguments yields
/// `n + 1` inputs.
pub trait Tracer {
    /// Trace one call.
    fn trace(&mut self, func: &Value, args: &[Value]) -> Result<Tape, TapeError>;
}

impl Tape {
    /// Replace every non-primitive call with the body produced by tracing it.
    ///
    /// Iterates over a snapshot of the current operations; operations spliced
    /// in by the pass itself are not revisited. Calls whose function slot
    /// does not resolve to a concrete function are left in place, like
    /// primitives.
    pub fn primitivize(
        &mut self,
        tracer: &mut dyn Tracer,
        primitives: &FunctionResolver<()>,
    ) -> Result<(), TapeError> {
        let snapshot: Vec<Variable> = self.iter().map(Variable::bound).collect();
        for v in snapshot {
            let op = v.op().expect("snapshot variables are bound");
            if !op.is_call() {
                continue;
            }
            let Ok(sig) = call_signature(self, &op) else { continue };
            if primitives.contains(&sig) {
                continue;
            }
            self.expand_call(&v, &op, tracer)?;
        }
        Ok(())
    }

    fn expand_call(
        &mut self,
        v: &Variable,
        op: &Op,
        tracer: &mut dyn Tracer,
    ) -> Result<(), TapeError> {
        // fargs = (func, args…): operands in sub-tape input order.
        let fargs: Vec<Operand> = {
            let node = op.node();
            let OpKind::Call(call) = &node.kind else { unreachable!() };
            std::iter::once(call.func.clone()).chain(call.args.iter().cloned()).collect()
        };
        let fvals: Vec<Value> = fargs.iter().map(|a| self.resolve(a)).collect();

        let sub = tracer.trace(&fvals[0], &fvals[1..])?;
        let n_inputs = sub.num_inputs();
        let body: Vec<Op> = sub.iter().skip(n_inputs).cloned().collect();
        if body.is_empty() {
            return Err(TapeError::eval(format!(
                "traced body of {} is empty",
                fvals[0]
            )));
        }

        // Sub-tape input position -> the caller's argument id, for every
        // argument that is a variable.
        let old_new: Subst = fargs
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_var().map(|var| (i + 1, var.id())))
            .collect();

        // The body still references the dropped sub-tape inputs; re-point
        // those references into this tape before splicing. Body-internal
        // references are untouched: their ids sit above the input range.
        for bop in &body {
            rebind_op(self, bop, &old_new, RebindMode::StaleOnly);
        }

        let rebind_to = body.len();
        self.replace(v, body, rebind_to, &old_new);
        Ok(())
    }
}
