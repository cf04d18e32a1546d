//! The substitution engine: rewrites variable references across a tape.

use rustc_hash::FxHashMap;

use crate::op::{Op, OpKind, Operand};
use crate::tape::Tape;
use crate::var::Variable;

/// A substitution table mapping old operation ids to new ones.
pub type Subst = FxHashMap<usize, usize>;

/// How bound references are treated by a rebinding pass.
///
/// The public rebinder rewrites every matching reference. The structural
/// editors (`replace`, `remove`) use the stale-only mode: a bound reference
/// whose operation still sits at its claimed position is left alone, so a
/// substitution keyed by low ids cannot disturb live references while stale
/// references to displaced operations are redirected. Unbound references are
/// positional and are rewritten in both modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RebindMode {
    All,
    StaleOnly,
}

/// Rewrite one variable according to `st`.
///
/// Unbound variables have their id replaced in place. Bound variables whose
/// current id is in the table are re-pointed at the tape's operation at the
/// substituted id, converting the effect into a new binding.
pub(crate) fn rebind_var(tape: &Tape, v: &Variable, st: &Subst, mode: RebindMode) {
    let Some(&new_id) = st.get(&v.id()) else { return };
    match v.op() {
        None => v.set_id(new_id),
        Some(op) => {
            if mode == RebindMode::StaleOnly {
                let still_live = tape.get(v.id()).is_some_and(|cur| cur.ptr_eq(&op));
                if still_live {
                    return;
                }
            }
            let target = tape
                .get(new_id)
                .unwrap_or_else(|| {
                    panic!(
                        "rebind target id {new_id} is out of range for a tape of {} operations",
                        tape.len()
                    )
                })
                .clone();
            v.bind_to(&target);
        }
    }
}

/// Rewrite every variable carried by one operation.
///
/// Inputs and constants carry none. Calls rewrite the argument list and a
/// variable function slot. Loops rewrite `parent_inputs`, their references
/// into the enclosing tape; the condition/continue/exit fields are sub-tape
/// scoped and this pass does not descend into sub-tapes.
pub(crate) fn rebind_op(tape: &Tape, op: &Op, st: &Subst, mode: RebindMode) {
    let node = op.node();
    match &node.kind {
        OpKind::Input | OpKind::Const => {}
        OpKind::Call(call) => {
            if let Operand::Var(v) = &call.func {
                rebind_var(tape, v, st, mode);
            }
            for arg in &call.args {
                if let Operand::Var(v) = arg {
                    rebind_var(tape, v, st, mode);
                }
            }
        }
        OpKind::Loop(l) => {
            for v in &l.parent_inputs {
                rebind_var(tape, v, st, mode);
            }
        }
    }
}

impl Tape {
    /// Apply a substitution to every operation, then to `result`, then
    /// notify the context hook.
    pub fn rebind(&mut self, st: &Subst) {
        self.rebind_range(st, 1, self.len());
    }

    /// Apply a substitution to the operations in positions `[from, to]`
    /// (1-based, inclusive, clamped to the tape), then to `result`, then
    /// notify the context hook.
    pub fn rebind_range(&mut self, st: &Subst, from: usize, to: usize) {
        self.rebind_range_mode(st, from, to, RebindMode::All);
    }

    pub(crate) fn rebind_range_mode(
        &mut self,
        st: &Subst,
        from: usize,
        to: usize,
        mode: RebindMode,
    ) {
        let to = to.min(self.len());
        {
            let this: &Tape = &*self;
            for idx in from.max(1)..=to {
                rebind_op(this, &this.ops[idx - 1], st, mode);
            }
            rebind_var(this, &this.result, st, mode);
        }
        self.context.rebind(st);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;
    use crate::op::mkcall;
    use crate::value::Value;

    #[test]
    fn test_empty_subst_is_fixpoint() {
        let mut tape = Tape::new();
        let vs = tape.set_inputs(vec![Value::Unit, Value::Float(3.0)]).unwrap();
        let v = tape.push(mkcall(builtins::mul(), [(&vs[1]).into(), 2.0.into()]).unwrap());
        let before = tape.to_string();
        tape.rebind(&Subst::default());
        assert_eq!(tape.to_string(), before);
        assert_eq!(v.id(), 3);
    }

    #[test]
    fn test_unbound_id_rewrite() {
        let mut tape = Tape::new();
        tape.set_inputs(vec![Value::Float(1.0), Value::Float(2.0)]).unwrap();
        let v = tape.push(
            mkcall(builtins::add(), [Variable::unbound(1).into(), Variable::unbound(2).into()])
                .unwrap(),
        );
        let mut st = Subst::default();
        st.insert(1, 2);
        tape.rebind(&st);
        let op = tape[&v].clone();
        let node = op.node();
        let OpKind::Call(call) = &node.kind else { unreachable!() };
        assert_eq!(call.args[0].as_var().unwrap().id(), 2);
        assert_eq!(call.args[1].as_var().unwrap().id(), 2);
    }

    #[test]
    fn test_bound_rewrite_converts_binding() {
        let mut tape = Tape::new();
        let ins = tape
            .set_inputs(vec![Value::Unit, Value::Float(3.0), Value::Float(5.0)])
            .unwrap();
        let v3 = tape.push(mkcall(builtins::mul(), [(&ins[0]).into(), 2.into()]).unwrap());
        let mut st = Subst::default();
        st.insert(ins[0].id(), ins[1].id());
        tape.rebind(&st);
        let op = tape[&v3].clone();
        let node = op.node();
        let OpKind::Call(call) = &node.kind else { unreachable!() };
        let arg = call.args[0].as_var().unwrap();
        assert_eq!(arg.id(), 2);
        assert!(arg.op().unwrap().ptr_eq(&tape[2]));
    }

    #[test]
    fn test_stale_only_skips_live_bindings() {
        let mut tape = Tape::new();
        let ins = tape.set_inputs(vec![Value::Float(1.0), Value::Float(2.0)]).unwrap();
        let v = tape.push(mkcall(builtins::add(), [(&ins[0]).into(), (&ins[1]).into()]).unwrap());
        let mut st = Subst::default();
        st.insert(1, 2);
        let len = tape.len();
        tape.rebind_range_mode(&st, 1, len, RebindMode::StaleOnly);
        let op = tape[&v].clone();
        let node = op.node();
        let OpKind::Call(call) = &node.kind else { unreachable!() };
        // The binding to input 1 is live, so the stale-only pass leaves it be.
        assert_eq!(call.args[0].as_var().unwrap().id(), 1);
    }
}
