//! Re-execution of a recorded tape.
//!
//! `play` turns a tape back into a runnable function: input slots are
//! populated from the supplied values, operations execute in strictly
//! ascending position order, and each call's result is written back into its
//! operation. A tape is thus a reusable closure over its input slots; the
//! recorded values are overwritten on every replay.

use crate::builtins;
use crate::config::ExecOptions;
use crate::error::TapeError;
use crate::op::{LoopOp, Op, OpKind, Operand};
use crate::tape::Tape;
use crate::value::Value;
use crate::var::Variable;

impl Tape {
    /// Replay the tape on new inputs with default options.
    ///
    /// # Examples
    ///
    /// ```
    /// use tapir_rs::{builtins, mkcall, Tape, Value};
    ///
    /// let mut tape = Tape::new();
    /// let ins = tape.set_inputs(vec![Value::Float(3.0)]).unwrap();
    /// let y = tape
    ///     .push(mkcall(builtins::mul(), [(&ins[0]).into(), 2.0.into()]).unwrap());
    /// tape.result = y;
    /// assert_eq!(tape.play(vec![Value::Float(5.0)]).unwrap(), Value::Float(10.0));
    /// ```
    pub fn play(&mut self, args: Vec<Value>) -> Result<Value, TapeError> {
        self.play_with(args, &ExecOptions::default())
    }

    /// Replay the tape on new inputs with explicit options.
    pub fn play_with(&mut self, args: Vec<Value>, opts: &ExecOptions) -> Result<Value, TapeError> {
        self.set_inputs(args)?;
        for idx in 1..=self.len() {
            exec_op(self, idx, opts)?;
        }
        let id = self.result.id();
        match self.result.op() {
            Some(op) => Ok(op.val()),
            None => {
                let op = self
                    .get(id)
                    .ok_or(TapeError::OutOfRange { id, len: self.len() })?;
                Ok(op.val())
            }
        }
    }
}

/// Execute the operation at position `idx`.
fn exec_op(tape: &Tape, idx: usize, opts: &ExecOptions) -> Result<(), TapeError> {
    let op = tape[idx].clone();
    if opts.debug {
        eprintln!("[play] {}", op.render());
    }
    enum Todo {
        Nothing,
        Call,
        Loop,
    }
    let todo = match &op.node().kind {
        OpKind::Input | OpKind::Const => Todo::Nothing,
        OpKind::Call(_) => Todo::Call,
        OpKind::Loop(_) => Todo::Loop,
    };
    match todo {
        Todo::Nothing => Ok(()),
        Todo::Call => exec_call(tape, &op, opts),
        Todo::Loop => exec_loop(tape, &op, opts),
    }
}

/// Resolve an operand for execution. A variable whose operation still holds
/// the unknown sentinel names a value that was never computed; reading it is
/// a dataflow error, reported against that operation's id.
fn resolve_known(tape: &Tape, operand: &Operand) -> Result<Value, TapeError> {
    let val = tape.resolve(operand);
    if val.is_unknown() {
        if let Operand::Var(v) = operand {
            return Err(TapeError::UnknownValue(v.id()));
        }
    }
    Ok(val)
}

fn exec_call(tape: &Tape, op: &Op, opts: &ExecOptions) -> Result<(), TapeError> {
    let (fval, argvals) = {
        let node = op.node();
        let OpKind::Call(call) = &node.kind else { unreachable!() };
        let fval = resolve_known(tape, &call.func)?;
        let argvals: Vec<Value> = call
            .args
            .iter()
            .map(|a| resolve_known(tape, a))
            .collect::<Result<_, _>>()?;
        (fval, argvals)
    };
    let func = fval
        .as_func()
        .ok_or_else(|| TapeError::NotCallable(fval.to_string()))?;
    let new_val = func.call(&argvals)?;
    if opts.assert_branches
        && func.id() == builtins::check_branch().id()
        && argvals.len() == 2
        && new_val != argvals[1]
    {
        return Err(TapeError::BranchDiverged(op.id()));
    }
    op.set_val(new_val);
    Ok(())
}

fn exec_loop(tape: &Tape, op: &Op, opts: &ExecOptions) -> Result<(), TapeError> {
    let seed: Vec<Value> = {
        let node = op.node();
        let OpKind::Loop(l) = &node.kind else { unreachable!() };
        l.parent_inputs.iter().map(|v| tape.resolve_var(v)).collect()
    };
    let exit = {
        let mut node = op.node_mut();
        let OpKind::Loop(l) = &mut node.kind else { unreachable!() };
        run_loop(l, &seed, opts)?
    };
    op.set_val(exit);
    Ok(())
}

/// Iterate a loop's sub-tape until the condition operation goes false.
///
/// The sub-tape inputs are seeded from the loop's parent inputs, then the
/// body executes position by position; whenever the cursor passes the end it
/// wraps to the first non-input position and the inputs are refreshed from
/// the continue variables. Termination is only by the condition: a condition
/// that never goes false loops forever.
fn run_loop(l: &mut LoopOp, seed: &[Value], opts: &ExecOptions) -> Result<Value, TapeError> {
    let inputs = l.subtape.inputs();
    if seed.len() != inputs.len() {
        return Err(TapeError::InputArity { expected: inputs.len(), actual: seed.len() });
    }
    for (var, val) in inputs.iter().zip(seed) {
        var.op().expect("input variables are bound").set_val(val.clone());
    }
    let vi0 = inputs.len() + 1;
    if l.subtape.len() < vi0 {
        return Err(TapeError::eval("loop body has no operations"));
    }
    let mut vi = vi0;
    loop {
        exec_op(&l.subtape, vi, opts)?;
        if vi == l.condition.id()
            && l.subtape.resolve_var(&l.condition) == Value::Bool(false)
        {
            let items = l
                .exit_vars
                .iter()
                .map(|ev| exit_value_at_condition(l, &inputs, ev))
                .collect();
            return Ok(Value::Tuple(items));
        }
        vi += 1;
        if vi > l.subtape.len() {
            vi = vi0;
            let fresh: Vec<Value> =
                l.cont_vars.iter().map(|cv| l.subtape.resolve_var(cv)).collect();
            for (var, val) in inputs.iter().zip(fresh) {
                var.op().expect("input variables are bound").set_val(val);
            }
        }
    }
}

/// Value of an exit variable at the moment the condition went false.
///
/// An exit variable that is one of the continue variables names a
/// loop-carried slot: when the condition sits after the slot's definition
/// point, the slot was recomputed this iteration and is read directly;
/// otherwise the carried-in value still lives in the corresponding input
/// slot. An exit variable outside the carried state reads its last computed
/// value.
fn exit_value_at_condition(l: &LoopOp, inputs: &[Variable], ev: &Variable) -> Value {
    match l.cont_vars.iter().position(|cv| cv == ev) {
        Some(idx) => {
            if l.condition.id() > l.cont_vars[idx].id() {
                l.subtape.resolve_var(&l.cont_vars[idx])
            } else {
                inputs[idx].op().expect("input variables are bound").val()
            }
        }
        None => l.subtape.resolve_var(ev),
    }
}
