//! Structural tape edits: rebinding, in-place replacement, multi-op
//! replacement, and removal, checked against literal end-to-end expectations.

use tapir_rs::{builtins, mkcall, mkcall_val, Op, OpKind, Subst, Tape, Value, Variable};

fn ids_match_positions(tape: &Tape) -> bool {
    tape.iter().enumerate().all(|(i, op)| op.id() == i + 1)
}

fn call_arg(tape: &Tape, id: usize, arg: usize) -> Variable {
    let op = tape[id].clone();
    let node = op.node();
    let OpKind::Call(call) = &node.kind else { panic!("%{id} is not a call") };
    call.args[arg].as_var().expect("argument is a variable").clone()
}

/// Inputs are conventionally (callee slot, args…); the callee slot is unit.
fn three_inputs(a: f64, b: f64) -> (Tape, Vec<Variable>) {
    let mut tape = Tape::new();
    let ins = tape
        .set_inputs(vec![Value::Unit, Value::Float(a), Value::Float(b)])
        .unwrap();
    (tape, ins)
}

#[test]
fn rebind_single_reference() {
    let (mut tape, ins) = three_inputs(3.0, 5.0);
    let (v1, v2) = (&ins[1], &ins[2]);
    let v3 = tape.push(mkcall(builtins::mul(), [v1.into(), 2.into()]).unwrap());

    let mut st = Subst::default();
    st.insert(v1.id(), v2.id());
    tape.rebind(&st);

    assert_eq!(call_arg(&tape, v3.id(), 0).id(), v2.id());
}

#[test]
fn mkcall_eagerness() {
    let (_tape, ins) = three_inputs(3.0, 5.0);
    let v1 = &ins[1];

    // Calculable: every argument is a literal or a bound variable with a
    // concrete value.
    let eager = mkcall(builtins::mul(), [2.0.into(), v1.into()]).unwrap();
    assert_eq!(eager.val(), Value::Float(6.0));

    // An unbound argument suppresses evaluation.
    let symbolic = mkcall(builtins::mul(), [Variable::unbound(100).into(), v1.into()]).unwrap();
    assert_eq!(symbolic.val(), Value::Unknown);

    // An explicit value is stored verbatim.
    let pinned =
        mkcall_val(builtins::mul(), [2.0.into(), v1.into()], Value::Float(10.0)).unwrap();
    assert_eq!(pinned.val(), Value::Float(10.0));
}

#[test]
fn replace_and_rebind() {
    let (mut tape, ins) = three_inputs(2.0, 5.0);
    let (v2, v3) = (&ins[1], &ins[2]);
    let v4 = tape.push(mkcall(builtins::mul(), [v2.into(), v3.into()]).unwrap());
    assert_eq!(tape[&v4].val(), Value::Float(10.0));

    // Insert two increments before the product; the product op shifts to 6
    // and v4 follows it there.
    let inserted = tape.insert(
        4,
        vec![
            mkcall(builtins::add(), [v2.into(), 1.0.into()]).unwrap(),
            mkcall(builtins::add(), [v3.into(), 1.0.into()]).unwrap(),
        ],
    );
    assert_eq!(v4.id(), 6);

    // In-place overwrite through the (moved) variable.
    tape.set(
        &v4,
        mkcall(builtins::mul(), [(&inserted[0]).into(), (&inserted[1]).into()]).unwrap(),
    );
    assert_eq!(tape[&v4].val(), Value::Float(18.0));

    // Replace position 4 with two fresh ops, redirecting tail users of the
    // replaced op to the second of them.
    let new1 = mkcall(builtins::mul(), [Variable::unbound(2).into(), 2.into()]).unwrap();
    let op1_ref = Variable::bound(&new1);
    let new2 = mkcall(builtins::add(), [op1_ref.into(), 1.into()]).unwrap();
    let chosen = tape.replace(4usize, vec![new1, new2], 2, &Subst::default());

    assert_eq!(tape.len(), 7);
    assert_eq!(chosen.id(), 5);
    assert_eq!(call_arg(&tape, 7, 0).id(), chosen.id());
    assert!(ids_match_positions(&tape));
}

#[test]
fn remove_with_rebind() {
    let (mut tape, ins) = three_inputs(2.0, 3.0);
    let (v2, v3) = (&ins[1], &ins[2]);
    let v4 = tape.push(mkcall(builtins::mul(), [v2.into(), v3.into()]).unwrap());
    let v5 = tape.push(mkcall(builtins::add(), [v2.into(), 1.0.into()]).unwrap());
    let _v6 = tape.push(mkcall(builtins::mul(), [(&v5).into(), 2.0.into()]).unwrap());
    let _v7 = tape.push(mkcall(builtins::div(), [(&v5).into(), (&v4).into()]).unwrap());

    tape.remove(5usize, Some(1));

    assert_eq!(tape.len(), 6);
    assert_eq!(call_arg(&tape, 5, 0).id(), 1);
    assert_eq!(call_arg(&tape, 6, 0).id(), 1);
    // The reference that did not point at the removed op is untouched.
    assert_eq!(call_arg(&tape, 6, 1).id(), 4);
    assert!(ids_match_positions(&tape));
}

#[test]
fn remove_tail_without_rebind() {
    let (mut tape, ins) = three_inputs(2.0, 3.0);
    let v4 = tape.push(mkcall(builtins::mul(), [(&ins[1]).into(), 2.0.into()]).unwrap());
    tape.remove(&v4, None);
    assert_eq!(tape.len(), 3);
    assert!(ids_match_positions(&tape));
}

#[test]
fn bound_variable_survives_renumbering() {
    let (mut tape, ins) = three_inputs(1.0, 2.0);
    let tail = tape.push(mkcall(builtins::add(), [(&ins[1]).into(), (&ins[2]).into()]).unwrap());
    let tracked = tape.bound(&Variable::unbound(tail.id()));
    tape.insert(4, vec![Op::constant(Value::Int(0)), Op::constant(Value::Int(1))]);
    assert_eq!(tracked.id(), 6);
    assert!(tracked.op().unwrap().ptr_eq(&tape[6]));
}
