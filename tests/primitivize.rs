//! Expanding non-primitive calls in place.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use tapir_rs::{builtins, mkcall, FuncId, Tape, TapeError, Tracer, Value};

type Rule = Rc<dyn Fn(&Value, &[Value]) -> Result<Tape, TapeError>>;

/// A table-driven stand-in for the tracer frontend: each known function maps
/// to a recipe producing its traced tape. Inputs follow the tracer
/// convention: `(callee, args…)`.
#[derive(Default)]
struct RuleTracer {
    rules: FxHashMap<FuncId, Rule>,
}

impl RuleTracer {
    fn rule(
        &mut self,
        f: &tapir_rs::Func,
        rule: impl Fn(&Value, &[Value]) -> Result<Tape, TapeError> + 'static,
    ) {
        self.rules.insert(f.id(), Rc::new(rule));
    }
}

impl Tracer for RuleTracer {
    fn trace(&mut self, func: &Value, args: &[Value]) -> Result<Tape, TapeError> {
        let f = func
            .as_func()
            .ok_or_else(|| TapeError::NotCallable(func.to_string()))?;
        let rule = self
            .rules
            .get(&f.id())
            .cloned()
            .ok_or_else(|| TapeError::eval(format!("no trace rule for {f}")))?;
        rule(func, args)
    }
}

fn f_of_x() -> tapir_rs::Func {
    // f(x) = 2x - 1
    tapir_rs::Func::new("f", |args| {
        let two_x = builtins::mul().call(&[Value::Float(2.0), args[0].clone()])?;
        builtins::sub().call(&[two_x, Value::Float(1.0)])
    })
}

fn trace_rule_for_f(func: &Value, args: &[Value]) -> Result<Tape, TapeError> {
    let mut sub = Tape::new();
    let ins = sub.set_inputs(vec![func.clone(), args[0].clone()])?;
    let m = sub.push(mkcall(builtins::mul(), [2.0.into(), (&ins[1]).into()])?);
    let s = sub.push(mkcall(builtins::sub(), [(&m).into(), 1.0.into()])?);
    sub.result = s;
    Ok(sub)
}

#[test]
fn expand_one_level() {
    let f = f_of_x();

    // g(x) = f(x) + 5, recorded with f unexpanded.
    let mut tape = Tape::new();
    let ins = tape.set_inputs(vec![Value::Unit, Value::Float(3.0)]).unwrap();
    let y = tape.push(mkcall(f.clone(), [(&ins[1]).into()]).unwrap());
    assert_eq!(tape[&y].val(), Value::Float(5.0));
    let z = tape.push(mkcall(builtins::add(), [(&y).into(), 5.0.into()]).unwrap());
    tape.result = z.clone();

    let mut tracer = RuleTracer::default();
    tracer.rule(&f, trace_rule_for_f);
    tape.primitivize(&mut tracer, &builtins::primitives()).unwrap();

    assert_eq!(tape.len(), 5);
    let rendered = tape.to_string();
    assert!(rendered.contains("%3 = mul(2.0, %2)::Float"), "got:\n{rendered}");
    assert!(rendered.contains("%4 = sub(%3, 1.0)::Float"), "got:\n{rendered}");
    assert!(rendered.contains("%5 = add(%4, 5.0)::Float"), "got:\n{rendered}");
    assert_eq!(z.id(), 5);

    // The expanded tape still computes g.
    let out = tape.play(vec![Value::Unit, Value::Float(10.0)]).unwrap();
    assert_eq!(out, Value::Float(24.0));
}

#[test]
fn primitives_are_left_alone() {
    let mut tape = Tape::new();
    let ins = tape.set_inputs(vec![Value::Unit, Value::Float(3.0)]).unwrap();
    let y = tape.push(mkcall(builtins::mul(), [(&ins[1]).into(), 2.0.into()]).unwrap());
    tape.result = y;

    let before = tape.to_string();
    let mut tracer = RuleTracer::default();
    tape.primitivize(&mut tracer, &builtins::primitives()).unwrap();
    assert_eq!(tape.to_string(), before);
}

#[test]
fn unresolvable_callee_is_skipped() {
    // A call through a variable whose value is unknown cannot be traced and
    // is treated like a primitive.
    let mut tape = Tape::new();
    let ins = tape.set_inputs(vec![Value::Unknown, Value::Float(3.0)]).unwrap();
    let y = tape.push(mkcall(&ins[0], [(&ins[1]).into()]).unwrap());
    tape.result = y;

    let before = tape.len();
    let mut tracer = RuleTracer::default();
    tape.primitivize(&mut tracer, &builtins::primitives()).unwrap();
    assert_eq!(tape.len(), before);
}

#[test]
fn missing_rule_surfaces() {
    let f = f_of_x();
    let mut tape = Tape::new();
    let ins = tape.set_inputs(vec![Value::Unit, Value::Float(1.0)]).unwrap();
    let y = tape.push(mkcall(f, [(&ins[1]).into()]).unwrap());
    tape.result = y;

    let mut tracer = RuleTracer::default();
    let err = tape.primitivize(&mut tracer, &builtins::primitives()).unwrap_err();
    assert!(matches!(err, TapeError::Eval(_)));
}

#[test]
fn resolver_decides_primitive() {
    // Marking f itself primitive suppresses expansion without a tracer rule.
    let f = f_of_x();
    let mut primitives = builtins::primitives();
    primitives.set(
        tapir_rs::Signature::vararg(&f, [tapir_rs::TypeTag::Any]),
        (),
    );
    assert!(!primitives.is_empty());

    let mut tape = Tape::new();
    let ins = tape.set_inputs(vec![Value::Unit, Value::Float(1.0)]).unwrap();
    let y = tape.push(mkcall(f, [(&ins[1]).into()]).unwrap());
    tape.result = y;

    let mut tracer = RuleTracer::default();
    tape.primitivize(&mut tracer, &primitives).unwrap();
    assert_eq!(tape.len(), 3);
}
