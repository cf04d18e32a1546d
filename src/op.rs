//! Tape operations: the recorded units of a traced computation.
//!
//! An [`Op`] is a cheap clonable handle; clones share identity, and identity
//! is what bound [`Variable`]s track across tape edits. The payload lives in
//! [`OpNode`]: the shared header (`id`, `val`) plus the variant-specific
//! [`OpKind`].

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::TapeError;
use crate::tape::Tape;
use crate::value::Value;
use crate::var::Variable;

/// A call argument or function slot: a variable reference or a literal.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Reference to another operation.
    Var(Variable),
    /// Literal value embedded in the call.
    Lit(Value),
}

impl Operand {
    /// The variable inside, if this operand is a reference.
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Lit(_) => None,
        }
    }
}

impl From<Variable> for Operand {
    fn from(v: Variable) -> Self {
        Operand::Var(v)
    }
}

impl From<&Variable> for Operand {
    fn from(v: &Variable) -> Self {
        Operand::Var(v.clone())
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Lit(v)
    }
}

impl From<i64> for Operand {
    fn from(i: i64) -> Self {
        Operand::Lit(Value::Int(i))
    }
}

impl From<f64> for Operand {
    fn from(x: f64) -> Self {
        Operand::Lit(Value::Float(x))
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Operand::Lit(Value::Bool(b))
    }
}

impl From<crate::value::Func> for Operand {
    fn from(f: crate::value::Func) -> Self {
        Operand::Lit(Value::Func(f))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{v}"),
            Operand::Lit(Value::Func(func)) => write!(f, "{func}"),
            Operand::Lit(val) => write!(f, "{val}"),
        }
    }
}

/// A function application.
#[derive(Debug, Clone)]
pub struct CallOp {
    /// The callee: a literal function value, or a variable resolving to one.
    pub func: Operand,
    /// Ordered argument list.
    pub args: SmallVec<[Operand; 4]>,
}

/// A structured loop over a sub-tape.
///
/// The sub-tape represents one parametric iteration; `cont_vars` feed the
/// next iteration's inputs and `exit_vars` form the tuple returned when the
/// condition goes false.
#[derive(Debug)]
pub struct LoopOp {
    /// Variables in the enclosing tape feeding the loop.
    pub parent_inputs: Vec<Variable>,
    /// Sub-tape variable whose boolean value controls continuation.
    pub condition: Variable,
    /// Sub-tape variables supplying the next iteration's inputs.
    pub cont_vars: Vec<Variable>,
    /// Sub-tape variables whose values are returned on exit, as a tuple.
    pub exit_vars: Vec<Variable>,
    /// One parametric iteration of the loop body.
    pub subtape: Tape,
}

/// Variant payload of an operation.
#[derive(Debug)]
pub enum OpKind {
    /// A tape argument slot; its value is set externally before execution.
    Input,
    /// A value fixed at construction time.
    Const,
    /// A function application.
    Call(CallOp),
    /// A structured loop.
    Loop(Box<LoopOp>),
}

/// Shared operation payload: header fields plus the variant.
#[derive(Debug)]
pub struct OpNode {
    /// Current id; equals the 1-based tape position once adopted, 0 before.
    pub id: usize,
    /// Recorded value. [`Value::Unknown`] until computed.
    pub val: Value,
    /// The operation variant.
    pub kind: OpKind,
}

/// Handle on a tape operation. Clones share identity.
#[derive(Clone)]
pub struct Op {
    node: Rc<RefCell<OpNode>>,
}

impl Op {
    fn from_node(node: OpNode) -> Self {
        Self { node: Rc::new(RefCell::new(node)) }
    }

    /// A fresh input slot with no value.
    pub fn input() -> Self {
        Self::from_node(OpNode { id: 0, val: Value::Unknown, kind: OpKind::Input })
    }

    /// An input slot pre-seeded with a value.
    pub fn input_with(val: Value) -> Self {
        Self::from_node(OpNode { id: 0, val, kind: OpKind::Input })
    }

    /// A constant; the value is fixed at construction.
    pub fn constant(val: Value) -> Self {
        Self::from_node(OpNode { id: 0, val, kind: OpKind::Const })
    }

    /// A call with an explicit recorded value (no eager evaluation).
    pub fn call_with(func: Operand, args: SmallVec<[Operand; 4]>, val: Value) -> Self {
        Self::from_node(OpNode { id: 0, val, kind: OpKind::Call(CallOp { func, args }) })
    }

    /// A structured loop operation.
    pub fn loop_(body: LoopOp) -> Self {
        Self::from_node(OpNode { id: 0, val: Value::Unknown, kind: OpKind::Loop(Box::new(body)) })
    }

    /// Current id (equals tape position once adopted).
    #[inline]
    pub fn id(&self) -> usize {
        self.node.borrow().id
    }

    /// Renumber this operation.
    #[inline]
    pub fn set_id(&self, id: usize) {
        self.node.borrow_mut().id = id;
    }

    /// Recorded value (cloned out).
    #[inline]
    pub fn val(&self) -> Value {
        self.node.borrow().val.clone()
    }

    /// Overwrite the recorded value.
    #[inline]
    pub fn set_val(&self, val: Value) {
        self.node.borrow_mut().val = val;
    }

    /// Immutable view of the payload.
    pub fn node(&self) -> Ref<'_, OpNode> {
        self.node.borrow()
    }

    /// Mutable view of the payload.
    pub fn node_mut(&self) -> RefMut<'_, OpNode> {
        self.node.borrow_mut()
    }

    /// True if `self` and `other` are the same operation.
    #[inline]
    pub fn ptr_eq(&self, other: &Op) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    /// Stable address of the payload, used for identity hashing.
    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.node) as usize
    }

    /// True if this is an input slot.
    pub fn is_input(&self) -> bool {
        matches!(self.node.borrow().kind, OpKind::Input)
    }

    /// True if this is a call.
    pub fn is_call(&self) -> bool {
        matches!(self.node.borrow().kind, OpKind::Call(_))
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.render())
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Op {
    /// Textual form of this operation, as used by the tape renderer.
    pub fn render(&self) -> String {
        let node = self.node.borrow();
        let ty = node.val.type_tag();
        match &node.kind {
            OpKind::Input => format!("inp %{}::{ty}", node.id),
            OpKind::Const => format!("const %{} = {}::{ty}", node.id, node.val),
            OpKind::Call(call) => {
                let args: Vec<String> = call.args.iter().map(|a| a.to_string()).collect();
                format!("%{} = {}({})::{ty}", node.id, call.func, args.join(", "))
            }
            OpKind::Loop(l) => {
                let ins: Vec<String> = l.parent_inputs.iter().map(|v| v.to_string()).collect();
                format!("%{} = Loop({})", node.id, ins.join(", "))
            }
        }
    }
}

/// Resolve an operand to a concrete value without a tape: literals pass
/// through, bound variables read their operation's value.
///
/// Returns `None` for unbound variables and for bound operations whose value
/// is still unknown.
fn concrete(operand: &Operand) -> Option<Value> {
    match operand {
        Operand::Lit(v) => Some(v.clone()),
        Operand::Var(v) => {
            let op = v.op()?;
            let val = op.val();
            if val.is_unknown() {
                None
            } else {
                Some(val)
            }
        }
    }
}

/// Build a call operation, evaluating it eagerly when possible.
///
/// The call is *calculable* when every argument (and the function slot) is
/// either a literal or a bound variable whose operation already holds a
/// concrete value. A calculable call is evaluated immediately and the result
/// recorded; otherwise the value stays [`Value::Unknown`]. Evaluation
/// failures propagate unchanged and no operation is produced.
///
/// The returned operation is un-adopted (`id == 0`); the tape assigns the
/// real id on insertion.
///
/// # Examples
///
/// ```
/// use tapir_rs::{builtins, mkcall, Value};
///
/// let op = mkcall(builtins::mul(), [2.0.into(), 3.0.into()]).unwrap();
/// assert_eq!(op.val(), Value::Float(6.0));
/// ```
pub fn mkcall(
    func: impl Into<Operand>,
    args: impl IntoIterator<Item = Operand>,
) -> Result<Op, TapeError> {
    mkcall_val(func, args, Value::Unknown)
}

/// Build a call operation with an explicit recorded value.
///
/// Passing [`Value::Unknown`] behaves like [`mkcall`]; any other value is
/// stored verbatim and suppresses eager evaluation. This is the escape hatch
/// for symbolic construction and for non-deterministic callees.
pub fn mkcall_val(
    func: impl Into<Operand>,
    args: impl IntoIterator<Item = Operand>,
    val: Value,
) -> Result<Op, TapeError> {
    let func = func.into();
    let args: SmallVec<[Operand; 4]> = args.into_iter().collect();

    let val = if val.is_unknown() {
        match eager_value(&func, &args)? {
            Some(computed) => computed,
            None => Value::Unknown,
        }
    } else {
        val
    };

    Ok(Op::call_with(func, args, val))
}

fn eager_value(
    func: &Operand,
    args: &SmallVec<[Operand; 4]>,
) -> Result<Option<Value>, TapeError> {
    let Some(fval) = concrete(func) else { return Ok(None) };
    let mut resolved = Vec::with_capacity(args.len());
    for arg in args {
        match concrete(arg) {
            Some(v) => resolved.push(v),
            None => return Ok(None),
        }
    }
    let f = fval
        .as_func()
        .ok_or_else(|| TapeError::NotCallable(fval.to_string()))?;
    f.call(&resolved).map(Some)
}
