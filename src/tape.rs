//! The tape: an ordered, addressable container of operations.
//!
//! The tape owns its operations and their identity. Every structural edit
//! goes through operators that keep three things consistent: the id of each
//! operation equals its 1-based position, bound variables keep tracking the
//! operations they were bound to, and `result` keeps addressing a real
//! operation.
//!
//! A tape is a single-threaded structure: operations and variables
//! are `Rc`-shared handles, and replay mutates recorded values in place. To
//! run the same computation from two threads, build a tape per thread.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TapeError;
use crate::op::Op;
use crate::rebind::Subst;
use crate::value::Value;
use crate::var::Variable;

static TAPE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Meta key marking the tape as variadic: when truthy, the last declared
/// input absorbs the tail of the supplied values as a tuple.
pub const META_VARARG: &str = "isva";

/// Application-defined payload travelling with a tape.
///
/// The core never inspects the context; its only interaction point is the
/// [`Context::rebind`] hook, invoked after every rebinding pass so contexts
/// holding operation ids can stay coherent. The default implementation does
/// nothing.
pub trait Context: Any {
    /// Notification that `st` was applied to the owning tape.
    fn rebind(&mut self, st: &Subst) {
        let _ = st;
    }
}

impl Context for HashMap<String, Value> {}
impl Context for () {}

/// Types that address a tape position: a plain id, a variable, or an
/// operation (both contributing their current id).
pub trait AsId {
    /// The 1-based position this value addresses right now.
    fn as_id(&self) -> usize;
}

impl AsId for usize {
    fn as_id(&self) -> usize {
        *self
    }
}

impl AsId for Variable {
    fn as_id(&self) -> usize {
        self.id()
    }
}

impl AsId for &Variable {
    fn as_id(&self) -> usize {
        self.id()
    }
}

impl AsId for Op {
    fn as_id(&self) -> usize {
        self.id()
    }
}

impl AsId for &Op {
    fn as_id(&self) -> usize {
        self.id()
    }
}

/// Linearized list of operations: the IR.
pub struct Tape {
    pub(crate) ops: Vec<Op>,
    /// Variable designating the tape's output.
    pub result: Variable,
    /// Id of the owning tape when this tape is a loop body.
    pub parent: Option<u64>,
    /// Free-form metadata (see [`META_VARARG`]).
    pub meta: HashMap<String, Value>,
    /// Application-defined context payload.
    pub context: Box<dyn Context>,
    id: u64,
    ctx_label: String,
}

impl Tape {
    /// An empty tape with the default string-keyed dictionary context.
    pub fn new() -> Self {
        Self::with_context(HashMap::<String, Value>::new())
    }

    /// An empty tape carrying `context`.
    pub fn with_context<C: Context>(context: C) -> Self {
        Self {
            ops: Vec::new(),
            result: Variable::unbound(0),
            parent: None,
            meta: HashMap::new(),
            context: Box::new(context),
            id: TAPE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            ctx_label: short_type_name(std::any::type_name::<C>()),
        }
    }

    /// Process-unique id of this tape.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of operations.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if the tape holds no operations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate operations in position order.
    pub fn iter(&self) -> std::slice::Iter<'_, Op> {
        self.ops.iter()
    }

    /// The operation at 1-based `id`, if in range.
    pub fn get(&self, id: usize) -> Option<&Op> {
        self.ops.get(id.checked_sub(1)?)
    }

    /// Downcast view of the context.
    pub fn context_ref<C: Context>(&self) -> Option<&C> {
        (&*self.context as &dyn Any).downcast_ref::<C>()
    }

    /// Downcast mutable view of the context.
    pub fn context_mut<C: Context>(&mut self) -> Option<&mut C> {
        (&mut *self.context as &mut dyn Any).downcast_mut::<C>()
    }

    /// Append `op`, adopting it: the operation receives id `len + 1`.
    /// Returns a bound variable tracking it.
    pub fn push(&mut self, op: Op) -> Variable {
        op.set_id(self.ops.len() + 1);
        self.ops.push(op.clone());
        Variable::bound(&op)
    }

    /// Insert `new_ops` so they occupy positions `idx, idx + 1, …`, shifting
    /// everything at `idx` and beyond right and renumbering the shifted
    /// operations. Bound variables to any operation, moved or not, stay
    /// correct because their id reads through to the operation.
    ///
    /// Returns bound variables for the inserted operations.
    ///
    /// # Panics
    ///
    /// Panics when `idx` is outside `1..=len + 1`.
    pub fn insert(&mut self, idx: usize, new_ops: Vec<Op>) -> Vec<Variable> {
        assert!(
            (1..=self.ops.len() + 1).contains(&idx),
            "insert position {idx} is out of range for a tape of {} operations",
            self.ops.len()
        );
        let inserted: Vec<Op> = new_ops;
        let vars: Vec<Variable> = inserted.iter().map(Variable::bound).collect();
        for (offset, op) in inserted.into_iter().enumerate() {
            self.ops.insert(idx - 1 + offset, op);
        }
        for (pos0, op) in self.ops.iter().enumerate().skip(idx - 1) {
            op.set_id(pos0 + 1);
        }
        vars
    }

    /// Positional overwrite: place `op` at `v`'s current position, give it
    /// that id, and re-point `v` (and every clone of it) at the new
    /// operation. This is the in-place replacement primitive; no renumbering
    /// happens because nothing moves.
    ///
    /// # Panics
    ///
    /// Panics when `v` addresses a position outside the tape.
    pub fn set(&mut self, v: &Variable, op: Op) {
        let idx = v.id();
        let adopted = self.put(idx, op);
        v.bind_to(&adopted);
    }

    /// Overwrite position `idx` without touching any variable.
    fn put(&mut self, idx: usize, op: Op) -> Op {
        assert!(
            (1..=self.ops.len()).contains(&idx),
            "operation id {idx} is out of range for a tape of {} operations",
            self.ops.len()
        );
        op.set_id(idx);
        self.ops[idx - 1] = op.clone();
        op
    }

    /// Replace the operation at `at` with `new_ops`.
    ///
    /// The first new operation overwrites the position in place; the rest are
    /// inserted after it (the tail of the tape shifts and is renumbered).
    /// References in the tail that pointed at the replaced operation are
    /// redirected to `new_ops[rebind_to]` (`rebind_to` is 1-based within
    /// `new_ops`, matching the id convention). `old_new` extends the
    /// substitution applied to the tail; primitivization uses it to thread an
    /// expanded body's inputs back to the caller's arguments.
    ///
    /// When `at` is a variable or operation, its id is read once at entry
    /// ("the current position of the reference") and the caller's handle is
    /// not itself rebound.
    ///
    /// Returns a bound variable for `new_ops[rebind_to]`.
    ///
    /// # Panics
    ///
    /// Panics when `at` is out of range, `new_ops` is empty, or `rebind_to`
    /// is outside `1..=new_ops.len()`.
    pub fn replace(
        &mut self,
        at: impl AsId,
        new_ops: Vec<Op>,
        rebind_to: usize,
        old_new: &Subst,
    ) -> Variable {
        let idx = at.as_id();
        assert!(!new_ops.is_empty(), "replace requires at least one new operation");
        assert!(
            (1..=new_ops.len()).contains(&rebind_to),
            "rebind_to {rebind_to} is out of range for {} new operations",
            new_ops.len()
        );
        let n = new_ops.len();
        let mut rest = new_ops;
        let first = rest.remove(0);
        self.put(idx, first);
        if !rest.is_empty() {
            self.insert(idx + 1, rest);
        }
        let chosen = self.ops[idx - 1 + (rebind_to - 1)].clone();
        let mut st = old_new.clone();
        st.insert(idx, chosen.id());
        let len = self.len();
        // Stale-only: live bindings in the tail must not be disturbed by
        // low-id entries of `old_new`; only references to displaced
        // operations are redirected.
        self.rebind_range_mode(&st, idx + n, len, crate::rebind::RebindMode::StaleOnly);
        Variable::bound(&chosen)
    }

    /// Remove the operation at `at`.
    ///
    /// With `rebind_to`, every later reference to the removed operation is
    /// redirected to the operation at `rebind_to` (interpreted in the
    /// post-delete numbering). Without it, the caller asserts the removed
    /// operation had no downstream users; violating that leaves dangling
    /// references behind. The tail is renumbered either way.
    ///
    /// # Panics
    ///
    /// Panics when `at` is out of range.
    pub fn remove(&mut self, at: impl AsId, rebind_to: Option<usize>) {
        let idx = at.as_id();
        assert!(
            (1..=self.ops.len()).contains(&idx),
            "operation id {idx} is out of range for a tape of {} operations",
            self.ops.len()
        );
        self.ops.remove(idx - 1);
        if let Some(rb) = rebind_to {
            let mut st = Subst::default();
            st.insert(idx, rb);
            let len = self.len();
            self.rebind_range_mode(&st, 1, len, crate::rebind::RebindMode::StaleOnly);
        }
        for (pos0, op) in self.ops.iter().enumerate().skip(idx - 1) {
            op.set_id(pos0 + 1);
        }
    }

    /// Bound variables for all input slots, in order.
    pub fn inputs(&self) -> Vec<Variable> {
        self.ops.iter().filter(|op| op.is_input()).map(Variable::bound).collect()
    }

    /// Number of input slots.
    pub fn num_inputs(&self) -> usize {
        self.ops.iter().filter(|op| op.is_input()).count()
    }

    /// Populate input slots.
    ///
    /// On an empty tape this pushes one input per value. Otherwise it
    /// overwrites the declared inputs' values; when `meta["isva"]` is truthy
    /// the last declared input absorbs the tail of `vals` as a tuple. A count
    /// mismatch on a non-vararg tape is [`TapeError::InputArity`].
    pub fn set_inputs(&mut self, vals: Vec<Value>) -> Result<Vec<Variable>, TapeError> {
        if self.is_empty() {
            return Ok(vals.into_iter().map(|v| self.push(Op::input_with(v))).collect());
        }
        let ins = self.inputs();
        let n = ins.len();
        let isva = matches!(self.meta.get(META_VARARG), Some(Value::Bool(true)));
        if isva && n > 0 {
            if vals.len() < n - 1 {
                return Err(TapeError::InputArity { expected: n, actual: vals.len() });
            }
            let mut vals = vals;
            let tail: Vec<Value> = vals.split_off(n - 1);
            for (var, val) in ins.iter().zip(vals) {
                var.op().expect("input variables are bound").set_val(val);
            }
            ins[n - 1]
                .op()
                .expect("input variables are bound")
                .set_val(Value::Tuple(tail));
        } else {
            if vals.len() != n {
                return Err(TapeError::InputArity { expected: n, actual: vals.len() });
            }
            for (var, val) in ins.iter().zip(vals) {
                var.op().expect("input variables are bound").set_val(val);
            }
        }
        Ok(ins)
    }

    /// A bound variable equivalent to the positional `v`.
    ///
    /// # Panics
    ///
    /// Panics when `v` addresses a position outside the tape.
    pub fn bound(&self, v: &Variable) -> Variable {
        Variable::bound(&self[v])
    }

    /// Resolve an operand against this tape: literals pass through, bound
    /// variables read their operation's value, unbound variables read the
    /// operation at their position.
    ///
    /// # Panics
    ///
    /// Panics when an unbound variable addresses a position outside the tape.
    pub fn resolve(&self, operand: &crate::op::Operand) -> Value {
        match operand {
            crate::op::Operand::Lit(v) => v.clone(),
            crate::op::Operand::Var(v) => self.resolve_var(v),
        }
    }

    /// [`Tape::resolve`] for a bare variable.
    pub fn resolve_var(&self, v: &Variable) -> Value {
        match v.op() {
            Some(op) => op.val(),
            None => self[v.id()].val(),
        }
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for Tape {
    type Output = Op;

    fn index(&self, id: usize) -> &Op {
        self.get(id).unwrap_or_else(|| {
            panic!(
                "operation id {id} is out of range for a tape of {} operations",
                self.ops.len()
            )
        })
    }
}

impl Index<&Variable> for Tape {
    type Output = Op;

    fn index(&self, v: &Variable) -> &Op {
        &self[v.id()]
    }
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tape{{{}}}", self.ctx_label)?;
        for (i, op) in self.ops.iter().enumerate() {
            if i + 1 < self.ops.len() {
                writeln!(f, "  {}", op.render())?;
            } else {
                write!(f, "  {}", op.render())?;
            }
        }
        Ok(())
    }
}

/// Condense a fully-qualified type name: path prefixes are dropped from every
/// segment, so `std::…::HashMap<alloc::…::String, …>` renders as
/// `HashMap<String, …>`.
fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut seg = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            seg.push(ch);
        } else if ch == ':' {
            seg.clear();
        } else {
            out.push_str(&seg);
            seg.clear();
            out.push(ch);
        }
    }
    out.push_str(&seg);
    out
}
