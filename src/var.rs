//! Variables: references to tape operations.
//!
//! A variable addresses an operation in one of two modes. An *unbound*
//! variable holds a plain id and means "whatever operation sits at this
//! position now". A *bound* variable holds the operation itself and tracks it
//! through renumbering: its id always reads the operation's current id.
//!
//! Variables are shared handles: cloning one yields a second view of the same
//! reference, so rebinding performed by tape edits (see [`Tape::set`]) is
//! visible through every clone.
//!
//! [`Tape::set`]: crate::Tape::set

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::op::Op;

#[derive(Debug, Clone)]
enum VarInner {
    Unbound(usize),
    Bound(Op),
}

/// A reference to a tape operation, positional or identity-bound.
#[derive(Debug, Clone)]
pub struct Variable {
    inner: Rc<RefCell<VarInner>>,
}

impl Variable {
    /// A positional reference to id `id`.
    pub fn unbound(id: usize) -> Self {
        Self { inner: Rc::new(RefCell::new(VarInner::Unbound(id))) }
    }

    /// An identity reference to `op`, surviving renumbering.
    pub fn bound(op: &Op) -> Self {
        Self { inner: Rc::new(RefCell::new(VarInner::Bound(op.clone()))) }
    }

    /// Current id: the bound operation's id, or the stored positional id.
    pub fn id(&self) -> usize {
        match &*self.inner.borrow() {
            VarInner::Unbound(id) => *id,
            VarInner::Bound(op) => op.id(),
        }
    }

    /// Write the id: writes through to the operation if bound.
    pub fn set_id(&self, id: usize) {
        let mut inner = self.inner.borrow_mut();
        match &mut *inner {
            VarInner::Unbound(stored) => *stored = id,
            VarInner::Bound(op) => op.set_id(id),
        }
    }

    /// The referenced operation, if bound.
    pub fn op(&self) -> Option<Op> {
        match &*self.inner.borrow() {
            VarInner::Unbound(_) => None,
            VarInner::Bound(op) => Some(op.clone()),
        }
    }

    /// True if this variable tracks a specific operation.
    pub fn is_bound(&self) -> bool {
        matches!(&*self.inner.borrow(), VarInner::Bound(_))
    }

    /// Re-point this variable (and every clone of it) at `op`.
    ///
    /// An unbound variable becomes bound; there is no transition back.
    pub fn bind_to(&self, op: &Op) {
        *self.inner.borrow_mut() = VarInner::Bound(op.clone());
    }

    /// True if `self` and `other` are views of the same reference cell.
    pub fn same_ref(&self, other: &Variable) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        match (&*self.inner.borrow(), &*other.inner.borrow()) {
            (VarInner::Bound(a), VarInner::Bound(b)) => a.ptr_eq(b),
            (VarInner::Unbound(a), VarInner::Unbound(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Bound variables hash by operation identity so the hash survives
        // renumbering; unbound variables hash by id.
        match &*self.inner.borrow() {
            VarInner::Unbound(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            VarInner::Bound(op) => {
                1u8.hash(state);
                op.addr().hash(state);
            }
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.id())
    }
}

impl From<usize> for Variable {
    fn from(id: usize) -> Self {
        Variable::unbound(id)
    }
}

impl From<&Op> for Variable {
    fn from(op: &Op) -> Self {
        Variable::bound(op)
    }
}
