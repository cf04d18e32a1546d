//! Dynamic values carried by tape operations.
//!
//! A tape records a computation over dynamically-typed values: numbers,
//! booleans, tuples, and first-class host functions. [`Value::Unknown`] is
//! the sentinel for "no concrete value yet" used by symbolic calls.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TapeError;

static FUNC_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a host function, unique per process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u64);

type HostFn = dyn Fn(&[Value]) -> Result<Value, TapeError>;

/// A named host function callable from a tape.
///
/// Cloning a `Func` shares its identity: every clone carries the same
/// [`FuncId`], which is what signatures and resolvers key on. Two
/// independently constructed functions are never equal, even if they share a
/// name.
#[derive(Clone)]
pub struct Func {
    id: FuncId,
    name: Rc<str>,
    f: Rc<HostFn>,
}

impl Func {
    /// Wrap a closure as a host function with a fresh identity.
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, TapeError> + 'static,
    ) -> Self {
        let id = FuncId(FUNC_ID_COUNTER.fetch_add(1, Ordering::Relaxed));
        Self { id, name: Rc::from(name.into()), f: Rc::new(f) }
    }

    /// This function's identity.
    #[inline]
    pub fn id(&self) -> FuncId {
        self.id
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function on resolved argument values.
    pub fn call(&self, args: &[Value]) -> Result<Value, TapeError> {
        (self.f)(args)
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}#{}>", self.name, self.id.0)
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Runtime type of a [`Value`], with a small subtype lattice.
///
/// `Int` and `Float` are subtypes of the abstract `Number`; everything is a
/// subtype of `Any`. `Number` and `Any` are never produced by
/// [`Value::type_tag`]; they exist for resolver signatures only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// `()`.
    Unit,
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    Str,
    /// Tuple of values.
    Tuple,
    /// Host function.
    Func,
    /// The unknown-value sentinel.
    Unknown,
    /// Abstract: any numeric type.
    Number,
    /// Abstract: top of the lattice.
    Any,
}

impl TypeTag {
    /// Subtype relation. Reflexive; `Int <: Number`, `Float <: Number`, and
    /// every tag is a subtype of `Any`.
    pub fn is_subtype(self, sup: TypeTag) -> bool {
        self == sup
            || sup == TypeTag::Any
            || (sup == TypeTag::Number && matches!(self, TypeTag::Int | TypeTag::Float))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Unit => "Unit",
            TypeTag::Bool => "Bool",
            TypeTag::Int => "Int",
            TypeTag::Float => "Float",
            TypeTag::Str => "Str",
            TypeTag::Tuple => "Tuple",
            TypeTag::Func => "Func",
            TypeTag::Unknown => "Unknown",
            TypeTag::Number => "Number",
            TypeTag::Any => "Any",
        };
        f.write_str(name)
    }
}

/// A dynamically-typed value flowing through a tape.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// No concrete value recorded yet.
    #[default]
    Unknown,
    /// `()`.
    Unit,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Tuple of values.
    Tuple(Vec<Value>),
    /// First-class host function.
    Func(Func),
}

impl Value {
    /// Runtime type of this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Unknown => TypeTag::Unknown,
            Value::Unit => TypeTag::Unit,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::Str,
            Value::Tuple(_) => TypeTag::Tuple,
            Value::Func(_) => TypeTag::Func,
        }
    }

    /// True if this is the [`Value::Unknown`] sentinel.
    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// The contained function, if this value is callable.
    pub fn as_func(&self) -> Option<&Func> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Numeric view as `f64`, if this value is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Boolean view, if this value is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unknown, Value::Unknown) => true,
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => f.write_str("<unknown>"),
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Func(func) => write!(f, "{func}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Func> for Value {
    fn from(f: Func) -> Self {
        Value::Func(f)
    }
}
