//! Call signatures and the signature resolver.
//!
//! A signature is the runtime type tuple of a call: the callee's identity
//! plus one [`TypeTag`] per argument, optionally ending in a variadic tail.
//! [`FunctionResolver`] attaches a value to signatures and answers lookups
//! with the most specific registered entry the query is a subtype of. This
//! is how "is this call primitive?" is decided.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::TapeError;
use crate::op::{Op, OpKind, Operand};
use crate::tape::Tape;
use crate::value::{Func, FuncId, TypeTag, Value};

type ArgTags = SmallVec<[TypeTag; 4]>;

/// The runtime type tuple of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Identity of the callee.
    pub func: FuncId,
    /// Argument type tuple.
    pub args: ArgTags,
    /// True if the last argument type repeats for the tail.
    pub varargs: bool,
}

impl Signature {
    /// A fixed-arity signature.
    pub fn new(func: &Func, args: impl IntoIterator<Item = TypeTag>) -> Self {
        Self { func: func.id(), args: args.into_iter().collect(), varargs: false }
    }

    /// A signature whose last argument type absorbs the tail.
    pub fn vararg(func: &Func, args: impl IntoIterator<Item = TypeTag>) -> Self {
        Self { func: func.id(), args: args.into_iter().collect(), varargs: true }
    }

    /// True if every call matching `self` also matches `other`
    /// (argument-tuple subtyping; the callee must be the same).
    pub fn is_subtype(&self, other: &Signature) -> bool {
        self.func == other.func
            && tuple_subtype(&self.args, self.varargs, &other.args, other.varargs)
    }
}

fn tuple_subtype(sub: &[TypeTag], sub_va: bool, sup: &[TypeTag], sup_va: bool) -> bool {
    match (sub_va, sup_va) {
        (false, false) => {
            sub.len() == sup.len() && sub.iter().zip(sup).all(|(a, b)| a.is_subtype(*b))
        }
        (false, true) => {
            let k = sup.len();
            if k == 0 {
                return true;
            }
            if sub.len() + 1 < k {
                return false;
            }
            sub.iter().enumerate().all(|(i, a)| {
                let b = if i < k - 1 { sup[i] } else { sup[k - 1] };
                a.is_subtype(b)
            })
        }
        // A variadic family covers unboundedly many arities; a fixed tuple
        // cannot.
        (true, false) => false,
        (true, true) => {
            let (ka, kb) = (sub.len(), sup.len());
            if kb == 0 {
                return true;
            }
            if kb > ka {
                return false;
            }
            (0..ka).all(|i| {
                let b = if i < kb - 1 { sup[i] } else { sup[kb - 1] };
                sub[i].is_subtype(b)
            })
        }
    }
}

/// Build the signature of a recorded call, resolving operands against the
/// tape for their runtime types.
///
/// Fails with [`TapeError::UnknownValue`] when the function slot reads an
/// operation that has no concrete value yet, and with
/// [`TapeError::NotCallable`] when it resolves to a non-function value.
/// Argument operands with unknown values are typed [`TypeTag::Unknown`]
/// rather than failing, so the signature stays buildable for symbolic calls.
pub fn call_signature(tape: &Tape, op: &Op) -> Result<Signature, TapeError> {
    let node = op.node();
    let OpKind::Call(call) = &node.kind else {
        return Err(TapeError::NotCallable(format!("%{}", node.id)));
    };
    let fval = tape.resolve(&call.func);
    if fval.is_unknown() {
        if let Operand::Var(v) = &call.func {
            return Err(TapeError::UnknownValue(v.id()));
        }
    }
    let func =
        fval.as_func().ok_or_else(|| TapeError::NotCallable(fval.to_string()))?;
    let args: ArgTags = call.args.iter().map(|a| tape.resolve(a).type_tag()).collect();
    Ok(Signature { func: func.id(), args, varargs: false })
}

/// Build the signature of a direct call on concrete values.
pub fn signature_of(func: &Func, args: &[Value]) -> Signature {
    Signature::new(func, args.iter().map(Value::type_tag))
}

/// Keyed lookup from call signatures to attached values.
///
/// Entries are grouped by callee; within a group they are kept ordered
/// most-specific-first, so a lookup returns the value attached to the most
/// specific signature the query matches, regardless of registration order.
/// Re-registering a signature overrides the prior entry in place.
#[derive(Debug, Clone)]
pub struct FunctionResolver<V> {
    groups: FxHashMap<FuncId, Vec<(Signature, V)>>,
}

impl<V> FunctionResolver<V> {
    /// An empty resolver.
    pub fn new() -> Self {
        Self { groups: FxHashMap::default() }
    }

    /// Insert or override the value attached to `sig`.
    pub fn set(&mut self, sig: Signature, value: V) {
        let group = self.groups.entry(sig.func).or_default();
        if let Some(existing) = group
            .iter_mut()
            .find(|(s, _)| s.args == sig.args && s.varargs == sig.varargs)
        {
            existing.1 = value;
            return;
        }
        let at = group
            .iter()
            .position(|(s, _)| sig.is_subtype(s))
            .unwrap_or(group.len());
        group.insert(at, (sig, value));
    }

    /// The value attached to the most specific signature `sig` matches, or
    /// `None` when nothing matches.
    pub fn get(&self, sig: &Signature) -> Option<&V> {
        self.groups
            .get(&sig.func)?
            .iter()
            .find(|(s, _)| sig.is_subtype(s))
            .map(|(_, v)| v)
    }

    /// True if some entry matches `sig`.
    pub fn contains(&self, sig: &Signature) -> bool {
        self.get(sig).is_some()
    }

    /// Total number of registered signatures.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<V> Default for FunctionResolver<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;

    fn sig(f: &Func, tags: &[TypeTag]) -> Signature {
        Signature::new(f, tags.iter().copied())
    }

    #[test]
    fn test_signature_needs_concrete_callee() {
        use crate::op::mkcall;

        let mut tape = Tape::new();
        let ins = tape.set_inputs(vec![Value::Unknown, Value::Float(1.0)]).unwrap();
        let call = tape.push(mkcall(&ins[0], [(&ins[1]).into()]).unwrap());
        let err = call_signature(&tape, &tape[&call]).unwrap_err();
        assert_eq!(err, TapeError::UnknownValue(1));
    }

    #[test]
    fn test_most_specific_wins() {
        let mul = builtins::mul();
        let mut r = FunctionResolver::new();
        // Registration order is irrelevant: general first, specific second.
        r.set(sig(&mul, &[TypeTag::Number, TypeTag::Number]), "nn");
        r.set(sig(&mul, &[TypeTag::Float, TypeTag::Float]), "ff");

        assert_eq!(r.get(&sig(&mul, &[TypeTag::Float, TypeTag::Float])), Some(&"ff"));
        assert_eq!(r.get(&sig(&mul, &[TypeTag::Int, TypeTag::Float])), Some(&"nn"));
        assert_eq!(r.get(&sig(&mul, &[TypeTag::Str, TypeTag::Str])), None);
    }

    #[test]
    fn test_vararg_tail() {
        let add = builtins::add();
        let mut r = FunctionResolver::new();
        r.set(Signature::vararg(&add, [TypeTag::Any]), "any");
        r.set(sig(&add, &[TypeTag::Int, TypeTag::Int]), "ii");

        assert_eq!(r.get(&sig(&add, &[TypeTag::Int, TypeTag::Int])), Some(&"ii"));
        assert_eq!(r.get(&sig(&add, &[TypeTag::Str])), Some(&"any"));
        assert_eq!(r.get(&sig(&add, &[])), Some(&"any"));
        assert_eq!(
            r.get(&sig(&add, &[TypeTag::Int, TypeTag::Int, TypeTag::Int])),
            Some(&"any")
        );
    }

    #[test]
    fn test_override_replaces() {
        let mul = builtins::mul();
        let mut r = FunctionResolver::new();
        r.set(sig(&mul, &[TypeTag::Int, TypeTag::Int]), 1);
        r.set(sig(&mul, &[TypeTag::Int, TypeTag::Int]), 2);
        assert_eq!(r.len(), 1);
        assert_eq!(r.get(&sig(&mul, &[TypeTag::Int, TypeTag::Int])), Some(&2));
    }

    #[test]
    fn test_groups_keyed_by_identity() {
        let mul = builtins::mul();
        let add = builtins::add();
        let mut r = FunctionResolver::new();
        r.set(Signature::vararg(&mul, [TypeTag::Any]), ());
        assert!(r.get(&sig(&add, &[TypeTag::Int])).is_none());
    }
}
