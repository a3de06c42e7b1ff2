// lutra-core - Runtime value representation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The core value type.
//!
//! `Value` is the uniform representation flowing through the map, dispatch
//! and Var layers. Values are immutable and cheap to clone (reference
//! counted where they carry structure). Equality is total and consistent
//! with [`hash_value`], which produces the 32-bit hashes the persistent map
//! descends on.

use std::fmt;
use std::rc::Rc;

use crate::code::CallableRef;
use crate::error::{Error, Result};
use crate::map::PersistentMap;
use crate::namespace::Var;
use crate::protocol::Protocol;
use crate::set::PersistentSet;
use crate::symbol::Symbol;
use crate::types::{builtin, Type};

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Symbol(Symbol),
    /// Immutable indexed sequence; used for collected variadic arguments
    /// and code constants.
    Vector(Rc<[Value]>),
    Map(PersistentMap),
    Set(PersistentSet),
    /// Any callable: code, closure, adapter, native fn, polymorphic fn.
    Fn(CallableRef),
    Var(Var),
    Type(Type),
    Protocol(Protocol),
    /// Early-termination sentinel for folds.
    Reduced(Rc<Value>),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(items.into())
    }

    /// Wrap a value in the reduced sentinel.
    pub fn reduced(v: Value) -> Value {
        Value::Reduced(Rc::new(v))
    }

    #[must_use]
    pub fn is_reduced(&self) -> bool {
        matches!(self, Value::Reduced(_))
    }

    /// Unwrap one level of the reduced sentinel; other values pass through.
    #[must_use]
    pub fn unwrap_reduced(self) -> Value {
        match self {
            Value::Reduced(inner) => (*inner).clone(),
            other => other,
        }
    }

    /// The dispatch type tag of this value.
    #[must_use]
    pub fn type_tag(&self) -> Type {
        match self {
            Value::Nil => builtin::nil(),
            Value::Bool(_) => builtin::boolean(),
            Value::Int(_) => builtin::integer(),
            Value::Float(_) => builtin::float(),
            Value::Str(_) => builtin::string(),
            Value::Symbol(_) => builtin::symbol(),
            Value::Vector(_) => builtin::vector(),
            Value::Map(_) => builtin::persistent_map(),
            Value::Set(_) => builtin::persistent_set(),
            Value::Fn(_) => builtin::function(),
            Value::Var(_) => builtin::var(),
            Value::Type(_) => builtin::type_tag(),
            Value::Protocol(_) => builtin::protocol(),
            Value::Reduced(_) => builtin::reduced(),
        }
    }

    /// Identity check: pointer equality for structured values, bit equality
    /// for scalars. Used by the map's no-op short-circuits, which must not
    /// pay for deep comparison.
    #[must_use]
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => a.same_root(b),
            (Value::Set(a), Value::Set(b)) => a.same_root(b),
            (Value::Fn(a), Value::Fn(b)) => Rc::ptr_eq(a, b),
            (Value::Var(a), Value::Var(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Protocol(a), Value::Protocol(b)) => a == b,
            (Value::Reduced(a), Value::Reduced(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// View this value as a callable. Fns are callable directly; a Var
    /// dereferences at call time, so redefinition reaches existing call
    /// sites.
    pub fn as_callable(&self) -> Result<CallableRef> {
        match self {
            Value::Fn(f) => Ok(f.clone()),
            Value::Var(v) => Ok(Rc::new(v.clone())),
            other => Err(Error::invalid_argument(format!(
                "Cannot call value of type {}",
                other.type_tag()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Bit equality keeps Eq total (NaN == NaN by bits).
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Fn(a), Value::Fn(b)) => Rc::ptr_eq(a, b),
            (Value::Var(a), Value::Var(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Protocol(a), Value::Protocol(b)) => a == b,
            (Value::Reduced(a), Value::Reduced(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Fold a pointer-sized word into 32 bits.
fn fold_word(x: u64) -> u32 {
    (x ^ (x >> 32)) as u32
}

/// Total 32-bit hash, consistent with `Value` equality. Scalar hashing
/// follows the JVM conventions Clojure-family runtimes inherit: a long
/// hashes to `low ^ high`, a string to the 31-multiplier fold. Sequences
/// fold in order; maps and sets combine entries order-independently.
#[must_use]
pub fn hash_value(v: &Value) -> u32 {
    match v {
        Value::Nil => 0,
        Value::Bool(true) => 1231,
        Value::Bool(false) => 1237,
        Value::Int(i) => fold_word(*i as u64),
        Value::Float(f) => fold_word(f.to_bits()),
        Value::Str(s) => hash_str(s),
        Value::Symbol(s) => fold_word(s.ident_ptr() as u64),
        Value::Vector(items) => {
            let mut h: u32 = 1;
            for item in items.iter() {
                h = h.wrapping_mul(31).wrapping_add(hash_value(item));
            }
            h
        }
        Value::Map(m) => m.hash_unordered(),
        Value::Set(s) => s.hash_unordered(),
        Value::Fn(f) => fold_word(Rc::as_ptr(f) as *const () as u64),
        Value::Var(v) => v.ident_hash(),
        Value::Type(t) => fold_word(t.ident_ptr() as u64),
        Value::Protocol(p) => fold_word(p.ident_ptr() as u64),
        Value::Reduced(inner) => hash_value(inner) ^ 0x5f3e_1a2b,
    }
}

fn hash_str(s: &str) -> u32 {
    let mut h: u32 = 0;
    for c in s.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as u32);
    }
    h
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => write!(f, "{}", m),
            Value::Set(s) => write!(f, "{}", s),
            Value::Fn(c) => match c.name() {
                Some(name) => write!(f, "#<fn {}>", name),
                None => write!(f, "#<fn>"),
            },
            Value::Var(v) => write!(f, "{}", v),
            Value::Type(t) => write!(f, "#<type {}>", t),
            Value::Protocol(p) => write!(f, "#<protocol {}>", p),
            Value::Reduced(inner) => write!(f, "#<reduced {}>", inner),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_hash_consistent_with_eq() {
        assert_eq!(hash_value(&Value::Int(42)), hash_value(&Value::Int(42)));
        assert_eq!(hash_value(&Value::str("abc")), hash_value(&Value::str("abc")));
        assert_ne!(hash_value(&Value::str("abc")), hash_value(&Value::str("abd")));
    }

    #[test]
    fn test_long_hash_folds_halves() {
        // 1 and (1 << 32) collide under the JVM long fold. The map's
        // collision tests rely on this being constructible.
        assert_eq!(
            hash_value(&Value::Int(1)),
            hash_value(&Value::Int(1i64 << 32))
        );
        assert_ne!(Value::Int(1), Value::Int(1i64 << 32));
    }

    #[test]
    fn test_reduced_roundtrip() {
        let v = Value::reduced(Value::Int(7));
        assert!(v.is_reduced());
        assert_eq!(v.unwrap_reduced(), Value::Int(7));
        assert!(!Value::Int(7).is_reduced());
    }

    #[test]
    fn test_identical_is_shallower_than_eq() {
        let a = Value::str("same");
        let b = Value::str("same");
        assert_eq!(a, b);
        assert!(!a.identical(&b));
        assert!(a.identical(&a.clone()));
    }
}
