// lutra-core - Persistent hash set
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Immutable hash set, a thin shell over [`PersistentMap`] mapping each
//! member to itself. Structural sharing and the no-op identity guarantees
//! carry over from the map.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::map::PersistentMap;
use crate::value::{hash_value, Value};

#[derive(Clone)]
pub struct PersistentSet {
    map: PersistentMap,
    meta: Option<Rc<Value>>,
}

impl PersistentSet {
    /// The empty set.
    #[must_use]
    pub fn new() -> Self {
        PersistentSet {
            map: PersistentMap::new(),
            meta: None,
        }
    }

    pub fn from_values(values: &[Value]) -> Self {
        let mut s = PersistentSet::new();
        for v in values {
            s = s.conj(v.clone());
        }
        s
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.map.count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A new set with `val` added. Returns `self` unchanged when already a
    /// member.
    #[must_use]
    pub fn conj(&self, val: Value) -> PersistentSet {
        let new_map = self.map.assoc(val.clone(), val);
        if new_map.same_root(&self.map) {
            return self.clone();
        }
        PersistentSet {
            map: new_map,
            meta: self.meta.clone(),
        }
    }

    /// A new set without `val`. Returns `self` unchanged when absent.
    #[must_use]
    pub fn disj(&self, val: &Value) -> PersistentSet {
        let new_map = self.map.without(val);
        if new_map.same_root(&self.map) {
            return self.clone();
        }
        PersistentSet {
            map: new_map,
            meta: self.meta.clone(),
        }
    }

    #[must_use]
    pub fn contains(&self, val: &Value) -> bool {
        self.map.contains(val)
    }

    /// Member lookup returning the stored member, or `not_found`.
    #[must_use]
    pub fn val_at(&self, val: &Value, not_found: Value) -> Value {
        self.map.val_at(val, not_found)
    }

    /// Fold over the members; a [`Value::Reduced`] result terminates early.
    pub fn reduce<F>(&self, mut f: F, init: Value) -> Result<Value>
    where
        F: FnMut(Value, Value) -> Result<Value>,
    {
        self.map.reduce(|acc, k, _v| f(acc, k), init)
    }

    pub(crate) fn for_each(&self, f: &mut impl FnMut(&Value)) {
        self.map.for_each(&mut |k, _v| f(k));
    }

    #[must_use]
    pub fn with_meta(&self, meta: Value) -> PersistentSet {
        PersistentSet {
            map: self.map.clone(),
            meta: Some(Rc::new(meta)),
        }
    }

    #[must_use]
    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_deref()
    }

    #[must_use]
    pub fn same_root(&self, other: &PersistentSet) -> bool {
        self.map.same_root(&other.map)
    }

    #[must_use]
    pub fn hash_unordered(&self) -> u32 {
        let mut h: u32 = 0;
        self.for_each(&mut |v| {
            h = h.wrapping_add(hash_value(v));
        });
        h
    }
}

impl Default for PersistentSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PersistentSet {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl Eq for PersistentSet {}

impl fmt::Display for PersistentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{{")?;
        let mut first = true;
        let mut result = Ok(());
        self.for_each(&mut |v| {
            if result.is_err() {
                return;
            }
            if !first {
                result = write!(f, ", ");
            }
            first = false;
            if result.is_ok() {
                result = write!(f, "{}", v);
            }
        });
        result?;
        write!(f, "}}")
    }
}

impl fmt::Debug for PersistentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
