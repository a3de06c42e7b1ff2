// lutra-core - Runtime type tags
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Type tags for dispatch.
//!
//! A `Type` names a runtime type and optionally links to a parent type,
//! forming a single-inheritance chain that polymorphic dispatch walks. Tags
//! are interned by name: defining the same name twice yields the same tag,
//! so equality and hashing are pointer operations. The chain is acyclic by
//! construction because a child can only link to an already-existing parent
//! and the link is immutable.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

/// An interned runtime type tag with an optional parent.
#[derive(Clone)]
pub struct Type {
    inner: Arc<TypeInner>,
}

#[derive(Debug)]
struct TypeInner {
    name: Arc<str>,
    parent: Option<Type>,
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Type>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Type>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl Type {
    /// Define (or fetch) the tag for `name`. When the tag already exists it
    /// is returned unchanged; the parent argument of later callers is
    /// ignored, keeping the tag's identity and chain stable.
    pub fn define(name: &str, parent: Option<Type>) -> Type {
        let mut reg = registry().lock().expect("type registry mutex poisoned");
        if let Some(existing) = reg.get(name) {
            return existing.clone();
        }
        let tp = Type {
            inner: Arc::new(TypeInner {
                name: Arc::from(name),
                parent,
            }),
        };
        reg.insert(name.to_string(), tp.clone());
        tp
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Type> {
        self.inner.parent.as_ref()
    }

    /// Walk the parent chain checking for `ancestor` (inclusive of self).
    #[must_use]
    pub fn is_a(&self, ancestor: &Type) -> bool {
        let mut cur = Some(self);
        while let Some(tp) = cur {
            if tp == ancestor {
                return true;
            }
            cur = tp.parent();
        }
        false
    }

    pub(crate) fn ident_ptr(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.inner.name)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

/// Tags for the built-in value variants. Everything parents on
/// [`object`] so ancestor-chain dispatch has a common root.
pub mod builtin {
    use super::Type;

    /// Root of the builtin chain.
    pub fn object() -> Type {
        Type::define("lutra.core.Object", None)
    }

    fn derived(name: &str) -> Type {
        Type::define(name, Some(object()))
    }

    pub fn nil() -> Type {
        derived("lutra.core.Nil")
    }

    pub fn boolean() -> Type {
        derived("lutra.core.Bool")
    }

    pub fn integer() -> Type {
        derived("lutra.core.Integer")
    }

    pub fn float() -> Type {
        derived("lutra.core.Float")
    }

    pub fn string() -> Type {
        derived("lutra.core.String")
    }

    pub fn symbol() -> Type {
        derived("lutra.core.Symbol")
    }

    pub fn vector() -> Type {
        derived("lutra.core.Vector")
    }

    pub fn persistent_map() -> Type {
        derived("lutra.core.PersistentMap")
    }

    pub fn persistent_set() -> Type {
        derived("lutra.core.PersistentSet")
    }

    pub fn function() -> Type {
        derived("lutra.core.Fn")
    }

    pub fn var() -> Type {
        derived("lutra.core.Var")
    }

    pub fn type_tag() -> Type {
        derived("lutra.core.Type")
    }

    pub fn protocol() -> Type {
        derived("lutra.core.Protocol")
    }

    pub fn reduced() -> Type {
        derived("lutra.core.Reduced")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_is_idempotent() {
        let a = Type::define("test.Idempotent", None);
        let b = Type::define("test.Idempotent", Some(builtin::object()));
        assert_eq!(a, b);
        assert!(b.parent().is_none());
    }

    #[test]
    fn test_parent_chain() {
        let a = Type::define("test.ChainA", None);
        let b = Type::define("test.ChainB", Some(a.clone()));
        let c = Type::define("test.ChainC", Some(b.clone()));

        assert!(c.is_a(&c));
        assert!(c.is_a(&b));
        assert!(c.is_a(&a));
        assert!(!a.is_a(&c));
        assert_eq!(c.parent(), Some(&b));
    }

    #[test]
    fn test_builtins_root_on_object() {
        assert!(builtin::integer().is_a(&builtin::object()));
        assert!(builtin::persistent_map().is_a(&builtin::object()));
        assert!(builtin::object().parent().is_none());
    }
}
