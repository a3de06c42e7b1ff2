// lutra-core - Namespaces and Vars
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Namespaces, Vars, and the namespace registry.
//!
//! A [`Var`] is a named mutable cell interned in a [`Namespace`]. Its root
//! value is shared by every thread of control; a Var marked dynamic can
//! additionally be shadowed per scope through the [`bindings`] module.
//! Vars are callable, dereferencing at call time so redefinition reaches
//! existing call sites.
//!
//! The [`NamespaceRegistry`] maps names to namespaces. It is an explicit
//! handle rather than a process global, so embedders can host independent
//! runtimes side by side.
//!
//! [`bindings`]: crate::bindings

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::bindings;
use crate::code::Callable;
use crate::error::{Error, Result};
use crate::symbol::Symbol;
use crate::value::Value;

struct VarInner {
    ns: Namespace,
    name: String,
    root: RefCell<Option<Value>>,
    dynamic: Cell<bool>,
}

/// An interned, named cell. Cheap to clone; clones share the cell.
///
/// Equality and hashing are by identity: two Vars are the same Var only if
/// they came from the same interning.
#[derive(Clone)]
pub struct Var {
    inner: Rc<VarInner>,
}

impl Var {
    fn new(ns: &Namespace, name: impl Into<String>) -> Var {
        Var {
            inner: Rc::new(VarInner {
                ns: ns.clone(),
                name: name.into(),
                root: RefCell::new(None),
                dynamic: Cell::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ns(&self) -> &Namespace {
        &self.inner.ns
    }

    /// The `ns/name` form used in messages and printing.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.inner.ns.name(), self.inner.name)
    }

    /// Set the root value, bumping the owning namespace's revision.
    pub fn set_root(&self, val: Value) -> &Var {
        self.inner.ns.bump_rev();
        *self.inner.root.borrow_mut() = Some(val);
        self
    }

    pub fn get_root(&self) -> Option<Value> {
        self.inner.root.borrow().clone()
    }

    pub fn is_defined(&self) -> bool {
        self.inner.root.borrow().is_some()
    }

    /// Mark this Var as dynamically bindable.
    pub fn set_dynamic(&self) -> &Var {
        self.inner.dynamic.set(true);
        self.inner.ns.bump_rev();
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.inner.dynamic.get()
    }

    /// Rebind the value in the current dynamic scope. Fails on a Var that
    /// was never marked dynamic.
    pub fn set_value(&self, val: Value) -> Result<()> {
        if !self.is_dynamic() {
            return Err(Error::invalid_argument(format!(
                "Can't set the value of a non-dynamic var: {}",
                self.qualified_name()
            )));
        }
        bindings::set_var_value(self, val);
        Ok(())
    }

    /// The current value: the innermost dynamic binding when one is
    /// active, otherwise the root. An unset root is an error.
    pub fn deref(&self) -> Result<Value> {
        if self.is_dynamic() {
            if let Some(v) = bindings::binding_of(self) {
                return Ok(v);
            }
        }
        self.get_root()
            .ok_or_else(|| Error::undefined_var(self.qualified_name()))
    }

    pub(crate) fn ident_hash(&self) -> u32 {
        let p = Rc::as_ptr(&self.inner) as u64;
        (p ^ (p >> 32)) as u32
    }
}

impl Callable for Var {
    fn name(&self) -> Option<&str> {
        Some(&self.inner.name)
    }

    /// Calling a Var calls whatever it currently holds.
    fn invoke(&self, args: &[Value]) -> Result<Value> {
        self.deref()?.as_callable()?.invoke(args)
    }

    // invoke_with falls through to invoke: the self-reference belongs to
    // the value held, not the Var.
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Var {}

impl std::hash::Hash for Var {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#'{}", self.qualified_name())
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// One refer registration: a source namespace plus which of its names are
/// visible here.
#[derive(Clone)]
struct Refer {
    namespace: Namespace,
    refer_syms: Vec<String>,
    refer_all: bool,
}

struct NamespaceInner {
    name: Rc<str>,
    /// Bumped whenever a Var root changes; lets callers detect staleness
    /// without comparing values.
    rev: Cell<u64>,
    registry: RefCell<FxHashMap<String, Var>>,
    /// Refers keyed by alias, in registration order.
    refers: RefCell<Vec<(String, Refer)>>,
}

/// A named collection of Vars. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Namespace {
    inner: Rc<NamespaceInner>,
}

impl Namespace {
    fn new(name: impl Into<String>) -> Namespace {
        Namespace {
            inner: Rc::new(NamespaceInner {
                name: Rc::from(name.into()),
                rev: Cell::new(0),
                registry: RefCell::new(FxHashMap::default()),
                refers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn rev(&self) -> u64 {
        self.inner.rev.get()
    }

    pub(crate) fn bump_rev(&self) {
        self.inner.rev.set(self.inner.rev.get() + 1);
    }

    /// The Var interned under `name`, creating an undefined one on first
    /// use. Interning is idempotent: the same name yields the same Var.
    pub fn intern_or_make(&self, name: &str) -> Var {
        let mut registry = self.inner.registry.borrow_mut();
        if let Some(v) = registry.get(name) {
            return v.clone();
        }
        let v = Var::new(self, name);
        registry.insert(name.to_string(), v.clone());
        v
    }

    /// The Var interned under `name`, if any.
    pub fn get_var(&self, name: &str) -> Option<Var> {
        self.inner.registry.borrow().get(name).cloned()
    }

    /// Make `ns` visible here under `alias` (default: its own name). With
    /// `refer_all`, unqualified resolution falls through to all its names.
    pub fn add_refer(&self, ns: &Namespace, alias: Option<&str>, refer_all: bool) {
        self.insert_refer(
            alias.unwrap_or(ns.name()).to_string(),
            Refer {
                namespace: ns.clone(),
                refer_syms: Vec::new(),
                refer_all,
            },
        );
    }

    /// Like [`add_refer`], but only the listed names fall through.
    ///
    /// [`add_refer`]: Namespace::add_refer
    pub fn add_refer_filtered(&self, ns: &Namespace, alias: Option<&str>, syms: Vec<String>) {
        self.insert_refer(
            alias.unwrap_or(ns.name()).to_string(),
            Refer {
                namespace: ns.clone(),
                refer_syms: syms,
                refer_all: false,
            },
        );
    }

    fn insert_refer(&self, alias: String, refer: Refer) {
        let mut refers = self.inner.refers.borrow_mut();
        if let Some(slot) = refers.iter_mut().find(|(a, _)| *a == alias) {
            slot.1 = refer;
        } else {
            refers.push((alias, refer));
        }
    }

    /// Map a single foreign Var under `sym`'s name. Returns the previous
    /// binding when one is being shadowed, so callers can warn.
    pub fn add_refer_symbol(&self, sym: &Symbol, var: Var) -> Option<Var> {
        self.inner
            .registry
            .borrow_mut()
            .insert(sym.name().to_string(), var)
    }

    /// Resolve a namespace alias: refers first, then the registry.
    pub fn resolve_ns(&self, registry: &NamespaceRegistry, alias: &str) -> Result<Namespace> {
        let from_refer = self
            .inner
            .refers
            .borrow()
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, r)| r.namespace.clone());
        from_refer
            .or_else(|| registry.get(alias))
            .ok_or_else(|| Error::unresolved(alias, Some(self.name().to_string())))
    }

    /// Resolve a symbol to a Var. A qualified symbol resolves its
    /// namespace part first; an unqualified one looks here, then (when
    /// `use_refers`) walks the refers in registration order.
    pub fn resolve(
        &self,
        registry: &NamespaceRegistry,
        sym: &Symbol,
        use_refers: bool,
    ) -> Result<Option<Var>> {
        let target = match sym.namespace() {
            Some(alias) => self.resolve_ns(registry, alias)?,
            None => self.clone(),
        };
        if let Some(var) = target.get_var(sym.name()) {
            return Ok(Some(var));
        }
        if !use_refers {
            return Ok(None);
        }
        // Clone the refer list out so a refer back into this namespace
        // cannot alias the borrow.
        let refers: Vec<Refer> = self
            .inner
            .refers
            .borrow()
            .iter()
            .map(|(_, r)| r.clone())
            .collect();
        let name = sym.name();
        for refer in refers {
            if refer.refer_all || refer.refer_syms.iter().any(|s| s == name) {
                let found = refer
                    .namespace
                    .resolve(registry, &Symbol::new(name), false)?;
                if found.is_some() {
                    return Ok(found);
                }
            }
        }
        Ok(None)
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Namespace {}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<ns {}>", self.name())
    }
}

/// The set of live namespaces. An explicit handle, passed where needed;
/// cheap to clone.
#[derive(Clone, Default)]
pub struct NamespaceRegistry {
    inner: Rc<RefCell<FxHashMap<String, Namespace>>>,
}

impl NamespaceRegistry {
    pub fn new() -> NamespaceRegistry {
        NamespaceRegistry::default()
    }

    /// The namespace under `name`, created empty on first use.
    pub fn find_or_make(&self, name: &str) -> Namespace {
        let mut registry = self.inner.borrow_mut();
        if let Some(ns) = registry.get(name) {
            return ns.clone();
        }
        let ns = Namespace::new(name);
        registry.insert(name.to_string(), ns.clone());
        ns
    }

    pub fn get(&self, name: &str) -> Option<Namespace> {
        self.inner.borrow().get(name).cloned()
    }

    /// Intern a Var, creating the namespace as needed.
    pub fn intern_var(&self, ns: &str, name: &str) -> Var {
        self.find_or_make(ns).intern_or_make(name)
    }

    /// The Var under `ns/name` when both the namespace and the Var exist.
    /// Never creates either.
    pub fn get_var_if_defined(&self, ns: &str, name: &str) -> Option<Var> {
        self.get(ns)?.get_var(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_interning_is_idempotent() {
        let registry = NamespaceRegistry::new();
        let a = registry.intern_var("user", "x");
        let b = registry.intern_var("user", "x");
        assert_eq!(a, b);
        let c = registry.intern_var("user", "y");
        assert_ne!(a, c);
    }

    #[test]
    fn test_undefined_var_deref_errors() {
        let registry = NamespaceRegistry::new();
        let v = registry.intern_var("user", "x");
        assert!(!v.is_defined());
        let err = v.deref().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UndefinedVar { name } if name == "user/x"));

        v.set_root(Value::Int(1));
        assert_eq!(v.deref().unwrap(), Value::Int(1));
    }

    #[test]
    fn test_set_root_reaches_existing_handles() {
        let registry = NamespaceRegistry::new();
        let v = registry.intern_var("user", "x");
        let same = v.clone();
        v.set_root(Value::Int(1));
        assert_eq!(same.deref().unwrap(), Value::Int(1));
        v.set_root(Value::Int(2));
        assert_eq!(same.deref().unwrap(), Value::Int(2));
    }

    #[test]
    fn test_set_root_bumps_namespace_rev() {
        let registry = NamespaceRegistry::new();
        let ns = registry.find_or_make("user");
        let rev = ns.rev();
        registry.intern_var("user", "x").set_root(Value::Nil);
        assert!(ns.rev() > rev);
    }

    #[test]
    fn test_get_var_if_defined_never_creates() {
        let registry = NamespaceRegistry::new();
        assert!(registry.get_var_if_defined("nope", "x").is_none());
        assert!(registry.get("nope").is_none());

        registry.intern_var("user", "x");
        assert!(registry.get_var_if_defined("user", "x").is_some());
        assert!(registry.get_var_if_defined("user", "y").is_none());
    }

    #[test]
    fn test_resolve_unqualified() {
        let registry = NamespaceRegistry::new();
        let user = registry.find_or_make("user");
        let v = user.intern_or_make("x");
        let found = user.resolve(&registry, &Symbol::new("x"), true).unwrap();
        assert_eq!(found, Some(v));
        let missing = user.resolve(&registry, &Symbol::new("y"), true).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_resolve_qualified_through_alias() {
        let registry = NamespaceRegistry::new();
        let core = registry.find_or_make("lutra.core");
        let v = core.intern_or_make("map");
        let user = registry.find_or_make("user");
        user.add_refer(&core, Some("c"), false);

        let found = user
            .resolve(&registry, &Symbol::parse("c/map"), true)
            .unwrap();
        assert_eq!(found, Some(v.clone()));

        // The full namespace name also resolves, via the registry.
        let found = user
            .resolve(&registry, &Symbol::parse("lutra.core/map"), true)
            .unwrap();
        assert_eq!(found, Some(v));
    }

    #[test]
    fn test_resolve_unknown_namespace_errors() {
        let registry = NamespaceRegistry::new();
        let user = registry.find_or_make("user");
        let err = user
            .resolve(&registry, &Symbol::parse("nope/x"), true)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"), "{}", msg);
        assert!(msg.contains("user"), "{}", msg);
    }

    #[test]
    fn test_refer_all_falls_through() {
        let registry = NamespaceRegistry::new();
        let core = registry.find_or_make("lutra.core");
        let v = core.intern_or_make("map");
        let user = registry.find_or_make("user");

        let missing = user.resolve(&registry, &Symbol::new("map"), true).unwrap();
        assert_eq!(missing, None);

        user.add_refer(&core, None, true);
        let found = user.resolve(&registry, &Symbol::new("map"), true).unwrap();
        assert_eq!(found, Some(v));

        // use_refers=false stays local.
        let local = user.resolve(&registry, &Symbol::new("map"), false).unwrap();
        assert_eq!(local, None);
    }

    #[test]
    fn test_filtered_refer_only_exposes_listed_names() {
        let registry = NamespaceRegistry::new();
        let core = registry.find_or_make("lutra.core");
        core.intern_or_make("map");
        core.intern_or_make("reduce");
        let user = registry.find_or_make("user");
        user.add_refer_filtered(&core, None, vec!["map".to_string()]);

        assert!(user
            .resolve(&registry, &Symbol::new("map"), true)
            .unwrap()
            .is_some());
        assert!(user
            .resolve(&registry, &Symbol::new("reduce"), true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_refers_resolve_in_registration_order() {
        let registry = NamespaceRegistry::new();
        let first = registry.find_or_make("first");
        let second = registry.find_or_make("second");
        let v1 = first.intern_or_make("x");
        let v2 = second.intern_or_make("x");
        assert_ne!(v1, v2);

        let user = registry.find_or_make("user");
        user.add_refer(&first, None, true);
        user.add_refer(&second, None, true);
        let found = user.resolve(&registry, &Symbol::new("x"), true).unwrap();
        assert_eq!(found, Some(v1));
    }

    #[test]
    fn test_add_refer_symbol_reports_shadowing() {
        let registry = NamespaceRegistry::new();
        let core = registry.find_or_make("lutra.core");
        let v = core.intern_or_make("map");
        let user = registry.find_or_make("user");

        assert!(user.add_refer_symbol(&Symbol::new("map"), v.clone()).is_none());
        assert_eq!(user.get_var("map"), Some(v.clone()));

        let other = core.intern_or_make("mapv");
        let prev = user.add_refer_symbol(&Symbol::new("map"), other);
        assert_eq!(prev, Some(v));
    }

    #[test]
    fn test_var_is_callable() {
        use crate::code::NativeFn;
        let registry = NamespaceRegistry::new();
        let v = registry.intern_var("user", "add");
        v.set_root(Value::Fn(
            NativeFn::new("add", |args| match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                _ => Err(Error::invalid_argument("expected ints")),
            })
            .into_ref(),
        ));
        let out = v.invoke(&[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(out, Value::Int(3));

        // Redefinition reaches callers holding the Var.
        v.set_root(Value::Fn(
            NativeFn::new("mul", |args| match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
                _ => Err(Error::invalid_argument("expected ints")),
            })
            .into_ref(),
        ));
        let out = v.invoke(&[Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(out, Value::Int(6));
    }

    #[test]
    fn test_calling_non_fn_var_errors() {
        let registry = NamespaceRegistry::new();
        let v = registry.intern_var("user", "n");
        v.set_root(Value::Int(1));
        let err = v.invoke(&[]).unwrap_err();
        assert!(err.to_string().contains("Cannot call"), "{}", err);
    }
}
