// lutra-core - Protocols and polymorphic dispatch
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Open polymorphic dispatch.
//!
//! A [`Protocol`] groups polymorphic fns and records which types satisfy
//! it. A [`PolymorphicFn`] dispatches on the type of its first argument:
//! exact implementation first, then protocol-extended implementations,
//! then up the parent chain. Resolution is memoized per leaf type and
//! gated on a revision counter, so extending after the fact invalidates
//! stale cache entries without touching callers.
//!
//! [`DoublePolymorphicFn`] dispatches on the first two argument types with
//! no ancestor walk and no cache.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::code::{Callable, CallableRef};
use crate::error::{Error, Result, TraceFrame};
use crate::namespace::NamespaceRegistry;
use crate::types::Type;
use crate::value::Value;

struct ProtocolInner {
    name: String,
    methods: RefCell<Vec<String>>,
    satisfies: RefCell<FxHashSet<Type>>,
    rev: Cell<u64>,
}

/// A named group of polymorphic fns with a satisfaction registry.
#[derive(Clone)]
pub struct Protocol {
    inner: Rc<ProtocolInner>,
}

impl Protocol {
    pub fn new(name: impl Into<String>) -> Protocol {
        Protocol {
            inner: Rc::new(ProtocolInner {
                name: name.into(),
                methods: RefCell::new(Vec::new()),
                satisfies: RefCell::new(FxHashSet::default()),
                rev: Cell::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Names of the methods registered under this protocol.
    pub fn method_names(&self) -> Vec<String> {
        self.inner.methods.borrow().clone()
    }

    fn add_method(&self, name: &str) {
        self.inner.methods.borrow_mut().push(name.to_string());
    }

    pub fn add_satisfies(&self, tp: Type) {
        self.inner.satisfies.borrow_mut().insert(tp);
        self.inner.rev.set(self.inner.rev.get() + 1);
    }

    /// Whether `tp` was registered as satisfying this protocol. Exact
    /// registration only; the ancestor walk happens in the polymorphic fn.
    pub fn satisfies(&self, tp: &Type) -> bool {
        self.inner.satisfies.borrow().contains(tp)
    }

    pub fn rev(&self) -> u64 {
        self.inner.rev.get()
    }

    pub(crate) fn ident_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Protocol {}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.name)
    }
}

struct PolymorphicFnInner {
    name: String,
    protocol: Protocol,
    impls: RefCell<FxHashMap<Type, CallableRef>>,
    /// Protocol-extended implementations, in extension order.
    proto_impls: RefCell<Vec<(Protocol, CallableRef)>>,
    default_fn: RefCell<Option<CallableRef>>,
    rev: Cell<u64>,
    /// Memoized resolutions keyed by the original leaf type, each paired
    /// with the revision it was computed at.
    cache: RefCell<FxHashMap<Type, (u64, Option<CallableRef>)>>,
}

/// A function polymorphic on the type of its first argument.
#[derive(Clone)]
pub struct PolymorphicFn {
    inner: Rc<PolymorphicFnInner>,
}

impl PolymorphicFn {
    pub fn new(name: impl Into<String>, protocol: &Protocol) -> PolymorphicFn {
        let name = name.into();
        protocol.add_method(&name);
        PolymorphicFn {
            inner: Rc::new(PolymorphicFnInner {
                name,
                protocol: protocol.clone(),
                impls: RefCell::new(FxHashMap::default()),
                proto_impls: RefCell::new(Vec::new()),
                default_fn: RefCell::new(None),
                rev: Cell::new(0),
                cache: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.inner.protocol
    }

    fn bump_rev(&self) {
        self.inner.rev.set(self.inner.rev.get() + 1);
        self.inner.cache.borrow_mut().clear();
    }

    /// Register an implementation for `tp`, marking it as satisfying the
    /// protocol. Subtypes without their own implementation inherit it.
    pub fn extend(&self, tp: Type, f: CallableRef) {
        self.inner.impls.borrow_mut().insert(tp.clone(), f);
        self.bump_rev();
        self.inner.protocol.add_satisfies(tp);
    }

    /// Register an implementation for every type satisfying `proto`.
    /// Checked after exact implementations at each level of the walk.
    pub fn extend_protocol(&self, proto: Protocol, f: CallableRef) {
        self.inner.proto_impls.borrow_mut().push((proto, f));
        self.bump_rev();
    }

    /// Install the fallback invoked when no implementation matches.
    pub fn set_default_fn(&self, f: CallableRef) {
        *self.inner.default_fn.borrow_mut() = Some(f);
        self.bump_rev();
    }

    /// Walk `tp` and its ancestors for an implementation.
    fn find_fn(&self, tp: &Type) -> Option<CallableRef> {
        let impls = self.inner.impls.borrow();
        let proto_impls = self.inner.proto_impls.borrow();
        let mut cur = Some(tp.clone());
        while let Some(t) = cur {
            if let Some(f) = impls.get(&t) {
                return Some(f.clone());
            }
            for (proto, f) in proto_impls.iter() {
                if proto.satisfies(&t) {
                    return Some(f.clone());
                }
            }
            cur = t.parent().cloned();
        }
        None
    }

    /// Resolve the implementation for leaf type `tp`, consulting the cache
    /// when its entry carries the current revision.
    pub fn get_protocol_fn(&self, tp: &Type) -> Option<CallableRef> {
        let rev = self.inner.rev.get();
        if let Some((cached_rev, f)) = self.inner.cache.borrow().get(tp) {
            if *cached_rev == rev {
                return f.clone();
            }
        }
        let f = self.find_fn(tp);
        self.inner
            .cache
            .borrow_mut()
            .insert(tp.clone(), (rev, f.clone()));
        f
    }
}

impl Callable for PolymorphicFn {
    fn name(&self) -> Option<&str> {
        Some(&self.inner.name)
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.is_empty() {
            return Err(Error::arity_at_least(
                Some(self.inner.name.clone()),
                1,
                0,
            ));
        }
        let tp = args[0].type_tag();
        let resolved = self
            .get_protocol_fn(&tp)
            .or_else(|| self.inner.default_fn.borrow().clone());
        let Some(f) = resolved else {
            return Err(Error::no_implementation(
                tp.name(),
                &self.inner.name,
                self.inner.protocol.name(),
            ));
        };
        f.invoke(args).map_err(|e| {
            e.with_frame(TraceFrame::Protocol {
                method: self.inner.name.clone(),
                dispatch_type: tp.name().to_string(),
            })
        })
    }
}

impl PartialEq for PolymorphicFn {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PolymorphicFn {}

struct DoublePolymorphicFnInner {
    name: String,
    protocol: Protocol,
    impls: RefCell<FxHashMap<Type, FxHashMap<Type, CallableRef>>>,
    default_fn: RefCell<Option<CallableRef>>,
    rev: Cell<u64>,
}

/// A function polymorphic on the types of its first two arguments.
/// Dispatch is exact on both types.
#[derive(Clone)]
pub struct DoublePolymorphicFn {
    inner: Rc<DoublePolymorphicFnInner>,
}

impl DoublePolymorphicFn {
    pub fn new(name: impl Into<String>, protocol: &Protocol) -> DoublePolymorphicFn {
        let name = name.into();
        protocol.add_method(&name);
        DoublePolymorphicFn {
            inner: Rc::new(DoublePolymorphicFnInner {
                name,
                protocol: protocol.clone(),
                impls: RefCell::new(FxHashMap::default()),
                default_fn: RefCell::new(None),
                rev: Cell::new(0),
            }),
        }
    }

    pub fn extend2(&self, tp1: Type, tp2: Type, f: CallableRef) {
        self.inner
            .impls
            .borrow_mut()
            .entry(tp1.clone())
            .or_default()
            .insert(tp2, f);
        self.inner.rev.set(self.inner.rev.get() + 1);
        self.inner.protocol.add_satisfies(tp1);
    }

    pub fn set_default_fn(&self, f: CallableRef) {
        *self.inner.default_fn.borrow_mut() = Some(f);
        self.inner.rev.set(self.inner.rev.get() + 1);
    }

    fn get_fn(&self, tp1: &Type, tp2: &Type) -> Option<CallableRef> {
        self.inner
            .impls
            .borrow()
            .get(tp1)
            .and_then(|d| d.get(tp2))
            .cloned()
            .or_else(|| self.inner.default_fn.borrow().clone())
    }
}

impl Callable for DoublePolymorphicFn {
    fn name(&self) -> Option<&str> {
        Some(&self.inner.name)
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.len() < 2 {
            return Err(Error::arity_at_least(
                Some(self.inner.name.clone()),
                2,
                args.len(),
            ));
        }
        let tp1 = args[0].type_tag();
        let tp2 = args[1].type_tag();
        let Some(f) = self.get_fn(&tp1, &tp2) else {
            return Err(Error::no_implementation(
                format!("({}, {})", tp1.name(), tp2.name()),
                &self.inner.name,
                self.inner.protocol.name(),
            ));
        };
        f.invoke(args).map_err(|e| {
            e.with_frame(TraceFrame::Protocol {
                method: self.inner.name.clone(),
                dispatch_type: tp1.name().to_string(),
            })
        })
    }
}

/// Define a protocol plus one polymorphic fn per method name, interning a
/// Var for each in `ns`. Returns the protocol and the fns in method order.
pub fn defprotocol(
    registry: &NamespaceRegistry,
    ns: &str,
    name: &str,
    methods: &[&str],
) -> (Protocol, Vec<PolymorphicFn>) {
    let proto = Protocol::new(name);
    registry
        .intern_var(ns, name)
        .set_root(Value::Protocol(proto.clone()));
    let mut fns = Vec::with_capacity(methods.len());
    for method in methods {
        let poly = PolymorphicFn::new(*method, &proto);
        registry
            .intern_var(ns, method)
            .set_root(Value::Fn(Rc::new(poly.clone())));
        fns.push(poly);
    }
    (proto, fns)
}
