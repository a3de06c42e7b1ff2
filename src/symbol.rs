// lutra-core - Interned symbols
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Symbols are identifiers with an optional namespace qualifier.
//!
//! Symbols are interned through a process-global interner: two symbols with
//! the same qualifier and name share storage, so equality and hashing are
//! pointer operations. Interned symbols are never deallocated; programs use
//! a bounded symbol vocabulary, so the monotonic growth is acceptable.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

/// An interned, optionally namespace-qualified identifier.
#[derive(Clone)]
pub struct Symbol {
    inner: Arc<SymbolInner>,
}

#[derive(Debug)]
struct SymbolInner {
    namespace: Option<Arc<str>>,
    name: Arc<str>,
}

type InternKey = (Option<Arc<str>>, Arc<str>);

#[derive(Default)]
struct Interner {
    symbols: HashMap<InternKey, Arc<SymbolInner>>,
    strings: HashMap<String, Arc<str>>,
}

impl Interner {
    fn intern_str(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(s);
        self.strings.insert(s.to_string(), Arc::clone(&interned));
        interned
    }

    fn intern(&mut self, namespace: Option<&str>, name: &str) -> Arc<SymbolInner> {
        let ns = namespace.map(|s| self.intern_str(s));
        let name = self.intern_str(name);
        let key = (ns.clone(), name.clone());
        if let Some(existing) = self.symbols.get(&key) {
            return Arc::clone(existing);
        }
        let inner = Arc::new(SymbolInner {
            namespace: ns,
            name,
        });
        self.symbols.insert(key, Arc::clone(&inner));
        inner
    }
}

static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();

fn interner() -> &'static Mutex<Interner> {
    INTERNER.get_or_init(|| Mutex::new(Interner::default()))
}

impl Symbol {
    /// Create an unqualified symbol.
    pub fn new(name: &str) -> Self {
        let inner = interner()
            .lock()
            .expect("symbol interner mutex poisoned")
            .intern(None, name);
        Symbol { inner }
    }

    /// Create a namespace-qualified symbol.
    pub fn qualified(namespace: &str, name: &str) -> Self {
        let inner = interner()
            .lock()
            .expect("symbol interner mutex poisoned")
            .intern(Some(namespace), name);
        Symbol { inner }
    }

    /// Parse "foo" or "ns/foo". A bare "/" is the division symbol.
    pub fn parse(s: &str) -> Self {
        match s.find('/') {
            Some(pos) if s != "/" => Symbol::qualified(&s[..pos], &s[pos + 1..]),
            _ => Symbol::new(s),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.inner.namespace.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn ident_ptr(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.inner.namespace {
            write!(f, "{}/{}", ns, self.inner.name)
        } else {
            write!(f, "{}", self.inner.name)
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        // Interning makes pointer comparison sufficient.
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}
