// lutra-core - Common test utilities
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared test helpers for lutra-core integration tests.
//!
//! # Usage
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#[allow(unused_imports)]
pub use lutra_core::{
    Callable, CallableRef, Error, NamespaceRegistry, NativeFn, PersistentMap, PersistentSet,
    Result, Value,
};

/// Shorthand for an integer value.
#[allow(dead_code)]
pub fn int(i: i64) -> Value {
    Value::Int(i)
}

/// Shorthand for a string value.
#[allow(dead_code)]
pub fn s(text: &str) -> Value {
    Value::str(text)
}

/// A named native fn returning a constant.
#[allow(dead_code)]
pub fn constant_fn(name: &str, v: Value) -> CallableRef {
    NativeFn::new(name, move |_| Ok(v.clone())).into_ref()
}

/// A map of `n` integer entries, `k -> k * 10`.
#[allow(dead_code)]
pub fn int_map(n: i64) -> PersistentMap {
    let mut m = PersistentMap::new();
    for k in 0..n {
        m = m.assoc(int(k), int(k * 10));
    }
    m
}
