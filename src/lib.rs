// lutra-core - Object model and dispatch core for the Lutra runtime
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # lutra-core
//!
//! Object model and dispatch core for the Lutra runtime: persistent
//! collections, the callable contract, open polymorphic dispatch, and the
//! Var/namespace system with dynamically scoped bindings.
//!
//! The crate is the substrate an evaluator sits on. It owns values,
//! calling conventions and name resolution; execution of interpreted code
//! is delegated to a hook installed with [`install_interpreter`].

pub mod bindings;
pub mod code;
pub mod error;
pub mod map;
pub mod namespace;
pub mod protocol;
pub mod set;
pub mod symbol;
pub mod types;
pub mod value;

pub use bindings::{
    get_var_value, pop_binding_frame, push_binding_frame, push_bindings, BindingGuard,
};
pub use code::{
    install_interpreter, Callable, CallableRef, Closure, Code, InterpretFn, MultiArityFn,
    NativeFn, VariadicCode,
};
pub use error::{Error, ErrorKind, Result};
pub use map::PersistentMap;
pub use namespace::{Namespace, NamespaceRegistry, Var};
pub use protocol::{defprotocol, DoublePolymorphicFn, PolymorphicFn, Protocol};
pub use set::PersistentSet;
pub use symbol::Symbol;
pub use types::Type;
pub use value::{hash_value, Value};
