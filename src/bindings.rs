// lutra-core - Dynamic binding frame management
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Thread-local binding frames for dynamic Vars.
//!
//! The frame stack is a `thread_local!` stack of persistent maps keyed by
//! Var. Pushing a frame copies the current one (cheaply, by structural
//! sharing), so a lookup only ever consults the top frame: bindings from
//! enclosing scopes are already present in the copy.
//!
//! [`push_bindings`] is the exception-safe entry point: it returns a guard
//! that pops the frame when dropped, whichever way the scope exits.

use std::cell::RefCell;

use crate::error::Result;
use crate::map::PersistentMap;
use crate::namespace::Var;
use crate::value::Value;

thread_local! {
    /// The binding frame stack. The bottom frame is permanent and empty.
    static FRAMES: RefCell<Vec<PersistentMap>> = RefCell::new(vec![PersistentMap::new()]);
}

/// Push a new binding frame, initially a copy of the current one.
pub fn push_binding_frame() {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let top = frames.last().cloned().unwrap_or_default();
        frames.push(top);
    });
}

/// Pop the current binding frame. The bottom frame never pops.
pub fn pop_binding_frame() {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if frames.len() > 1 {
            frames.pop();
        }
    });
}

/// The current frame's bindings.
pub fn current_frame() -> PersistentMap {
    FRAMES.with(|frames| frames.borrow().last().cloned().unwrap_or_default())
}

/// The binding of `var` in the current frame, if any.
pub(crate) fn binding_of(var: &Var) -> Option<Value> {
    FRAMES.with(|frames| {
        frames
            .borrow()
            .last()
            .and_then(|top| top.get(&Value::Var(var.clone())).cloned())
    })
}

/// The binding of `var` in the current frame, or `fallback` if unbound.
pub fn get_var_value(var: &Var, fallback: Value) -> Value {
    binding_of(var).unwrap_or(fallback)
}

/// Bind `var` in the current frame, replacing it with an updated copy.
pub(crate) fn set_var_value(var: &Var, val: Value) {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let top = frames.last().cloned().unwrap_or_default();
        let updated = top.assoc(Value::Var(var.clone()), val);
        match frames.last_mut() {
            Some(slot) => *slot = updated,
            None => frames.push(updated),
        }
    });
}

/// Push a frame binding each `(var, value)` pair, returning a guard that
/// pops it on drop. Every Var must be dynamic; on failure the frame is
/// popped before the error propagates.
pub fn push_bindings(bindings: Vec<(&Var, Value)>) -> Result<BindingGuard> {
    push_binding_frame();
    for (var, val) in bindings {
        if let Err(e) = var.set_value(val) {
            pop_binding_frame();
            return Err(e);
        }
    }
    Ok(BindingGuard { _private: () })
}

/// Guard that pops one binding frame when dropped.
#[derive(Debug)]
pub struct BindingGuard {
    _private: (),
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        pop_binding_frame();
    }
}
