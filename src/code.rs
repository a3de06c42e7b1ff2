// lutra-core - Callable code objects
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The callable contract and its implementations.
//!
//! Everything invocable satisfies [`Callable`]: interpreted code objects,
//! closures over them, the multi-arity and variadic adapters, native
//! functions, and (in their own modules) Vars and polymorphic fns. The
//! contract splits arity validation from execution: `invoke` validates and
//! delegates to `invoke_with`, which carries an explicit self-reference so
//! a function can call itself without capturing itself.
//!
//! Execution of interpreted code is delegated to an installable interpreter
//! hook; this module owns calling conventions, not evaluation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result, TraceFrame};
use crate::value::Value;

/// Shared handle to anything invocable.
pub type CallableRef = Rc<dyn Callable>;

pub trait Callable {
    /// The callable's name, when it has one. Closures and variadic
    /// adapters are anonymous; their underlying code carries the name.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Validate the argument count and execute. The root of the calling
    /// convention: external callers go through here.
    fn invoke(&self, args: &[Value]) -> Result<Value>;

    /// Execute with an explicit self-reference. `self_ref` is what the
    /// running body sees as "this function", which matters when an adapter
    /// wraps the code: self-recursion must re-enter the adapter, not the
    /// bare code object.
    fn invoke_with(&self, args: &[Value], self_ref: &CallableRef) -> Result<Value> {
        let _ = self_ref;
        self.invoke(args)
    }

    /// The captured environment of the running callable. Closures carry
    /// theirs; everything else closes over nothing. Exposed on the trait
    /// so the interpreter can reach captures through the self-reference.
    fn closed_overs(&self) -> &[Value] {
        &[]
    }

    fn meta(&self) -> Option<Value> {
        None
    }

    fn is_macro(&self) -> bool {
        false
    }
}

/// Hook that executes a [`Code`] body. `args` are the validated arguments
/// and the [`CallableRef`] is the self-reference for recursive calls.
pub type InterpretFn = Rc<dyn Fn(&Code, &[Value], &CallableRef) -> Result<Value>>;

thread_local! {
    static INTERPRETER: RefCell<Option<InterpretFn>> = const { RefCell::new(None) };
}

/// Install the interpreter hook for this thread. Code objects created
/// before or after installation all route through the current hook.
pub fn install_interpreter(f: InterpretFn) {
    INTERPRETER.with(|slot| *slot.borrow_mut() = Some(f));
}

fn interpret(code: &Code, args: &[Value], self_ref: &CallableRef) -> Result<Value> {
    INTERPRETER.with(|slot| match &*slot.borrow() {
        Some(f) => f(code, args, self_ref),
        None => Err(Error::internal("no interpreter installed")),
    })
}

struct CodeInner {
    name: String,
    arity: usize,
    bytecode: Rc<[u32]>,
    consts: Rc<[Value]>,
    stack_size: usize,
    debug_points: Rc<FxHashMap<usize, Value>>,
    meta: Option<Value>,
    is_macro: Cell<bool>,
}

/// An interpreted code object: a named body with a fixed arity, its
/// constant pool and bytecode. Cheap to clone; clones share the body.
#[derive(Clone)]
pub struct Code {
    inner: Rc<CodeInner>,
}

impl Code {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        bytecode: Rc<[u32]>,
        consts: Rc<[Value]>,
        stack_size: usize,
    ) -> Code {
        Code {
            inner: Rc::new(CodeInner {
                name: name.into(),
                arity,
                bytecode,
                consts,
                stack_size,
                debug_points: Rc::new(FxHashMap::default()),
                meta: None,
                is_macro: Cell::new(false),
            }),
        }
    }

    /// Attach source positions keyed by bytecode index.
    pub fn with_debug_points(&self, debug_points: FxHashMap<usize, Value>) -> Code {
        Code {
            inner: Rc::new(CodeInner {
                name: self.inner.name.clone(),
                arity: self.inner.arity,
                bytecode: self.inner.bytecode.clone(),
                consts: self.inner.consts.clone(),
                stack_size: self.inner.stack_size,
                debug_points: Rc::new(debug_points),
                meta: self.inner.meta.clone(),
                is_macro: Cell::new(self.inner.is_macro.get()),
            }),
        }
    }

    pub fn arity(&self) -> usize {
        self.inner.arity
    }

    /// Source position for a bytecode index, when one was recorded.
    pub fn debug_point(&self, ip: usize) -> Option<&Value> {
        self.inner.debug_points.get(&ip)
    }

    pub fn bytecode(&self) -> &[u32] {
        &self.inner.bytecode
    }

    pub fn consts(&self) -> &[Value] {
        &self.inner.consts
    }

    pub fn stack_size(&self) -> usize {
        self.inner.stack_size
    }

    pub fn set_macro(&self) {
        self.inner.is_macro.set(true);
    }

    pub fn with_meta(&self, meta: Value) -> Code {
        Code {
            inner: Rc::new(CodeInner {
                name: self.inner.name.clone(),
                arity: self.inner.arity,
                bytecode: self.inner.bytecode.clone(),
                consts: self.inner.consts.clone(),
                stack_size: self.inner.stack_size,
                debug_points: self.inner.debug_points.clone(),
                meta: Some(meta),
                is_macro: Cell::new(self.inner.is_macro.get()),
            }),
        }
    }
}

impl Callable for Code {
    fn name(&self) -> Option<&str> {
        Some(&self.inner.name)
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.inner.arity {
            return Err(Error::arity(
                self.inner.name.clone(),
                self.inner.arity,
                args.len(),
            ));
        }
        let self_ref: CallableRef = Rc::new(self.clone());
        self.invoke_with(args, &self_ref)
    }

    fn invoke_with(&self, args: &[Value], self_ref: &CallableRef) -> Result<Value> {
        interpret(self, args, self_ref)
            .map_err(|e| e.with_frame(TraceFrame::Code(self.inner.name.clone())))
    }

    fn meta(&self) -> Option<Value> {
        self.inner.meta.clone()
    }

    fn is_macro(&self) -> bool {
        self.inner.is_macro.get()
    }
}

struct ClosureInner {
    code: Code,
    closed_overs: Rc<[Value]>,
    meta: Option<Value>,
}

/// A [`Code`] paired with its captured environment. Anonymous; the wrapped
/// code keeps the name for traces.
#[derive(Clone)]
pub struct Closure {
    inner: Rc<ClosureInner>,
}

impl Closure {
    pub fn new(code: Code, closed_overs: Rc<[Value]>) -> Closure {
        Closure {
            inner: Rc::new(ClosureInner {
                code,
                closed_overs,
                meta: None,
            }),
        }
    }

    pub fn code(&self) -> &Code {
        &self.inner.code
    }

    pub fn closed_over(&self, idx: usize) -> &Value {
        &self.inner.closed_overs[idx]
    }

    pub fn with_meta(&self, meta: Value) -> Closure {
        Closure {
            inner: Rc::new(ClosureInner {
                code: self.inner.code.clone(),
                closed_overs: self.inner.closed_overs.clone(),
                meta: Some(meta),
            }),
        }
    }
}

impl Callable for Closure {
    fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.inner.code.arity() {
            let name = self.inner.code.inner.name.clone();
            return Err(Error::arity(name, self.inner.code.arity(), args.len()));
        }
        let self_ref: CallableRef = Rc::new(self.clone());
        self.invoke_with(args, &self_ref)
    }

    fn invoke_with(&self, args: &[Value], self_ref: &CallableRef) -> Result<Value> {
        // The interpreter receives the closure (not the bare code) as the
        // running callable so closed-overs stay reachable.
        interpret(&self.inner.code, args, self_ref)
            .map_err(|e| e.with_frame(TraceFrame::Code(self.inner.code.inner.name.clone())))
    }

    fn closed_overs(&self) -> &[Value] {
        &self.inner.closed_overs
    }

    fn meta(&self) -> Option<Value> {
        self.inner.meta.clone()
    }
}

struct NativeFnInner {
    name: String,
    f: Box<dyn Fn(&[Value]) -> Result<Value>>,
}

/// A host function exposed to the runtime. Validation is the function's
/// own business; no arity is enforced here.
#[derive(Clone)]
pub struct NativeFn {
    inner: Rc<NativeFnInner>,
}

impl NativeFn {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> NativeFn {
        NativeFn {
            inner: Rc::new(NativeFnInner {
                name: name.into(),
                f: Box::new(f),
            }),
        }
    }

    /// Wrap as a shared callable handle.
    pub fn into_ref(self) -> CallableRef {
        Rc::new(self)
    }
}

impl Callable for NativeFn {
    fn name(&self) -> Option<&str> {
        Some(&self.inner.name)
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.inner.f)(args)
            .map_err(|e| e.with_frame(TraceFrame::Native(self.inner.name.clone())))
    }

    // invoke_with ignores the self-reference: native fns recurse natively.
}

struct MultiArityFnInner {
    name: String,
    arities: FxHashMap<usize, CallableRef>,
    required_arity: usize,
    rest_fn: Option<CallableRef>,
    meta: Option<Value>,
}

/// Dispatches on argument count over a set of fixed-arity bodies, with an
/// optional variadic fallback for `required_arity` or more arguments.
#[derive(Clone)]
pub struct MultiArityFn {
    inner: Rc<MultiArityFnInner>,
}

impl MultiArityFn {
    pub fn new(
        name: impl Into<String>,
        arities: FxHashMap<usize, CallableRef>,
        required_arity: usize,
        rest_fn: Option<CallableRef>,
    ) -> MultiArityFn {
        MultiArityFn {
            inner: Rc::new(MultiArityFnInner {
                name: name.into(),
                arities,
                required_arity,
                rest_fn,
                meta: None,
            }),
        }
    }

    pub fn with_meta(&self, meta: Value) -> MultiArityFn {
        MultiArityFn {
            inner: Rc::new(MultiArityFnInner {
                name: self.inner.name.clone(),
                arities: self.inner.arities.clone(),
                required_arity: self.inner.required_arity,
                rest_fn: self.inner.rest_fn.clone(),
                meta: Some(meta),
            }),
        }
    }

    /// Resolve the body for an argument count: exact arity first, then the
    /// rest fn when the count reaches its floor.
    fn get_fn(&self, argc: usize) -> Result<&CallableRef> {
        if let Some(f) = self.inner.arities.get(&argc) {
            return Ok(f);
        }
        if let Some(rest) = &self.inner.rest_fn {
            if argc >= self.inner.required_arity {
                return Ok(rest);
            }
        }
        let mut arities: Vec<usize> = self.inner.arities.keys().copied().collect();
        arities.sort_unstable();
        Err(Error::new(crate::error::ErrorKind::Arity {
            name: Some(self.inner.name.clone()),
            expected: crate::error::AritySpec::OneOf {
                arities,
                rest_min: self.inner.rest_fn.as_ref().map(|_| self.inner.required_arity),
            },
            got: argc,
        }))
    }
}

impl Callable for MultiArityFn {
    fn name(&self) -> Option<&str> {
        Some(&self.inner.name)
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        let self_ref: CallableRef = Rc::new(self.clone());
        self.invoke_with(args, &self_ref)
    }

    fn invoke_with(&self, args: &[Value], self_ref: &CallableRef) -> Result<Value> {
        // The self-reference passes through unchanged: recursion from any
        // body re-dispatches over all arities.
        self.get_fn(args.len())?.invoke_with(args, self_ref)
    }

    fn meta(&self) -> Option<Value> {
        self.inner.meta.clone()
    }
}

struct VariadicCodeInner {
    code: Code,
    required_arity: usize,
    meta: Option<Value>,
}

/// Adapts a fixed-arity body to a variadic calling convention: the body's
/// last parameter receives the trailing arguments collected into a vector.
#[derive(Clone)]
pub struct VariadicCode {
    inner: Rc<VariadicCodeInner>,
}

impl VariadicCode {
    pub fn new(code: Code, required_arity: usize) -> VariadicCode {
        VariadicCode {
            inner: Rc::new(VariadicCodeInner {
                code,
                required_arity,
                meta: None,
            }),
        }
    }

    pub fn required_arity(&self) -> usize {
        self.inner.required_arity
    }

    pub fn with_meta(&self, meta: Value) -> VariadicCode {
        VariadicCode {
            inner: Rc::new(VariadicCodeInner {
                code: self.inner.code.clone(),
                required_arity: self.inner.required_arity,
                meta: Some(meta),
            }),
        }
    }
}

impl Callable for VariadicCode {
    fn invoke(&self, args: &[Value]) -> Result<Value> {
        let self_ref: CallableRef = Rc::new(self.clone());
        self.invoke_with(args, &self_ref)
    }

    fn invoke_with(&self, args: &[Value], self_ref: &CallableRef) -> Result<Value> {
        let required = self.inner.required_arity;
        let argc = args.len();
        if required == 0 {
            return self
                .inner
                .code
                .invoke_with(&[Value::vector(args.to_vec())], self_ref);
        }
        if argc == required {
            let mut new_args = args.to_vec();
            new_args.push(Value::vector(Vec::new()));
            return self.inner.code.invoke_with(&new_args, self_ref);
        }
        if argc > required {
            let mut new_args = args[..required].to_vec();
            new_args.push(Value::vector(args[required..].to_vec()));
            return self.inner.code.invoke_with(&new_args, self_ref);
        }
        Err(Error::arity_at_least(
            Some(self.inner.code.inner.name.clone()),
            required,
            argc,
        ))
    }

    fn meta(&self) -> Option<Value> {
        self.inner.meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AritySpec, ErrorKind};

    fn native(name: &str, f: impl Fn(&[Value]) -> Result<Value> + 'static) -> CallableRef {
        NativeFn::new(name, f).into_ref()
    }

    fn code(name: &str, arity: usize) -> Code {
        Code::new(name, arity, Rc::from(vec![]), Rc::from(vec![]), 0)
    }

    #[test]
    fn test_native_fn_invoke() {
        let add = native("add2", |args| match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            _ => Err(Error::invalid_argument("expected ints")),
        });
        let out = add.invoke(&[Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(out, Value::Int(5));
    }

    #[test]
    fn test_native_fn_error_carries_trace_frame() {
        let boom = native("boom", |_| Err(Error::invalid_argument("bad")));
        let err = boom.invoke(&[]).unwrap_err();
        assert!(matches!(err.trace(), [TraceFrame::Native(n)] if n == "boom"));
    }

    #[test]
    fn test_code_arity_check() {
        let code = code("two-arg", 2);
        let err = code.invoke(&[Value::Int(1)]).unwrap_err();
        match err.kind() {
            ErrorKind::Arity {
                name: Some(n),
                expected: AritySpec::Exact(2),
                got: 1,
            } => assert_eq!(n, "two-arg"),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_code_routes_through_interpreter() {
        install_interpreter(Rc::new(|code, args, _self_ref| {
            assert_eq!(code.name(), Some("double"));
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(n * 2)),
                _ => Err(Error::invalid_argument("expected int")),
            }
        }));
        let code = code("double", 1);
        assert_eq!(code.invoke(&[Value::Int(21)]).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_interpreter_error_gains_code_frame() {
        install_interpreter(Rc::new(|_, _, _| Err(Error::internal("body failed"))));
        let code = code("fails", 0);
        let err = code.invoke(&[]).unwrap_err();
        assert!(matches!(err.trace(), [TraceFrame::Code(n)] if n == "fails"));
    }

    #[test]
    fn test_interpreter_reads_captures_through_self_reference() {
        // Two closures over the same body must behave differently when the
        // body reads its captured environment.
        install_interpreter(Rc::new(|_, _, self_ref| {
            Ok(self_ref.closed_overs()[0].clone())
        }));
        let body = code("read-capture", 0);
        let a = Closure::new(body.clone(), Rc::from(vec![Value::Int(1)]));
        let b = Closure::new(body, Rc::from(vec![Value::Int(2)]));
        assert_eq!(a.invoke(&[]).unwrap(), Value::Int(1));
        assert_eq!(b.invoke(&[]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_plain_code_closes_over_nothing() {
        let c = code("bare", 0);
        assert!(Callable::closed_overs(&c).is_empty());
    }

    #[test]
    fn test_multi_arity_picks_exact_then_rest() {
        let mut arities = FxHashMap::default();
        arities.insert(1usize, native("one", |_| Ok(Value::str("one"))));
        arities.insert(2usize, native("two", |_| Ok(Value::str("two"))));
        let rest = native("rest", |args| Ok(Value::Int(args.len() as i64)));
        let f = MultiArityFn::new("poly", arities, 3, Some(rest));

        assert_eq!(f.invoke(&[Value::Nil]).unwrap(), Value::str("one"));
        assert_eq!(f.invoke(&[Value::Nil, Value::Nil]).unwrap(), Value::str("two"));
        let five = vec![Value::Nil; 5];
        assert_eq!(f.invoke(&five).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_multi_arity_error_lists_arities() {
        let mut arities = FxHashMap::default();
        arities.insert(1usize, native("one", |_| Ok(Value::Nil)));
        arities.insert(2usize, native("two", |_| Ok(Value::Nil)));
        let rest = native("rest", |_| Ok(Value::Nil));
        let f = MultiArityFn::new("poly", arities, 3, Some(rest));

        let err = f.invoke(&[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("poly"), "{}", msg);
        assert!(msg.contains("1, 2 or 3+"), "{}", msg);
    }

    #[test]
    fn test_multi_arity_without_rest() {
        let mut arities = FxHashMap::default();
        arities.insert(2usize, native("two", |_| Ok(Value::Nil)));
        let f = MultiArityFn::new("only-two", arities, 0, None);
        let err = f.invoke(&[Value::Nil]).unwrap_err();
        assert!(err.to_string().contains("expected 2"), "{}", err);
    }

    #[test]
    fn test_variadic_collects_rest() {
        install_interpreter(Rc::new(|_, args, _| {
            // Body of (fn [a rest] rest).
            assert_eq!(args.len(), 2);
            Ok(args[1].clone())
        }));
        let code = code("var", 2);
        let f = VariadicCode::new(code, 1);

        // Exactly the required count: rest is empty.
        let out = f.invoke(&[Value::Int(1)]).unwrap();
        assert_eq!(out, Value::vector(Vec::new()));

        // Beyond the required count: trailing args collected in order.
        let out = f
            .invoke(&[Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap();
        assert_eq!(out, Value::vector(vec![Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn test_variadic_zero_required_wraps_everything() {
        install_interpreter(Rc::new(|_, args, _| {
            assert_eq!(args.len(), 1);
            Ok(args[0].clone())
        }));
        let code = code("var0", 1);
        let f = VariadicCode::new(code, 0);
        let out = f.invoke(&[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(out, Value::vector(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_variadic_too_few_args() {
        let code = code("var", 3);
        let f = VariadicCode::new(code, 2);
        let err = f.invoke(&[Value::Int(1)]).unwrap_err();
        match err.kind() {
            ErrorKind::Arity {
                expected: AritySpec::AtLeast(2),
                got: 1,
                ..
            } => {}
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_debug_points_survive_meta_update() {
        let mut points = FxHashMap::default();
        points.insert(3usize, Value::str("line 12"));
        let code = code("traced", 0).with_debug_points(points);
        assert_eq!(code.debug_point(3), Some(&Value::str("line 12")));
        assert_eq!(code.debug_point(4), None);

        let with_meta = code.with_meta(Value::Nil);
        assert_eq!(with_meta.debug_point(3), Some(&Value::str("line 12")));
    }

    #[test]
    fn test_self_reference_reenters_adapter() {
        // The body calls its self-reference with one fewer argument; for a
        // multi-arity fn that must re-dispatch across arities.
        install_interpreter(Rc::new(|code, args, self_ref| match code.name() {
            Some("count-down") => match &args[0] {
                Value::Int(0) => Ok(Value::str("done")),
                Value::Int(n) => self_ref.invoke(&[Value::Int(n - 1)]),
                _ => unreachable!(),
            },
            _ => unreachable!(),
        }));
        let one = code("count-down", 1);
        let two = code("count-down", 2);
        let mut arities: FxHashMap<usize, CallableRef> = FxHashMap::default();
        arities.insert(1, Rc::new(one));
        arities.insert(2, Rc::new(two));
        let f = MultiArityFn::new("count-down", arities, 0, None);

        // Entering through the two-arg body still reaches the one-arg body
        // via the self-reference.
        let out = f.invoke(&[Value::Int(1), Value::Nil]).unwrap();
        assert_eq!(out, Value::str("done"));
    }
}
