// lutra-core - Error types for the object/dispatch core
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error taxonomy for the Lutra object core.
//!
//! Every error carries a structured kind plus a call-stack trace that is
//! accumulated as the error unwinds: each invocation boundary (interpreted
//! code, closure, protocol dispatch, native wrapper) appends a frame naming
//! itself and re-raises the error otherwise unchanged. Nothing in this crate
//! decides process termination; callers render the trace.

use std::fmt;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error with a structured kind and an accumulated trace.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    trace: Vec<TraceFrame>,
}

/// The kinds of errors this core raises.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// Wrong number of arguments to a callable.
    Arity {
        name: Option<String>,
        expected: AritySpec,
        got: usize,
    },
    /// Dereferencing a non-dynamic Var whose root was never set.
    UndefinedVar { name: String },
    /// A symbol's namespace qualifier did not resolve.
    UnresolvedSymbol {
        symbol: String,
        in_ns: Option<String>,
    },
    /// Protocol dispatch exhausted the ancestor chain.
    NoImplementation {
        type_name: String,
        method: String,
        protocol: String,
    },
    /// A value was rejected by an operation (wrong shape, not callable, ...).
    InvalidArgument(String),
    /// Internal invariant violation.
    Internal(String),
}

/// Specification for expected arity.
#[derive(Debug, Clone)]
pub enum AritySpec {
    Exact(usize),
    AtLeast(usize),
    /// A fixed set of valid arities, plus an optional open-ended rest arity.
    /// Renders as "1, 2 or 3+".
    OneOf {
        arities: Vec<usize>,
        rest_min: Option<usize>,
    },
}

impl fmt::Display for AritySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AritySpec::Exact(n) => write!(f, "{}", n),
            AritySpec::AtLeast(n) => write!(f, "at least {}", n),
            AritySpec::OneOf { arities, rest_min } => {
                let mut words: Vec<String> = arities.iter().map(|a| a.to_string()).collect();
                if let Some(r) = rest_min {
                    words.push(format!("{}+", r));
                }
                write!(f, "{}", join_last(&words, "or"))
            }
        }
    }
}

/// Joins by commas, using `sep` before the last word.
/// `join_last(&["1", "2", "3+"], "or")` is `"1, 2 or 3+"`.
fn join_last(words: &[String], sep: &str) -> String {
    match words {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} {} {}", init.join(", "), sep, last),
    }
}

/// One level of the accumulated error trace.
#[derive(Debug, Clone)]
pub enum TraceFrame {
    /// An interpreted code object (or the code underlying a closure).
    Code(String),
    /// A protocol-dispatch boundary, naming the method and dispatch type.
    Protocol {
        method: String,
        dispatch_type: String,
    },
    /// A native function wrapper.
    Native(String),
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceFrame::Code(name) => write!(f, "in {}", name),
            TraceFrame::Protocol {
                method,
                dispatch_type,
            } => write!(f, "in {} dispatching on {}", method, dispatch_type),
            TraceFrame::Native(name) => write!(f, "in native fn {}", name),
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            trace: Vec::new(),
        }
    }

    /// The structured kind tag.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Frames accumulated so far, innermost first.
    pub fn trace(&self) -> &[TraceFrame] {
        &self.trace
    }

    /// Append a trace frame, returning the error for use in `map_err`.
    #[must_use]
    pub fn with_frame(mut self, frame: TraceFrame) -> Self {
        self.trace.push(frame);
        self
    }

    /// Create an arity error for an exact expected count.
    pub fn arity(name: impl Into<String>, expected: usize, got: usize) -> Self {
        Error::new(ErrorKind::Arity {
            name: Some(name.into()),
            expected: AritySpec::Exact(expected),
            got,
        })
    }

    /// Create an arity error for a minimum expected count.
    pub fn arity_at_least(name: Option<String>, expected: usize, got: usize) -> Self {
        Error::new(ErrorKind::Arity {
            name,
            expected: AritySpec::AtLeast(expected),
            got,
        })
    }

    pub fn undefined_var(name: impl Into<String>) -> Self {
        Error::new(ErrorKind::UndefinedVar { name: name.into() })
    }

    pub fn unresolved(symbol: impl Into<String>, in_ns: Option<String>) -> Self {
        Error::new(ErrorKind::UnresolvedSymbol {
            symbol: symbol.into(),
            in_ns,
        })
    }

    pub fn no_implementation(
        type_name: impl Into<String>,
        method: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        Error::new(ErrorKind::NoImplementation {
            type_name: type_name.into(),
            method: method.into(),
            protocol: protocol.into(),
        })
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal(msg.into()))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Arity {
                name,
                expected,
                got,
            } => {
                if let Some(name) = name {
                    write!(
                        f,
                        "Wrong number of arguments to '{}': expected {}, got {}",
                        name, expected, got
                    )
                } else {
                    write!(
                        f,
                        "Wrong number of arguments: expected {}, got {}",
                        expected, got
                    )
                }
            }
            ErrorKind::UndefinedVar { name } => {
                write!(f, "Var {} is undefined", name)
            }
            ErrorKind::UnresolvedSymbol { symbol, in_ns } => {
                if let Some(ns) = in_ns {
                    write!(
                        f,
                        "Unable to resolve namespace: {} inside namespace {}",
                        symbol, ns
                    )
                } else {
                    write!(f, "Unable to resolve symbol: {}", symbol)
                }
            }
            ErrorKind::NoImplementation {
                type_name,
                method,
                protocol,
            } => {
                write!(
                    f,
                    "No implementation of '{}' for type {} in protocol {}",
                    method, type_name, protocol
                )
            }
            ErrorKind::InvalidArgument(msg) => write!(f, "{}", msg),
            ErrorKind::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
