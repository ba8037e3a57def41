//! Runtime error machinery.
//!
//! Inside the dispatch loop an error is plain data: a [`RuntimeError`] turns
//! into an error object plus an in-band throw, handled by the TRY machinery.
//! Only when a throw falls off the bottom of the main fiber does it surface
//! to the embedder as a [`VmError`]. Rust unwinding is never used for
//! script-visible control flow.

use itertools::Itertools;
use thiserror::Error;

use std::fmt;

/// Error taxonomy kinds, script-visible through `GETERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Operand kind mismatch.
    Type,
    /// Wrong argument count for a non-variadic callee.
    Arity,
    /// Out-of-range index or missing key.
    Index,
    /// Domain violation, e.g. a zero for-loop step.
    Value,
    /// Frame stack or register file capacity exceeded.
    StackOverflow,
    /// Fiber protocol violation.
    Fiber,
    /// A user value reached THROW.
    User,
    /// A native callable returned an error.
    Native,
    /// A deadline expired inside a blocking native.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Type => "TypeError",
            Self::Arity => "ArityError",
            Self::Index => "IndexError",
            Self::Value => "ValueError",
            Self::StackOverflow => "StackOverflow",
            Self::Fiber => "FiberError",
            Self::User => "UserError",
            Self::Native => "NativeError",
            Self::Timeout => "Timeout",
        };
        f.write_str(name)
    }
}

/// One stack frame captured at throw time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceFrame {
    /// Name of the executing function.
    pub function: String,
    /// Program counter inside that function.
    pub pc: u32,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function, self.pc)
    }
}

/// An error raised by an opcode, before the stack trace is attached.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    /// Taxonomy kind.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl RuntimeError {
    /// Build an error of an arbitrary kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Operand kind mismatch.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    /// Wrong argument count.
    pub fn arity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arity, message)
    }

    /// Out-of-range index or missing key.
    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, message)
    }

    /// Domain violation.
    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    /// Capacity exceeded.
    pub fn stack_overflow(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StackOverflow, message)
    }

    /// Fiber protocol violation.
    pub fn fiber(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fiber, message)
    }

    /// Error from a native callable.
    pub fn native(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Native, message)
    }
}

/// Error surfaced to the embedder.
#[derive(Debug, Error)]
pub enum VmError {
    /// A throw reached the top of the main fiber uncaught.
    #[error("uncaught {kind}: {message}{}", format_trace(.trace))]
    Uncaught {
        /// Taxonomy kind.
        kind: ErrorKind,
        /// Message of the error value.
        message: String,
        /// Stack captured at throw time, innermost first.
        trace: Vec<TraceFrame>,
    },
    /// A chunk failed to decode.
    #[error(transparent)]
    Decode(#[from] crate::loader::DecodeError),
}

fn format_trace(trace: &[TraceFrame]) -> String {
    if trace.is_empty() {
        String::new()
    } else {
        format!("\n  at {}", trace.iter().join("\n  at "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_render_their_taxonomy_names() {
        assert_eq!(ErrorKind::Type.to_string(), "TypeError");
        assert_eq!(ErrorKind::StackOverflow.to_string(), "StackOverflow");
        assert_eq!(ErrorKind::Fiber.to_string(), "FiberError");
    }

    #[test]
    fn uncaught_errors_render_their_trace() {
        let err = VmError::Uncaught {
            kind: ErrorKind::User,
            message: "boom".into(),
            trace: vec![
                TraceFrame { function: "inner".into(), pc: 4 },
                TraceFrame { function: "main".into(), pc: 9 },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("UserError: boom"));
        assert!(text.contains("at inner:4"));
        assert!(text.contains("at main:9"));
    }
}
