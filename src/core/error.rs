// This module defines the error types of the JIT using the thiserror crate, and the
// assertion macros used for broken internal invariants. JitError is the one failure a
// caller is expected to handle: a subgraph node whose operation kind has no lowering
// routine. PassError covers IR that a pass cannot rewrite or that fails stage verification,
// and EngineError covers LLVM conversion, execution engine construction and symbol lookup.
// The compiler driver treats pass and engine failures as internal defects and escalates
// them through jit_assert!/jit_fail!, which log at error level and then panic so the
// cleanup guard still runs while the stack unwinds.

//! Error types for the subgraph JIT.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Catchable compile failure reported to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JitError {
    #[error("The JIT backend doesn't currently implement the '{name}' operation")]
    UnsupportedOp { name: String },
}

/// Result type alias for compile operations.
pub type JitResult<T> = Result<T, JitError>;

/// Failure of a single IR pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error("pass '{pass}' failed: {reason}")]
    Failed { pass: &'static str, reason: String },

    #[error("verification after '{pass}' failed: {reason}")]
    Verification { pass: &'static str, reason: String },
}

impl PassError {
    pub fn failed(pass: &'static str, reason: impl Into<String>) -> Self {
        PassError::Failed {
            pass,
            reason: reason.into(),
        }
    }
}

/// Failure while converting to LLVM or running the JIT.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Conversion to LLVM failed: {reason}")]
    Conversion { reason: String },

    #[error("LLVM builder error: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),

    #[error("Failed to construct an execution engine: {reason}")]
    EngineCreation { reason: String },

    #[error("JIT invocation of '{name}' failed: {reason}")]
    FunctionLookup { name: String, reason: String },
}

impl EngineError {
    pub fn conversion(reason: impl Into<String>) -> Self {
        EngineError::Conversion {
            reason: reason.into(),
        }
    }
}

/// Check an internal invariant; on failure log it and panic.
#[macro_export]
macro_rules! jit_assert {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            $crate::jit_fail!($($msg)+);
        }
    };
}

/// Report a broken internal invariant and panic.
#[macro_export]
macro_rules! jit_fail {
    ($($msg:tt)+) => {{
        let message = format!($($msg)+);
        log::error!("JIT internal error: {}", message);
        panic!("{}", message);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_op_message() {
        let err = JitError::UnsupportedOp {
            name: "Relu".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The JIT backend doesn't currently implement the 'Relu' operation"
        );
    }

    #[test]
    fn test_pass_error_display() {
        let err = PassError::failed("lower-tensor-dialect", "rank mismatch");
        assert_eq!(err.to_string(), "pass 'lower-tensor-dialect' failed: rank mismatch");
    }

    #[test]
    #[should_panic(expected = "value 3 out of range")]
    fn test_jit_assert_panics_with_message() {
        let value = 3;
        jit_assert!(value < 2, "value {} out of range", value);
    }

    #[test]
    fn test_jit_assert_passes() {
        jit_assert!(1 + 1 == 2, "arithmetic is broken");
    }
}
