//! LLVM backend.
//!
//! Converts fully lowered IR to LLVM IR with inkwell and runs it on the
//! MCJIT execution engine.
//!
//! # Example
//! ```ignore
//! use subgraph_jit::llvm;
//!
//! llvm::initialize_native_target(&[])?;
//! let text = llvm::emit_llvm_ir(&module)?;
//! unsafe { llvm::invoke_packed(&module, "main", &mut args, &[])? };
//! ```

pub mod codegen;
pub mod engine;

pub use codegen::{convert_to_llvm, emit_llvm_ir, invoke_symbol};
pub use engine::{applied_llvm_options, initialize_native_target, invoke_packed};
