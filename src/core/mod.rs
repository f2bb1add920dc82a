// This module gathers the building blocks the compiler driver is assembled from: error types
// and invariant macros, the type mapper from graph element types to IR types, the boundary
// analyzer classifying a subgraph's external tensors, the write-once binding table from
// tensors to IR values, the arena-backed memory manager handed to compiled code, and the
// statistics collected per compiler. None of them hold process-wide state.

//! Core JIT infrastructure.
//!
//! # Key Components
//!
//! - [`type_mapper`]: graph element types and tensors to IR types
//! - [`boundary`]: external input/output classification of a subgraph
//! - [`binding`]: tensor to IR value binding table
//! - [`memory`]: scratch memory manager for compiled code
//! - [`error`]: error types and invariant macros

pub mod binding;
pub mod boundary;
pub mod error;
pub mod memory;
pub mod stats;
pub mod type_mapper;

pub use binding::{TensorInfo, ValueBindingTable};
pub use boundary::Boundary;
pub use error::{EngineError, JitError, JitResult, PassError};
pub use memory::MemoryManager;
pub use stats::CompileStats;
