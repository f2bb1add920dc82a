//! subgraph-jit - Just-in-time compilation of tensor subgraphs.
//!
//! A small subgraph of elementwise and algebraic nodes is compiled to native
//! code and run immediately against caller-owned buffers.
//!
//! # Primary Usage
//!
//! ```ignore
//! use subgraph_jit::graph::{ElementType, Graph};
//!
//! let mut graph = Graph::new();
//! let a = graph.parameter(ElementType::F32, vec![4]);
//! let b = graph.parameter(ElementType::F32, vec![4]);
//! let add = graph.add(a, b);
//! graph.add_result(graph.output(add));
//!
//! // inputs first, then outputs, in boundary order
//! let buffers = [lhs.as_mut_ptr().cast(), rhs.as_mut_ptr().cast(), out.as_mut_ptr().cast()];
//! unsafe { subgraph_jit::compile_and_run(&graph, &[add], &buffers)? };
//! ```
//!
//! # Architecture
//!
//! - [`graph`] - Upstream tensor graph model
//! - [`core`] - Boundary analysis, type mapping, bindings, errors, runtime memory
//! - [`ir`] - Multi-level IR: tensor dialect, buffers and loops, CFG
//! - [`passes`] - Dialect lowering, canonicalization, loop lowering
//! - [`llvm`] - LLVM conversion and the JIT execution engine
//! - [`compiler`] - The compile-and-run driver

pub mod compiler;
pub mod config;
pub mod core;
pub mod graph;
pub mod ir;
pub mod llvm;
pub mod passes;

pub use crate::compiler::{compile_and_run, JitCompiler, FUNCTION_NAME};
pub use crate::config::JitConfig;
pub use crate::core::{
    Boundary, CompileStats, EngineError, JitError, JitResult, MemoryManager, PassError,
};
pub use crate::graph::{ElementType, Graph, NodeId, OpKind, TensorId};
