//! JIT intermediate representation.
//!
//! One module format carries a function through every level of the
//! pipeline:
//!
//! - **tensor dialect** (`tensor.*`): one op per graph node, value semantics
//! - **buffer level**: memref parameters, `load`/`store`, scalar arithmetic
//!   and structured `affine.for` loops
//! - **unstructured level**: blocks with arguments, `br`/`cond_br`
//!
//! The LLVM conversion in [`crate::llvm`] only accepts the last level.

pub mod builder;
pub mod function;
pub mod ops;
pub mod printer;
pub mod types;

pub use builder::{FunctionBuilder, TensorBinary};
pub use function::{Block, BlockId, Function, Module, ValueId};
pub use ops::{BinaryKind, Constant, Location, Op};
pub use types::{Dim, MemRefType, ScalarType, TensorType, Type};
