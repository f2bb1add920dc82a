//! Graph element types and tensors to IR types.
//!
//! Integer signedness is erased: `i32` and `u32` both become IR `i32`.
//! Placeholder, boolean and reduced-precision float types cannot be compiled
//! and abort the compile.

use crate::graph::{ElementType, Tensor};
use crate::ir::{ScalarType, TensorType, Type};
use crate::jit_fail;

/// Map a graph element type to an IR scalar type.
pub fn map_element_type(element_type: ElementType) -> ScalarType {
    match element_type {
        ElementType::F32 => ScalarType::F32,
        ElementType::F64 => ScalarType::F64,
        ElementType::I8 | ElementType::U8 => ScalarType::I8,
        ElementType::I16 | ElementType::U16 => ScalarType::I16,
        ElementType::I32 | ElementType::U32 => ScalarType::I32,
        ElementType::I64 | ElementType::U64 => ScalarType::I64,
        ElementType::Undefined
        | ElementType::Dynamic
        | ElementType::Boolean
        | ElementType::Bf16
        | ElementType::F16 => jit_fail!("Unsupported element type: {}", element_type),
    }
}

/// IR tensor type for a graph tensor. Dimensions are copied verbatim.
pub fn map_tensor_type(tensor: &Tensor) -> Type {
    Type::Tensor(TensorType::new(
        map_element_type(tensor.element_type),
        tensor.shape.clone(),
    ))
}
