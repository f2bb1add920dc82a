//! Element types carried by graph tensors.

use std::fmt;

/// Element type of a tensor as the upstream graph describes it.
///
/// Only a subset of these can be compiled; see [`crate::core::type_mapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Undefined,
    Dynamic,
    Boolean,
    Bf16,
    F16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl ElementType {
    /// Size of one element in bytes, or `None` for the placeholder types.
    pub fn size_in_bytes(self) -> Option<usize> {
        use ElementType::*;
        match self {
            Undefined | Dynamic => None,
            Boolean | I8 | U8 => Some(1),
            Bf16 | F16 | I16 | U16 => Some(2),
            F32 | I32 | U32 => Some(4),
            F64 | I64 | U64 => Some(8),
        }
    }

    pub fn is_real(self) -> bool {
        matches!(self, ElementType::Bf16 | ElementType::F16 | ElementType::F32 | ElementType::F64)
    }

    pub fn is_signed(self) -> bool {
        use ElementType::*;
        matches!(self, Bf16 | F16 | F32 | F64 | I8 | I16 | I32 | I64)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ElementType::*;
        let name = match self {
            Undefined => "undefined",
            Dynamic => "dynamic",
            Boolean => "boolean",
            Bf16 => "bf16",
            F16 => "f16",
            F32 => "f32",
            F64 => "f64",
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(ElementType::F32.size_in_bytes(), Some(4));
        assert_eq!(ElementType::U64.size_in_bytes(), Some(8));
        assert_eq!(ElementType::Bf16.size_in_bytes(), Some(2));
        assert_eq!(ElementType::Dynamic.size_in_bytes(), None);
    }

    #[test]
    fn test_signedness() {
        assert!(ElementType::I16.is_signed());
        assert!(!ElementType::U16.is_signed());
        assert!(ElementType::F64.is_real());
        assert!(!ElementType::I64.is_real());
    }
}
