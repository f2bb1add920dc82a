//! IR types shared by every dialect level.

use std::fmt;

/// Scalar element types the IR can compute on. Signedness is not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
}

impl ScalarType {
    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    pub fn bit_width(self) -> u32 {
        match self {
            ScalarType::I8 => 8,
            ScalarType::I16 => 16,
            ScalarType::F32 | ScalarType::I32 => 32,
            ScalarType::F64 | ScalarType::I64 => 64,
        }
    }

    pub fn size_in_bytes(self) -> usize {
        (self.bit_width() / 8) as usize
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
        };
        f.write_str(name)
    }
}

/// Value-semantics tensor type used by the tensor dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub element: ScalarType,
    pub shape: Vec<usize>,
}

impl TensorType {
    pub fn new(element: ScalarType, shape: Vec<usize>) -> Self {
        Self { element, shape }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// A memref dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    Dynamic,
}

/// Buffer type produced by dialect lowering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemRefType {
    pub element: ScalarType,
    pub dims: Vec<Dim>,
}

impl MemRefType {
    pub fn new(element: ScalarType, dims: Vec<Dim>) -> Self {
        Self { element, dims }
    }

    /// Static buffer with the same element type and shape as `tensor`.
    pub fn from_tensor(tensor: &TensorType) -> Self {
        Self {
            element: tensor.element,
            dims: tensor.shape.iter().map(|&d| Dim::Static(d)).collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn num_dynamic_dims(&self) -> usize {
        self.dims.iter().filter(|d| matches!(d, Dim::Dynamic)).count()
    }

    /// Static sizes, or `None` if any dimension is dynamic.
    pub fn static_shape(&self) -> Option<Vec<usize>> {
        self.dims
            .iter()
            .map(|d| match d {
                Dim::Static(size) => Some(*size),
                Dim::Dynamic => None,
            })
            .collect()
    }

    /// Element count, or `None` if any dimension is dynamic.
    pub fn element_count(&self) -> Option<usize> {
        self.static_shape().map(|shape| shape.iter().product())
    }
}

/// Type of an IR value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(ScalarType),
    /// Loop induction variables and subscripts.
    Index,
    /// Comparison results.
    I1,
    Tensor(TensorType),
    MemRef(MemRefType),
    /// Opaque runtime memory-manager handle.
    MemoryManager,
}

impl Type {
    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Type::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_memref(&self) -> Option<&MemRefType> {
        match self {
            Type::MemRef(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) => Some(*s),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(s) => write!(f, "{s}"),
            Type::Index => f.write_str("index"),
            Type::I1 => f.write_str("i1"),
            Type::Tensor(t) => {
                f.write_str("!tensor<")?;
                for d in &t.shape {
                    write!(f, "{d}x")?;
                }
                write!(f, "{}>", t.element)
            }
            Type::MemRef(m) => {
                f.write_str("memref<")?;
                for d in &m.dims {
                    match d {
                        Dim::Static(size) => write!(f, "{size}x")?,
                        Dim::Dynamic => f.write_str("?x")?,
                    }
                }
                write!(f, "{}>", m.element)
            }
            Type::MemoryManager => f.write_str("!memmgr"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memref_from_tensor() {
        let tensor = TensorType::new(ScalarType::F32, vec![2, 3]);
        let memref = MemRefType::from_tensor(&tensor);
        assert_eq!(memref.dims, vec![Dim::Static(2), Dim::Static(3)]);
        assert_eq!(memref.element_count(), Some(6));
        assert_eq!(memref.num_dynamic_dims(), 0);
    }

    #[test]
    fn test_dynamic_memref_has_no_static_shape() {
        let memref = MemRefType::new(ScalarType::I32, vec![Dim::Static(4), Dim::Dynamic]);
        assert_eq!(memref.num_dynamic_dims(), 1);
        assert_eq!(memref.static_shape(), None);
    }

    #[test]
    fn test_type_display() {
        let tensor = Type::Tensor(TensorType::new(ScalarType::F64, vec![4]));
        assert_eq!(tensor.to_string(), "!tensor<4xf64>");
        let memref = Type::MemRef(MemRefType::new(ScalarType::I8, vec![Dim::Dynamic]));
        assert_eq!(memref.to_string(), "memref<?xi8>");
    }
}
