// This module defines the operation set of the JIT IR. A single Op enum spans the three
// dialect levels a function passes through: the tensor dialect produced from graph nodes
// (tensor.add, tensor.matmul_bias, tensor.return), the generic buffer level produced by
// dialect lowering (constants, alloc through the memory manager, load/store, scalar
// arithmetic, structured affine.for loops with constant bounds) and the unstructured control
// flow produced by loop lowering (cmpi, br, cond_br, return). Keeping them in one enum lets a
// module hold a mix of levels mid-pipeline, and lets every pass walk operations uniformly via
// operands()/results().

//! IR operations.

use super::function::{BlockId, ValueId};
use std::fmt;

/// Source location attached to an operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Unknown,
    /// Name of the graph node that produced the op.
    Named(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unknown => f.write_str("loc(unknown)"),
            Location::Named(name) => write!(f, "loc(\"{name}\")"),
        }
    }
}

/// Constant payload; the result value's type decides the width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Index(i64),
    Int(i64),
    Float(f64),
}

/// Scalar binary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    AddF,
    AddI,
    MulF,
    MulI,
}

impl BinaryKind {
    pub fn add_for(float: bool) -> Self {
        if float {
            BinaryKind::AddF
        } else {
            BinaryKind::AddI
        }
    }

    pub fn mul_for(float: bool) -> Self {
        if float {
            BinaryKind::MulF
        } else {
            BinaryKind::MulI
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryKind::AddF => "addf",
            BinaryKind::AddI => "addi",
            BinaryKind::MulF => "mulf",
            BinaryKind::MulI => "muli",
        }
    }
}

/// One IR operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // tensor dialect
    TensorAdd {
        lhs: ValueId,
        rhs: ValueId,
        result: ValueId,
        loc: Location,
    },
    TensorMatmulBias {
        lhs: ValueId,
        rhs: ValueId,
        result: ValueId,
        loc: Location,
    },
    TensorReturn {
        operands: Vec<ValueId>,
    },

    // generic buffer level
    Constant {
        value: Constant,
        result: ValueId,
    },
    /// Scratch buffer obtained from the memory manager.
    Alloc {
        mem_mgr: ValueId,
        result: ValueId,
    },
    Load {
        memref: ValueId,
        indices: Vec<ValueId>,
        result: ValueId,
    },
    Store {
        value: ValueId,
        memref: ValueId,
        indices: Vec<ValueId>,
    },
    Binary {
        kind: BinaryKind,
        lhs: ValueId,
        rhs: ValueId,
        result: ValueId,
    },
    /// `affine.for %iv = lower to upper step step { body }`
    For {
        iv: ValueId,
        lower: i64,
        upper: i64,
        step: i64,
        body: Vec<Op>,
    },

    // unstructured control flow
    /// Signed `lhs < rhs` on index values.
    CmpLt {
        lhs: ValueId,
        rhs: ValueId,
        result: ValueId,
    },
    Br {
        dest: BlockId,
        args: Vec<ValueId>,
    },
    CondBr {
        cond: ValueId,
        true_dest: BlockId,
        true_args: Vec<ValueId>,
        false_dest: BlockId,
        false_args: Vec<ValueId>,
    },
    Return {
        operands: Vec<ValueId>,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::TensorAdd { .. } => "tensor.add",
            Op::TensorMatmulBias { .. } => "tensor.matmul_bias",
            Op::TensorReturn { .. } => "tensor.return",
            Op::Constant { .. } => "constant",
            Op::Alloc { .. } => "alloc",
            Op::Load { .. } => "load",
            Op::Store { .. } => "store",
            Op::Binary { kind, .. } => kind.mnemonic(),
            Op::For { .. } => "affine.for",
            Op::CmpLt { .. } => "cmpi",
            Op::Br { .. } => "br",
            Op::CondBr { .. } => "cond_br",
            Op::Return { .. } => "return",
        }
    }

    pub fn is_tensor_op(&self) -> bool {
        matches!(
            self,
            Op::TensorAdd { .. } | Op::TensorMatmulBias { .. } | Op::TensorReturn { .. }
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::TensorReturn { .. } | Op::Br { .. } | Op::CondBr { .. } | Op::Return { .. }
        )
    }

    /// Ops without side effects that can be dropped when their result is unused.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Op::Constant { .. } | Op::Load { .. } | Op::Binary { .. } | Op::CmpLt { .. }
        )
    }

    /// Values defined directly by this op (loop induction variables included).
    pub fn results(&self) -> Vec<ValueId> {
        match self {
            Op::TensorAdd { result, .. }
            | Op::TensorMatmulBias { result, .. }
            | Op::Constant { result, .. }
            | Op::Alloc { result, .. }
            | Op::Load { result, .. }
            | Op::Binary { result, .. }
            | Op::CmpLt { result, .. } => vec![*result],
            Op::For { iv, .. } => vec![*iv],
            Op::TensorReturn { .. }
            | Op::Store { .. }
            | Op::Br { .. }
            | Op::CondBr { .. }
            | Op::Return { .. } => Vec::new(),
        }
    }

    /// Values read by this op, not including nested loop bodies.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Op::TensorAdd { lhs, rhs, .. }
            | Op::TensorMatmulBias { lhs, rhs, .. }
            | Op::Binary { lhs, rhs, .. }
            | Op::CmpLt { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::TensorReturn { operands } | Op::Return { operands } => operands.clone(),
            Op::Constant { .. } | Op::For { .. } => Vec::new(),
            Op::Alloc { mem_mgr, .. } => vec![*mem_mgr],
            Op::Load {
                memref, indices, ..
            } => std::iter::once(*memref).chain(indices.iter().copied()).collect(),
            Op::Store {
                value,
                memref,
                indices,
            } => [*value, *memref]
                .into_iter()
                .chain(indices.iter().copied())
                .collect(),
            Op::Br { args, .. } => args.clone(),
            Op::CondBr {
                cond,
                true_args,
                false_args,
                ..
            } => std::iter::once(*cond)
                .chain(true_args.iter().copied())
                .chain(false_args.iter().copied())
                .collect(),
        }
    }

    /// Nested body of a structured loop.
    pub fn body(&self) -> Option<&[Op]> {
        match self {
            Op::For { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Successor blocks of a terminator.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Op::Br { dest, .. } => vec![*dest],
            Op::CondBr {
                true_dest,
                false_dest,
                ..
            } => vec![*true_dest, *false_dest],
            _ => Vec::new(),
        }
    }
}

/// Visit every op, descending into loop bodies.
pub fn walk_ops<'a>(ops: &'a [Op], f: &mut impl FnMut(&'a Op)) {
    for op in ops {
        f(op);
        if let Some(body) = op.body() {
            walk_ops(body, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_operands() {
        let op = Op::Store {
            value: ValueId(3),
            memref: ValueId(0),
            indices: vec![ValueId(5), ValueId(6)],
        };
        assert_eq!(op.operands(), vec![ValueId(3), ValueId(0), ValueId(5), ValueId(6)]);
        assert!(op.results().is_empty());
        assert!(!op.is_pure());
    }

    #[test]
    fn test_walk_descends_into_loops() {
        let ops = vec![Op::For {
            iv: ValueId(1),
            lower: 0,
            upper: 4,
            step: 1,
            body: vec![Op::Constant {
                value: Constant::Index(0),
                result: ValueId(2),
            }],
        }];
        let mut names = Vec::new();
        walk_ops(&ops, &mut |op| names.push(op.name()));
        assert_eq!(names, vec!["affine.for", "constant"]);
    }

    #[test]
    fn test_terminators() {
        assert!(Op::Return { operands: vec![] }.is_terminator());
        assert!(Op::TensorReturn { operands: vec![] }.is_terminator());
        let br = Op::Br {
            dest: BlockId(2),
            args: vec![],
        };
        assert_eq!(br.successors(), vec![BlockId(2)]);
    }
}
