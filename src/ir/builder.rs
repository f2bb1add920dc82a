//! Function builder.
//!
//! [`FunctionBuilder`] owns the function under construction and an insertion
//! point. Structured loops are built by bracketing ops between
//! [`FunctionBuilder::begin_for`] and [`FunctionBuilder::end_for`].

use super::function::{BlockId, Function, ValueId};
use super::ops::{BinaryKind, Constant, Location, Op};
use super::types::{MemRefType, ScalarType, TensorType, Type};

/// Binary tensor-dialect operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorBinary {
    Add,
    MatmulBias,
}

struct OpenLoop {
    iv: ValueId,
    lower: i64,
    upper: i64,
    step: i64,
    body: Vec<Op>,
}

pub struct FunctionBuilder {
    function: Function,
    block: BlockId,
    open_loops: Vec<OpenLoop>,
}

impl FunctionBuilder {
    /// Start building into `function`, positioned at the end of its entry block.
    pub fn new(mut function: Function) -> Self {
        if function.blocks.is_empty() {
            function.add_entry_block();
        }
        Self {
            function,
            block: BlockId(0),
            open_loops: Vec::new(),
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn value_type(&self, value: ValueId) -> &Type {
        self.function.value_type(value)
    }

    pub fn new_value(&mut self, ty: Type) -> ValueId {
        self.function.new_value(ty)
    }

    pub fn set_insertion_block(&mut self, block: BlockId) {
        debug_assert!(self.open_loops.is_empty(), "cannot switch blocks inside a loop");
        self.block = block;
    }

    /// Append an op at the insertion point.
    pub fn push(&mut self, op: Op) {
        match self.open_loops.last_mut() {
            Some(open) => open.body.push(op),
            None => self.function.block_mut(self.block).ops.push(op),
        }
    }

    /// Build a tensor-dialect binary op and return its result.
    ///
    /// `Add` keeps the operand type; `MatmulBias` yields `[lhs rows, rhs cols]`.
    pub fn create_tensor_binary(
        &mut self,
        kind: TensorBinary,
        lhs: ValueId,
        rhs: ValueId,
        loc: Location,
    ) -> ValueId {
        let lhs_ty = self.value_type(lhs).as_tensor().cloned();
        let rhs_ty = self.value_type(rhs).as_tensor().cloned();
        let result_ty = match (kind, lhs_ty, rhs_ty) {
            (TensorBinary::Add, Some(lhs_ty), _) => Type::Tensor(lhs_ty),
            (TensorBinary::MatmulBias, Some(lhs_ty), Some(rhs_ty)) => {
                let rows = lhs_ty.shape.first().copied().unwrap_or(1);
                let cols = rhs_ty.shape.get(1).copied().unwrap_or(1);
                Type::Tensor(TensorType::new(lhs_ty.element, vec![rows, cols]))
            }
            // Non-tensor operands are left for verification to reject.
            _ => self.value_type(lhs).clone(),
        };
        let result = self.new_value(result_ty);
        let op = match kind {
            TensorBinary::Add => Op::TensorAdd {
                lhs,
                rhs,
                result,
                loc,
            },
            TensorBinary::MatmulBias => Op::TensorMatmulBias {
                lhs,
                rhs,
                result,
                loc,
            },
        };
        self.push(op);
        result
    }

    pub fn create_tensor_return(&mut self, operands: Vec<ValueId>) {
        self.push(Op::TensorReturn { operands });
    }

    pub fn create_constant(&mut self, value: Constant, ty: Type) -> ValueId {
        let result = self.new_value(ty);
        self.push(Op::Constant { value, result });
        result
    }

    pub fn create_index(&mut self, value: i64) -> ValueId {
        self.create_constant(Constant::Index(value), Type::Index)
    }

    /// Zero of the given scalar type.
    pub fn create_zero(&mut self, ty: ScalarType) -> ValueId {
        let value = if ty.is_float() {
            Constant::Float(0.0)
        } else {
            Constant::Int(0)
        };
        self.create_constant(value, Type::Scalar(ty))
    }

    pub fn create_alloc(&mut self, mem_mgr: ValueId, ty: MemRefType) -> ValueId {
        let result = self.new_value(Type::MemRef(ty));
        self.push(Op::Alloc { mem_mgr, result });
        result
    }

    pub fn create_load(&mut self, memref: ValueId, indices: Vec<ValueId>) -> ValueId {
        let element = match self.value_type(memref) {
            Type::MemRef(m) => Type::Scalar(m.element),
            other => other.clone(),
        };
        let result = self.new_value(element);
        self.push(Op::Load {
            memref,
            indices,
            result,
        });
        result
    }

    pub fn create_store(&mut self, value: ValueId, memref: ValueId, indices: Vec<ValueId>) {
        self.push(Op::Store {
            value,
            memref,
            indices,
        });
    }

    pub fn create_binary(&mut self, kind: BinaryKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.value_type(lhs).clone();
        let result = self.new_value(ty);
        self.push(Op::Binary {
            kind,
            lhs,
            rhs,
            result,
        });
        result
    }

    pub fn create_cmp_lt(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        let result = self.new_value(Type::I1);
        self.push(Op::CmpLt { lhs, rhs, result });
        result
    }

    /// Open a loop; ops go into its body until the matching [`Self::end_for`].
    pub fn begin_for(&mut self, lower: i64, upper: i64, step: i64) -> ValueId {
        let iv = self.new_value(Type::Index);
        self.open_loops.push(OpenLoop {
            iv,
            lower,
            upper,
            step,
            body: Vec::new(),
        });
        iv
    }

    pub fn end_for(&mut self) {
        if let Some(open) = self.open_loops.pop() {
            self.push(Op::For {
                iv: open.iv,
                lower: open.lower,
                upper: open.upper,
                step: open.step,
                body: open.body,
            });
        }
    }

    /// Open one loop per extent (outermost first) and return the induction variables.
    pub fn begin_loop_nest(&mut self, extents: &[usize]) -> Vec<ValueId> {
        extents
            .iter()
            .map(|&extent| self.begin_for(0, extent as i64, 1))
            .collect()
    }

    pub fn end_loop_nest(&mut self, depth: usize) {
        for _ in 0..depth {
            self.end_for();
        }
    }

    pub fn create_return(&mut self, operands: Vec<ValueId>) {
        self.push(Op::Return { operands });
    }

    pub fn finish(mut self) -> Function {
        while !self.open_loops.is_empty() {
            self.end_for();
        }
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(shape: Vec<usize>) -> Type {
        Type::Tensor(TensorType::new(ScalarType::F32, shape))
    }

    #[test]
    fn test_matmul_result_type() {
        let f = Function::new("main", vec![tensor(vec![2, 3]), tensor(vec![3, 4])], vec![]);
        let (a, b) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let c = builder.create_tensor_binary(TensorBinary::MatmulBias, a, b, Location::Unknown);
        assert_eq!(builder.value_type(c), &tensor(vec![2, 4]));
    }

    #[test]
    fn test_loop_nest_nesting() {
        let mut builder = FunctionBuilder::new(Function::new("f", vec![], vec![]));
        let ivs = builder.begin_loop_nest(&[2, 3]);
        builder.create_index(7);
        builder.end_loop_nest(ivs.len());
        builder.create_return(vec![]);
        let f = builder.finish();

        let entry = f.entry_block().unwrap();
        assert_eq!(entry.ops.len(), 2);
        match &entry.ops[0] {
            Op::For { iv, upper, body, .. } => {
                assert_eq!(*iv, ivs[0]);
                assert_eq!(*upper, 2);
                assert!(matches!(body[0], Op::For { upper: 3, .. }));
            }
            other => panic!("expected loop, got {other:?}"),
        }
    }
}
