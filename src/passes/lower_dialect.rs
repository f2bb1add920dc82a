// This module lowers tensor-dialect functions to the buffer level. The rewritten function
// takes one memref per original tensor parameter, then one output memref per original
// result, then the memory-manager handle, and returns nothing. tensor.add becomes a loop
// nest of load/load/add/store over the operand shape. tensor.matmul_bias becomes an
// [M, N] loop nest that zero-fills the output element and accumulates over K. A result
// returned by tensor.return is computed straight into its output buffer; any other result
// gets a scratch buffer from the memory manager. Returned values that were not materialised
// in their output slot (parameters, or a value returned twice) are copied there before the
// final return.

//! Tensor dialect to buffer-level lowering.

use super::verify::verify_buffer_level;
use super::Pass;
use crate::core::PassError;
use crate::ir::{
    BinaryKind, Function, FunctionBuilder, MemRefType, Op, TensorType, Type, ValueId,
};
use hashbrown::HashMap;

const PASS_NAME: &str = "lower-tensor-dialect";

/// Rewrites tensor-dialect ops into loops over memrefs.
pub struct LowerTensorDialect;

impl Pass for LowerTensorDialect {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run_on_function(&mut self, function: &mut Function) -> Result<(), PassError> {
        if function.count_ops(Op::is_tensor_op) == 0 {
            return verify_buffer_level(function, PASS_NAME);
        }
        let lowered = FunctionLowering::new(function)?.lower()?;
        verify_buffer_level(&lowered, PASS_NAME)?;
        *function = lowered;
        Ok(())
    }
}

fn tensor_type(function: &Function, value: ValueId) -> Result<TensorType, PassError> {
    function
        .value_type(value)
        .as_tensor()
        .cloned()
        .ok_or_else(|| {
            PassError::failed(
                PASS_NAME,
                format!("{value} has type {}, expected a tensor", function.value_type(value)),
            )
        })
}

struct FunctionLowering<'a> {
    source: &'a Function,
    builder: FunctionBuilder,
    /// Source tensor value -> buffer holding it.
    buffers: HashMap<ValueId, ValueId>,
    /// Output buffer per returned position, and whether it has been claimed.
    outputs: Vec<(ValueId, bool)>,
    returned: Vec<ValueId>,
    mem_mgr: ValueId,
}

impl<'a> FunctionLowering<'a> {
    fn new(source: &'a Function) -> Result<Self, PassError> {
        if source.blocks.len() != 1 {
            return Err(PassError::failed(
                PASS_NAME,
                format!("expected a single block, found {}", source.blocks.len()),
            ));
        }
        let returned = match source.blocks[0].terminator() {
            Some(Op::TensorReturn { operands }) => operands.clone(),
            _ => {
                return Err(PassError::failed(
                    PASS_NAME,
                    "tensor function must end in tensor.return",
                ))
            }
        };

        let mut param_types = Vec::with_capacity(source.num_params() + returned.len() + 1);
        for param in source.params() {
            let tensor = tensor_type(source, *param)?;
            param_types.push(Type::MemRef(MemRefType::from_tensor(&tensor)));
        }
        for result in source.result_types() {
            let tensor = result.as_tensor().ok_or_else(|| {
                PassError::failed(PASS_NAME, format!("result type {result} is not a tensor"))
            })?;
            param_types.push(Type::MemRef(MemRefType::from_tensor(tensor)));
        }
        if source.result_types().len() != returned.len() {
            return Err(PassError::failed(
                PASS_NAME,
                format!(
                    "tensor.return has {} operands, function declares {} results",
                    returned.len(),
                    source.result_types().len()
                ),
            ));
        }
        for (k, (value, declared)) in returned.iter().zip(source.result_types()).enumerate() {
            let actual = tensor_type(source, *value)?;
            if declared.as_tensor() != Some(&actual) {
                return Err(PassError::failed(
                    PASS_NAME,
                    format!(
                        "result #{k} is declared {declared} but tensor.return yields {value} of type {}",
                        Type::Tensor(actual)
                    ),
                ));
            }
        }
        param_types.push(Type::MemoryManager);

        let lowered = Function::new(source.name.clone(), param_types, Vec::new());
        let num_inputs = source.num_params();
        let buffers = source
            .params()
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, lowered.param(i)))
            .collect();
        let outputs = (0..returned.len())
            .map(|k| (lowered.param(num_inputs + k), false))
            .collect();
        let mem_mgr = lowered.param(lowered.num_params() - 1);

        Ok(Self {
            source,
            builder: FunctionBuilder::new(lowered),
            buffers,
            outputs,
            returned,
            mem_mgr,
        })
    }

    fn lower(mut self) -> Result<Function, PassError> {
        for op in &self.source.blocks[0].ops {
            log::trace!("lowering {}", op.name());
            match op {
                Op::TensorAdd {
                    lhs, rhs, result, ..
                } => self.lower_add(*lhs, *rhs, *result)?,
                Op::TensorMatmulBias {
                    lhs, rhs, result, ..
                } => self.lower_matmul(*lhs, *rhs, *result)?,
                Op::TensorReturn { operands } => self.lower_return(operands)?,
                other => {
                    return Err(PassError::failed(
                        PASS_NAME,
                        format!("unexpected '{}' in a tensor function", other.name()),
                    ))
                }
            }
        }
        Ok(self.builder.finish())
    }

    fn buffer(&self, value: ValueId) -> Result<ValueId, PassError> {
        self.buffers
            .get(&value)
            .copied()
            .ok_or_else(|| PassError::failed(PASS_NAME, format!("{value} used before definition")))
    }

    /// Buffer the result of an op is written to.
    fn destination(&mut self, result: ValueId, ty: &TensorType) -> ValueId {
        let slot = self
            .returned
            .iter()
            .enumerate()
            .find(|(k, v)| **v == result && !self.outputs[*k].1)
            .map(|(k, _)| k);
        let buffer = match slot {
            Some(k) => {
                self.outputs[k].1 = true;
                self.outputs[k].0
            }
            None => self
                .builder
                .create_alloc(self.mem_mgr, MemRefType::from_tensor(ty)),
        };
        self.buffers.insert(result, buffer);
        buffer
    }

    fn lower_add(&mut self, lhs: ValueId, rhs: ValueId, result: ValueId) -> Result<(), PassError> {
        let lhs_ty = tensor_type(self.source, lhs)?;
        let rhs_ty = tensor_type(self.source, rhs)?;
        let result_ty = tensor_type(self.source, result)?;
        if lhs_ty != rhs_ty || lhs_ty != result_ty {
            return Err(PassError::failed(
                PASS_NAME,
                format!("tensor.add operand types differ: {lhs_ty:?} vs {rhs_ty:?} -> {result_ty:?}"),
            ));
        }

        let (lhs_buf, rhs_buf) = (self.buffer(lhs)?, self.buffer(rhs)?);
        let out = self.destination(result, &result_ty);
        let kind = BinaryKind::add_for(result_ty.element.is_float());

        let b = &mut self.builder;
        let ivs = b.begin_loop_nest(&result_ty.shape);
        let l = b.create_load(lhs_buf, ivs.clone());
        let r = b.create_load(rhs_buf, ivs.clone());
        let sum = b.create_binary(kind, l, r);
        b.create_store(sum, out, ivs.clone());
        b.end_loop_nest(ivs.len());
        Ok(())
    }

    fn lower_matmul(&mut self, lhs: ValueId, rhs: ValueId, result: ValueId) -> Result<(), PassError> {
        let lhs_ty = tensor_type(self.source, lhs)?;
        let rhs_ty = tensor_type(self.source, rhs)?;
        let result_ty = tensor_type(self.source, result)?;
        if lhs_ty.rank() != 2 || rhs_ty.rank() != 2 {
            return Err(PassError::failed(
                PASS_NAME,
                format!(
                    "tensor.matmul_bias expects rank-2 operands, got ranks {} and {}",
                    lhs_ty.rank(),
                    rhs_ty.rank()
                ),
            ));
        }
        let (m, k, n) = (lhs_ty.shape[0], lhs_ty.shape[1], rhs_ty.shape[1]);
        if rhs_ty.shape[0] != k
            || lhs_ty.element != rhs_ty.element
            || result_ty != TensorType::new(lhs_ty.element, vec![m, n])
        {
            return Err(PassError::failed(
                PASS_NAME,
                format!(
                    "tensor.matmul_bias shape mismatch: {:?} x {:?} -> {:?}",
                    lhs_ty.shape, rhs_ty.shape, result_ty.shape
                ),
            ));
        }

        let (lhs_buf, rhs_buf) = (self.buffer(lhs)?, self.buffer(rhs)?);
        let out = self.destination(result, &result_ty);
        let float = result_ty.element.is_float();

        let b = &mut self.builder;
        let ivs = b.begin_loop_nest(&[m, n]);
        let (i, j) = (ivs[0], ivs[1]);
        let zero = b.create_zero(result_ty.element);
        b.create_store(zero, out, vec![i, j]);
        let kk = b.begin_for(0, k as i64, 1);
        let a = b.create_load(lhs_buf, vec![i, kk]);
        let x = b.create_load(rhs_buf, vec![kk, j]);
        let prod = b.create_binary(BinaryKind::mul_for(float), a, x);
        let acc = b.create_load(out, vec![i, j]);
        let sum = b.create_binary(BinaryKind::add_for(float), acc, prod);
        b.create_store(sum, out, vec![i, j]);
        b.end_for();
        b.end_loop_nest(ivs.len());
        Ok(())
    }

    fn lower_return(&mut self, operands: &[ValueId]) -> Result<(), PassError> {
        for (k, value) in operands.iter().enumerate() {
            let source = self.buffer(*value)?;
            let (target, _) = self.outputs[k];
            if source == target {
                continue;
            }
            let ty = tensor_type(self.source, *value)?;
            let b = &mut self.builder;
            let ivs = b.begin_loop_nest(&ty.shape);
            let element = b.create_load(source, ivs.clone());
            b.create_store(element, target, ivs.clone());
            b.end_loop_nest(ivs.len());
        }
        self.builder.create_return(Vec::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Location, ScalarType, TensorBinary};

    fn tensor(element: ScalarType, shape: Vec<usize>) -> Type {
        Type::Tensor(TensorType::new(element, shape))
    }

    fn add_function() -> Function {
        let t = tensor(ScalarType::F32, vec![4]);
        let f = Function::new("main", vec![t.clone(), t.clone()], vec![t]);
        let (a, b) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let sum = builder.create_tensor_binary(TensorBinary::Add, a, b, Location::Unknown);
        builder.create_tensor_return(vec![sum]);
        builder.finish()
    }

    #[test]
    fn test_signature_gains_outputs_and_memory_manager() {
        let mut f = add_function();
        LowerTensorDialect.run_on_function(&mut f).unwrap();

        let types: Vec<_> = f.param_types().cloned().collect();
        assert_eq!(types.len(), 4);
        assert!(matches!(types[0], Type::MemRef(_)));
        assert!(matches!(types[2], Type::MemRef(_)));
        assert_eq!(types[3], Type::MemoryManager);
        assert!(f.result_types().is_empty());
        assert_eq!(f.count_ops(Op::is_tensor_op), 0);
    }

    #[test]
    fn test_add_writes_into_output_without_alloc() {
        let mut f = add_function();
        LowerTensorDialect.run_on_function(&mut f).unwrap();

        assert_eq!(f.count_ops(|op| matches!(op, Op::Alloc { .. })), 0);
        assert_eq!(f.count_ops(|op| matches!(op, Op::For { .. })), 1);
        let output = f.param(2);
        assert_eq!(
            f.count_ops(|op| matches!(op, Op::Store { memref, .. } if *memref == output)),
            1
        );
    }

    #[test]
    fn test_temporary_gets_scratch_buffer() {
        let t = tensor(ScalarType::I32, vec![2, 2]);
        let f = Function::new("main", vec![t.clone(), t.clone()], vec![t]);
        let (a, b) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let tmp = builder.create_tensor_binary(TensorBinary::Add, a, b, Location::Unknown);
        let out = builder.create_tensor_binary(TensorBinary::Add, tmp, b, Location::Unknown);
        builder.create_tensor_return(vec![out]);
        let mut f = builder.finish();

        LowerTensorDialect.run_on_function(&mut f).unwrap();
        assert_eq!(f.count_ops(|op| matches!(op, Op::Alloc { .. })), 1);
        assert_eq!(
            f.count_ops(|op| matches!(op, Op::Binary { kind: BinaryKind::AddI, .. })),
            2
        );
    }

    #[test]
    fn test_matmul_accumulates() {
        let f = Function::new(
            "main",
            vec![tensor(ScalarType::F64, vec![2, 3]), tensor(ScalarType::F64, vec![3, 4])],
            vec![tensor(ScalarType::F64, vec![2, 4])],
        );
        let (a, b) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let c = builder.create_tensor_binary(TensorBinary::MatmulBias, a, b, Location::Unknown);
        builder.create_tensor_return(vec![c]);
        let mut f = builder.finish();

        LowerTensorDialect.run_on_function(&mut f).unwrap();
        assert_eq!(f.count_ops(|op| matches!(op, Op::For { .. })), 3);
        assert_eq!(
            f.count_ops(|op| matches!(op, Op::Binary { kind: BinaryKind::MulF, .. })),
            1
        );
    }

    #[test]
    fn test_matmul_inner_dimension_mismatch() {
        let f = Function::new(
            "main",
            vec![tensor(ScalarType::F32, vec![2, 3]), tensor(ScalarType::F32, vec![2, 3])],
            vec![tensor(ScalarType::F32, vec![2, 3])],
        );
        let (a, b) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let c = builder.create_tensor_binary(TensorBinary::MatmulBias, a, b, Location::Unknown);
        builder.create_tensor_return(vec![c]);
        let mut f = builder.finish();

        let err = LowerTensorDialect.run_on_function(&mut f).unwrap_err();
        assert!(err.to_string().contains("shape mismatch"));
    }

    #[test]
    fn test_returned_shape_must_match_declared_result() {
        let t4 = tensor(ScalarType::F32, vec![4]);
        let f = Function::new(
            "main",
            vec![t4.clone(), t4],
            vec![tensor(ScalarType::F32, vec![2])],
        );
        let (a, b) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let sum = builder.create_tensor_binary(TensorBinary::Add, a, b, Location::Unknown);
        builder.create_tensor_return(vec![sum]);
        let mut f = builder.finish();
        let before = f.clone();

        let err = LowerTensorDialect.run_on_function(&mut f).unwrap_err();
        assert!(err.to_string().contains("result #0 is declared"));
        assert_eq!(f, before);
    }

    #[test]
    fn test_returned_element_type_must_match_declared_result() {
        let t = tensor(ScalarType::I32, vec![3]);
        let f = Function::new("main", vec![t.clone(), t], vec![tensor(ScalarType::F32, vec![3])]);
        let (a, b) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let sum = builder.create_tensor_binary(TensorBinary::Add, a, b, Location::Unknown);
        builder.create_tensor_return(vec![sum]);
        let mut f = builder.finish();

        assert!(LowerTensorDialect.run_on_function(&mut f).is_err());
    }

    #[test]
    fn test_returned_parameter_is_copied() {
        let t = tensor(ScalarType::F32, vec![3]);
        let f = Function::new("main", vec![t.clone()], vec![t]);
        let a = f.param(0);
        let mut builder = FunctionBuilder::new(f);
        builder.create_tensor_return(vec![a]);
        let mut f = builder.finish();

        LowerTensorDialect.run_on_function(&mut f).unwrap();
        assert_eq!(f.count_ops(|op| matches!(op, Op::Load { .. })), 1);
        assert_eq!(f.count_ops(|op| matches!(op, Op::Store { .. })), 1);
    }
}
