// This module lowers structured affine.for loops into unstructured control flow. Each loop
// becomes three blocks: a header taking the induction variable as its block argument and
// comparing it against the upper bound, the body, and an exit block where the ops following
// the loop continue. The op preceding the loop materialises the bound and step constants and
// branches to the header with the lower bound; the end of the body increments the induction
// variable and branches back. Blocks are appended in header, body, inner loops, exit order,
// so every value is defined in a block created before any block that uses it. The pass
// always succeeds on output of the dialect lowering stage; a failure is an internal bug.

//! Structured loop to CFG lowering.

use super::verify::verify_unstructured;
use super::Pass;
use crate::core::PassError;
use crate::ir::{BinaryKind, BlockId, Constant, Function, Op, Type, ValueId};

const PASS_NAME: &str = "lower-affine";

pub struct LowerAffineLoops;

impl Pass for LowerAffineLoops {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run_on_function(&mut self, function: &mut Function) -> Result<(), PassError> {
        let original_blocks = function.blocks.len();
        for index in 0..original_blocks {
            let ops = std::mem::take(&mut function.blocks[index].ops);
            let mut current = BlockId(index as u32);
            emit_ops(function, ops, &mut current)?;
        }
        verify_unstructured(function, PASS_NAME)?;
        log::trace!(
            "lower-affine: @{} now has {} blocks",
            function.name,
            function.blocks.len()
        );
        Ok(())
    }
}

fn push(function: &mut Function, block: BlockId, op: Op) {
    function.block_mut(block).ops.push(op);
}

fn constant_index(function: &mut Function, block: BlockId, value: i64) -> ValueId {
    let result = function.new_value(Type::Index);
    push(
        function,
        block,
        Op::Constant {
            value: Constant::Index(value),
            result,
        },
    );
    result
}

fn emit_ops(function: &mut Function, ops: Vec<Op>, current: &mut BlockId) -> Result<(), PassError> {
    for op in ops {
        match op {
            Op::For {
                iv,
                lower,
                upper,
                step,
                body,
            } => lower_loop(function, iv, lower, upper, step, body, current)?,
            other => push(function, *current, other),
        }
    }
    Ok(())
}

fn lower_loop(
    function: &mut Function,
    iv: ValueId,
    lower: i64,
    upper: i64,
    step: i64,
    body: Vec<Op>,
    current: &mut BlockId,
) -> Result<(), PassError> {
    if step <= 0 {
        return Err(PassError::failed(
            PASS_NAME,
            format!("loop over {iv} has non-positive step {step}"),
        ));
    }
    let pre = *current;
    let lower_value = constant_index(function, pre, lower);
    let upper_value = constant_index(function, pre, upper);
    let step_value = constant_index(function, pre, step);

    let header = function.push_block(vec![iv]);
    push(
        function,
        pre,
        Op::Br {
            dest: header,
            args: vec![lower_value],
        },
    );
    let cond = function.new_value(Type::I1);
    push(
        function,
        header,
        Op::CmpLt {
            lhs: iv,
            rhs: upper_value,
            result: cond,
        },
    );

    let body_entry = function.push_block(Vec::new());
    let mut body_end = body_entry;
    emit_ops(function, body, &mut body_end)?;
    let next = function.new_value(Type::Index);
    push(
        function,
        body_end,
        Op::Binary {
            kind: BinaryKind::AddI,
            lhs: iv,
            rhs: step_value,
            result: next,
        },
    );
    push(
        function,
        body_end,
        Op::Br {
            dest: header,
            args: vec![next],
        },
    );

    let exit = function.push_block(Vec::new());
    push(
        function,
        header,
        Op::CondBr {
            cond,
            true_dest: body_entry,
            true_args: Vec::new(),
            false_dest: exit,
            false_args: Vec::new(),
        },
    );
    *current = exit;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, MemRefType, ScalarType, TensorType};

    fn copy_function(shape: Vec<usize>) -> Function {
        let memref = Type::MemRef(MemRefType::from_tensor(&TensorType::new(
            ScalarType::F32,
            shape.clone(),
        )));
        let f = Function::new("main", vec![memref.clone(), memref], vec![]);
        let (src, dst) = (f.param(0), f.param(1));
        let mut builder = FunctionBuilder::new(f);
        let ivs = builder.begin_loop_nest(&shape);
        let v = builder.create_load(src, ivs.clone());
        builder.create_store(v, dst, ivs.clone());
        builder.end_loop_nest(ivs.len());
        builder.create_return(vec![]);
        builder.finish()
    }

    #[test]
    fn test_single_loop_block_structure() {
        let mut f = copy_function(vec![4]);
        LowerAffineLoops.run_on_function(&mut f).unwrap();

        // entry, header, body, exit
        assert_eq!(f.blocks.len(), 4);
        assert_eq!(f.blocks[1].args.len(), 1);
        assert!(matches!(f.blocks[0].terminator(), Some(Op::Br { dest: BlockId(1), .. })));
        assert!(matches!(
            f.blocks[1].terminator(),
            Some(Op::CondBr {
                true_dest: BlockId(2),
                false_dest: BlockId(3),
                ..
            })
        ));
        assert!(matches!(f.blocks[2].terminator(), Some(Op::Br { dest: BlockId(1), .. })));
        assert!(matches!(f.blocks[3].terminator(), Some(Op::Return { .. })));
    }

    #[test]
    fn test_nested_loops_lowered() {
        let mut f = copy_function(vec![2, 3]);
        LowerAffineLoops.run_on_function(&mut f).unwrap();

        assert_eq!(f.blocks.len(), 7);
        assert_eq!(f.count_ops(|op| matches!(op, Op::For { .. })), 0);
        assert_eq!(f.count_ops(|op| matches!(op, Op::CondBr { .. })), 2);
    }

    #[test]
    fn test_loop_free_function_untouched() {
        let mut builder = FunctionBuilder::new(Function::new("f", vec![], vec![]));
        builder.create_return(vec![]);
        let mut f = builder.finish();
        let before = f.clone();
        LowerAffineLoops.run_on_function(&mut f).unwrap();
        assert_eq!(f, before);
    }
}
