//! Canonicalization.
//!
//! Runs to a fixed point:
//! - loops with no iterations are removed
//! - loops with exactly one iteration are inlined, the induction variable
//!   becoming an index constant
//! - side-effect free ops whose results are never used are dropped

use super::Pass;
use crate::core::PassError;
use crate::ir::{Constant, Function, Op, ValueId};
use hashbrown::HashMap;

const PASS_NAME: &str = "canonicalize";

pub struct Canonicalize;

impl Pass for Canonicalize {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run_on_function(&mut self, function: &mut Function) -> Result<(), PassError> {
        let mut rounds = 0;
        loop {
            let mut changed = false;
            for block in &mut function.blocks {
                let ops = std::mem::take(&mut block.ops);
                block.ops = simplify_loops(ops, &mut changed)?;
            }
            changed |= eliminate_dead_ops(function);
            rounds += 1;
            if !changed {
                break;
            }
        }
        log::trace!("canonicalize: @{} settled after {} rounds", function.name, rounds);
        Ok(())
    }
}

fn trip_count(lower: i64, upper: i64, step: i64) -> Result<i64, PassError> {
    if step <= 0 {
        return Err(PassError::failed(
            PASS_NAME,
            format!("loop step must be positive, got {step}"),
        ));
    }
    if upper <= lower {
        return Ok(0);
    }
    Ok((upper - lower + step - 1) / step)
}

fn simplify_loops(ops: Vec<Op>, changed: &mut bool) -> Result<Vec<Op>, PassError> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            Op::For {
                iv,
                lower,
                upper,
                step,
                body,
            } => match trip_count(lower, upper, step)? {
                0 => *changed = true,
                1 => {
                    *changed = true;
                    out.push(Op::Constant {
                        value: Constant::Index(lower),
                        result: iv,
                    });
                    out.extend(simplify_loops(body, changed)?);
                }
                _ => out.push(Op::For {
                    iv,
                    lower,
                    upper,
                    step,
                    body: simplify_loops(body, changed)?,
                }),
            },
            other => out.push(other),
        }
    }
    Ok(out)
}

fn count_uses(ops: &[Op], uses: &mut HashMap<ValueId, usize>) {
    for op in ops {
        for operand in op.operands() {
            *uses.entry(operand).or_insert(0) += 1;
        }
        if let Some(body) = op.body() {
            count_uses(body, uses);
        }
    }
}

fn retain_live(ops: &mut Vec<Op>, uses: &HashMap<ValueId, usize>) -> bool {
    let before = ops.len();
    ops.retain(|op| {
        !op.is_pure()
            || op
                .results()
                .iter()
                .any(|r| uses.get(r).copied().unwrap_or(0) > 0)
    });
    let mut changed = ops.len() != before;
    for op in ops.iter_mut() {
        if let Op::For { body, .. } = op {
            changed |= retain_live(body, uses);
        }
    }
    changed
}

fn eliminate_dead_ops(function: &mut Function) -> bool {
    let mut uses = HashMap::new();
    for block in &function.blocks {
        count_uses(&block.ops, &mut uses);
    }
    let mut changed = false;
    for block in &mut function.blocks {
        changed |= retain_live(&mut block.ops, &uses);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, MemRefType, ScalarType, Type};

    fn buffer_function(shape: Vec<usize>) -> Function {
        let memref = Type::MemRef(MemRefType::from_tensor(&crate::ir::TensorType::new(
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
    fn test_single_trip_loop_inlined() {
        let mut f = buffer_function(vec![1, 8]);
        Canonicalize.run_on_function(&mut f).unwrap();

        assert_eq!(f.count_ops(|op| matches!(op, Op::For { .. })), 1);
        assert!(matches!(
            f.blocks[0].ops[0],
            Op::Constant {
                value: Constant::Index(0),
                ..
            }
        ));
    }

    #[test]
    fn test_zero_trip_loop_removed() {
        let mut f = buffer_function(vec![0]);
        Canonicalize.run_on_function(&mut f).unwrap();
        assert_eq!(f.count_ops(|_| true), 1);
        assert!(matches!(f.blocks[0].ops[0], Op::Return { .. }));
    }

    #[test]
    fn test_dead_pure_ops_dropped() {
        let mut f = buffer_function(vec![4]);
        let unused = f.new_value(Type::Index);
        f.blocks[0].ops.insert(
            0,
            Op::Constant {
                value: Constant::Index(42),
                result: unused,
            },
        );

        Canonicalize.run_on_function(&mut f).unwrap();
        assert_eq!(
            f.count_ops(|op| matches!(op, Op::Constant { value: Constant::Index(42), .. })),
            0
        );
        assert_eq!(f.count_ops(|op| matches!(op, Op::Store { .. })), 1);
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let mut builder = FunctionBuilder::new(Function::new("f", vec![], vec![]));
        builder.begin_for(0, 4, 0);
        builder.end_for();
        builder.create_return(vec![]);
        let mut f = builder.finish();
        assert!(Canonicalize.run_on_function(&mut f).is_err());
    }
}
