//! Stage verifiers.

use crate::core::PassError;
use crate::ir::{Function, Op};

/// No tensor-dialect op or tensor-typed parameter remains.
pub fn verify_buffer_level(function: &Function, pass: &'static str) -> Result<(), PassError> {
    if let Some(param) = function
        .params()
        .iter()
        .find(|p| function.value_type(**p).as_tensor().is_some())
    {
        return Err(PassError::Verification {
            pass,
            reason: format!("parameter {param} still has tensor type"),
        });
    }
    let leftover = function.count_ops(Op::is_tensor_op);
    if leftover > 0 {
        return Err(PassError::Verification {
            pass,
            reason: format!("{leftover} tensor dialect ops remain in @{}", function.name),
        });
    }
    Ok(())
}

/// No structured loop remains and every block ends in a terminator.
pub fn verify_unstructured(function: &Function, pass: &'static str) -> Result<(), PassError> {
    for (index, block) in function.blocks.iter().enumerate() {
        if block.ops.iter().any(|op| matches!(op, Op::For { .. })) {
            return Err(PassError::Verification {
                pass,
                reason: format!("^bb{index} still contains affine.for"),
            });
        }
        if block.terminator().is_none() {
            return Err(PassError::Verification {
                pass,
                reason: format!("^bb{index} has no terminator"),
            });
        }
        let misplaced = block.ops[..block.ops.len() - 1]
            .iter()
            .any(Op::is_terminator);
        if misplaced {
            return Err(PassError::Verification {
                pass,
                reason: format!("^bb{index} has a terminator before its end"),
            });
        }
        for succ in block.terminator().map(Op::successors).unwrap_or_default() {
            if succ.0 as usize >= function.blocks.len() {
                return Err(PassError::Verification {
                    pass,
                    reason: format!("^bb{index} branches to missing block {succ}"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_missing_terminator_rejected() {
        let mut builder = FunctionBuilder::new(Function::new("f", vec![], vec![]));
        builder.create_index(1);
        let f = builder.finish();
        let err = verify_unstructured(&f, "test").unwrap_err();
        assert!(err.to_string().contains("no terminator"));
    }

    #[test]
    fn test_loop_rejected() {
        let mut builder = FunctionBuilder::new(Function::new("f", vec![], vec![]));
        builder.begin_for(0, 4, 1);
        builder.end_for();
        builder.create_return(vec![]);
        let f = builder.finish();
        assert!(verify_unstructured(&f, "test").is_err());
    }
}
