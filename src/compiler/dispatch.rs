//! Operation dispatch.
//!
//! Maps each [`OpKind`] to the routine lowering it into the tensor dialect.
//! The match is exhaustive: a new kind has to be placed here, either with a
//! routine or as unsupported.

use super::JitCompiler;
use crate::graph::{NodeId, OpKind};
use crate::ir::{TensorBinary, ValueId};
use crate::jit_assert;

/// Lowers one node. Returns its single result value, or `None` when the
/// routine bound its results itself.
pub type LowerFn = for<'c, 'g> fn(&'c mut JitCompiler<'g>, NodeId) -> Option<ValueId>;

/// Lowering routine for `kind`, or `None` if the kind cannot be compiled.
pub fn lowering_for(kind: OpKind) -> Option<LowerFn> {
    match kind {
        OpKind::Add => Some(lower_add as LowerFn),
        OpKind::MatmulBias => Some(lower_matmul_bias as LowerFn),
        OpKind::Parameter | OpKind::Result | OpKind::Multiply | OpKind::Subtract | OpKind::Relu => {
            None
        }
    }
}

fn lower_add(compiler: &mut JitCompiler<'_>, node: NodeId) -> Option<ValueId> {
    Some(compiler.create_binary_op(node, TensorBinary::Add))
}

fn lower_matmul_bias(compiler: &mut JitCompiler<'_>, node: NodeId) -> Option<ValueId> {
    let operands = compiler.graph().node(node).operands.len();
    jit_assert!(operands == 2, "Bias is not supported in MatmulBias operation");
    Some(compiler.create_binary_op(node, TensorBinary::MatmulBias))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_kinds() {
        assert!(lowering_for(OpKind::Add).is_some());
        assert!(lowering_for(OpKind::MatmulBias).is_some());
    }

    #[test]
    fn test_unsupported_kinds() {
        for kind in [
            OpKind::Parameter,
            OpKind::Result,
            OpKind::Multiply,
            OpKind::Subtract,
            OpKind::Relu,
        ] {
            assert!(lowering_for(kind).is_none(), "{kind} should be unsupported");
        }
    }
}
