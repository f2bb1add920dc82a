//! Textual form of modules, used by the IR dump.

use super::function::{Function, Module, ValueId};
use super::ops::{Constant, Op};
use std::fmt::{self, Write};

fn join(values: &[ValueId]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_op(f: &mut impl Write, func: &Function, op: &Op, indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    write!(f, "{pad}")?;
    match op {
        Op::TensorAdd {
            lhs,
            rhs,
            result,
            loc,
        }
        | Op::TensorMatmulBias {
            lhs,
            rhs,
            result,
            loc,
        } => writeln!(
            f,
            "{result} = {} {lhs}, {rhs} : {} {loc}",
            op.name(),
            func.value_type(*result)
        ),
        Op::TensorReturn { operands } | Op::Return { operands } => {
            if operands.is_empty() {
                writeln!(f, "{}", op.name())
            } else {
                writeln!(f, "{} {}", op.name(), join(operands))
            }
        }
        Op::Constant { value, result } => {
            let text = match value {
                Constant::Index(v) | Constant::Int(v) => v.to_string(),
                Constant::Float(v) => format!("{v:?}"),
            };
            writeln!(f, "{result} = constant {text} : {}", func.value_type(*result))
        }
        Op::Alloc { mem_mgr, result } => {
            writeln!(f, "{result} = alloc({mem_mgr}) : {}", func.value_type(*result))
        }
        Op::Load {
            memref,
            indices,
            result,
        } => writeln!(f, "{result} = load {memref}[{}]", join(indices)),
        Op::Store {
            value,
            memref,
            indices,
        } => writeln!(f, "store {value}, {memref}[{}]", join(indices)),
        Op::Binary {
            kind,
            lhs,
            rhs,
            result,
        } => writeln!(
            f,
            "{result} = {} {lhs}, {rhs} : {}",
            kind.mnemonic(),
            func.value_type(*result)
        ),
        Op::For {
            iv,
            lower,
            upper,
            step,
            body,
        } => {
            writeln!(f, "affine.for {iv} = {lower} to {upper} step {step} {{")?;
            for inner in body {
                write_op(f, func, inner, indent + 1)?;
            }
            writeln!(f, "{pad}}}")
        }
        Op::CmpLt { lhs, rhs, result } => writeln!(f, "{result} = cmpi slt {lhs}, {rhs}"),
        Op::Br { dest, args } => writeln!(f, "br {dest}({})", join(args)),
        Op::CondBr {
            cond,
            true_dest,
            true_args,
            false_dest,
            false_args,
        } => writeln!(
            f,
            "cond_br {cond}, {true_dest}({}), {false_dest}({})",
            join(true_args),
            join(false_args)
        ),
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params()
            .iter()
            .map(|p| format!("{p}: {}", self.value_type(*p)))
            .collect::<Vec<_>>()
            .join(", ");
        let results = self
            .result_types()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "  func @{}({params}) -> ({results}) {{", self.name)?;
        for (index, block) in self.blocks.iter().enumerate() {
            if block.args.is_empty() {
                writeln!(f, "  ^bb{index}:")?;
            } else {
                let args = block
                    .args
                    .iter()
                    .map(|a| format!("{a}: {}", self.value_type(*a)))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "  ^bb{index}({args}):")?;
            }
            for op in &block.ops {
                write_op(f, self, op, 2)?;
            }
        }
        writeln!(f, "  }}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {{")?;
        for function in self.functions() {
            write!(f, "{function}")?;
        }
        writeln!(f, "}}")
    }
}
