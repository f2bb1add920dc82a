//! Per-compiler statistics.

use hashbrown::HashMap;
use std::fmt;

/// Counters collected across compile-and-run cycles of one compiler.
#[derive(Debug, Default, Clone)]
pub struct CompileStats {
    /// Graph nodes lowered to tensor-dialect ops.
    pub nodes_lowered: usize,

    /// Count of each tensor op built.
    pub op_counts: HashMap<String, usize>,

    /// Passes run across all pass managers.
    pub passes_run: usize,

    /// Argument descriptors allocated, memory-manager slot included.
    pub descriptors_allocated: usize,

    /// Scratch allocations made by compiled code.
    pub scratch_allocations: usize,

    /// Successful JIT invocations.
    pub invocations: usize,
}

impl CompileStats {
    pub fn record_op(&mut self, name: &str) {
        *self.op_counts.entry(name.to_string()).or_insert(0) += 1;
    }
}

impl fmt::Display for CompileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "JIT Compile Statistics:")?;
        writeln!(f, "  Nodes lowered: {}", self.nodes_lowered)?;
        writeln!(f, "  Passes run: {}", self.passes_run)?;
        writeln!(f, "  Argument descriptors: {}", self.descriptors_allocated)?;
        writeln!(f, "  Scratch allocations: {}", self.scratch_allocations)?;
        writeln!(f, "  Invocations: {}", self.invocations)?;

        if !self.op_counts.is_empty() {
            writeln!(f, "  Op breakdown:")?;
            let mut sorted: Vec<_> = self.op_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (op, count) in sorted {
                writeln!(f, "    {}: {}", op, count)?;
            }
        }

        Ok(())
    }
}
