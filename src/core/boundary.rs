// This module classifies the tensors touched by a subgraph. A tensor produced inside the
// subgraph with at least one consumer outside it (a Result node included) is an external
// output. For every operand whose producer lies outside the subgraph, all results of that
// producer become external inputs. Both lists keep first-discovery order without duplicates,
// and that order later fixes the compiled function's parameter order and the order of the
// caller's buffer pointers. Everything else is an internal temporary. A tensor produced
// inside is never an input, even if it is also consumed inside.

//! Subgraph boundary analysis.

use crate::graph::{Graph, NodeId, TensorId};
use crate::jit_assert;
use hashbrown::HashSet;

/// External tensors of a subgraph, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
}

impl Boundary {
    /// External inputs followed by external outputs: the caller's buffer order.
    pub fn external_tensors(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).copied()
    }

    pub fn num_external(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }
}

/// Ordered set used to collect tensors without duplicates.
#[derive(Default)]
struct OrderedTensorSet {
    order: Vec<TensorId>,
    seen: HashSet<TensorId>,
}

impl OrderedTensorSet {
    fn insert(&mut self, tensor: TensorId) {
        if self.seen.insert(tensor) {
            self.order.push(tensor);
        }
    }
}

/// Walk the subgraph once and classify its external tensors.
///
/// Aborts if the subgraph is empty or either side of the boundary is empty.
pub fn analyze(graph: &Graph, subgraph: &[NodeId]) -> Boundary {
    jit_assert!(!subgraph.is_empty(), "Cannot compile an empty subgraph");

    let members: HashSet<NodeId> = subgraph.iter().copied().collect();
    let mut inputs = OrderedTensorSet::default();
    let mut outputs = OrderedTensorSet::default();

    for &node_id in subgraph {
        let node = graph.node(node_id);

        // A use outside the subgraph makes the tensor an output, else a temp.
        for &result in &node.results {
            let escapes = graph
                .tensor(result)
                .consumers()
                .iter()
                .any(|consumer| !members.contains(consumer));
            if escapes {
                outputs.insert(result);
            }
        }

        for &operand in &node.operands {
            let producer = graph.producer(operand);
            if !members.contains(&producer) {
                for &tensor in &graph.node(producer).results {
                    inputs.insert(tensor);
                }
            }
        }
    }

    jit_assert!(!inputs.order.is_empty(), "Cannot have empty inputs list");
    jit_assert!(!outputs.order.is_empty(), "Cannot have empty outputs list");

    log::debug!(
        "boundary: {} inputs, {} outputs across {} nodes",
        inputs.order.len(),
        outputs.order.len(),
        subgraph.len()
    );

    Boundary {
        inputs: inputs.order,
        outputs: outputs.order,
    }
}
