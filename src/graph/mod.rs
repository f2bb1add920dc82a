// This module models the upstream computation graph the JIT compiles from. The graph is an
// arena of nodes and tensors addressed by NodeId/TensorId; those ids are the identities the
// compiler keys on, so two tensors with identical type and shape are still distinct. Every
// node has an OpKind from a closed set, a unique human-readable name, ordered operands and
// ordered results. Consumers are recorded per tensor as nodes are added, and Result nodes
// mark tensors observed outside the graph. Only construction and queries live here; the
// compiler never mutates a graph.

//! Upstream tensor graph.
//!
//! A small arena-backed graph used to describe the subgraphs handed to the
//! JIT. Tensor identity is the [`TensorId`] handle, never the tensor's value.

pub mod element_type;

pub use element_type::ElementType;

use std::fmt;

/// Handle of a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Handle of a tensor inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub usize);

/// Shape of a tensor: ordered, non-negative dimension sizes.
pub type Shape = Vec<usize>;

/// Operation kinds a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Graph input.
    Parameter,
    /// Graph output sink.
    Result,
    Add,
    /// Matrix multiply with an optional bias operand.
    MatmulBias,
    Multiply,
    Subtract,
    Relu,
}

impl OpKind {
    /// Descriptive operation name used in diagnostics.
    pub fn description(self) -> &'static str {
        match self {
            OpKind::Parameter => "Parameter",
            OpKind::Result => "Result",
            OpKind::Add => "Add",
            OpKind::MatmulBias => "MatmulBias",
            OpKind::Multiply => "Multiply",
            OpKind::Subtract => "Subtract",
            OpKind::Relu => "Relu",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Type and shape of a tensor plus its producer.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub element_type: ElementType,
    pub shape: Shape,
    /// Node producing this tensor.
    pub producer: NodeId,
    /// Result slot on the producer.
    pub output_index: usize,
    consumers: Vec<NodeId>,
}

impl Tensor {
    /// Nodes reading this tensor, in insertion order, one entry per use.
    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// One operation instance.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: OpKind,
    pub name: String,
    pub operands: Vec<TensorId>,
    pub results: Vec<TensorId>,
}

impl Node {
    pub fn description(&self) -> &'static str {
        self.kind.description()
    }
}

/// Arena of nodes and tensors.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    tensors: Vec<Tensor>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Producer of the given tensor.
    pub fn producer(&self, id: TensorId) -> NodeId {
        self.tensors[id.0].producer
    }

    /// First result of a node.
    pub fn output(&self, node: NodeId) -> TensorId {
        self.nodes[node.0].results[0]
    }

    /// Add a node with explicit result types.
    ///
    /// Operands must already exist in this graph.
    pub fn add_node(
        &mut self,
        kind: OpKind,
        operands: &[TensorId],
        results: &[(ElementType, Shape)],
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        for operand in operands {
            self.tensors[operand.0].consumers.push(id);
        }

        let result_ids = results
            .iter()
            .enumerate()
            .map(|(output_index, (element_type, shape))| {
                let tensor = TensorId(self.tensors.len());
                self.tensors.push(Tensor {
                    element_type: *element_type,
                    shape: shape.clone(),
                    producer: id,
                    output_index,
                    consumers: Vec::new(),
                });
                tensor
            })
            .collect();

        self.nodes.push(Node {
            kind,
            name: format!("{}_{}", kind.description(), id.0),
            operands: operands.to_vec(),
            results: result_ids,
        });
        log::trace!("graph: added node {} ({} operands)", self.nodes[id.0].name, operands.len());
        id
    }

    /// Add a graph input and return its tensor.
    pub fn parameter(&mut self, element_type: ElementType, shape: impl Into<Shape>) -> TensorId {
        let node = self.add_node(OpKind::Parameter, &[], &[(element_type, shape.into())]);
        self.output(node)
    }

    /// Mark a tensor as observed outside the graph.
    pub fn add_result(&mut self, tensor: TensorId) -> NodeId {
        self.add_node(OpKind::Result, &[tensor], &[])
    }

    /// Elementwise node whose result mirrors the first operand.
    pub fn elementwise(&mut self, kind: OpKind, operands: &[TensorId]) -> NodeId {
        let first = &self.tensors[operands[0].0];
        let result = (first.element_type, first.shape.clone());
        self.add_node(kind, operands, &[result])
    }

    pub fn add(&mut self, lhs: TensorId, rhs: TensorId) -> NodeId {
        self.elementwise(OpKind::Add, &[lhs, rhs])
    }

    pub fn multiply(&mut self, lhs: TensorId, rhs: TensorId) -> NodeId {
        self.elementwise(OpKind::Multiply, &[lhs, rhs])
    }

    pub fn relu(&mut self, arg: TensorId) -> NodeId {
        self.elementwise(OpKind::Relu, &[arg])
    }

    /// `[M, K] x [K, N] (+ bias)` producing `[M, N]`.
    pub fn matmul_bias(&mut self, lhs: TensorId, rhs: TensorId, bias: Option<TensorId>) -> NodeId {
        let lhs_tensor = &self.tensors[lhs.0];
        let rhs_tensor = &self.tensors[rhs.0];
        let rows = lhs_tensor.shape.first().copied().unwrap_or(1);
        let cols = rhs_tensor.shape.get(1).copied().unwrap_or(1);
        let result = (lhs_tensor.element_type, vec![rows, cols]);

        let mut operands = vec![lhs, rhs];
        operands.extend(bias);
        self.add_node(OpKind::MatmulBias, &operands, &[result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumers_are_tracked() {
        let mut graph = Graph::new();
        let a = graph.parameter(ElementType::F32, vec![4]);
        let b = graph.parameter(ElementType::F32, vec![4]);
        let add = graph.add(a, b);
        let sum = graph.output(add);
        let result = graph.add_result(sum);

        assert_eq!(graph.tensor(a).consumers(), &[add]);
        assert_eq!(graph.tensor(sum).consumers(), &[result]);
        assert_eq!(graph.producer(sum), add);
        assert_eq!(graph.node(add).name, "Add_2");
    }

    #[test]
    fn test_matmul_shape() {
        let mut graph = Graph::new();
        let a = graph.parameter(ElementType::F32, vec![2, 3]);
        let b = graph.parameter(ElementType::F32, vec![3, 5]);
        let mm = graph.matmul_bias(a, b, None);
        assert_eq!(graph.tensor(graph.output(mm)).shape, vec![2, 5]);
        assert_eq!(graph.node(mm).operands.len(), 2);
    }

    #[test]
    fn test_same_shape_tensors_are_distinct() {
        let mut graph = Graph::new();
        let a = graph.parameter(ElementType::F32, vec![4]);
        let b = graph.parameter(ElementType::F32, vec![4]);
        assert_ne!(a, b);
    }
}
