//! Boundary analysis over the public graph API.

use subgraph_jit::core::boundary::analyze;
use subgraph_jit::{ElementType, Graph, OpKind};

#[test]
fn test_analysis_is_deterministic() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut graph = Graph::new();
    let a = graph.parameter(ElementType::F32, vec![8]);
    let b = graph.parameter(ElementType::F32, vec![8]);
    let add = graph.add(a, b);
    graph.add_result(graph.output(add));

    let first = analyze(&graph, &[add]);
    let second = analyze(&graph, &[add]);
    assert_eq!(first, second);
    assert_eq!(first.inputs, vec![a, b]);
    assert_eq!(first.outputs, vec![graph.output(add)]);
}

#[test]
fn test_repeated_operand_appears_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut graph = Graph::new();
    let a = graph.parameter(ElementType::I64, vec![3]);
    let double = graph.add(a, a);
    let sum = graph.output(double);
    graph.add_result(sum);
    graph.add_result(sum);

    let boundary = analyze(&graph, &[double]);
    assert_eq!(boundary.inputs, vec![a]);
    assert_eq!(boundary.outputs, vec![sum]);
    assert_eq!(boundary.num_external(), 2);
}

#[test]
fn test_all_results_of_outside_producer_are_inputs() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut graph = Graph::new();
    let split = graph.add_node(
        OpKind::Parameter,
        &[],
        &[(ElementType::F32, vec![2]), (ElementType::F32, vec![2])],
    );
    let first = graph.node(split).results[0];
    let second = graph.node(split).results[1];
    let add = graph.add(first, first);
    graph.add_result(graph.output(add));
    graph.add_result(second);

    let boundary = analyze(&graph, &[add]);
    assert_eq!(boundary.inputs, vec![first, second]);
    let external: Vec<_> = boundary.external_tensors().collect();
    assert_eq!(external, vec![first, second, graph.output(add)]);
}

#[test]
fn test_internal_temporary_is_not_external() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut graph = Graph::new();
    let a = graph.parameter(ElementType::F32, vec![4]);
    let b = graph.parameter(ElementType::F32, vec![4]);
    let first = graph.add(a, b);
    let tmp = graph.output(first);
    let second = graph.add(tmp, b);
    graph.add_result(graph.output(second));

    let boundary = analyze(&graph, &[first, second]);
    assert_eq!(boundary.inputs, vec![a, b]);
    assert_eq!(boundary.outputs, vec![graph.output(second)]);
    assert!(!boundary.external_tensors().any(|t| t == tmp));
}

#[test]
#[should_panic(expected = "Cannot have empty outputs list")]
fn test_unobserved_result_is_fatal() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut graph = Graph::new();
    let a = graph.parameter(ElementType::F32, vec![4]);
    let relu = graph.relu(a);
    analyze(&graph, &[relu]);
}
