//! DAG description loading tests over the public API

use schedforge::loader::{build_graph, DagFile};
use schedforge::{ErrorCategory, SchedForgeError, ValueKind};

fn parse(json: &str) -> DagFile {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_loads_graph_with_boundary_inputs() {
    let file = parse(
        r#"{
            "name": "two_source",
            "dummy_input_tensors": ["dummy_left", "dummy_right"],
            "graph_output_tensors": ["sum"],
            "tensor_list": ["left", "right", "sum"],
            "tensor_sizes": { "left": 8, "right": 8, "sum": 8 },
            "dag": [
                { "name": "left", "input_nodes": [], "input_tensors": [], "output_tensors": ["left"] },
                { "name": "right", "input_nodes": [], "input_tensors": [], "output_tensors": ["right"] },
                { "name": "sum", "input_nodes": ["left", "right"],
                  "input_tensors": ["left", "right"], "output_tensors": ["sum"] }
            ]
        }"#,
    );
    let graph = build_graph(&file).unwrap();

    assert_eq!(graph.name, "two_source");
    assert_eq!(graph.inputs.len(), 2);
    assert_eq!(graph.ops.len(), 3);
    assert_eq!(graph.outputs.len(), 1);

    // dummy inputs carry no size in the JSON path
    for input in &graph.inputs {
        let val = graph.value(input.value);
        assert_eq!(val.kind, ValueKind::Input);
        assert_eq!(val.size, 0);
    }

    // boundary ops consume their synthetic inputs
    let left = &graph.ops[0];
    assert_eq!(graph.value(left.inputs[0]).name, "dummy_left");
}

#[test]
fn test_tensor_without_size_is_rejected() {
    let file = parse(
        r#"{
            "name": "bad",
            "dummy_input_tensors": ["dummy_x"],
            "graph_output_tensors": ["y"],
            "tensor_list": ["x", "y"],
            "tensor_sizes": { "y": 8 },
            "dag": [
                { "name": "x", "input_nodes": [], "input_tensors": [], "output_tensors": ["x"] },
                { "name": "y", "input_nodes": ["x"], "input_tensors": ["x"], "output_tensors": ["y"] }
            ]
        }"#,
    );
    let err = build_graph(&file).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Schema);
    assert!(matches!(err, SchedForgeError::MissingTensorSize(name) if name == "x"));
}

#[test]
fn test_unknown_tensor_reference_is_rejected() {
    let file = parse(
        r#"{
            "name": "bad",
            "dummy_input_tensors": ["dummy_x"],
            "graph_output_tensors": ["y"],
            "tensor_list": ["x", "y"],
            "tensor_sizes": { "x": 8, "y": 8 },
            "dag": [
                { "name": "x", "input_nodes": [], "input_tensors": [], "output_tensors": ["x"] },
                { "name": "y", "input_nodes": ["x"], "input_tensors": ["missing"], "output_tensors": ["y"] }
            ]
        }"#,
    );
    let err = build_graph(&file).unwrap_err();
    assert!(matches!(err, SchedForgeError::MissingTensor(name) if name == "missing"));
}

#[test]
fn test_malformed_json_is_io_category() {
    let err = serde_json::from_str::<DagFile>("{ not json").unwrap_err();
    let err: SchedForgeError = err.into();
    assert_eq!(err.category(), ErrorCategory::Io);
}

#[test]
fn test_missing_fields_default_to_empty() {
    let file = parse(r#"{ "name": "empty" }"#);
    let graph = build_graph(&file).unwrap();
    assert_eq!(graph.ops.len(), 0);
    assert_eq!(graph.inputs.len(), 0);
}
