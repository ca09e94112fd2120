//! JSON DAG description loader.
//!
//! The file format describes a computation DAG by name:
//!
//! ```json
//! {
//!   "name": "net",
//!   "dummy_input_tensors": ["dummy_a"],
//!   "graph_output_tensors": ["c"],
//!   "tensor_list": ["a", "b", "c"],
//!   "tensor_sizes": { "a": 10, "b": 20, "c": 30, "dummy_a": 0 },
//!   "dag": [
//!     { "name": "a", "input_nodes": [], "input_tensors": [], "output_tensors": ["a"] },
//!     { "name": "b", "input_nodes": ["a"], "input_tensors": ["a"], "output_tensors": ["b"] }
//!   ]
//! }
//! ```
//!
//! A node with no `input_nodes` consumes the synthetic input
//! `"dummy_" + name`. Every referenced tensor must carry a size; op
//! types are recorded as "unknown".

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{SchedForgeError, SchedResult};
use crate::ir::{Graph, ValueId};

/// Top-level DAG description file.
#[derive(Debug, Clone, Deserialize)]
pub struct DagFile {
    pub name: String,
    #[serde(default)]
    pub dummy_input_tensors: Vec<String>,
    #[serde(default)]
    pub graph_output_tensors: Vec<String>,
    #[serde(default)]
    pub tensor_list: Vec<String>,
    #[serde(default)]
    pub tensor_sizes: HashMap<String, u64>,
    #[serde(default)]
    pub dag: Vec<DagNode>,
}

/// One operator entry of the DAG description.
#[derive(Debug, Clone, Deserialize)]
pub struct DagNode {
    pub name: String,
    #[serde(default)]
    pub input_nodes: Vec<String>,
    #[serde(default)]
    pub input_tensors: Vec<String>,
    #[serde(default)]
    pub output_tensors: Vec<String>,
}

/// Parse a DAG description file.
pub fn load_dag_file(path: impl AsRef<Path>) -> SchedResult<DagFile> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Load and build in one step.
pub fn load_graph(path: impl AsRef<Path>) -> SchedResult<Graph> {
    let file = load_dag_file(path)?;
    build_graph(&file)
}

/// Build a graph from a parsed DAG description.
///
/// Inputs take size zero; output and intermediate tensors must appear in
/// `tensor_sizes`. Missing references are schema errors naming the
/// offending tensor.
pub fn build_graph(file: &DagFile) -> SchedResult<Graph> {
    let mut graph = Graph::new(file.name.clone());
    let mut name_to_val: HashMap<&str, ValueId> = HashMap::new();

    debug!(graph = %file.name, "creating graph inputs");
    for tensor in &file.dummy_input_tensors {
        if name_to_val.contains_key(tensor.as_str()) {
            return Err(SchedForgeError::DuplicateName(tensor.clone()));
        }
        let vid = graph.add_input(tensor.clone(), 0);
        name_to_val.insert(tensor.as_str(), vid);
        debug!(input = %tensor, "graph input");
    }

    debug!("creating graph outputs");
    let mut pending_outputs = Vec::new();
    for tensor in &file.graph_output_tensors {
        if name_to_val.contains_key(tensor.as_str()) {
            return Err(SchedForgeError::DuplicateName(tensor.clone()));
        }
        let size = tensor_size(file, tensor)?;
        let vid = graph.add_result(tensor.clone(), size);
        name_to_val.insert(tensor.as_str(), vid);
        pending_outputs.push(vid);
        debug!(output = %tensor, size, "graph output");
    }

    debug!("creating intermediate tensors");
    for tensor in &file.tensor_list {
        // inputs and outputs were added above
        if name_to_val.contains_key(tensor.as_str()) {
            continue;
        }
        let size = tensor_size(file, tensor)?;
        let vid = graph.add_result(tensor.clone(), size);
        name_to_val.insert(tensor.as_str(), vid);
    }

    debug!("creating ops");
    for node in &file.dag {
        let inputs = if node.input_nodes.is_empty() {
            // boundary node: consumes its synthetic input tensor
            let dummy = format!("dummy_{}", node.name);
            let vid = name_to_val
                .get(dummy.as_str())
                .copied()
                .ok_or_else(|| SchedForgeError::MissingTensor(dummy.clone()))?;
            vec![vid]
        } else {
            node.input_tensors
                .iter()
                .map(|t| {
                    name_to_val
                        .get(t.as_str())
                        .copied()
                        .ok_or_else(|| SchedForgeError::MissingTensor(t.clone()))
                })
                .collect::<SchedResult<Vec<_>>>()?
        };
        let outputs = node
            .output_tensors
            .iter()
            .map(|t| {
                name_to_val
                    .get(t.as_str())
                    .copied()
                    .ok_or_else(|| SchedForgeError::MissingTensor(t.clone()))
            })
            .collect::<SchedResult<Vec<_>>>()?;
        graph.add_op(node.name.clone(), "unknown", inputs, outputs)?;
        debug!(op = %node.name, "created op");
    }

    for vid in pending_outputs {
        graph.mark_output(vid);
    }

    debug!("connecting vertices");
    graph.connect_verts()?;
    graph.validate()?;
    Ok(graph)
}

fn tensor_size(file: &DagFile, tensor: &str) -> SchedResult<u64> {
    file.tensor_sizes
        .get(tensor)
        .copied()
        .ok_or_else(|| SchedForgeError::MissingTensorSize(tensor.to_string()))
}
