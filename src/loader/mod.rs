//! Graph loaders

pub mod dag_json;

pub use dag_json::{build_graph, load_dag_file, load_graph, DagFile, DagNode};
