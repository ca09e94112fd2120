//! Dataflow graph IR: ops, values, and boundary vertices.

pub mod graph;
pub mod op;
pub mod value;

pub use graph::{Graph, InputId, InputVert, OutputId, OutputVert, VertexId};
pub use op::{Op, OpId};
pub use value::{Value, ValueId, ValueKind};
