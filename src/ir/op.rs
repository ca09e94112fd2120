//! Operator vertices of the dataflow graph.

use crate::ir::graph::VertexId;
use crate::ir::value::ValueId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(pub usize);

#[derive(Debug, Clone)]
pub struct Op {
    pub id: OpId,
    /// Unique within the graph.
    pub name: String,
    /// Operator type tag, e.g. "conv", "relu". The JSON loader records
    /// "unknown" when the description carries no type.
    pub ty: String,
    /// Consumed values, in declared operand order.
    pub inputs: Vec<ValueId>,
    /// Produced values, in declared order.
    pub outputs: Vec<ValueId>,
    /// Vertex-level predecessors, derived from non-param input producers.
    pub preds: Vec<VertexId>,
    /// Vertex-level successors.
    pub succs: Vec<VertexId>,
}

impl Op {
    pub fn new(id: OpId, name: String, ty: String) -> Self {
        Self {
            id,
            name,
            ty,
            inputs: Vec::new(),
            outputs: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// Op-vertex predecessors only, boundary vertices filtered out.
    pub fn pred_ops(&self) -> impl Iterator<Item = OpId> + '_ {
        self.preds.iter().filter_map(|v| match v {
            VertexId::Op(op) => Some(*op),
            _ => None,
        })
    }

    /// Op-vertex successors only.
    pub fn succ_ops(&self) -> impl Iterator<Item = OpId> + '_ {
        self.succs.iter().filter_map(|v| match v {
            VertexId::Op(op) => Some(*op),
            _ => None,
        })
    }
}
