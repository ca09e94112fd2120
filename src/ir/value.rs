//! Tensor-typed SSA values.

use crate::ir::graph::InputId;
use crate::ir::op::OpId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub usize);

/// What a value means to the scheduler.
///
/// Inputs arrive at the graph boundary, params are long-lived model
/// weights excluded from the liveness cost model, and results are the
/// intermediates produced by ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Input,
    Param,
    Result,
}

#[derive(Debug, Clone)]
pub struct Value {
    pub id: ValueId,
    /// Unique within the graph.
    pub name: String,
    pub kind: ValueKind,
    /// Byte size. Zero for inputs and params in the JSON path.
    pub size: u64,
    /// Producing op. None for Input/Param values.
    pub def: Option<OpId>,
    /// Consuming ops, in op declaration order; an op consuming the same
    /// value through two operands appears twice.
    pub uses: Vec<OpId>,
    /// Owning boundary vertex for Input values.
    pub input: Option<InputId>,
}

impl Value {
    pub fn is_param(&self) -> bool {
        self.kind == ValueKind::Param
    }

    pub fn is_input(&self) -> bool {
        self.kind == ValueKind::Input
    }

    pub fn is_result(&self) -> bool {
        self.kind == ValueKind::Result
    }
}
