//! Graph arena and structural operations.
//!
//! The graph owns two vectors (`values`, `ops`) plus the boundary
//! vertices; every cross-reference is a stable index. Cloning is a deep
//! clone by construction and subgraph extraction is a pure index rewrite.

use crate::error::{SchedForgeError, SchedResult};
use crate::ir::op::{Op, OpId};
use crate::ir::value::{Value, ValueId, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub usize);

/// Graph vertex reference. Replaces a polymorphic vertex hierarchy with a
/// tagged variant; every traversal is an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexId {
    Input(InputId),
    Op(OpId),
    Output(OutputId),
}

/// Boundary vertex owning one Input value.
#[derive(Debug, Clone)]
pub struct InputVert {
    pub id: InputId,
    pub value: ValueId,
    pub succs: Vec<VertexId>,
}

/// Boundary vertex referencing one Result (or Input) value; the only
/// sinks of the DAG.
#[derive(Debug, Clone)]
pub struct OutputVert {
    pub id: OutputId,
    pub value: ValueId,
    pub pred: Option<VertexId>,
}

#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub name: String,
    pub values: Vec<Value>,
    pub ops: Vec<Op>,
    pub inputs: Vec<InputVert>,
    pub outputs: Vec<OutputVert>,
    pub params: Vec<ValueId>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0]
    }

    pub fn op(&self, id: OpId) -> &Op {
        &self.ops[id.0]
    }

    /// Add a graph input value together with its boundary vertex.
    pub fn add_input(&mut self, name: impl Into<String>, size: u64) -> ValueId {
        let vid = ValueId(self.values.len());
        let iid = InputId(self.inputs.len());
        self.values.push(Value {
            id: vid,
            name: name.into(),
            kind: ValueKind::Input,
            size,
            def: None,
            uses: Vec::new(),
            input: Some(iid),
        });
        self.inputs.push(InputVert {
            id: iid,
            value: vid,
            succs: Vec::new(),
        });
        vid
    }

    /// Add a parameter value. Params never enter the liveness model.
    pub fn add_param(&mut self, name: impl Into<String>, size: u64) -> ValueId {
        let vid = ValueId(self.values.len());
        self.values.push(Value {
            id: vid,
            name: name.into(),
            kind: ValueKind::Param,
            size,
            def: None,
            uses: Vec::new(),
            input: None,
        });
        self.params.push(vid);
        vid
    }

    /// Add an op-produced intermediate value.
    pub fn add_result(&mut self, name: impl Into<String>, size: u64) -> ValueId {
        let vid = ValueId(self.values.len());
        self.values.push(Value {
            id: vid,
            name: name.into(),
            kind: ValueKind::Result,
            size,
            def: None,
            uses: Vec::new(),
            input: None,
        });
        vid
    }

    /// Add an op consuming `inputs` and defining `outputs`.
    ///
    /// Errors if an output value already has a defining op, or is not a
    /// Result value.
    pub fn add_op(
        &mut self,
        name: impl Into<String>,
        ty: impl Into<String>,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    ) -> SchedResult<OpId> {
        let oid = OpId(self.ops.len());
        let mut op = Op::new(oid, name.into(), ty.into());
        for &vid in &inputs {
            self.values[vid.0].uses.push(oid);
        }
        for &vid in &outputs {
            let val = &mut self.values[vid.0];
            if val.kind != ValueKind::Result {
                return Err(SchedForgeError::Redefinition(val.name.clone()));
            }
            if val.def.is_some() {
                return Err(SchedForgeError::Redefinition(val.name.clone()));
            }
            val.def = Some(oid);
        }
        op.inputs = inputs;
        op.outputs = outputs;
        self.ops.push(op);
        Ok(oid)
    }

    /// Mark a value as a graph output.
    pub fn mark_output(&mut self, value: ValueId) -> OutputId {
        let oid = OutputId(self.outputs.len());
        self.outputs.push(OutputVert {
            id: oid,
            value,
            pred: None,
        });
        oid
    }

    /// Establish `preds`/`succs` for every op from its non-param input
    /// producers, and link each graph output to its defining vertex.
    ///
    /// Errors if a consumed Result value has no defining op.
    pub fn connect_verts(&mut self) -> SchedResult<()> {
        for op in &mut self.ops {
            op.preds.clear();
            op.succs.clear();
        }
        for input in &mut self.inputs {
            input.succs.clear();
        }
        for output in &mut self.outputs {
            output.pred = None;
        }

        for oi in 0..self.ops.len() {
            let to = VertexId::Op(OpId(oi));
            for ii in 0..self.ops[oi].inputs.len() {
                let vid = self.ops[oi].inputs[ii];
                let val = &self.values[vid.0];
                if val.kind == ValueKind::Param {
                    continue;
                }
                let from = self.def_vertex(vid)?;
                self.connect(from, to);
            }
        }

        for oi in 0..self.outputs.len() {
            let vid = self.outputs[oi].value;
            let from = self.def_vertex(vid)?;
            self.outputs[oi].pred = Some(from);
            match from {
                VertexId::Op(op) => {
                    let to = VertexId::Output(OutputId(oi));
                    if !self.ops[op.0].succs.contains(&to) {
                        self.ops[op.0].succs.push(to);
                    }
                }
                VertexId::Input(inp) => {
                    let to = VertexId::Output(OutputId(oi));
                    if !self.inputs[inp.0].succs.contains(&to) {
                        self.inputs[inp.0].succs.push(to);
                    }
                }
                VertexId::Output(_) => {}
            }
        }
        Ok(())
    }

    /// Vertex that produces a non-param value: its defining op, or the
    /// boundary Input vertex that owns it.
    fn def_vertex(&self, vid: ValueId) -> SchedResult<VertexId> {
        let val = &self.values[vid.0];
        if let Some(op) = val.def {
            return Ok(VertexId::Op(op));
        }
        if let Some(inp) = val.input {
            return Ok(VertexId::Input(inp));
        }
        Err(SchedForgeError::UndefinedValue(val.name.clone()))
    }

    fn connect(&mut self, from: VertexId, to: VertexId) {
        match from {
            VertexId::Op(op) => {
                if !self.ops[op.0].succs.contains(&to) {
                    self.ops[op.0].succs.push(to);
                }
            }
            VertexId::Input(inp) => {
                if !self.inputs[inp.0].succs.contains(&to) {
                    self.inputs[inp.0].succs.push(to);
                }
            }
            VertexId::Output(_) => {}
        }
        if let VertexId::Op(op) = to {
            if !self.ops[op.0].preds.contains(&from) {
                self.ops[op.0].preds.push(from);
            }
        }
    }

    /// Check the structural invariants the scheduler relies on: the op
    /// subgraph (non-param edges) is a DAG, every consumed Result value
    /// has a def, and no param is a graph output.
    pub fn validate(&self) -> SchedResult<()> {
        for val in &self.values {
            if val.kind == ValueKind::Result && val.def.is_none() && !val.uses.is_empty() {
                return Err(SchedForgeError::UndefinedValue(val.name.clone()));
            }
        }
        for out in &self.outputs {
            let val = &self.values[out.value.0];
            if val.kind == ValueKind::Param {
                return Err(SchedForgeError::ParamAsOutput(val.name.clone()));
            }
        }

        // Kahn over op-op edges; leftovers sit on a cycle.
        let mut indegree = vec![0usize; self.ops.len()];
        for op in &self.ops {
            indegree[op.id.0] = op.pred_ops().count();
        }
        let mut ready: Vec<usize> = (0..self.ops.len()).filter(|&i| indegree[i] == 0).collect();
        let mut seen = 0usize;
        while let Some(i) = ready.pop() {
            seen += 1;
            for succ in self.ops[i].succ_ops().collect::<Vec<_>>() {
                indegree[succ.0] -= 1;
                if indegree[succ.0] == 0 {
                    ready.push(succ.0);
                }
            }
        }
        if seen != self.ops.len() {
            let culprit = indegree
                .iter()
                .position(|&d| d > 0)
                .map(|i| self.ops[i].name.clone())
                .unwrap_or_default();
            return Err(SchedForgeError::CycleDetected(culprit));
        }
        Ok(())
    }

    /// Extract the subgraph anchored at the ops selected by `is_output`.
    ///
    /// The result contains the selected ops plus the transitive producers
    /// of their inputs, with param edges preserved and boundary Input
    /// vertices recreated. Entity order follows source declaration order,
    /// so `subgraph(|_| true)` is structurally identical to `clone()`.
    /// The result shares nothing with the source.
    pub fn subgraph(&self, is_output: impl Fn(&Op) -> bool) -> SchedResult<Graph> {
        let mut included = vec![false; self.ops.len()];
        let mut selected = vec![false; self.ops.len()];

        // Walk transitive producers from each selected op, in declaration
        // order so the traversal is deterministic.
        let mut stack = Vec::new();
        for op in &self.ops {
            if is_output(op) {
                selected[op.id.0] = true;
                if !included[op.id.0] {
                    included[op.id.0] = true;
                    stack.push(op.id.0);
                }
                while let Some(oi) = stack.pop() {
                    for &vid in &self.ops[oi].inputs {
                        let val = &self.values[vid.0];
                        if val.kind == ValueKind::Param {
                            continue;
                        }
                        if let Some(def) = val.def {
                            if !included[def.0] {
                                included[def.0] = true;
                                stack.push(def.0);
                            }
                        }
                    }
                }
            }
        }

        // A value survives when an included op touches it.
        let mut keep_value = vec![false; self.values.len()];
        for (oi, inc) in included.iter().enumerate() {
            if !inc {
                continue;
            }
            for &vid in &self.ops[oi].inputs {
                keep_value[vid.0] = true;
            }
            for &vid in &self.ops[oi].outputs {
                keep_value[vid.0] = true;
            }
        }

        let source_output: std::collections::HashSet<usize> =
            self.outputs.iter().map(|o| o.value.0).collect();

        let mut sub = Graph::new(self.name.clone());
        let mut value_map: Vec<Option<ValueId>> = vec![None; self.values.len()];
        for val in &self.values {
            if !keep_value[val.id.0] {
                continue;
            }
            let new_id = match val.kind {
                ValueKind::Input => sub.add_input(val.name.clone(), val.size),
                ValueKind::Param => sub.add_param(val.name.clone(), val.size),
                ValueKind::Result => sub.add_result(val.name.clone(), val.size),
            };
            value_map[val.id.0] = Some(new_id);
        }

        for (oi, inc) in included.iter().enumerate() {
            if !inc {
                continue;
            }
            let op = &self.ops[oi];
            let inputs = op
                .inputs
                .iter()
                .map(|v| value_map[v.0].expect("input of included op survives"))
                .collect();
            let outputs = op
                .outputs
                .iter()
                .map(|v| value_map[v.0].expect("output of included op survives"))
                .collect();
            sub.add_op(op.name.clone(), op.ty.clone(), inputs, outputs)?;
        }

        // An output value escapes the extraction when the source already
        // exported it, or when nothing inside the region consumes it.
        for (oi, inc) in included.iter().enumerate() {
            if !inc {
                continue;
            }
            for &vid in &self.ops[oi].outputs {
                let val = &self.values[vid.0];
                let consumed_inside = val.uses.iter().any(|u| included[u.0]);
                let escapes = source_output.contains(&vid.0)
                    || (selected[oi] && !consumed_inside);
                if escapes {
                    sub.mark_output(value_map[vid.0].expect("escaping value survives"));
                }
            }
        }

        sub.connect_verts()?;
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// in -> a -> b -> out, plus a param feeding b.
    fn chain_graph() -> Graph {
        let mut g = Graph::new("chain");
        let vin = g.add_input("in", 8);
        let va = g.add_result("a", 16);
        let vb = g.add_result("b", 32);
        let w = g.add_param("w", 1024);
        g.add_op("a", "conv", vec![vin], vec![va]).unwrap();
        g.add_op("b", "conv", vec![va, w], vec![vb]).unwrap();
        g.mark_output(vb);
        g.connect_verts().unwrap();
        g
    }

    #[test]
    fn test_connect_verts_builds_edges() {
        let g = chain_graph();
        let a = &g.ops[0];
        let b = &g.ops[1];
        assert_eq!(a.preds, vec![VertexId::Input(InputId(0))]);
        assert_eq!(a.succs, vec![VertexId::Op(OpId(1))]);
        assert_eq!(b.preds, vec![VertexId::Op(OpId(0))]);
        assert_eq!(b.succs, vec![VertexId::Output(OutputId(0))]);
        assert_eq!(g.outputs[0].pred, Some(VertexId::Op(OpId(1))));
    }

    #[test]
    fn test_param_edges_do_not_join_dag() {
        let g = chain_graph();
        // w feeds b but contributes no vertex edge
        let b = &g.ops[1];
        assert_eq!(b.pred_ops().count(), 1);
    }

    #[test]
    fn test_undefined_value_rejected() {
        let mut g = Graph::new("bad");
        let orphan = g.add_result("orphan", 4);
        let vout = g.add_result("out", 4);
        g.add_op("consumer", "relu", vec![orphan], vec![vout])
            .unwrap();
        g.mark_output(vout);
        let err = g.connect_verts().unwrap_err();
        assert!(matches!(err, SchedForgeError::UndefinedValue(name) if name == "orphan"));
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut g = Graph::new("bad");
        let vin = g.add_input("in", 4);
        let v = g.add_result("v", 4);
        g.add_op("p1", "relu", vec![vin], vec![v]).unwrap();
        let err = g.add_op("p2", "relu", vec![vin], vec![v]).unwrap_err();
        assert!(matches!(err, SchedForgeError::Redefinition(name) if name == "v"));
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut g = Graph::new("cyclic");
        let vin = g.add_input("in", 4);
        let va = g.add_result("a", 4);
        let vb = g.add_result("b", 4);
        g.add_op("a", "add", vec![vin, vb], vec![va]).unwrap();
        g.add_op("b", "add", vec![va], vec![vb]).unwrap();
        g.mark_output(vb);
        g.connect_verts().unwrap();
        let err = g.validate().unwrap_err();
        assert!(matches!(err, SchedForgeError::CycleDetected(_)));
    }

    #[test]
    fn test_validate_param_as_output() {
        let mut g = Graph::new("bad");
        let w = g.add_param("w", 16);
        g.mark_output(w);
        let err = g.validate().unwrap_err();
        assert!(matches!(err, SchedForgeError::ParamAsOutput(name) if name == "w"));
    }

    #[test]
    fn test_clone_is_structural_identity() {
        let g = chain_graph();
        let c = g.clone();
        assert_eq!(g.name, c.name);
        assert_eq!(g.values.len(), c.values.len());
        assert_eq!(g.ops.len(), c.ops.len());
        for (a, b) in g.values.iter().zip(&c.values) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.def, b.def);
            assert_eq!(a.uses, b.uses);
        }
        for (a, b) in g.ops.iter().zip(&c.ops) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.preds, b.preds);
            assert_eq!(a.succs, b.succs);
        }
    }

    #[test]
    fn test_subgraph_all_equals_clone() {
        let g = chain_graph();
        let s = g.subgraph(|_| true).unwrap();
        assert_eq!(s.values.len(), g.values.len());
        assert_eq!(s.ops.len(), g.ops.len());
        assert_eq!(s.inputs.len(), g.inputs.len());
        assert_eq!(s.outputs.len(), g.outputs.len());
        assert_eq!(s.params.len(), g.params.len());
        for (a, b) in g.values.iter().zip(&s.values) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.size, b.size);
            assert_eq!(a.def, b.def);
            assert_eq!(a.uses, b.uses);
        }
        for (a, b) in g.ops.iter().zip(&s.ops) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.inputs, b.inputs);
            assert_eq!(a.outputs, b.outputs);
        }
    }

    #[test]
    fn test_subgraph_prefix() {
        let g = chain_graph();
        // Anchor at op "a": b is excluded, a's value escapes.
        let s = g.subgraph(|op| op.name == "a").unwrap();
        assert_eq!(s.ops.len(), 1);
        assert_eq!(s.ops[0].name, "a");
        assert_eq!(s.outputs.len(), 1);
        assert_eq!(s.values[s.outputs[0].value.0].name, "a");
        // Param was only consumed by b, so it does not survive.
        assert!(s.params.is_empty());
    }
}
