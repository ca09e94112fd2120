//! Hierarchical graph over the op DAG.
//!
//! The hierarchy is a tree of scheduling units: a `Sequence` owns an
//! ordered chain of children, a `Group` owns a set of children whose
//! internal DAG must be scheduled as one unit. Leaves cover the op set
//! bijectively, and any flattening that respects sequence order and
//! schedules each group topologically is a valid topological order of
//! the underlying graph.

pub mod pass;

pub use pass::{HierPass, JoinSequencePass};

use std::collections::BinaryHeap;

use crate::ir::{Graph, OpId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HierId(pub usize);

/// Tree node of the hierarchy. Boundary vertices ride along as children
/// of the root so the tree mirrors the full graph.
#[derive(Debug, Clone)]
pub enum HierNode {
    Input { input: crate::ir::InputId },
    Output { output: crate::ir::OutputId },
    Op { op: OpId },
    Sequence { children: Vec<HierId> },
    Group { children: Vec<HierId> },
}

#[derive(Debug, Clone)]
pub struct HierGraph {
    /// Node arena; the tree is whatever is reachable from `root`.
    pub nodes: Vec<HierNode>,
    pub root: HierId,
}

impl HierGraph {
    pub fn node(&self, id: HierId) -> &HierNode {
        &self.nodes[id.0]
    }

    /// Ops under a node, leaves in declared order.
    pub fn flat_ops(&self, id: HierId) -> Vec<OpId> {
        let mut out = Vec::new();
        flat_ops_of(&self.nodes, id, &mut out);
        out
    }

    /// Build the hierarchy:
    /// 1. one leaf per op;
    /// 2. condense maximal op chains into sequences;
    /// 3. wrap single-entry/single-exit fork-join regions into groups
    ///    (twice, so a region over freshly created groups is caught);
    /// 4. condense the resulting unit chains into sequences;
    /// 5. root group over the remaining units plus the boundary vertices.
    pub fn from_graph(graph: &Graph) -> Self {
        let mut nodes: Vec<HierNode> = graph
            .ops
            .iter()
            .map(|op| HierNode::Op { op: op.id })
            .collect();
        let mut top: Vec<HierId> = (0..nodes.len()).map(HierId).collect();

        top = condense_chains(&mut nodes, graph, top);
        for _ in 0..2 {
            top = wrap_fork_join(&mut nodes, graph, top);
            top = condense_chains(&mut nodes, graph, top);
        }

        let mut children = Vec::with_capacity(top.len() + graph.inputs.len() + graph.outputs.len());
        for input in &graph.inputs {
            let id = HierId(nodes.len());
            nodes.push(HierNode::Input { input: input.id });
            children.push(id);
        }
        children.extend(top);
        for output in &graph.outputs {
            let id = HierId(nodes.len());
            nodes.push(HierNode::Output { output: output.id });
            children.push(id);
        }

        let root = HierId(nodes.len());
        nodes.push(HierNode::Group { children });
        HierGraph { nodes, root }
    }
}

pub(crate) fn flat_ops_of(nodes: &[HierNode], id: HierId, out: &mut Vec<OpId>) {
    match &nodes[id.0] {
        HierNode::Input { .. } | HierNode::Output { .. } => {}
        HierNode::Op { op } => out.push(*op),
        HierNode::Sequence { children } | HierNode::Group { children } => {
            for &c in children {
                flat_ops_of(nodes, c, out);
            }
        }
    }
}

/// Dependency edges between units, derived from the op DAG. Returned as
/// `(preds, succs)` index lists into `units`, deduplicated, in op
/// declaration order.
pub(crate) fn unit_edges(
    graph: &Graph,
    nodes: &[HierNode],
    units: &[HierId],
) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let mut unit_of = vec![usize::MAX; graph.ops.len()];
    for (ui, &u) in units.iter().enumerate() {
        let mut ops = Vec::new();
        flat_ops_of(nodes, u, &mut ops);
        for op in ops {
            unit_of[op.0] = ui;
        }
    }
    let n = units.len();
    let mut preds = vec![Vec::new(); n];
    let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
    for op in &graph.ops {
        let up = unit_of[op.id.0];
        if up == usize::MAX {
            continue;
        }
        for s in op.succ_ops() {
            let us = unit_of[s.0];
            if us == usize::MAX || us == up {
                continue;
            }
            if !succs[up].contains(&us) {
                succs[up].push(us);
            }
            if !preds[us].contains(&up) {
                preds[us].push(up);
            }
        }
    }
    (preds, succs)
}

/// Condense maximal unit chains (sole successor whose sole predecessor
/// is the link source) into sequences.
fn condense_chains(nodes: &mut Vec<HierNode>, graph: &Graph, top: Vec<HierId>) -> Vec<HierId> {
    if top.len() < 2 {
        return top;
    }
    let (preds, succs) = unit_edges(graph, nodes, &top);
    let n = top.len();
    let linked: Vec<Option<usize>> = (0..n)
        .map(|u| match succs[u].as_slice() {
            [v] if preds[*v].len() == 1 => Some(*v),
            _ => None,
        })
        .collect();
    let mut has_incoming = vec![false; n];
    for u in 0..n {
        if let Some(v) = linked[u] {
            has_incoming[v] = true;
        }
    }

    let mut result = Vec::new();
    for u in 0..n {
        let in_chain = linked[u].is_some() || has_incoming[u];
        if !in_chain {
            result.push(top[u]);
            continue;
        }
        if has_incoming[u] {
            // not a chain head; emitted when its head is reached
            continue;
        }
        let mut children = vec![top[u]];
        let mut cur = u;
        while let Some(v) = linked[cur] {
            children.push(top[v]);
            cur = v;
        }
        let id = HierId(nodes.len());
        nodes.push(HierNode::Sequence { children });
        result.push(id);
    }
    result
}

/// Topological order over the unit DAG, smallest unit index first among
/// ready units.
fn unit_topo_order(preds: &[Vec<usize>], succs: &[Vec<usize>]) -> Vec<usize> {
    let n = preds.len();
    let mut indegree: Vec<usize> = preds.iter().map(|p| p.len()).collect();
    let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = (0..n)
        .filter(|&u| indegree[u] == 0)
        .map(std::cmp::Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(std::cmp::Reverse(u)) = ready.pop() {
        order.push(u);
        for &s in &succs[u] {
            indegree[s] -= 1;
            if indegree[s] == 0 {
                ready.push(std::cmp::Reverse(s));
            }
        }
    }
    order
}

/// Wrap single-entry/single-exit fork-join regions into groups.
///
/// For each unit with two or more successors, the region runs up to (and
/// excluding) its immediate post-dominator. Regions are accepted when no
/// member other than the fork is entered from outside.
fn wrap_fork_join(nodes: &mut Vec<HierNode>, graph: &Graph, top: Vec<HierId>) -> Vec<HierId> {
    let n = top.len();
    if n < 3 {
        return top;
    }
    let (preds, succs) = unit_edges(graph, nodes, &top);
    let topo = unit_topo_order(&preds, &succs);
    if topo.len() != n {
        // not a DAG at unit level; leave the hierarchy flat
        return top;
    }

    let exit = n;
    let mut topo_idx = vec![0usize; n + 1];
    for (i, &u) in topo.iter().enumerate() {
        topo_idx[u] = i;
    }
    topo_idx[exit] = n;

    // Immediate post-dominators, computed sinks-first (Cooper-Harvey-
    // Kennedy intersection over a virtual exit).
    let mut ipdom = vec![usize::MAX; n + 1];
    ipdom[exit] = exit;
    for &u in topo.iter().rev() {
        let mut it = succs[u].iter().copied();
        let mut idom = it.next().unwrap_or(exit);
        for s in it {
            idom = pdom_intersect(idom, s, &ipdom, &topo_idx);
        }
        ipdom[u] = idom;
    }

    let mut consumed = vec![false; n];
    let mut regions: Vec<Vec<usize>> = Vec::new();
    let mut region_of = vec![usize::MAX; n];
    for &f in &topo {
        if consumed[f] || succs[f].len() < 2 {
            continue;
        }
        let join = ipdom[f];
        if join == exit {
            continue;
        }
        let mut seen = vec![false; n];
        seen[f] = true;
        let mut region = vec![f];
        let mut stack = vec![f];
        while let Some(u) = stack.pop() {
            for &s in &succs[u] {
                if s == join || seen[s] {
                    continue;
                }
                seen[s] = true;
                region.push(s);
                stack.push(s);
            }
        }
        let mut ok = region.len() >= 3;
        for &u in &region {
            if consumed[u] {
                ok = false;
                break;
            }
            if u != f && preds[u].iter().any(|p| !seen[*p]) {
                ok = false;
                break;
            }
        }
        if !ok {
            continue;
        }
        region.sort_unstable();
        for &u in &region {
            consumed[u] = true;
            region_of[u] = regions.len();
        }
        regions.push(region);
    }
    if regions.is_empty() {
        return top;
    }

    let mut created: Vec<Option<HierId>> = vec![None; regions.len()];
    let mut result = Vec::new();
    for u in 0..n {
        let ri = region_of[u];
        if ri == usize::MAX {
            result.push(top[u]);
        } else if created[ri].is_none() {
            let children: Vec<HierId> = regions[ri].iter().map(|&m| top[m]).collect();
            let id = HierId(nodes.len());
            nodes.push(HierNode::Group { children });
            created[ri] = Some(id);
            result.push(id);
        }
    }
    result
}

fn pdom_intersect(mut a: usize, mut b: usize, ipdom: &[usize], topo_idx: &[usize]) -> usize {
    while a != b {
        if topo_idx[a] < topo_idx[b] {
            a = ipdom[a];
        } else {
            b = ipdom[b];
        }
    }
    a
}
