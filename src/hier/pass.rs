//! Passes that rewrite hierarchical graphs to enable memory-aware
//! scheduling.

use crate::hier::{unit_edges, HierGraph, HierId, HierNode};
use crate::ir::Graph;

/// A transformation applied to a hierarchical graph in place.
pub trait HierPass {
    fn run(&self, hier: &mut HierGraph, graph: &Graph);
}

/// Join continuous sequences to form a larger sequence.
///
/// Two rewrites run to fixpoint: a `Sequence` child of a `Sequence` is
/// spliced into its parent, and two `Sequence` children of a `Group`
/// linked by a sole-successor/sole-predecessor edge are merged into one.
/// Larger sequences mean fewer tie-break points for the group search,
/// without changing the space of legal schedules.
#[derive(Debug, Default)]
pub struct JoinSequencePass;

impl HierPass for JoinSequencePass {
    fn run(&self, hier: &mut HierGraph, graph: &Graph) {
        loop {
            let mut changed = inline_nested_sequences(hier);
            changed |= merge_adjacent_sequences(hier, graph);
            if !changed {
                break;
            }
        }
    }
}

/// Splice `Sequence` children of `Sequence` nodes into the parent's
/// child list, one level per call.
fn inline_nested_sequences(hier: &mut HierGraph) -> bool {
    let mut changed = false;
    for i in 0..hier.nodes.len() {
        let HierNode::Sequence { children } = &hier.nodes[i] else {
            continue;
        };
        if !children
            .iter()
            .any(|&c| matches!(hier.nodes[c.0], HierNode::Sequence { .. }))
        {
            continue;
        }
        let old = children.clone();
        let mut new_children = Vec::with_capacity(old.len());
        for c in old {
            match &hier.nodes[c.0] {
                HierNode::Sequence { children: inner } => {
                    new_children.extend(inner.iter().copied());
                }
                _ => new_children.push(c),
            }
        }
        hier.nodes[i] = HierNode::Sequence {
            children: new_children,
        };
        changed = true;
    }
    changed
}

/// Merge chain-adjacent `Sequence` children of each `Group`.
fn merge_adjacent_sequences(hier: &mut HierGraph, graph: &Graph) -> bool {
    let mut changed = false;
    for i in 0..hier.nodes.len() {
        let HierNode::Group { children } = &hier.nodes[i] else {
            continue;
        };
        let units = children.clone();
        let (preds, succs) = unit_edges(graph, &hier.nodes, &units);

        // find one mergeable link per scan; the outer fixpoint loop
        // catches the rest
        let mut link = None;
        for (u, s) in succs.iter().enumerate() {
            let [v] = s.as_slice() else { continue };
            if preds[*v].len() != 1 {
                continue;
            }
            let u_seq = matches!(hier.nodes[units[u].0], HierNode::Sequence { .. });
            let v_seq = matches!(hier.nodes[units[*v].0], HierNode::Sequence { .. });
            if u_seq && v_seq {
                link = Some((u, *v));
                break;
            }
        }
        let Some((u, v)) = link else { continue };

        let HierNode::Sequence { children: tail } = hier.nodes[units[v].0].clone() else {
            unreachable!("link endpoints are sequences");
        };
        let HierNode::Sequence { children: head } = &mut hier.nodes[units[u].0] else {
            unreachable!("link endpoints are sequences");
        };
        head.extend(tail);

        let mut new_children = units.clone();
        new_children.retain(|&c| c != units[v]);
        hier.nodes[i] = HierNode::Group {
            children: new_children,
        };
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hier::flat_ops_of;
    use crate::ir::Graph;

    /// Two op chains around a fork-join region, with a tail chain after
    /// the join so that the builder produces a sequence-of-sequences for
    /// the pass to splice:
    /// in -> p -> q -> fork -> {x1 -> x2, y1 -> y2} -> join -> z1 -> z2
    fn two_arm_graph() -> Graph {
        let mut g = Graph::new("two_arm");
        let vin = g.add_input("in", 0);
        let vp = g.add_result("p", 8);
        let vq = g.add_result("q", 8);
        let vf1 = g.add_result("f1", 8);
        let vf2 = g.add_result("f2", 8);
        let vx1 = g.add_result("x1", 8);
        let vx2 = g.add_result("x2", 8);
        let vy1 = g.add_result("y1", 8);
        let vy2 = g.add_result("y2", 8);
        let vj = g.add_result("j", 8);
        let vz1 = g.add_result("z1", 8);
        let vz2 = g.add_result("z2", 8);
        g.add_op("p", "unknown", vec![vin], vec![vp]).unwrap();
        g.add_op("q", "unknown", vec![vp], vec![vq]).unwrap();
        g.add_op("fork", "unknown", vec![vq], vec![vf1, vf2]).unwrap();
        g.add_op("x1", "unknown", vec![vf1], vec![vx1]).unwrap();
        g.add_op("x2", "unknown", vec![vx1], vec![vx2]).unwrap();
        g.add_op("y1", "unknown", vec![vf2], vec![vy1]).unwrap();
        g.add_op("y2", "unknown", vec![vy1], vec![vy2]).unwrap();
        g.add_op("join", "unknown", vec![vx2, vy2], vec![vj]).unwrap();
        g.add_op("z1", "unknown", vec![vj], vec![vz1]).unwrap();
        g.add_op("z2", "unknown", vec![vz1], vec![vz2]).unwrap();
        g.mark_output(vz2);
        g.connect_verts().unwrap();
        g
    }

    fn tree_signature(hier: &HierGraph, graph: &Graph, id: crate::hier::HierId) -> String {
        match hier.node(id) {
            HierNode::Input { .. } => "in".to_string(),
            HierNode::Output { .. } => "out".to_string(),
            HierNode::Op { op } => graph.op(*op).name.clone(),
            HierNode::Sequence { children } => {
                let inner: Vec<_> = children
                    .iter()
                    .map(|&c| tree_signature(hier, graph, c))
                    .collect();
                format!("seq[{}]", inner.join(","))
            }
            HierNode::Group { children } => {
                let inner: Vec<_> = children
                    .iter()
                    .map(|&c| tree_signature(hier, graph, c))
                    .collect();
                format!("grp[{}]", inner.join(","))
            }
        }
    }

    #[test]
    fn test_join_preserves_leaf_cover() {
        let g = two_arm_graph();
        let mut hier = HierGraph::from_graph(&g);
        JoinSequencePass.run(&mut hier, &g);
        let mut ops = Vec::new();
        flat_ops_of(&hier.nodes, hier.root, &mut ops);
        assert_eq!(ops.len(), g.ops.len());
        let mut sorted = ops.clone();
        sorted.sort_by_key(|o| o.0);
        sorted.dedup();
        assert_eq!(sorted.len(), g.ops.len());
    }

    #[test]
    fn test_join_is_idempotent() {
        let g = two_arm_graph();
        let mut once = HierGraph::from_graph(&g);
        JoinSequencePass.run(&mut once, &g);
        let sig_once = tree_signature(&once, &g, once.root);

        let mut twice = once.clone();
        JoinSequencePass.run(&mut twice, &g);
        let sig_twice = tree_signature(&twice, &g, twice.root);
        assert_eq!(sig_once, sig_twice);
    }

    #[test]
    fn test_no_nested_sequences_after_run() {
        let g = two_arm_graph();
        let mut hier = HierGraph::from_graph(&g);
        JoinSequencePass.run(&mut hier, &g);

        fn check(hier: &HierGraph, id: crate::hier::HierId) {
            if let HierNode::Sequence { children } = hier.node(id) {
                for &c in children {
                    assert!(
                        !matches!(hier.node(c), HierNode::Sequence { .. }),
                        "sequence child of sequence survived the pass"
                    );
                }
            }
            match hier.node(id) {
                HierNode::Sequence { children } | HierNode::Group { children } => {
                    for &c in children {
                        check(hier, c);
                    }
                }
                _ => {}
            }
        }
        check(&hier, hier.root);
    }
}
