//! Reverse post-order baseline and the hierarchical memory-aware
//! scheduler.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{internal_err, SchedResult};
use crate::hier::{unit_edges, HierGraph, HierId, HierNode, HierPass, JoinSequencePass};
use crate::ir::{Graph, OpId};
use crate::sched::life::{estimate_peak, MemSim};
use crate::sched::ScheduleConfig;

/// A group whose search could not stay under the budget and degraded to
/// reverse post-order.
#[derive(Debug, Clone)]
pub struct BudgetFallback {
    /// Name of the group's earliest op in reverse post-order.
    pub anchor: String,
    /// Peak of the fallback schedule for the group.
    pub peak: u64,
    /// Budget that was in force.
    pub budget: u64,
}

/// Result of a scheduling run.
#[derive(Debug, Clone)]
pub struct ScheduleReport {
    /// Total op order; a topological extension of the non-param op DAG.
    pub order: Vec<OpId>,
    /// Estimated peak live bytes under `order`.
    pub peak: u64,
    /// Groups that degraded to reverse post-order under the budget.
    pub fallbacks: Vec<BudgetFallback>,
}

impl ScheduleReport {
    pub fn op_names<'g>(&self, graph: &'g Graph) -> Vec<&'g str> {
        self.order.iter().map(|&o| graph.op(o).name.as_str()).collect()
    }
}

/// Baseline schedule: reverse post-order over the op DAG.
///
/// DFS starts from zero-predecessor ops in declaration order and walks
/// successors in declaration order, so the result is fully determined by
/// the graph.
pub fn reverse_post_order(graph: &Graph) -> Vec<OpId> {
    let n = graph.ops.len();
    let mut visited = vec![false; n];
    let mut post: Vec<OpId> = Vec::with_capacity(n);

    let dfs = |root: usize, visited: &mut Vec<bool>, post: &mut Vec<OpId>| {
        if visited[root] {
            return;
        }
        visited[root] = true;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(&mut (u, idx)) = stack.last_mut() {
            match graph.ops[u].succ_ops().nth(idx) {
                Some(s) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.1 += 1;
                    }
                    if !visited[s.0] {
                        visited[s.0] = true;
                        stack.push((s.0, 0));
                    }
                }
                None => {
                    post.push(OpId(u));
                    stack.pop();
                }
            }
        }
    };

    for root in 0..n {
        if graph.ops[root].pred_ops().next().is_none() {
            dfs(root, &mut visited, &mut post);
        }
    }
    // unreachable on a valid DAG; keeps the result a permutation anyway
    for root in 0..n {
        dfs(root, &mut visited, &mut post);
    }

    post.reverse();
    post
}

/// Schedule the graph, minimizing peak live memory within the budget.
///
/// Builds the hierarchical graph, rewrites it with [`JoinSequencePass`],
/// then schedules depth-first: sequences concatenate their children,
/// groups run a best-first search over topological extensions of their
/// internal unit DAG. Deterministic for a fixed `(graph, config)`.
pub fn hierarchical_schedule(
    graph: &Graph,
    config: &ScheduleConfig,
) -> SchedResult<ScheduleReport> {
    graph.validate()?;

    let mut hier = HierGraph::from_graph(graph);
    JoinSequencePass.run(&mut hier, graph);

    let rpo = reverse_post_order(graph);
    let mut rpo_idx = vec![0usize; graph.ops.len()];
    for (i, op) in rpo.iter().enumerate() {
        rpo_idx[op.0] = i;
    }

    let ctx = SchedCtx {
        graph,
        hier: &hier,
        config,
        rpo_idx,
    };
    let (order, fallbacks) = ctx.schedule_unit(hier.root)?;
    if order.len() != graph.ops.len() {
        return Err(internal_err(format!(
            "schedule covers {} of {} ops",
            order.len(),
            graph.ops.len()
        )));
    }

    let peak = estimate_peak(&order, graph, config);
    debug!(ops = order.len(), peak, "hierarchical schedule complete");
    Ok(ScheduleReport {
        order,
        peak,
        fallbacks,
    })
}

struct SchedCtx<'g> {
    graph: &'g Graph,
    hier: &'g HierGraph,
    config: &'g ScheduleConfig,
    /// Position of each op in reverse post-order; the search tie-break.
    rpo_idx: Vec<usize>,
}

type UnitSchedule = (Vec<OpId>, Vec<BudgetFallback>);

impl SchedCtx<'_> {
    fn schedule_unit(&self, unit: HierId) -> SchedResult<UnitSchedule> {
        match self.hier.node(unit) {
            HierNode::Input { .. } | HierNode::Output { .. } => Ok((Vec::new(), Vec::new())),
            HierNode::Op { op } => Ok((vec![*op], Vec::new())),
            HierNode::Sequence { children } => {
                let mut order = Vec::new();
                let mut fallbacks = Vec::new();
                for &child in children {
                    let (ops, fb) = self.schedule_unit(child)?;
                    order.extend(ops);
                    fallbacks.extend(fb);
                }
                Ok((order, fallbacks))
            }
            HierNode::Group { children } => self.schedule_group(children),
        }
    }

    fn schedule_group(&self, children: &[HierId]) -> SchedResult<UnitSchedule> {
        let units: Vec<HierId> = children
            .iter()
            .copied()
            .filter(|&c| !self.hier.flat_ops(c).is_empty())
            .collect();
        if units.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        // Children are independent; schedule them up front, in parallel.
        // The order-preserving collect keeps the result deterministic.
        let results: Vec<SchedResult<UnitSchedule>> = units
            .par_iter()
            .map(|&u| self.schedule_unit(u))
            .collect();
        let mut child_ops: Vec<Vec<OpId>> = Vec::with_capacity(units.len());
        let mut fallbacks = Vec::new();
        for result in results {
            let (ops, fb) = result?;
            child_ops.push(ops);
            fallbacks.extend(fb);
        }

        if units.len() == 1 {
            return Ok((child_ops.pop().expect("one unit"), fallbacks));
        }

        let (preds, succs) = unit_edges(self.graph, &self.hier.nodes, &units);
        let scope: Vec<OpId> = child_ops.iter().flatten().copied().collect();

        match self.best_first(&child_ops, &preds, &succs, &scope)? {
            Some(order) => Ok((order, fallbacks)),
            None => {
                // budget exhausted every candidate; degrade to RPO
                let order = self.rpo_fallback(&child_ops, &preds, &succs);
                let mut sim = MemSim::new(self.graph, &scope, false);
                for &op in &order {
                    sim.step(self.graph, self.config, op);
                }
                let anchor = scope
                    .iter()
                    .copied()
                    .min_by_key(|o| self.rpo_idx[o.0])
                    .map(|o| self.graph.op(o).name.clone())
                    .unwrap_or_default();
                warn!(
                    anchor = %anchor,
                    peak = sim.peak(),
                    budget = self.config.budget,
                    "group peak exceeds budget, falling back to reverse post-order"
                );
                fallbacks.push(BudgetFallback {
                    anchor,
                    peak: sim.peak(),
                    budget: self.config.budget,
                });
                Ok((order, fallbacks))
            }
        }
    }

    /// Best-first search over topological extensions of the unit DAG.
    ///
    /// Partial schedules are ranked by `(peak so far, reverse-post-order
    /// positions of the chosen units, lexicographically)`, so equal-peak
    /// candidates resolve toward the RPO baseline and the result is fully
    /// determined by the graph. A scheduled set reached again at a
    /// strictly higher peak is dominated and dropped. Returns None when
    /// the budget pruned the entire frontier.
    fn best_first(
        &self,
        child_ops: &[Vec<OpId>],
        preds: &[Vec<usize>],
        _succs: &[Vec<usize>],
        scope: &[OpId],
    ) -> SchedResult<Option<Vec<OpId>>> {
        let k = child_ops.len();

        let base = SearchState {
            scheduled: BitSet::new(k),
            order: Vec::new(),
            rpo_path: Vec::new(),
            sim: MemSim::new(self.graph, scope, false),
        };
        let base_peak = base.sim.peak();

        let mut states = vec![base];
        let mut heap: BinaryHeap<Reverse<(u64, Vec<usize>, usize)>> = BinaryHeap::new();
        heap.push(Reverse((base_peak, Vec::new(), 0)));
        // One canonical route per scheduled set: dominated on
        // (peak, rpo path). Any completion of a dominated state is open
        // to its dominator at no higher peak and no later tie-break.
        let mut best: HashMap<BitSet, (u64, Vec<usize>)> = HashMap::new();
        best.insert(states[0].scheduled.clone(), (base_peak, Vec::new()));

        let mut pruned = false;

        while let Some(Reverse((peak, path, si))) = heap.pop() {
            if states[si].order.len() == k {
                let mut order = Vec::with_capacity(scope.len());
                for &c in &states[si].order {
                    order.extend(child_ops[c].iter().copied());
                }
                return Ok(Some(order));
            }
            if best
                .get(&states[si].scheduled)
                .is_some_and(|known| *known != (peak, path.clone()))
            {
                continue; // a better route to this set superseded this entry
            }

            for c in 0..k {
                if states[si].scheduled.get(c) {
                    continue;
                }
                if preds[c].iter().any(|&p| !states[si].scheduled.get(p)) {
                    continue;
                }
                let mut next = states[si].clone();
                next.scheduled.set(c);
                next.order.push(c);
                next.rpo_path.push(self.rpo_idx[child_ops[c][0].0]);
                for &op in &child_ops[c] {
                    next.sim.step(self.graph, self.config, op);
                }
                let np = next.sim.peak();
                if np > self.config.budget {
                    pruned = true;
                    continue;
                }
                let candidate = (np, next.rpo_path.clone());
                if best
                    .get(&next.scheduled)
                    .is_some_and(|known| *known <= candidate)
                {
                    continue;
                }
                best.insert(next.scheduled.clone(), candidate.clone());
                states.push(next);
                heap.push(Reverse((candidate.0, candidate.1, states.len() - 1)));
            }
        }

        if pruned {
            Ok(None)
        } else {
            Err(internal_err(
                "group search exhausted without reaching a complete schedule",
            ))
        }
    }

    /// Topological order of the units preferring the earliest reverse-
    /// post-order op among the ready ones.
    fn rpo_fallback(
        &self,
        child_ops: &[Vec<OpId>],
        preds: &[Vec<usize>],
        succs: &[Vec<usize>],
    ) -> Vec<OpId> {
        let k = child_ops.len();
        let mut indegree: Vec<usize> = preds.iter().map(|p| p.len()).collect();
        let mut done = vec![false; k];
        let mut order = Vec::new();
        for _ in 0..k {
            let next = (0..k)
                .filter(|&c| !done[c] && indegree[c] == 0)
                .min_by_key(|&c| self.rpo_idx[child_ops[c][0].0])
                .expect("unit DAG is acyclic");
            done[next] = true;
            order.extend(child_ops[next].iter().copied());
            for &s in &succs[next] {
                indegree[s] -= 1;
            }
        }
        order
    }
}

#[derive(Clone)]
struct SearchState {
    scheduled: BitSet,
    /// Chosen unit indices so far.
    order: Vec<usize>,
    /// RPO positions of the chosen units' first ops; the heap tie-break.
    rpo_path: Vec<usize>,
    sim: MemSim,
}

/// Fixed-capacity bit set used as the dominance key of the search.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
        }
    }

    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    fn get(&self, i: usize) -> bool {
        self.words[i / 64] & (1 << (i % 64)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::ScheduleConfig;

    fn diamond_graph() -> Graph {
        let mut g = Graph::new("diamond");
        let vin = g.add_input("in", 0);
        let va = g.add_result("a", 10);
        let vb = g.add_result("b", 20);
        let vc = g.add_result("c", 30);
        let vd = g.add_result("d", 10);
        g.add_op("a", "unknown", vec![vin], vec![va]).unwrap();
        g.add_op("b", "unknown", vec![va], vec![vb]).unwrap();
        g.add_op("c", "unknown", vec![va], vec![vc]).unwrap();
        g.add_op("d", "unknown", vec![vb, vc], vec![vd]).unwrap();
        g.mark_output(vd);
        g.connect_verts().unwrap();
        g
    }

    fn names(graph: &Graph, order: &[OpId]) -> Vec<String> {
        order.iter().map(|&o| graph.op(o).name.clone()).collect()
    }

    #[test]
    fn test_rpo_on_diamond() {
        let g = diamond_graph();
        let rpo = reverse_post_order(&g);
        assert_eq!(names(&g, &rpo), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_rpo_is_topological() {
        let g = diamond_graph();
        let rpo = reverse_post_order(&g);
        let mut seen = vec![false; g.ops.len()];
        for &op in &rpo {
            for pred in g.op(op).pred_ops() {
                assert!(seen[pred.0], "predecessor scheduled after its consumer");
            }
            seen[op.0] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_schedule_diamond_prefers_large_sibling_first() {
        let g = diamond_graph();
        let config = ScheduleConfig::default();
        let report = hierarchical_schedule(&g, &config).unwrap();
        assert_eq!(names(&g, &report.order), vec!["a", "c", "b", "d"]);
        assert_eq!(report.peak, 60);
        assert!(report.fallbacks.is_empty());
    }

    #[test]
    fn test_bitset() {
        let mut set = BitSet::new(130);
        assert!(!set.get(0));
        assert!(!set.get(129));
        set.set(0);
        set.set(64);
        set.set(129);
        assert!(set.get(0));
        assert!(set.get(64));
        assert!(set.get(129));
        assert!(!set.get(1));

        let mut other = BitSet::new(130);
        other.set(0);
        other.set(64);
        assert_ne!(set, other);
        other.set(129);
        assert_eq!(set, other);
    }
}
