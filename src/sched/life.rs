//! Value lifetimes and peak memory estimation.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::ir::{Graph, OpId, ValueId};
use crate::sched::mem::MemStateSeq;
use crate::sched::ScheduleConfig;

/// Input time, before any computation has been done.
pub const TIME_INPUT: i64 = -1;
/// Unknown time: the value outlives the analyzed sequence.
pub const TIME_UNKNOWN: i64 = i64::MAX;

/// Lifetime descriptor of a value during computation.
///
/// The lifetime is the half-open interval `[gen, kill)` of op indices in
/// the analyzed sequence.
#[derive(Debug, Clone)]
pub struct Lifetime {
    /// Value this block describes.
    pub value: ValueId,
    /// Byte size of the value.
    pub size: u64,
    pub gen: i64,
    pub kill: i64,
}

impl Lifetime {
    pub fn length(&self) -> i64 {
        self.kill.saturating_sub(self.gen)
    }
}

pub fn cmp_by_gen_kill(lhs: &Lifetime, rhs: &Lifetime) -> Ordering {
    (lhs.gen, lhs.kill).cmp(&(rhs.gen, rhs.kill))
}

pub fn cmp_by_length(lhs: &Lifetime, rhs: &Lifetime) -> Ordering {
    lhs.length()
        .cmp(&rhs.length())
        .then_with(|| cmp_by_gen_kill(lhs, rhs))
}

/// Lifetime statistics of the values touched by an op sequence.
#[derive(Debug, Clone)]
pub struct LifetimeStat {
    /// Analyzed window, in op indices.
    pub begin: i64,
    pub end: i64,
    /// One block per non-param value, in value declaration order.
    pub blocks: Vec<Lifetime>,
}

impl LifetimeStat {
    /// Memory usage per op index over `[begin, end)`.
    pub fn histogram(&self) -> Vec<u64> {
        let len = (self.end - self.begin).max(0) as usize;
        let mut hist = vec![0u64; len];
        for block in &self.blocks {
            let lo = block.gen.max(self.begin);
            let hi = block.kill.min(self.end);
            for t in lo..hi {
                hist[(t - self.begin) as usize] += block.size;
            }
        }
        hist
    }

    /// Peak memory usage over the analyzed window.
    pub fn peak(&self) -> u64 {
        self.histogram().into_iter().max().unwrap_or(0)
    }
}

/// Compute lifetime statistics for an op sequence.
///
/// The sequence may be a subset of the graph's ops. Covered values are
/// the graph inputs plus every Result defined or consumed inside the
/// sequence; params never appear. A value escaping the window (a graph
/// output, or one with consumers outside the sequence) gets
/// `kill = TIME_UNKNOWN`; a value defined outside it gets
/// `gen = TIME_INPUT`.
pub fn compute_lifetime(op_seq: &[OpId], graph: &Graph) -> LifetimeStat {
    let mut pos: Vec<Option<i64>> = vec![None; graph.ops.len()];
    for (i, op) in op_seq.iter().enumerate() {
        pos[op.0] = Some(i as i64);
    }
    let is_graph_output: HashSet<usize> = graph.outputs.iter().map(|o| o.value.0).collect();

    let mut blocks = Vec::new();
    for val in &graph.values {
        if val.is_param() {
            continue;
        }
        let def_pos = val.def.and_then(|d| pos[d.0]);
        let used_inside = val.uses.iter().any(|u| pos[u.0].is_some());
        if val.is_result() && def_pos.is_none() && !used_inside {
            continue;
        }

        let gen = def_pos.unwrap_or(TIME_INPUT);
        let last_use = val.uses.iter().filter_map(|u| pos[u.0]).max();
        let used_outside = val.uses.iter().any(|u| pos[u.0].is_none());
        let kill = if is_graph_output.contains(&val.id.0) || used_outside {
            TIME_UNKNOWN
        } else {
            match last_use {
                Some(p) => p + 1,
                None => gen.saturating_add(1).max(0),
            }
        };
        blocks.push(Lifetime {
            value: val.id,
            size: val.size,
            gen,
            kill,
        });
    }

    let len = op_seq.len() as i64;
    let begin = blocks
        .iter()
        .map(|b| b.gen)
        .min()
        .unwrap_or(0)
        .max(0);
    let end = blocks
        .iter()
        .map(|b| b.kill.min(len))
        .max()
        .unwrap_or(0)
        .max(begin);
    LifetimeStat { begin, end, blocks }
}

/// Index of an input whose storage the op's only output may reuse.
///
/// Eligibility: a single output, a non-param input of identical byte
/// size consumed nowhere else, and an op type the caller declared
/// overlap-safe.
pub fn overlap_input(graph: &Graph, op: OpId, config: &ScheduleConfig) -> Option<usize> {
    let op = graph.op(op);
    if op.outputs.len() != 1 {
        return None;
    }
    if !config.overlap_ops.contains(&op.ty) {
        return None;
    }
    let out_size = graph.value(op.outputs[0]).size;
    op.inputs.iter().position(|&vid| {
        let val = graph.value(vid);
        !val.is_param() && val.size == out_size && val.uses.len() == 1 && val.uses[0] == op.id
    })
}

/// Incremental memory simulation over a fixed op scope.
///
/// Values defined outside the scope but consumed inside it are resident
/// from the start; values with consumers outside the scope (or exported
/// as graph outputs) never die inside it.
#[derive(Debug, Clone)]
pub(crate) struct MemSim {
    seq: MemStateSeq,
    remaining: HashMap<ValueId, u32>,
    peak: u64,
}

impl MemSim {
    /// `scope` is the set of ops that will be stepped through.
    /// `seed_all_inputs` makes every graph input resident up front, even
    /// unconsumed ones; group-local simulations pass false and seed only
    /// what the group actually reads.
    pub fn new(graph: &Graph, scope: &[OpId], seed_all_inputs: bool) -> Self {
        let mut in_scope = vec![false; graph.ops.len()];
        for &o in scope {
            in_scope[o.0] = true;
        }
        let is_graph_output: HashSet<usize> = graph.outputs.iter().map(|o| o.value.0).collect();

        let mut remaining = HashMap::new();
        let mut baseline: u64 = 0;
        for val in &graph.values {
            if val.is_param() {
                continue;
            }
            let uses_in = val.uses.iter().filter(|u| in_scope[u.0]).count() as u32;
            let uses_out = val.uses.len() as u32 - uses_in;
            let escapes = uses_out > 0 || is_graph_output.contains(&val.id.0);
            let def_in = val.def.map_or(false, |d| in_scope[d.0]);
            if def_in || uses_in > 0 || (seed_all_inputs && val.is_input()) {
                remaining.insert(val.id, uses_in + u32::from(escapes));
                if !def_in {
                    baseline += val.size;
                }
            }
        }

        Self {
            seq: MemStateSeq::with_baseline(baseline as i64),
            remaining,
            peak: baseline,
        }
    }

    /// Execute one op: allocate its outputs, release the values whose
    /// last remaining use it was. An overlap-eligible op folds one
    /// output's allocation into the matching input's release.
    pub fn step(&mut self, graph: &Graph, config: &ScheduleConfig, op_id: OpId) {
        let op = graph.op(op_id);
        let overlap = overlap_input(graph, op_id, config);
        let overlap_in = overlap.map(|i| op.inputs[i]);

        let mut inc: u64 = 0;
        let mut dec: u64 = 0;
        for (oi, &vid) in op.outputs.iter().enumerate() {
            let folded = overlap.is_some() && oi == 0;
            let val = graph.value(vid);
            if !folded {
                inc += val.size;
                // an output nobody reads and nothing exports dies in place
                if self.remaining.get(&vid).copied().unwrap_or(0) == 0 {
                    dec += val.size;
                }
            }
        }
        for &vid in &op.inputs {
            let val = graph.value(vid);
            if val.is_param() {
                continue;
            }
            if let Some(count) = self.remaining.get_mut(&vid) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 && Some(vid) != overlap_in {
                        dec += val.size;
                    }
                }
            }
        }

        self.seq.append(inc, dec);
        let transient = self.seq.transients().last().copied().unwrap_or(0);
        self.peak = self.peak.max(transient.max(0) as u64);
    }

    pub fn peak(&self) -> u64 {
        self.peak
    }
}

/// Estimate the peak live bytes of an op sequence.
///
/// The sequence does not need to contain all ops of the graph; values
/// consumed by ops outside it stay resident through the whole window.
pub fn estimate_peak(op_seq: &[OpId], graph: &Graph, config: &ScheduleConfig) -> u64 {
    let mut sim = MemSim::new(graph, op_seq, true);
    for &op in op_seq {
        sim.step(graph, config, op);
    }
    sim.peak()
}
