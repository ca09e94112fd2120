//! SchedForge - Memory-Aware Operator Scheduling
//!
//! Schedules a static tensor dataflow DAG into a linear op order that
//! minimizes the peak size of the live intermediate working set,
//! optionally under a byte budget. The chosen schedule and its peak are
//! reported against a reverse-post-order baseline and a simulated
//! tensor arena.

pub mod error;
pub mod hier;
pub mod ir;
pub mod loader;
pub mod logging;
pub mod memory;
pub mod sched;

pub use error::{ErrorCategory, SchedForgeError, SchedResult};
pub use hier::{HierGraph, HierNode, HierPass, JoinSequencePass};
pub use ir::{Graph, Op, OpId, Value, ValueId, ValueKind, VertexId};
pub use memory::{arena_size, ArenaSim};
pub use sched::{
    compute_lifetime, estimate_peak, hierarchical_schedule, overlap_input, reverse_post_order,
    BudgetFallback, Lifetime, LifetimeStat, MemStateSeq, ScheduleConfig, ScheduleReport,
    TIME_INPUT, TIME_UNKNOWN,
};
