//! Tensor arena simulation for the post-schedule report
//!
//! The scheduler's own cost oracle is the transient/stable memory state
//! simulation; the arena here only answers "how large would a real
//! backing buffer have to be" for the chosen schedule. It mirrors the
//! first-fit, 64-byte-aligned arena allocators used by inference
//! runtimes: each value occupies `[gen, kill - 1]` of the schedule and
//! two values may share an offset range when their lifetimes are
//! disjoint.

pub mod arena;

pub use arena::{arena_size, ArenaSim};
