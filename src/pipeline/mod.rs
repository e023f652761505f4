// src/pipeline/mod.rs

//! Pipeline shape as data.
//!
//! - [`stage`] describes a single stage: its role, argv and how its
//!   stdin/stdout are bound.
//! - [`topology`] holds the arena of stages plus index-based pipe links and
//!   builds it from a [`PipelineConfig`](crate::config::PipelineConfig).

pub mod stage;
pub mod topology;

pub use stage::{PipeIndex, StageIndex, StageInput, StageOutput, StageRole, StageSpec};
pub use topology::{Link, Topology};
