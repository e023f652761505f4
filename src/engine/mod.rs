// src/engine/mod.rs

//! Orchestration engine for trainer.
//!
//! This module ties together:
//! - the events produced by reapers ([`events`])
//! - the orchestrator that allocates pipes, spawns every stage, closes its
//!   own pipe copies and drains the reap events ([`orchestrator`])

pub mod events;
pub mod orchestrator;

pub use events::{PipelineEvent, RunReport, SpawnedChild, StageExit, Termination};
pub use orchestrator::{Orchestrator, OrchestratorState};
