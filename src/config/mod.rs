// src/config/mod.rs

//! Pipeline description loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a description from disk, or fall back to the built-in pipeline
//!   (`loader.rs`).
//! - Validate basic invariants like stage naming and argument encoding
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{PipelineConfig, PipelineSection, StageConfig};
pub use validate::validate_config;
