// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("invalid argument for stage '{stage}': {reason}")]
    InvalidArgument { stage: String, reason: String },

    /// Allocating one of the inter-stage pipes failed. No child has been
    /// spawned when this is returned.
    #[error("failed to create pipe {index} ({link}): {source}")]
    PipeCreation {
        index: usize,
        link: String,
        #[source]
        source: nix::Error,
    },

    /// The OS refused to create the process for a stage. Later stages were
    /// not attempted.
    #[error("failed to spawn stage '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: nix::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TrainerError>;
