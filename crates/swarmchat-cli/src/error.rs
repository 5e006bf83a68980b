//! Error handling for the SwarmChat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Swarm error: {0}")]
    Swarm(#[from] swarmchat_swarm::SwarmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event loop panicked: {0}")]
    EventPanic(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
