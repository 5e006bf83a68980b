//! SwarmChat CLI library
//!
//! Argument parsing, layered configuration, interactive commands and the
//! application event loop for the `swarmchat` binary.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::SwarmchatApp;
pub use cli::Cli;
pub use commands::{Command, CommandDispatcher, DisplayContext, Flow};
pub use config::{AppConfig, ConfigError};
pub use error::{CliError, Result};
