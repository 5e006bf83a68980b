//! SwarmChat CLI Configuration Management
//!
//! Configuration is layered with figment, highest priority first:
//! command line overrides, `SWARMCHAT_*` environment variables (sections
//! separated by `__`, e.g. `SWARMCHAT_SWARM__TOPIC`), the config file, and
//! built-in defaults. The config file is the `--config` path if given,
//! otherwise `swarmchat.toml` in the working directory, otherwise
//! `<config dir>/swarmchat/config.toml`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use swarmchat_core::DiscoveryPolicy;
use swarmchat_swarm::{Identity, SwarmConfig, Topic};

use crate::cli::Cli;

const ENV_PREFIX: &str = "SWARMCHAT_";
const LOCAL_CONFIG_FILE: &str = "swarmchat.toml";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the SwarmChat CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub swarm: SwarmSection,
    pub discovery: DiscoveryConfig,
    pub cli: CliConfig,
}

/// Who we are on the topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Name put in the `from` field of our messages
    pub display_name: String,
    /// Hex ed25519 secret; a fresh key is generated when absent
    pub secret_key: Option<String>,
}

/// Topic and transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmSection {
    pub topic: String,
    pub listen_addr: String,
    pub bootstrap_peers: Vec<String>,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub dial_attempts: u32,
    pub dial_retry_delay_ms: u64,
    pub max_frame_length: usize,
}

/// Startup wait for the first peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub attempts: u32,
    pub interval_secs: u64,
}

/// Interactive interface options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub prompt: String,
    /// Entries shown by `/history`
    pub max_history_display: usize,
    pub verbose: bool,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            display_name: "anonymous".to_string(),
            secret_key: None,
        }
    }
}

impl Default for SwarmSection {
    fn default() -> Self {
        let transport = SwarmConfig::default();
        Self {
            topic: "swarmchat-lobby".to_string(),
            listen_addr: transport.listen_addr.to_string(),
            bootstrap_peers: Vec::new(),
            connect_timeout_ms: transport.connect_timeout_ms,
            handshake_timeout_ms: transport.handshake_timeout_ms,
            dial_attempts: transport.dial_attempts,
            dial_retry_delay_ms: transport.dial_retry_delay_ms,
            max_frame_length: transport.max_frame_length,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let policy = DiscoveryPolicy::default();
        Self {
            attempts: policy.attempts,
            interval_secs: policy.interval.as_secs(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            max_history_display: 10,
            verbose: false,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate the configuration for this invocation
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let config_file = Self::resolve_config_file(cli.config.as_deref())?;
        Self::from_figment(Self::figment(config_file.as_deref(), cli))
    }

    /// Layered figment for the given config file and command line
    pub fn figment(config_file: Option<&Path>, cli: &Cli) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(topic) = &cli.topic {
            figment = figment.merge(("swarm.topic", topic));
        }
        if let Some(name) = &cli.name {
            figment = figment.merge(("identity.display_name", name));
        }
        if let Some(listen) = &cli.listen {
            figment = figment.merge(("swarm.listen_addr", listen.to_string()));
        }
        if !cli.peers.is_empty() {
            let peers: Vec<String> = cli.peers.iter().map(ToString::to_string).collect();
            figment = figment.merge(("swarm.bootstrap_peers", peers));
        }
        if cli.verbose {
            figment = figment.merge(("cli.verbose", true));
        }

        figment
    }

    /// Extract and validate a configuration from a prepared figment
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(|e| {
            let from_env = e
                .metadata
                .as_ref()
                .is_some_and(|metadata| metadata.name.contains("environment"));
            if from_env {
                ConfigError::Environment(e.to_string())
            } else {
                ConfigError::Loading(e.to_string())
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Pick the config file: explicit path, local file, then user config dir
    fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::Loading(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Ok(Some(local));
        }

        Ok(Self::default_config_path().filter(|path| path.is_file()))
    }

    /// `<config dir>/swarmchat/config.toml`, if the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("swarmchat").join("config.toml"))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.display_name.trim().is_empty() {
            return Err(ConfigError::Validation("Display name must not be empty".to_string()));
        }
        if let Some(secret) = &self.identity.secret_key {
            Identity::from_secret_hex(secret)
                .map_err(|e| ConfigError::Validation(format!("Invalid secret key: {}", e)))?;
        }

        if self.swarm.topic.trim().is_empty() {
            return Err(ConfigError::Validation("Topic must not be empty".to_string()));
        }
        if self.swarm.max_frame_length == 0 {
            return Err(ConfigError::Validation(
                "Max frame length must be greater than 0".to_string(),
            ));
        }
        self.listen_addr()?;
        self.bootstrap_peers()?;

        if self.discovery.attempts == 0 {
            return Err(ConfigError::Validation(
                "Discovery attempts must be greater than 0".to_string(),
            ));
        }
        if self.discovery.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Discovery interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Derived Settings
    // ------------------------------------------------------------------------

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&self.swarm.listen_addr, "listen address")
    }

    pub fn bootstrap_peers(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.swarm
            .bootstrap_peers
            .iter()
            .map(|peer| parse_addr(peer, "bootstrap peer"))
            .collect()
    }

    pub fn topic(&self) -> Topic {
        Topic::new(self.swarm.topic.trim())
    }

    /// Transport settings for [`swarmchat_swarm::Swarm::join`]
    pub fn swarm_config(&self) -> Result<SwarmConfig, ConfigError> {
        Ok(SwarmConfig {
            listen_addr: self.listen_addr()?,
            bootstrap_peers: self.bootstrap_peers()?,
            connect_timeout_ms: self.swarm.connect_timeout_ms,
            handshake_timeout_ms: self.swarm.handshake_timeout_ms,
            dial_attempts: self.swarm.dial_attempts,
            dial_retry_delay_ms: self.swarm.dial_retry_delay_ms,
            max_frame_length: self.swarm.max_frame_length,
        })
    }

    pub fn discovery_policy(&self) -> DiscoveryPolicy {
        DiscoveryPolicy {
            attempts: self.discovery.attempts,
            interval: Duration::from_secs(self.discovery.interval_secs),
        }
    }

    /// The configured identity, or a freshly generated one
    pub fn identity(&self) -> Result<Identity, ConfigError> {
        match &self.identity.secret_key {
            Some(secret) => Identity::from_secret_hex(secret)
                .map_err(|e| ConfigError::Validation(format!("Invalid secret key: {}", e))),
            None => Ok(Identity::generate()),
        }
    }

    /// Example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

fn parse_addr(value: &str, what: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid {}: '{}'", what, value)))
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use figment::Jail;

    fn no_args() -> Cli {
        Cli::parse_from(["swarmchat"])
    }

    #[test]
    fn test_default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.identity.display_name, "anonymous");
        assert_eq!(config.swarm.topic, "swarmchat-lobby");
        assert_eq!(config.swarm.max_frame_length, 65_536);
        assert_eq!(config.discovery.attempts, 6);
        assert_eq!(config.discovery.interval_secs, 5);
        assert_eq!(config.cli.prompt, "> ");
        assert_eq!(config.cli.max_history_display, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();

        let mut invalid = config.clone();
        invalid.identity.display_name = "   ".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.swarm.topic = String::new();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.discovery.attempts = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.discovery.interval_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.swarm.max_frame_length = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.identity.secret_key = Some("not-hex".to_string());
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.swarm.listen_addr = "localhost".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.swarm.bootstrap_peers = vec!["127.0.0.1".to_string()];
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_layering_priority() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [identity]
                display_name = "from-file"

                [swarm]
                topic = "file-topic"
                dial_attempts = 7
                "#,
            )?;
            jail.set_env("SWARMCHAT_SWARM__TOPIC", "env-topic");
            jail.set_env("SWARMCHAT_CLI__PROMPT", "chat>");

            let cli = Cli::parse_from(["swarmchat", "--name", "from-cli"]);
            let config =
                AppConfig::from_figment(AppConfig::figment(Some(Path::new("custom.toml")), &cli))
                    .map_err(|e| e.to_string())?;

            assert_eq!(config.identity.display_name, "from-cli");
            assert_eq!(config.swarm.topic, "env-topic");
            assert_eq!(config.swarm.dial_attempts, 7);
            assert_eq!(config.cli.prompt, "chat>");
            assert_eq!(config.discovery.attempts, 6);
            Ok(())
        });
    }

    #[test]
    fn test_cli_peers_and_listen_override() {
        let cli = Cli::parse_from([
            "swarmchat",
            "--listen",
            "127.0.0.1:7000",
            "--peer",
            "127.0.0.1:7001",
            "--verbose",
        ]);
        let config = AppConfig::from_figment(AppConfig::figment(None, &cli)).unwrap();

        let swarm = config.swarm_config().unwrap();
        assert_eq!(swarm.listen_addr, "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(swarm.bootstrap_peers, vec!["127.0.0.1:7001".parse::<SocketAddr>().unwrap()]);
        assert!(config.cli.verbose);
    }

    #[test]
    fn test_bad_file_value_is_a_loading_error() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[discovery]\nattempts = \"many\"\n")?;
            let result = AppConfig::from_figment(AppConfig::figment(Some(Path::new("bad.toml")), &no_args()));
            assert!(matches!(result, Err(ConfigError::Loading(_))));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let result = AppConfig::resolve_config_file(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::Loading(_))));
    }

    #[test]
    fn test_identity_from_secret_is_stable() {
        let secret = Identity::generate().secret_hex();
        let mut config = AppConfig::default();
        config.identity.secret_key = Some(secret);

        let first = config.identity().unwrap();
        let second = config.identity().unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn test_discovery_policy_conversion() {
        let mut config = AppConfig::default();
        config.discovery.attempts = 2;
        config.discovery.interval_secs = 3;
        assert_eq!(
            config.discovery_policy(),
            DiscoveryPolicy {
                attempts: 2,
                interval: Duration::from_secs(3),
            }
        );
    }

    #[test]
    fn test_example_config_generation() {
        let example = AppConfig::example_config();
        assert!(example.contains("[identity]"));
        assert!(example.contains("[swarm]"));
        assert!(example.contains("[discovery]"));
        assert!(example.contains("[cli]"));

        let parsed: AppConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }
}
