//! Command-line interface definitions and parsing

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about = "Chat with peers that join the same topic", long_about = None)]
pub struct Cli {
    /// Topic to join
    #[arg(short, long)]
    pub topic: Option<String>,

    /// Your display name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Address to listen on
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Bootstrap peer to dial (repeatable)
    #[arg(short, long = "peer", value_name = "ADDR")]
    pub peers: Vec<SocketAddr>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_repeatable_peers() {
        let cli = Cli::parse_from([
            "swarmchat",
            "--topic",
            "lobby",
            "--peer",
            "127.0.0.1:4000",
            "--peer",
            "127.0.0.1:4001",
            "-v",
        ]);

        assert_eq!(cli.topic.as_deref(), Some("lobby"));
        assert_eq!(cli.peers.len(), 2);
        assert!(cli.verbose);
        assert!(cli.name.is_none());
        assert!(!cli.print_config);
    }

    #[test]
    fn test_print_config_flag() {
        let cli = Cli::parse_from(["swarmchat", "--print-config"]);
        assert!(cli.print_config);
    }

    #[test]
    fn test_rejects_bad_listen_address() {
        assert!(Cli::try_parse_from(["swarmchat", "--listen", "not-an-addr"]).is_err());
    }

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
