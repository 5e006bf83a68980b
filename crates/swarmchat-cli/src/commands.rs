//! Interactive command handling
//!
//! Each input line maps to exactly one [`Command`]; the dispatcher runs it
//! against the [`ChatNode`] and writes any user-facing output. Failed sends
//! are logged, never reported as an interactive error.

use std::io::{self, Write};
use std::time::Instant;

use tracing::{error, warn};

use swarmchat_core::{BroadcastReport, ChatNode, NodeError, TimeSource};
use swarmchat_swarm::Topic;

const HELP_TEXT: &str = "\
Commands:
  /help              Show this help
  /peers             List connected peers
  /ping              Ping every connected peer
  /broadcast <text>  Send text to every connected peer
  /history           Show recent received messages
  /status            Show node status
  /topic             Show the joined topic
  /quit, /exit       Leave the swarm and exit
Any other text is broadcast to connected peers.";

// ----------------------------------------------------------------------------
// Command Parsing
// ----------------------------------------------------------------------------

/// One parsed line of local input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Peers,
    Ping,
    /// Explicit `/broadcast`; the text may be empty
    Broadcast(String),
    History,
    Status,
    Topic,
    Quit,
    /// Plain text, broadcast implicitly
    Say(String),
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Say(line.to_string());
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name {
            "/help" => Command::Help,
            "/peers" => Command::Peers,
            "/ping" => Command::Ping,
            "/broadcast" => Command::Broadcast(rest.to_string()),
            "/history" => Command::History,
            "/status" => Command::Status,
            "/topic" => Command::Topic,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatch
// ----------------------------------------------------------------------------

/// Whether the interactive loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Process-level facts the commands report on
#[derive(Debug, Clone)]
pub struct DisplayContext {
    pub topic: Topic,
    pub started_at: Instant,
    pub max_history_display: usize,
}

/// Command dispatcher for interactive input
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Parse and run one input line
    pub fn dispatch<T: TimeSource, W: Write>(
        line: &str,
        node: &ChatNode<T>,
        context: &DisplayContext,
        out: &mut W,
    ) -> io::Result<Flow> {
        Self::execute(Command::parse(line), node, context, out)
    }

    pub fn execute<T: TimeSource, W: Write>(
        command: Command,
        node: &ChatNode<T>,
        context: &DisplayContext,
        out: &mut W,
    ) -> io::Result<Flow> {
        match command {
            Command::Empty => {}
            Command::Help => writeln!(out, "{}", HELP_TEXT)?,
            Command::Peers => Self::handle_peers(node, out)?,
            Command::Ping => match node.ping_all() {
                Ok(report) => Self::write_report(out, "Pinged", &report)?,
                Err(e) => error!("Ping failed: {}", e),
            },
            Command::Broadcast(text) => Self::handle_broadcast(node, &text, out)?,
            Command::Say(text) => {
                if node.session_count() == 0 {
                    warn!("No peers connected; message not sent");
                    writeln!(out, "No peers connected; message not sent")?;
                } else {
                    Self::handle_broadcast(node, &text, out)?;
                }
            }
            Command::History => Self::handle_history(node, context, out)?,
            Command::Status => Self::handle_status(node, context, out)?,
            Command::Topic => {
                writeln!(out, "Topic: {}", context.topic.name())?;
                writeln!(out, "Digest: {}", context.topic.digest_hex())?;
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(name) => {
                writeln!(out, "Unknown command '{}'. Type /help for a list of commands.", name)?
            }
        }
        Ok(Flow::Continue)
    }

    fn handle_peers<T: TimeSource, W: Write>(node: &ChatNode<T>, out: &mut W) -> io::Result<()> {
        let sessions = node.list_sessions();
        if sessions.is_empty() {
            return writeln!(out, "No peers connected");
        }

        writeln!(out, "Connected peers ({}):", sessions.len())?;
        for session in sessions {
            let remote = session
                .remote_addr
                .map_or_else(|| "-".to_string(), |addr| addr.to_string());
            writeln!(out, "  {} {} {}", session.identifier, session.direction, remote)?;
        }
        Ok(())
    }

    fn handle_broadcast<T: TimeSource, W: Write>(
        node: &ChatNode<T>,
        text: &str,
        out: &mut W,
    ) -> io::Result<()> {
        match node.send_broadcast(text) {
            Ok(report) => Self::write_report(out, "Sent to", &report),
            Err(NodeError::EmptyMessage) => writeln!(out, "Usage: /broadcast <text>"),
            Err(e) => {
                error!("Broadcast failed: {}", e);
                Ok(())
            }
        }
    }

    fn handle_history<T: TimeSource, W: Write>(
        node: &ChatNode<T>,
        context: &DisplayContext,
        out: &mut W,
    ) -> io::Result<()> {
        let entries = node.recent_history(context.max_history_display);
        if entries.is_empty() {
            return writeln!(out, "No messages yet");
        }

        for entry in entries {
            let text = entry
                .message
                .text()
                .map_or_else(|| format!("({})", entry.message.kind()), str::to_string);
            writeln!(out, "[{}] {}: {}", entry.peer, entry.message.from(), text)?;
        }
        Ok(())
    }

    fn handle_status<T: TimeSource, W: Write>(
        node: &ChatNode<T>,
        context: &DisplayContext,
        out: &mut W,
    ) -> io::Result<()> {
        writeln!(out, "Name: {}", node.display_name())?;
        writeln!(out, "Identifier: {}", node.identifier())?;
        writeln!(out, "Topic: {}", context.topic)?;
        writeln!(out, "Sessions: {}", node.session_count())?;
        writeln!(out, "History: {} message(s)", node.history().len())?;
        writeln!(out, "Uptime: {}s", context.started_at.elapsed().as_secs())
    }

    fn write_report<W: Write>(out: &mut W, verb: &str, report: &BroadcastReport) -> io::Result<()> {
        writeln!(
            out,
            "{} {} peer(s), {} failed",
            verb, report.attempted, report.failed
        )?;
        if !report.failed_peers.is_empty() {
            let failed: Vec<String> = report.failed_peers.iter().map(ToString::to_string).collect();
            writeln!(out, "  unreachable: {}", failed.join(", "))?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
