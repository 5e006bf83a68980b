//! SwarmChat application
//!
//! Owns the chat node and the swarm, and runs the single event loop that
//! serialises transport events, input lines and Ctrl-C. Shutdown is one
//! idempotent sequence: cancel the discovery wait, close every session, then
//! destroy the swarm. A panic while handling an event, a command or the
//! discovery wait stops the loop and runs the same sequence.

use std::any::Any;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use swarmchat_core::{wait_for_peers, ChatNode, DiscoveryOutcome, NodeIdentity, TransportEvent};
use swarmchat_swarm::{Swarm, SwarmEvents};

use crate::commands::{CommandDispatcher, DisplayContext, Flow};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Lines of local input; the channel closing means end of input
pub type InputLines = mpsc::UnboundedReceiver<String>;

/// Read stdin on a dedicated thread so a blocked read never holds up shutdown
pub fn spawn_stdin_reader() -> InputLines {
    let (sender, receiver) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    receiver
}

/// Core SwarmChat application
pub struct SwarmchatApp {
    config: AppConfig,
    node: ChatNode,
    swarm: Swarm,
    events: SwarmEvents,
    context: DisplayContext,
    discovery_cancel: CancellationToken,
    discovery_task: Option<JoinHandle<DiscoveryOutcome>>,
    stopped: bool,
}

impl SwarmchatApp {
    /// Join the configured topic and start waiting for peers
    pub async fn start(config: AppConfig) -> Result<Self> {
        let identity = config.identity()?;
        let topic = config.topic();
        let (swarm, events) = Swarm::join(config.swarm_config()?, &identity, topic.clone()).await?;

        let node = ChatNode::with_system_clock(NodeIdentity {
            display_name: config.identity.display_name.trim().to_string(),
            public_key: identity.public_key(),
        });

        info!(
            name = %node.display_name(),
            identifier = %node.identifier(),
            topic = %topic,
            listen = %swarm.local_addr(),
            "SwarmChat started"
        );

        let discovery_cancel = CancellationToken::new();
        let discovery_task = tokio::spawn(announce_discovery(wait_for_peers(
            node.live_count(),
            discovery_cancel.clone(),
            config.discovery_policy(),
        )));

        let context = DisplayContext {
            topic,
            started_at: Instant::now(),
            max_history_display: config.cli.max_history_display,
        };

        Ok(Self {
            config,
            node,
            swarm,
            events,
            context,
            discovery_cancel,
            discovery_task: Some(discovery_task),
            stopped: false,
        })
    }

    pub fn node(&self) -> &ChatNode {
        &self.node
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.swarm.local_addr()
    }

    /// Watch channel carrying the live session count
    pub fn live_count(&self) -> watch::Receiver<usize> {
        self.node.live_count()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Run the interactive loop on stdin and stdout
    pub async fn run(&mut self) -> Result<()> {
        let input = spawn_stdin_reader();
        let mut stdout = io::stdout();
        self.run_with_input(input, &mut stdout).await
    }

    /// Run the event loop until quit, end of input, Ctrl-C or a failure
    ///
    /// Always finishes with the shutdown sequence.
    pub async fn run_with_input<W: Write>(&mut self, mut input: InputLines, out: &mut W) -> Result<()> {
        let result = self.event_loop(&mut input, out).await;
        if let Err(e) = &result {
            error!("Stopping after error: {}", e);
        }
        self.shutdown().await;
        result
    }

    async fn event_loop<W: Write>(&mut self, input: &mut InputLines, out: &mut W) -> Result<()> {
        self.prompt(out)?;

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event)?,
                    None => {
                        warn!("Swarm event channel closed");
                        return Ok(());
                    }
                },
                line = input.recv() => match line {
                    Some(line) => {
                        let (node, context) = (&self.node, &self.context);
                        let flow = guarded("Command", || {
                            CommandDispatcher::dispatch(&line, node, context, &mut *out)
                        })??;
                        if flow == Flow::Quit {
                            return Ok(());
                        }
                        self.prompt(out)?;
                    }
                    None => {
                        info!("End of input");
                        return Ok(());
                    }
                },
                joined = join_discovery(&mut self.discovery_task) => {
                    self.discovery_task = None;
                    if let Err(e) = joined {
                        if e.is_panic() {
                            let reason = panic_reason(&*e.into_panic());
                            error!("Peer discovery panicked: {}", reason);
                            return Err(CliError::EventPanic(reason));
                        }
                        warn!("Peer discovery task failed: {}", e);
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    return Ok(());
                }
            }
        }
    }

    /// Feed one transport event to the node
    fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        let node = &mut self.node;
        guarded("Event handling", || node.handle_event(event))
    }

    fn prompt<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self.config.cli.prompt)?;
        out.flush()
    }

    /// Cancel discovery, close all sessions and destroy the swarm
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("Shutting down");

        self.discovery_cancel.cancel();
        if let Some(task) = self.discovery_task.take() {
            if let Err(e) = task.await {
                error!("Discovery task failed: {}", e);
            }
        }

        let closed = self.node.shutdown();
        debug!(closed, "Closed peer sessions");

        self.swarm.destroy().await;
        info!("SwarmChat stopped");
    }
}

/// Run `f`, turning a panic into [`CliError::EventPanic`] so the caller
/// still reaches the shutdown sequence
fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let reason = panic_reason(&*payload);
        error!("{} panicked: {}", what, reason);
        CliError::EventPanic(reason)
    })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Resolves when the discovery task finishes; pending once it has been taken
async fn join_discovery(
    task: &mut Option<JoinHandle<DiscoveryOutcome>>,
) -> std::result::Result<DiscoveryOutcome, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn announce_discovery(
    wait: impl std::future::Future<Output = DiscoveryOutcome>,
) -> DiscoveryOutcome {
    let outcome = wait.await;
    match outcome {
        DiscoveryOutcome::PeersFound(count) => info!("Found {} peer(s)", count),
        DiscoveryOutcome::Exhausted => info!("No peers yet, still listening"),
        DiscoveryOutcome::Cancelled => debug!("Peer discovery cancelled"),
    }
    outcome
}
