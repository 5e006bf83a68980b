//! Topic swarm
//!
//! A [`Swarm`] listens for peers on one TCP address and dials bootstrap
//! peers. Every connection that completes the hello for our topic is
//! reported on the event channel returned by [`Swarm::join`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use swarmchat_core::{Direction, PublicKey, TransportEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::SwarmConfig;
use crate::connection::{self, ConnectionContext};
use crate::error::{Result, SwarmError};
use crate::identity::Identity;
use crate::topic::Topic;

/// Upper bound on waiting for connection tasks during [`Swarm::destroy`]
const DESTROY_TIMEOUT: Duration = Duration::from_secs(2);

/// Receiving half of the swarm's event channel
pub type SwarmEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Handle to a joined topic swarm
pub struct Swarm {
    context: Arc<ConnectionContext>,
    config: SwarmConfig,
    local_addr: SocketAddr,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Swarm {
    /// Bind the listener, start accepting, and dial the configured bootstrap peers
    pub async fn join(
        config: SwarmConfig,
        identity: &Identity,
        topic: Topic,
    ) -> Result<(Self, SwarmEvents)> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| SwarmError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (events, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let context = Arc::new(ConnectionContext::new(
            topic,
            identity.public_key(),
            events,
            shutdown.clone(),
            config.handshake_timeout(),
            config.max_frame_length,
        ));

        let swarm = Self {
            context,
            config,
            local_addr,
            tracker: TaskTracker::new(),
            shutdown,
        };

        info!(
            topic = %swarm.context.topic,
            addr = %local_addr,
            identifier = %swarm.context.local_key.identifier(),
            "Joined swarm"
        );

        swarm.tracker.spawn(accept_loop(
            listener,
            Arc::clone(&swarm.context),
            swarm.tracker.clone(),
        ));
        for peer in swarm.config.bootstrap_peers.clone() {
            swarm.dial(peer);
        }

        Ok((swarm, receiver))
    }

    /// Connect to a peer in the background, retrying per the configuration
    pub fn dial(&self, addr: SocketAddr) {
        if self.shutdown.is_cancelled() {
            debug!(%addr, "Swarm destroyed; not dialing");
            return;
        }

        let context = Arc::clone(&self.context);
        let attempts = self.config.dial_attempts.max(1);
        let connect_timeout = self.config.connect_timeout();
        let retry_delay = self.config.dial_retry_delay();

        self.tracker.spawn(async move {
            let socket = tokio::select! {
                () = context.shutdown.cancelled() => return,
                result = connect_with_retry(addr, attempts, connect_timeout, retry_delay) => result,
            };
            match socket {
                Ok(socket) => {
                    if let Err(e) = connection::drive(context, socket, Direction::Outbound).await {
                        warn!(%addr, "Outbound connection failed: {}", e);
                    }
                }
                Err(e) => warn!(%addr, attempts, "Giving up on peer: {}", e),
            }
        });
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn topic(&self) -> &Topic {
        &self.context.topic
    }

    pub fn public_key(&self) -> PublicKey {
        self.context.local_key
    }

    pub fn is_destroyed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop listening, close every connection, and wait for the tasks to finish
    ///
    /// Safe to call more than once.
    pub async fn destroy(&self) {
        if !self.shutdown.is_cancelled() {
            info!(topic = %self.context.topic, "Leaving swarm");
            self.shutdown.cancel();
        }
        self.tracker.close();

        if tokio::time::timeout(DESTROY_TIMEOUT, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.len(),
                "Connection tasks still running after {}ms",
                DESTROY_TIMEOUT.as_millis()
            );
        }
    }
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("topic", &self.context.topic)
            .field("local_addr", &self.local_addr)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Background Tasks
// ----------------------------------------------------------------------------

async fn accept_loop(listener: TcpListener, context: Arc<ConnectionContext>, tracker: TaskTracker) {
    loop {
        let accepted = tokio::select! {
            () = context.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, remote)) => {
                debug!(%remote, "Accepted TCP connection");
                let context = Arc::clone(&context);
                tracker.spawn(async move {
                    if let Err(e) = connection::drive(context, socket, Direction::Inbound).await {
                        warn!(%remote, "Inbound connection failed: {}", e);
                    }
                });
            }
            Err(e) => warn!("Accept failed: {}", e),
        }
    }
    debug!("Accept loop stopped");
}

async fn connect_with_retry(
    addr: SocketAddr,
    attempts: u32,
    connect_timeout: Duration,
    retry_delay: Duration,
) -> Result<TcpStream> {
    let mut last_error = SwarmError::Timeout {
        duration_ms: connect_timeout.as_millis() as u64,
    };

    for attempt in 1..=attempts {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(socket)) => return Ok(socket),
            Ok(Err(e)) => {
                debug!(%addr, attempt, "Connect failed: {}", e);
                last_error = SwarmError::Io(e);
            }
            Err(_) => {
                debug!(%addr, attempt, "Connect timed out");
                last_error = SwarmError::Timeout {
                    duration_ms: connect_timeout.as_millis() as u64,
                };
            }
        }

        if attempt < attempts {
            tokio::time::sleep(retry_delay).await;
        }
    }

    Err(last_error)
}
