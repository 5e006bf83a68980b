//! Bounded, cancellable wait for the first peer
//!
//! After joining a topic the application waits a limited time for at least
//! one session to register. The wait ends early as soon as one does, and a
//! cancellation token aborts it immediately; cancellation is a normal outcome,
//! not an error.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long and how often to check for peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    /// Number of wait intervals before giving up
    pub attempts: u32,
    /// Length of one wait interval
    pub interval: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            interval: Duration::from_secs(5),
        }
    }
}

/// Why the wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// At least one session registered
    PeersFound(usize),
    /// Every interval elapsed with no session
    Exhausted,
    /// The token was cancelled
    Cancelled,
}

/// Wait until `live_count` reports a session, the policy runs out, or `cancel` fires
///
/// Cancellation is checked before each interval begins and after it ends.
pub async fn wait_for_peers(
    mut live_count: watch::Receiver<usize>,
    cancel: CancellationToken,
    policy: DiscoveryPolicy,
) -> DiscoveryOutcome {
    let current = *live_count.borrow_and_update();
    if current > 0 {
        return DiscoveryOutcome::PeersFound(current);
    }

    let mut count_open = true;
    for attempt in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return DiscoveryOutcome::Cancelled;
        }

        let deadline = tokio::time::Instant::now() + policy.interval;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return DiscoveryOutcome::Cancelled,
                () = tokio::time::sleep_until(deadline) => break,
                changed = live_count.changed(), if count_open => {
                    if changed.is_err() {
                        // Registry dropped; fall back to plain interval waits
                        count_open = false;
                        continue;
                    }
                    let current = *live_count.borrow_and_update();
                    if current > 0 && !cancel.is_cancelled() {
                        return DiscoveryOutcome::PeersFound(current);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return DiscoveryOutcome::Cancelled;
        }
        let current = *live_count.borrow();
        if current > 0 {
            return DiscoveryOutcome::PeersFound(current);
        }
        debug!(attempt, attempts = policy.attempts, "No peers yet");
    }

    DiscoveryOutcome::Exhausted
}
