//! Heartbeat Monitor
//!
//! The feed has no explicit ping/pong: liveness is inferred from message
//! arrival. The server streams continuously during market hours, so a
//! silent socket is a dead socket. The monitor checks every
//! `read_timeout` whether a message arrived within the window and reports
//! a single stall, which the connection loop treats as a disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default interval without messages after which the connection is
/// considered dead.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared record of when the last socket message arrived.
#[derive(Debug)]
pub struct LivenessState {
    last_message_at: RwLock<Instant>,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessState {
    /// Create fresh state, counting from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_message_at: RwLock::new(Instant::now()),
        }
    }

    /// Record that a message (binary or text) arrived.
    pub fn record_message(&self) {
        *self.last_message_at.write() = Instant::now();
    }

    /// Time elapsed since the last recorded message.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.last_message_at.read().elapsed()
    }

    /// Whether the silence window has been exceeded.
    #[must_use]
    pub fn is_stalled(&self, read_timeout: Duration) -> bool {
        self.elapsed() >= read_timeout
    }
}

/// Event emitted by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// No message within the read timeout; the connection should be
    /// closed and the disconnect path taken exactly once.
    Stalled,
}

/// Watchdog task monitoring one connection.
///
/// Runs until cancelled or until it reports a stall; reporting a stall
/// ends the task, so at most one `Stalled` event is ever sent per
/// connection.
pub struct HeartbeatMonitor {
    read_timeout: Duration,
    state: Arc<LivenessState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new monitor.
    #[must_use]
    pub const fn new(
        read_timeout: Duration,
        state: Arc<LivenessState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            read_timeout,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the watchdog loop.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.read_timeout);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so a fresh
        // connection gets a full window before the first check.
        interval.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("heartbeat monitor cancelled");
                    return;
                }
                _ = interval.tick() => {
                    if self.state.is_stalled(self.read_timeout) {
                        tracing::warn!(
                            elapsed_secs = self.state.elapsed().as_secs(),
                            timeout_secs = self.read_timeout.as_secs(),
                            "no message within read timeout"
                        );
                        let _ = self.event_tx.send(HeartbeatEvent::Stalled).await;
                        return;
                    }
                }
            }
        }
    }
}
