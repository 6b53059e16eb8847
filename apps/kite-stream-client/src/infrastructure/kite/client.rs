//! Ticker WebSocket Client
//!
//! Owns the socket lifecycle: connect, decode, dispatch, heartbeat
//! monitoring and automatic reconnection. One client instance maintains
//! at most one live connection and at most one pending reconnection
//! sleep at any time; both are guaranteed structurally by the single
//! `run` loop rather than by timer bookkeeping.
//!
//! All failures surface through the event mechanism. The run loop only
//! returns an error for conditions retrying cannot fix: a bad
//! configuration or reconnection exhaustion.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::domain::tick::Mode;
use crate::infrastructure::config::{ConfigError, TickerConfig};
use crate::infrastructure::events::{EventDispatcher, TickerEvent};

use super::codec;
use super::heartbeat::{HeartbeatEvent, HeartbeatMonitor, LivenessState};
use super::messages::{classify_order_update, TickerRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end the client's run loop.
///
/// Transport failures are not among them; those feed the reconnection
/// loop and surface as `error`/`close`/`disconnect` events.
#[derive(Debug, thiserror::Error)]
pub enum TickerClientError {
    /// Configuration is unusable; retrying cannot help.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Maximum reconnection attempts exceeded; terminal.
    #[error("maximum reconnection attempts exceeded")]
    ReconnectExhausted,

    /// `run` was called while another run loop holds the client.
    #[error("client is already running")]
    AlreadyRunning,
}

// =============================================================================
// Connection State Machine
// =============================================================================

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No socket.
    #[default]
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Connection accepted and live.
    Open,
    /// Close requested, awaiting the close handshake.
    Closing,
}

/// Pure connection state machine, transitioned only through named
/// methods so re-entrancy cases stay provable.
///
/// `active_url` pins the URL of the currently accepted connection; close
/// callbacks from a superseded socket carry a different URL and are
/// filtered out rather than triggering a second disconnect.
#[derive(Debug, Default)]
pub struct ConnectionState {
    phase: ConnectionPhase,
    active_url: Option<String>,
}

impl ConnectionState {
    /// Create an idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// True iff the connection is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Open)
    }

    /// Start a connection attempt. Returns false (and does nothing) if a
    /// connection is already in flight or open.
    pub const fn begin_connect(&mut self) -> bool {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Open => false,
            ConnectionPhase::Idle | ConnectionPhase::Closing => {
                self.phase = ConnectionPhase::Connecting;
                true
            }
        }
    }

    /// The transport accepted the connection.
    pub fn on_open(&mut self, url: String) {
        self.phase = ConnectionPhase::Open;
        self.active_url = Some(url);
    }

    /// A close was requested (user or client initiated).
    pub const fn begin_close(&mut self) {
        if matches!(self.phase, ConnectionPhase::Connecting | ConnectionPhase::Open) {
            self.phase = ConnectionPhase::Closing;
        }
    }

    /// Forget the active URL, e.g. when a stalled connection is being
    /// torn down and its late close callback must not be trusted.
    pub fn clear_active_url(&mut self) {
        self.active_url = None;
    }

    /// The transport reported a close for `url`.
    ///
    /// Returns true when the close belongs to the active connection and
    /// the disconnect path should run; a mismatched URL is a stale
    /// callback from a superseded socket and is ignored.
    pub fn on_closed(&mut self, url: &str) -> bool {
        if let Some(active) = &self.active_url
            && active != url
        {
            return false;
        }
        self.phase = ConnectionPhase::Idle;
        self.active_url = None;
        true
    }

    /// The connection ended without a close handshake.
    pub fn on_dropped(&mut self) {
        self.phase = ConnectionPhase::Idle;
        self.active_url = None;
    }
}

// =============================================================================
// Run-loop plumbing
// =============================================================================

/// Commands sent from the public API into the run loop.
#[derive(Debug)]
enum Command {
    /// Send a control request over the socket.
    Request(TickerRequest),
    /// Close the socket.
    Close,
}

/// Why a single connection ended.
#[derive(Debug)]
enum StreamEnd {
    /// Close observed (server frame or stream end), with any reason.
    Closed(Option<String>),
    /// Transport-level error.
    Transport(String),
    /// Heartbeat watchdog declared the connection dead.
    Stalled,
    /// An outbound send failed; the socket was force-closed.
    SendFailed,
}

impl StreamEnd {
    /// Close reason to attach to the `disconnect` event.
    fn reason(&self) -> Option<String> {
        match self {
            Self::Closed(reason) => reason.clone(),
            Self::Transport(reason) => Some(reason.clone()),
            Self::Stalled => Some("read timeout".to_string()),
            Self::SendFailed => Some("send failed".to_string()),
        }
    }
}

// =============================================================================
// Ticker Client
// =============================================================================

/// Market-feed streaming client.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use kite_stream_client::infrastructure::config::{Credentials, TickerConfig};
/// use kite_stream_client::infrastructure::events::TickerEvent;
/// use kite_stream_client::infrastructure::kite::client::TickerClient;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let config = TickerConfig::new(Credentials::new(
///         "AB1234".to_string(),
///         "enctoken".to_string(),
///     ));
///     let client = Arc::new(TickerClient::new(config, CancellationToken::new()));
///
///     client.on("ticks", |event| {
///         if let TickerEvent::Ticks(ticks) = event {
///             println!("{} ticks", ticks.len());
///         }
///     });
///
///     client.connect();
///     client.subscribe(vec![408_065]);
/// }
/// ```
pub struct TickerClient {
    config: Mutex<TickerConfig>,
    dispatcher: Mutex<EventDispatcher>,
    state: Mutex<ConnectionState>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    cancel: CancellationToken,
}

impl TickerClient {
    /// Create a new client. Listeners should be registered before
    /// calling [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: TickerConfig, cancel: CancellationToken) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            config: Mutex::new(config),
            dispatcher: Mutex::new(EventDispatcher::new()),
            state: Mutex::new(ConnectionState::new()),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            cancel,
        }
    }

    /// Register a listener for a named event.
    ///
    /// Unrecognized names are silently ignored.
    pub fn on<F>(&self, name: &str, listener: F)
    where
        F: Fn(&TickerEvent) + Send + 'static,
    {
        self.dispatcher.lock().on(name, listener);
    }

    /// True iff the connection is open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state.lock().is_open()
    }

    /// Start the connection loop on a background task.
    ///
    /// No-op if a connection is already in flight or open. Errors from
    /// the loop are logged; use [`run`](Self::run) directly to observe
    /// them.
    pub fn connect(self: &Arc<Self>) {
        if !self.state.lock().begin_connect() {
            return;
        }
        let client = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = client.run().await {
                tracing::error!(error = %e, "ticker client stopped");
            }
        });
    }

    /// Request a close of the current connection.
    ///
    /// The close travels through the normal close handler, so the
    /// disconnect path (including auto-reconnect, if enabled) still runs;
    /// reconnection state is deliberately not cleared.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        if matches!(
            state.phase(),
            ConnectionPhase::Connecting | ConnectionPhase::Open
        ) {
            state.begin_close();
            let _ = self.command_tx.send(Command::Close);
        }
    }

    /// Subscribe to instrument tokens. Returns the input tokens; no-op
    /// when the list is empty or the socket is not open.
    pub fn subscribe(&self, tokens: Vec<u32>) -> Vec<u32> {
        self.send_request(TickerRequest::subscribe(tokens.clone()), tokens.is_empty());
        tokens
    }

    /// Unsubscribe from instrument tokens. Returns the input tokens;
    /// no-op when the list is empty or the socket is not open.
    pub fn unsubscribe(&self, tokens: Vec<u32>) -> Vec<u32> {
        self.send_request(
            TickerRequest::unsubscribe(tokens.clone()),
            tokens.is_empty(),
        );
        tokens
    }

    /// Change the tick detail level for instrument tokens. Returns the
    /// input tokens; no-op when the list is empty or the socket is not
    /// open.
    pub fn set_mode(&self, mode: Mode, tokens: Vec<u32>) -> Vec<u32> {
        self.send_request(
            TickerRequest::set_mode(mode, tokens.clone()),
            tokens.is_empty(),
        );
        tokens
    }

    /// Reconfigure automatic reconnection.
    ///
    /// Applies the documented clamps and takes effect on the next
    /// disconnect.
    pub fn configure_reconnection(
        &self,
        enabled: bool,
        max_retries: Option<u32>,
        max_delay: Option<std::time::Duration>,
    ) {
        self.config.lock().reconnect = ReconnectConfig::new(enabled, max_retries, max_delay);
    }

    fn send_request(&self, request: TickerRequest, empty: bool) {
        if empty || !self.connected() {
            return;
        }
        let _ = self.command_tx.send(Command::Request(request));
    }

    fn emit(&self, event: &TickerEvent) {
        self.dispatcher.lock().trigger(event);
    }

    /// Run the connection loop until cancelled or a terminal condition.
    ///
    /// Connects, streams, and on failure consults the reconnection
    /// policy; the backoff sleep lives inside this loop, so at most one
    /// retry is ever pending.
    ///
    /// When the loop exits, the client returns to Idle and can be
    /// started again with [`connect`](Self::connect) or another `run`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable configuration, for reconnection
    /// exhaustion, or when called while already running.
    pub async fn run(self: Arc<Self>) -> Result<(), TickerClientError> {
        let Some(mut command_rx) = self.command_rx.lock().take() else {
            return Err(TickerClientError::AlreadyRunning);
        };

        let result = self.run_sessions(&mut command_rx).await;

        // Hand the channel back and settle the state machine so a later
        // connect() starts a fresh loop instead of finding a dead one.
        while command_rx.try_recv().is_ok() {}
        self.state.lock().on_dropped();
        *self.command_rx.lock() = Some(command_rx);

        result
    }

    async fn run_sessions(
        &self,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Result<(), TickerClientError> {
        let mut policy = ReconnectPolicy::new(self.config.lock().reconnect);

        loop {
            if self.cancel.is_cancelled() {
                self.state.lock().on_dropped();
                return Ok(());
            }

            let end = match self.connect_and_stream(command_rx, &mut policy).await {
                Ok(Some(end)) => end,
                Ok(None) => {
                    tracing::info!("ticker client cancelled");
                    self.state.lock().on_dropped();
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            // Single disconnect path for every way a connection can end
            self.emit(&TickerEvent::Disconnect(end.reason()));

            // Pick up any configure_reconnection changes
            policy.reconfigure(self.config.lock().reconnect);
            if !policy.enabled() {
                tracing::info!("auto-reconnect disabled, stopping");
                return Ok(());
            }

            match policy.next_delay() {
                Some(delay) => {
                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        "reconnecting to feed"
                    );
                    self.emit(&TickerEvent::Reconnect { attempt, delay });

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    tracing::warn!("reconnection attempts exhausted");
                    self.emit(&TickerEvent::NoReconnect);
                    return Err(TickerClientError::ReconnectExhausted);
                }
            }
        }
    }

    /// Connect once and stream until the connection ends.
    ///
    /// `Ok(Some(end))` describes how the connection ended and feeds the
    /// disconnect path; `Ok(None)` means cancellation.
    #[allow(clippy::too_many_lines)]
    async fn connect_and_stream(
        &self,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
        policy: &mut ReconnectPolicy,
    ) -> Result<Option<StreamEnd>, TickerClientError> {
        let _ = self.state.lock().begin_connect();
        let url = self.config.lock().ws_url()?;
        tracing::info!(url = %url.host_str().unwrap_or("?"), "connecting to feed");

        let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "feed connection failed");
                self.emit(&TickerEvent::Error(e.to_string()));
                self.state.lock().on_dropped();
                return Ok(Some(StreamEnd::Transport(e.to_string())));
            }
        };

        let (mut write, mut read) = ws_stream.split();

        // Connection accepted: reset retry accounting, pin the URL
        self.state.lock().on_open(url.to_string());
        policy.reset();
        self.emit(&TickerEvent::Connect);

        // Watchdog: a silent socket is a dead socket
        let read_timeout = self.config.lock().read_timeout;
        let liveness = Arc::new(LivenessState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(1);
        let heartbeat_cancel = self.cancel.child_token();
        tokio::spawn(
            HeartbeatMonitor::new(
                read_timeout,
                liveness.clone(),
                heartbeat_tx,
                heartbeat_cancel.clone(),
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    heartbeat_cancel.cancel();
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(None);
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::Stalled) => {
                            // Force close; the late close callback from
                            // this socket must not re-trigger the
                            // disconnect path.
                            heartbeat_cancel.cancel();
                            {
                                let mut state = self.state.lock();
                                state.clear_active_url();
                                state.on_dropped();
                            }
                            let _ = write.send(Message::Close(None)).await;
                            self.emit(&TickerEvent::Close(None));
                            return Ok(Some(StreamEnd::Stalled));
                        }
                        None => {
                            tracing::debug!("heartbeat channel closed");
                        }
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(Command::Request(request)) => {
                            if let Some(end) = self.send_json(&mut write, &request).await {
                                heartbeat_cancel.cancel();
                                self.emit(&TickerEvent::Close(None));
                                self.state.lock().on_dropped();
                                return Ok(Some(end));
                            }
                        }
                        Some(Command::Close) => {
                            let _ = write.send(Message::Close(None)).await;
                        }
                        None => {
                            // Client handle dropped; treat as cancellation
                            heartbeat_cancel.cancel();
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(None);
                        }
                    }
                }
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            liveness.record_message();
                            if data.len() > 2 {
                                let ticks = codec::decode(&data, Utc::now());
                                if !ticks.is_empty() {
                                    self.emit(&TickerEvent::Ticks(ticks));
                                }
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            liveness.record_message();
                            if let Some(payload) = classify_order_update(&text) {
                                self.emit(&TickerEvent::OrderUpdate(payload));
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            liveness.record_message();
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .as_ref()
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty());
                            self.emit(&TickerEvent::Close(reason.clone()));

                            if self.state.lock().on_closed(url.as_str()) {
                                heartbeat_cancel.cancel();
                                return Ok(Some(StreamEnd::Closed(reason)));
                            }
                            // Stale close from a superseded socket: the
                            // disconnect path must not run twice.
                            tracing::debug!("ignoring close from superseded connection");
                        }
                        Some(Ok(_)) => {
                            liveness.record_message();
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "feed transport error");
                            self.emit(&TickerEvent::Error(e.to_string()));
                            // Force close to avoid a half-open ghost socket;
                            // the teardown still surfaces as a close event.
                            heartbeat_cancel.cancel();
                            let _ = write.send(Message::Close(None)).await;
                            self.emit(&TickerEvent::Close(None));
                            self.state.lock().on_dropped();
                            return Ok(Some(StreamEnd::Transport(e.to_string())));
                        }
                        None => {
                            tracing::info!("feed stream ended");
                            self.emit(&TickerEvent::Close(None));
                            heartbeat_cancel.cancel();
                            self.state.lock().on_dropped();
                            return Ok(Some(StreamEnd::Closed(None)));
                        }
                    }
                }
            }
        }
    }

    /// Serialize and send one control request. Returns the stream end on
    /// failure, after force-closing the socket.
    async fn send_json<W>(&self, write: &mut W, request: &TickerRequest) -> Option<StreamEnd>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let json = match serde_json::to_string(request) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize request");
                return None;
            }
        };
        tracing::debug!(request = %json, "sending control request");

        if let Err(e) = write.send(Message::Text(json.into())).await {
            tracing::warn!(error = %e, "send failed, closing socket");
            let _ = write.send(Message::Close(None)).await;
            return Some(StreamEnd::SendFailed);
        }
        None
    }
}
