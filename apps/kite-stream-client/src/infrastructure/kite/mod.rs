//! Kite Feed Adapters
//!
//! WebSocket client for the Kite market feed:
//!
//! - **codec**: length-prefixed binary tick protocol
//! - **messages**: JSON control requests and order-update classification
//! - **reconnect**: bounded exponential backoff
//! - **heartbeat**: read-timeout watchdog
//! - **client**: connection lifecycle and event dispatch

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;

pub use client::{ConnectionPhase, ConnectionState, TickerClient, TickerClientError};
pub use heartbeat::{HeartbeatEvent, HeartbeatMonitor, LivenessState, DEFAULT_READ_TIMEOUT};
pub use messages::{classify_order_update, RequestAction, RequestValues, TickerRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, RetryPhase};
