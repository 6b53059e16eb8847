#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value
    )
)]

//! Kite Stream Client - Market Data Ticker
//!
//! A streaming client for the Kite market feed. Maintains a persistent
//! WebSocket connection, decodes the compact big-endian binary tick
//! protocol into structured price/quote/depth records, and delivers them
//! to registered listeners while self-healing from network failures with
//! bounded exponential backoff.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Market data types
//!   - `tick`: Tick, OHLC, depth and segment types
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kite`: binary codec, control messages, heartbeat, reconnection
//!     policy, WebSocket client
//!   - `events`: synchronous named-event listener registry
//!   - `config`: settings and credentials
//!
//! # Data Flow
//!
//! ```text
//! Kite feed WS ──► TickerClient ──► codec ──► EventDispatcher ──► listeners
//!                        │
//!                        └── heartbeat / reconnect policy
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no external dependencies.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::tick::{DepthLevel, MarketDepth, Mode, Ohlc, Segment, Tick};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, TickerConfig};

// Events
pub use infrastructure::events::{EventDispatcher, EventName, TickerEvent};

// Kite adapters
pub use infrastructure::kite::{
    ConnectionPhase, ConnectionState, ReconnectConfig, ReconnectPolicy, TickerClient,
    TickerClientError, TickerRequest,
};
