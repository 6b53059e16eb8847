//! Configuration
//!
//! Ticker settings and credentials, loaded from environment variables.

mod settings;

pub use settings::{ConfigError, Credentials, TickerConfig, DEFAULT_WS_ROOT};
