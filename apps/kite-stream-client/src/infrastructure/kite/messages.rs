//! Kite WebSocket Message Types
//!
//! Outbound JSON control requests and inbound text-message classification.
//!
//! # Outbound Wire Format
//!
//! ```json
//! {"a": "subscribe",   "v": [408065, 884737]}
//! {"a": "unsubscribe", "v": [408065]}
//! {"a": "mode",        "v": ["full", [408065]]}
//! ```
//!
//! # Inbound Text Format
//!
//! Text frames are JSON objects. Only order updates are acted upon:
//!
//! ```json
//! {"type": "order", "data": {...}}
//! ```
//!
//! Everything else, including malformed JSON, is silently ignored.

use serde::Serialize;

use crate::domain::tick::Mode;

/// Outbound request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    /// Start streaming the given tokens.
    Subscribe,
    /// Stop streaming the given tokens.
    Unsubscribe,
    /// Change the tick detail level for the given tokens.
    Mode,
}

/// Request payload; shape depends on the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestValues {
    /// Plain token list for subscribe/unsubscribe.
    Tokens(Vec<u32>),
    /// `[mode, tokens]` pair for mode changes.
    ModeTokens(Mode, Vec<u32>),
}

/// One outbound control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerRequest {
    /// Action discriminator.
    pub a: RequestAction,
    /// Action payload.
    pub v: RequestValues,
}

impl TickerRequest {
    /// Build a subscribe request.
    #[must_use]
    pub const fn subscribe(tokens: Vec<u32>) -> Self {
        Self {
            a: RequestAction::Subscribe,
            v: RequestValues::Tokens(tokens),
        }
    }

    /// Build an unsubscribe request.
    #[must_use]
    pub const fn unsubscribe(tokens: Vec<u32>) -> Self {
        Self {
            a: RequestAction::Unsubscribe,
            v: RequestValues::Tokens(tokens),
        }
    }

    /// Build a mode-change request.
    #[must_use]
    pub const fn set_mode(mode: Mode, tokens: Vec<u32>) -> Self {
        Self {
            a: RequestAction::Mode,
            v: RequestValues::ModeTokens(mode, tokens),
        }
    }
}

/// Classify an inbound text frame, extracting an order-update payload
/// when present.
///
/// Returns `None` for malformed JSON and for every message shape other
/// than `{"type": "order", ...}`.
#[must_use]
pub fn classify_order_update(text: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("type").and_then(serde_json::Value::as_str) == Some("order") {
        Some(value.get("data").cloned().unwrap_or(serde_json::Value::Null))
    } else {
        None
    }
}
