//! Event Dispatcher
//!
//! Minimal, synchronous listener registry: a fixed set of named events,
//! each with an ordered listener list. This is deliberately not a message
//! bus; delivery is in registration order on the caller's task, so a slow
//! listener delays subsequent listeners and the read loop.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::domain::tick::Tick;

/// The fixed set of event names listeners may register under.
///
/// `Message` is accepted for registration for compatibility with older
/// clients of the feed but is never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Connection established.
    Connect,
    /// Decoded ticks arrived.
    Ticks,
    /// Connection ended (any cause).
    Disconnect,
    /// Transport error.
    Error,
    /// Socket closed.
    Close,
    /// Reconnection attempt scheduled.
    Reconnect,
    /// Reconnection attempts exhausted.
    NoReconnect,
    /// Raw message (reserved, never emitted).
    Message,
    /// Order update received.
    OrderUpdate,
}

impl EventName {
    /// Parse an event name; unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(Self::Connect),
            "ticks" => Some(Self::Ticks),
            "disconnect" => Some(Self::Disconnect),
            "error" => Some(Self::Error),
            "close" => Some(Self::Close),
            "reconnect" => Some(Self::Reconnect),
            "noreconnect" => Some(Self::NoReconnect),
            "message" => Some(Self::Message),
            "order_update" => Some(Self::OrderUpdate),
            _ => None,
        }
    }
}

/// A typed event payload delivered to listeners.
#[derive(Debug, Clone)]
pub enum TickerEvent {
    /// Connection established and accepted.
    Connect,
    /// One decoded frame's worth of ticks.
    Ticks(Vec<Tick>),
    /// Connection ended, with the close reason when one was given.
    Disconnect(Option<String>),
    /// Transport-level error.
    Error(String),
    /// Socket close observed, with the close reason when one was given.
    Close(Option<String>),
    /// Retry scheduled.
    Reconnect {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt fires.
        delay: Duration,
    },
    /// Retries exhausted; no further attempts will be scheduled.
    NoReconnect,
    /// Order update payload, passed through as received.
    OrderUpdate(Value),
}

impl TickerEvent {
    /// The name listeners register under to receive this event.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::Connect => EventName::Connect,
            Self::Ticks(_) => EventName::Ticks,
            Self::Disconnect(_) => EventName::Disconnect,
            Self::Error(_) => EventName::Error,
            Self::Close(_) => EventName::Close,
            Self::Reconnect { .. } => EventName::Reconnect,
            Self::NoReconnect => EventName::NoReconnect,
            Self::OrderUpdate(_) => EventName::OrderUpdate,
        }
    }
}

/// Boxed listener callback.
pub type Listener = Box<dyn Fn(&TickerEvent) + Send>;

/// Registry mapping event names to ordered listener lists.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: HashMap<EventName, Vec<Listener>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under `name`.
    ///
    /// Unrecognized names are silently ignored.
    pub fn on<F>(&mut self, name: &str, listener: F)
    where
        F: Fn(&TickerEvent) + Send + 'static,
    {
        let Some(event) = EventName::parse(name) else {
            tracing::debug!(name, "ignoring listener for unknown event");
            return;
        };
        self.listeners.entry(event).or_default().push(Box::new(listener));
    }

    /// Invoke every listener registered for the event's name, in
    /// registration order, synchronously. No listeners is a no-op.
    pub fn trigger(&self, event: &TickerEvent) {
        if let Some(listeners) = self.listeners.get(&event.name()) {
            for listener in listeners {
                listener(event);
            }
        }
    }

    /// Number of listeners registered for a name (diagnostics).
    #[must_use]
    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners.get(&name).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<(EventName, usize)> = self
            .listeners
            .iter()
            .map(|(name, listeners)| (*name, listeners.len()))
            .collect();
        counts.sort_by_key(|(name, _)| format!("{name:?}"));
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .finish()
    }
}
