//! Infrastructure layer - Adapters and external integrations.

pub mod config;
pub mod events;
pub mod kite;
