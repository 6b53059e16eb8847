//! Domain layer - Core market data types with no external I/O.

pub mod tick;
