//! Domain Layer - Core ingestion types and business logic.
//!
//! This layer contains the canonical market data types, the latest-value
//! cache, and subscription bookkeeping. All types here are pure Rust with
//! no I/O dependencies.

/// Canonical market data types (quotes, trades, bars, statuses).
pub mod market_data;

/// Concurrently-readable latest-value cache.
pub mod cache;

/// Channel kinds and subscription sets.
pub mod subscription;
