//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Alpaca WebSocket client and wire protocol.
pub mod alpaca;

/// Topic-keyed event distribution.
pub mod broadcast;

/// Environment-driven configuration.
pub mod config;

/// Logging setup.
pub mod telemetry;
