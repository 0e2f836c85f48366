//! Application Layer - Pipeline orchestration.
//!
//! Wires the canonical message stream into the cache and event hub
//! (dispatcher) and keeps the server-side subscription set converged on
//! the configured one (coordinator). Depends on the domain layer and on
//! ports; never on concrete infrastructure.

/// Port traits implemented by infrastructure adapters.
pub mod ports;

/// Deduplicating dispatcher: cache updates, outbound events, throughput.
pub mod dispatch;

/// Subscription coordinator state machine.
pub mod coordinator;
