#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Alpaca Ingest - Market Data Ingestion Pipeline
//!
//! Maintains a single WebSocket connection to Alpaca's market data
//! stream, decodes and deduplicates the firehose, keeps a latest-value
//! cache per symbol, and fans processed events out to in-process
//! consumers over topic-keyed channels.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure data types and the latest-value cache
//!   - `market_data`: Canonical messages (quotes, bars, trades, statuses)
//!   - `cache`: Per-symbol latest bar/quote with derived current price
//!   - `subscription`: Channel/symbol subscription sets
//!
//! - **Application**: Pipeline orchestration and port definitions
//!   - `ports`: Transport interface the coordinator subscribes through
//!   - `dispatch`: Dedup, cache writes, counters, outbound events
//!   - `coordinator`: Subscription reconciliation per connection epoch
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: WebSocket client, wire codec, auth, reconnect
//!   - `broadcast`: Topic-keyed event hub
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Logging setup
//!
//! # Data Flow
//!
//! ```text
//! Alpaca WS ──► StreamClient ──► Dispatcher ──► EventHub ──► consumers
//!                    │               │              │
//!                    │               ▼              │ "connection"
//!                    │        LatestValueCache      ▼
//!                    └───────────────────── SubscriptionCoordinator
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no external dependencies.
pub mod domain;

/// Application layer - Pipeline orchestration and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::{CacheEntry, LatestValueCache, SharedCache};
pub use domain::market_data::{
    Bar, CanonicalMessage, ConnectionEvent, ConnectionPhase, Quote, Status, Symbol,
    SymbolAllowList, Trade,
};
pub use domain::subscription::{ChannelKind, SubscriptionSet};

// Application layer
pub use application::coordinator::SubscriptionCoordinator;
pub use application::dispatch::{Dispatcher, EventKind, OutboundEvent};
pub use application::ports::{SubscriptionTransport, TransportError};

// Infrastructure config
pub use infrastructure::config::{ConfigError, DataFeed, IngestConfig, WebSocketSettings};

// Event hub (for integration tests)
pub use infrastructure::broadcast::{CONNECTION_TOPIC, EventHub};

// Alpaca adapter
pub use infrastructure::alpaca::{
    Credentials, StreamClient, StreamClientConfig, StreamClientError, StreamHandle,
};
