//! Canonical Market Data Types
//!
//! Codec-agnostic internal representation of the market data stream.
//! Wire messages are converted into these types exactly once, at the
//! decode boundary; everything downstream (dispatcher, cache, event hub)
//! speaks only canonical types.
//!
//! Prices are `rust_decimal::Decimal`, never floats: quote deduplication
//! compares prices for exact equality and must not be affected by binary
//! representation drift.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbols
// =============================================================================

/// A ticker symbol (e.g., "AAPL").
pub type Symbol = String;

/// Fixed allow-list of symbols the ingest pipeline is configured for.
///
/// Built once at startup from configuration and immutable afterwards.
/// An inbound message referencing a symbol outside this list is a protocol
/// anomaly handled by discarding the message with a warning, never by
/// failing the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SymbolAllowList {
    symbols: HashSet<Symbol>,
}

impl SymbolAllowList {
    /// Build an allow-list from an iterator of symbols.
    #[must_use]
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            symbols: symbols.into_iter().collect(),
        }
    }

    /// Check whether a symbol is configured.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Number of configured symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check whether the allow-list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterate over the configured symbols (unordered).
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

// =============================================================================
// Data Messages
// =============================================================================

/// Best bid/ask quote for a symbol.
///
/// Either side may be absent (a one-sided or degenerate quote); dedup and
/// pricing logic must treat absence as a distinct value, not as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Bid price, absent when the bid side is empty.
    pub bid_price: Option<Decimal>,
    /// Bid size.
    pub bid_size: i64,
    /// Ask price, absent when the ask side is empty.
    pub ask_price: Option<Decimal>,
    /// Ask size.
    pub ask_size: i64,
    /// Quote timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Check whether both sides of the quote are present.
    #[must_use]
    pub const fn is_two_sided(&self) -> bool {
        self.bid_price.is_some() && self.ask_price.is_some()
    }

    /// Bid/ask midpoint, available only for two-sided quotes.
    #[must_use]
    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.bid_price, self.ask_price) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// The `(bid, ask)` pair used for deduplication.
    #[must_use]
    pub const fn price_pair(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.bid_price, self.ask_price)
    }
}

/// One fixed-duration OHLCV aggregate for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Volume (shares).
    pub volume: i64,
    /// Volume-weighted average price, when provided by the feed.
    pub vwap: Option<Decimal>,
    /// Number of trades in the bar, when provided by the feed.
    pub trade_count: Option<i64>,
    /// Bar timestamp (start of the bar period).
    pub timestamp: DateTime<Utc>,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Trade price.
    pub price: Decimal,
    /// Trade size (shares).
    pub size: i64,
    /// Trade timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Trading status change (halts, resumptions, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Status code (e.g., "T" for trading, "H" for halted).
    pub status_code: Option<String>,
    /// Human-readable status message.
    pub status_message: Option<String>,
}

impl Status {
    /// Check whether this status represents normal trading.
    ///
    /// Anything other than the "T" (trading) code is a non-normal
    /// condition worth a warning-level diagnostic.
    #[must_use]
    pub fn is_normal_trading(&self) -> bool {
        self.status_code.as_deref() == Some("T")
    }
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

/// Phase of the stream connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    /// Connection attempt in progress.
    Connecting,
    /// Physical connection established, pre-authentication.
    Connected,
    /// Authentication handshake completed.
    Authenticated,
    /// Subscription acknowledged by the server.
    Subscribed,
    /// Waiting out the backoff before the next connection attempt.
    Reconnecting,
    /// Connection lost or closed.
    Disconnected,
}

impl ConnectionPhase {
    /// Phase name as it appears in logs and published events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Subscribed => "subscribed",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Connection lifecycle event published alongside market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// Lifecycle phase reached.
    pub phase: ConnectionPhase,
    /// Reconnection attempt counter at the time of the event.
    pub attempt: u32,
}

// =============================================================================
// Canonical Message
// =============================================================================

/// Unified canonical message delivered from the stream client to the
/// dispatcher, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CanonicalMessage {
    /// Best bid/ask update.
    Quote(Quote),
    /// Completed OHLCV bar.
    Bar(Bar),
    /// Executed trade.
    Trade(Trade),
    /// Trading status change.
    Status(Status),
    /// Connection lifecycle event.
    Connection(ConnectionEvent),
}

impl CanonicalMessage {
    /// The symbol this message refers to, if any.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Quote(q) => Some(&q.symbol),
            Self::Bar(b) => Some(&b.symbol),
            Self::Trade(t) => Some(&t.symbol),
            Self::Status(s) => Some(&s.symbol),
            Self::Connection(_) => None,
        }
    }
}
