//! Alpaca WebSocket Message Types
//!
//! Wire format types for the Alpaca market data stream. These map directly
//! to Alpaca's JSON message schemas; conversion into the canonical domain
//! types happens exactly once, in [`WireMessage::into_canonical`].
//!
//! # Message Types
//!
//! ## Control Messages
//! - `Success`: connection / authentication acknowledgment
//! - `Error`: error response with code and message
//! - `Subscription`: confirmation of the active subscription set
//!
//! ## Data Messages
//! - `Quote` ("q"): best bid/ask
//! - `Trade` ("t"): executed trades
//! - `Bar` ("b"/"d"/"u"): OHLCV aggregates
//! - `Status` ("s"): trading status changes
//!
//! # References
//!
//! - [Stock Streaming](https://docs.alpaca.markets/docs/real-time-stock-pricing-data)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market_data::{Bar, CanonicalMessage, Quote, Status, Trade};
use crate::domain::subscription::{ChannelKind, SubscriptionSet};

// =============================================================================
// Control Messages
// =============================================================================

/// Success message indicating connection or authentication succeeded.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "connected"}
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// Message type (always "success")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Success message: "connected" or "authenticated"
    pub msg: SuccessKind,
}

/// Kind of success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessKind {
    /// Initial connection established
    Connected,
    /// Authentication successful
    Authenticated,
}

/// Error message with code and description.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 401, "msg": "not authenticated"}
/// ```
///
/// # Error Codes
/// - 400: Invalid syntax
/// - 401: Not authenticated
/// - 402: Auth failed
/// - 403: Already authenticated
/// - 404: Auth timeout
/// - 405: Symbol limit exceeded
/// - 406: Connection limit exceeded
/// - 407: Slow client
/// - 408: Insufficient subscription
/// - 500: Internal error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Message type (always "error")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Error code
    pub code: i32,

    /// Error message
    pub msg: String,
}

impl ErrorMessage {
    /// Check if this is an authentication error.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.code, 401..=404)
    }

    /// Check if this is a rate limit error.
    #[must_use]
    pub const fn is_rate_limit_error(&self) -> bool {
        matches!(self.code, 405..=407)
    }
}

/// Subscription confirmation message.
///
/// Sent after a subscribe/unsubscribe action; lists the full active
/// subscription set, not a delta.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "subscription",
///   "quotes": ["AAPL", "MSFT"],
///   "bars": ["AAPL", "MSFT"],
///   "statuses": ["AAPL", "MSFT"]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Message type (always "subscription")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Subscribed trade symbols
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<String>,

    /// Subscribed quote symbols
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<String>,

    /// Subscribed bar symbols
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bars: Vec<String>,

    /// Subscribed status symbols
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
}

impl SubscriptionMessage {
    /// Total number of confirmed (channel, symbol) pairs.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.trades.len() + self.quotes.len() + self.bars.len() + self.statuses.len()
    }
}

// =============================================================================
// Data Messages
// =============================================================================

/// Real-time stock quote (NBBO).
///
/// Alpaca reports an empty book side as a zero price; the canonical
/// conversion normalizes zero to an absent side.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "q",
///   "S": "AAPL",
///   "bx": "Q",
///   "bp": 185.48,
///   "bs": 1,
///   "ax": "P",
///   "ap": 185.52,
///   "as": 4,
///   "t": "2024-01-15T15:51:45.335689322Z",
///   "c": ["R"],
///   "z": "C"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteMessage {
    /// Message type (always "q")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Ticker symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Bid exchange code
    #[serde(rename = "bx", default)]
    pub bid_exchange: Option<String>,

    /// Bid price (0 when the bid side is empty)
    #[serde(rename = "bp", default)]
    pub bid_price: Option<Decimal>,

    /// Bid size
    #[serde(rename = "bs", default)]
    pub bid_size: i64,

    /// Ask exchange code
    #[serde(rename = "ax", default)]
    pub ask_exchange: Option<String>,

    /// Ask price (0 when the ask side is empty)
    #[serde(rename = "ap", default)]
    pub ask_price: Option<Decimal>,

    /// Ask size
    #[serde(rename = "as", default)]
    pub ask_size: i64,

    /// Quote timestamp (RFC-3339 with nanosecond precision)
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,

    /// Quote condition codes
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape: "A" (NYSE), "B" (ARCA/regional), "C" (NASDAQ)
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

/// Real-time stock trade.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "t",
///   "i": 96921,
///   "S": "AAPL",
///   "x": "D",
///   "p": 185.50,
///   "s": 10,
///   "t": "2024-01-15T15:51:44.208Z",
///   "c": ["@"],
///   "z": "C"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Message type (always "t")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Ticker symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Trade ID (unique per exchange per day)
    #[serde(rename = "i", default)]
    pub trade_id: i64,

    /// Exchange code where trade executed
    #[serde(rename = "x", default)]
    pub exchange: Option<String>,

    /// Trade price
    #[serde(rename = "p")]
    pub price: Decimal,

    /// Trade size (shares)
    #[serde(rename = "s")]
    pub size: i64,

    /// Trade timestamp
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,

    /// Trade condition codes
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

/// Real-time OHLCV bar.
///
/// Bar types on the wire: "b" (minute), "d" (daily), "u" (correction).
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "b",
///   "S": "AAPL",
///   "o": 185.00,
///   "h": 185.60,
///   "l": 184.90,
///   "c": 185.20,
///   "v": 49378,
///   "n": 461,
///   "vw": 185.062639,
///   "t": "2024-01-15T19:15:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarMessage {
    /// Message type: "b" (minute), "d" (daily), "u" (updated)
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Ticker symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Open price
    #[serde(rename = "o")]
    pub open: Decimal,

    /// High price
    #[serde(rename = "h")]
    pub high: Decimal,

    /// Low price
    #[serde(rename = "l")]
    pub low: Decimal,

    /// Close price
    #[serde(rename = "c")]
    pub close: Decimal,

    /// Volume (shares)
    #[serde(rename = "v")]
    pub volume: i64,

    /// Number of trades in bar
    #[serde(rename = "n", default)]
    pub trade_count: Option<i64>,

    /// Volume-weighted average price
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,

    /// Bar timestamp (start of bar period)
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

/// Trading status message (halts, resumptions, etc.).
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "s",
///   "S": "AAPL",
///   "sc": "T",
///   "sm": "Trading",
///   "rc": "",
///   "rm": "",
///   "t": "2024-01-15T15:00:00Z",
///   "z": "C"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Message type (always "s")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Ticker symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Status code (e.g., "T" for trading, "H" for halted)
    #[serde(rename = "sc", default)]
    pub status_code: Option<String>,

    /// Status message text
    #[serde(rename = "sm", default)]
    pub status_message: Option<String>,

    /// Reason code for status change
    #[serde(rename = "rc", default)]
    pub reason_code: Option<String>,

    /// Reason message explaining status change
    #[serde(rename = "rm", default)]
    pub reason_message: Option<String>,

    /// Status timestamp
    #[serde(rename = "t", default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Tape
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Authentication request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    /// Action: "auth"
    pub action: &'static str,

    /// API key
    pub key: String,

    /// API secret
    pub secret: String,
}

impl AuthRequest {
    /// Create a new authentication request.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "auth",
            key,
            secret,
        }
    }
}

/// Subscription request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionRequest {
    /// Action: "subscribe" or "unsubscribe"
    pub action: String,

    /// Trade symbols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<String>,

    /// Quote symbols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<String>,

    /// Bar symbols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bars: Vec<String>,

    /// Status symbols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
}

impl SubscriptionRequest {
    /// Create a subscribe request for a subscription set.
    #[must_use]
    pub fn subscribe(set: &SubscriptionSet) -> Self {
        Self::for_action("subscribe", set)
    }

    /// Create an unsubscribe request for a subscription set.
    #[must_use]
    pub fn unsubscribe(set: &SubscriptionSet) -> Self {
        Self::for_action("unsubscribe", set)
    }

    fn for_action(action: &str, set: &SubscriptionSet) -> Self {
        Self {
            action: action.to_string(),
            trades: set.symbols_for(ChannelKind::Trades),
            quotes: set.symbols_for(ChannelKind::Quotes),
            bars: set.symbols_for(ChannelKind::Bars),
            statuses: set.symbols_for(ChannelKind::Statuses),
        }
    }
}

// =============================================================================
// Unified Incoming Message Enum
// =============================================================================

/// Any message the stream can deliver, control and data alike.
///
/// Control records share the connection with data records; the client
/// handles control messages itself and forwards data messages as
/// canonical messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Connection/authentication success
    Success(SuccessMessage),

    /// Error message
    Error(ErrorMessage),

    /// Subscription confirmation
    Subscription(SubscriptionMessage),

    /// Stock quote
    Quote(QuoteMessage),

    /// Stock trade
    Trade(TradeMessage),

    /// Stock bar
    Bar(BarMessage),

    /// Trading status
    Status(StatusMessage),
}

impl WireMessage {
    /// Convert a data message into its canonical form.
    ///
    /// Control messages have no canonical counterpart and return `None`.
    /// Zero quote prices are normalized to an absent side here, so the
    /// rest of the pipeline never sees Alpaca's zero-means-empty idiom.
    #[must_use]
    pub fn into_canonical(self) -> Option<CanonicalMessage> {
        match self {
            Self::Quote(q) => Some(CanonicalMessage::Quote(Quote {
                symbol: q.symbol,
                bid_price: q.bid_price.filter(|p| !p.is_zero()),
                bid_size: q.bid_size,
                ask_price: q.ask_price.filter(|p| !p.is_zero()),
                ask_size: q.ask_size,
                timestamp: q.timestamp,
            })),
            Self::Trade(t) => Some(CanonicalMessage::Trade(Trade {
                symbol: t.symbol,
                price: t.price,
                size: t.size,
                timestamp: t.timestamp,
            })),
            Self::Bar(b) => Some(CanonicalMessage::Bar(Bar {
                symbol: b.symbol,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
                vwap: b.vwap,
                trade_count: b.trade_count,
                timestamp: b.timestamp,
            })),
            Self::Status(s) => Some(CanonicalMessage::Status(Status {
                symbol: s.symbol,
                status_code: s.status_code,
                status_message: s.status_message,
            })),
            Self::Success(_) | Self::Error(_) | Self::Subscription(_) => None,
        }
    }
}
