//! Deduplicating Dispatcher
//!
//! Single consumer of the canonical message stream. For every message it
//! applies the per-kind policy (dedup for quotes, cache updates for quotes
//! and bars, pass-through for trades and statuses), updates the
//! latest-value cache, and fans the surviving messages out to the
//! topic-keyed event hub.
//!
//! # Throughput Reporting
//!
//! Message counts are reported at info level once per reporting window.
//! The check runs on message arrival, so a silent stream produces no
//! report until the next message lands; the final partial window is
//! never flushed.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::domain::cache::SharedCache;
use crate::domain::market_data::{CanonicalMessage, Symbol, SymbolAllowList};
use crate::infrastructure::broadcast::EventHub;

/// Default length of the throughput reporting window.
pub const DEFAULT_REPORT_WINDOW: Duration = Duration::from_secs(60);

// =============================================================================
// Outbound Events
// =============================================================================

/// The kind of an outbound event, used to derive its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Deduplicated quote update.
    Quote,
    /// Completed bar.
    Bar,
    /// Executed trade.
    Trade,
    /// Trading status change.
    Status,
    /// Connection lifecycle change.
    Connection,
}

impl EventKind {
    const fn channel_name(self) -> &'static str {
        match self {
            Self::Quote => "quotes",
            Self::Bar => "bars",
            Self::Trade => "trades",
            Self::Status => "statuses",
            Self::Connection => "connection",
        }
    }
}

/// An event published to the hub after dispatch policy has been applied.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Symbol the event refers to; absent for connection events.
    pub symbol: Option<Symbol>,
    /// The canonical message payload.
    pub message: CanonicalMessage,
}

impl OutboundEvent {
    /// Topic the event is published on: `"<kind>:<symbol>"` for market
    /// data (e.g. `"quotes:AAPL"`), `"connection"` for lifecycle events.
    #[must_use]
    pub fn topic(&self) -> String {
        match &self.symbol {
            Some(symbol) => format!("{}:{symbol}", self.kind.channel_name()),
            None => self.kind.channel_name().to_string(),
        }
    }
}

// =============================================================================
// Throughput Counters
// =============================================================================

/// Per-window message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThroughputCounters {
    /// Quotes emitted (after dedup).
    pub quotes: u64,
    /// Quotes suppressed as duplicates.
    pub quotes_suppressed: u64,
    /// Bars emitted.
    pub bars: u64,
    /// Trades emitted.
    pub trades: u64,
    /// Statuses emitted.
    pub statuses: u64,
}

impl ThroughputCounters {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Owns dedup state and throughput counters; consumes canonical messages.
#[derive(Debug)]
pub struct Dispatcher {
    cache: SharedCache,
    allow_list: SymbolAllowList,
    last_pair: HashMap<Symbol, (Option<Decimal>, Option<Decimal>)>,
    counters: ThroughputCounters,
    report_window: Duration,
    window_start: Instant,
}

impl Dispatcher {
    /// Create a dispatcher over a cache and a symbol allow-list.
    #[must_use]
    pub fn new(cache: SharedCache, allow_list: SymbolAllowList, report_window: Duration) -> Self {
        Self {
            cache,
            allow_list,
            last_pair: HashMap::new(),
            counters: ThroughputCounters::default(),
            report_window,
            window_start: Instant::now(),
        }
    }

    /// Apply dispatch policy to one message.
    ///
    /// Returns the events to publish (zero or one per input message) and
    /// updates the cache and counters as a side effect.
    pub fn handle(&mut self, message: CanonicalMessage) -> Vec<OutboundEvent> {
        if let Some(symbol) = message.symbol()
            && !self.allow_list.contains(symbol)
        {
            warn!(symbol = %symbol, "discarding message for unconfigured symbol");
            return Vec::new();
        }

        let events = match message {
            CanonicalMessage::Quote(quote) => {
                let pair = quote.price_pair();
                let symbol = quote.symbol.clone();
                let emit = match self.last_pair.get(&symbol) {
                    Some(prev) => *prev != pair,
                    // First quote for the symbol: suppress only when both
                    // sides are absent, since it carries no price at all.
                    None => pair != (None, None),
                };
                if emit {
                    self.last_pair.insert(symbol.clone(), pair);
                    self.cache.update_quote(quote.clone());
                    self.counters.quotes += 1;
                    vec![OutboundEvent {
                        kind: EventKind::Quote,
                        symbol: Some(symbol),
                        message: CanonicalMessage::Quote(quote),
                    }]
                } else {
                    self.counters.quotes_suppressed += 1;
                    trace!(symbol = %symbol, "suppressed duplicate quote");
                    Vec::new()
                }
            }
            CanonicalMessage::Bar(bar) => {
                let symbol = bar.symbol.clone();
                self.cache.update_bar(bar.clone());
                self.counters.bars += 1;
                vec![OutboundEvent {
                    kind: EventKind::Bar,
                    symbol: Some(symbol),
                    message: CanonicalMessage::Bar(bar),
                }]
            }
            CanonicalMessage::Trade(trade) => {
                let symbol = trade.symbol.clone();
                self.counters.trades += 1;
                vec![OutboundEvent {
                    kind: EventKind::Trade,
                    symbol: Some(symbol),
                    message: CanonicalMessage::Trade(trade),
                }]
            }
            CanonicalMessage::Status(status) => {
                if !status.is_normal_trading() {
                    warn!(
                        symbol = %status.symbol,
                        code = status.status_code.as_deref().unwrap_or("?"),
                        message = status.status_message.as_deref().unwrap_or(""),
                        "non-normal trading status"
                    );
                }
                let symbol = status.symbol.clone();
                self.counters.statuses += 1;
                vec![OutboundEvent {
                    kind: EventKind::Status,
                    symbol: Some(symbol),
                    message: CanonicalMessage::Status(status),
                }]
            }
            CanonicalMessage::Connection(event) => {
                debug!(phase = event.phase.as_str(), attempt = event.attempt, "connection event");
                vec![OutboundEvent {
                    kind: EventKind::Connection,
                    symbol: None,
                    message: CanonicalMessage::Connection(event),
                }]
            }
        };

        self.maybe_report();
        events
    }

    /// Current counters for the in-progress window.
    #[must_use]
    pub const fn counters(&self) -> ThroughputCounters {
        self.counters
    }

    fn maybe_report(&mut self) {
        if self.window_start.elapsed() < self.report_window {
            return;
        }
        let c = self.counters;
        info!(
            window_secs = self.report_window.as_secs(),
            quotes = c.quotes,
            quotes_suppressed = c.quotes_suppressed,
            bars = c.bars,
            trades = c.trades,
            statuses = c.statuses,
            "throughput report"
        );
        self.counters.reset();
        self.window_start = Instant::now();
    }

    /// Consume the canonical message stream until it closes or the token
    /// is cancelled, publishing surviving events to the hub.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<CanonicalMessage>,
        hub: std::sync::Arc<EventHub>,
        cancel: CancellationToken,
    ) {
        info!(symbols = self.allow_list.len(), "dispatcher started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("dispatcher shutting down");
                    break;
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        info!("canonical message channel closed");
                        break;
                    };
                    for event in self.handle(msg) {
                        hub.publish(event);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use std::sync::Arc;

    use crate::domain::cache::LatestValueCache;
    use crate::domain::market_data::{
        Bar, ConnectionEvent, ConnectionPhase, Quote, Status, Trade,
    };

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn dispatcher(symbols: &[&str]) -> Dispatcher {
        let cache = Arc::new(LatestValueCache::new());
        let allow = SymbolAllowList::new(symbols.iter().map(|s| (*s).to_string()));
        Dispatcher::new(cache, allow, DEFAULT_REPORT_WINDOW)
    }

    fn quote(symbol: &str, bid: Option<&str>, ask: Option<&str>) -> CanonicalMessage {
        CanonicalMessage::Quote(Quote {
            symbol: symbol.to_string(),
            bid_price: bid.map(dec),
            bid_size: 100,
            ask_price: ask.map(dec),
            ask_size: 200,
            timestamp: Utc::now(),
        })
    }

    fn bar(symbol: &str, close: &str) -> CanonicalMessage {
        CanonicalMessage::Bar(Bar {
            symbol: symbol.to_string(),
            open: dec("185.00"),
            high: dec("185.60"),
            low: dec("184.90"),
            close: dec(close),
            volume: 12_000,
            vwap: None,
            trade_count: None,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn first_quote_is_emitted_and_cached() {
        let mut d = dispatcher(&["AAPL"]);
        let events = d.handle(quote("AAPL", Some("185.48"), Some("185.52")));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), "quotes:AAPL");
        assert_eq!(d.cache.current_price("AAPL"), Some(dec("185.50")));
        assert_eq!(d.counters().quotes, 1);
    }

    #[test]
    fn identical_quote_is_suppressed() {
        let mut d = dispatcher(&["AAPL"]);
        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));
        let events = d.handle(quote("AAPL", Some("185.48"), Some("185.52")));

        assert!(events.is_empty());
        assert_eq!(d.counters().quotes, 1);
        assert_eq!(d.counters().quotes_suppressed, 1);
    }

    #[test]
    fn size_only_change_is_still_a_duplicate() {
        let mut d = dispatcher(&["AAPL"]);
        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));

        // Same prices, different sizes.
        let events = d.handle(CanonicalMessage::Quote(Quote {
            symbol: "AAPL".to_string(),
            bid_price: Some(dec("185.48")),
            bid_size: 999,
            ask_price: Some(dec("185.52")),
            ask_size: 999,
            timestamp: Utc::now(),
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn changed_pair_is_emitted() {
        let mut d = dispatcher(&["AAPL"]);
        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));
        let events = d.handle(quote("AAPL", Some("185.49"), Some("185.52")));

        assert_eq!(events.len(), 1);
        assert_eq!(d.counters().quotes, 2);
    }

    #[test]
    fn one_sided_transition_is_a_change() {
        let mut d = dispatcher(&["AAPL"]);
        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));
        let events = d.handle(quote("AAPL", Some("185.48"), None));

        assert_eq!(events.len(), 1);
    }

    #[test]
    fn first_quote_with_no_prices_is_suppressed() {
        let mut d = dispatcher(&["AAPL"]);
        let events = d.handle(quote("AAPL", None, None));

        assert!(events.is_empty());
        assert_eq!(d.counters().quotes_suppressed, 1);
        assert!(d.cache.quote("AAPL").is_none());
    }

    #[test]
    fn empty_pair_after_priced_pair_is_emitted() {
        let mut d = dispatcher(&["AAPL"]);
        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));
        let events = d.handle(quote("AAPL", None, None));

        assert_eq!(events.len(), 1);
    }

    #[test]
    fn dedup_state_is_per_symbol() {
        let mut d = dispatcher(&["AAPL", "MSFT"]);
        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));
        let events = d.handle(quote("MSFT", Some("185.48"), Some("185.52")));

        // Same pair, different symbol: not a duplicate.
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn bars_always_emit_and_cache() {
        let mut d = dispatcher(&["AAPL"]);
        let first = d.handle(bar("AAPL", "185.20"));
        let second = d.handle(bar("AAPL", "185.20"));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].topic(), "bars:AAPL");
        assert_eq!(d.cache.bar("AAPL").map(|b| b.close), Some(dec("185.20")));
        assert_eq!(d.counters().bars, 2);
    }

    #[test]
    fn trades_emit_without_caching() {
        let mut d = dispatcher(&["AAPL"]);
        let events = d.handle(CanonicalMessage::Trade(Trade {
            symbol: "AAPL".to_string(),
            price: dec("185.50"),
            size: 10,
            timestamp: Utc::now(),
        }));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), "trades:AAPL");
        assert!(d.cache.get("AAPL").is_none());
        assert_eq!(d.counters().trades, 1);
    }

    #[test]
    fn statuses_emit() {
        let mut d = dispatcher(&["AAPL"]);
        let events = d.handle(CanonicalMessage::Status(Status {
            symbol: "AAPL".to_string(),
            status_code: Some("H".to_string()),
            status_message: Some("Halted".to_string()),
        }));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), "statuses:AAPL");
        assert_eq!(d.counters().statuses, 1);
    }

    #[test]
    fn connection_events_use_connection_topic() {
        let mut d = dispatcher(&["AAPL"]);
        let events = d.handle(CanonicalMessage::Connection(ConnectionEvent {
            phase: ConnectionPhase::Authenticated,
            attempt: 0,
        }));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), "connection");
        assert!(events[0].symbol.is_none());
    }

    #[test]
    fn unknown_symbol_is_discarded() {
        let mut d = dispatcher(&["AAPL"]);
        let events = d.handle(quote("TSLA", Some("250.00"), Some("250.10")));

        assert!(events.is_empty());
        assert!(d.cache.get("TSLA").is_none());
        assert_eq!(d.counters().quotes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn counters_reset_after_report_window() {
        let cache = Arc::new(LatestValueCache::new());
        let allow = SymbolAllowList::new(["AAPL".to_string()]);
        let mut d = Dispatcher::new(cache, allow, Duration::from_secs(60));

        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));
        assert_eq!(d.counters().quotes, 1);

        tokio::time::advance(Duration::from_secs(61)).await;

        // The report fires on the next arrival, then the window restarts.
        d.handle(bar("AAPL", "185.20"));
        assert_eq!(d.counters().quotes, 0);
        assert_eq!(d.counters().bars, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_report_without_arrivals() {
        let cache = Arc::new(LatestValueCache::new());
        let allow = SymbolAllowList::new(["AAPL".to_string()]);
        let mut d = Dispatcher::new(cache, allow, Duration::from_secs(60));

        d.handle(quote("AAPL", Some("185.48"), Some("185.52")));
        tokio::time::advance(Duration::from_secs(300)).await;

        // Counters untouched while the stream is silent.
        assert_eq!(d.counters().quotes, 1);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn pair_strategy() -> impl Strategy<Value = (Option<u32>, Option<u32>)> {
            (proptest::option::of(0u32..4), proptest::option::of(0u32..4))
        }

        proptest! {
            // Every quote is either emitted or suppressed, and emission
            // happens exactly when the (bid, ask) pair changed (treating a
            // leading run of empty pairs as already-seen).
            #[test]
            fn emissions_match_pair_transitions(
                pairs in proptest::collection::vec(pair_strategy(), 0..32)
            ) {
                let mut d = dispatcher(&["AAPL"]);
                let mut last: Option<(Option<u32>, Option<u32>)> = None;
                let mut expected: u64 = 0;

                for pair in &pairs {
                    let should_emit = match last {
                        Some(prev) => prev != *pair,
                        None => *pair != (None, None),
                    };
                    if should_emit {
                        expected += 1;
                        last = Some(*pair);
                    }

                    let events = d.handle(CanonicalMessage::Quote(Quote {
                        symbol: "AAPL".to_string(),
                        bid_price: pair.0.map(Decimal::from),
                        bid_size: 1,
                        ask_price: pair.1.map(Decimal::from),
                        ask_size: 1,
                        timestamp: Utc::now(),
                    }));
                    prop_assert_eq!(events.len(), usize::from(should_emit));
                }

                prop_assert_eq!(d.counters().quotes, expected);
                prop_assert_eq!(
                    d.counters().quotes + d.counters().quotes_suppressed,
                    pairs.len() as u64
                );
            }
        }
    }
}
