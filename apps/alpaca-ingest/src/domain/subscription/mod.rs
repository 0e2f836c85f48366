//! Subscription Bookkeeping
//!
//! Channel kinds and the symbol sets subscribed per kind. The desired
//! subscription set is derived from the configured allow-list; the
//! coordinator drives the server-side set toward it.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::market_data::{Symbol, SymbolAllowList};

// =============================================================================
// Channel Kinds
// =============================================================================

/// A market data channel kind on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// OHLCV aggregates.
    Bars,
    /// Best bid/ask updates.
    Quotes,
    /// Executed trades.
    Trades,
    /// Trading status changes.
    Statuses,
}

impl ChannelKind {
    /// All channel kinds.
    pub const ALL: [Self; 4] = [Self::Bars, Self::Quotes, Self::Trades, Self::Statuses];

    /// Channel name used in topics and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::Quotes => "quotes",
            Self::Trades => "trades",
            Self::Statuses => "statuses",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Subscription Set
// =============================================================================

/// The symbols subscribed (or to be subscribed) per channel kind.
///
/// Symbol sets are ordered so that serialized subscribe requests are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    channels: HashMap<ChannelKind, BTreeSet<Symbol>>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Desired subscriptions for an allow-list: bars, quotes, and statuses
    /// for every configured symbol. Trades are decoded when the server
    /// sends them but are never requested.
    #[must_use]
    pub fn desired_for(allow_list: &SymbolAllowList) -> Self {
        let symbols: BTreeSet<Symbol> = allow_list.iter().cloned().collect();
        let mut set = Self::new();
        if !symbols.is_empty() {
            set.channels.insert(ChannelKind::Bars, symbols.clone());
            set.channels.insert(ChannelKind::Quotes, symbols.clone());
            set.channels.insert(ChannelKind::Statuses, symbols);
        }
        set
    }

    /// Add a symbol to a channel.
    pub fn add(&mut self, kind: ChannelKind, symbol: Symbol) {
        self.channels.entry(kind).or_default().insert(symbol);
    }

    /// Iterate symbols for a channel kind, in order.
    pub fn iter_symbols(&self, kind: ChannelKind) -> impl Iterator<Item = &Symbol> {
        self.channels.get(&kind).into_iter().flatten()
    }

    /// Symbols for a channel kind as an owned, ordered vector.
    #[must_use]
    pub fn symbols_for(&self, kind: ChannelKind) -> Vec<Symbol> {
        self.iter_symbols(kind).cloned().collect()
    }

    /// Check whether a channel contains a symbol.
    #[must_use]
    pub fn contains(&self, kind: ChannelKind, symbol: &str) -> bool {
        self.channels
            .get(&kind)
            .is_some_and(|set| set.contains(symbol))
    }

    /// Check whether no channels have any symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.values().all(BTreeSet::is_empty)
    }

    /// Total number of (channel, symbol) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.values().map(BTreeSet::len).sum()
    }

    /// Remove all symbols from all channels.
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_set_covers_bars_quotes_statuses() {
        let allow = SymbolAllowList::new(["AAPL".to_string(), "MSFT".to_string()]);
        let set = SubscriptionSet::desired_for(&allow);

        for kind in [ChannelKind::Bars, ChannelKind::Quotes, ChannelKind::Statuses] {
            assert!(set.contains(kind, "AAPL"), "missing AAPL in {kind}");
            assert!(set.contains(kind, "MSFT"), "missing MSFT in {kind}");
        }
        assert!(!set.contains(ChannelKind::Trades, "AAPL"));
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn desired_set_for_empty_allow_list_is_empty() {
        let set = SubscriptionSet::desired_for(&SymbolAllowList::default());
        assert!(set.is_empty());
    }

    #[test]
    fn symbols_for_is_ordered() {
        let allow =
            SymbolAllowList::new(["MSFT".to_string(), "AAPL".to_string(), "NVDA".to_string()]);
        let set = SubscriptionSet::desired_for(&allow);
        assert_eq!(
            set.symbols_for(ChannelKind::Quotes),
            vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()]
        );
    }

    #[test]
    fn add_and_clear() {
        let mut set = SubscriptionSet::new();
        set.add(ChannelKind::Trades, "AAPL".to_string());
        assert!(set.contains(ChannelKind::Trades, "AAPL"));
        assert_eq!(set.len(), 1);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn channel_kind_names() {
        assert_eq!(ChannelKind::Bars.as_str(), "bars");
        assert_eq!(ChannelKind::Quotes.to_string(), "quotes");
        assert_eq!(ChannelKind::ALL.len(), 4);
    }
}
