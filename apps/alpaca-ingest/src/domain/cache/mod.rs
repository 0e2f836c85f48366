//! Latest-Value Cache
//!
//! Per-symbol snapshot of the most recent quote and bar, readable
//! concurrently while the ingestion pipeline writes. Backed by a sharded
//! concurrent map so a reader never observes a torn entry: each update
//! merges into the existing entry under the entry's shard lock, so a bar
//! update can never erase a previously cached quote and vice versa.
//!
//! # Derived Pricing
//!
//! `current_price` prefers the midpoint of a two-sided quote and falls
//! back to the latest bar close. Symbols with neither have no price.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::market_data::{Bar, Quote, Symbol};

/// Shared handle to the latest-value cache.
pub type SharedCache = Arc<LatestValueCache>;

// =============================================================================
// Cache Entry
// =============================================================================

/// Most recent market data snapshot for a single symbol.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// Latest quote, if any has arrived.
    pub quote: Option<Quote>,
    /// Latest completed bar, if any has arrived.
    pub bar: Option<Bar>,
}

impl CacheEntry {
    /// Best-effort current price for the symbol.
    ///
    /// Midpoint of a two-sided quote when available, otherwise the latest
    /// bar close. One-sided quotes never contribute a price.
    #[must_use]
    pub fn current_price(&self) -> Option<Decimal> {
        if let Some(quote) = &self.quote
            && let Some(mid) = quote.midpoint()
        {
            return Some(mid);
        }
        self.bar.as_ref().map(|bar| bar.close)
    }
}

// =============================================================================
// Latest-Value Cache
// =============================================================================

/// Concurrently readable per-symbol latest-value store.
///
/// Writers are the dispatcher task; readers are arbitrary consumer tasks.
/// All operations are keyed by symbol and lock only that symbol's shard.
#[derive(Debug, Default)]
pub struct LatestValueCache {
    entries: DashMap<Symbol, CacheEntry>,
}

impl LatestValueCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entry for a symbol, if one exists.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<CacheEntry> {
        self.entries.get(symbol).map(|entry| entry.clone())
    }

    /// Latest quote for a symbol.
    #[must_use]
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.entries.get(symbol).and_then(|entry| entry.quote.clone())
    }

    /// Latest bar for a symbol.
    #[must_use]
    pub fn bar(&self, symbol: &str) -> Option<Bar> {
        self.entries.get(symbol).and_then(|entry| entry.bar.clone())
    }

    /// Best-effort current price for a symbol.
    #[must_use]
    pub fn current_price(&self, symbol: &str) -> Option<Decimal> {
        self.entries
            .get(symbol)
            .and_then(|entry| entry.current_price())
    }

    /// Merge a new quote into the symbol's entry, preserving any cached bar.
    pub fn update_quote(&self, quote: Quote) {
        let mut entry = self.entries.entry(quote.symbol.clone()).or_default();
        entry.quote = Some(quote);
    }

    /// Merge a new bar into the symbol's entry, preserving any cached quote.
    pub fn update_bar(&self, bar: Bar) {
        let mut entry = self.entries.entry(bar.symbol.clone()).or_default();
        entry.bar = Some(bar);
    }

    /// Symbols with at least one cached value (unordered).
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of symbols with cached data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
