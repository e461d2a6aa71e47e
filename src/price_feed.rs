// Mark price source
//
// The engine never owns prices. It asks an injected source for the current mark of a
// symbol before a transaction starts. PriceCache keeps the last update per symbol and
// stops answering once it is older than the staleness window. FixedPrices is for tests.

use crate::clock::Clock;
use crate::types::{Price, SymbolId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub trait MarkPriceSource: Send + Sync {
    /// Current mark price, or `None` when no fresh price is known.
    fn mark_price(&self, symbol: &SymbolId) -> Option<Price>;
}

/// A single price observation from the external source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl PriceUpdate {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self { price, timestamp }
    }

    pub fn is_stale(&self, now: Timestamp, max_staleness_ms: i64) -> bool {
        now.millis_since(self.timestamp) > max_staleness_ms
    }
}

/// Latest-price cache with a staleness window.
pub struct PriceCache {
    latest: RwLock<HashMap<SymbolId, PriceUpdate>>,
    max_staleness_ms: i64,
    clock: Arc<dyn Clock>,
}

impl PriceCache {
    pub fn new(max_staleness_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            max_staleness_ms,
            clock,
        }
    }

    /// Record an update. Older updates than the cached one are ignored.
    pub fn submit(&self, symbol: SymbolId, update: PriceUpdate) {
        let mut latest = self.latest.write();
        match latest.get(&symbol) {
            Some(existing) if existing.timestamp > update.timestamp => {}
            _ => {
                latest.insert(symbol, update);
            }
        }
    }

    /// Record a price observed now.
    pub fn set_price(&self, symbol: SymbolId, price: Price) {
        let now = self.clock.now();
        self.submit(symbol, PriceUpdate::new(price, now));
    }

    pub fn last_update(&self, symbol: &SymbolId) -> Option<PriceUpdate> {
        self.latest.read().get(symbol).copied()
    }
}

impl MarkPriceSource for PriceCache {
    fn mark_price(&self, symbol: &SymbolId) -> Option<Price> {
        let update = self.last_update(symbol)?;
        if update.is_stale(self.clock.now(), self.max_staleness_ms) {
            return None;
        }
        Some(update.price)
    }
}

/// Deterministic prices that never go stale.
#[derive(Debug, Default)]
pub struct FixedPrices {
    prices: RwLock<HashMap<SymbolId, Price>>,
}

impl FixedPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, symbol: SymbolId, price: Price) -> Self {
        self.set(symbol, price);
        self
    }

    pub fn set(&self, symbol: SymbolId, price: Price) {
        self.prices.write().insert(symbol, price);
    }

    pub fn remove(&self, symbol: &SymbolId) {
        self.prices.write().remove(symbol);
    }
}

impl MarkPriceSource for FixedPrices {
    fn mark_price(&self, symbol: &SymbolId) -> Option<Price> {
        self.prices.read().get(symbol).copied()
    }
}

impl<T: MarkPriceSource + ?Sized> MarkPriceSource for Arc<T> {
    fn mark_price(&self, symbol: &SymbolId) -> Option<Price> {
        (**self).mark_price(symbol)
    }
}
