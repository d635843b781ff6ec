//! Live subscription registry.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::domain::instrument::InstrumentId;

/// A provider ticker paired with the instrument it streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Provider ticker (registry key).
    pub provider_ticker: String,
    /// Canonical instrument.
    pub instrument: InstrumentId,
}

/// Concurrent set of currently subscribed (provider ticker → instrument)
/// pairs.
///
/// Every operation takes the lock once, so each call is linearizable and a
/// snapshot is always a consistent point-in-time view. Snapshots are ordered
/// by provider ticker.
///
/// # Example
///
/// ```rust
/// use market_stream_engine::domain::instrument::InstrumentId;
/// use market_stream_engine::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
/// assert!(registry.add("AAPL", InstrumentId::equity("AAPL")));
/// assert!(!registry.add("AAPL", InstrumentId::equity("AAPL")));
/// assert_eq!(registry.len(), 1);
/// assert!(registry.remove("AAPL"));
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<BTreeMap<String, InstrumentId>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ticker.
    ///
    /// Returns `false` without touching the existing entry when the ticker is
    /// already registered.
    pub fn add(&self, provider_ticker: impl Into<String>, instrument: InstrumentId) -> bool {
        let mut entries = self.entries.write();
        match entries.entry(provider_ticker.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(instrument);
                true
            }
        }
    }

    /// Unregister a ticker. Returns whether it was present.
    pub fn remove(&self, provider_ticker: &str) -> bool {
        self.entries.write().remove(provider_ticker).is_some()
    }

    /// Instrument registered under a ticker.
    #[must_use]
    pub fn get(&self, provider_ticker: &str) -> Option<InstrumentId> {
        self.entries.read().get(provider_ticker).cloned()
    }

    /// Whether a ticker is registered.
    #[must_use]
    pub fn contains(&self, provider_ticker: &str) -> bool {
        self.entries.read().contains_key(provider_ticker)
    }

    /// Point-in-time copy of every subscription, ordered by ticker.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries
            .read()
            .iter()
            .map(|(ticker, instrument)| Subscription {
                provider_ticker: ticker.clone(),
                instrument: instrument.clone(),
            })
            .collect()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
