//! Host subscription demand tracking.
//!
//! Several host requests may ask for the same instrument. Demand is counted
//! per `TickType`, and only the first consumer of an instrument (refcount
//! 0→1) or the last one to leave (1→0) produces an upstream change.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::domain::instrument::{InstrumentId, TickType};

/// Unique identifier for a host consumer (one per stream request).
pub type ConsumerId = u64;

// =============================================================================
// Demand Changes
// =============================================================================

/// Instruments whose upstream subscription must change.
#[derive(Debug, Clone, Default)]
pub struct DemandChanges {
    /// Instruments that gained their first consumer.
    pub subscribe: Vec<InstrumentId>,
    /// Instruments that lost their last consumer.
    pub unsubscribe: Vec<InstrumentId>,
}

impl DemandChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    const fn subscribe_only(instruments: Vec<InstrumentId>) -> Self {
        Self {
            subscribe: instruments,
            unsubscribe: Vec::new(),
        }
    }

    const fn unsubscribe_only(instruments: Vec<InstrumentId>) -> Self {
        Self {
            subscribe: Vec::new(),
            unsubscribe: instruments,
        }
    }
}

// =============================================================================
// Per Tick-Type State
// =============================================================================

#[derive(Debug, Default)]
struct TypeDemand {
    consumer_instruments: HashMap<ConsumerId, HashSet<InstrumentId>>,
    refcount: HashMap<InstrumentId, usize>,
}

impl TypeDemand {
    fn add(&mut self, consumer: ConsumerId, instruments: &[InstrumentId]) -> Vec<InstrumentId> {
        let held = self.consumer_instruments.entry(consumer).or_default();
        let mut first = Vec::new();

        for instrument in instruments {
            if !held.insert(instrument.clone()) {
                continue;
            }

            let count = self.refcount.entry(instrument.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                first.push(instrument.clone());
            }
        }

        first
    }

    fn release(&mut self, instrument: &InstrumentId, last: &mut Vec<InstrumentId>) {
        if let Some(count) = self.refcount.get_mut(instrument) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.refcount.remove(instrument);
                last.push(instrument.clone());
            }
        }
    }

    fn remove(&mut self, consumer: ConsumerId, instruments: &[InstrumentId]) -> Vec<InstrumentId> {
        let Some(held) = self.consumer_instruments.get_mut(&consumer) else {
            return vec![];
        };

        let mut released = Vec::new();
        for instrument in instruments {
            if held.remove(instrument) {
                released.push(instrument.clone());
            }
        }
        if held.is_empty() {
            self.consumer_instruments.remove(&consumer);
        }

        let mut last = Vec::new();
        for instrument in &released {
            self.release(instrument, &mut last);
        }
        last
    }

    fn remove_consumer(&mut self, consumer: ConsumerId) -> Vec<InstrumentId> {
        let Some(held) = self.consumer_instruments.remove(&consumer) else {
            return vec![];
        };

        let mut last = Vec::new();
        for instrument in &held {
            self.release(instrument, &mut last);
        }
        last
    }
}

// =============================================================================
// Demand Tracker
// =============================================================================

/// Reference-counted demand per consumer and tick type.
///
/// # Example
///
/// ```rust
/// use market_stream_engine::domain::instrument::{InstrumentId, TickType};
/// use market_stream_engine::domain::subscription::DemandTracker;
///
/// let tracker = DemandTracker::new();
/// let aapl = InstrumentId::equity("AAPL");
///
/// let changes = tracker.add(1, TickType::Quote, &[aapl.clone()]);
/// assert_eq!(changes.subscribe, vec![aapl.clone()]);
///
/// // A second consumer shares the upstream subscription.
/// assert!(tracker.add(2, TickType::Quote, &[aapl.clone()]).is_empty());
/// assert!(tracker.remove(1, TickType::Quote, &[aapl.clone()]).is_empty());
///
/// let changes = tracker.remove(2, TickType::Quote, &[aapl.clone()]);
/// assert_eq!(changes.unsubscribe, vec![aapl]);
/// ```
#[derive(Debug, Default)]
pub struct DemandTracker {
    trade: RwLock<TypeDemand>,
    quote: RwLock<TypeDemand>,
    open_interest: RwLock<TypeDemand>,
}

impl DemandTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record demand from a consumer.
    pub fn add(
        &self,
        consumer: ConsumerId,
        tick_type: TickType,
        instruments: &[InstrumentId],
    ) -> DemandChanges {
        let first = self.state(tick_type).write().add(consumer, instruments);
        DemandChanges::subscribe_only(first)
    }

    /// Release demand from a consumer.
    pub fn remove(
        &self,
        consumer: ConsumerId,
        tick_type: TickType,
        instruments: &[InstrumentId],
    ) -> DemandChanges {
        let last = self.state(tick_type).write().remove(consumer, instruments);
        DemandChanges::unsubscribe_only(last)
    }

    /// Release everything a consumer holds, per tick type.
    pub fn consumer_disconnected(&self, consumer: ConsumerId) -> HashMap<TickType, DemandChanges> {
        let mut changes = HashMap::new();

        for tick_type in TickType::all() {
            let last = self.state(*tick_type).write().remove_consumer(consumer);
            if !last.is_empty() {
                changes.insert(*tick_type, DemandChanges::unsubscribe_only(last));
            }
        }

        changes
    }

    /// Whether any tick type still has a consumer for an instrument.
    #[must_use]
    pub fn is_demanded(&self, instrument: &InstrumentId) -> bool {
        TickType::all()
            .iter()
            .any(|tick_type| self.state(*tick_type).read().refcount.contains_key(instrument))
    }

    /// Statistics for a tick type.
    #[must_use]
    pub fn stats(&self, tick_type: TickType) -> DemandStats {
        let state = self.state(tick_type).read();
        DemandStats {
            instrument_count: state.refcount.len(),
            consumer_count: state.consumer_instruments.len(),
        }
    }

    const fn state(&self, tick_type: TickType) -> &RwLock<TypeDemand> {
        match tick_type {
            TickType::Trade => &self.trade,
            TickType::Quote => &self.quote,
            TickType::OpenInterest => &self.open_interest,
        }
    }
}

/// Demand statistics for one tick type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemandStats {
    /// Instruments with demand.
    pub instrument_count: usize,
    /// Consumers holding demand.
    pub consumer_count: usize,
}
