//! Market Data Streaming Types
//!
//! Core domain types for market data: canonical ticks and bars on the
//! outbound side, provider-native quote and chart records on the inbound
//! side. Canonical types are provider-agnostic and are what downstream
//! consumers see.

mod inbound;

pub use inbound::{InboundBatch, InstrumentType, LevelOneQuote, MinuteChartData};

use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;

use super::instrument::InstrumentId;

/// Period of every bar produced from the minute chart feed.
pub const ONE_MINUTE: Duration = Duration::from_secs(60);

/// Canonical quote event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalTick {
    /// Quote time in the exchange timezone.
    pub time: DateTime<Tz>,
    /// Quoted instrument.
    pub instrument: InstrumentId,
    /// Bid size.
    pub bid_size: Decimal,
    /// Bid price.
    pub bid_price: Decimal,
    /// Ask size.
    pub ask_size: Decimal,
    /// Ask price.
    pub ask_price: Decimal,
}

/// Canonical OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalBar {
    /// Bar start time in the exchange timezone.
    pub time: DateTime<Tz>,
    /// Instrument the bar aggregates.
    pub instrument: InstrumentId,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
    /// Bar period.
    #[serde(skip)]
    pub period: Duration,
}

/// Event delivered to the downstream sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarketEvent {
    /// Quote update.
    Tick(CanonicalTick),
    /// Minute bar.
    Bar(CanonicalBar),
}

impl MarketEvent {
    /// Instrument the event refers to.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentId {
        match self {
            Self::Tick(tick) => &tick.instrument,
            Self::Bar(bar) => &bar.instrument,
        }
    }

    /// Event time in the exchange timezone.
    #[must_use]
    pub const fn time(&self) -> &DateTime<Tz> {
        match self {
            Self::Tick(tick) => &tick.time,
            Self::Bar(bar) => &bar.time,
        }
    }
}
