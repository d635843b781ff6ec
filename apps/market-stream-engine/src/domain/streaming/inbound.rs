//! Provider-native inbound records.
//!
//! # Wire Format (JSON content entries)
//!
//! Level-one quote:
//! ```json
//! {"key": "AAPL", "bidPrice": 187.5, "bidSize": 3, "askPrice": 187.52, "askSize": 5,
//!  "quoteTime": 1700000000000}
//! ```
//!
//! Minute chart:
//! ```json
//! {"key": "/ES", "instrumentType": "FUTURE", "openPrice": 4501.25, "highPrice": 4503.0,
//!  "lowPrice": 4500.5, "closePrice": 4502.75, "volume": 1250, "chartTime": 1700000040000}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::channel::ChannelCategoryTag;

/// Level-one quote as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelOneQuote {
    /// Provider ticker.
    #[serde(rename = "key")]
    pub symbol: String,
    /// Best bid price.
    #[serde(default)]
    pub bid_price: f64,
    /// Best bid size.
    #[serde(default)]
    pub bid_size: f64,
    /// Best ask price.
    #[serde(default)]
    pub ask_price: f64,
    /// Best ask size.
    #[serde(default)]
    pub ask_size: f64,
    /// Quote time (epoch milliseconds on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub quote_time: DateTime<Utc>,
}

/// Provider instrument-type flag on chart records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentType {
    /// Equity or ETF.
    Equity,
    /// Futures contract.
    Future,
    /// Option on a futures contract.
    FutureOption,
    /// Cash index.
    Index,
    /// Equity option.
    Option,
    /// Currency pair.
    Forex,
    /// Any flag this engine does not know.
    #[serde(other)]
    Unknown,
}

/// One-minute OHLCV record as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteChartData {
    /// Provider ticker.
    #[serde(rename = "key")]
    pub symbol: String,
    /// Instrument-type flag.
    #[serde(default = "default_instrument_type")]
    pub instrument_type: InstrumentType,
    /// Open price.
    pub open_price: f64,
    /// High price.
    pub high_price: f64,
    /// Low price.
    pub low_price: f64,
    /// Close price.
    pub close_price: f64,
    /// Volume.
    #[serde(default)]
    pub volume: f64,
    /// Bar start (epoch milliseconds on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub chart_time: DateTime<Utc>,
}

const fn default_instrument_type() -> InstrumentType {
    InstrumentType::Unknown
}

/// Records drained from one provider queue, tagged by queue category.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundBatch {
    /// Drained level-one quotes, oldest first.
    Quotes(Vec<LevelOneQuote>),
    /// Drained minute chart records, oldest first.
    Charts(Vec<MinuteChartData>),
}

impl InboundBatch {
    /// Empty batch for a tag.
    #[must_use]
    pub const fn empty(tag: ChannelCategoryTag) -> Self {
        match tag {
            ChannelCategoryTag::Quote => Self::Quotes(Vec::new()),
            ChannelCategoryTag::Chart => Self::Charts(Vec::new()),
        }
    }

    /// Tag of the queue this batch came from.
    #[must_use]
    pub const fn tag(&self) -> ChannelCategoryTag {
        match self {
            Self::Quotes(_) => ChannelCategoryTag::Quote,
            Self::Charts(_) => ChannelCategoryTag::Chart,
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Quotes(q) => q.len(),
            Self::Charts(c) => c.len(),
        }
    }

    /// Whether the batch has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
