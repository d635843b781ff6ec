//! Provider Channel Policy
//!
//! The streaming provider exposes one logical feed per (data kind, asset
//! class) pair. This module names those feeds and fixes which of them an
//! instrument of a given category needs.
//!
//! | Category | Channels |
//! |---|---|
//! | Equity / Index | Quote(Equity), MinuteBar(Equity) |
//! | Option / IndexOption | Quote(Option) |
//! | Forex | Quote(Forex) |
//! | Future | Quote(Future), MinuteBar(Future) |
//! | FutureOption | Quote(FutureOption), MinuteBar(FutureOption) |

use std::fmt;

use serde::{Deserialize, Serialize};

use super::instrument::SecurityCategory;

// =============================================================================
// Channel Kinds
// =============================================================================

/// Level-one quote feed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuoteFeed {
    /// Equity and index quotes.
    Equity,
    /// Equity and index option quotes.
    Option,
    /// Forex quotes.
    Forex,
    /// Futures quotes.
    Future,
    /// Futures option quotes.
    FutureOption,
}

/// Minute chart feed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChartFeed {
    /// Equity and index minute bars.
    Equity,
    /// Futures minute bars.
    Future,
    /// Futures option minute bars.
    FutureOption,
}

/// A provider-side logical real-time feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Level-one quote feed.
    Quote(QuoteFeed),
    /// Minute chart (OHLCV) feed.
    MinuteBar(ChartFeed),
}

impl ChannelKind {
    /// Every channel kind the engine can ever open.
    pub const ALL: [Self; 8] = [
        Self::Quote(QuoteFeed::Equity),
        Self::Quote(QuoteFeed::Option),
        Self::Quote(QuoteFeed::Forex),
        Self::Quote(QuoteFeed::Future),
        Self::Quote(QuoteFeed::FutureOption),
        Self::MinuteBar(ChartFeed::Equity),
        Self::MinuteBar(ChartFeed::Future),
        Self::MinuteBar(ChartFeed::FutureOption),
    ];

    /// Provider service name carrying this channel.
    ///
    /// Futures and futures-option minute bars share one chart service.
    #[must_use]
    pub const fn service_name(&self) -> &'static str {
        match self {
            Self::Quote(QuoteFeed::Equity) => "QUOTE",
            Self::Quote(QuoteFeed::Option) => "OPTION",
            Self::Quote(QuoteFeed::Forex) => "LEVELONE_FOREX",
            Self::Quote(QuoteFeed::Future) => "LEVELONE_FUTURES",
            Self::Quote(QuoteFeed::FutureOption) => "LEVELONE_FUTURES_OPTIONS",
            Self::MinuteBar(ChartFeed::Equity) => "CHART_EQUITY",
            Self::MinuteBar(ChartFeed::Future | ChartFeed::FutureOption) => "CHART_FUTURES",
        }
    }

    /// Category tag of the inbound queue this channel feeds.
    #[must_use]
    pub const fn category_tag(&self) -> ChannelCategoryTag {
        match self {
            Self::Quote(_) => ChannelCategoryTag::Quote,
            Self::MinuteBar(_) => ChannelCategoryTag::Chart,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote(feed) => write!(f, "quote:{feed:?}"),
            Self::MinuteBar(feed) => write!(f, "minute_bar:{feed:?}"),
        }
    }
}

/// Inbound queue category a data-received notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelCategoryTag {
    /// Level-one quote records.
    Quote,
    /// Minute chart records.
    Chart,
}

impl ChannelCategoryTag {
    /// Both tags.
    pub const ALL: [Self; 2] = [Self::Quote, Self::Chart];

    /// Tag name for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Chart => "chart",
        }
    }
}

// =============================================================================
// Channel Policy
// =============================================================================

const EQUITY_CHANNELS: &[ChannelKind] = &[
    ChannelKind::Quote(QuoteFeed::Equity),
    ChannelKind::MinuteBar(ChartFeed::Equity),
];
const OPTION_CHANNELS: &[ChannelKind] = &[ChannelKind::Quote(QuoteFeed::Option)];
const FOREX_CHANNELS: &[ChannelKind] = &[ChannelKind::Quote(QuoteFeed::Forex)];
const FUTURE_CHANNELS: &[ChannelKind] = &[
    ChannelKind::Quote(QuoteFeed::Future),
    ChannelKind::MinuteBar(ChartFeed::Future),
];
const FUTURE_OPTION_CHANNELS: &[ChannelKind] = &[
    ChannelKind::Quote(QuoteFeed::FutureOption),
    ChannelKind::MinuteBar(ChartFeed::FutureOption),
];

/// Channels an instrument of `category` needs.
///
/// An empty slice means the category is not subscribable.
#[must_use]
pub const fn channels_for(category: SecurityCategory) -> &'static [ChannelKind] {
    match category {
        SecurityCategory::Equity | SecurityCategory::Index => EQUITY_CHANNELS,
        SecurityCategory::Option | SecurityCategory::IndexOption => OPTION_CHANNELS,
        SecurityCategory::Forex => FOREX_CHANNELS,
        SecurityCategory::Future => FUTURE_CHANNELS,
        SecurityCategory::FutureOption => FUTURE_OPTION_CHANNELS,
        SecurityCategory::Cfd | SecurityCategory::Crypto | SecurityCategory::Commodity => &[],
    }
}

/// Whether the provider can stream `category` at all.
#[must_use]
pub const fn is_subscribable(category: SecurityCategory) -> bool {
    !channels_for(category).is_empty()
}

/// Channels to close when nothing is subscribed any more.
#[must_use]
pub const fn teardown_channels() -> &'static [ChannelKind] {
    &ChannelKind::ALL
}
