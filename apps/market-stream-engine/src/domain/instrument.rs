//! Instrument Identity
//!
//! Canonical, market-agnostic handles for tradable instruments together with
//! the coarse classification that drives provider channel selection.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Security Category
// =============================================================================

/// Coarse classification of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCategory {
    /// Common stock or ETF.
    Equity,
    /// Cash index (not directly tradable, quoted like an equity).
    Index,
    /// Equity option.
    Option,
    /// Option on a cash index.
    IndexOption,
    /// Spot currency pair.
    Forex,
    /// Futures contract.
    Future,
    /// Option on a futures contract.
    FutureOption,
    /// Contract for difference.
    Cfd,
    /// Crypto currency pair.
    Crypto,
    /// Spot commodity.
    Commodity,
}

impl SecurityCategory {
    /// Get all categories.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Equity,
            Self::Index,
            Self::Option,
            Self::IndexOption,
            Self::Forex,
            Self::Future,
            Self::FutureOption,
            Self::Cfd,
            Self::Crypto,
            Self::Commodity,
        ]
    }

    /// Category name as used in configuration and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Index => "index",
            Self::Option => "option",
            Self::IndexOption => "index_option",
            Self::Forex => "forex",
            Self::Future => "future",
            Self::FutureOption => "future_option",
            Self::Cfd => "cfd",
            Self::Crypto => "crypto",
            Self::Commodity => "commodity",
        }
    }

    /// Parse a category name (case-insensitive).
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        Self::all().iter().copied().find(|c| c.as_str() == lower)
    }
}

impl fmt::Display for SecurityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Market
// =============================================================================

/// Market an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    /// US equity and option venues.
    Usa,
    /// CME Group futures venues.
    Cme,
    /// OANDA forex.
    Oanda,
}

impl Market {
    /// Default market for a category the streaming provider supports.
    ///
    /// Returns `None` for categories the provider has no market for, which is
    /// what makes them unsubscribable.
    #[must_use]
    pub const fn for_category(category: SecurityCategory) -> Option<Self> {
        match category {
            SecurityCategory::Equity
            | SecurityCategory::Index
            | SecurityCategory::Option
            | SecurityCategory::IndexOption => Some(Self::Usa),
            SecurityCategory::Future | SecurityCategory::FutureOption => Some(Self::Cme),
            SecurityCategory::Forex => Some(Self::Oanda),
            SecurityCategory::Cfd | SecurityCategory::Crypto | SecurityCategory::Commodity => None,
        }
    }

    /// Market name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usa => "usa",
            Self::Cme => "cme",
            Self::Oanda => "oanda",
        }
    }
}

// =============================================================================
// Instrument Identifier
// =============================================================================

/// Canonical handle uniquely naming a tradable instrument.
///
/// Immutable once created; clone freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId {
    symbol: String,
    category: SecurityCategory,
    market: Market,
}

impl InstrumentId {
    /// Create an identifier.
    #[must_use]
    pub fn new(symbol: impl Into<String>, category: SecurityCategory, market: Market) -> Self {
        Self {
            symbol: symbol.into(),
            category,
            market,
        }
    }

    /// Create an identifier on the category's default market.
    ///
    /// Returns `None` when the category has no default market.
    #[must_use]
    pub fn on_default_market(
        symbol: impl Into<String>,
        category: SecurityCategory,
    ) -> Option<Self> {
        Market::for_category(category).map(|market| Self::new(symbol, category, market))
    }

    /// Create an equity identifier on the US market.
    #[must_use]
    pub fn equity(symbol: impl Into<String>) -> Self {
        Self::new(symbol, SecurityCategory::Equity, Market::Usa)
    }

    /// Create a futures identifier on CME.
    #[must_use]
    pub fn future(symbol: impl Into<String>) -> Self {
        Self::new(symbol, SecurityCategory::Future, Market::Cme)
    }

    /// Canonical symbol value.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Security category.
    #[must_use]
    pub const fn category(&self) -> SecurityCategory {
        self.category
    }

    /// Listing market.
    #[must_use]
    pub const fn market(&self) -> Market {
        self.market
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Kind of data a host subscription asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickType {
    /// Trade prints and trade bars.
    Trade,
    /// Bid/ask quotes.
    Quote,
    /// Open interest updates.
    OpenInterest,
}

impl TickType {
    /// Get all tick types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Trade, Self::Quote, Self::OpenInterest]
    }
}

/// Requested data granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Every tick.
    Tick,
    /// One-second bars.
    Second,
    /// One-minute bars.
    Minute,
    /// Hourly bars.
    Hour,
    /// Daily bars.
    Daily,
}

impl Resolution {
    /// Whether this resolution is served with tick events rather than bars.
    #[must_use]
    pub const fn is_tick(&self) -> bool {
        matches!(self, Self::Tick)
    }
}

/// A host request for a live data stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionRequest {
    /// Instrument to stream.
    pub instrument: InstrumentId,
    /// Desired granularity.
    pub resolution: Resolution,
    /// Kind of data.
    pub tick_type: TickType,
}

impl SubscriptionRequest {
    /// Create a request.
    #[must_use]
    pub const fn new(
        instrument: InstrumentId,
        resolution: Resolution,
        tick_type: TickType,
    ) -> Self {
        Self {
            instrument,
            resolution,
            tick_type,
        }
    }
}
