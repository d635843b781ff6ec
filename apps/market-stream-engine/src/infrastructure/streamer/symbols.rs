//! Streamer ticker conventions.
//!
//! | Category       | Canonical  | Streamer     |
//! |----------------|------------|--------------|
//! | Equity, Option | `AAPL`     | `AAPL`       |
//! | Index          | `SPX`      | `$SPX`       |
//! | Future         | `ES`       | `/ES`        |
//! | Future option  | `ESZ4C5000`| `./ESZ4C5000`|
//! | Forex          | `EURUSD`   | `EUR/USD`    |

use crate::application::ports::IdentifierMapper;
use crate::domain::instrument::{InstrumentId, Market, SecurityCategory};

const INDEX_PREFIX: &str = "$";
const FUTURE_PREFIX: &str = "/";
const FUTURE_OPTION_PREFIX: &str = "./";
const FOREX_SEPARATOR: char = '/';

/// Maps canonical instruments to streamer tickers and back.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamerSymbolMapper;

impl StreamerSymbolMapper {
    /// Create a mapper.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl IdentifierMapper for StreamerSymbolMapper {
    fn to_provider_ticker(&self, instrument: &InstrumentId) -> String {
        let symbol = instrument.symbol();
        match instrument.category() {
            SecurityCategory::Index => prefixed(INDEX_PREFIX, symbol),
            SecurityCategory::Future => prefixed(FUTURE_PREFIX, symbol),
            SecurityCategory::FutureOption => prefixed(FUTURE_OPTION_PREFIX, symbol),
            SecurityCategory::Forex => forex_pair(symbol),
            _ => symbol.to_string(),
        }
    }

    /// A streamer prefix decides the category over the one supplied, so
    /// `$SPX` on the equity chart service still resolves to the index.
    fn to_instrument(&self, provider_ticker: &str, category: SecurityCategory) -> InstrumentId {
        let category = category_from_prefix(provider_ticker).unwrap_or(category);
        let symbol = match category {
            SecurityCategory::Index => provider_ticker.trim_start_matches(INDEX_PREFIX).to_string(),
            SecurityCategory::FutureOption => provider_ticker
                .strip_prefix(FUTURE_OPTION_PREFIX)
                .unwrap_or(provider_ticker)
                .to_string(),
            SecurityCategory::Future => provider_ticker
                .strip_prefix(FUTURE_PREFIX)
                .unwrap_or(provider_ticker)
                .to_string(),
            SecurityCategory::Forex => provider_ticker.replace(FOREX_SEPARATOR, ""),
            _ => provider_ticker.to_string(),
        };
        let market = Market::for_category(category).unwrap_or(Market::Usa);
        InstrumentId::new(symbol, category, market)
    }
}

fn category_from_prefix(provider_ticker: &str) -> Option<SecurityCategory> {
    if provider_ticker.starts_with(FUTURE_OPTION_PREFIX) {
        Some(SecurityCategory::FutureOption)
    } else if provider_ticker.starts_with(FUTURE_PREFIX) {
        Some(SecurityCategory::Future)
    } else if provider_ticker.starts_with(INDEX_PREFIX) {
        Some(SecurityCategory::Index)
    } else {
        None
    }
}

fn prefixed(prefix: &str, symbol: &str) -> String {
    if symbol.starts_with(prefix) {
        symbol.to_string()
    } else {
        format!("{prefix}{symbol}")
    }
}

fn forex_pair(symbol: &str) -> String {
    if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_alphabetic()) {
        format!("{}{FOREX_SEPARATOR}{}", &symbol[..3], &symbol[3..])
    } else {
        symbol.to_string()
    }
}
