//! Engine Configuration Settings
//!
//! Configuration types for the streaming engine, loaded from environment
//! variables. Numeric settings that fail to parse fall back to their
//! defaults; values with no sensible fallback are errors.

use std::path::PathBuf;

use chrono_tz::Tz;

use crate::application::services::ChartCategoryPolicy;
use crate::domain::instrument::{InstrumentId, SecurityCategory};

/// Default exchange timezone for emitted event times.
pub const DEFAULT_EXCHANGE_TZ: Tz = chrono_tz::America::New_York;

/// Streaming account identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an account identifier.
    #[must_use]
    pub const fn new(account_id: String) -> Self {
        Self(account_id)
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccountId").field(&"[REDACTED]").finish()
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Capacity of the data-received notification queue.
    pub drain_queue_capacity: usize,
    /// Emitted event timezone.
    pub exchange_tz: Tz,
    /// Chart instrument-type resolution policy.
    pub chart_policy: ChartCategoryPolicy,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            drain_queue_capacity: 64,
            exchange_tz: DEFAULT_EXCHANGE_TZ,
            chart_policy: ChartCategoryPolicy::default(),
        }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Capacity of the tick broadcast channel.
    pub ticks_capacity: usize,
    /// Capacity of the bar broadcast channel.
    pub bars_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            ticks_capacity: 10_000,
            bars_capacity: 1_000,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Streaming account.
    pub account_id: AccountId,
    /// Ingestion settings.
    pub ingestion: IngestionSettings,
    /// Broadcast channel settings.
    pub broadcast: BroadcastSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Recorded frames to replay at startup.
    pub replay_file: Option<PathBuf>,
    /// Instruments to subscribe at startup.
    pub symbols: Vec<InstrumentId>,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// value cannot be interpreted.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`EngineConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let account_id = lookup("STREAM_ACCOUNT_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("STREAM_ACCOUNT_ID".to_string()))?;
        if account_id.trim().is_empty() {
            return Err(ConfigError::EmptyValue("STREAM_ACCOUNT_ID".to_string()));
        }

        let defaults = IngestionSettings::default();

        let exchange_tz = match lookup("STREAM_EXCHANGE_TZ") {
            Some(value) => value
                .trim()
                .parse::<Tz>()
                .map_err(|e| ConfigError::invalid("STREAM_EXCHANGE_TZ", &value, e.to_string()))?,
            None => defaults.exchange_tz,
        };

        let chart_policy = match lookup("STREAM_CHART_CATEGORY_POLICY") {
            Some(value) => ChartCategoryPolicy::from_config_value(&value).ok_or_else(|| {
                ConfigError::invalid(
                    "STREAM_CHART_CATEGORY_POLICY",
                    &value,
                    "expected `legacy` or `strict`",
                )
            })?,
            None => defaults.chart_policy,
        };

        let ingestion = IngestionSettings {
            drain_queue_capacity: parse_usize(
                &lookup,
                "STREAM_DRAIN_QUEUE_CAPACITY",
                defaults.drain_queue_capacity,
            ),
            exchange_tz,
            chart_policy,
        };

        let broadcast = BroadcastSettings {
            ticks_capacity: parse_usize(
                &lookup,
                "STREAM_TICKS_CAPACITY",
                BroadcastSettings::default().ticks_capacity,
            ),
            bars_capacity: parse_usize(
                &lookup,
                "STREAM_BARS_CAPACITY",
                BroadcastSettings::default().bars_capacity,
            ),
        };

        let server = ServerSettings {
            health_port: parse_u16(
                &lookup,
                "STREAM_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let replay_file = lookup("STREAM_REPLAY_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let symbols = match lookup("STREAM_SYMBOLS") {
            Some(value) => parse_symbols(&value)?,
            None => Vec::new(),
        };

        Ok(Self {
            account_id: AccountId::new(account_id),
            ingestion,
            broadcast,
            server,
            replay_file,
            symbols,
        })
    }
}

/// Parse a comma-separated `CATEGORY:SYMBOL` list.
///
/// # Errors
///
/// Returns an error for entries without a separator, with an unknown
/// category, or with a category that has no default market.
pub fn parse_symbols(value: &str) -> Result<Vec<InstrumentId>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (category, symbol) = entry.split_once(':').ok_or_else(|| {
                ConfigError::invalid("STREAM_SYMBOLS", entry, "expected CATEGORY:SYMBOL")
            })?;
            let category = SecurityCategory::from_str_case_insensitive(category.trim())
                .ok_or_else(|| ConfigError::invalid("STREAM_SYMBOLS", entry, "unknown category"))?;
            InstrumentId::on_default_market(symbol.trim(), category).ok_or_else(|| {
                ConfigError::invalid("STREAM_SYMBOLS", entry, "category has no streaming market")
            })
        })
        .collect()
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable value cannot be interpreted.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

fn parse_u16(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::instrument::Market;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_only_account() {
        let config =
            EngineConfig::from_lookup(lookup(&[("STREAM_ACCOUNT_ID", "123456789")])).unwrap();

        assert_eq!(config.account_id.as_str(), "123456789");
        assert_eq!(config.ingestion.exchange_tz, chrono_tz::America::New_York);
        assert_eq!(config.ingestion.chart_policy, ChartCategoryPolicy::LegacyFutureDefault);
        assert_eq!(config.ingestion.drain_queue_capacity, 64);
        assert_eq!(config.broadcast.ticks_capacity, 10_000);
        assert_eq!(config.broadcast.bars_capacity, 1_000);
        assert_eq!(config.server.health_port, 8083);
        assert!(config.replay_file.is_none());
        assert!(config.symbols.is_empty());
    }

    #[test]
    fn missing_account_is_error() {
        let err = EngineConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "STREAM_ACCOUNT_ID"));
    }

    #[test]
    fn empty_account_is_error() {
        let err = EngineConfig::from_lookup(lookup(&[("STREAM_ACCOUNT_ID", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("STREAM_ACCOUNT_ID", "acct"),
            ("STREAM_EXCHANGE_TZ", "America/Chicago"),
            ("STREAM_CHART_CATEGORY_POLICY", "strict"),
            ("STREAM_DRAIN_QUEUE_CAPACITY", "8"),
            ("STREAM_HEALTH_PORT", "9100"),
            ("STREAM_REPLAY_FILE", "/tmp/frames.jsonl"),
            ("STREAM_SYMBOLS", "equity:AAPL, future:ES"),
        ]))
        .unwrap();

        assert_eq!(config.ingestion.exchange_tz, chrono_tz::America::Chicago);
        assert_eq!(config.ingestion.chart_policy, ChartCategoryPolicy::ByInstrumentType);
        assert_eq!(config.ingestion.drain_queue_capacity, 8);
        assert_eq!(config.server.health_port, 9100);
        assert_eq!(config.replay_file, Some(PathBuf::from("/tmp/frames.jsonl")));
        assert_eq!(
            config.symbols,
            vec![InstrumentId::equity("AAPL"), InstrumentId::future("ES")]
        );
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("STREAM_ACCOUNT_ID", "acct"),
            ("STREAM_TICKS_CAPACITY", "lots"),
            ("STREAM_HEALTH_PORT", "99999"),
        ]))
        .unwrap();

        assert_eq!(config.broadcast.ticks_capacity, 10_000);
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn bad_timezone_is_error() {
        let err = EngineConfig::from_lookup(lookup(&[
            ("STREAM_ACCOUNT_ID", "acct"),
            ("STREAM_EXCHANGE_TZ", "Mars/Olympus"),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { key, .. } if key == "STREAM_EXCHANGE_TZ")
        );
    }

    #[test]
    fn bad_policy_is_error() {
        let err = EngineConfig::from_lookup(lookup(&[
            ("STREAM_ACCOUNT_ID", "acct"),
            ("STREAM_CHART_CATEGORY_POLICY", "lenient"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn symbol_list_parsing() {
        let symbols = parse_symbols("FOREX:EURUSD,index:SPX,,").unwrap();
        assert_eq!(
            symbols,
            vec![
                InstrumentId::new("EURUSD", SecurityCategory::Forex, Market::Oanda),
                InstrumentId::new("SPX", SecurityCategory::Index, Market::Usa),
            ]
        );

        assert!(parse_symbols("AAPL").is_err());
        assert!(parse_symbols("bond:T10Y").is_err());
        assert!(parse_symbols("crypto:BTCUSD").is_err());
    }

    #[test]
    fn account_id_redacted_debug() {
        let debug = format!("{:?}", AccountId::new("987654321".to_string()));
        assert!(!debug.contains("987654321"));
        assert!(debug.contains("[REDACTED]"));
    }
}
