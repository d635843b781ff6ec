//! Configuration Module
//!
//! Configuration loading for the streaming engine.

mod settings;

pub use settings::{
    AccountId, BroadcastSettings, ConfigError, DEFAULT_EXCHANGE_TZ, EngineConfig,
    IngestionSettings, ServerSettings, parse_symbols,
};
