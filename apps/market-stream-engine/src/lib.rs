#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Stream Engine - Live Market Data Subscription and Ingestion
//!
//! Keeps a broker's streaming channels in line with the set of instruments
//! the host wants, and turns the provider's native quote and minute-chart
//! records into canonical ticks and bars.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `instrument`: Instrument identity and host request types
//!   - `channel`: Provider channel kinds and the category → channel policy
//!   - `streaming`: Canonical events and native inbound records
//!   - `subscription`: Subscription registry and demand tracking
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Streaming session, identifier mapper, event sink
//!   - `services`: Subscription controller, normalizer, drain worker,
//!     data queue handler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `streamer`: Frame codec, queues, replay session, ticker conventions
//!   - `broadcast`: Channel-based event distribution
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                  ┌────────────┐  notify  ┌─────────────┐     ┌────────────┐
//! Provider frames ─►  Session   ├─────────►│ DrainWorker ├────►│ Normalizer │
//!                  │  (queues)  │◄─ drain ─┤             │     └─────┬──────┘
//!                  └─────▲──────┘          └─────────────┘           │
//!                        │ subscribe / unsubscribe                   ▼
//!                  ┌─────┴──────┐          ┌─────────────┐     ┌────────────┐
//!                  │ Controller │◄─────────┤ DataQueue   │◄────┤ Broadcast  ├──► Host streams
//!                  └────────────┘          └─────────────┘     └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Pipeline wiring around the replay session.
pub mod engine;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::channel::{ChannelCategoryTag, ChannelKind, ChartFeed, QuoteFeed};
pub use domain::instrument::{
    InstrumentId, Market, Resolution, SecurityCategory, SubscriptionRequest, TickType,
};
pub use domain::streaming::{CanonicalBar, CanonicalTick, MarketEvent};
pub use domain::subscription::{ConsumerId, DemandTracker, SubscriptionRegistry};

// Application services
pub use application::ports::{
    DataHandler, EventFeed, EventSink, EventStream, IdentifierMapper, StreamingSession,
};
pub use application::services::{
    ChartCategoryPolicy, DataQueueHandler, DrainWorker, MessageNormalizer,
    StreamSubscriptionController,
};

// Infrastructure config
pub use infrastructure::config::{
    AccountId, BroadcastSettings, ConfigError, EngineConfig, IngestionSettings, ServerSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Broadcast hub
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastStats, SharedBroadcastHub,
};

// Streamer adapters
pub use infrastructure::streamer::{
    CodecError, FrameCodec, ReplayError, ReplaySession, SessionCommand, StreamerSymbolMapper,
};

// Engine
pub use engine::{EngineStatus, StreamEngine};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
