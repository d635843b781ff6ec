//! Tracing and OpenTelemetry Setup
//!
//! Installs the global `tracing` subscriber for the engine: a console fmt
//! layer filtered by `RUST_LOG` plus the engine's own level, and, unless
//! disabled, an OTLP span exporter.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Base filter (default: `info`)
//! - `STREAM_LOG_LEVEL`: Level for the engine's own targets (default: `info`)
//! - `OTEL_ENABLED`: `false`, `0`, `off` or `no` disable the exporter
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-market-stream-engine)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "cream-market-stream-engine";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Engine targets the level override applies to.
const ENGINE_TARGET: &str = "market_stream_engine";

/// Transport crates that are noisy at `info`.
const QUIET_TARGETS: [&str; 2] = ["h2", "hyper"];

/// Shuts the tracer provider down when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Export spans over OTLP.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name attached to exported spans.
    pub service_name: String,
    /// Base filter, as `RUST_LOG` would give it.
    pub base_filter: Option<String>,
    /// Level for the engine's own targets.
    pub engine_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            base_filter: None,
            engine_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            enabled: non_empty("OTEL_ENABLED").is_none_or(|v| !is_disabled(&v)),
            otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or(defaults.otlp_endpoint),
            service_name: non_empty("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
            base_filter: non_empty("RUST_LOG"),
            engine_level: non_empty("STREAM_LOG_LEVEL")
                .map_or(defaults.engine_level, |v| v.trim().to_lowercase()),
        }
    }

    /// Filter directives: the base filter, then the engine level, then the
    /// quiet transport targets.
    #[must_use]
    pub fn filter_directives(&self) -> String {
        let base = self.base_filter.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        let mut directives = vec![
            base.to_string(),
            format!("{ENGINE_TARGET}={}", self.engine_level),
        ];
        directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
        directives.join(",")
    }

    fn env_filter(&self) -> EnvFilter {
        let directives = self.filter_directives();
        EnvFilter::try_new(&directives).unwrap_or_else(|e| {
            eprintln!("Invalid log filter {directives:?} ({e}), using {DEFAULT_LOG_LEVEL}");
            EnvFilter::new(DEFAULT_LOG_LEVEL)
        })
    }
}

fn is_disabled(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "false" | "0" | "off" | "no")
}

/// Initialize telemetry from the environment.
///
/// The returned guard must be kept alive for the duration of the program.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize telemetry with explicit configuration.
///
/// If the OTLP exporter cannot be built the engine logs to the console only.
#[must_use]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let exporter = if config.enabled {
        opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .build()
            .map_err(|e| e.to_string())
    } else {
        Err("disabled".to_string())
    };

    let tracer_provider = match exporter {
        Ok(exporter) => Some(
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(
                    opentelemetry_sdk::Resource::builder()
                        .with_service_name(config.service_name.clone())
                        .build(),
                )
                .build(),
        ),
        Err(reason) => {
            if config.enabled {
                eprintln!("OTLP exporter unavailable ({reason}), tracing to console only");
            }
            None
        }
    };

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    tracing::debug!(
        exporting = tracer_provider.is_some(),
        endpoint = %config.otlp_endpoint,
        service = %config.service_name,
        "Telemetry initialized"
    );

    TelemetryGuard { tracer_provider }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> TelemetryConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        TelemetryConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), TelemetryConfig::default());
    }

    #[test_case("false" ; "false")]
    #[test_case("FALSE" ; "upper case")]
    #[test_case("0" ; "zero")]
    #[test_case(" off " ; "padded off")]
    #[test_case("no" ; "no")]
    fn exporter_can_be_disabled(value: &str) {
        assert!(!config(&[("OTEL_ENABLED", value)]).enabled);
    }

    #[test_case("true" ; "true")]
    #[test_case("1" ; "one")]
    #[test_case("" ; "empty")]
    fn exporter_stays_enabled(value: &str) {
        assert!(config(&[("OTEL_ENABLED", value)]).enabled);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
            ("OTEL_SERVICE_NAME", "replay-node"),
            ("STREAM_LOG_LEVEL", "DEBUG"),
        ]);

        assert_eq!(config.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.service_name, "replay-node");
        assert_eq!(config.engine_level, "debug");
    }

    #[test]
    fn directives_default_to_info() {
        assert_eq!(
            TelemetryConfig::default().filter_directives(),
            "info,market_stream_engine=info,h2=warn,hyper=warn"
        );
    }

    #[test]
    fn directives_layer_engine_level_over_rust_log() {
        let config = config(&[("RUST_LOG", "warn,axum=debug"), ("STREAM_LOG_LEVEL", "trace")]);

        assert_eq!(
            config.filter_directives(),
            "warn,axum=debug,market_stream_engine=trace,h2=warn,hyper=warn"
        );
    }

    #[test]
    fn invalid_directives_fall_back() {
        let config = config(&[("STREAM_LOG_LEVEL", "loud!")]);
        // Must not panic.
        let _filter = config.env_filter();
    }
}
