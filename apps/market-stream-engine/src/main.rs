//! Market Stream Engine Binary
//!
//! Starts the ingestion engine, subscribes the configured instruments and
//! optionally replays a recording of streamer frames through it.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-stream-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `STREAM_ACCOUNT_ID`: Streaming account identifier
//!
//! ## Optional
//! - `STREAM_EXCHANGE_TZ`: Timezone for emitted events (default: `America/New_York`)
//! - `STREAM_CHART_CATEGORY_POLICY`: legacy | strict (default: legacy)
//! - `STREAM_DRAIN_QUEUE_CAPACITY`: Notification queue capacity (default: 64)
//! - `STREAM_TICKS_CAPACITY`: Tick broadcast capacity (default: 10000)
//! - `STREAM_BARS_CAPACITY`: Bar broadcast capacity (default: 1000)
//! - `STREAM_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `STREAM_REPLAY_FILE`: Newline-delimited frame recording to replay
//! - `STREAM_SYMBOLS`: Startup subscriptions, e.g. `equity:AAPL,future:ES`
//! - `STREAM_LOG_LEVEL`: Level for the engine's own logs (default: info)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-market-stream-engine)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_stream_engine::infrastructure::health::{HealthServer, HealthServerState};
use market_stream_engine::infrastructure::telemetry;
use market_stream_engine::{
    EngineConfig, EventStream, Resolution, StreamEngine, SubscriptionRequest, TickType,
    init_metrics,
};
use tokio::signal;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        exporting_spans = telemetry_guard.is_exporting(),
        "Starting Market Stream Engine"
    );

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics()?;

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let engine = Arc::new(StreamEngine::start(&config, &shutdown_token));

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&engine),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Startup subscriptions: ticks and minute bars for each configured symbol
    for instrument in &config.symbols {
        for (resolution, tick_type) in [
            (Resolution::Tick, TickType::Quote),
            (Resolution::Minute, TickType::Trade),
        ] {
            let request = SubscriptionRequest::new(instrument.clone(), resolution, tick_type);
            let stream = engine.data_queue().subscribe(request.clone());
            tokio::spawn(log_stream(request, stream));
        }
    }

    if let Some(path) = config.replay_file.clone() {
        let session = Arc::clone(engine.session());
        tokio::task::spawn_blocking(move || match session.replay_file(&path) {
            Ok(summary) => tracing::info!(
                frames = summary.frames,
                records = summary.records,
                rejected = summary.rejected,
                "Recording replayed"
            ),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Replay failed"),
        });
    }

    tracing::info!("Stream engine ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, engine.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Engine shutdown timed out");
    }

    tracing::info!("Market Stream Engine stopped");
    Ok(())
}

/// Log every event on a host stream until it ends.
async fn log_stream(request: SubscriptionRequest, mut stream: EventStream) {
    while let Some(event) = stream.next().await {
        tracing::debug!(
            instrument = %event.instrument(),
            time = %event.time(),
            event = ?event,
            "Event received"
        );
    }
    tracing::debug!(
        instrument = %request.instrument,
        resolution = ?request.resolution,
        "Stream ended"
    );
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        exchange_tz = %config.ingestion.exchange_tz,
        chart_policy = ?config.ingestion.chart_policy,
        health_port = config.server.health_port,
        symbols = config.symbols.len(),
        replay = config.replay_file.is_some(),
        "Configuration loaded"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
