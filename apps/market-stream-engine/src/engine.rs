//! Engine Wiring
//!
//! Assembles the ingestion pipeline around a replay session:
//!
//! ```text
//! ReplaySession ──notify──▶ DrainWorker ──▶ MessageNormalizer ──▶ BroadcastHub
//!       ▲                                          │                   │
//!       └──── subscribe/unsubscribe ── Controller ◀┴── DataQueueHandler ◀┘ host streams
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventFeed, EventSink};
use crate::application::services::{
    DataQueueHandler, DrainWorker, MessageNormalizer, NormalizerTotals,
    StreamSubscriptionController,
};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastStats, SharedBroadcastHub,
};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::streamer::{ReplaySession, StreamerSymbolMapper};

/// Controller bound to the replay session.
pub type EngineController = StreamSubscriptionController<ReplaySession, StreamerSymbolMapper>;

/// Host handler bound to the replay session.
pub type EngineDataQueue = DataQueueHandler<ReplaySession, StreamerSymbolMapper>;

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Provider tickers in the registry.
    pub live_subscriptions: usize,
    /// Host streams currently open.
    pub open_streams: usize,
    /// Whether the session has been logged in.
    pub logged_in: bool,
    /// Whether the data handler has been attached.
    pub handler_attached: bool,
    /// Whether the drain worker is still running.
    pub drain_worker_running: bool,
    /// Open provider services with their ticker counts.
    pub open_services: BTreeMap<String, usize>,
    /// Normalization totals.
    pub ingestion: NormalizerTotals,
    /// Broadcast receiver counts.
    pub broadcast: BroadcastStats,
}

/// Running ingestion engine.
pub struct StreamEngine {
    session: Arc<ReplaySession>,
    registry: Arc<SubscriptionRegistry>,
    hub: SharedBroadcastHub,
    normalizer: Arc<MessageNormalizer<ReplaySession, StreamerSymbolMapper>>,
    data_queue: EngineDataQueue,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl StreamEngine {
    /// Build the pipeline and spawn the drain worker.
    ///
    /// Must be called within a tokio runtime. The worker stops when `cancel`
    /// fires or on [`StreamEngine::shutdown`].
    #[must_use]
    pub fn start(config: &EngineConfig, cancel: &CancellationToken) -> Self {
        let cancel = cancel.child_token();
        let session = Arc::new(ReplaySession::new());
        let mapper = Arc::new(StreamerSymbolMapper::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub: SharedBroadcastHub =
            Arc::new(BroadcastHub::new(BroadcastConfig::from(config.broadcast.clone())));

        let normalizer = Arc::new(MessageNormalizer::new(
            Arc::clone(&session),
            Arc::clone(&mapper),
            Arc::clone(&registry),
            Arc::clone(&hub) as Arc<dyn EventSink>,
            config.ingestion.exchange_tz,
            config.ingestion.chart_policy,
        ));

        let (handler, worker) = DrainWorker::spawn(
            Arc::clone(&normalizer),
            config.ingestion.drain_queue_capacity,
            cancel.clone(),
        );

        let controller = Arc::new(StreamSubscriptionController::new(
            Arc::clone(&session),
            mapper,
            Arc::clone(&registry),
            handler,
        ));

        let data_queue = DataQueueHandler::new(
            Arc::clone(&session),
            controller,
            Arc::clone(&hub) as Arc<dyn EventFeed>,
            config.account_id.as_str(),
        );

        tracing::info!(
            exchange_tz = %config.ingestion.exchange_tz,
            chart_policy = ?config.ingestion.chart_policy,
            drain_queue_capacity = config.ingestion.drain_queue_capacity,
            "Stream engine started"
        );

        Self {
            session,
            registry,
            hub,
            normalizer,
            data_queue,
            worker: Mutex::new(Some(worker)),
            cancel,
        }
    }

    /// Provider session.
    #[must_use]
    pub const fn session(&self) -> &Arc<ReplaySession> {
        &self.session
    }

    /// Subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Broadcast hub.
    #[must_use]
    pub const fn hub(&self) -> &SharedBroadcastHub {
        &self.hub
    }

    /// Host-facing subscribe/unsubscribe interface.
    #[must_use]
    pub const fn data_queue(&self) -> &EngineDataQueue {
        &self.data_queue
    }

    /// Subscription controller.
    #[must_use]
    pub fn controller(&self) -> &Arc<EngineController> {
        self.data_queue.controller()
    }

    /// Current engine status.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let drain_worker_running = self
            .worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());

        EngineStatus {
            live_subscriptions: self.registry.len(),
            open_streams: self.data_queue.open_stream_count(),
            logged_in: self.data_queue.is_logged_in(),
            handler_attached: self.controller().is_handler_attached(),
            drain_worker_running,
            open_services: self.session.open_services(),
            ingestion: self.normalizer.totals(),
            broadcast: self.hub.stats(),
        }
    }

    /// Close host streams and wait for the drain worker to stop.
    pub async fn shutdown(&self) {
        self.data_queue.close_all();
        self.cancel.cancel();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "Drain worker ended abnormally");
        }
        tracing::info!("Stream engine stopped");
    }
}
