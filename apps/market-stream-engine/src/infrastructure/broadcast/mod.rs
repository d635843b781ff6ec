//! Broadcast Channel Adapters
//!
//! Implements event distribution using tokio broadcast channels for fan-out
//! to many host streams.
//!
//! # Architecture
//!
//! The `BroadcastHub` is the engine's `EventSink`. It keeps one channel for
//! ticks and one for bars. Each host stream gets a forwarding task that
//! filters its channel down to the requested instrument and pushes matches
//! into a bounded mpsc that backs the returned stream. The forwarder fires
//! the stream's cancellation token when it stops, including when the host
//! drops the stream.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::BroadcastSettings;
use crate::application::ports::{EventFeed, EventSink, EventStream};
use crate::domain::instrument::SubscriptionRequest;
use crate::domain::streaming::MarketEvent;
use crate::infrastructure::metrics;

/// Buffer between a forwarding task and its host stream.
const STREAM_BUFFER: usize = 1024;

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Configuration for broadcast channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity for the tick channel.
    pub ticks_capacity: usize,
    /// Capacity for the bar channel.
    pub bars_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        let settings = BroadcastSettings::default();
        Self::from(settings)
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            ticks_capacity: settings.ticks_capacity,
            bars_capacity: settings.bars_capacity,
        }
    }
}

/// Central hub for canonical event channels.
///
/// # Example
///
/// ```rust
/// use market_stream_engine::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
///
/// let hub = BroadcastHub::new(BroadcastConfig::default());
///
/// let rx = hub.ticks_rx();
/// assert_eq!(hub.stats().ticks_receivers, 1);
/// # drop(rx);
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    ticks_tx: broadcast::Sender<MarketEvent>,
    bars_tx: broadcast::Sender<MarketEvent>,
}

impl BroadcastHub {
    /// Create a new broadcast hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            ticks_tx: broadcast::channel(config.ticks_capacity.max(1)).0,
            bars_tx: broadcast::channel(config.bars_capacity.max(1)).0,
        }
    }

    /// Create a new broadcast hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Send an event to every receiver of its channel.
    ///
    /// Returns the number of receivers, or `None` if there are none.
    #[must_use]
    pub fn send(&self, event: MarketEvent) -> Option<usize> {
        self.sender_for(&event).send(event).ok()
    }

    /// Get a new receiver for ticks.
    #[must_use]
    pub fn ticks_rx(&self) -> broadcast::Receiver<MarketEvent> {
        self.ticks_tx.subscribe()
    }

    /// Get a new receiver for bars.
    #[must_use]
    pub fn bars_rx(&self) -> broadcast::Receiver<MarketEvent> {
        self.bars_tx.subscribe()
    }

    /// Get statistics about both channels.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            ticks_receivers: self.ticks_tx.receiver_count(),
            bars_receivers: self.bars_tx.receiver_count(),
        }
    }

    const fn sender_for(&self, event: &MarketEvent) -> &broadcast::Sender<MarketEvent> {
        match event {
            MarketEvent::Tick(_) => &self.ticks_tx,
            MarketEvent::Bar(_) => &self.bars_tx,
        }
    }
}

/// Whether an event satisfies a subscription request.
///
/// Tick-resolution requests receive ticks; every coarser resolution
/// receives minute bars.
#[must_use]
pub fn matches_request(event: &MarketEvent, request: &SubscriptionRequest) -> bool {
    let kind_matches = match event {
        MarketEvent::Tick(_) => request.resolution.is_tick(),
        MarketEvent::Bar(_) => !request.resolution.is_tick(),
    };
    kind_matches && event.instrument() == &request.instrument
}

impl EventSink for BroadcastHub {
    fn update(&self, event: MarketEvent) {
        // No receivers is not an error; events are simply not observed.
        let _ = self.send(event);
    }
}

impl EventFeed for BroadcastHub {
    fn open_stream(&self, request: &SubscriptionRequest, cancel: CancellationToken) -> EventStream {
        let mut rx = if request.resolution.is_tick() {
            self.ticks_rx()
        } else {
            self.bars_rx()
        };
        let (tx, stream_rx) = mpsc::channel(STREAM_BUFFER);
        let host = tx.clone();
        let request = request.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = host.closed() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if matches_request(&event, &request) && tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(
                                instrument = %request.instrument,
                                lagged = n,
                                "Host stream lagged"
                            );
                            metrics::record_consumer_lagged(n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            cancel.cancel();
            tracing::debug!(instrument = %request.instrument, "Host stream forwarder stopped");
        });

        ReceiverStream::new(stream_rx)
    }
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Statistics about broadcast channels.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BroadcastStats {
    /// Number of tick receivers.
    pub ticks_receivers: usize,
    /// Number of bar receivers.
    pub bars_receivers: usize,
}

impl BroadcastStats {
    /// Get total number of receivers across both channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.ticks_receivers + self.bars_receivers
    }
}

// =============================================================================
// Tests
// =============================================================================
