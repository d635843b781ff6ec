//! Stream subscription controller.
//!
//! Keeps the provider's open channels in line with the registry. Every
//! change that leaves the registry non-empty re-issues subscribe commands for
//! the full snapshot; provider subscribes are idempotent, so re-issuing is
//! safe. The change that empties the registry closes every channel kind.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::application::ports::{DataHandler, IdentifierMapper, StreamingSession};
use crate::domain::channel::{self, ChannelKind, ChartFeed};
use crate::domain::instrument::InstrumentId;
use crate::domain::subscription::{Subscription, SubscriptionRegistry};
use crate::infrastructure::metrics::{self, ChannelCommand};

/// Marker for placeholder tickers that stand for a whole universe selection.
const UNIVERSE_MARKER: &str = "universe";

/// Whether a provider ticker is a universe placeholder rather than an
/// instrument.
#[must_use]
pub fn is_universe_ticker(ticker: &str) -> bool {
    ticker.to_lowercase().contains(UNIVERSE_MARKER)
}

/// Orchestrates registry mutations and provider channel commands.
pub struct StreamSubscriptionController<S: ?Sized, M: ?Sized> {
    session: Arc<S>,
    mapper: Arc<M>,
    registry: Arc<SubscriptionRegistry>,
    handler: DataHandler,
    handler_attached: AtomicBool,
}

impl<S, M> StreamSubscriptionController<S, M>
where
    S: StreamingSession + ?Sized,
    M: IdentifierMapper + ?Sized,
{
    /// Create a controller.
    ///
    /// `handler` is attached to the session after the first subscribe pass
    /// and never again.
    #[must_use]
    pub fn new(
        session: Arc<S>,
        mapper: Arc<M>,
        registry: Arc<SubscriptionRegistry>,
        handler: DataHandler,
    ) -> Self {
        Self {
            session,
            mapper,
            registry,
            handler,
            handler_attached: AtomicBool::new(false),
        }
    }

    /// Registry this controller mutates.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Whether the data handler has been attached to the session.
    #[must_use]
    pub fn is_handler_attached(&self) -> bool {
        self.handler_attached.load(Ordering::Acquire)
    }

    /// Subscribe instruments.
    ///
    /// Universe placeholders and instruments without provider channels are
    /// skipped. Returns whether at least one new subscription was registered.
    pub fn add(&self, instruments: &[InstrumentId]) -> bool {
        let mut any_added = false;

        for instrument in instruments {
            let ticker = self.mapper.to_provider_ticker(instrument);

            if is_universe_ticker(&ticker) {
                tracing::trace!(ticker = %ticker, "Skipping universe placeholder");
                continue;
            }

            if !channel::is_subscribable(instrument.category()) {
                tracing::debug!(
                    ticker = %ticker,
                    category = %instrument.category(),
                    "Category not supported by streaming provider"
                );
                continue;
            }

            if self.registry.add(ticker.clone(), instrument.clone()) {
                tracing::debug!(ticker = %ticker, instrument = %instrument, "Subscription added");
                any_added = true;
            }
        }

        if any_added {
            self.resubscribe_snapshot();
        }

        any_added
    }

    /// Unsubscribe instruments.
    ///
    /// Returns whether at least one subscription was removed.
    pub fn remove(&self, instruments: &[InstrumentId]) -> bool {
        let mut any_removed = false;

        for instrument in instruments {
            let ticker = self.mapper.to_provider_ticker(instrument);
            if self.registry.remove(&ticker) {
                tracing::debug!(ticker = %ticker, instrument = %instrument, "Subscription removed");
                any_removed = true;
            }
        }

        if any_removed {
            let snapshot = self.registry.snapshot();
            if snapshot.is_empty() {
                self.teardown();
            } else {
                self.subscribe_to(&snapshot);
            }
        }

        any_removed
    }

    /// Attach the data handler unless it already is.
    pub fn ensure_handler_attached(&self) {
        if self
            .handler_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.session.attach_data_handler(Arc::clone(&self.handler));
            tracing::info!("Data handler attached to streaming session");
        }
    }

    fn resubscribe_snapshot(&self) {
        let snapshot = self.registry.snapshot();
        self.subscribe_to(&snapshot);
    }

    fn subscribe_to(&self, snapshot: &[Subscription]) {
        for subscription in snapshot {
            let ticker = subscription.provider_ticker.as_str();
            for channel in channel::channels_for(subscription.instrument.category()) {
                match channel {
                    ChannelKind::Quote(feed) => {
                        self.session.subscribe_quote(*feed, ticker);
                        metrics::record_channel_command(ChannelCommand::SubscribeQuote);
                    }
                    ChannelKind::MinuteBar(feed) => {
                        self.session
                            .subscribe_minute_bar(*feed == ChartFeed::Equity, ticker);
                        metrics::record_channel_command(ChannelCommand::SubscribeMinuteBar);
                    }
                }
            }
        }

        metrics::set_live_subscriptions(snapshot.len());
        tracing::debug!(subscriptions = snapshot.len(), "Subscribe pass issued");

        self.ensure_handler_attached();
    }

    fn teardown(&self) {
        for channel in channel::teardown_channels() {
            self.session.unsubscribe_channel(*channel);
            metrics::record_channel_command(ChannelCommand::Unsubscribe);
        }

        metrics::set_live_subscriptions(0);
        tracing::info!("Registry empty, all provider channels closed");
    }
}
