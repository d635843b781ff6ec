//! Prometheus Metrics Module
//!
//! Exposes engine metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: canonical ticks and bars handed to the sink
//! - **Drops**: inbound records discarded during normalization
//! - **Channels**: subscribe/unsubscribe commands sent to the provider
//! - **Subscriptions**: live registry size
//! - **Latency**: queue drain durations
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before `init_metrics` is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::channel::ChannelCategoryTag;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "stream_engine_events_emitted_total",
        "Canonical events delivered to the sink"
    );
    describe_counter!(
        "stream_engine_records_dropped_total",
        "Inbound records dropped during normalization"
    );
    describe_counter!(
        "stream_engine_channel_commands_total",
        "Channel commands issued to the provider session"
    );
    describe_counter!(
        "stream_engine_notifications_coalesced_total",
        "Data-received notifications folded into an already pending drain"
    );
    describe_counter!(
        "stream_engine_consumer_lagged_total",
        "Events skipped by host streams that fell behind"
    );

    describe_gauge!(
        "stream_engine_live_subscriptions",
        "Number of provider tickers currently subscribed"
    );

    describe_histogram!(
        "stream_engine_drain_seconds",
        "Time to drain and normalize one provider queue"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for emitted event kinds.
#[derive(Debug, Clone, Copy)]
pub enum EventKind {
    /// Canonical tick.
    Tick,
    /// Canonical bar.
    Bar,
}

impl EventKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Bar => "bar",
        }
    }
}

/// Metric labels for record drop reasons.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// Ticker not in the registry.
    Unsubscribed,
    /// Price or size not representable as a decimal.
    InvalidNumeric,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::InvalidNumeric => "invalid_numeric",
        }
    }
}

/// Metric labels for provider channel commands.
#[derive(Debug, Clone, Copy)]
pub enum ChannelCommand {
    /// Level-one quote subscribe.
    SubscribeQuote,
    /// Minute chart subscribe.
    SubscribeMinuteBar,
    /// Channel unsubscribe.
    Unsubscribe,
}

impl ChannelCommand {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SubscribeQuote => "subscribe_quote",
            Self::SubscribeMinuteBar => "subscribe_minute_bar",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// Record a canonical event delivered to the sink.
pub fn record_event_emitted(kind: EventKind) {
    counter!(
        "stream_engine_events_emitted_total",
        "event" => kind.as_str()
    )
    .increment(1);
}

/// Record an inbound record dropped during normalization.
pub fn record_record_dropped(tag: ChannelCategoryTag, reason: DropReason) {
    counter!(
        "stream_engine_records_dropped_total",
        "queue" => tag.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a channel command issued to the provider.
pub fn record_channel_command(command: ChannelCommand) {
    counter!(
        "stream_engine_channel_commands_total",
        "command" => command.as_str()
    )
    .increment(1);
}

/// Record a notification folded into a pending drain.
pub fn record_notification_coalesced(tag: ChannelCategoryTag) {
    counter!(
        "stream_engine_notifications_coalesced_total",
        "queue" => tag.as_str()
    )
    .increment(1);
}

/// Record events a host stream skipped after lagging.
pub fn record_consumer_lagged(count: u64) {
    counter!("stream_engine_consumer_lagged_total").increment(count);
}

/// Update the live subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_live_subscriptions(count: usize) {
    gauge!("stream_engine_live_subscriptions").set(count as f64);
}

/// Record the time taken by one drain pass.
pub fn record_drain_duration(tag: ChannelCategoryTag, duration: Duration) {
    histogram!(
        "stream_engine_drain_seconds",
        "queue" => tag.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_as_str() {
        assert_eq!(EventKind::Tick.as_str(), "tick");
        assert_eq!(EventKind::Bar.as_str(), "bar");
    }

    #[test]
    fn drop_reason_as_str() {
        assert_eq!(DropReason::Unsubscribed.as_str(), "unsubscribed");
        assert_eq!(DropReason::InvalidNumeric.as_str(), "invalid_numeric");
    }

    #[test]
    fn channel_command_as_str() {
        assert_eq!(ChannelCommand::SubscribeQuote.as_str(), "subscribe_quote");
        assert_eq!(
            ChannelCommand::SubscribeMinuteBar.as_str(),
            "subscribe_minute_bar"
        );
        assert_eq!(ChannelCommand::Unsubscribe.as_str(), "unsubscribe");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_event_emitted(EventKind::Tick);
        record_record_dropped(ChannelCategoryTag::Quote, DropReason::Unsubscribed);
        set_live_subscriptions(3);
    }
}
