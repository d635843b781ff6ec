//! Message normalizer.
//!
//! Drains a provider queue and turns each native record into a canonical
//! event for the sink. Records for tickers that are no longer subscribed are
//! dropped; records with non-finite numerics are dropped with a warning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::ports::{EventSink, IdentifierMapper, StreamingSession};
use crate::domain::channel::ChannelCategoryTag;
use crate::domain::instrument::SecurityCategory;
use crate::domain::streaming::{
    CanonicalBar, CanonicalTick, InboundBatch, InstrumentType, LevelOneQuote, MarketEvent,
    MinuteChartData, ONE_MINUTE,
};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::metrics::{self, DropReason, EventKind};

// =============================================================================
// Chart Category Policy
// =============================================================================

/// How a chart record's instrument-type flag selects the category used to
/// resolve its instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartCategoryPolicy {
    /// `EQUITY` resolves as equity, every other flag as future.
    #[default]
    LegacyFutureDefault,
    /// Equity, index, future and future-option flags are honoured; anything
    /// else resolves as future.
    ByInstrumentType,
}

impl ChartCategoryPolicy {
    /// Category used to resolve a chart record with this flag.
    #[must_use]
    pub const fn category_for(self, flag: InstrumentType) -> SecurityCategory {
        match (self, flag) {
            (_, InstrumentType::Equity) => SecurityCategory::Equity,
            (Self::ByInstrumentType, InstrumentType::Index) => SecurityCategory::Index,
            (Self::ByInstrumentType, InstrumentType::FutureOption) => {
                SecurityCategory::FutureOption
            }
            _ => SecurityCategory::Future,
        }
    }

    /// Parse a configuration value (`legacy` or `strict`).
    #[must_use]
    pub fn from_config_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" => Some(Self::LegacyFutureDefault),
            "strict" => Some(Self::ByInstrumentType),
            _ => None,
        }
    }
}

// =============================================================================
// Drain Statistics
// =============================================================================

/// Outcome of a single drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    /// Records taken from the queue.
    pub processed: usize,
    /// Events forwarded to the sink.
    pub emitted: usize,
    /// Records discarded.
    pub dropped: usize,
}

/// Running totals across every drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizerTotals {
    /// Drain passes run.
    pub drains: u64,
    /// Records taken from the queues.
    pub processed: u64,
    /// Events forwarded to the sink.
    pub emitted: u64,
    /// Records discarded.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    drains: AtomicU64,
    processed: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn accumulate(&self, stats: DrainStats) {
        self.drains.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(stats.processed as u64, Ordering::Relaxed);
        self.emitted.fetch_add(stats.emitted as u64, Ordering::Relaxed);
        self.dropped.fetch_add(stats.dropped as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> NormalizerTotals {
        NormalizerTotals {
            drains: self.drains.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Normalizer
// =============================================================================

/// Converts drained provider records into canonical events.
pub struct MessageNormalizer<S: ?Sized, M: ?Sized> {
    session: Arc<S>,
    mapper: Arc<M>,
    registry: Arc<SubscriptionRegistry>,
    sink: Arc<dyn EventSink>,
    exchange_tz: Tz,
    chart_policy: ChartCategoryPolicy,
    counters: Counters,
}

impl<S, M> MessageNormalizer<S, M>
where
    S: StreamingSession + ?Sized,
    M: IdentifierMapper + ?Sized,
{
    /// Create a normalizer that emits times in `exchange_tz`.
    #[must_use]
    pub fn new(
        session: Arc<S>,
        mapper: Arc<M>,
        registry: Arc<SubscriptionRegistry>,
        sink: Arc<dyn EventSink>,
        exchange_tz: Tz,
        chart_policy: ChartCategoryPolicy,
    ) -> Self {
        Self {
            session,
            mapper,
            registry,
            sink,
            exchange_tz,
            chart_policy,
            counters: Counters::default(),
        }
    }

    /// Running totals across every drain pass.
    #[must_use]
    pub fn totals(&self) -> NormalizerTotals {
        self.counters.snapshot()
    }

    /// Drain the queue for `tag` and forward everything it held.
    ///
    /// Records enqueued after the drain starts are left for the next pass.
    pub fn on_data_received(&self, tag: ChannelCategoryTag) -> DrainStats {
        let started = Instant::now();
        let batch = self.session.drain(tag);

        let stats = match batch {
            InboundBatch::Quotes(quotes) => self.process_quotes(quotes),
            InboundBatch::Charts(charts) => self.process_charts(charts),
        };

        self.counters.accumulate(stats);
        metrics::record_drain_duration(tag, started.elapsed());

        if stats.processed > 0 {
            tracing::trace!(
                queue = tag.as_str(),
                processed = stats.processed,
                emitted = stats.emitted,
                dropped = stats.dropped,
                "Queue drained"
            );
        }

        stats
    }

    fn process_quotes(&self, quotes: Vec<LevelOneQuote>) -> DrainStats {
        let mut stats = DrainStats {
            processed: quotes.len(),
            ..DrainStats::default()
        };

        for quote in quotes {
            match self.create_tick(&quote) {
                Some(tick) => {
                    self.sink.update(MarketEvent::Tick(tick));
                    metrics::record_event_emitted(EventKind::Tick);
                    stats.emitted += 1;
                }
                None => stats.dropped += 1,
            }
        }

        stats
    }

    fn process_charts(&self, charts: Vec<MinuteChartData>) -> DrainStats {
        let mut stats = DrainStats {
            processed: charts.len(),
            ..DrainStats::default()
        };

        for chart in charts {
            match self.create_bar(&chart) {
                Some(bar) => {
                    self.sink.update(MarketEvent::Bar(bar));
                    metrics::record_event_emitted(EventKind::Bar);
                    stats.emitted += 1;
                }
                None => stats.dropped += 1,
            }
        }

        stats
    }

    fn create_tick(&self, quote: &LevelOneQuote) -> Option<CanonicalTick> {
        let Some(instrument) = self.registry.get(&quote.symbol) else {
            tracing::trace!(ticker = %quote.symbol, "Quote for unsubscribed ticker dropped");
            metrics::record_record_dropped(ChannelCategoryTag::Quote, DropReason::Unsubscribed);
            return None;
        };

        let numerics = (
            to_decimal(quote.bid_size),
            to_decimal(quote.bid_price),
            to_decimal(quote.ask_size),
            to_decimal(quote.ask_price),
        );
        let (Some(bid_size), Some(bid_price), Some(ask_size), Some(ask_price)) = numerics else {
            tracing::warn!(ticker = %quote.symbol, "Quote with non-finite numerics dropped");
            metrics::record_record_dropped(ChannelCategoryTag::Quote, DropReason::InvalidNumeric);
            return None;
        };

        Some(CanonicalTick {
            time: quote.quote_time.with_timezone(&self.exchange_tz),
            instrument,
            bid_size,
            bid_price,
            ask_size,
            ask_price,
        })
    }

    fn create_bar(&self, chart: &MinuteChartData) -> Option<CanonicalBar> {
        let numerics = (
            to_decimal(chart.open_price),
            to_decimal(chart.high_price),
            to_decimal(chart.low_price),
            to_decimal(chart.close_price),
            to_decimal(chart.volume),
        );
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = numerics else {
            tracing::warn!(ticker = %chart.symbol, "Chart record with non-finite numerics dropped");
            metrics::record_record_dropped(ChannelCategoryTag::Chart, DropReason::InvalidNumeric);
            return None;
        };

        let category = self.chart_policy.category_for(chart.instrument_type);
        let instrument = self.mapper.to_instrument(&chart.symbol, category);

        Some(CanonicalBar {
            time: chart.chart_time.with_timezone(&self.exchange_tz),
            instrument,
            open,
            high,
            low,
            close,
            volume,
            period: ONE_MINUTE,
        })
    }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::try_from(value).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike, Utc};
    use parking_lot::Mutex;
    use test_case::test_case;

    use super::ChartCategoryPolicy::{ByInstrumentType as Strict, LegacyFutureDefault as Legacy};
    use super::*;
    use crate::application::ports::{DataHandler, MockIdentifierMapper};
    use crate::domain::channel::{ChannelKind, QuoteFeed};
    use crate::domain::instrument::{InstrumentId, Market};

    #[derive(Default)]
    struct QueuedSession {
        quotes: Mutex<Vec<LevelOneQuote>>,
        charts: Mutex<Vec<MinuteChartData>>,
    }

    impl StreamingSession for QueuedSession {
        fn login(&self, _account_id: &str) {}
        fn subscribe_quote(&self, _feed: QuoteFeed, _ticker: &str) {}
        fn subscribe_minute_bar(&self, _is_equity: bool, _ticker: &str) {}
        fn unsubscribe_channel(&self, _channel: ChannelKind) {}
        fn attach_data_handler(&self, _handler: DataHandler) {}

        fn drain(&self, tag: ChannelCategoryTag) -> InboundBatch {
            match tag {
                ChannelCategoryTag::Quote => {
                    InboundBatch::Quotes(std::mem::take(&mut *self.quotes.lock()))
                }
                ChannelCategoryTag::Chart => {
                    InboundBatch::Charts(std::mem::take(&mut *self.charts.lock()))
                }
            }
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<MarketEvent>>,
    }

    impl EventSink for CollectingSink {
        fn update(&self, event: MarketEvent) {
            self.events.lock().push(event);
        }
    }

    struct Fixture {
        session: Arc<QueuedSession>,
        registry: Arc<SubscriptionRegistry>,
        sink: Arc<CollectingSink>,
        normalizer: MessageNormalizer<QueuedSession, MockIdentifierMapper>,
    }

    fn fixture(mapper: MockIdentifierMapper, policy: ChartCategoryPolicy) -> Fixture {
        let session = Arc::new(QueuedSession::default());
        let registry = Arc::new(SubscriptionRegistry::new());
        let sink = Arc::new(CollectingSink::default());
        let normalizer = MessageNormalizer::new(
            Arc::clone(&session),
            Arc::new(mapper),
            Arc::clone(&registry),
            Arc::clone(&sink) as Arc<dyn EventSink>,
            chrono_tz::America::New_York,
            policy,
        );
        Fixture {
            session,
            registry,
            sink,
            normalizer,
        }
    }

    fn category_mapper() -> MockIdentifierMapper {
        let mut mapper = MockIdentifierMapper::new();
        mapper.expect_to_instrument().returning(|ticker, category| {
            InstrumentId::on_default_market(ticker, category)
                .unwrap_or_else(|| InstrumentId::new(ticker, category, Market::Usa))
        });
        mapper
    }

    fn quote(symbol: &str, bid: f64, ask: f64) -> LevelOneQuote {
        LevelOneQuote {
            symbol: symbol.to_string(),
            bid_price: bid,
            bid_size: 3.0,
            ask_price: ask,
            ask_size: 5.0,
            quote_time: Utc.with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap(),
        }
    }

    fn chart(symbol: &str, flag: InstrumentType) -> MinuteChartData {
        MinuteChartData {
            symbol: symbol.to_string(),
            instrument_type: flag,
            open_price: 10.0,
            high_price: 12.0,
            low_price: 9.0,
            close_price: 11.0,
            volume: 500.0,
            chart_time: Utc.with_ymd_and_hms(2024, 7, 1, 14, 31, 0).unwrap(),
        }
    }

    #[test_case(Legacy, InstrumentType::Equity, SecurityCategory::Equity)]
    #[test_case(Legacy, InstrumentType::Future, SecurityCategory::Future)]
    #[test_case(Legacy, InstrumentType::Index, SecurityCategory::Future)]
    #[test_case(Legacy, InstrumentType::Unknown, SecurityCategory::Future)]
    #[test_case(Strict, InstrumentType::Index, SecurityCategory::Index)]
    #[test_case(Strict, InstrumentType::FutureOption, SecurityCategory::FutureOption)]
    #[test_case(Strict, InstrumentType::Forex, SecurityCategory::Future)]
    fn chart_category_policy(
        policy: ChartCategoryPolicy,
        flag: InstrumentType,
        expected: SecurityCategory,
    ) {
        assert_eq!(policy.category_for(flag), expected);
    }

    #[test]
    fn policy_config_values() {
        assert_eq!(
            ChartCategoryPolicy::from_config_value("Legacy"),
            Some(ChartCategoryPolicy::LegacyFutureDefault)
        );
        assert_eq!(
            ChartCategoryPolicy::from_config_value(" strict "),
            Some(ChartCategoryPolicy::ByInstrumentType)
        );
        assert_eq!(ChartCategoryPolicy::from_config_value("lenient"), None);
    }

    #[test]
    fn quote_for_subscribed_ticker_emits_tick_in_exchange_time() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::default());
        fx.registry.add("AAPL", InstrumentId::equity("AAPL"));
        fx.session.quotes.lock().push(quote("AAPL", 187.5, 187.75));

        let stats = fx.normalizer.on_data_received(ChannelCategoryTag::Quote);

        assert_eq!(
            stats,
            DrainStats {
                processed: 1,
                emitted: 1,
                dropped: 0
            }
        );
        let events = fx.sink.events.lock();
        let MarketEvent::Tick(tick) = &events[0] else {
            panic!("expected tick");
        };
        assert_eq!(tick.instrument, InstrumentId::equity("AAPL"));
        assert_eq!(tick.bid_price, Decimal::new(1875, 1));
        assert_eq!(tick.ask_price, Decimal::new(18775, 2));
        assert_eq!(tick.bid_size, Decimal::from(3));
        assert_eq!(tick.ask_size, Decimal::from(5));
        // 15:30 UTC in January is 10:30 EST
        assert_eq!(tick.time.hour(), 10);
        assert_eq!(tick.time.minute(), 30);
    }

    #[test]
    fn quote_for_unknown_ticker_dropped() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::default());
        fx.registry.add("AAPL", InstrumentId::equity("AAPL"));
        fx.session.quotes.lock().push(quote("MSFT", 400.0, 400.5));
        fx.session.quotes.lock().push(quote("AAPL", 187.5, 187.75));

        let stats = fx.normalizer.on_data_received(ChannelCategoryTag::Quote);

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.dropped, 1);
        let events = fx.sink.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].instrument().symbol(), "AAPL");
    }

    #[test]
    fn quote_with_nan_dropped_rest_continue() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::default());
        fx.registry.add("AAPL", InstrumentId::equity("AAPL"));
        fx.session.quotes.lock().push(quote("AAPL", f64::NAN, 187.75));
        fx.session.quotes.lock().push(quote("AAPL", 187.5, f64::INFINITY));
        fx.session.quotes.lock().push(quote("AAPL", 187.5, 187.75));

        let stats = fx.normalizer.on_data_received(ChannelCategoryTag::Quote);

        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn equity_chart_builds_one_minute_bar() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::default());
        fx.session.charts.lock().push(chart("AAPL", InstrumentType::Equity));

        fx.normalizer.on_data_received(ChannelCategoryTag::Chart);

        let events = fx.sink.events.lock();
        let MarketEvent::Bar(bar) = &events[0] else {
            panic!("expected bar");
        };
        assert_eq!(bar.instrument, InstrumentId::equity("AAPL"));
        assert_eq!(bar.open, Decimal::from(10));
        assert_eq!(bar.high, Decimal::from(12));
        assert_eq!(bar.low, Decimal::from(9));
        assert_eq!(bar.close, Decimal::from(11));
        assert_eq!(bar.volume, Decimal::from(500));
        assert_eq!(bar.period, ONE_MINUTE);
        // 14:31 UTC in July is 10:31 EDT
        assert_eq!(bar.time.hour(), 10);
        assert_eq!(bar.time.minute(), 31);
    }

    #[test]
    fn non_equity_chart_resolves_as_future_under_legacy_policy() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::LegacyFutureDefault);
        fx.session.charts.lock().push(chart("/ES", InstrumentType::Index));

        fx.normalizer.on_data_received(ChannelCategoryTag::Chart);

        let events = fx.sink.events.lock();
        assert_eq!(events[0].instrument().category(), SecurityCategory::Future);
        assert_eq!(events[0].instrument().market(), Market::Cme);
    }

    #[test]
    fn chart_resolution_goes_through_mapper() {
        let mut mapper = MockIdentifierMapper::new();
        mapper
            .expect_to_instrument()
            .withf(|ticker, category| ticker == "/ES" && *category == SecurityCategory::Future)
            .times(1)
            .returning(|_, _| InstrumentId::future("ES"));
        let fx = fixture(mapper, ChartCategoryPolicy::default());
        fx.session.charts.lock().push(chart("/ES", InstrumentType::Future));

        fx.normalizer.on_data_received(ChannelCategoryTag::Chart);

        assert_eq!(fx.sink.events.lock()[0].instrument().symbol(), "ES");
    }

    #[test]
    fn chart_with_nan_volume_dropped() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::default());
        let mut bad = chart("AAPL", InstrumentType::Equity);
        bad.volume = f64::NAN;
        fx.session.charts.lock().push(bad);

        let stats = fx.normalizer.on_data_received(ChannelCategoryTag::Chart);

        assert_eq!(stats.dropped, 1);
        assert!(fx.sink.events.lock().is_empty());
    }

    #[test]
    fn empty_drain_emits_nothing() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::default());

        let stats = fx.normalizer.on_data_received(ChannelCategoryTag::Chart);

        assert_eq!(stats, DrainStats::default());
        assert!(fx.sink.events.lock().is_empty());
    }

    #[test]
    fn totals_accumulate_across_passes() {
        let fx = fixture(category_mapper(), ChartCategoryPolicy::default());
        fx.registry.add("AAPL", InstrumentId::equity("AAPL"));
        fx.session.quotes.lock().push(quote("AAPL", 1.0, 2.0));
        fx.normalizer.on_data_received(ChannelCategoryTag::Quote);
        fx.session.quotes.lock().push(quote("ZZZ", 1.0, 2.0));
        fx.normalizer.on_data_received(ChannelCategoryTag::Quote);

        let totals = fx.normalizer.totals();

        assert_eq!(totals.drains, 2);
        assert_eq!(totals.processed, 2);
        assert_eq!(totals.emitted, 1);
        assert_eq!(totals.dropped, 1);
    }
}
