//! Host-facing data queue handler.
//!
//! Hosts ask for one stream per subscription request. Consumers are
//! reference counted, so an instrument wanted by two streams is subscribed
//! at the provider once and released when the last stream goes away. A
//! stream is released either by an explicit unsubscribe or when the host
//! drops it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::controller::StreamSubscriptionController;
use crate::application::ports::{EventFeed, EventStream, IdentifierMapper, StreamingSession};
use crate::domain::instrument::{InstrumentId, Market, SubscriptionRequest, TickType};
use crate::domain::subscription::{ConsumerId, DemandStats, DemandTracker};

/// A live host stream.
#[derive(Debug)]
struct OpenStream {
    consumer_id: ConsumerId,
    cancel: CancellationToken,
}

type StreamMap = HashMap<SubscriptionRequest, Vec<OpenStream>>;

/// Whether the provider can stream an instrument at all.
#[must_use]
pub const fn can_subscribe(instrument: &InstrumentId) -> bool {
    Market::for_category(instrument.category()).is_some()
}

// =============================================================================
// Consumer Book
// =============================================================================

/// Open streams and their demand, shared with the stream-end watchers.
///
/// The streams lock is held across every demand change and the controller
/// call it triggers, so a release and a new subscribe for the same
/// instrument cannot interleave.
struct ConsumerBook<S: ?Sized, M: ?Sized> {
    controller: Arc<StreamSubscriptionController<S, M>>,
    demand: DemandTracker,
    streams: Mutex<StreamMap>,
}

impl<S, M> ConsumerBook<S, M>
where
    S: StreamingSession + ?Sized,
    M: IdentifierMapper + ?Sized,
{
    fn open(&self, request: &SubscriptionRequest, open: OpenStream) {
        let mut streams = self.streams.lock();
        let consumer_id = open.consumer_id;
        streams.entry(request.clone()).or_default().push(open);

        let changes = self.demand.add(
            consumer_id,
            request.tick_type,
            std::slice::from_ref(&request.instrument),
        );
        if !changes.subscribe.is_empty() {
            self.controller.add(&changes.subscribe);
        }
    }

    /// Release the most recently opened stream for a request.
    fn close_latest(&self, request: &SubscriptionRequest) -> Option<OpenStream> {
        let mut streams = self.streams.lock();
        let open = take_stream(&mut streams, request, Vec::pop)?;
        self.release(open.consumer_id);
        Some(open)
    }

    /// Release one consumer. Returns `None` if it was already released.
    fn close_consumer(
        &self,
        request: &SubscriptionRequest,
        consumer_id: ConsumerId,
    ) -> Option<OpenStream> {
        let mut streams = self.streams.lock();
        let open = take_stream(&mut streams, request, |open| {
            let position = open.iter().position(|s| s.consumer_id == consumer_id)?;
            Some(open.remove(position))
        })?;
        self.release(open.consumer_id);
        Some(open)
    }

    /// Release every consumer.
    fn close_all(&self) -> Vec<OpenStream> {
        let mut streams = self.streams.lock();
        let closed: Vec<OpenStream> = std::mem::take(&mut *streams)
            .into_values()
            .flatten()
            .collect();
        for open in &closed {
            self.release(open.consumer_id);
        }
        closed
    }

    /// Drop a consumer's demand. Callers hold the streams lock.
    ///
    /// The provider subscription goes only once no tick type still wants
    /// the instrument.
    fn release(&self, consumer_id: ConsumerId) {
        let released: Vec<InstrumentId> = self
            .demand
            .consumer_disconnected(consumer_id)
            .into_values()
            .flat_map(|changes| changes.unsubscribe)
            .filter(|instrument| !self.demand.is_demanded(instrument))
            .collect();

        if !released.is_empty() {
            self.controller.remove(&released);
        }
    }

    fn open_count(&self) -> usize {
        self.streams.lock().values().map(Vec::len).sum()
    }
}

fn take_stream(
    streams: &mut StreamMap,
    request: &SubscriptionRequest,
    pick: impl FnOnce(&mut Vec<OpenStream>) -> Option<OpenStream>,
) -> Option<OpenStream> {
    let open_streams = streams.get_mut(request)?;
    let open = pick(open_streams);
    if open_streams.is_empty() {
        streams.remove(request);
    }
    open
}

// =============================================================================
// Data Queue Handler
// =============================================================================

/// Exposed subscribe/unsubscribe interface for the host.
pub struct DataQueueHandler<S: ?Sized, M: ?Sized> {
    session: Arc<S>,
    feed: Arc<dyn EventFeed>,
    book: Arc<ConsumerBook<S, M>>,
    account_id: String,
    logged_in: AtomicBool,
}

impl<S, M> DataQueueHandler<S, M>
where
    S: StreamingSession + ?Sized + 'static,
    M: IdentifierMapper + ?Sized + 'static,
{
    /// Create a handler. The session is logged in on the first subscribe.
    #[must_use]
    pub fn new(
        session: Arc<S>,
        controller: Arc<StreamSubscriptionController<S, M>>,
        feed: Arc<dyn EventFeed>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            session,
            feed,
            book: Arc::new(ConsumerBook {
                controller,
                demand: DemandTracker::new(),
                streams: Mutex::new(HashMap::new()),
            }),
            account_id: account_id.into(),
            logged_in: AtomicBool::new(false),
        }
    }

    /// Controller driving provider subscriptions.
    #[must_use]
    pub fn controller(&self) -> &Arc<StreamSubscriptionController<S, M>> {
        &self.book.controller
    }

    /// Open a stream for a subscription request.
    ///
    /// Instruments the provider cannot stream get an empty stream that is
    /// already closed. Dropping the returned stream releases it like
    /// [`DataQueueHandler::unsubscribe`]. Must be called within a tokio
    /// runtime.
    pub fn subscribe(&self, request: SubscriptionRequest) -> EventStream {
        self.ensure_logged_in();

        if !can_subscribe(&request.instrument) {
            tracing::debug!(
                instrument = %request.instrument,
                category = %request.instrument.category(),
                "Subscription request for unsupported category"
            );
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            return ReceiverStream::new(rx);
        }

        let consumer_id = uuid::Uuid::new_v4().as_u64_pair().0;
        let cancel = CancellationToken::new();
        let stream = self.feed.open_stream(&request, cancel.clone());

        self.book.open(
            &request,
            OpenStream {
                consumer_id,
                cancel: cancel.clone(),
            },
        );

        tracing::info!(
            consumer_id = %consumer_id,
            instrument = %request.instrument,
            resolution = ?request.resolution,
            tick_type = ?request.tick_type,
            "Host stream opened"
        );

        let book = Arc::clone(&self.book);
        tokio::spawn(async move {
            cancel.cancelled().await;
            if book.close_consumer(&request, consumer_id).is_some() {
                tracing::info!(
                    consumer_id = %consumer_id,
                    instrument = %request.instrument,
                    "Host stream ended"
                );
            }
        });

        stream
    }

    /// Close the most recently opened stream for a request.
    ///
    /// Returns false if no stream is open for it.
    pub fn unsubscribe(&self, request: &SubscriptionRequest) -> bool {
        let Some(open) = self.book.close_latest(request) else {
            return false;
        };
        open.cancel.cancel();

        tracing::info!(
            consumer_id = %open.consumer_id,
            instrument = %request.instrument,
            "Host stream closed"
        );

        true
    }

    /// Subscribe instruments directly, bypassing demand tracking.
    pub fn add(&self, instruments: &[InstrumentId], tick_type: TickType) -> bool {
        tracing::debug!(count = instruments.len(), tick_type = ?tick_type, "Bulk subscribe");
        self.book.controller.add(instruments)
    }

    /// Unsubscribe instruments directly, bypassing demand tracking.
    pub fn remove(&self, instruments: &[InstrumentId], tick_type: TickType) -> bool {
        tracing::debug!(count = instruments.len(), tick_type = ?tick_type, "Bulk unsubscribe");
        self.book.controller.remove(instruments)
    }

    /// Number of open host streams.
    #[must_use]
    pub fn open_stream_count(&self) -> usize {
        self.book.open_count()
    }

    /// Demand statistics for a tick type.
    #[must_use]
    pub fn demand_stats(&self, tick_type: TickType) -> DemandStats {
        self.book.demand.stats(tick_type)
    }

    /// Whether the session has been logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    /// Close every open stream and release its provider subscriptions.
    pub fn close_all(&self) {
        for open in self.book.close_all() {
            open.cancel.cancel();
        }
    }

    fn ensure_logged_in(&self) {
        if self
            .logged_in
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!(account_id = %self.account_id, "Logging in streaming session");
            self.session.login(&self.account_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;
    use crate::application::ports::{DataHandler, EventSink, MockIdentifierMapper};
    use crate::domain::channel::{ChannelCategoryTag, ChannelKind, QuoteFeed};
    use crate::domain::instrument::{Resolution, SecurityCategory};
    use crate::domain::streaming::{InboundBatch, MarketEvent};
    use crate::domain::subscription::SubscriptionRegistry;

    #[derive(Default)]
    struct CountingSession {
        logins: Mutex<Vec<String>>,
        quote_subscribes: Mutex<usize>,
        unsubscribes: Mutex<usize>,
    }

    impl StreamingSession for CountingSession {
        fn login(&self, account_id: &str) {
            self.logins.lock().push(account_id.to_string());
        }
        fn subscribe_quote(&self, _feed: QuoteFeed, _ticker: &str) {
            *self.quote_subscribes.lock() += 1;
        }
        fn subscribe_minute_bar(&self, _is_equity: bool, _ticker: &str) {}
        fn unsubscribe_channel(&self, _channel: ChannelKind) {
            *self.unsubscribes.lock() += 1;
        }
        fn attach_data_handler(&self, _handler: DataHandler) {}
        fn drain(&self, tag: ChannelCategoryTag) -> InboundBatch {
            InboundBatch::empty(tag)
        }
    }

    /// Feed whose streams stay open until cancelled.
    #[derive(Default)]
    struct HeldFeed {
        senders: Mutex<Vec<(CancellationToken, tokio::sync::mpsc::Sender<MarketEvent>)>>,
    }

    impl EventSink for HeldFeed {
        fn update(&self, _event: MarketEvent) {}
    }

    impl EventFeed for HeldFeed {
        fn open_stream(
            &self,
            _request: &SubscriptionRequest,
            cancel: CancellationToken,
        ) -> EventStream {
            let (tx, rx) = tokio::sync::mpsc::channel(8);
            let mut senders = self.senders.lock();
            senders.retain(|(token, _)| !token.is_cancelled());
            senders.push((cancel, tx));
            ReceiverStream::new(rx)
        }
    }

    type TestHandler = DataQueueHandler<CountingSession, MockIdentifierMapper>;

    fn handler() -> (TestHandler, Arc<CountingSession>, Arc<HeldFeed>) {
        let session = Arc::new(CountingSession::default());
        let mut mapper = MockIdentifierMapper::new();
        mapper
            .expect_to_provider_ticker()
            .returning(|instrument| instrument.symbol().to_string());
        let controller = Arc::new(StreamSubscriptionController::new(
            Arc::clone(&session),
            Arc::new(mapper),
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(|_| {}),
        ));
        let feed = Arc::new(HeldFeed::default());
        let handler = DataQueueHandler::new(
            Arc::clone(&session),
            controller,
            Arc::clone(&feed) as Arc<dyn EventFeed>,
            "ACCT-1",
        );
        (handler, session, feed)
    }

    fn quote_request(symbol: &str) -> SubscriptionRequest {
        SubscriptionRequest::new(InstrumentId::equity(symbol), Resolution::Tick, TickType::Quote)
    }

    fn bar_request(symbol: &str) -> SubscriptionRequest {
        SubscriptionRequest::new(InstrumentId::equity(symbol), Resolution::Minute, TickType::Trade)
    }

    #[test]
    fn can_subscribe_follows_default_market_map() {
        assert!(can_subscribe(&InstrumentId::equity("AAPL")));
        assert!(can_subscribe(&InstrumentId::future("/ES")));
        assert!(!can_subscribe(&InstrumentId::new(
            "BTCUSD",
            SecurityCategory::Crypto,
            Market::Usa
        )));
    }

    #[tokio::test]
    async fn login_happens_once() {
        let (handler, session, _feed) = handler();

        let _a = handler.subscribe(quote_request("AAPL"));
        let _b = handler.subscribe(quote_request("MSFT"));

        assert!(handler.is_logged_in());
        assert_eq!(*session.logins.lock(), vec!["ACCT-1".to_string()]);
    }

    #[tokio::test]
    async fn unsupported_category_yields_closed_stream() {
        let (handler, session, _feed) = handler();
        let request = SubscriptionRequest::new(
            InstrumentId::new("XAUUSD", SecurityCategory::Cfd, Market::Oanda),
            Resolution::Tick,
            TickType::Quote,
        );

        let mut stream = handler.subscribe(request);

        assert!(stream.next().await.is_none());
        assert_eq!(handler.open_stream_count(), 0);
        assert_eq!(*session.quote_subscribes.lock(), 0);
    }

    #[tokio::test]
    async fn second_consumer_does_not_resubscribe() {
        let (handler, session, _feed) = handler();

        let _a = handler.subscribe(quote_request("AAPL"));
        let _b = handler.subscribe(quote_request("AAPL"));

        assert_eq!(*session.quote_subscribes.lock(), 1);
        assert_eq!(handler.open_stream_count(), 2);
        let stats = handler.demand_stats(TickType::Quote);
        assert_eq!(stats.instrument_count, 1);
        assert_eq!(stats.consumer_count, 2);
    }

    #[tokio::test]
    async fn last_consumer_releases_provider_subscription() {
        let (handler, session, _feed) = handler();
        let request = quote_request("AAPL");
        let _a = handler.subscribe(request.clone());
        let _b = handler.subscribe(request.clone());

        assert!(handler.unsubscribe(&request));
        assert!(handler.controller().registry().contains("AAPL"));
        assert_eq!(*session.unsubscribes.lock(), 0);

        assert!(handler.unsubscribe(&request));
        assert!(handler.controller().registry().is_empty());
        assert_eq!(*session.unsubscribes.lock(), ChannelKind::ALL.len());

        assert!(!handler.unsubscribe(&request));
    }

    #[tokio::test]
    async fn unsubscribe_cancels_stream() {
        let (handler, _session, feed) = handler();
        let request = quote_request("AAPL");
        let _stream = handler.subscribe(request.clone());

        handler.unsubscribe(&request);

        assert!(feed.senders.lock().iter().all(|(token, _)| token.is_cancelled()));
    }

    #[tokio::test]
    async fn bulk_operations_delegate_to_controller() {
        let (handler, _session, _feed) = handler();
        let instruments = [InstrumentId::equity("AAPL"), InstrumentId::equity("MSFT")];

        assert!(handler.add(&instruments, TickType::Quote));
        assert_eq!(handler.controller().registry().len(), 2);
        assert!(handler.remove(&instruments, TickType::Quote));
        assert!(handler.controller().registry().is_empty());
    }

    #[tokio::test]
    async fn other_tick_type_keeps_provider_subscription() {
        let (handler, session, _feed) = handler();
        let _quotes = handler.subscribe(quote_request("AAPL"));
        let _bars = handler.subscribe(bar_request("AAPL"));

        assert!(handler.unsubscribe(&quote_request("AAPL")));

        assert!(handler.controller().registry().contains("AAPL"));
        assert_eq!(*session.unsubscribes.lock(), 0);

        assert!(handler.unsubscribe(&bar_request("AAPL")));
        assert!(handler.controller().registry().is_empty());
    }

    #[tokio::test]
    async fn ended_stream_releases_demand() {
        let (handler, session, feed) = handler();
        let _stream = handler.subscribe(quote_request("AAPL"));

        for (token, _) in feed.senders.lock().iter() {
            token.cancel();
        }

        for _ in 0..200 {
            if handler.open_stream_count() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(handler.open_stream_count(), 0);
        assert!(handler.controller().registry().is_empty());
        assert_eq!(*session.unsubscribes.lock(), ChannelKind::ALL.len());
        assert_eq!(handler.demand_stats(TickType::Quote), DemandStats::default());
    }

    #[tokio::test]
    async fn close_all_releases_provider_subscriptions() {
        let (handler, _session, feed) = handler();
        let _a = handler.subscribe(quote_request("AAPL"));
        let _b = handler.subscribe(bar_request("MSFT"));

        handler.close_all();

        assert_eq!(handler.open_stream_count(), 0);
        assert!(handler.controller().registry().is_empty());
        assert!(feed.senders.lock().iter().all(|(token, _)| token.is_cancelled()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subscribe_unsubscribe_converges() {
        let (handler, _session, _feed) = handler();
        let handler = Arc::new(handler);
        let request = quote_request("AAPL");

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handler = Arc::clone(&handler);
                let request = request.clone();
                tokio::task::spawn_blocking(move || {
                    for _ in 0..100 {
                        let _stream = handler.subscribe(request.clone());
                        handler.unsubscribe(&request);
                    }
                    handler.subscribe(request)
                })
            })
            .collect();

        let mut streams = Vec::new();
        for worker in workers {
            streams.push(worker.await.unwrap());
        }

        assert_eq!(handler.open_stream_count(), 4);
        assert!(handler.controller().registry().contains("AAPL"));
        assert_eq!(handler.demand_stats(TickType::Quote).consumer_count, 4);
    }
}
