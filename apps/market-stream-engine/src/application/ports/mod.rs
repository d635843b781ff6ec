//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamingSession`: the provider's streaming session (commands plus
//!   drainable inbound queues)
//! - `IdentifierMapper`: provider ticker ⇄ canonical instrument
//! - `EventSink`: downstream consumer of canonical events
//! - `EventFeed`: an `EventSink` that host consumers can open filtered
//!   streams on

use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::domain::channel::{ChannelCategoryTag, ChannelKind, QuoteFeed};
use crate::domain::instrument::{InstrumentId, SecurityCategory, SubscriptionRequest};
use crate::domain::streaming::{InboundBatch, MarketEvent};

/// Callback the provider invokes when records are ready in a queue.
///
/// Called from the provider's I/O thread; implementations must not block.
pub type DataHandler = Arc<dyn Fn(ChannelCategoryTag) + Send + Sync>;

/// Provider streaming session.
///
/// Commands are fire-and-forget: the provider acknowledges asynchronously
/// and failures are not reported back to the caller.
pub trait StreamingSession: Send + Sync {
    /// Log the session in for an account.
    fn login(&self, account_id: &str);

    /// Open a level-one quote subscription for a ticker.
    fn subscribe_quote(&self, feed: QuoteFeed, ticker: &str);

    /// Open a minute chart subscription for a ticker.
    fn subscribe_minute_bar(&self, is_equity: bool, ticker: &str);

    /// Close a whole provider channel.
    fn unsubscribe_channel(&self, channel: ChannelKind);

    /// Register a data-received handler.
    ///
    /// Registering the same handler twice produces duplicate notifications.
    fn attach_data_handler(&self, handler: DataHandler);

    /// Remove and return everything currently queued for a tag.
    ///
    /// Must not wait for new records.
    fn drain(&self, tag: ChannelCategoryTag) -> InboundBatch;
}

/// Bidirectional provider ticker mapping.
#[cfg_attr(test, mockall::automock)]
pub trait IdentifierMapper: Send + Sync {
    /// Provider ticker for an instrument.
    fn to_provider_ticker(&self, instrument: &InstrumentId) -> String;

    /// Instrument for a provider ticker of a known category.
    fn to_instrument(&self, provider_ticker: &str, category: SecurityCategory) -> InstrumentId;
}

/// Downstream consumer of canonical events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn update(&self, event: MarketEvent);
}

/// Stream of canonical events handed to one host consumer.
pub type EventStream = ReceiverStream<MarketEvent>;

/// Event sink that fans events out to filtered host streams.
pub trait EventFeed: EventSink {
    /// Open a stream carrying the events that satisfy `request`.
    ///
    /// The stream ends once `cancel` fires or the feed is dropped. The feed
    /// fires `cancel` itself when the host drops the stream. Must be called
    /// within a tokio runtime.
    fn open_stream(&self, request: &SubscriptionRequest, cancel: CancellationToken) -> EventStream;
}
