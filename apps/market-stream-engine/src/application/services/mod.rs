//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamSubscriptionController`: keeps provider channels in line with
//!   the subscription registry
//! - `MessageNormalizer`: turns drained provider records into canonical
//!   events
//! - `DrainWorker`: services data-received notifications off the provider
//!   thread
//! - `DataQueueHandler`: host-facing subscribe/unsubscribe with demand
//!   tracking

mod controller;
mod data_queue;
mod drain;
mod normalizer;

pub use controller::{StreamSubscriptionController, is_universe_ticker};
pub use data_queue::{DataQueueHandler, can_subscribe};
pub use drain::DrainWorker;
pub use normalizer::{ChartCategoryPolicy, DrainStats, MessageNormalizer, NormalizerTotals};
