//! Subscription Tracking
//!
//! Two layers of subscription state:
//!
//! - `SubscriptionRegistry`: what is live at the provider, keyed by provider
//!   ticker. Single source of truth for inbound record resolution.
//! - `DemandTracker`: which host consumers want which instruments, reference
//!   counted so that shared instruments are only added and removed once.

mod demand;
mod registry;

pub use demand::{ConsumerId, DemandChanges, DemandStats, DemandTracker};
pub use registry::{Subscription, SubscriptionRegistry};
