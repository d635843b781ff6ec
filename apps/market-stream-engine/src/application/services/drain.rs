//! Drain worker.
//!
//! Moves queue draining off the provider's I/O thread. The data handler
//! handed to the session only flags the tag and pokes a bounded channel; a
//! tokio task does the draining and normalization. While a drain for a tag
//! is pending, further notifications for that tag are folded into it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::normalizer::MessageNormalizer;
use crate::application::ports::{DataHandler, IdentifierMapper, StreamingSession};
use crate::domain::channel::ChannelCategoryTag;
use crate::infrastructure::metrics;

/// Smallest notification queue that can hold one pending drain per tag.
const MIN_CAPACITY: usize = ChannelCategoryTag::ALL.len();

#[derive(Debug, Default)]
struct PendingFlags {
    flags: [AtomicBool; MIN_CAPACITY],
}

impl PendingFlags {
    const fn flag(&self, tag: ChannelCategoryTag) -> &AtomicBool {
        match tag {
            ChannelCategoryTag::Quote => &self.flags[0],
            ChannelCategoryTag::Chart => &self.flags[1],
        }
    }

    /// Mark `tag` pending. Returns false if it already was.
    fn mark(&self, tag: ChannelCategoryTag) -> bool {
        !self.flag(tag).swap(true, Ordering::AcqRel)
    }

    fn clear(&self, tag: ChannelCategoryTag) {
        self.flag(tag).store(false, Ordering::Release);
    }
}

/// Spawns the task that services data-received notifications.
pub struct DrainWorker;

impl DrainWorker {
    /// Spawn the worker on the current runtime.
    ///
    /// Returns the handler to attach to the session and the worker's join
    /// handle. The worker stops when `cancel` fires or every handler clone
    /// has been dropped.
    #[must_use]
    pub fn spawn<S, M>(
        normalizer: Arc<MessageNormalizer<S, M>>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (DataHandler, JoinHandle<()>)
    where
        S: StreamingSession + ?Sized + 'static,
        M: IdentifierMapper + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<ChannelCategoryTag>(capacity.max(MIN_CAPACITY));
        let pending = Arc::new(PendingFlags::default());

        let handler_pending = Arc::clone(&pending);
        let handler: DataHandler = Arc::new(move |tag| {
            if !handler_pending.mark(tag) {
                metrics::record_notification_coalesced(tag);
                return;
            }
            if tx.try_send(tag).is_err() {
                // Only reachable once the worker has stopped.
                handler_pending.clear(tag);
                tracing::debug!(
                    queue = tag.as_str(),
                    "Drain worker stopped, notification discarded"
                );
            }
        });

        let handle = tokio::spawn(async move {
            tracing::debug!("Drain worker started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("Drain worker cancelled");
                        break;
                    }
                    received = rx.recv() => {
                        let Some(tag) = received else {
                            tracing::debug!("All data handlers dropped, drain worker exiting");
                            break;
                        };
                        pending.clear(tag);
                        normalizer.on_data_received(tag);
                    }
                }
            }
        });

        (handler, handle)
    }
}
