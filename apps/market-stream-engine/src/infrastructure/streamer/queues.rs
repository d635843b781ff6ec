//! Per-category inbound queues filled by the provider's I/O side.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::domain::channel::ChannelCategoryTag;
use crate::domain::streaming::{InboundBatch, LevelOneQuote, MinuteChartData};

/// Lock-guarded FIFO queues for quotes and chart records.
#[derive(Debug, Default)]
pub struct MarketDataQueues {
    quotes: Mutex<VecDeque<LevelOneQuote>>,
    charts: Mutex<VecDeque<MinuteChartData>>,
}

impl MarketDataQueues {
    /// Create empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append quotes.
    pub fn push_quotes(&self, quotes: impl IntoIterator<Item = LevelOneQuote>) {
        self.quotes.lock().extend(quotes);
    }

    /// Append chart records.
    pub fn push_charts(&self, charts: impl IntoIterator<Item = MinuteChartData>) {
        self.charts.lock().extend(charts);
    }

    /// Take everything queued for `tag`.
    pub fn drain(&self, tag: ChannelCategoryTag) -> InboundBatch {
        match tag {
            ChannelCategoryTag::Quote => {
                let taken = std::mem::take(&mut *self.quotes.lock());
                InboundBatch::Quotes(taken.into())
            }
            ChannelCategoryTag::Chart => {
                let taken = std::mem::take(&mut *self.charts.lock());
                InboundBatch::Charts(taken.into())
            }
        }
    }

    /// Number of records waiting for `tag`.
    #[must_use]
    pub fn depth(&self, tag: ChannelCategoryTag) -> usize {
        match tag {
            ChannelCategoryTag::Quote => self.quotes.lock().len(),
            ChannelCategoryTag::Chart => self.charts.lock().len(),
        }
    }
}
