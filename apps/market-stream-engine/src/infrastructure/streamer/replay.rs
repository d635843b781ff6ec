//! Replay Streaming Session
//!
//! A `StreamingSession` fed from recorded streamer frames instead of a live
//! socket. Commands are recorded and applied to an open-service book so
//! callers can inspect what a live provider would have been asked to do.
//! Frames are decoded, queued and announced to every attached handler, one
//! notification per queue touched.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use parking_lot::{Mutex, RwLock};

use super::codec::{CodecError, FrameCodec};
use super::queues::MarketDataQueues;
use crate::application::ports::{DataHandler, StreamingSession};
use crate::domain::channel::{ChannelCategoryTag, ChannelKind, ChartFeed, QuoteFeed};
use crate::domain::streaming::InboundBatch;

/// Command issued to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Account login.
    Login {
        /// Account logged in.
        account_id: String,
    },
    /// Level-one quote subscribe.
    SubscribeQuote {
        /// Quote feed.
        feed: QuoteFeed,
        /// Provider ticker.
        ticker: String,
    },
    /// Minute chart subscribe.
    SubscribeMinuteBar {
        /// Equity chart rather than futures chart.
        is_equity: bool,
        /// Provider ticker.
        ticker: String,
    },
    /// Whole-channel unsubscribe.
    Unsubscribe(ChannelKind),
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Reading the recording failed.
    #[error("replay I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame failed to decode.
    #[error("frame decode error: {0}")]
    Codec(#[from] CodecError),
}

/// Outcome of replaying a recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Frames ingested.
    pub frames: usize,
    /// Records queued.
    pub records: usize,
    /// Lines that failed to decode and were skipped.
    pub rejected: usize,
}

/// Streaming session driven by recorded frames.
#[derive(Default)]
pub struct ReplaySession {
    codec: FrameCodec,
    queues: MarketDataQueues,
    handlers: RwLock<Vec<DataHandler>>,
    commands: Mutex<Vec<SessionCommand>>,
    open_services: Mutex<BTreeMap<&'static str, BTreeSet<String>>>,
}

impl ReplaySession {
    /// Create a session with nothing open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame, queue its records and notify handlers.
    ///
    /// Returns the number of records queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame fails to decode. Nothing is queued in
    /// that case.
    pub fn ingest(&self, frame: &str) -> Result<usize, CodecError> {
        let decoded = self.codec.decode(frame)?;
        let tags = decoded.tags();
        let records = decoded.quotes.len() + decoded.charts.len();

        self.queues.push_quotes(decoded.quotes);
        self.queues.push_charts(decoded.charts);

        let handlers = self.handlers.read().clone();
        for tag in tags {
            for handler in &handlers {
                handler(tag);
            }
        }

        Ok(records)
    }

    /// Replay newline-delimited frames from a reader.
    ///
    /// Blank lines are ignored; lines that fail to decode are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub fn replay_lines(&self, reader: impl BufRead) -> Result<ReplaySummary, ReplayError> {
        let mut summary = ReplaySummary::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match self.ingest(&line) {
                Ok(records) => {
                    summary.frames += 1;
                    summary.records += records;
                }
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "Skipping undecodable frame");
                    summary.rejected += 1;
                }
            }
        }

        tracing::info!(
            frames = summary.frames,
            records = summary.records,
            rejected = summary.rejected,
            "Replay complete"
        );

        Ok(summary)
    }

    /// Replay a newline-delimited frame file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn replay_file(&self, path: &Path) -> Result<ReplaySummary, ReplayError> {
        tracing::info!(path = %path.display(), "Replaying recorded frames");
        let file = File::open(path)?;
        self.replay_lines(BufReader::new(file))
    }

    /// Commands issued so far, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<SessionCommand> {
        self.commands.lock().clone()
    }

    /// Remove and return the commands issued so far.
    pub fn take_commands(&self) -> Vec<SessionCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Open services with the number of tickers on each.
    #[must_use]
    pub fn open_services(&self) -> BTreeMap<String, usize> {
        self.open_services
            .lock()
            .iter()
            .map(|(service, tickers)| ((*service).to_string(), tickers.len()))
            .collect()
    }

    /// Whether a ticker is open on a service.
    #[must_use]
    pub fn is_open(&self, service: &str, ticker: &str) -> bool {
        self.open_services
            .lock()
            .get(service)
            .is_some_and(|tickers| tickers.contains(ticker))
    }

    /// Number of attached data handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Records waiting in a queue.
    #[must_use]
    pub fn queue_depth(&self, tag: ChannelCategoryTag) -> usize {
        self.queues.depth(tag)
    }

    fn open(&self, channel: ChannelKind, ticker: &str) {
        self.open_services
            .lock()
            .entry(channel.service_name())
            .or_default()
            .insert(ticker.to_string());
    }

    fn record(&self, command: SessionCommand) {
        self.commands.lock().push(command);
    }
}

impl StreamingSession for ReplaySession {
    fn login(&self, account_id: &str) {
        self.record(SessionCommand::Login {
            account_id: account_id.to_string(),
        });
    }

    fn subscribe_quote(&self, feed: QuoteFeed, ticker: &str) {
        self.open(ChannelKind::Quote(feed), ticker);
        self.record(SessionCommand::SubscribeQuote {
            feed,
            ticker: ticker.to_string(),
        });
    }

    fn subscribe_minute_bar(&self, is_equity: bool, ticker: &str) {
        let feed = if is_equity {
            ChartFeed::Equity
        } else {
            ChartFeed::Future
        };
        self.open(ChannelKind::MinuteBar(feed), ticker);
        self.record(SessionCommand::SubscribeMinuteBar {
            is_equity,
            ticker: ticker.to_string(),
        });
    }

    fn unsubscribe_channel(&self, channel: ChannelKind) {
        self.open_services.lock().remove(channel.service_name());
        self.record(SessionCommand::Unsubscribe(channel));
    }

    fn attach_data_handler(&self, handler: DataHandler) {
        self.handlers.write().push(handler);
    }

    fn drain(&self, tag: ChannelCategoryTag) -> InboundBatch {
        self.queues.drain(tag)
    }
}
