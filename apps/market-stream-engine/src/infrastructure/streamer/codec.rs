//! Streamer Frame Codec
//!
//! Decodes JSON data frames from the streaming provider into native
//! records, routed to the quote or chart queue by service name.
//!
//! # Frame Format
//!
//! ```json
//! {"data": [
//!   {"service": "QUOTE", "timestamp": 1700000000123, "content": [{"key": "AAPL", ...}]},
//!   {"service": "CHART_FUTURES", "timestamp": 1700000000456, "content": [{"key": "/ES", ...}]}
//! ]}
//! ```
//!
//! Frames without a `data` array (heartbeats, command responses) decode to
//! nothing. Services this engine does not consume are skipped.

use serde::Deserialize;

use crate::domain::channel::{ChannelCategoryTag, ChannelKind};
use crate::domain::streaming::{InstrumentType, LevelOneQuote, MinuteChartData};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    data: Vec<ServiceData>,
}

#[derive(Debug, Deserialize)]
struct ServiceData {
    service: String,
    #[serde(default)]
    content: Vec<serde_json::Value>,
}

/// Records decoded from one frame, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFrame {
    /// Level-one quotes from any quote service.
    pub quotes: Vec<LevelOneQuote>,
    /// Minute chart records.
    pub charts: Vec<MinuteChartData>,
}

impl DecodedFrame {
    /// Queue tags this frame carries records for.
    #[must_use]
    pub fn tags(&self) -> Vec<ChannelCategoryTag> {
        let mut tags = Vec::with_capacity(2);
        if !self.quotes.is_empty() {
            tags.push(ChannelCategoryTag::Quote);
        }
        if !self.charts.is_empty() {
            tags.push(ChannelCategoryTag::Chart);
        }
        tags
    }

    /// Whether the frame carried no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty() && self.charts.is_empty()
    }
}

/// Channel kind a service name belongs to.
#[must_use]
pub fn channel_for_service(service: &str) -> Option<ChannelKind> {
    ChannelKind::ALL
        .iter()
        .copied()
        .find(|kind| kind.service_name() == service)
}

/// JSON codec for streamer data frames.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or a record of a
    /// consumed service does not match its schema.
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                trimmed.chars().take(50).collect::<String>()
            )));
        }

        let frame: Frame = serde_json::from_str(trimmed)?;
        let mut decoded = DecodedFrame::default();

        for entry in frame.data {
            let Some(channel) = channel_for_service(&entry.service) else {
                tracing::trace!(service = %entry.service, "Skipping unconsumed service");
                continue;
            };

            match channel.category_tag() {
                ChannelCategoryTag::Quote => {
                    for value in entry.content {
                        decoded.quotes.push(serde_json::from_value(value)?);
                    }
                }
                ChannelCategoryTag::Chart => {
                    let is_equity_chart = channel.service_name() == "CHART_EQUITY";
                    for value in entry.content {
                        let mut chart: MinuteChartData = serde_json::from_value(value)?;
                        if is_equity_chart && chart.instrument_type == InstrumentType::Unknown {
                            chart.instrument_type = InstrumentType::Equity;
                        }
                        decoded.charts.push(chart);
                    }
                }
            }
        }

        Ok(decoded)
    }
}
