//! Streamer Provider Adapters
//!
//! Adapters for the broker's streaming session:
//!
//! - **Codec**: JSON data frames into native quote and chart records
//! - **Queues**: per-category FIFO queues the session drains from
//! - **Replay**: a `StreamingSession` driven by recorded frames
//! - **Symbols**: streamer ticker conventions (`$SPX`, `/ES`, `EUR/USD`)

pub mod codec;
pub mod queues;
pub mod replay;
pub mod symbols;

pub use codec::{CodecError, DecodedFrame, FrameCodec, channel_for_service};
pub use queues::MarketDataQueues;
pub use replay::{ReplayError, ReplaySession, ReplaySummary, SessionCommand};
pub use symbols::StreamerSymbolMapper;
