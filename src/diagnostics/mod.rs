//! Diagnostics log: a ring-buffered byte stream and its remote readers.

mod stream;
mod logger;
mod ring;
mod tail;

pub use stream::{DiagLog, LogMirror};
pub use logger::SharedDiagLog;
pub use ring::{chunk_bounds, ByteRing, ChunkBounds, LogChunk};
pub use tail::{
    ChunkedTail, LineViewer, TailCursor, TailFrame, CHUNK_FRAME_MIN, CHUNK_TERMINATOR,
};

use crate::config::{EARLY_LOG_CAPACITY, LOG_TAIL_CHUNK_MAX, ROLLING_LOG_CAPACITY};

/// The gateway's log with the build-time ring sizes.
pub type GatewayLog<M> = DiagLog<M, EARLY_LOG_CAPACITY, ROLLING_LOG_CAPACITY>;
pub type SharedGatewayLog<M> = SharedDiagLog<M, EARLY_LOG_CAPACITY, ROLLING_LOG_CAPACITY>;
pub type GatewayLineViewer = LineViewer<LOG_TAIL_CHUNK_MAX>;
