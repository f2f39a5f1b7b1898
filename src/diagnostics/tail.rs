use core::fmt::Write as _;

use super::stream::{DiagLog, LogMirror};
use crate::config::LOG_TAIL_CHUNK_MAX;

pub const CHUNK_TERMINATOR: &[u8] = b"0\r\n\r\n";

// "<hex len>\r\n" for a chunk of at most 0xFFFF_FFFF bytes.
const CHUNK_HEADER_MAX: usize = 8 + 2;
const CHUNK_TRAILER: &[u8] = b"\r\n";

/// Smallest `out` buffer `ChunkedTail::poll` can frame a chunk into.
pub const CHUNK_FRAME_MIN: usize = CHUNK_HEADER_MAX + 1 + CHUNK_TRAILER.len();

/// Read position of one remote log reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TailCursor {
    next: u64,
}

impl TailCursor {
    /// Resumes at the cursor the reader last acknowledged, or at the oldest retained byte
    /// when it has never read.
    pub fn resume(acked: Option<u64>) -> Self {
        Self {
            next: acked.unwrap_or(0),
        }
    }

    /// Starts at the current end of the log; only bytes written from now on are delivered.
    pub fn from_now<M: LogMirror, const E: usize, const R: usize>(log: &DiagLog<M, E, R>) -> Self {
        Self {
            next: log.current_sequence(),
        }
    }

    pub fn position(&self) -> u64 {
        self.next
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TailFrame {
    /// Bytes of `out` to send.
    pub len: usize,
    /// Log bytes the reader missed because the ring overwrote them.
    pub dropped: u64,
}

/// Streams new log bytes as HTTP/1.1 chunked-transfer chunks.
pub struct ChunkedTail {
    cursor: TailCursor,
}

impl ChunkedTail {
    pub fn new(cursor: TailCursor) -> Self {
        Self { cursor }
    }

    pub fn cursor(&self) -> TailCursor {
        self.cursor
    }

    /// Frames what is new since the cursor as one chunk of at most `LOG_TAIL_CHUNK_MAX` bytes.
    ///
    /// Returns `None` when there is nothing new. Callers must pass at least `CHUNK_FRAME_MIN`
    /// bytes; a shorter `out` also yields `None` and leaves the cursor where it was.
    pub fn poll<M: LogMirror, const E: usize, const R: usize>(
        &mut self,
        log: &DiagLog<M, E, R>,
        out: &mut [u8],
    ) -> Option<TailFrame> {
        debug_assert!(out.len() >= CHUNK_FRAME_MIN);
        if out.len() < CHUNK_FRAME_MIN {
            return None;
        }
        let room = (out.len() - CHUNK_HEADER_MAX - CHUNK_TRAILER.len()).min(LOG_TAIL_CHUNK_MAX);
        let chunk = log.copy_since(self.cursor.next, &mut out[CHUNK_HEADER_MAX..][..room]);
        self.cursor.next = chunk.next;
        if chunk.len == 0 {
            return None;
        }

        let mut header = heapless::String::<CHUNK_HEADER_MAX>::new();
        let _ = write!(header, "{:x}\r\n", chunk.len);
        let header_len = header.len();
        // Slide the payload down so it sits right after the real header.
        out.copy_within(CHUNK_HEADER_MAX..CHUNK_HEADER_MAX + chunk.len, header_len);
        out[..header_len].copy_from_slice(header.as_bytes());
        let end = header_len + chunk.len;
        out[end..end + CHUNK_TRAILER.len()].copy_from_slice(CHUNK_TRAILER);

        Some(TailFrame {
            len: end + CHUNK_TRAILER.len(),
            dropped: chunk.dropped,
        })
    }
}

/// Renders new log bytes for a line-oriented remote viewer (telnet style).
///
/// Line feeds become CRLF. When the reader fell behind, a marker line naming the lost byte
/// count precedes the next bytes.
pub struct LineViewer<const SCRATCH: usize> {
    cursor: TailCursor,
    scratch: [u8; SCRATCH],
}

impl<const SCRATCH: usize> LineViewer<SCRATCH> {
    pub fn new(cursor: TailCursor) -> Self {
        Self {
            cursor,
            scratch: [0; SCRATCH],
        }
    }

    pub fn cursor(&self) -> TailCursor {
        self.cursor
    }

    pub fn poll<M: LogMirror, const E: usize, const R: usize>(
        &mut self,
        log: &DiagLog<M, E, R>,
        out: &mut [u8],
    ) -> Option<TailFrame> {
        let mut written = 0;
        let peek = log.copy_since(self.cursor.next, &mut []);
        if peek.dropped > 0 {
            let mut marker = heapless::String::<48>::new();
            let _ = write!(marker, "[... {} bytes lost ...]\r\n", peek.dropped);
            if marker.len() > out.len() {
                return None;
            }
            out[..marker.len()].copy_from_slice(marker.as_bytes());
            written = marker.len();
        }

        // Worst case every byte is a line feed and doubles.
        let budget = ((out.len() - written) / 2).min(SCRATCH);
        let chunk = log.copy_since(self.cursor.next, &mut self.scratch[..budget]);
        self.cursor.next = chunk.next;
        for &byte in &self.scratch[..chunk.len] {
            if byte == b'\n' {
                out[written] = b'\r';
                written += 1;
            }
            out[written] = byte;
            written += 1;
        }

        if written == 0 {
            return None;
        }
        Some(TailFrame {
            len: written,
            dropped: chunk.dropped,
        })
    }
}
