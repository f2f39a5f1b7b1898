/// Range of the global byte sequence a reader will receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkBounds {
    pub start: u64,
    pub end: u64,
    /// Bytes between the requested sequence and `start` that were already overwritten.
    pub dropped: u64,
}

impl ChunkBounds {
    pub const fn len(self) -> usize {
        (self.end - self.start) as usize
    }

    pub const fn is_empty(self) -> bool {
        self.end == self.start
    }
}

/// Computes what `copy_since` returns without touching a buffer.
///
/// `total` is the number of bytes ever written (the next sequence number). A request older
/// than the oldest retained byte is clamped forward and the gap reported; a request from the
/// future is clamped back to `total`.
pub fn chunk_bounds(total: u64, capacity: usize, requested: u64, max_chunk: usize) -> ChunkBounds {
    let oldest = total.saturating_sub(capacity as u64);
    let requested = requested.min(total);
    let start = requested.max(oldest);
    let end = start.saturating_add(max_chunk as u64).min(total);
    ChunkBounds {
        start,
        end,
        dropped: start - requested,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogChunk {
    pub len: usize,
    pub start: u64,
    /// Cursor to pass on the next call.
    pub next: u64,
    pub dropped: u64,
}

/// Fixed-capacity byte ring addressed by a monotonic sequence counter.
pub struct ByteRing<const N: usize> {
    buf: [u8; N],
    total: u64,
}

impl<const N: usize> ByteRing<N> {
    const NON_EMPTY: () = assert!(N > 0, "ring capacity must be non-zero");

    pub const fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            buf: [0; N],
            total: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Sequence number the next written byte will get.
    pub const fn total(&self) -> u64 {
        self.total
    }

    pub fn oldest(&self) -> u64 {
        self.total.saturating_sub(N as u64)
    }

    pub fn len(&self) -> usize {
        (self.total - self.oldest()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn write(&mut self, bytes: &[u8]) {
        // Only the tail of an oversized write survives; skip what would be overwritten anyway.
        let skip = bytes.len().saturating_sub(N);
        let kept = &bytes[skip..];
        self.total += skip as u64;

        let pos = (self.total % N as u64) as usize;
        let first = kept.len().min(N - pos);
        self.buf[pos..pos + first].copy_from_slice(&kept[..first]);
        let rest = kept.len() - first;
        self.buf[..rest].copy_from_slice(&kept[first..]);
        self.total += kept.len() as u64;
    }

    pub fn copy_since(&self, since: u64, out: &mut [u8]) -> LogChunk {
        let bounds = chunk_bounds(self.total, N, since, out.len());
        let len = bounds.len();
        let pos = (bounds.start % N as u64) as usize;
        let first = len.min(N - pos);
        out[..first].copy_from_slice(&self.buf[pos..pos + first]);
        out[first..len].copy_from_slice(&self.buf[..len - first]);
        LogChunk {
            len,
            start: bounds.start,
            next: bounds.end,
            dropped: bounds.dropped,
        }
    }
}

impl<const N: usize> Default for ByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
