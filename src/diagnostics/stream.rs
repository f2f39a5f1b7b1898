use embassy_time::{Duration, Instant};

use super::ring::{ByteRing, LogChunk};

/// Extra sink every log write is copied to, typically the console UART.
pub trait LogMirror {
    fn mirror(&mut self, bytes: &[u8]);
}

impl LogMirror for () {
    fn mirror(&mut self, _bytes: &[u8]) {}
}

/// Every write goes to the mirror and the rolling ring, and to the early ring while it is open.
///
/// The early ring only records while the device is younger than `early_window`; after that
/// its contents stay frozen for post-mortem reads. The rolling ring always records and
/// carries the global sequence numbers readers use as cursors.
pub struct DiagLog<M, const EARLY: usize, const ROLLING: usize> {
    mirror: M,
    early: ByteRing<EARLY>,
    rolling: ByteRing<ROLLING>,
    boot: Instant,
    early_window: Duration,
    early_open: bool,
}

impl<M: LogMirror, const EARLY: usize, const ROLLING: usize> DiagLog<M, EARLY, ROLLING> {
    pub const fn new(mirror: M, boot: Instant, early_window: Duration) -> Self {
        Self {
            mirror,
            early: ByteRing::new(),
            rolling: ByteRing::new(),
            boot,
            early_window,
            early_open: true,
        }
    }

    pub fn boot(&self) -> Instant {
        self.boot
    }

    pub fn write(&mut self, at: Instant, bytes: &[u8]) {
        self.mirror.mirror(bytes);
        if self.early_open {
            if at.saturating_duration_since(self.boot) >= self.early_window {
                self.early_open = false;
            } else {
                self.early.write(bytes);
            }
        }
        self.rolling.write(bytes);
    }

    pub fn current_sequence(&self) -> u64 {
        self.rolling.total()
    }

    pub fn copy_since(&self, since: u64, out: &mut [u8]) -> LogChunk {
        self.rolling.copy_since(since, out)
    }

    pub fn early_capture_open(&self) -> bool {
        self.early_open
    }

    pub fn early_len(&self) -> usize {
        self.early.len()
    }

    /// Early-boot bytes, oldest first. Returns the number copied.
    pub fn copy_early(&self, out: &mut [u8]) -> usize {
        let skip = self.early.len().saturating_sub(out.len()) as u64;
        self.early.copy_since(self.early.oldest() + skip, out).len
    }

    pub fn mirror_mut(&mut self) -> &mut M {
        &mut self.mirror
    }
}
