use core::{cell::RefCell, fmt::Write};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_time::Instant;
use log::{LevelFilter, Log, Metadata, Record};

use super::stream::{DiagLog, LogMirror};
use crate::config::LOG_LINE_MAX;

/// [`DiagLog`] behind a critical-section mutex, usable as the global `log` backend.
///
/// Every writer takes the lock only for the copy into the rings, so readers tailing the log
/// never hold up a writer for longer than one line.
pub struct SharedDiagLog<M, const EARLY: usize, const ROLLING: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<DiagLog<M, EARLY, ROLLING>>>,
    boot: Instant,
    level: LevelFilter,
}

impl<M: LogMirror, const EARLY: usize, const ROLLING: usize> SharedDiagLog<M, EARLY, ROLLING> {
    pub fn new(log: DiagLog<M, EARLY, ROLLING>, level: LevelFilter) -> Self {
        let boot = log.boot();
        Self {
            inner: Mutex::new(RefCell::new(log)),
            boot,
            level,
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut DiagLog<M, EARLY, ROLLING>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn write(&self, at: Instant, bytes: &[u8]) {
        self.with(|log| log.write(at, bytes));
    }

    pub fn current_sequence(&self) -> u64 {
        self.with(|log| log.current_sequence())
    }

    /// Formats one record as `[uptime_ms] LEVEL target: message` and appends it.
    pub fn write_record(&self, at: Instant, record: &Record<'_>) {
        let mut line = LineBuf::new();
        let uptime_ms = at.saturating_duration_since(self.boot).as_millis();
        let _ = write!(
            line,
            "[{}] {} {}: {}",
            uptime_ms,
            record.level(),
            record.target(),
            record.args()
        );
        line.finish();
        self.write(at, line.as_bytes());
    }
}

impl<M, const EARLY: usize, const ROLLING: usize> Log for SharedDiagLog<M, EARLY, ROLLING>
where
    M: LogMirror + Send,
{
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.write_record(Instant::now(), record);
        }
    }

    fn flush(&self) {}
}

/// Line buffer that truncates instead of failing when a message is too long.
struct LineBuf {
    bytes: [u8; LOG_LINE_MAX],
    len: usize,
}

impl LineBuf {
    const fn new() -> Self {
        Self {
            bytes: [0; LOG_LINE_MAX],
            len: 0,
        }
    }

    fn finish(&mut self) {
        if self.len == self.bytes.len() {
            self.len -= 1;
        }
        self.bytes[self.len] = b'\n';
        self.len += 1;
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        // Reserve the last byte for the newline.
        let room = self.bytes.len() - 1 - self.len;
        let take = s.len().min(room);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}
