use core::sync::atomic::{AtomicU32, Ordering};

pub const LINK_CODE_OK: u8 = 0;
pub const LINK_CODE_CONNECT_TIME: u8 = 11;

/// Handoff between the engine's status callback and the main loop.
///
/// The callback side only stores plain data: the latest code and a bumped event counter.
/// It never logs, allocates or blocks. The loop side drains on its next pass. There is
/// exactly one writer (the callback) and one reader (the loop).
pub struct StatusFlags {
    code: AtomicU32,
    posted: AtomicU32,
    seen: AtomicU32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusNotice {
    pub code: u8,
    /// Notifications folded into this one because the loop had not drained yet.
    pub coalesced: u32,
}

impl StatusFlags {
    pub const fn new() -> Self {
        Self {
            code: AtomicU32::new(LINK_CODE_OK as u32),
            posted: AtomicU32::new(0),
            seen: AtomicU32::new(0),
        }
    }

    /// Status callback entry point; safe from interrupt or driver context.
    pub fn post(&self, code: u8) {
        self.code.store(code as u32, Ordering::Relaxed);
        self.posted.fetch_add(1, Ordering::Release);
    }

    pub fn take(&self) -> Option<StatusNotice> {
        let posted = self.posted.load(Ordering::Acquire);
        let seen = self.seen.load(Ordering::Relaxed);
        if posted == seen {
            return None;
        }
        let code = self.code.load(Ordering::Relaxed) as u8;
        self.seen.store(posted, Ordering::Relaxed);
        Some(StatusNotice {
            code,
            coalesced: posted.wrapping_sub(seen).saturating_sub(1),
        })
    }

    pub fn pending(&self) -> bool {
        self.posted.load(Ordering::Acquire) != self.seen.load(Ordering::Relaxed)
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new()
    }
}

pub fn status_code_label(code: u8) -> &'static str {
    match code {
        0 => "none",
        1 => "param",
        2 => "open",
        3 => "device",
        4 => "alloc",
        5 => "user",
        6 => "connect",
        7 => "auth_fail",
        8 => "protocol",
        9 => "peer_dead",
        10 => "idle_timeout",
        11 => "connect_time",
        12 => "loopback",
        _ => "other",
    }
}
