use core::{fmt::Write as _, net::Ipv4Addr};

use embassy_time::Duration;

use super::{ApStatus, SystemProbe};
use crate::link::LinkStatus;

pub const TELEMETRY_LINE_MAX: usize = 192;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub uptime_ms: u64,
    pub free_memory: u32,
    pub largest_free_block: u32,
    pub fragmentation_pct: u8,
    pub ap: ApStatus,
    pub link_status: LinkStatus,
    pub link_address: Option<Ipv4Addr>,
    /// Wall-clock seconds, if the clock was ever set.
    pub timestamp: Option<u64>,
}

/// Share of free memory not usable as one allocation, in percent.
pub fn fragmentation_pct(free: u32, largest_block: u32) -> u8 {
    if free == 0 {
        return 0;
    }
    let largest = largest_block.min(free) as u64;
    (100 - largest * 100 / free as u64) as u8
}

impl TelemetrySnapshot {
    pub fn capture<Y: SystemProbe>(
        uptime: Duration,
        system: &Y,
        ap: ApStatus,
        link_status: LinkStatus,
        link_address: Option<Ipv4Addr>,
    ) -> Self {
        let free_memory = system.free_memory();
        let largest_free_block = system.largest_free_block();
        Self {
            uptime_ms: uptime.as_millis(),
            free_memory,
            largest_free_block,
            fragmentation_pct: fragmentation_pct(free_memory, largest_free_block),
            ap,
            link_status,
            link_address,
            timestamp: system.wall_clock_secs(),
        }
    }

    pub fn log_line(&self) -> heapless::String<TELEMETRY_LINE_MAX> {
        let mut line = heapless::String::<TELEMETRY_LINE_MAX>::new();
        let _ = write!(
            line,
            "telemetry: uptime_ms={} free={} largest={} frag_pct={} ap_up={} stations={} link={}",
            self.uptime_ms,
            self.free_memory,
            self.largest_free_block,
            self.fragmentation_pct,
            self.ap.up,
            self.ap.stations,
            self.link_status.as_str(),
        );
        if let LinkStatus::Error(code) = self.link_status {
            let _ = write!(line, " code={}", code);
        }
        if let Some(addr) = self.link_address {
            let _ = write!(line, " link_addr={}", addr);
        }
        if let Some(ts) = self.timestamp {
            let _ = write!(line, " ts={}", ts);
        }
        line
    }
}
