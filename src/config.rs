use heapless::Vec;

use crate::{broker::BrokerPolicy, nat::PortMapping};

pub const HEALTH_TICK_MS: u32 = 3_000;
pub const TELEMETRY_PERIOD_MS: u32 = 30_000;

// Reconnect bounds: quick recovery from a dropped carrier, one attempt a minute at worst.
pub const RECONNECT_MIN_BACKOFF_MS: u32 = 500;
pub const RECONNECT_MAX_BACKOFF_MS: u32 = 60_000;
// LCP/IPCP on a healthy peer completes in a few seconds; 30s covers a slow modem dial.
pub const LINK_CONNECT_TIMEOUT_MS: u32 = 30_000;

pub const BROKER_STALL_THRESHOLD_MS: u32 = 10_000;
pub const BROKER_SLICE_MS: u32 = 20;
pub const BROKER_SLICE_PERIOD_MS: u32 = 50;

pub const EARLY_LOG_CAPACITY: usize = 4_096;
pub const EARLY_CAPTURE_WINDOW_MS: u64 = 30_000;
pub const ROLLING_LOG_CAPACITY: usize = 8_192;
pub const LOG_TAIL_CHUNK_MAX: usize = 512;
pub const LOG_LINE_MAX: usize = 192;

pub const LINK_RX_CHUNK: usize = 256;
pub const LINK_TX_BUF: usize = 512;
// Upper bound of UART bytes pulled per pass so the broker and health checks keep running
// under a saturated link.
pub const LINK_RX_BUDGET_PER_PASS: usize = 1_024;

pub const NAT_TRANSLATION_ENTRIES: u16 = 512;
pub const NAT_PORT_MAP_ENTRIES: u8 = 32;
pub const NAT_PORT_MAP_SLOTS: usize = 8;

pub const AP_SSID_MAX: usize = 32;
pub const AP_PASSWORD_MAX: usize = 64;

pub const AP_CREDENTIALS_OFFSET: u32 = 0x0000;
pub const AP_CREDENTIALS_MAGIC: u32 = 0x4150_4352; // "APCR"
pub const AP_CREDENTIALS_VERSION: u8 = 1;
pub const AP_CREDENTIALS_RECORD_LEN: usize = 4 + 1 + 1 + AP_SSID_MAX + 1 + AP_PASSWORD_MAX + 1;

pub const BOOT_DIAGNOSTICS_OFFSET: u32 = 0x0100;
pub const BOOT_DIAGNOSTICS_MAGIC: u32 = 0x4244_4941; // "BDIA"
pub const BOOT_DIAGNOSTICS_VERSION: u8 = 1;
pub const BOOT_DIAGNOSTICS_RECORD_LEN: usize = 4 + 1 + 4 + 1 + 4 * 4 + 1;

pub const LOOP_IDLE_DELAY_US: u64 = 500;

pub fn default_ap_credentials() -> (&'static str, &'static str) {
    let ssid = option_env!("PPPGATE_AP_SSID").unwrap_or("pppgate");
    let password = option_env!("PPPGATE_AP_PASSWORD").unwrap_or("");
    (ssid, password)
}

/// Runtime knobs that decide which components run and how aggressively they recover.
///
/// The AP toggle and broker policy used to be compile-time switches; they are read once at
/// initialization and the supervisor composes its component set from them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayPolicy {
    pub ap_enabled: bool,
    pub broker: BrokerPolicy,
    pub min_backoff_ms: u32,
    pub max_backoff_ms: u32,
    pub health_tick_ms: u32,
    pub telemetry_period_ms: u32,
    pub connect_timeout_ms: u32,
    pub broker_stall_ms: u32,
    pub port_maps: Vec<PortMapping, NAT_PORT_MAP_SLOTS>,
}

impl GatewayPolicy {
    pub const fn defaults() -> Self {
        Self {
            ap_enabled: true,
            broker: BrokerPolicy::TimeSliced {
                period_ms: BROKER_SLICE_PERIOD_MS,
                slice_ms: BROKER_SLICE_MS,
            },
            min_backoff_ms: RECONNECT_MIN_BACKOFF_MS,
            max_backoff_ms: RECONNECT_MAX_BACKOFF_MS,
            health_tick_ms: HEALTH_TICK_MS,
            telemetry_period_ms: TELEMETRY_PERIOD_MS,
            connect_timeout_ms: LINK_CONNECT_TIMEOUT_MS,
            broker_stall_ms: BROKER_STALL_THRESHOLD_MS,
            port_maps: Vec::new(),
        }
    }

    /// Clamps values that would break the supervisor's invariants.
    pub fn validated(mut self) -> Self {
        self.min_backoff_ms = self.min_backoff_ms.max(1);
        self.max_backoff_ms = self.max_backoff_ms.max(self.min_backoff_ms);
        self.health_tick_ms = self.health_tick_ms.max(100);
        self.telemetry_period_ms = self.telemetry_period_ms.max(self.health_tick_ms);
        self.broker_stall_ms = self.broker_stall_ms.max(self.health_tick_ms);
        self
    }
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}
