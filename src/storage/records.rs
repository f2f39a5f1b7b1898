use heapless::String;

use crate::config::{
    default_ap_credentials, AP_CREDENTIALS_MAGIC, AP_CREDENTIALS_RECORD_LEN,
    AP_CREDENTIALS_VERSION, AP_PASSWORD_MAX, AP_SSID_MAX, BOOT_DIAGNOSTICS_MAGIC,
    BOOT_DIAGNOSTICS_RECORD_LEN, BOOT_DIAGNOSTICS_VERSION,
};

// Shared layout: magic (u32 LE), version, payload, checksum8 over everything before it.
const HEADER_LEN: usize = 5;

pub(super) fn checksum8(bytes: &[u8]) -> u8 {
    let mut acc = 0x5Au8;
    for &byte in bytes {
        acc ^= byte.rotate_left(1);
    }
    acc
}

fn seal<const N: usize>(record: &mut [u8; N], magic: u32, version: u8) {
    record[0..4].copy_from_slice(&magic.to_le_bytes());
    record[4] = version;
    record[N - 1] = checksum8(&record[..N - 1]);
}

/// Payload of a record that passed the erased, magic, version and checksum checks.
fn open<const N: usize>(record: &[u8; N], magic: u32, version: u8) -> Option<&[u8]> {
    if record.iter().all(|&byte| byte == 0xFF) {
        return None;
    }
    if u32::from_le_bytes([record[0], record[1], record[2], record[3]]) != magic {
        return None;
    }
    if record[4] != version {
        return None;
    }
    if record[N - 1] != checksum8(&record[..N - 1]) {
        return None;
    }
    Some(&record[HEADER_LEN..N - 1])
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApCredentials {
    pub ssid: String<AP_SSID_MAX>,
    pub password: String<AP_PASSWORD_MAX>,
}

impl ApCredentials {
    /// `None` when the SSID is empty or either field is too long.
    pub fn new(ssid: &str, password: &str) -> Option<Self> {
        if ssid.is_empty() {
            return None;
        }
        let mut creds = Self {
            ssid: String::new(),
            password: String::new(),
        };
        creds.ssid.push_str(ssid).ok()?;
        creds.password.push_str(password).ok()?;
        Some(creds)
    }

    /// Credentials baked into the build; used when nothing valid is stored.
    pub fn compiled_in() -> Self {
        let (ssid, password) = default_ap_credentials();
        Self::new(ssid, password)
            .or_else(|| Self::new(ssid, ""))
            .unwrap_or_else(|| {
                let mut ssid = String::new();
                let _ = ssid.push_str("pppgate");
                Self {
                    ssid,
                    password: String::new(),
                }
            })
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    pub(super) fn encode(&self) -> [u8; AP_CREDENTIALS_RECORD_LEN] {
        let mut record = [0u8; AP_CREDENTIALS_RECORD_LEN];
        let mut at = HEADER_LEN;
        record[at] = self.ssid.len() as u8;
        at += 1;
        record[at..at + self.ssid.len()].copy_from_slice(self.ssid.as_bytes());
        at += AP_SSID_MAX;
        record[at] = self.password.len() as u8;
        at += 1;
        record[at..at + self.password.len()].copy_from_slice(self.password.as_bytes());
        seal(&mut record, AP_CREDENTIALS_MAGIC, AP_CREDENTIALS_VERSION);
        record
    }

    pub(super) fn decode(record: &[u8; AP_CREDENTIALS_RECORD_LEN]) -> Option<Self> {
        let payload = open(record, AP_CREDENTIALS_MAGIC, AP_CREDENTIALS_VERSION)?;
        let ssid_len = payload[0] as usize;
        if ssid_len > AP_SSID_MAX {
            return None;
        }
        let ssid = core::str::from_utf8(&payload[1..1 + ssid_len]).ok()?;
        let pw_at = 1 + AP_SSID_MAX;
        let pw_len = payload[pw_at] as usize;
        if pw_len > AP_PASSWORD_MAX {
            return None;
        }
        let password = core::str::from_utf8(&payload[pw_at + 1..pw_at + 1 + pw_len]).ok()?;
        Self::new(ssid, password)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResetReason {
    #[default]
    Unknown,
    PowerOn,
    External,
    Software,
    Panic,
    InterruptWatchdog,
    TaskWatchdog,
    OtherWatchdog,
    DeepSleep,
    Brownout,
}

impl ResetReason {
    pub fn as_persisted(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::PowerOn => 1,
            Self::External => 2,
            Self::Software => 3,
            Self::Panic => 4,
            Self::InterruptWatchdog => 5,
            Self::TaskWatchdog => 6,
            Self::OtherWatchdog => 7,
            Self::DeepSleep => 8,
            Self::Brownout => 9,
        }
    }

    pub fn from_persisted(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::PowerOn),
            2 => Some(Self::External),
            3 => Some(Self::Software),
            4 => Some(Self::Panic),
            5 => Some(Self::InterruptWatchdog),
            6 => Some(Self::TaskWatchdog),
            7 => Some(Self::OtherWatchdog),
            8 => Some(Self::DeepSleep),
            9 => Some(Self::Brownout),
            _ => None,
        }
    }

    /// Maps the ESP32 ROM reset code of the boot CPU.
    pub fn from_rom_code(code: u32) -> Self {
        match code {
            1 => Self::PowerOn,
            3 | 12 => Self::Software,
            5 => Self::DeepSleep,
            6 | 14 => Self::External,
            7 | 8 => Self::TaskWatchdog,
            11 => Self::InterruptWatchdog,
            4 | 9 | 13 | 16 => Self::OtherWatchdog,
            15 => Self::Brownout,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::PowerOn => "power_on",
            Self::External => "external",
            Self::Software => "software",
            Self::Panic => "panic",
            Self::InterruptWatchdog => "int_wdt",
            Self::TaskWatchdog => "task_wdt",
            Self::OtherWatchdog => "wdt",
            Self::DeepSleep => "deep_sleep",
            Self::Brownout => "brownout",
        }
    }

    /// Resets that point at a fault rather than an operator or power event.
    pub const fn is_fault(self) -> bool {
        matches!(
            self,
            Self::Panic
                | Self::InterruptWatchdog
                | Self::TaskWatchdog
                | Self::OtherWatchdog
                | Self::Brownout
        )
    }
}

/// CPU state captured by the exception handler before the reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExceptionRegisters {
    pub cause: u32,
    pub pc: u32,
    pub fault_addr: u32,
    pub double_pc: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BootDiagnostics {
    pub boot_count: u32,
    pub reset_reason: ResetReason,
    pub registers: ExceptionRegisters,
}

impl BootDiagnostics {
    pub(super) fn encode(&self) -> [u8; BOOT_DIAGNOSTICS_RECORD_LEN] {
        let mut record = [0u8; BOOT_DIAGNOSTICS_RECORD_LEN];
        record[5..9].copy_from_slice(&self.boot_count.to_le_bytes());
        record[9] = self.reset_reason.as_persisted();
        let regs = [
            self.registers.cause,
            self.registers.pc,
            self.registers.fault_addr,
            self.registers.double_pc,
        ];
        for (slot, value) in record[10..26].chunks_exact_mut(4).zip(regs) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
        seal(&mut record, BOOT_DIAGNOSTICS_MAGIC, BOOT_DIAGNOSTICS_VERSION);
        record
    }

    pub(super) fn decode(record: &[u8; BOOT_DIAGNOSTICS_RECORD_LEN]) -> Option<Self> {
        let payload = open(record, BOOT_DIAGNOSTICS_MAGIC, BOOT_DIAGNOSTICS_VERSION)?;
        let word = |at: usize| {
            u32::from_le_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]])
        };
        Some(Self {
            boot_count: word(0),
            reset_reason: ResetReason::from_persisted(payload[4])?,
            registers: ExceptionRegisters {
                cause: word(5),
                pc: word(9),
                fault_addr: word(13),
                double_pc: word(17),
            },
        })
    }
}
