//! ESP32 glue: time driver, UART transport, console mirror, flash records, logger install.

use embassy_time::{Duration, Instant};
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write, WriteReady};
use embedded_storage::ReadStorage as _;
use esp_hal::{
    rtc_cntl::reset_reason,
    system::Cpu,
    timer::timg::TimerGroup,
    uart::{RxError, TxError, Uart},
    Blocking,
};
use esp_storage::FlashStorage;
use log::LevelFilter;
use static_cell::StaticCell;

use crate::{
    config::EARLY_CAPTURE_WINDOW_MS,
    diagnostics::{DiagLog, LogMirror, SharedDiagLog, SharedGatewayLog},
    storage::{RecordStore, ResetReason},
};

/// Starts the scheduler tick that backs `embassy_time::Instant` on target.
pub fn start_clock(timg0: esp_hal::peripherals::TIMG0<'static>) {
    let timg0 = TimerGroup::new(timg0);
    esp_rtos::start(timg0.timer0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UartError {
    Rx,
    Tx,
}

impl embedded_io::Error for UartError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<RxError> for UartError {
    fn from(_: RxError) -> Self {
        Self::Rx
    }
}

impl From<TxError> for UartError {
    fn from(_: TxError) -> Self {
        Self::Tx
    }
}

/// Blocking UART exposed through the non-blocking readiness traits the link transport uses.
pub struct HalUart<'d> {
    uart: Uart<'d, Blocking>,
}

impl<'d> HalUart<'d> {
    pub fn new(uart: Uart<'d, Blocking>) -> Self {
        Self { uart }
    }
}

impl ErrorType for HalUart<'_> {
    type Error = UartError;
}

impl Read for HalUart<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.uart.read(buf)?)
    }
}

impl ReadReady for HalUart<'_> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.uart.read_ready())
    }
}

impl Write for HalUart<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.uart.write(buf)?)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.uart.flush()?)
    }
}

impl WriteReady for HalUart<'_> {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.uart.write_ready())
    }
}

/// Copies every log write to the console UART.
pub struct ConsoleMirror;

impl LogMirror for ConsoleMirror {
    fn mirror(&mut self, bytes: &[u8]) {
        esp_println::Printer::write_bytes(bytes);
    }
}

pub type ConsoleLog = SharedGatewayLog<ConsoleMirror>;

static LOGGER: StaticCell<ConsoleLog> = StaticCell::new();

/// Installs the diagnostics log as the `log` backend. Returns `None` on a second call.
pub fn install_logger(boot: Instant, level: LevelFilter) -> Option<&'static ConsoleLog> {
    let slot = LOGGER.try_uninit()?;
    let logger: &'static ConsoleLog = slot.write(SharedDiagLog::new(
        DiagLog::new(
            ConsoleMirror,
            boot,
            Duration::from_millis(EARLY_CAPTURE_WINDOW_MS),
        ),
        level,
    ));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
    Some(logger)
}

/// Record store in the last flash sector.
pub fn flash_record_store(
    flash_peripheral: esp_hal::peripherals::FLASH<'_>,
) -> RecordStore<FlashStorage<'_>> {
    let flash = FlashStorage::new(flash_peripheral).multicore_auto_park();
    let capacity = flash.capacity() as u32;
    let base = capacity.saturating_sub(FlashStorage::SECTOR_SIZE);
    RecordStore::new(flash, base)
}

pub fn boot_reset_reason() -> ResetReason {
    reset_reason(Cpu::ProCpu).map_or(ResetReason::Unknown, |reason| {
        ResetReason::from_rom_code(reason as u32)
    })
}
