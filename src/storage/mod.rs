//! Fixed-offset persisted records: AP credentials and boot diagnostics.

mod records;
mod store;

use log::{info, warn};

pub use records::{ApCredentials, BootDiagnostics, ExceptionRegisters, ResetReason};
pub use store::{RecordStore, StoreError};

use embedded_storage::Storage;

/// Counts this boot and records why the previous run ended. Runs before any other bring-up
/// so a crash during bring-up still leaves a trace.
pub fn record_boot<S: Storage>(
    store: &mut RecordStore<S>,
    reset_reason: ResetReason,
    registers: ExceptionRegisters,
) -> BootDiagnostics {
    let previous = store.load_boot_diagnostics().unwrap_or_default();
    let current = BootDiagnostics {
        boot_count: previous.boot_count.wrapping_add(1),
        reset_reason,
        registers: if reset_reason.is_fault() {
            registers
        } else {
            ExceptionRegisters::default()
        },
    };

    if reset_reason.is_fault() {
        warn!(
            "storage: boot={} reset={} cause={} pc=0x{:08x} addr=0x{:08x} dpc=0x{:08x}",
            current.boot_count,
            reset_reason.as_str(),
            registers.cause,
            registers.pc,
            registers.fault_addr,
            registers.double_pc
        );
    } else {
        info!(
            "storage: boot={} reset={}",
            current.boot_count,
            reset_reason.as_str()
        );
    }

    if let Err(err) = store.save_boot_diagnostics(&current) {
        warn!("storage: boot record save err={}", err);
    }
    current
}
