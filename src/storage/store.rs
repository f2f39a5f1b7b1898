use embedded_storage::{ReadStorage, Storage};

use super::records::{ApCredentials, BootDiagnostics};
use crate::config::{
    AP_CREDENTIALS_OFFSET, AP_CREDENTIALS_RECORD_LEN, BOOT_DIAGNOSTICS_OFFSET,
    BOOT_DIAGNOSTICS_RECORD_LEN,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    Read,
    Write,
}

impl StoreError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Both records inside one storage region starting at `base`.
pub struct RecordStore<S> {
    storage: S,
    base: u32,
}

impl<S: Storage> RecordStore<S> {
    pub fn new(storage: S, base: u32) -> Self {
        Self { storage, base }
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn load_ap_credentials(&mut self) -> Option<ApCredentials> {
        let mut record = [0u8; AP_CREDENTIALS_RECORD_LEN];
        self.read(AP_CREDENTIALS_OFFSET, &mut record).ok()?;
        ApCredentials::decode(&record)
    }

    /// Stored credentials, or the compiled-in pair when none are valid.
    pub fn ap_credentials_or_default(&mut self) -> ApCredentials {
        self.load_ap_credentials()
            .unwrap_or_else(ApCredentials::compiled_in)
    }

    /// Returns `Ok(false)` when the stored value already matches and nothing was written.
    pub fn save_ap_credentials(&mut self, creds: &ApCredentials) -> Result<bool, StoreError> {
        if self.load_ap_credentials().as_ref() == Some(creds) {
            return Ok(false);
        }
        self.write(AP_CREDENTIALS_OFFSET, &creds.encode())?;
        Ok(true)
    }

    pub fn load_boot_diagnostics(&mut self) -> Option<BootDiagnostics> {
        let mut record = [0u8; BOOT_DIAGNOSTICS_RECORD_LEN];
        self.read(BOOT_DIAGNOSTICS_OFFSET, &mut record).ok()?;
        BootDiagnostics::decode(&record)
    }

    pub fn save_boot_diagnostics(&mut self, diag: &BootDiagnostics) -> Result<bool, StoreError> {
        if self.load_boot_diagnostics().as_ref() == Some(diag) {
            return Ok(false);
        }
        self.write(BOOT_DIAGNOSTICS_OFFSET, &diag.encode())?;
        Ok(true)
    }

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), StoreError> {
        self.storage
            .read(self.base + offset, bytes)
            .map_err(|_| StoreError::Read)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StoreError> {
        self.storage
            .write(self.base + offset, bytes)
            .map_err(|_| StoreError::Write)
    }
}
