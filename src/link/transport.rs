use embedded_io::{Error as _, ErrorKind, Read, ReadReady, Write, WriteReady};

use super::{LinkFactory, LinkManager};
use crate::config::{LINK_RX_BUDGET_PER_PASS, LINK_RX_CHUNK, LINK_TX_BUF};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    Read(ErrorKind),
    Write(ErrorKind),
}

impl TransportError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Write(_) => "write",
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Read(kind) | Self::Write(kind) => write!(f, "{} {:?}", self.as_str(), kind),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportReport {
    pub rx_bytes: usize,
    pub tx_bytes: usize,
    /// The last error seen this pass; a read error wins over a write error.
    pub error: Option<TransportError>,
}

/// Moves bytes between the serial device and the link engine without blocking.
///
/// Reads happen only while the device reports data ready, writes only while it reports
/// room. Outbound bytes the device could not take stay in `tx` for the next pass.
pub struct LinkTransport<D> {
    device: D,
    rx: [u8; LINK_RX_CHUNK],
    tx: [u8; LINK_TX_BUF],
    tx_len: usize,
}

impl<D> LinkTransport<D>
where
    D: Read + Write + ReadReady + WriteReady,
{
    pub fn new(device: D) -> Self {
        Self {
            device,
            rx: [0; LINK_RX_CHUNK],
            tx: [0; LINK_TX_BUF],
            tx_len: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn pending_tx(&self) -> usize {
        self.tx_len
    }

    pub fn service<F: LinkFactory>(&mut self, link: &mut LinkManager<'_, F>) -> TransportReport {
        let mut report = TransportReport::default();

        if self.tx_len < self.tx.len() {
            self.tx_len += link.poll_transmit(&mut self.tx[self.tx_len..]);
        }
        // A failing TX side must not starve the receive path.
        if let Err(err) = self.flush_pending(&mut report) {
            report.error = Some(err);
        }

        while report.rx_bytes < LINK_RX_BUDGET_PER_PASS {
            match self.device.read_ready() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    report.error = Some(TransportError::Read(err.kind()));
                    break;
                }
            }
            let want = (LINK_RX_BUDGET_PER_PASS - report.rx_bytes).min(self.rx.len());
            match self.device.read(&mut self.rx[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    link.feed(&self.rx[..n]);
                    report.rx_bytes += n;
                }
                Err(err) => {
                    report.error = Some(TransportError::Read(err.kind()));
                    break;
                }
            }
        }

        report
    }

    fn flush_pending(&mut self, report: &mut TransportReport) -> Result<(), TransportError> {
        while self.tx_len > 0 {
            match self.device.write_ready() {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(err) => return Err(TransportError::Write(err.kind())),
            }
            let written = self
                .device
                .write(&self.tx[..self.tx_len])
                .map_err(|err| TransportError::Write(err.kind()))?;
            if written == 0 {
                return Ok(());
            }
            self.tx.copy_within(written..self.tx_len, 0);
            self.tx_len -= written;
            report.tx_bytes += written;
        }
        Ok(())
    }
}
