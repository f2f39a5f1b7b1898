//! Self-healing supervisor for a serial-uplink gateway.
//!
//! The gateway terminates a PPP link on a UART, bridges it to a local access point through
//! NAPT and hosts an embedded MQTT broker. Everything here runs from one cooperative loop:
//! [`runtime::Supervisor::poll`] services each component once per pass and the
//! [`health`] checks repair whatever has drifted.

#![cfg_attr(not(test), no_std)]

pub mod broker;
pub mod config;
pub mod diagnostics;
pub mod health;
pub mod link;
pub mod nat;
#[cfg(feature = "esp32")]
pub mod platform;
pub mod runtime;
pub mod storage;
#[cfg(test)]
pub(crate) mod testing;
