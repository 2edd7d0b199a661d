//! This crate polls small photovoltaic inverters over a serial link and decodes their replies
//! into typed telemetry.
//!
//! Two inverter families are supported, each with its own wire protocol:
//! * BlackLine Solar 3000 (KLNE), Modbus RTU with a CRC-16 trailer
//! * Mastervolt Soladin 600, a proprietary framing with an additive checksum
//!
//! A poll is a single call to [`poll::poll`] with any [`transport::Transport`], which is an
//! [`embedded_io`] port that can be closed. The result is always a
//! [`sample::TelemetrySample`]; a failed poll is reported in the sample rather than as an
//! error. [`identify::identify`] queries a freshly attached inverter for its address,
//! serial number and firmware.
//!
//! The serial port should be configured like so (see [`config::SerialSettings`]):
//! * Baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! Reads should time out after [`config::RetryPolicy::read_timeout`], 500 ms by default.

pub mod checksum;
pub mod config;
pub mod error;
pub mod identify;
pub mod mastervolt;
pub mod modbus;
pub mod poll;
pub mod register;
pub mod sample;
pub mod status;
pub mod transport;

#[cfg(test)]
mod mock_serial;
