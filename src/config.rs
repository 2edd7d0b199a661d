//! Poll configuration: retry budget, serial line settings and the device being polled.

use fugit::MillisDurationU32;

use crate::{
    error::ErrorKind,
    mastervolt::{self, Address},
};

/// How hard a poll tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Full request cycles to attempt.
    pub attempts: u8,
    /// Pause after a failed attempt.
    pub backoff: MillisDurationU32,
    /// Pause after an attempt the device stayed silent for, if it differs from `backoff`.
    /// An inverter that has shut down for the night answers nothing.
    pub no_response_backoff: Option<MillisDurationU32>,
    /// Per-read timeout, applied by whoever opens the port.
    pub read_timeout: MillisDurationU32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: MillisDurationU32::secs(5),
            no_response_backoff: None,
            read_timeout: MillisDurationU32::millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, attempts: u8) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: MillisDurationU32) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_no_response_backoff(mut self, backoff: MillisDurationU32) -> Self {
        self.no_response_backoff = Some(backoff);
        self
    }

    /// Pause to take after an attempt that failed with `kind`.
    pub fn backoff_for(&self, kind: ErrorKind) -> MillisDurationU32 {
        match (kind, self.no_response_backoff) {
            (ErrorKind::NoResponse, Some(backoff)) => backoff,
            _ => self.backoff,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: MillisDurationU32) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial line settings. Both inverter families use 9600 8N1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

/// The inverter on the other end of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// BlackLine Solar 3000, Modbus RTU.
    Bls3000 { slave_address: u8 },
    /// Mastervolt Soladin 600.
    Soladin600 {
        slave_address: Address,
        source_address: Address,
    },
}

impl DeviceProfile {
    /// A BLS3000 at its factory address.
    pub const fn bls3000() -> Self {
        DeviceProfile::Bls3000 {
            slave_address: 0x02,
        }
    }

    /// A Soladin 600 at its usual address, polled from the host address.
    pub const fn soladin600() -> Self {
        DeviceProfile::Soladin600 {
            slave_address: [0x11, 0x00],
            source_address: mastervolt::HOST_ADDRESS,
        }
    }

    /// Name samples from this device are reported under.
    pub const fn name(&self) -> &'static str {
        match self {
            DeviceProfile::Bls3000 { .. } => "BLS3000",
            DeviceProfile::Soladin600 { .. } => "Soladin600",
        }
    }
}
