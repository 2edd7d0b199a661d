//! Mastervolt Soladin 600 framing.
//!
//! Requests are `DD DD SS SS CC F1 F2 F3 XX`: destination, source, command, a three byte
//! filler and the additive checksum. Replies keep the same header layout followed by a
//! command-specific amount of data and the checksum.

use strum_macros::EnumIter;

use crate::{
    checksum::{checksum, validate},
    error::FrameError,
};

/// Length of every request frame.
pub const REQUEST_LEN: usize = 9;
/// Destination, source and command.
const HEADER_LEN: usize = 5;
/// A header plus a checksum; anything shorter cannot be a reply.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1;

/// Soladin bus address.
pub type Address = [u8; 2];

/// Address the host uses as its own.
pub const HOST_ADDRESS: Address = [0x00, 0x00];
/// Address used to discover whichever inverter is on the bus.
pub const DISCOVERY_ADDRESS: Address = [0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum SoladinCommand {
    /// Bus discovery; the reply's source is the inverter's address.
    Discover = 0xC1,
    /// Firmware id and date.
    Firmware = 0xB4,
    /// Live telemetry and status flags.
    Stats = 0xB6,
    /// Today's peak power.
    MaxPower = 0xB9,
    /// Clear today's peak power.
    ResetMaxPower = 0x97,
    /// Daily history; the first filler byte selects the day, `0` being today.
    History = 0x9A,
}

impl SoladinCommand {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use SoladinCommand as SC;
        match code {
            c if c == SC::Discover.code() => Some(SC::Discover),
            c if c == SC::Firmware.code() => Some(SC::Firmware),
            c if c == SC::Stats.code() => Some(SC::Stats),
            c if c == SC::MaxPower.code() => Some(SC::MaxPower),
            c if c == SC::ResetMaxPower.code() => Some(SC::ResetMaxPower),
            c if c == SC::History.code() => Some(SC::History),
            _ => None,
        }
    }

    /// Bytes following the command byte in a request.
    pub const fn filler(self) -> [u8; 3] {
        match self {
            SoladinCommand::ResetMaxPower => [0x10, 0x00, 0x00],
            _ => [0x00, 0x00, 0x00],
        }
    }

    /// Shortest reply the inverter sends to this command.
    pub const fn response_min_length(self) -> usize {
        match self {
            SoladinCommand::ResetMaxPower => 9,
            SoladinCommand::History => 8,
            SoladinCommand::Firmware => 31,
            SoladinCommand::Stats => 31,
            SoladinCommand::MaxPower => 31,
            SoladinCommand::Discover => 9,
        }
    }

    pub fn request(self, destination: Address, source: Address) -> [u8; REQUEST_LEN] {
        build_request(destination, source, self.code())
    }
}

/// Shortest reply to `command_code`; unknown commands only need a single byte.
pub fn response_min_length(command_code: u8) -> usize {
    SoladinCommand::from_code(command_code).map_or(1, SoladinCommand::response_min_length)
}

/// Build a request frame.
pub fn build_request(destination: Address, source: Address, command_code: u8) -> [u8; REQUEST_LEN] {
    let filler = SoladinCommand::from_code(command_code)
        .map_or([0x00, 0x00, 0x00], SoladinCommand::filler);
    let mut frame = [
        destination[0],
        destination[1],
        source[0],
        source[1],
        command_code,
        filler[0],
        filler[1],
        filler[2],
        0x00,
    ];
    frame[REQUEST_LEN - 1] = checksum(&frame);
    frame
}

/// A validated reply, borrowing its data from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoladinResponse<'a> {
    pub destination: Address,
    pub source: Address,
    pub command: u8,
    /// Everything between the command byte and the checksum.
    pub data: &'a [u8],
}

/// Validate a reply to `command_code` and split it into its parts.
pub fn parse_response(raw: &[u8], command_code: u8) -> Result<SoladinResponse<'_>, FrameError> {
    if raw.is_empty() {
        return Err(FrameError::NoResponse);
    }

    let expected = response_min_length(command_code).max(MIN_FRAME_LEN);
    if raw.len() < expected {
        log::warn!(
            "Invalid response size - required={} received={}",
            expected,
            raw.len()
        );
        return Err(FrameError::TooShort {
            expected,
            received: raw.len(),
        });
    }

    if !validate(raw) {
        let calculated = checksum(raw);
        let received = raw[raw.len() - 1];
        log::warn!(
            "Invalid checksum - calculated={:02X} received={:02X}",
            calculated,
            received
        );
        return Err(FrameError::ChecksumMismatch {
            calculated: u16::from(calculated),
            received: u16::from(received),
        });
    }

    Ok(SoladinResponse {
        destination: [raw[0], raw[1]],
        source: [raw[2], raw[3]],
        command: raw[4],
        data: &raw[HEADER_LEN..raw.len() - 1],
    })
}
