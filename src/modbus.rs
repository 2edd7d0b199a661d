//! BLS3000 framing.
//!
//! The BLS3000 speaks Modbus RTU: address, function, big-endian start register and
//! register count, then a CRC-16/MODBUS trailer sent low byte first. Replies carry
//! address, function, a byte count and that many payload bytes before the same trailer.
//! Frames are generated and checked with `rmodbus`.

use rmodbus::{client::ModbusRequest, consts::ModbusFunction, ModbusProto};
use strum_macros::EnumIter;

use crate::{checksum::crc16, error::FrameError};

/// Read holding registers.
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
/// Read input registers.
pub const READ_INPUT_REGISTERS: u8 = 0x04;
/// Address every BLS3000 on the bus answers to.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Length of every request frame.
pub const REQUEST_LEN: usize = 8;

/// A request frame ready to be written to the port.
pub type Request = heapless::Vec<u8, REQUEST_LEN>;

/// Address, function and byte count.
const HEADER_LEN: usize = 3;
const CRC_LEN: usize = 2;

/// A single register read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub function: u8,
    pub start_register: u16,
    pub count: u16,
}

impl CommandSpec {
    /// Length of a complete reply to this read.
    pub const fn response_len(&self) -> usize {
        HEADER_LEN + 2 * self.count as usize + CRC_LEN
    }
}

/// The reads the poller and identification use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum BlsCommand {
    /// Holding register `0x3C`; byte 1 of the payload is the inverter's bus address.
    BusQuery,
    /// Input registers `0x00` - `0x02`.
    SerialNumber,
    /// Input registers `0x2B` (model, kW × 10) and `0x2C` (firmware × 100).
    ModelVersion,
    /// Input registers `0x0A` - `0x28`.
    Telemetry,
}

impl BlsCommand {
    pub const fn spec(self) -> CommandSpec {
        match self {
            BlsCommand::BusQuery => CommandSpec {
                function: READ_HOLDING_REGISTERS,
                start_register: 0x3C,
                count: 1,
            },
            BlsCommand::SerialNumber => CommandSpec {
                function: READ_INPUT_REGISTERS,
                start_register: 0x00,
                count: 3,
            },
            BlsCommand::ModelVersion => CommandSpec {
                function: READ_INPUT_REGISTERS,
                start_register: 0x2B,
                count: 2,
            },
            BlsCommand::Telemetry => CommandSpec {
                function: READ_INPUT_REGISTERS,
                start_register: crate::register::BLS_TELEMETRY_BASE,
                count: 0x1F,
            },
        }
    }

    /// Request frame for this command sent to `slave_address`.
    pub fn request(self, slave_address: u8) -> Result<Request, FrameError> {
        let spec = self.spec();
        build_request(slave_address, spec.function, spec.start_register, spec.count)
    }

    /// Validate a reply to this command from `slave_address`.
    ///
    /// Unlike [`parse_response`] this also rejects replies from another address or to
    /// another function, and replies carrying fewer registers than were asked for.
    pub fn parse_reply(self, slave_address: u8, raw: &[u8]) -> Result<ModbusResponse<'_>, FrameError> {
        let spec = self.spec();
        let response = parse_frame(raw, Some((slave_address, spec.function)))?;
        let expected_bytes = 2 * spec.count as usize;
        if (response.byte_count as usize) < expected_bytes {
            let received = HEADER_LEN + response.byte_count as usize + CRC_LEN;
            log::warn!(
                "Short register read - requested={} received={} bytes",
                expected_bytes,
                response.byte_count
            );
            return Err(FrameError::Incomplete {
                expected: spec.response_len(),
                received,
            });
        }
        Ok(response)
    }
}

/// Build a read request frame.
///
/// Only the two register reads the BLS3000 answers are supported; any other function code
/// is an [`IllegalFunction`](rmodbus::ErrorKind::IllegalFunction).
pub fn build_request(
    slave_address: u8,
    function_code: u8,
    start_register: u16,
    register_count: u16,
) -> Result<Request, FrameError> {
    let mut req = ModbusRequest::new(slave_address, ModbusProto::Rtu);
    let mut frame = Request::new();
    match function_code {
        READ_HOLDING_REGISTERS => {
            req.generate_get_holdings(start_register, register_count, &mut frame)
        }
        READ_INPUT_REGISTERS => req.generate_get_inputs(start_register, register_count, &mut frame),
        _ => Err(rmodbus::ErrorKind::IllegalFunction),
    }?;
    Ok(frame)
}

/// A validated reply, borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusResponse<'a> {
    pub address: u8,
    pub function: u8,
    pub byte_count: u8,
    /// Exactly `byte_count` bytes.
    pub payload: &'a [u8],
}

/// Validate a received reply and split it into its parts.
///
/// Bytes after the frame's declared end are ignored. The frame is checked against its own
/// address and function; use [`BlsCommand::parse_reply`] to check it against a request.
pub fn parse_response(raw: &[u8]) -> Result<ModbusResponse<'_>, FrameError> {
    parse_frame(raw, None)
}

fn parse_frame(raw: &[u8], expected: Option<(u8, u8)>) -> Result<ModbusResponse<'_>, FrameError> {
    if raw.is_empty() {
        return Err(FrameError::NoResponse);
    }
    if raw.len() < HEADER_LEN + CRC_LEN {
        return Err(FrameError::Incomplete {
            expected: HEADER_LEN + CRC_LEN,
            received: raw.len(),
        });
    }

    let frame_len = usize::from(rmodbus::guess_response_frame_len(raw, ModbusProto::Rtu)?);
    if raw.len() < frame_len {
        log::warn!(
            "Incomplete response - declared={} received={}",
            frame_len,
            raw.len()
        );
        return Err(FrameError::Incomplete {
            expected: frame_len,
            received: raw.len(),
        });
    }

    let frame = &raw[..frame_len];
    // An exception reply sets the top bit of the function it answers.
    let (unit_id, function) = expected.unwrap_or((frame[0], frame[1] & 0x7F));
    let mut req = ModbusRequest::new(unit_id, ModbusProto::Rtu);
    req.func = ModbusFunction::try_from(function)?;
    if !req.func.is_read() {
        return Err(FrameError::Modbus(rmodbus::ErrorKind::ReadCallOnWriteFrame));
    }
    match req.parse_ok(frame) {
        Ok(()) => {}
        Err(rmodbus::ErrorKind::FrameCRCError) => {
            let (body, trailer) = frame.split_at(frame_len - CRC_LEN);
            let calculated = crc16(body);
            let received = u16::from_le_bytes([trailer[0], trailer[1]]);
            log::warn!(
                "Invalid CRC - calculated={:04X} received={:04X}",
                calculated,
                received
            );
            return Err(FrameError::ChecksumMismatch {
                calculated,
                received,
            });
        }
        Err(e) => {
            log::warn!("Rejected response {:02X?}: {}", frame, e);
            return Err(FrameError::Modbus(e));
        }
    }

    Ok(ModbusResponse {
        address: frame[0],
        function: frame[1],
        byte_count: frame[2],
        payload: &frame[HEADER_LEN..frame_len - CRC_LEN],
    })
}
