//! Our error types for inverter communications.

use thiserror::Error;

use crate::register::Field;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Errors raised while validating a received frame, before any payload is looked at.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("No response received")]
    NoResponse,
    /// Fewer bytes arrived than the frame's own byte count declares.
    #[error("Incomplete frame: expected {expected} bytes, received {received}")]
    Incomplete { expected: usize, received: usize },
    /// Fewer bytes arrived than the command's minimum response length.
    #[error("Response too short: expected at least {expected} bytes, received {received}")]
    TooShort { expected: usize, received: usize },
    #[error("Checksum mismatch: calculated {calculated:#06X}, received {received:#06X}")]
    ChecksumMismatch { calculated: u16, received: u16 },
    /// A well-formed Modbus frame that does not answer the request, or an exception reply.
    #[error("Modbus protocol error: {0}")]
    Modbus(#[from] rmodbus::ErrorKind),
}

/// The payload passed the frame checks but could not be mapped onto the register table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Continuation of {field} without a preceding value")]
    OrphanContinuation { field: Field },
    #[error("Register {register:#06X} is not in the register table")]
    UnmappedRegister { register: u16 },
    #[error("Register payload has odd length {len}")]
    OddPayloadLength { len: usize },
    #[error("Field {field} missing from the decoded registers")]
    MissingField { field: Field },
    #[error("Payload too short to decode: expected {expected} bytes, received {received}")]
    PayloadTooShort { expected: usize, received: usize },
}

/// Custom error type for inverter communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error("No transport available")]
    NoTransport,
    #[error("Frame error: {0}")]
    Frame(FrameError),
    #[error("Decode inconsistency: {0}")]
    DecodeInconsistency(DecodeError),
}

impl<I: embedded_io::Error> From<FrameError> for Error<I> {
    fn from(err: FrameError) -> Self {
        Error::Frame(err)
    }
}

impl<I: embedded_io::Error> From<DecodeError> for Error<I> {
    fn from(err: DecodeError) -> Self {
        Error::DecodeInconsistency(err)
    }
}

impl<I: embedded_io::Error> Error<I> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SerialError(_) => ErrorKind::Serial,
            Error::NoTransport => ErrorKind::NoTransport,
            Error::Frame(FrameError::NoResponse) => ErrorKind::NoResponse,
            Error::Frame(FrameError::Incomplete { .. }) => ErrorKind::Incomplete,
            Error::Frame(FrameError::TooShort { .. }) => ErrorKind::TooShort,
            Error::Frame(FrameError::ChecksumMismatch { .. }) => ErrorKind::ChecksumMismatch,
            Error::Frame(FrameError::Modbus(_)) => ErrorKind::Protocol,
            Error::DecodeInconsistency(_) => ErrorKind::DecodeInconsistency,
        }
    }
}

/// Flat classification of [`Error`], kept in a [`RetryState`](crate::poll::RetryState) and
/// reported on a failed [`TelemetrySample`](crate::sample::TelemetrySample).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorKind {
    NoTransport,
    NoResponse,
    Incomplete,
    TooShort,
    ChecksumMismatch,
    /// The device answered with an exception or from the wrong address.
    Protocol,
    DecodeInconsistency,
    Serial,
}

impl ErrorKind {
    /// Whether the poller may spend another attempt after this error.
    ///
    /// A missing transport short-circuits before any attempt is made, and a decode
    /// inconsistency will not go away by asking again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::NoTransport | ErrorKind::DecodeInconsistency)
    }
}
