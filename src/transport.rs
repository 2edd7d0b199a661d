//! The byte-stream link to an inverter.
//!
//! Any [`embedded_io`] port can carry frames; [`Transport`] only adds a hook to release the
//! port once a poll is done with it. [`TransportHandle`] owns the port for the length of one
//! poll and calls that hook when dropped, so the port is released on every exit path.

use core::fmt::Write as _;

use embedded_io::Error as _;

use crate::error::{Error, Result};

/// Default capacity of a receive buffer.
pub const DEFAULT_BUFFER_LEN: usize = 256;

/// Expected length for replies whose size is only known once the device stops sending.
pub const UNTIL_SILENT: usize = usize::MAX;

/// A serial-like port frames can be exchanged over.
pub trait Transport: embedded_io::Read + embedded_io::Write {
    /// Release the port. Called once, when the owning [`TransportHandle`] is dropped.
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn close(&mut self) {
        (**self).close()
    }
}

/// Exclusive ownership of a [`Transport`] for the length of one poll.
pub struct TransportHandle<S: Transport> {
    interface: S,
}

impl<S: Transport> TransportHandle<S> {
    pub fn new(interface: S) -> Self {
        Self { interface }
    }

    /// Send `request`, then collect the reply.
    ///
    /// Reading stops once `expected` bytes have arrived, when the port times out, or when
    /// the buffer is full. An empty result means the device stayed silent.
    pub fn exchange<const L: usize>(
        &mut self,
        request: &[u8],
        expected: usize,
    ) -> Result<heapless::Vec<u8, L>, S::Error> {
        self.send(request)?;
        self.receive::<L>(expected)
    }

    /// Write `request` and flush it out of the port.
    pub fn send(&mut self, request: &[u8]) -> Result<(), S::Error> {
        log::debug!("Sending request: {}", format_hex(request));
        self.interface
            .write_all(request)
            .map_err(Error::SerialError)?;
        self.interface.flush().map_err(Error::SerialError)
    }

    /// Collect a reply of up to `expected` bytes. See [`exchange`](Self::exchange).
    pub fn receive<const L: usize>(&mut self, expected: usize) -> Result<heapless::Vec<u8, L>, S::Error> {
        let mut buff: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut temp_buf = [0u8; 32];
        while buff.len() < expected {
            let room = (L - buff.len()).min(temp_buf.len());
            if room == 0 {
                log::warn!("Receive buffer full after {} bytes", buff.len());
                break;
            }
            match self.interface.read(&mut temp_buf[..room]) {
                Ok(0) => break,
                Ok(bytes_read) => {
                    // Cannot fail, the read was capped at the remaining room.
                    let _ = buff.extend_from_slice(&temp_buf[..bytes_read]);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::Other | embedded_io::ErrorKind::TimedOut
                    ) =>
                {
                    break;
                }
                Err(e) => return Err(Error::SerialError(e)),
            }
        }
        log::debug!("Received response: {}", format_hex(&buff));
        Ok(buff)
    }
}

impl<S: Transport> Drop for TransportHandle<S> {
    fn drop(&mut self) {
        log::debug!("Closing transport");
        self.interface.close();
    }
}

/// Uppercase hex with a space between bytes, e.g. `FF 03 02`.
pub fn format_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        // Writing to a String cannot fail.
        let _ = write!(out, "{b:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_serial::{MockSerial, MockSerialError};

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xFF, 0x03, 0x02, 0x00, 0x0a]), "FF 03 02 00 0A");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_exchange_writes_and_reads() {
        let mut mock = MockSerial::new();
        mock.queue_reply(&[0xFF, 0x03, 0x02, 0x00, 0x02, 0x10, 0x51]);
        {
            let mut handle = TransportHandle::new(&mut mock);
            let reply = handle
                .exchange::<DEFAULT_BUFFER_LEN>(&[0x01, 0x02], 7)
                .unwrap();
            assert_eq!(reply.as_slice(), &[0xFF, 0x03, 0x02, 0x00, 0x02, 0x10, 0x51]);
        }
        assert_eq!(mock.written_data(), &[0x01, 0x02]);
        assert!(mock.is_closed());
    }

    #[test]
    fn test_exchange_silent_device() {
        let mut mock = MockSerial::new();
        let mut handle = TransportHandle::new(&mut mock);
        let reply = handle.exchange::<DEFAULT_BUFFER_LEN>(&[0x01], 7).unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn test_exchange_stops_at_capacity() {
        let mut mock = MockSerial::new();
        mock.queue_reply(&[0xAA; 40]);
        let mut handle = TransportHandle::new(&mut mock);
        let reply = handle.exchange::<16>(&[0x01], 40).unwrap();
        assert_eq!(reply.len(), 16);
    }

    #[test]
    fn test_exchange_until_silent() {
        let mut mock = MockSerial::new();
        mock.queue_reply(&[0x55; 70]);
        let mut handle = TransportHandle::new(&mut mock);
        let reply = handle
            .exchange::<DEFAULT_BUFFER_LEN>(&[0x01], UNTIL_SILENT)
            .unwrap();
        assert_eq!(reply.len(), 70);
    }

    #[test]
    fn test_exchange_read_error() {
        let mut mock = MockSerial::new();
        mock.set_read_error(true);
        let mut handle = TransportHandle::new(&mut mock);
        let result = handle.exchange::<DEFAULT_BUFFER_LEN>(&[0x01], 7);
        assert!(matches!(
            result,
            Err(Error::SerialError(MockSerialError::Disconnected))
        ));
    }

    #[test]
    fn test_send_then_receive() {
        let mut mock = MockSerial::new();
        mock.queue_reply(&[0x02, 0x04, 0x02, 0x00, 0x1E]);
        let mut handle = TransportHandle::new(&mut mock);
        handle.send(&[0x01, 0x02, 0x03]).unwrap();
        let reply = handle.receive::<DEFAULT_BUFFER_LEN>(UNTIL_SILENT).unwrap();
        assert_eq!(reply.as_slice(), &[0x02, 0x04, 0x02, 0x00, 0x1E]);
    }

    #[test]
    fn test_send_write_error() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        let mut handle = TransportHandle::new(&mut mock);
        assert!(matches!(
            handle.send(&[0x01]),
            Err(Error::SerialError(MockSerialError::Disconnected))
        ));
    }

    #[test]
    fn test_handle_closes_on_drop() {
        let mut mock = MockSerial::new();
        drop(TransportHandle::new(&mut mock));
        assert!(mock.is_closed());
    }
}
