//! We use this mocking module in unit tests to emulate an inverter on a serial port.
//!
//! Replies are queued up front. Each flush (the end of a request) moves the next queued reply
//! into the read buffer, so a test can script a whole poll cycle, including silence and
//! corrupted frames.

use crate::transport::Transport;

const REPLY_CAPACITY: usize = 256;

type Reply = heapless::Vec<u8, REPLY_CAPACITY>;

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Buffer to store data written to the mock serial port
    write_buffer: heapless::Vec<u8, 1024>,
    /// Replies handed out one per request
    replies: heapless::Deque<Reply, 16>,
    /// Reply currently being read
    read_buffer: Reply,
    /// Current position in the read buffer
    read_position: usize,
    /// Number of requests flushed so far
    requests: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    closed: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MockSerialError {
    /// Nothing left to read
    Timeout,
    /// Simulated buffer overflow
    BufferOverflow,
    /// Simulated unplugged adapter
    Disconnected,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockSerialError::Timeout => write!(f, "mock serial read timed out"),
            MockSerialError::BufferOverflow => write!(f, "mock serial buffer overflow"),
            MockSerialError::Disconnected => write!(f, "mock serial port disconnected"),
        }
    }
}

impl core::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::Disconnected => embedded_io::ErrorKind::BrokenPipe,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::Disconnected);
        }
        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::Disconnected);
        }
        self.requests += 1;
        self.read_buffer = self.replies.pop_front().unwrap_or_default();
        self.read_position = 0;
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::Disconnected);
        }

        if self.read_position >= self.read_buffer.len() {
            return Err(MockSerialError::Timeout);
        }

        let available = &self.read_buffer[self.read_position..];
        let bytes_to_read = core::cmp::min(buf.len(), available.len());
        buf[..bytes_to_read].copy_from_slice(&available[..bytes_to_read]);
        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl Transport for MockSerial {
    fn close(&mut self) {
        self.closed = true;
    }
}

impl MockSerial {
    /// Create a new MockSerial instance that answers nothing
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            replies: heapless::Deque::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            requests: 0,
            should_error_on_write: false,
            should_error_on_read: false,
            closed: false,
        }
    }

    /// Queue the reply to the next unanswered request. An empty reply is silence.
    pub fn queue_reply(&mut self, data: &[u8]) {
        let reply = Reply::from_slice(data).expect("mock reply too long");
        self.replies
            .push_back(reply)
            .expect("too many queued mock replies");
    }

    /// Everything written to the port so far
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Number of requests sent
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Replies not yet handed out
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_new_mock_serial() {
        let mock = MockSerial::new();
        assert!(mock.written_data().is_empty());
        assert_eq!(mock.requests(), 0);
        assert!(!mock.is_closed());
    }

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        mock.write_all(&[0x11, 0x00]).unwrap();
        mock.write_all(&[0xB6]).unwrap();
        assert_eq!(mock.written_data(), &[0x11, 0x00, 0xB6]);
    }

    #[test]
    fn test_reply_released_on_flush() {
        let mut mock = MockSerial::new();
        mock.queue_reply(&[0x01, 0x02, 0x03]);
        let mut buffer = [0u8; 8];

        // Nothing to read before the request is complete.
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));

        mock.flush().unwrap();
        assert_eq!(mock.read(&mut buffer[..2]), Ok(2));
        assert_eq!(mock.read(&mut buffer[2..]), Ok(1));
        assert_eq!(&buffer[..3], &[0x01, 0x02, 0x03]);
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));
    }

    #[test]
    fn test_replies_in_order() {
        let mut mock = MockSerial::new();
        mock.queue_reply(&[0xAA]);
        mock.queue_reply(&[]);
        mock.queue_reply(&[0xBB]);
        let mut buffer = [0u8; 4];

        mock.flush().unwrap();
        assert_eq!(mock.read(&mut buffer), Ok(1));
        assert_eq!(buffer[0], 0xAA);

        mock.flush().unwrap();
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));

        mock.flush().unwrap();
        assert_eq!(mock.read(&mut buffer), Ok(1));
        assert_eq!(buffer[0], 0xBB);

        // Queue exhausted: silence.
        mock.flush().unwrap();
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));
        assert_eq!(mock.requests(), 4);
        assert_eq!(mock.pending_replies(), 0);
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert_eq!(mock.write(b"test"), Err(MockSerialError::Disconnected));
        assert_eq!(mock.flush(), Err(MockSerialError::Disconnected));
        assert!(mock.written_data().is_empty());

        mock.set_write_error(false);
        mock.set_read_error(true);
        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Disconnected));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MockSerialError::Timeout.kind(),
            embedded_io::ErrorKind::TimedOut
        );
        assert_eq!(
            MockSerialError::BufferOverflow.kind(),
            embedded_io::ErrorKind::OutOfMemory
        );
        assert_eq!(
            MockSerialError::Disconnected.kind(),
            embedded_io::ErrorKind::BrokenPipe
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            MockSerialError::Disconnected.to_string(),
            "mock serial port disconnected"
        );
        let err: &dyn core::error::Error = &MockSerialError::Timeout;
        assert!(err.source().is_none());
    }

    #[test]
    fn test_close() {
        let mut mock = MockSerial::new();
        Transport::close(&mut mock);
        assert!(mock.is_closed());
    }
}
