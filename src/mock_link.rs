//! We use this mocking module in unit tests to emulate the byte stream to the HV bridge.

use thiserror::Error;

/// Our mock type used to emulate the bridge connection.
pub struct MockLink {
    /// Frames written by the driver.
    write_buffer: heapless::Vec<u8, 512>,
    /// Pre-configured reply bytes to be read.
    read_buffer: heapless::Vec<u8, 512>,
    /// Current position in the read buffer
    read_position: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
}

#[derive(Error, Debug)]
pub enum MockLinkError {
    /// Simulated timeout error
    #[error("simulated timeout")]
    Timeout,
    /// Simulated buffer overflow
    #[error("simulated buffer overflow")]
    BufferOverflow,
    /// Generic simulated error for testing
    #[error("simulated link error")]
    SimulatedError,
}

impl embedded_io::Error for MockLinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockLinkError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockLinkError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockLinkError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockLink {
    type Error = MockLinkError;
}

impl embedded_io::Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockLinkError::SimulatedError);
        }
        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockLinkError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockLinkError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockLinkError::SimulatedError);
        }

        // End of stream once the scripted replies run out.
        let remaining = &self.read_buffer[self.read_position..];
        let count = core::cmp::min(buf.len(), remaining.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.read_position += count;
        Ok(count)
    }
}

impl MockLink {
    /// Create a new MockLink instance with empty buffers
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            should_error_on_read: false,
        }
    }

    /// Queue reply bytes behind whatever is already waiting to be read.
    pub fn queue_read_data(&mut self, data: &[u8]) -> Result<(), MockLinkError> {
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockLinkError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this link.
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Clear the write buffer
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
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
    use embedded_io::{Error as _, Read, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockLink::new();
        let test_data = b"\xCA\x02\x00\x00";

        let result = mock.write(test_data);
        assert_eq!(result.unwrap(), test_data.len());
        assert_eq!(mock.written_data(), test_data);
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockLink::new();
        let large_data = vec![0u8; 600];

        let result = mock.write(&large_data);
        assert!(matches!(result.unwrap_err(), MockLinkError::BufferOverflow));
    }

    #[test]
    fn test_queued_replies_are_read_in_order() {
        let mut mock = MockLink::new();
        mock.queue_read_data(b"first").unwrap();
        mock.queue_read_data(b"second").unwrap();

        let mut buffer = [0u8; 11];
        mock.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"firstsecond");
    }

    #[test]
    fn test_read_reports_end_of_stream() {
        let mut mock = MockLink::new();
        mock.queue_read_data(b"Hi").unwrap();

        let mut buffer = [0u8; 10];
        assert_eq!(mock.read(&mut buffer).unwrap(), 2);
        assert_eq!(mock.read(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockLink::new();
        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        assert_eq!(mock.written_data().len(), 0);

        mock.queue_read_data(b"data").unwrap();
        mock.set_read_error(true);
        let mut buffer = [0u8; 4];
        assert!(matches!(
            mock.read(&mut buffer).unwrap_err(),
            MockLinkError::SimulatedError
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(MockLinkError::Timeout.kind(), embedded_io::ErrorKind::TimedOut));
        assert!(matches!(
            MockLinkError::BufferOverflow.kind(),
            embedded_io::ErrorKind::OutOfMemory
        ));
    }

    #[test]
    fn test_clear_written_data() {
        let mut mock = MockLink::new();
        mock.write(b"test data").unwrap();
        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }
}
