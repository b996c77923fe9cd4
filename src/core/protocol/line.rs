//! Newline-framed line client

use crate::core::transport::{ByteTransport, TransportError};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, trace};

/// Longest line the client accepts, terminator included
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Prefix of the line that ends a data stream
pub const END_MARKER: &[u8] = b"End";

/// A received line, including its `\n` terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line(Vec<u8>);

impl Line {
    /// Raw bytes, terminator included
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Bytes without the trailing `\n` (and `\r`, if the firmware sent one)
    pub fn content(&self) -> &[u8] {
        let bytes = self.0.strip_suffix(b"\n").unwrap_or(&self.0);
        bytes.strip_suffix(b"\r").unwrap_or(bytes)
    }

    /// Content as text, lossily decoded
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.content())
    }

    /// Length in bytes, terminator included
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a line produced by [`LineClient`]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is the sentinel line that ends a stream
    pub fn is_end_marker(&self) -> bool {
        self.0.starts_with(END_MARKER)
    }
}

impl From<&str> for Line {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// Line client errors
#[derive(Error, Debug)]
pub enum LineError {
    /// The read window expired before a terminator arrived; the partial line is dropped
    #[error("Timed out waiting for a line ({partial} bytes discarded)")]
    Timeout {
        /// Bytes received before the timeout
        partial: usize,
    },

    /// No terminator within the length limit; the stream is out of step
    #[error("Line buffer overflow: no terminator within {max_len} bytes")]
    Overflow {
        /// The limit that was hit
        max_len: usize,
    },

    /// The command could not be written
    #[error("Write failed: {0}")]
    WriteFailed(#[source] TransportError),

    /// The transport failed while reading
    #[error("Read failed: {0}")]
    ReadFailed(#[source] TransportError),
}

impl LineError {
    /// Overflow means lost framing; callers must not retry
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}

/// Sends commands and assembles response lines over a [`ByteTransport`]
pub struct LineClient<T> {
    transport: T,
}

impl<T: ByteTransport> LineClient<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Write `command` exactly as given; no terminator is added
    pub fn send(&mut self, command: &str) -> Result<(), LineError> {
        let bytes = command.as_bytes();
        self.transport
            .write_bytes(bytes)
            .map_err(LineError::WriteFailed)?;
        debug!(command = %command.escape_debug(), hex = %hex::encode(bytes), "sent");
        Ok(())
    }

    /// Read one `\n`-terminated line of at most `max_len` bytes
    pub fn receive_line(&mut self, max_len: usize) -> Result<Line, LineError> {
        let mut buf = Vec::with_capacity(max_len.min(DEFAULT_MAX_LINE_LEN));
        while buf.len() < max_len {
            let byte = match self.transport.read_byte() {
                Ok(byte) => byte,
                Err(TransportError::Timeout) => {
                    return Err(LineError::Timeout { partial: buf.len() })
                }
                Err(e) => return Err(LineError::ReadFailed(e)),
            };
            buf.push(byte);
            if byte == b'\n' {
                let line = Line(buf);
                trace!(line = %line.text(), "received");
                return Ok(line);
            }
        }
        Err(LineError::Overflow { max_len })
    }

    /// Discard buffered input
    pub fn flush_input(&mut self) -> Result<(), TransportError> {
        self.transport.flush_input()
    }

    /// Close the underlying transport (idempotent)
    pub fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close()
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Unwrap the transport
    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::ScriptedTransport;

    #[test]
    fn test_send_is_verbatim() {
        let transport = ScriptedTransport::new();
        let journal = transport.journal();
        let mut client = LineClient::new(transport);

        client.send("14000000A").unwrap();
        assert_eq!(journal.sent(), vec!["14000000A"]);
    }

    #[test]
    fn test_receive_lines_in_order() {
        let transport = ScriptedTransport::new().with_input(b"first\r\nsecond\n");
        let mut client = LineClient::new(transport);

        let first = client.receive_line(DEFAULT_MAX_LINE_LEN).unwrap();
        assert_eq!(first.as_bytes(), b"first\r\n");
        assert_eq!(first.content(), b"first");
        assert_eq!(client.receive_line(DEFAULT_MAX_LINE_LEN).unwrap().text(), "second");
    }

    #[test]
    fn test_timeout_drops_partial_line() {
        let transport = ScriptedTransport::new().with_input(b"partial");
        let mut client = LineClient::new(transport);

        assert!(matches!(
            client.receive_line(DEFAULT_MAX_LINE_LEN),
            Err(LineError::Timeout { partial: 7 })
        ));
    }

    #[test]
    fn test_overflow_is_not_truncation() {
        let transport = ScriptedTransport::new().with_input(b"abcdefgh\n");
        let mut client = LineClient::new(transport);

        let err = client.receive_line(4).unwrap_err();
        assert!(err.is_overflow());
    }

    #[test]
    fn test_line_of_exactly_max_len_fits() {
        let transport = ScriptedTransport::new().with_input(b"abc\n");
        let mut client = LineClient::new(transport);

        assert_eq!(client.receive_line(4).unwrap().len(), 4);
    }

    #[test]
    fn test_short_write_reported() {
        let transport = ScriptedTransport::new().fail_write("q");
        let mut client = LineClient::new(transport);

        assert!(matches!(
            client.send("q"),
            Err(LineError::WriteFailed(TransportError::ShortWrite { .. }))
        ));
    }

    #[test]
    fn test_end_marker_detection() {
        assert!(Line::from("End\n").is_end_marker());
        assert!(Line::from("Ending soon\n").is_end_marker());
        assert!(!Line::from("end\n").is_end_marker());
        assert!(!Line::from("En\n").is_end_marker());
    }
}
