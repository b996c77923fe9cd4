//! Transport layer between the line client and the analyser
//!
//! Supports:
//! - Serial ports in termios raw mode (Unix)
//! - Scripted replies, for tests and for driving the session without hardware

mod scripted;
#[cfg(unix)]
mod serial;

pub use scripted::{Journal, ScriptedTransport};
#[cfg(unix)]
pub use serial::{list_ports, SerialTransport};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Baud rate the analyser firmware talks at
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Per-byte read timeout, in tenths of a second (2.0s)
pub const DEFAULT_TIMEOUT_DECISECONDS: u8 = 20;

/// Device the analyser usually enumerates as
#[cfg(target_os = "macos")]
pub const DEFAULT_DEVICE: &str = "/dev/tty.usbmodemmfd111";
/// Device the analyser usually enumerates as
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    None,
    /// Hardware flow control (RTS/CTS)
    #[default]
    Hardware,
}

/// Serial port configuration
///
/// Data format is always 8 data bits, no parity, 1 stop bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Device path (e.g. /dev/ttyACM0)
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-byte read timeout in deciseconds, as termios VTIME
    pub timeout_deciseconds: u8,
    /// Flow control
    pub flow_control: SerialFlowControl,
}

impl PortConfig {
    /// Create a configuration for `device` with the analyser's defaults
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_deciseconds: DEFAULT_TIMEOUT_DECISECONDS,
            flow_control: SerialFlowControl::Hardware,
        }
    }

    /// Set baud rate
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the per-byte read timeout in deciseconds
    #[must_use]
    pub fn timeout_deciseconds(mut self, deciseconds: u8) -> Self {
        self.timeout_deciseconds = deciseconds;
        self
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    /// Per-byte read timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_deciseconds) * 100)
    }

    /// Check the invariants the port layer relies on
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.device.is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "device path is empty".to_string(),
            ));
        }
        if self.timeout_deciseconds == 0 {
            return Err(TransportError::InvalidConfiguration(
                "read timeout must be at least one decisecond".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(TransportError::InvalidConfiguration(
                "baud rate must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The device could not be opened
    #[error("Failed to open {port}: {source}")]
    OpenFailed {
        /// Device path
        port: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Raw-mode settings could not be applied or restored
    #[error("Failed to configure {port}: {reason}")]
    ConfigFailed {
        /// Device path
        port: String,
        /// What went wrong
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No byte arrived within the read window
    #[error("Timed out waiting for data")]
    Timeout,

    /// Fewer bytes were written than requested
    #[error("Short write: {written} of {requested} bytes")]
    ShortWrite {
        /// Bytes accepted by the device
        written: usize,
        /// Bytes requested
        requested: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Port already closed
    #[error("Not connected")]
    NotConnected,
}

/// Byte-level access to the instrument
///
/// Every operation is blocking. Implementations own their handle exclusively.
pub trait ByteTransport {
    /// Read one byte, waiting at most one timeout window.
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrives in time.
    fn read_byte(&mut self) -> Result<u8, TransportError>;

    /// Write all of `data` in one go. A partial write is an error.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Discard all currently buffered input
    fn flush_input(&mut self) -> Result<(), TransportError>;

    /// Check for pending input without blocking.
    ///
    /// A byte detected here is kept and returned by the next [`read_byte`](Self::read_byte).
    fn probe(&mut self) -> Result<bool, TransportError>;

    /// Restore the port and release the handle. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Human-readable description of the connection
    fn connection_info(&self) -> String;
}

impl<T: ByteTransport + ?Sized> ByteTransport for Box<T> {
    fn read_byte(&mut self) -> Result<u8, TransportError> {
        (**self).read_byte()
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write_bytes(data)
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        (**self).flush_input()
    }

    fn probe(&mut self) -> Result<bool, TransportError> {
        (**self).probe()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn connection_info(&self) -> String {
        (**self).connection_info()
    }
}
