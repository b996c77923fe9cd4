//! Serial port transport in termios raw mode

use super::{ByteTransport, PortConfig, SerialFlowControl, TransportError};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::termios::{
    self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

/// Open device plus the attributes it had before we touched it
struct RawPort {
    file: File,
    original: Termios,
}

/// Serial port transport
///
/// Dropping the transport closes it.
pub struct SerialTransport {
    config: PortConfig,
    port: Option<RawPort>,
    pending: Option<u8>,
}

impl SerialTransport {
    /// Open `config.device` and switch it to raw mode
    pub fn open(config: &PortConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let baud = baud_rate(config.baud_rate)?;

        // Non-blocking open so a device waiting on carrier detect can't hang us
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(&config.device)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => TransportError::PortNotFound(config.device.clone()),
                io::ErrorKind::PermissionDenied => {
                    TransportError::PermissionDenied(config.device.clone())
                }
                _ => TransportError::OpenFailed {
                    port: config.device.clone(),
                    source: e,
                },
            })?;

        let config_failed = |what: &str, e: nix::Error| TransportError::ConfigFailed {
            port: config.device.clone(),
            reason: format!("{what}: {e}"),
        };

        set_nonblocking(&file, false).map_err(|e| config_failed("clear O_NONBLOCK", e))?;
        let original = termios::tcgetattr(&file).map_err(|e| config_failed("tcgetattr", e))?;
        let raw = raw_attributes(&original, baud, config)
            .map_err(|e| config_failed("cfsetspeed", e))?;
        termios::tcsetattr(&file, SetArg::TCSANOW, &raw)
            .map_err(|e| config_failed("tcsetattr", e))?;

        debug!(
            port = %config.device,
            baud = config.baud_rate,
            timeout_ds = config.timeout_deciseconds,
            "serial port opened in raw mode"
        );

        Ok(Self {
            config: config.clone(),
            port: Some(RawPort { file, original }),
            pending: None,
        })
    }

    /// Port configuration this transport was opened with
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Whether the handle is still held
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port(&self) -> Result<&RawPort, TransportError> {
        self.port.as_ref().ok_or(TransportError::NotConnected)
    }
}

impl ByteTransport for SerialTransport {
    fn read_byte(&mut self) -> Result<u8, TransportError> {
        if let Some(byte) = self.pending.take() {
            return Ok(byte);
        }

        let mut file = &self.port()?.file;
        let mut buf = [0u8; 1];
        loop {
            match file.read(&mut buf) {
                // VMIN=0: a zero-length read means VTIME expired
                Ok(0) => return Err(TransportError::Timeout),
                Ok(_) => return Ok(buf[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::IoError(e)),
            }
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut file = &self.port()?.file;
        loop {
            match file.write(data) {
                Ok(written) if written == data.len() => return Ok(written),
                Ok(written) => {
                    return Err(TransportError::ShortWrite {
                        written,
                        requested: data.len(),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::IoError(e)),
            }
        }
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        let port = self.port()?;
        set_nonblocking(&port.file, true).map_err(io::Error::from)?;

        let mut file = &port.file;
        let mut buf = [0u8; 64];
        let mut discarded = 0usize;
        let drained = loop {
            match file.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        set_nonblocking(&port.file, false).map_err(io::Error::from)?;
        let stale = usize::from(self.pending.take().is_some());
        debug!(discarded = discarded + stale, "input flushed");
        drained.map_err(TransportError::IoError)
    }

    fn probe(&mut self) -> Result<bool, TransportError> {
        if self.pending.is_some() {
            return Ok(true);
        }

        let port = self.port()?;
        set_nonblocking(&port.file, true).map_err(io::Error::from)?;

        let mut file = &port.file;
        let mut buf = [0u8; 1];
        let polled = loop {
            match file.read(&mut buf) {
                Ok(n) => break Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(0),
                Err(e) => break Err(e),
            }
        };

        let restored = set_nonblocking(&port.file, false);
        if polled? == 1 {
            self.pending = Some(buf[0]);
        }
        // The byte is cached before any restore failure is reported
        restored.map_err(io::Error::from)?;
        Ok(self.pending.is_some())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.pending = None;
        let Some(port) = self.port.take() else {
            return Ok(());
        };

        let restored = termios::tcsetattr(&port.file, SetArg::TCSANOW, &port.original);
        drop(port);
        debug!(port = %self.config.device, "serial port closed");

        restored.map_err(|e| TransportError::ConfigFailed {
            port: self.config.device.clone(),
            reason: format!("restore attributes: {e}"),
        })
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud (8N1 {}, {:.1}s timeout)",
            self.config.device,
            self.config.baud_rate,
            match self.config.flow_control {
                SerialFlowControl::None => "No FC",
                SerialFlowControl::Hardware => "HW FC",
            },
            self.config.timeout().as_secs_f32()
        )
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to restore serial port on drop: {}", e);
        }
    }
}

/// Raw mode: 8N1, no line editing or echo, VMIN=0 with VTIME as the byte timeout
fn raw_attributes(
    original: &Termios,
    baud: BaudRate,
    config: &PortConfig,
) -> Result<Termios, nix::Error> {
    let mut attrs = original.clone();

    let mut control = ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD;
    if config.flow_control == SerialFlowControl::Hardware {
        control |= ControlFlags::CRTSCTS;
    }
    attrs.control_flags = control;
    attrs.input_flags = InputFlags::IGNBRK | InputFlags::IGNPAR;
    attrs.output_flags = OutputFlags::empty();
    attrs.local_flags = LocalFlags::empty();

    attrs.control_chars.fill(0);
    attrs.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    attrs.control_chars[SpecialCharacterIndices::VTIME as usize] = config.timeout_deciseconds;

    // After the flags: on Linux the speed lives in c_cflag
    termios::cfsetspeed(&mut attrs, baud)?;
    Ok(attrs)
}

fn set_nonblocking(file: &File, enabled: bool) -> nix::Result<()> {
    let fd = file.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    let flags = if enabled {
        flags | OFlag::O_NONBLOCK
    } else {
        flags & !OFlag::O_NONBLOCK
    };
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

fn baud_rate(rate: u32) -> Result<BaudRate, TransportError> {
    let baud = match rate {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        other => {
            return Err(TransportError::InvalidConfiguration(format!(
                "unsupported baud rate {other}"
            )))
        }
    };
    Ok(baud)
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_baud_rates_map() {
        assert!(matches!(baud_rate(57600), Ok(BaudRate::B57600)));
        assert!(matches!(baud_rate(9600), Ok(BaudRate::B9600)));
    }

    #[test]
    fn test_nonstandard_baud_rate_rejected() {
        assert!(matches!(
            baud_rate(12345),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_missing_device_is_not_found() {
        let config = PortConfig::new("/dev/this-analyser-does-not-exist");
        assert!(matches!(
            SerialTransport::open(&config),
            Err(TransportError::PortNotFound(_))
        ));
    }
}
