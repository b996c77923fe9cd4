//! Simulated Analyser
//!
//! A [`ByteTransport`] that behaves like the K6BEZ firmware, for dry runs
//! without hardware and for end-to-end tests.
//!
//! Commands are parsed as a byte stream, the way the firmware does it:
//! digits accumulate into a pending number and the next letter consumes it.

use crate::core::protocol::{Detector, END_MARKER};
use crate::core::transport::{ByteTransport, TransportError};
use std::collections::VecDeque;
use tracing::debug;

/// Identification lines returned for `q`
pub const IDENTITY: [&str; 2] = ["K6BEZ Antenna Analyser (simulated)", "Firmware 1.0"];

/// Samples produced by one `o` command
pub const OSCILLOSCOPE_SAMPLES: usize = 100;

/// Forward detector level used for scan lines
const FORWARD_RAW: i64 = 500;

/// Instrument parameters as last set by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareState {
    /// `A`
    pub start_hz: i64,
    /// `B`
    pub stop_hz: i64,
    /// `N`
    pub steps: i64,
    /// `D`
    pub settle_ms: i64,
    /// `F` / `E`
    pub detector: Detector,
}

impl Default for FirmwareState {
    fn default() -> Self {
        Self {
            start_hz: 1_000_000,
            stop_hz: 30_000_000,
            steps: 100,
            settle_ms: 10,
            detector: Detector::Forward,
        }
    }
}

/// Measurement in progress; one line is produced at a time as the host reads
#[derive(Debug, Clone, Copy)]
enum Stream {
    Scan {
        start_hz: i64,
        stop_hz: i64,
        steps: i64,
        next: i64,
    },
    Oscilloscope {
        base: i64,
        next: usize,
    },
}

/// Firmware model speaking the analyser's line protocol
#[derive(Debug, Default)]
pub struct SimulatedAnalyser {
    firmware: FirmwareState,
    number: Option<i64>,
    outbound: VecDeque<u8>,
    stream: Option<Stream>,
    pending: Option<u8>,
    closed: bool,
}

impl SimulatedAnalyser {
    /// Power-on state
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters as last set by the host
    pub fn firmware(&self) -> &FirmwareState {
        &self.firmware
    }

    /// Bytes queued for the host
    pub fn pending_bytes(&self) -> usize {
        self.outbound.len() + usize::from(self.pending.is_some())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn emit(&mut self, line: &str) {
        self.outbound.extend(line.as_bytes());
        self.outbound.push_back(b'\n');
    }

    fn emit_end(&mut self) {
        self.outbound.extend(END_MARKER);
        self.outbound.push_back(b'\n');
    }

    fn accept(&mut self, byte: u8) {
        if byte.is_ascii_digit() {
            let digit = i64::from(byte - b'0');
            let value = self.number.unwrap_or(0);
            self.number = Some(value.saturating_mul(10).saturating_add(digit));
            return;
        }

        let value = self.number.take().unwrap_or(0);
        match byte {
            b'q' => {
                for line in IDENTITY {
                    self.emit(line);
                }
            }
            b'A' => self.firmware.start_hz = value,
            b'B' => self.firmware.stop_hz = value,
            b'N' => self.firmware.steps = value,
            b'D' => self.firmware.settle_ms = value,
            b'F' => self.firmware.detector = Detector::Forward,
            b'E' => self.firmware.detector = Detector::Reverse,
            b's' => self.start_stream(Stream::Scan {
                start_hz: self.firmware.start_hz,
                stop_hz: self.firmware.stop_hz,
                steps: self.firmware.steps.max(1),
                next: 0,
            }),
            b'o' => self.start_stream(Stream::Oscilloscope {
                base: match self.firmware.detector {
                    Detector::Forward => 600,
                    Detector::Reverse => 150,
                },
                next: 0,
            }),
            b'z' => {
                debug!(discarded = self.outbound.len(), "simulated abort");
                self.outbound.clear();
                self.stream = None;
            }
            other => debug!("simulator ignoring byte {:#04x}", other),
        }
    }

    fn start_stream(&mut self, stream: Stream) {
        self.stream = Some(stream);
        self.refill();
    }

    /// Queue the next line of the running measurement once the host has
    /// drained the previous one
    fn refill(&mut self) {
        if !self.outbound.is_empty() {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let line = match stream {
            Stream::Scan {
                start_hz,
                stop_hz,
                steps,
                next,
            } if *next <= *steps => {
                let freq = scan_frequency(*start_hz, *stop_hz, *steps, *next);
                let vswr = vswr_at(freq, *start_hz, *stop_hz);
                *next += 1;
                format!(
                    "{}.00,0,{},{}.00,{}.00",
                    freq,
                    (vswr * 1000.0).round() as i64,
                    FORWARD_RAW,
                    reverse_level(vswr)
                )
            }
            Stream::Oscilloscope { base, next } if *next < OSCILLOSCOPE_SAMPLES => {
                let ripple = (*next % 16) as i64 - 8;
                let line = format!("{} {}", next, *base + ripple);
                *next += 1;
                line
            }
            _ => {
                self.stream = None;
                self.emit_end();
                return;
            }
        };
        self.emit(&line);
    }
}

/// Frequency of step `step` out of `steps` between `start` and `stop`
fn scan_frequency(start: i64, stop: i64, steps: i64, step: i64) -> i64 {
    let offset = (i128::from(stop) - i128::from(start)) * i128::from(step) / i128::from(steps);
    // Lies between start and stop, so it fits back into i64
    (i128::from(start) + offset) as i64
}

/// Parabolic dip reaching 1.0 at the band centre and 3.0 at the edges
fn vswr_at(freq: i64, start: i64, stop: i64) -> f64 {
    let half_span = (stop as f64 - start as f64) / 2.0;
    if half_span <= 0.0 {
        return 1.0;
    }
    let centre = start as f64 + half_span;
    let offset = (freq as f64 - centre) / half_span;
    1.0 + 2.0 * offset * offset
}

fn reverse_level(vswr: f64) -> i64 {
    let gamma = (vswr - 1.0) / (vswr + 1.0);
    (FORWARD_RAW as f64 * gamma).round() as i64
}

impl ByteTransport for SimulatedAnalyser {
    fn read_byte(&mut self) -> Result<u8, TransportError> {
        self.ensure_open()?;
        if let Some(byte) = self.pending.take() {
            return Ok(byte);
        }
        self.refill();
        self.outbound.pop_front().ok_or(TransportError::Timeout)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.ensure_open()?;
        for &byte in data {
            self.accept(byte);
        }
        Ok(data.len())
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.pending = None;
        self.outbound.clear();
        Ok(())
    }

    fn probe(&mut self) -> Result<bool, TransportError> {
        self.ensure_open()?;
        if self.pending.is_none() {
            self.refill();
            self.pending = self.outbound.pop_front();
        }
        Ok(self.pending.is_some())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    fn connection_info(&self) -> String {
        "simulated analyser".to_string()
    }
}
