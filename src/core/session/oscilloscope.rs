//! Detector voltage oscilloscope session

use super::scan::DEFAULT_SETTLE_MS;
use super::{ConfigureStep, Driver, SessionError, SessionOptions, SessionSummary};
use crate::core::cancel::CancellationToken;
use crate::core::protocol::{parse_sample_line, Command, Detector, SampleReading};
use crate::core::recorder::Recorder;
use crate::core::state_machine::AcquisitionState;
use crate::core::transport::ByteTransport;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Oscilloscope parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscilloscopeConfig {
    /// Frequency to tune to first, in Hz; 0 leaves the DDS in reset
    pub freq_hz: i64,
    /// Settle delay in ms
    pub settle_ms: u32,
    /// Detector to read; `None` keeps the firmware's current choice
    pub detector: Option<Detector>,
}

impl Default for OscilloscopeConfig {
    fn default() -> Self {
        Self {
            freq_hz: 0,
            settle_ms: DEFAULT_SETTLE_MS,
            detector: Some(Detector::Forward),
        }
    }
}

impl OscilloscopeConfig {
    /// Read `detector` with the DDS in reset
    pub fn new(detector: Detector) -> Self {
        Self {
            detector: Some(detector),
            ..Self::default()
        }
    }

    /// Tune to `freq_hz` before measuring
    #[must_use]
    pub fn freq_hz(mut self, freq_hz: i64) -> Self {
        self.freq_hz = freq_hz;
        self
    }

    /// Set the settle delay
    #[must_use]
    pub fn settle_ms(mut self, settle_ms: u32) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    /// Check the parameters before talking to the instrument
    pub fn validate(&self) -> Result<(), String> {
        if self.freq_hz < 0 {
            return Err(format!("frequency {} Hz is negative", self.freq_hz));
        }
        Ok(())
    }

    fn commands(&self) -> Vec<(ConfigureStep, Command)> {
        let mut commands = Vec::with_capacity(3);
        if self.freq_hz != 0 {
            commands.push((ConfigureStep::StartFrequency, Command::StartFrequency(self.freq_hz)));
        }
        commands.push((ConfigureStep::SettleDelay, Command::SettleDelay(self.settle_ms)));
        if let Some(detector) = self.detector {
            commands.push((ConfigureStep::Detector, Command::SelectDetector(detector)));
        }
        commands
    }
}

/// One detector sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscilloscopeRecord {
    /// Sample number
    pub sample_index: i64,
    /// Raw detector voltage
    pub voltage_raw: i64,
}

impl From<SampleReading> for OscilloscopeRecord {
    fn from(reading: SampleReading) -> Self {
        Self {
            sample_index: reading.index,
            voltage_raw: reading.voltage_raw,
        }
    }
}

/// Streams detector voltage samples
pub struct OscilloscopeSession<T> {
    driver: Driver<T>,
    config: OscilloscopeConfig,
}

#[cfg(unix)]
impl OscilloscopeSession<crate::core::transport::SerialTransport> {
    /// Open the serial port described by `port` and prepare a capture
    pub fn open(
        port: &crate::core::transport::PortConfig,
        config: OscilloscopeConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        let transport =
            crate::core::transport::SerialTransport::open(port).map_err(SessionError::Open)?;
        Ok(Self::new(transport, config, cancel))
    }
}

impl<T: ByteTransport> OscilloscopeSession<T> {
    /// Create a session over an already open transport
    pub fn new(transport: T, config: OscilloscopeConfig, cancel: CancellationToken) -> Self {
        Self {
            driver: Driver::new(transport, cancel),
            config,
        }
    }

    /// Override session tunables
    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.driver.options = options;
        self
    }

    /// Current state
    pub fn state(&self) -> AcquisitionState {
        self.driver.state()
    }

    /// Run the capture to completion, cancellation or failure
    pub fn run<R>(self, recorder: &mut R) -> Result<SessionSummary, SessionError>
    where
        R: Recorder<OscilloscopeRecord> + ?Sized,
    {
        let config = self.config;
        if let Err(reason) = config.validate() {
            return Err(self.driver.reject::<R, OscilloscopeRecord>(reason, recorder));
        }

        info!(
            freq_hz = config.freq_hz,
            settle_ms = config.settle_ms,
            detector = ?config.detector,
            via = %self.driver.client.transport().connection_info(),
            "starting oscilloscope"
        );
        self.driver.run(
            &config.commands(),
            Command::StartOscilloscope,
            |line| parse_sample_line(line).map(OscilloscopeRecord::from),
            recorder,
        )
    }
}
