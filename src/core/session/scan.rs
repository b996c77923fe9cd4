//! VSWR scan session

use super::{ConfigureStep, Driver, SessionError, SessionOptions, SessionSummary};
use crate::core::cancel::CancellationToken;
use crate::core::protocol::{parse_scan_line, Command, ScanReading};
use crate::core::recorder::Recorder;
use crate::core::state_machine::AcquisitionState;
use crate::core::transport::ByteTransport;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default number of steps between start and stop
pub const DEFAULT_STEPS: u32 = 100;

/// Default settle delay in milliseconds
pub const DEFAULT_SETTLE_MS: u32 = 10;

/// Scan parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Start frequency in Hz
    pub start_freq_hz: i64,
    /// Stop frequency in Hz
    pub stop_freq_hz: i64,
    /// Number of steps
    pub num_steps: u32,
    /// Settle delay in ms
    pub settle_ms: u32,
}

impl ScanConfig {
    /// Scan `start..=stop` with the default steps and settle delay
    pub fn new(start_freq_hz: i64, stop_freq_hz: i64) -> Self {
        Self {
            start_freq_hz,
            stop_freq_hz,
            num_steps: DEFAULT_STEPS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }

    /// Set the number of steps
    #[must_use]
    pub fn steps(mut self, num_steps: u32) -> Self {
        self.num_steps = num_steps;
        self
    }

    /// Set the settle delay
    #[must_use]
    pub fn settle_ms(mut self, settle_ms: u32) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    /// Check the scan makes sense before talking to the instrument
    ///
    /// The firmware sweeps from `A` towards `B` in whatever direction it is
    /// given, but a reversed range is refused here so every sweep runs
    /// upward and plots read left to right.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_freq_hz <= 0 || self.stop_freq_hz <= 0 {
            return Err("start and stop frequencies must be positive".to_string());
        }
        if self.start_freq_hz > self.stop_freq_hz {
            return Err(format!(
                "start frequency {} Hz is above stop frequency {} Hz",
                self.start_freq_hz, self.stop_freq_hz
            ));
        }
        if self.num_steps == 0 {
            return Err("number of steps must be at least 1".to_string());
        }
        Ok(())
    }

    fn commands(&self) -> [(ConfigureStep, Command); 4] {
        [
            (ConfigureStep::StartFrequency, Command::StartFrequency(self.start_freq_hz)),
            (ConfigureStep::StopFrequency, Command::StopFrequency(self.stop_freq_hz)),
            (ConfigureStep::Steps, Command::Steps(self.num_steps)),
            (ConfigureStep::SettleDelay, Command::SettleDelay(self.settle_ms)),
        ]
    }
}

/// One point of a VSWR scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Frequency in MHz
    pub freq_mhz: f64,
    /// Voltage standing wave ratio
    pub vswr: f64,
}

impl From<ScanReading> for ScanRecord {
    #[allow(clippy::cast_precision_loss)]
    fn from(reading: ScanReading) -> Self {
        Self {
            freq_mhz: reading.freq_hz as f64 / 1_000_000.0,
            vswr: reading.vswr_raw as f64 / 1000.0,
        }
    }
}

/// Runs a frequency sweep and records VSWR per step
pub struct ScanSession<T> {
    driver: Driver<T>,
    config: ScanConfig,
}

#[cfg(unix)]
impl ScanSession<crate::core::transport::SerialTransport> {
    /// Open the serial port described by `port` and prepare a scan
    pub fn open(
        port: &crate::core::transport::PortConfig,
        config: ScanConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        let transport =
            crate::core::transport::SerialTransport::open(port).map_err(SessionError::Open)?;
        Ok(Self::new(transport, config, cancel))
    }
}

impl<T: ByteTransport> ScanSession<T> {
    /// Create a session over an already open transport
    pub fn new(transport: T, config: ScanConfig, cancel: CancellationToken) -> Self {
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

    /// Run the scan to completion, cancellation or failure
    pub fn run<R>(self, recorder: &mut R) -> Result<SessionSummary, SessionError>
    where
        R: Recorder<ScanRecord> + ?Sized,
    {
        let config = self.config;
        if let Err(reason) = config.validate() {
            return Err(self.driver.reject::<R, ScanRecord>(reason, recorder));
        }

        info!(
            start_hz = config.start_freq_hz,
            stop_hz = config.stop_freq_hz,
            steps = config.num_steps,
            settle_ms = config.settle_ms,
            via = %self.driver.client.transport().connection_info(),
            "starting scan"
        );
        self.driver.run(
            &config.commands(),
            Command::StartScan,
            |line| parse_scan_line(line).map(ScanRecord::from),
            recorder,
        )
    }
}
