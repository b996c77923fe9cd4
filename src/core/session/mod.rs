//! Acquisition sessions
//!
//! A session owns one transport for its whole life and walks it through
//! handshake, configuration and acquisition:
//!
//! ```text
//! Init -> Handshaking -> Configuring -> Acquiring -> (Draining) -> Closed
//! ```
//!
//! The transport is closed and the recorder finished on every exit path.

mod oscilloscope;
mod scan;

pub use oscilloscope::{OscilloscopeConfig, OscilloscopeRecord, OscilloscopeSession};
pub use scan::{ScanConfig, ScanRecord, ScanSession, DEFAULT_SETTLE_MS, DEFAULT_STEPS};

use crate::cli::ExitCodes;
use crate::core::cancel::CancellationToken;
use crate::core::protocol::{Command, Line, LineClient, LineError, MalformedLine, DEFAULT_MAX_LINE_LEN};
use crate::core::recorder::Recorder;
use crate::core::state_machine::{AcquisitionState, AcquisitionStateMachine};
use crate::core::transport::{ByteTransport, TransportError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What to do with a data line that does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedLinePolicy {
    /// Log it, count it and keep reading
    #[default]
    Skip,
    /// End the session with [`SessionError::MalformedData`]
    Fatal,
}

/// Tunables shared by both session kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Longest response line accepted, terminator included
    pub max_line_len: usize,
    /// Handling of unparseable data lines
    pub malformed: MalformedLinePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            malformed: MalformedLinePolicy::Skip,
        }
    }
}

/// How a session that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The instrument sent its `End` line
    Completed,
    /// The cancellation token was set; the stream was aborted
    Cancelled,
}

/// Result of a session that did not fail
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// How it ended
    pub outcome: Outcome,
    /// The two identification lines returned for `q`
    pub identity: Vec<String>,
    /// Records handed to the recorder
    pub records: usize,
    /// Data lines skipped as malformed
    pub skipped_lines: usize,
    /// States visited, in order, starting with `Init`
    pub states: Vec<AcquisitionState>,
    /// Wall time from start to close
    pub elapsed: Duration,
}

/// Configuration command that failed to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureStep {
    /// `<hz>A`
    StartFrequency,
    /// `<hz>B`
    StopFrequency,
    /// `<n>N`
    Steps,
    /// `<ms>D`
    SettleDelay,
    /// `F` / `E`
    Detector,
}

impl fmt::Display for ConfigureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartFrequency => "start frequency",
            Self::StopFrequency => "stop frequency",
            Self::Steps => "number of steps",
            Self::SettleDelay => "settle delay",
            Self::Detector => "detector",
        };
        f.write_str(name)
    }
}

/// Session errors. Every one of them is fatal.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Config rejected before any I/O
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The port could not be opened or put in raw mode
    #[error("Could not open the analyser port: {0}")]
    Open(#[source] TransportError),

    /// `q` could not be sent
    #[error("Could not send a q query to the analyser: {0}")]
    HandshakeWriteFailed(#[source] LineError),

    /// An identification line did not arrive
    #[error("Did not read line {line} of query data from the analyser: {source}")]
    HandshakeReadFailed {
        /// 1 or 2
        line: u8,
        /// What went wrong
        source: LineError,
    },

    /// A parameter command could not be sent
    #[error("Could not set {step}: {source}")]
    ConfigureStepFailed {
        /// Which parameter
        step: ConfigureStep,
        /// What went wrong
        source: LineError,
    },

    /// `s` or `o` could not be sent
    #[error("Could not start acquisition with '{command}': {source}")]
    AcquireStartFailed {
        /// The start command
        command: Command,
        /// What went wrong
        source: LineError,
    },

    /// A data line did not arrive intact; acquisition reads are never retried
    #[error("Did not read the acquisition response: {0}")]
    AcquireReadFailed(#[source] LineError),

    /// A data line did not parse and the policy is [`MalformedLinePolicy::Fatal`]
    #[error("Malformed data from the analyser: {0}")]
    MalformedData(#[source] MalformedLine),

    /// The recorder refused a record
    #[error("Could not record measurement: {0}")]
    Recorder(#[source] std::io::Error),
}

impl SessionError {
    /// The line-level failure behind this error, if any
    pub fn line_error(&self) -> Option<&LineError> {
        match self {
            Self::HandshakeWriteFailed(source)
            | Self::HandshakeReadFailed { source, .. }
            | Self::ConfigureStepFailed { source, .. }
            | Self::AcquireStartFailed { source, .. }
            | Self::AcquireReadFailed(source) => Some(source),
            Self::InvalidConfig(_)
            | Self::Open(_)
            | Self::MalformedData(_)
            | Self::Recorder(_) => None,
        }
    }

    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        if self.is_overflow() {
            return ExitCodes::LINE_OVERFLOW;
        }
        match self {
            Self::HandshakeWriteFailed(_) => ExitCodes::HANDSHAKE_SEND,
            Self::HandshakeReadFailed { .. } => ExitCodes::HANDSHAKE_READ,
            Self::ConfigureStepFailed { step, .. } => match step {
                ConfigureStep::StartFrequency => ExitCodes::START_FREQ_SEND,
                ConfigureStep::StopFrequency => ExitCodes::STOP_FREQ_SEND,
                ConfigureStep::Steps => ExitCodes::STEPS_SEND,
                ConfigureStep::SettleDelay => ExitCodes::SETTLE_SEND,
                // detector selection counts as part of starting the capture
                ConfigureStep::Detector => ExitCodes::ACQUIRE_START_SEND,
            },
            Self::AcquireStartFailed { .. } => ExitCodes::ACQUIRE_START_SEND,
            Self::AcquireReadFailed(_) | Self::MalformedData(_) => ExitCodes::ACQUIRE_READ,
            Self::InvalidConfig(_) | Self::Open(_) | Self::Recorder(_) => ExitCodes::SETUP_FAILED,
        }
    }

    /// Whether a line buffer overflow caused this, in any phase
    pub fn is_overflow(&self) -> bool {
        self.line_error().is_some_and(LineError::is_overflow)
    }
}

/// Result of the acquisition loop
struct Acquired {
    outcome: Outcome,
    records: usize,
    skipped: usize,
}

/// Protocol sequencing shared by scan and oscilloscope sessions
struct Driver<T> {
    client: LineClient<T>,
    machine: AcquisitionStateMachine,
    cancel: CancellationToken,
    options: SessionOptions,
}

impl<T: ByteTransport> Driver<T> {
    fn new(transport: T, cancel: CancellationToken) -> Self {
        Self {
            client: LineClient::new(transport),
            machine: AcquisitionStateMachine::new(),
            cancel,
            options: SessionOptions::default(),
        }
    }

    fn state(&self) -> AcquisitionState {
        self.machine.state()
    }

    fn enter(&mut self, state: AcquisitionState, reason: Option<&str>) {
        let result = self.machine.transition(state, reason);
        debug_assert!(result.is_ok(), "{result:?}");
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    /// Send `q` and read the two identification lines
    fn handshake(&mut self) -> Result<Vec<String>, SessionError> {
        self.enter(AcquisitionState::Handshaking, None);
        self.client
            .send(&Command::Identify.encode())
            .map_err(SessionError::HandshakeWriteFailed)?;

        let mut identity = Vec::with_capacity(2);
        for line in 1..=2u8 {
            let received = self
                .client
                .receive_line(self.options.max_line_len)
                .map_err(|source| SessionError::HandshakeReadFailed { line, source })?;
            let text = received.text().into_owned();
            debug!("Query from analyser: {}", text);
            identity.push(text);
        }
        Ok(identity)
    }

    /// Send each parameter command; none of them is acknowledged
    fn configure(&mut self, steps: &[(ConfigureStep, Command)]) -> Result<(), SessionError> {
        self.enter(AcquisitionState::Configuring, None);
        for &(step, command) in steps {
            self.client
                .send(&command.encode())
                .map_err(|source| SessionError::ConfigureStepFailed { step, source })?;
        }
        Ok(())
    }

    /// Start the stream and pass each data line through `parse` to `recorder`
    fn acquire<Rec, R, P>(
        &mut self,
        start: Command,
        parse: P,
        recorder: &mut R,
    ) -> Result<Acquired, SessionError>
    where
        R: Recorder<Rec> + ?Sized,
        P: Fn(&Line) -> Result<Rec, MalformedLine>,
    {
        self.enter(AcquisitionState::Acquiring, None);
        self.client
            .send(&start.encode())
            .map_err(|source| SessionError::AcquireStartFailed {
                command: start,
                source,
            })?;

        let mut records = 0;
        let mut skipped = 0;
        loop {
            if self.cancel.is_cancelled() {
                self.abort();
                return Ok(Acquired {
                    outcome: Outcome::Cancelled,
                    records,
                    skipped,
                });
            }

            let line = self
                .client
                .receive_line(self.options.max_line_len)
                .map_err(SessionError::AcquireReadFailed)?;

            if line.is_end_marker() {
                return Ok(Acquired {
                    outcome: Outcome::Completed,
                    records,
                    skipped,
                });
            }

            match parse(&line) {
                Ok(record) => {
                    recorder.record(&record).map_err(SessionError::Recorder)?;
                    records += 1;
                }
                Err(e) => match self.options.malformed {
                    MalformedLinePolicy::Skip => {
                        warn!("Skipping data line: {}", e);
                        skipped += 1;
                    }
                    MalformedLinePolicy::Fatal => return Err(SessionError::MalformedData(e)),
                },
            }
        }
    }

    /// Tell the instrument to stop and throw away what it already sent
    fn abort(&mut self) {
        self.enter(AcquisitionState::Draining, Some("cancelled"));
        info!("Terminating acquisition");
        if let Err(e) = self.client.send(&Command::Abort.encode()) {
            warn!("Could not send abort: {}", e);
        }
        if let Err(e) = self.client.flush_input() {
            warn!("Could not flush input: {}", e);
        }
    }

    /// Release the port. Safe to call once the state is already terminal.
    fn close(&mut self, reason: &str) {
        if let Err(e) = self.client.close() {
            warn!("Failed to restore the port: {}", e);
        }
        if !self.state().is_terminal() {
            self.enter(AcquisitionState::Closed, Some(reason));
        }
    }

    /// Run the whole sequence, then close the port and finish the recorder
    fn run<Rec, R, P>(
        mut self,
        steps: &[(ConfigureStep, Command)],
        start: Command,
        parse: P,
        recorder: &mut R,
    ) -> Result<SessionSummary, SessionError>
    where
        R: Recorder<Rec> + ?Sized,
        P: Fn(&Line) -> Result<Rec, MalformedLine>,
    {
        let result = self.handshake().and_then(|identity| {
            self.configure(steps)?;
            let acquired = self.acquire(start, parse, recorder)?;
            Ok((identity, acquired))
        });

        let reason = match &result {
            Ok((_, acquired)) if acquired.outcome == Outcome::Cancelled => "cancelled",
            Ok(_) => "completed",
            Err(_) => "failed",
        };
        self.close(reason);
        let finished = recorder.finish();

        let (identity, acquired) = match result {
            Ok(done) => done,
            Err(e) => {
                if let Err(finish_err) = finished {
                    warn!("Failed to finish recorder: {}", finish_err);
                }
                return Err(e);
            }
        };
        finished.map_err(SessionError::Recorder)?;

        let summary = SessionSummary {
            outcome: acquired.outcome,
            identity,
            records: acquired.records,
            skipped_lines: acquired.skipped,
            states: visited_states(&self.machine),
            elapsed: self.machine.elapsed(),
        };
        info!(
            outcome = ?summary.outcome,
            records = summary.records,
            skipped = summary.skipped_lines,
            "session finished"
        );
        Ok(summary)
    }

    /// Close without touching the instrument, for configs rejected up front
    fn reject<R: ?Sized, Rec>(mut self, reason: String, recorder: &mut R) -> SessionError
    where
        R: Recorder<Rec>,
    {
        self.close("invalid configuration");
        if let Err(e) = recorder.finish() {
            warn!("Failed to finish recorder: {}", e);
        }
        SessionError::InvalidConfig(reason)
    }
}

fn visited_states(machine: &AcquisitionStateMachine) -> Vec<AcquisitionState> {
    std::iter::once(AcquisitionState::Init)
        .chain(machine.history().iter().map(|t| t.to))
        .collect()
}
