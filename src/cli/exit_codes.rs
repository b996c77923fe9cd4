//! CLI Exit Codes
//!
//! One process status per failure class, so scripts driving the analyser
//! can tell which protocol step failed.

use crate::config::ConfigError;
use crate::core::session::{Outcome, SessionError, SessionSummary};
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success, including a cancelled acquisition
    pub const SUCCESS: u8 = 0;

    /// `q` could not be sent
    pub const HANDSHAKE_SEND: u8 = 1;

    /// Identification lines did not arrive
    pub const HANDSHAKE_READ: u8 = 2;

    /// `<hz>A` could not be sent
    pub const START_FREQ_SEND: u8 = 3;

    /// `<hz>B` could not be sent
    pub const STOP_FREQ_SEND: u8 = 4;

    /// `<n>N` could not be sent
    pub const STEPS_SEND: u8 = 5;

    /// `<ms>D` could not be sent
    pub const SETTLE_SEND: u8 = 6;

    /// `s`, `o` or a detector select could not be sent
    pub const ACQUIRE_START_SEND: u8 = 7;

    /// A data line did not arrive intact
    pub const ACQUIRE_READ: u8 = 8;

    /// A response line overran the line buffer, in any phase
    pub const LINE_OVERFLOW: u8 = 99;

    /// Port, output file, recorder or configuration failure
    pub const SETUP_FAILED: u8 = 255;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Finished with nothing to report
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Finished, with a note for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failed with `code`, one of [`ExitCodes`]
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Anything that went wrong before the instrument was reached
    pub fn setup_failed(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::SETUP_FAILED, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&SessionError> for CliResult {
    fn from(err: &SessionError) -> Self {
        Self::Error(err.exit_code(), err.to_string())
    }
}

impl From<SessionError> for CliResult {
    fn from(err: SessionError) -> Self {
        Self::from(&err)
    }
}

impl From<Result<SessionSummary, SessionError>> for CliResult {
    fn from(result: Result<SessionSummary, SessionError>) -> Self {
        match result {
            Ok(summary) => {
                let verb = match summary.outcome {
                    Outcome::Completed => "completed",
                    Outcome::Cancelled => "cancelled",
                };
                Self::success_with_message(format!(
                    "Acquisition {}: {} records, {} skipped",
                    verb, summary.records, summary.skipped_lines
                ))
            }
            Err(err) => Self::from(&err),
        }
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::setup_failed(err.to_string())
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        Self::setup_failed(err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        ExitCodes::SUCCESS => "Success",
        ExitCodes::HANDSHAKE_SEND => "Could not send query",
        ExitCodes::HANDSHAKE_READ => "Could not read query response",
        ExitCodes::START_FREQ_SEND => "Could not set start frequency",
        ExitCodes::STOP_FREQ_SEND => "Could not set stop frequency",
        ExitCodes::STEPS_SEND => "Could not set number of steps",
        ExitCodes::SETTLE_SEND => "Could not set settle delay",
        ExitCodes::ACQUIRE_START_SEND => "Could not start acquisition",
        ExitCodes::ACQUIRE_READ => "Could not read acquisition data",
        ExitCodes::LINE_OVERFLOW => "Response line too long",
        ExitCodes::SETUP_FAILED => "Setup failed",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 99, 255] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{Command, LineError};
    use crate::core::session::ConfigureStep;
    use crate::core::transport::TransportError;

    fn short_write() -> LineError {
        LineError::WriteFailed(TransportError::ShortWrite {
            written: 0,
            requested: 1,
        })
    }

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Could not set start frequency");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Could not set start frequency"));
    }

    #[test]
    fn test_protocol_steps_map_to_codes() {
        let cases = [
            (SessionError::HandshakeWriteFailed(short_write()), 1),
            (
                SessionError::HandshakeReadFailed {
                    line: 1,
                    source: LineError::Timeout { partial: 0 },
                },
                2,
            ),
            (
                SessionError::ConfigureStepFailed {
                    step: ConfigureStep::StartFrequency,
                    source: short_write(),
                },
                3,
            ),
            (
                SessionError::ConfigureStepFailed {
                    step: ConfigureStep::StopFrequency,
                    source: short_write(),
                },
                4,
            ),
            (
                SessionError::ConfigureStepFailed {
                    step: ConfigureStep::Steps,
                    source: short_write(),
                },
                5,
            ),
            (
                SessionError::ConfigureStepFailed {
                    step: ConfigureStep::SettleDelay,
                    source: short_write(),
                },
                6,
            ),
            (
                SessionError::AcquireStartFailed {
                    command: Command::StartScan,
                    source: short_write(),
                },
                7,
            ),
            (
                SessionError::AcquireReadFailed(LineError::Timeout { partial: 0 }),
                8,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(CliResult::from(&err).code(), code, "{err}");
        }
    }

    #[test]
    fn test_overflow_wins_in_every_phase() {
        let overflow = || LineError::Overflow { max_len: 256 };
        assert_eq!(
            SessionError::HandshakeReadFailed {
                line: 2,
                source: overflow()
            }
            .exit_code(),
            ExitCodes::LINE_OVERFLOW
        );
        assert_eq!(
            SessionError::AcquireReadFailed(overflow()).exit_code(),
            ExitCodes::LINE_OVERFLOW
        );
    }

    #[test]
    fn test_setup_failures() {
        let err = SessionError::Open(TransportError::PortNotFound("/dev/ttyACM0".into()));
        assert_eq!(CliResult::from(err).code(), ExitCodes::SETUP_FAILED);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert_eq!(CliResult::from(io).code(), 255);
    }

    #[test]
    fn test_descriptions_cover_table() {
        assert_eq!(exit_code_description(99), "Response line too long");
        assert_eq!(exit_code_description(42), "Unknown error");
    }
}
