//! # Antenna Analyser Core Library
//!
//! Driver for the K6BEZ antenna analyser, an Arduino-based instrument that
//! talks a line protocol over USB serial:
//! - Raw-mode serial transport with per-byte timeouts
//! - Bounded line reads and command encoding
//! - VSWR frequency scans and detector voltage captures
//! - Cooperative cancellation from Ctrl-C
//! - Plot-ready recording of measurements
//!
//! ## Example
//!
//! ```rust,no_run
//! use analyser_core::{CancellationToken, PortConfig, ScanConfig, ScanRecord, ScanSession};
//!
//! fn main() -> anyhow::Result<()> {
//!     let port = PortConfig::new("/dev/ttyACM0");
//!     let scan = ScanConfig::new(14_000_000, 14_350_000).steps(50);
//!     let session = ScanSession::open(&port, scan, CancellationToken::new())?;
//!
//!     let mut records: Vec<ScanRecord> = Vec::new();
//!     let summary = session.run(&mut records)?;
//!     println!("{} points, {:?}", summary.records, summary.outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{AppConfig, ConfigError, ScanDefaults};
pub use crate::core::cancel::{install_interrupt_handler, CancellationToken};
pub use crate::core::protocol::{Command, Detector, Line, LineClient, LineError};
pub use crate::core::recorder::{PlotFileRecorder, Recorder};
pub use crate::core::session::{
    MalformedLinePolicy, OscilloscopeConfig, OscilloscopeRecord, OscilloscopeSession, Outcome,
    ScanConfig, ScanRecord, ScanSession, SessionError, SessionOptions, SessionSummary,
};
pub use crate::core::simulator::SimulatedAnalyser;
pub use crate::core::state_machine::AcquisitionState;
#[cfg(unix)]
pub use crate::core::transport::SerialTransport;
pub use crate::core::transport::{
    ByteTransport, PortConfig, ScriptedTransport, SerialFlowControl, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
