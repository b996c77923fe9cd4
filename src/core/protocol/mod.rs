//! Analyser line protocol
//!
//! ASCII commands out, `\n`-terminated lines back:
//! - Command encoding
//! - Line framing with overflow detection
//! - Scan and oscilloscope data line parsing

pub mod command;
pub mod line;
pub mod response;

pub use command::{Command, Detector};
pub use line::{Line, LineClient, LineError, DEFAULT_MAX_LINE_LEN, END_MARKER};
pub use response::{parse_sample_line, parse_scan_line, MalformedLine, SampleReading, ScanReading};
