//! Data line parsers
//!
//! Scan lines look like `14000000.00,0,1500,200.00,50.00`; the `.00`
//! suffixes are fixed text, never a fraction. Oscilloscope lines are
//! `<sample> <voltage>`.

use super::line::Line;
use thiserror::Error;

/// A data line that does not have the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed line '{line}': {reason}")]
pub struct MalformedLine {
    /// Offending line, lossily decoded
    pub line: String,
    /// What did not match
    pub reason: &'static str,
}

/// One scan step, as the firmware reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReading {
    /// Frequency in Hz
    pub freq_hz: i64,
    /// VSWR times 1000
    pub vswr_raw: i64,
    /// Forward detector reading
    pub forward_raw: i64,
    /// Reverse detector reading
    pub reverse_raw: i64,
}

/// One oscilloscope sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleReading {
    /// Sample number
    pub index: i64,
    /// Detector voltage, raw ADC units
    pub voltage_raw: i64,
}

/// Parse `<freq>.00,0,<vswr>,<fwd>.00,<rev>.00`
pub fn parse_scan_line(line: &Line) -> Result<ScanReading, MalformedLine> {
    let text = line.text();
    let malformed = |reason| MalformedLine {
        line: text.to_string(),
        reason,
    };

    let fields: Vec<&str> = text.split(',').collect();
    let [freq, zero, vswr, fwd, rev] = fields.as_slice() else {
        return Err(malformed("expected 5 comma-separated fields"));
    };
    if *zero != "0" {
        return Err(malformed("second field is not 0"));
    }

    Ok(ScanReading {
        freq_hz: decorated_int(freq).ok_or_else(|| malformed("bad frequency"))?,
        vswr_raw: vswr.parse().map_err(|_| malformed("bad VSWR"))?,
        forward_raw: decorated_int(fwd).ok_or_else(|| malformed("bad forward reading"))?,
        reverse_raw: decorated_int(rev).ok_or_else(|| malformed("bad reverse reading"))?,
    })
}

/// Parse `<sample> <voltage>`
pub fn parse_sample_line(line: &Line) -> Result<SampleReading, MalformedLine> {
    let text = line.text();
    let malformed = |reason| MalformedLine {
        line: text.to_string(),
        reason,
    };

    let mut fields = text.split_whitespace();
    let (Some(index), Some(voltage), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(malformed("expected 2 space-separated fields"));
    };

    Ok(SampleReading {
        index: index.parse().map_err(|_| malformed("bad sample index"))?,
        voltage_raw: voltage.parse().map_err(|_| malformed("bad voltage"))?,
    })
}

/// An integer followed by the literal `.00`
fn decorated_int(field: &str) -> Option<i64> {
    field.strip_suffix(".00")?.parse().ok()
}
