//! Analyser command set
//!
//! Commands are short ASCII strings sent without a terminator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Detector read by oscilloscope mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detector {
    /// Forward detector
    #[default]
    Forward,
    /// Reverse (reflected) detector
    Reverse,
}

impl Detector {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Forward => "Forward Detector",
            Self::Reverse => "Reverse Detector",
        }
    }
}

impl std::str::FromStr for Detector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forward" | "fwd" | "f" => Ok(Self::Forward),
            "reverse" | "rev" | "r" => Ok(Self::Reverse),
            other => Err(format!("unknown detector '{other}'")),
        }
    }
}

/// A command understood by the analyser firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `q`: identify; answered by two free-text lines
    Identify,
    /// `<hz>A`: start frequency
    StartFrequency(i64),
    /// `<hz>B`: stop frequency
    StopFrequency(i64),
    /// `<n>N`: number of steps
    Steps(u32),
    /// `<ms>D`: settle delay
    SettleDelay(u32),
    /// `s`: start a scan
    StartScan,
    /// `o`: start the oscilloscope
    StartOscilloscope,
    /// `F` / `E`: select the detector
    SelectDetector(Detector),
    /// `z`: abort the running stream
    Abort,
}

impl Command {
    /// Wire form of the command
    pub fn encode(&self) -> String {
        match self {
            Self::Identify => "q".to_string(),
            Self::StartFrequency(hz) => format!("{hz}A"),
            Self::StopFrequency(hz) => format!("{hz}B"),
            Self::Steps(n) => format!("{n}N"),
            Self::SettleDelay(ms) => format!("{ms}D"),
            Self::StartScan => "s".to_string(),
            Self::StartOscilloscope => "o".to_string(),
            Self::SelectDetector(Detector::Forward) => "F".to_string(),
            Self::SelectDetector(Detector::Reverse) => "E".to_string(),
            Self::Abort => "z".to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding() {
        assert_eq!(Command::Identify.encode(), "q");
        assert_eq!(Command::StartFrequency(14_000_000).encode(), "14000000A");
        assert_eq!(Command::StopFrequency(14_350_000).encode(), "14350000B");
        assert_eq!(Command::Steps(100).encode(), "100N");
        assert_eq!(Command::SettleDelay(10).encode(), "10D");
        assert_eq!(Command::SelectDetector(Detector::Reverse).encode(), "E");
        assert_eq!(Command::Abort.to_string(), "z");
    }

    #[test]
    fn test_detector_parse() {
        assert_eq!("fwd".parse::<Detector>(), Ok(Detector::Forward));
        assert_eq!("Reverse".parse::<Detector>(), Ok(Detector::Reverse));
        assert!("sideways".parse::<Detector>().is_err());
    }
}
