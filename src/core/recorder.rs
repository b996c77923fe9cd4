//! Measurement recording
//!
//! Sessions hand each parsed record to a [`Recorder`]. [`PlotFileRecorder`]
//! writes the whitespace-separated two-column text gnuplot reads directly.

use crate::core::session::{OscilloscopeRecord, ScanRecord};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Sink for measurement records
#[cfg_attr(test, mockall::automock)]
pub trait Recorder<R> {
    /// Persist one record
    fn record(&mut self, record: &R) -> io::Result<()>;

    /// Called once when the session ends, on every exit path
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: Clone> Recorder<R> for Vec<R> {
    fn record(&mut self, record: &R) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

impl<R, T: Recorder<R> + ?Sized> Recorder<R> for &mut T {
    fn record(&mut self, record: &R) -> io::Result<()> {
        (**self).record(record)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// A record that has a line in the plot file
pub trait PlotLine {
    /// Write the line, terminator included
    fn write_plot_line(&self, out: &mut dyn Write) -> io::Result<()>;
}

impl PlotLine for ScanRecord {
    fn write_plot_line(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{:.6} {:.6}", self.freq_mhz, self.vswr)
    }
}

impl PlotLine for OscilloscopeRecord {
    fn write_plot_line(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} {}", self.sample_index, self.voltage_raw)
    }
}

/// Writes records as plot-ready text
pub struct PlotFileRecorder<W: Write> {
    out: W,
    lines: usize,
}

impl PlotFileRecorder<BufWriter<File>> {
    /// Create (or truncate) the capture file at `path`
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> PlotFileRecorder<W> {
    /// Record into `out`
    pub fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    /// Lines written so far
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write, R: PlotLine> Recorder<R> for PlotFileRecorder<W> {
    fn record(&mut self, record: &R) -> io::Result<()> {
        record.write_plot_line(&mut self.out)?;
        self.lines += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_format_matches_printf_f() {
        let mut recorder = PlotFileRecorder::new(Vec::new());
        recorder
            .record(&ScanRecord {
                freq_mhz: 14.0,
                vswr: 1.5,
            })
            .unwrap();
        recorder
            .record(&ScanRecord {
                freq_mhz: 7.1,
                vswr: 1.1,
            })
            .unwrap();

        assert_eq!(recorder.lines(), 2);
        let text = String::from_utf8(recorder.into_inner()).unwrap();
        assert_eq!(text, "14.000000 1.500000\n7.100000 1.100000\n");
    }

    #[test]
    fn test_oscilloscope_format() {
        let mut recorder = PlotFileRecorder::new(Vec::new());
        recorder
            .record(&OscilloscopeRecord {
                sample_index: 3,
                voltage_raw: 812,
            })
            .unwrap();
        assert_eq!(recorder.into_inner(), b"3 812\n");
    }

    #[test]
    fn test_file_recorder_flushes_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.dat");

        let mut recorder = PlotFileRecorder::create(&path).unwrap();
        recorder
            .record(&OscilloscopeRecord {
                sample_index: 0,
                voltage_raw: 1,
            })
            .unwrap();
        Recorder::<OscilloscopeRecord>::finish(&mut recorder).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0 1\n");
    }

    #[test]
    fn test_vec_recorder_collects() {
        let mut records: Vec<OscilloscopeRecord> = Vec::new();
        let record = OscilloscopeRecord {
            sample_index: 1,
            voltage_raw: 2,
        };
        records.record(&record).unwrap();
        assert_eq!(records, vec![record]);
    }
}
