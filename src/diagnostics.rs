//! Per-straw diagnostic artifacts.
//!
//! The calibration run hands every straw's histograms and peaks to a
//! [`DiagnosticSink`]. Sinks never influence results; write failures are logged.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::histogram::Histogram;
use crate::peak_finder::PeakCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramKind {
    Measured,
    Simulated,
}

impl HistogramKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistogramKind::Measured => "measured",
            HistogramKind::Simulated => "simulated",
        }
    }
}

/// Everything known about one histogram after peak finding
pub struct StrawDiagnostic<'a> {
    pub straw: usize,
    pub kind: HistogramKind,
    pub histogram: &'a Histogram,
    pub candidates: &'a [PeakCandidate],
    pub refined: &'a [f64],
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &StrawDiagnostic<'_>) -> anyhow::Result<()>;
}

/// Discards everything
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _diagnostic: &StrawDiagnostic<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes `straw_<n>_<kind>.csv` files with bin counts and a peak marker column
pub struct CsvHistogramSink {
    dir: PathBuf,
}

impl CsvHistogramSink {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, straw: usize, kind: HistogramKind) -> PathBuf {
        self.dir.join(format!("straw_{}_{}.csv", straw, kind.as_str()))
    }
}

impl DiagnosticSink for CsvHistogramSink {
    fn record(&self, diagnostic: &StrawDiagnostic<'_>) -> anyhow::Result<()> {
        let path = self.path_for(diagnostic.straw, diagnostic.kind);
        let mut out = BufWriter::new(File::create(&path)?);

        writeln!(out, "bin,count,candidate,refined")?;
        for (bin, count) in diagnostic.histogram.counts.iter().enumerate() {
            let candidate = diagnostic
                .candidates
                .iter()
                .any(|c| c.position.round() as i64 == bin as i64);
            let refined = diagnostic
                .refined
                .iter()
                .find(|r| r.round() as i64 == bin as i64)
                .map(|r| format!("{:.4}", r))
                .unwrap_or_default();
            writeln!(out, "{},{},{},{}", bin, count, u8::from(candidate), refined)?;
        }
        out.flush()?;
        Ok(())
    }
}
