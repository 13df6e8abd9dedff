//! Export projections of the measurement ledger.
//!
//! This module provides a trait for rendering measurements into a file payload
//! and implementations for the inversion-software `.dat` format and a `.csv`
//! table. Both are pure: they read the measurements and survey configuration
//! and produce the same text for the same input.

pub mod csv;
pub mod dat;

pub use self::csv::CsvExporter;
pub use self::dat::DatExporter;

use crate::reading::Measurement;
use crate::survey::SurveyConfig;
use chrono::NaiveDate;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Line separator used in every export payload.
pub const LINE_SEPARATOR: &str = "\n";

/// Two-decimal rendering with ties rounded away from zero (`56.625` -> `56.63`).
///
/// Plain `{:.2}` rounds exact binary ties to even.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixed2(pub f64);

impl fmt::Display for Fixed2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scaled = self.0 * 100.0;
        if scaled.is_finite() {
            write!(f, "{:.2}", scaled.round() / 100.0)
        } else {
            write!(f, "{:.2}", self.0)
        }
    }
}

/// Trait for rendering the ordered measurements into a file payload.
pub trait Exporter: Send + Sync {
    /// File extension without the leading dot.
    fn extension(&self) -> &'static str;

    /// Render all measurements, in order, under the given survey configuration.
    fn export(&self, measurements: &[Measurement], config: &SurveyConfig) -> String;
}

/// Available export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// Res2DInv-style inversion input
    Dat,
    /// Spreadsheet-friendly table
    Csv,
}

impl ExportFormat {
    pub fn exporter(self) -> &'static dyn Exporter {
        match self {
            ExportFormat::Dat => &DatExporter,
            ExportFormat::Csv => &CsvExporter,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.exporter().extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "dat" => Ok(ExportFormat::Dat),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

/// Build the export file name: `<project>_<YYYY-MM-DD>.<ext>`.
///
/// The project name is reduced to a file-safe token; an empty result falls
/// back to `survey`.
pub fn export_file_name(project_name: &str, date: NaiveDate, extension: &str) -> String {
    let mut token = String::with_capacity(project_name.len());
    for c in project_name.trim().chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            token.push(c);
        } else if !token.ends_with('-') {
            token.push('-');
        }
    }
    let token = token.trim_matches('-');
    let token = if token.is_empty() { "survey" } else { token };
    format!("{}_{}.{}", token, date.format("%Y-%m-%d"), extension)
}

/// Render the measurements and write them into `dir`, returning the file path.
pub fn write_export(
    dir: &Path,
    format: ExportFormat,
    measurements: &[Measurement],
    config: &SurveyConfig,
    date: NaiveDate,
) -> io::Result<PathBuf> {
    let exporter = format.exporter();
    let content = exporter.export(measurements, config);
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(
        &config.project_name,
        date,
        exporter.extension(),
    ));
    std::fs::write(&path, content)?;
    Ok(path)
}
