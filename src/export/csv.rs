//! Tabular (`.csv`) export.

use super::{Exporter, Fixed2, LINE_SEPARATOR};
use crate::reading::Measurement;
use crate::survey::SurveyConfig;
use chrono::SecondsFormat;

/// Header row of the table.
pub const CSV_HEADER: &str = "Index,A,B,M,N,Rho_a (Ohm.m),Timestamp";

/// One row per measurement with a 1-based index and an ISO-8601 timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExporter;

fn row(index: usize, m: &Measurement) -> String {
    let r = &m.reading;
    format!(
        "{},{},{},{},{},{:.2},{}",
        index,
        r.a,
        r.b,
        r.m,
        r.n,
        Fixed2(r.ra),
        m.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

impl Exporter for CsvExporter {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn export(&self, measurements: &[Measurement], _config: &SurveyConfig) -> String {
        let mut lines = Vec::with_capacity(measurements.len() + 1);
        lines.push(CSV_HEADER.to_string());
        lines.extend(
            measurements
                .iter()
                .enumerate()
                .map(|(i, m)| row(i + 1, m)),
        );
        lines.join(LINE_SEPARATOR)
    }
}
