//! Inversion-software (`.dat`) export.
//!
//! Layout:
//!
//! ```text
//! <project> - par <operator>
//! <array code>
//! <measurement count>
//! <electrode spacing>
//! 0
//! <midpoint> <spacing> <n factor> <resistance>
//! ...
//! ```

use super::{Exporter, Fixed2, LINE_SEPARATOR};
use crate::reading::Measurement;
use crate::survey::SurveyConfig;
use std::fmt;

/// Constant type flag closing the header.
pub const TYPE_FLAG: u8 = 0;

/// Res2DInv-style exporter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatExporter;

/// One data line of the `.dat` body.
#[derive(Debug, PartialEq)]
pub struct DatRow {
    pub midpoint: f64,
    pub spacing: f64,
    pub n_factor: i64,
    pub resistance: f64,
}

impl DatRow {
    pub fn new(measurement: &Measurement, spacing: f64) -> Self {
        let reading = &measurement.reading;
        let separation = (f64::from(reading.m) - f64::from(reading.b)).abs();
        Self {
            midpoint: reading.midpoint(),
            spacing,
            n_factor: (separation / spacing).round() as i64,
            resistance: reading.ra,
        }
    }
}

impl fmt::Display for DatRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            Fixed2(self.midpoint),
            Fixed2(self.spacing),
            self.n_factor,
            Fixed2(self.resistance)
        )
    }
}

/// Project and operator on a single header line.
fn title_line(config: &SurveyConfig) -> String {
    let flatten = |s: &str| s.replace(['\r', '\n'], " ");
    format!(
        "{} - par {}",
        flatten(&config.project_name),
        flatten(&config.operator)
    )
}

impl Exporter for DatExporter {
    fn extension(&self) -> &'static str {
        "dat"
    }

    fn export(&self, measurements: &[Measurement], config: &SurveyConfig) -> String {
        let spacing = config.electrode_spacing;

        let mut lines = Vec::with_capacity(measurements.len() + 5);
        lines.push(title_line(config));
        lines.push(config.array_type.code().to_string());
        lines.push(measurements.len().to_string());
        lines.push(spacing.to_string());
        lines.push(TYPE_FLAG.to_string());

        lines.extend(
            measurements
                .iter()
                .map(|m| DatRow::new(m, spacing).to_string()),
        );

        lines.join(LINE_SEPARATOR)
    }
}
