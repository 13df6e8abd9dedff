//! Resistivity reading and measurement data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A candidate measurement received from the sensing unit, not yet committed.
///
/// Electrode positions are indices along the survey line (1-based).
/// Apparent resistance is in ohm-meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Current electrode A
    pub a: u32,
    /// Current electrode B
    pub b: u32,
    /// Potential electrode M
    pub m: u32,
    /// Potential electrode N
    pub n: u32,
    /// Apparent resistance in ohm-meters
    pub ra: f64,
}

impl Reading {
    pub fn new(a: u32, b: u32, m: u32, n: u32, ra: f64) -> Self {
        Self { a, b, m, n, ra }
    }

    /// Arithmetic mean of the four electrode positions.
    pub fn midpoint(&self) -> f64 {
        (f64::from(self.a) + f64::from(self.b) + f64::from(self.m) + f64::from(self.n)) / 4.0
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A={} B={} M={} N={} Rho_a={:.2} Ohm.m",
            self.a, self.b, self.m, self.n, self.ra
        )
    }
}

/// Identifier of a committed measurement, unique within a ledger.
///
/// The zero value means "not assigned yet"; the ledger replaces it on append.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MeasurementId(pub u64);

impl MeasurementId {
    pub const UNASSIGNED: MeasurementId = MeasurementId(0);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committed, immutable measurement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Unique identifier
    pub id: MeasurementId,
    /// Electrode positions and apparent resistance
    #[serde(flatten)]
    pub reading: Reading,
    /// When the reading was accepted by the operator
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn new(id: MeasurementId, reading: Reading, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            reading,
            timestamp,
        }
    }
}
