//! Ordered collection of committed measurements.
//!
//! Insertion order is recording order, which is the chronological survey order
//! and is preserved in every export. The ledger never reorders its entries.

use crate::export::{CsvExporter, DatExporter, Exporter};
use crate::reading::{Measurement, MeasurementId, Reading};
use crate::survey::SurveyConfig;
use chrono::{DateTime, Utc};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ledger {
    measurements: Vec<Measurement>,
    /// Highest identifier handed out so far
    last_id: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted measurements, keeping their order.
    ///
    /// Entries with a missing or duplicate identifier are given a fresh one.
    pub fn from_measurements(measurements: Vec<Measurement>) -> Self {
        let mut ledger = Self::new();
        for m in measurements {
            ledger.append(m);
        }
        ledger
    }

    /// Commit a reading as a new measurement stamped with `timestamp`.
    pub fn record(&mut self, reading: Reading, timestamp: DateTime<Utc>) -> &Measurement {
        let id = self.next_id(timestamp);
        self.measurements
            .push(Measurement::new(id, reading, timestamp));
        &self.measurements[self.measurements.len() - 1]
    }

    /// Append a measurement, assigning a fresh identifier if it has none or
    /// if its identifier is already taken.
    pub fn append(&mut self, mut measurement: Measurement) -> MeasurementId {
        if !measurement.id.is_assigned() || self.contains(measurement.id) {
            measurement.id = self.next_id(Utc::now());
        } else {
            self.last_id = self.last_id.max(measurement.id.0);
        }
        let id = measurement.id;
        self.measurements.push(measurement);
        id
    }

    /// Remove the measurement with the given identifier.
    ///
    /// Returns `false` (and changes nothing) if no such measurement exists.
    pub fn delete_by_id(&mut self, id: MeasurementId) -> bool {
        match self.measurements.iter().position(|m| m.id == id) {
            Some(pos) => {
                self.measurements.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.measurements.clear();
    }

    pub fn contains(&self, id: MeasurementId) -> bool {
        self.measurements.iter().any(|m| m.id == id)
    }

    /// Measurements in recording order.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Inversion-software (`.dat`) projection of the ledger.
    pub fn export_primary(&self, config: &SurveyConfig) -> String {
        DatExporter.export(&self.measurements, config)
    }

    /// Tabular (`.csv`) projection of the ledger.
    pub fn export_secondary(&self, config: &SurveyConfig) -> String {
        CsvExporter.export(&self.measurements, config)
    }

    /// Millisecond timestamp of `now`, bumped past every identifier already issued.
    fn next_id(&mut self, now: DateTime<Utc>) -> MeasurementId {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        match self.last_id.checked_add(1) {
            Some(next) => {
                self.last_id = millis.max(next);
                MeasurementId(self.last_id)
            }
            // Nothing above the last identifier is left; reuse the lowest free one.
            None => (1..=u64::MAX)
                .map(MeasurementId)
                .find(|&id| !self.contains(id))
                .unwrap_or(MeasurementId::UNASSIGNED),
        }
    }
}
