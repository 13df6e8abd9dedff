//! Survey metadata set by the operator.
//!
//! The configuration is a plain value object persisted alongside the
//! measurements and edited field by field through [`ConfigUpdate`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default electrode spacing in meters.
pub const DEFAULT_ELECTRODE_SPACING: f64 = 1.0;

/// Electrode array geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArrayType {
    #[default]
    DipoleDipole,
    Wenner,
    Schlumberger,
}

impl ArrayType {
    /// Numeric array code used in the inversion file header.
    pub fn code(self) -> u8 {
        match self {
            ArrayType::Wenner => 1,
            ArrayType::Schlumberger => 2,
            ArrayType::DipoleDipole => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArrayType::DipoleDipole => "Dipole-Dipole",
            ArrayType::Wenner => "Wenner",
            ArrayType::Schlumberger => "Schlumberger",
        }
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ArrayType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dipole-dipole" | "dipole_dipole" | "dipoledipole" | "dd" => Ok(ArrayType::DipoleDipole),
            "wenner" | "w" => Ok(ArrayType::Wenner),
            "schlumberger" | "s" => Ok(ArrayType::Schlumberger),
            _ => Err(ConfigError::UnknownArrayType(s.to_string())),
        }
    }
}

// Persisted values that no longer name a known geometry fall back to the default.
impl From<String> for ArrayType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl From<ArrayType> for String {
    fn from(value: ArrayType) -> Self {
        value.label().to_string()
    }
}

/// Errors for invalid operator input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown array type '{0}' (expected dipole-dipole, wenner or schlumberger)")]
    UnknownArrayType(String),
    #[error("Electrode spacing must be a positive number of meters, got {0}")]
    InvalidSpacing(f64),
}

/// Operator-set survey metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurveyConfig {
    pub array_type: ArrayType,
    /// Electrode spacing in meters
    pub electrode_spacing: f64,
    pub project_name: String,
    pub operator: String,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            array_type: ArrayType::default(),
            electrode_spacing: DEFAULT_ELECTRODE_SPACING,
            project_name: "ERT Survey".to_string(),
            operator: "Operator".to_string(),
        }
    }
}

/// A single-field change to the survey configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    ArrayType(ArrayType),
    ElectrodeSpacing(f64),
    ProjectName(String),
    Operator(String),
}

impl SurveyConfig {
    /// Apply one field update. Invalid values leave the configuration untouched.
    pub fn apply(&mut self, update: ConfigUpdate) -> Result<(), ConfigError> {
        match update {
            ConfigUpdate::ArrayType(array_type) => self.array_type = array_type,
            ConfigUpdate::ElectrodeSpacing(spacing) => {
                self.electrode_spacing = validate_spacing(spacing)?;
            }
            ConfigUpdate::ProjectName(name) => self.project_name = name,
            ConfigUpdate::Operator(name) => self.operator = name,
        }
        Ok(())
    }
}

/// Check that an electrode spacing is finite and strictly positive.
pub fn validate_spacing(spacing: f64) -> Result<f64, ConfigError> {
    if spacing.is_finite() && spacing > 0.0 {
        Ok(spacing)
    } else {
        Err(ConfigError::InvalidSpacing(spacing))
    }
}
