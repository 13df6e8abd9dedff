//! Parsing of logical device messages into resistivity readings.
//!
//! Two firmware message shapes are accepted:
//!
//! - full form: `a,b,m,n,ra` (electrode positions followed by apparent resistance)
//! - resistance-only form: a single number such as `120.5`
//!
//! Resistance-only messages get placeholder electrode positions derived from the
//! current sequence position (`index + 1` .. `index + 4`). These placeholders are
//! not reconciled with the configured array geometry.

use crate::reading::Reading;
use thiserror::Error;

/// Field separator of the full message form.
pub const FIELD_SEPARATOR: char = ',';

/// Number of fields in the full message form.
pub const FULL_FORM_FIELDS: usize = 5;

/// Reasons a message is rejected. Rejections are logged, never surfaced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty message")]
    Empty,
    #[error("Expected 5 fields, got {0}")]
    FieldCount(usize),
    #[error("Invalid electrode position in field {position}: '{value}'")]
    InvalidPosition { position: usize, value: String },
    #[error("Invalid resistance: '{0}'")]
    InvalidResistance(String),
}

/// Parse one logical message.
///
/// # Arguments
/// * `message` - A complete message as emitted by the frame reassembler
/// * `index` - Current sequence position, used for resistance-only placeholders
pub fn parse_message(message: &str, index: usize) -> Result<Reading, ParseError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ParseError::Empty);
    }

    if message.contains(FIELD_SEPARATOR) {
        parse_full_form(message)
    } else {
        let ra = parse_resistance(message)?;
        Ok(placeholder_reading(index, ra))
    }
}

fn parse_full_form(message: &str) -> Result<Reading, ParseError> {
    let fields: Vec<&str> = message.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() < FULL_FORM_FIELDS {
        return Err(ParseError::FieldCount(fields.len()));
    }

    let mut positions = [0u32; 4];
    for (i, slot) in positions.iter_mut().enumerate() {
        *slot = parse_position(i, fields[i])?;
    }
    let ra = parse_resistance(fields[4])?;

    let [a, b, m, n] = positions;
    Ok(Reading::new(a, b, m, n, ra))
}

fn parse_position(position: usize, value: &str) -> Result<u32, ParseError> {
    match value.parse::<u32>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ParseError::InvalidPosition {
            position,
            value: value.to_string(),
        }),
    }
}

fn parse_resistance(value: &str) -> Result<f64, ParseError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|ra| ra.is_finite())
        .ok_or_else(|| ParseError::InvalidResistance(value.to_string()))
}

fn placeholder_reading(index: usize, ra: f64) -> Reading {
    let base = u32::try_from(index).unwrap_or(u32::MAX);
    Reading::new(
        base.saturating_add(1),
        base.saturating_add(2),
        base.saturating_add(3),
        base.saturating_add(4),
        ra,
    )
}
