//! Identification of the remote sensing unit.
//!
//! This module provides a compact 6-byte Bluetooth address type decoupled from
//! any specific Bluetooth library, and the filter used to pick the sensing unit
//! among the devices seen during discovery.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Advertised name prefix of the sensing unit firmware.
pub const DEFAULT_NAME_PREFIX: &str = "ESP32";

/// Display name used when the device does not advertise one.
pub const DEFAULT_DEVICE_NAME: &str = "ESP32";

/// A Bluetooth device address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceAddress(pub [u8; 6]);

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a device address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseAddressError {
    #[error("invalid device address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid device address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid device address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for DeviceAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(ParseAddressError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseAddressError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseAddressError::InvalidHex(part.to_string()))?;
        }

        Ok(DeviceAddress(bytes))
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for DeviceAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<DeviceAddress> for bluer::Address {
    fn from(addr: DeviceAddress) -> Self {
        bluer::Address(addr.0)
    }
}

/// Selection rule for the sensing unit.
///
/// A pinned address wins over everything else. Otherwise a device matches if
/// its name starts with the prefix or if it advertises the acquisition service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    pub address: Option<DeviceAddress>,
    pub name_prefix: String,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            address: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }
}

impl DeviceFilter {
    /// Decide whether a discovered device is the sensing unit.
    ///
    /// # Arguments
    /// * `address` - Address of the discovered device
    /// * `name` - Advertised name, if any
    /// * `has_service` - Whether the device advertises the acquisition service
    pub fn matches(&self, address: DeviceAddress, name: Option<&str>, has_service: bool) -> bool {
        if let Some(pinned) = self.address {
            return pinned == address;
        }
        has_service || name.is_some_and(|n| n.starts_with(&self.name_prefix))
    }
}
