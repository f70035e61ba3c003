//! Shared types and OpenAPI schemas.
//!
//! This module contains the identifiers and observations that flow between
//! the scanner, the tracker and the API layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::UmbraError;

/// Wall-clock instant used throughout the proximity engine.
pub type Timestamp = DateTime<Utc>;

static MAC_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid regex"));

/// Returns `true` if `address` looks like `XX:XX:XX:XX:XX:XX`.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS_RE.is_match(address)
}

/// Stable identifier of a Bluetooth device: its radio address in upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "AA:BB:CC:DD:EE:FF")]
pub struct DeviceId(String);

impl DeviceId {
    /// Parses and normalizes a Bluetooth address.
    ///
    /// # Errors
    ///
    /// Returns [`UmbraError::InvalidDeviceId`] if `raw` is not a MAC address.
    pub fn parse(raw: &str) -> Result<Self, UmbraError> {
        let trimmed = raw.trim();
        if is_valid_mac_address(trimmed) {
            Ok(Self(trimmed.to_uppercase()))
        } else {
            Err(UmbraError::InvalidDeviceId(raw.to_string()))
        }
    }

    /// The normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = UmbraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = UmbraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// A single advertisement observed by the scanner.
///
/// Readings at or below the scanner's noise floor never become sightings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightingEvent {
    /// Which device was heard.
    pub device_id: DeviceId,
    /// Received signal strength in dBm (higher is stronger).
    pub rssi: i16,
    /// When the advertisement was received.
    pub observed_at: Timestamp,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Manufacturer company identifier from the advertisement, if any.
    pub company_id: Option<u16>,
}

impl SightingEvent {
    /// Creates a sighting with no name or metadata hint.
    #[must_use]
    pub fn new(device_id: DeviceId, rssi: i16, observed_at: Timestamp) -> Self {
        Self {
            device_id,
            rssi,
            observed_at,
            name: None,
            company_id: None,
        }
    }

    /// Attaches the advertised name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches the manufacturer company id.
    #[must_use]
    pub fn with_company_id(mut self, company_id: u16) -> Self {
        self.company_id = Some(company_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_address_validation() {
        assert!(is_valid_mac_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac_address("aa:bb:cc:dd:ee:ff"));
        assert!(!is_valid_mac_address("AA:BB:CC:DD:EE"));
        assert!(!is_valid_mac_address("AA-BB-CC-DD-EE-FF"));
        assert!(!is_valid_mac_address(""));
    }

    #[test]
    fn test_device_id_is_normalized() {
        let id = DeviceId::parse(" aa:bb:cc:dd:ee:0f ").unwrap();
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:0F");
        assert_eq!(id, "AA:BB:CC:DD:EE:0F".parse().unwrap());
    }

    #[test]
    fn test_device_id_rejects_garbage() {
        let err = DeviceId::parse("not-a-mac").unwrap_err();
        assert!(matches!(err, UmbraError::InvalidDeviceId(_)));
    }

    #[test]
    fn test_device_id_serde_validates() {
        let id: DeviceId = serde_json::from_str("\"11:22:33:44:55:66\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"11:22:33:44:55:66\"");
        assert!(serde_json::from_str::<DeviceId>("\"nope\"").is_err());
    }
}
