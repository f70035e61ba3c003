//! Monitored devices and their classification.
//!
//! Device types are inferred from the advertised name and manufacturer data
//! with a prioritized match list: metadata rules first, then name substrings,
//! then [`DeviceType::Other`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::{DeviceId, SightingEvent, Timestamp};

/// Bluetooth SIG company identifier assigned to Apple.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// Name used when a device does not advertise one.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Broad category of a Bluetooth device, used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Phone.
    Phone,
    /// Smart watch.
    Watch,
    /// Tablet.
    Tablet,
    /// Earbuds or headphones.
    Earbuds,
    /// Laptop or desktop.
    Computer,
    /// Smart speaker.
    Speaker,
    /// Set-top media player.
    MediaPlayer,
    /// Anything else.
    #[default]
    Other,
}

/// Substring rules applied to the lower-cased name, in priority order.
const NAME_RULES: &[(&[&str], DeviceType)] = &[
    (&["airpod", "buds", "headphone"], DeviceType::Earbuds),
    (&["iphone", "phone", "pixel", "galaxy s"], DeviceType::Phone),
    (&["watch"], DeviceType::Watch),
    (&["ipad", "tablet"], DeviceType::Tablet),
    (
        &["macbook", "imac", "mac mini", "mac pro", "mac studio", "laptop"],
        DeviceType::Computer,
    ),
    (&["homepod", "speaker"], DeviceType::Speaker),
    (&["apple tv", "appletv"], DeviceType::MediaPlayer),
];

/// Apple-only rules; an Apple device with a custom name is most likely a phone.
const APPLE_RULES: &[(&[&str], DeviceType)] = &[
    (&["watch"], DeviceType::Watch),
    (&["ipad"], DeviceType::Tablet),
    (&["airpod"], DeviceType::Earbuds),
    (
        &["macbook", "imac", "mac mini", "mac pro"],
        DeviceType::Computer,
    ),
    (&["homepod"], DeviceType::Speaker),
    (&["apple tv", "appletv"], DeviceType::MediaPlayer),
];

fn match_rules(name: &str, rules: &[(&[&str], DeviceType)]) -> Option<DeviceType> {
    rules
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| name.contains(needle)))
        .map(|(_, device_type)| *device_type)
}

impl DeviceType {
    /// Classifies a device from its advertised name and manufacturer id.
    #[must_use]
    pub fn detect(name: &str, company_id: Option<u16>) -> Self {
        let lower = name.to_lowercase();

        if company_id == Some(APPLE_COMPANY_ID) {
            if let Some(device_type) = match_rules(&lower, APPLE_RULES) {
                return device_type;
            }
            if !lower.is_empty() && !lower.contains("unknown") {
                return Self::Phone;
            }
        }

        match_rules(&lower, NAME_RULES).unwrap_or_default()
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Phone => "Phone",
            Self::Watch => "Watch",
            Self::Tablet => "Tablet",
            Self::Earbuds => "Earbuds",
            Self::Computer => "Computer",
            Self::Speaker => "Speaker",
            Self::MediaPlayer => "Media Player",
            Self::Other => "Other",
        }
    }

    /// Freedesktop icon name for UIs.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Watch => "smartwatch",
            Self::Tablet => "tablet",
            Self::Earbuds => "audio-headphones",
            Self::Computer => "computer",
            Self::Speaker => "audio-speakers",
            Self::MediaPlayer => "video-display",
            Self::Other => "bluetooth",
        }
    }
}

/// Display bucket for a received signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    /// -50 dBm or stronger.
    Excellent,
    /// -60 to -51 dBm.
    Good,
    /// -70 to -61 dBm.
    Fair,
    /// -80 to -71 dBm.
    Weak,
    /// Below -80 dBm.
    VeryWeak,
}

impl SignalStrength {
    /// Buckets an RSSI reading.
    #[must_use]
    pub const fn from_rssi(rssi: i16) -> Self {
        match rssi {
            -50..=i16::MAX => Self::Excellent,
            -60..=-51 => Self::Good,
            -70..=-61 => Self::Fair,
            -80..=-71 => Self::Weak,
            _ => Self::VeryWeak,
        }
    }
}

/// A device the user asked to be watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonitoredDevice {
    /// Radio address.
    pub id: DeviceId,

    /// Display name.
    #[schema(example = "Alex's iPhone")]
    pub name: String,

    /// Inferred category.
    #[serde(default)]
    pub device_type: DeviceType,
}

impl MonitoredDevice {
    /// Creates a monitored device, classifying it from its name.
    #[must_use]
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        let name = name.into();
        let device_type = DeviceType::detect(&name, None);
        Self {
            id,
            name,
            device_type,
        }
    }
}

/// A device heard during a discovery window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiscoveredDevice {
    /// Radio address.
    pub id: DeviceId,

    /// Advertised name, or a placeholder.
    #[schema(example = "Alex's iPhone")]
    pub name: String,

    /// Inferred category.
    pub device_type: DeviceType,

    /// Most recent signal strength in dBm.
    #[schema(example = -58)]
    pub rssi: i16,

    /// Bucketed signal strength.
    pub signal_strength: SignalStrength,

    /// When the device was last heard.
    #[schema(value_type = String, format = DateTime)]
    pub last_seen_at: Timestamp,

    /// Whether the device is already monitored.
    pub is_monitored: bool,
}

impl DiscoveredDevice {
    /// Builds a record from the first sighting of a device.
    #[must_use]
    pub fn from_sighting(event: &SightingEvent, is_monitored: bool) -> Self {
        let name = event
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
        Self {
            id: event.device_id.clone(),
            device_type: DeviceType::detect(&name, event.company_id),
            name,
            rssi: event.rssi,
            signal_strength: SignalStrength::from_rssi(event.rssi),
            last_seen_at: event.observed_at,
            is_monitored,
        }
    }

    /// Folds a later sighting of the same device into this record.
    ///
    /// A real advertised name replaces the placeholder, never the reverse.
    pub fn refresh(
        &mut self,
        rssi: i16,
        seen_at: Timestamp,
        name: Option<&str>,
        company_id: Option<u16>,
    ) {
        self.rssi = rssi;
        self.signal_strength = SignalStrength::from_rssi(rssi);
        self.last_seen_at = seen_at;
        if let Some(name) = name.filter(|n| !n.is_empty() && *n != UNKNOWN_DEVICE_NAME) {
            if self.name != name {
                self.name = name.to_string();
                self.device_type = DeviceType::detect(name, company_id);
            }
        }
    }

    /// Converts the discovery record into a device to monitor.
    #[must_use]
    pub fn to_monitored(&self) -> MonitoredDevice {
        MonitoredDevice {
            id: self.id.clone(),
            name: self.name.clone(),
            device_type: self.device_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_name() {
        assert_eq!(DeviceType::detect("Maksim's iPhone", None), DeviceType::Phone);
        assert_eq!(DeviceType::detect("Apple Watch", None), DeviceType::Watch);
        assert_eq!(DeviceType::detect("iPad Pro", None), DeviceType::Tablet);
        assert_eq!(DeviceType::detect("AirPods Pro", None), DeviceType::Earbuds);
        assert_eq!(DeviceType::detect("Galaxy Buds2", None), DeviceType::Earbuds);
        assert_eq!(DeviceType::detect("WH-1000 Headphones", None), DeviceType::Earbuds);
        assert_eq!(DeviceType::detect("Work MacBook Air", None), DeviceType::Computer);
        assert_eq!(DeviceType::detect("Kitchen HomePod", None), DeviceType::Speaker);
        assert_eq!(DeviceType::detect("Living Room Apple TV", None), DeviceType::MediaPlayer);
        assert_eq!(DeviceType::detect(UNKNOWN_DEVICE_NAME, None), DeviceType::Other);
    }

    #[test]
    fn test_apple_metadata_takes_priority() {
        // A custom-named Apple device is assumed to be a phone.
        assert_eq!(
            DeviceType::detect("Alex", Some(APPLE_COMPANY_ID)),
            DeviceType::Phone
        );
        assert_eq!(
            DeviceType::detect("Alex's Watch", Some(APPLE_COMPANY_ID)),
            DeviceType::Watch
        );
        assert_eq!(
            DeviceType::detect(UNKNOWN_DEVICE_NAME, Some(APPLE_COMPANY_ID)),
            DeviceType::Other
        );
        // Other manufacturers fall through to the name rules.
        assert_eq!(DeviceType::detect("Alex", Some(0x0075)), DeviceType::Other);
    }

    #[test]
    fn test_signal_strength_ranges() {
        assert_eq!(SignalStrength::from_rssi(-45), SignalStrength::Excellent);
        assert_eq!(SignalStrength::from_rssi(-50), SignalStrength::Excellent);
        assert_eq!(SignalStrength::from_rssi(-55), SignalStrength::Good);
        assert_eq!(SignalStrength::from_rssi(-65), SignalStrength::Fair);
        assert_eq!(SignalStrength::from_rssi(-70), SignalStrength::Fair);
        assert_eq!(SignalStrength::from_rssi(-75), SignalStrength::Weak);
        assert_eq!(SignalStrength::from_rssi(-85), SignalStrength::VeryWeak);
    }

    #[test]
    fn test_icons_and_labels() {
        assert_eq!(DeviceType::Phone.icon(), "phone");
        assert_eq!(DeviceType::Other.icon(), "bluetooth");
        assert_eq!(DeviceType::MediaPlayer.label(), "Media Player");
    }

    #[test]
    fn test_monitored_device_defaults_type_on_load() {
        let json = r#"{"id":"AA:BB:CC:DD:EE:FF","name":"Beacon"}"#;
        let device: MonitoredDevice = serde_json::from_str(json).unwrap();
        assert_eq!(device.device_type, DeviceType::Other);
    }

    #[test]
    fn test_discovered_refresh_keeps_real_name() {
        let id = DeviceId::parse("AA:BB:CC:DD:EE:FF").unwrap();
        let mut device = DiscoveredDevice {
            id,
            name: UNKNOWN_DEVICE_NAME.to_string(),
            device_type: DeviceType::Other,
            rssi: -80,
            signal_strength: SignalStrength::from_rssi(-80),
            last_seen_at: chrono::Utc::now(),
            is_monitored: false,
        };

        device.refresh(-52, chrono::Utc::now(), Some("Sam's iPhone"), None);
        assert_eq!(device.name, "Sam's iPhone");
        assert_eq!(device.device_type, DeviceType::Phone);
        assert_eq!(device.signal_strength, SignalStrength::Good);

        device.refresh(-60, chrono::Utc::now(), None, None);
        device.refresh(-61, chrono::Utc::now(), Some(UNKNOWN_DEVICE_NAME), None);
        assert_eq!(device.name, "Sam's iPhone");
    }

    #[test]
    fn test_discovered_from_sighting() {
        let event = SightingEvent::new(
            DeviceId::parse("aa:bb:cc:dd:ee:ff").unwrap(),
            -58,
            chrono::Utc::now(),
        )
        .with_company_id(APPLE_COMPANY_ID);

        let device = DiscoveredDevice::from_sighting(&event, true);
        assert_eq!(device.id.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(device.name, UNKNOWN_DEVICE_NAME);
        assert_eq!(device.device_type, DeviceType::Other);
        assert!(device.is_monitored);
    }
}
