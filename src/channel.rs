use serde::{Deserialize, Serialize};

use crate::sensor::SensorVariant;

pub const HEADER_CHANNEL: &str = "svo_header";
pub const FOOTER_CHANNEL: &str = "svo_footer";

/// Semantic role of a container channel, derived from its name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChannelRole {
    Header,
    Footer,
    Video { serial: u32 },
    Sensors { serial: u32, integrated: bool },
    Unknown,
}

/// Coarse role used to select channels without knowing the device serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleCategory {
    Video,
    Sensors,
    IntegratedSensors,
}

impl ChannelRole {
    pub fn serial(&self) -> Option<u32> {
        match *self {
            ChannelRole::Video { serial } | ChannelRole::Sensors { serial, .. } => Some(serial),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<RoleCategory> {
        match *self {
            ChannelRole::Video { .. } => Some(RoleCategory::Video),
            ChannelRole::Sensors {
                integrated: false, ..
            } => Some(RoleCategory::Sensors),
            ChannelRole::Sensors {
                integrated: true, ..
            } => Some(RoleCategory::IntegratedSensors),
            _ => None,
        }
    }

    /// Sensor layout variant the channel is expected to carry.
    pub fn sensor_variant(&self) -> Option<SensorVariant> {
        match *self {
            ChannelRole::Sensors { integrated, .. } => Some(if integrated {
                SensorVariant::Integrated
            } else {
                SensorVariant::Raw
            }),
            _ => None,
        }
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self, ChannelRole::Header | ChannelRole::Footer)
    }
}

/// Map a channel name to its role.
///
/// Never fails: anything that does not look like `svo_header`, `svo_footer` or
/// `<prefix><serial>/<stream>` with a known stream suffix is [`ChannelRole::Unknown`].
pub fn classify(name: &str) -> ChannelRole {
    match name {
        HEADER_CHANNEL => return ChannelRole::Header,
        FOOTER_CHANNEL => return ChannelRole::Footer,
        _ => {}
    }

    let Some((device, stream)) = name.split_once('/') else {
        return ChannelRole::Unknown;
    };
    let Some(serial) = device_serial(device) else {
        return ChannelRole::Unknown;
    };

    match stream {
        "side_by_side" => ChannelRole::Video { serial },
        "sensors" => ChannelRole::Sensors {
            serial,
            integrated: false,
        },
        "sensors_integrated" | "integrated_sensors" => ChannelRole::Sensors {
            serial,
            integrated: true,
        },
        _ => ChannelRole::Unknown,
    }
}

// Trailing decimal digits of the device segment, e.g. `Camera_SN40735594` -> 40735594.
fn device_serial(device: &str) -> Option<u32> {
    let prefix_len = device.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let digits = &device[prefix_len..];
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
