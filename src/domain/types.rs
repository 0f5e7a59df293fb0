//! Shared value types for the door sensor
//!
//! These are the records that flow from the simulator to the publisher and
//! on to the dashboard. The dashboard reads PascalCase keys and integer
//! enum values, so the enums serialize as their numeric codes.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Newtype wrapper for sensor IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SensorId(pub u32);

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of notification produced by one simulated tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    CustomerEntered,
    CustomerExited,
    StoreClosed,
}

impl NotificationKind {
    /// Numeric code used on the wire
    pub fn code(&self) -> u8 {
        match self {
            NotificationKind::CustomerEntered => 0,
            NotificationKind::CustomerExited => 1,
            NotificationKind::StoreClosed => 2,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::CustomerEntered => "customer_entered",
            NotificationKind::CustomerExited => "customer_exited",
            NotificationKind::StoreClosed => "store_closed",
        }
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Whether the store is open for business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreStatus {
    #[default]
    Closed,
    Open,
}

impl StoreStatus {
    /// Numeric code used on the wire and in desired properties
    pub fn code(&self) -> u8 {
        match self {
            StoreStatus::Closed => 0,
            StoreStatus::Open => 1,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(StoreStatus::Closed),
            1 => Some(StoreStatus::Open),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StoreStatus::Closed => "closed",
            StoreStatus::Open => "open",
        }
    }
}

impl std::str::FromStr for StoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "closed" | "0" => Ok(StoreStatus::Closed),
            "open" | "1" => Ok(StoreStatus::Open),
            other => Err(format!("unknown store status '{}'", other)),
        }
    }
}

impl Serialize for StoreStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Accepts either the numeric code or the name, so TOML files can say
/// `store_status = "open"` while twin payloads send `1`.
impl<'de> Deserialize<'de> for StoreStatus {
    fn deserialize<D>(deserializer: D) -> Result<StoreStatus, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StoreStatusVisitor;

        impl<'de> Visitor<'de> for StoreStatusVisitor {
            type Value = StoreStatus;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("0, 1, \"closed\" or \"open\"")
            }

            fn visit_u64<E>(self, value: u64) -> Result<StoreStatus, E>
            where
                E: de::Error,
            {
                StoreStatus::from_code(value)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(value), &self))
            }

            fn visit_i64<E>(self, value: i64) -> Result<StoreStatus, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .ok()
                    .and_then(StoreStatus::from_code)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(value), &self))
            }

            fn visit_str<E>(self, value: &str) -> Result<StoreStatus, E>
            where
                E: de::Error,
            {
                value.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_any(StoreStatusVisitor)
    }
}

/// One published door notification
///
/// Built under the state lock, so `customer_count` is the post-update value
/// that matches `notification_kind`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DoorEvent {
    pub device_id: String,
    pub module_id: String,
    pub sensor_id: SensorId,
    pub max_capacity: u32,
    #[serde(rename = "NotificationType")]
    pub notification_kind: NotificationKind,
    pub customer_count: u32,
    pub store_status: StoreStatus,
}

impl DoorEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outcome of a single simulator step
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Sensor id or capacity not configured yet; nothing to publish
    NotInitialized,
    Event(DoorEvent),
}

impl Decision {
    pub fn is_initialized(&self) -> bool {
        matches!(self, Decision::Event(_))
    }

    pub fn event(&self) -> Option<&DoorEvent> {
        match self {
            Decision::Event(e) => Some(e),
            Decision::NotInitialized => None,
        }
    }

    pub fn into_event(self) -> Option<DoorEvent> {
        match self {
            Decision::Event(e) => Some(e),
            Decision::NotInitialized => None,
        }
    }
}
