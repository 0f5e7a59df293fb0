//! Domain models - value types shared across the sensor
//!
//! - `NotificationKind` - what happened at the door on a tick
//! - `StoreStatus` - open/closed gate on reachable notifications
//! - `DoorEvent` - the record handed to the publisher
//! - `Decision` - simulator output (event or not-yet-initialized)

pub mod types;

pub use types::{Decision, DoorEvent, NotificationKind, SensorId, StoreStatus};
