//! IO modules - external system interfaces
//!
//! - `mqtt_publisher` - Publishes door events to the telemetry topic
//! - `control_listener` - Drives the MQTT connection and routes desired
//!   properties / direct methods to the control surface

pub mod control_listener;
pub mod mqtt_publisher;

// Re-export commonly used types
pub use control_listener::{connect, ControlListener};
pub use mqtt_publisher::MqttEventPublisher;
