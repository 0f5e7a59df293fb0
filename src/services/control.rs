//! Remote control of the sensor: desired properties and direct methods
//!
//! Desired properties carry `SensorId`, `MaxCapacity` and `StoreStatus`;
//! any subset may be present. Each field is validated on its own so one
//! bad value never blocks the others. The `SetCustomerCount` method
//! overwrites the count, clamped to capacity, under the simulator's lock.

use crate::domain::types::{SensorId, StoreStatus};
use crate::infra::metrics::Metrics;
use crate::services::simulation_state::SimulationState;
use crate::services::simulator::clamp_customer_count;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const SENSOR_ID_KEY: &str = "SensorId";
pub const MAX_CAPACITY_KEY: &str = "MaxCapacity";
pub const STORE_STATUS_KEY: &str = "StoreStatus";

/// A desired-property field that could not be applied
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigFieldError {
    #[error("desired properties must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("SensorId must be a non-negative integer, got {0}")]
    InvalidSensorId(String),

    #[error("MaxCapacity must be a positive integer, got {0}")]
    InvalidMaxCapacity(String),

    #[error("StoreStatus must be 0, 1, \"Closed\" or \"Open\", got {0}")]
    InvalidStoreStatus(String),
}

/// What a desired-property update actually changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredUpdate {
    pub sensor_id: Option<SensorId>,
    pub max_capacity: Option<u32>,
    pub store_status: Option<StoreStatus>,
    pub errors: Vec<ConfigFieldError>,
}

impl DesiredUpdate {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn applied_fields(&self) -> usize {
        usize::from(self.sensor_id.is_some())
            + usize::from(self.max_capacity.is_some())
            + usize::from(self.store_status.is_some())
    }
}

/// Direct method response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodResponse {
    pub status: u16,
}

impl MethodResponse {
    pub const OK: MethodResponse = MethodResponse { status: 200 };
    pub const INTERNAL_ERROR: MethodResponse = MethodResponse { status: 500 };

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SetCustomerCountPayload {
    customer_count: i64,
}

/// Applies configuration and commands to the shared simulation state
#[derive(Clone)]
pub struct ControlSurface {
    state: Arc<SimulationState>,
    metrics: Arc<Metrics>,
}

impl ControlSurface {
    pub fn new(state: Arc<SimulationState>, metrics: Arc<Metrics>) -> Self {
        Self { state, metrics }
    }

    pub fn state(&self) -> &Arc<SimulationState> {
        &self.state
    }

    /// Apply a desired-properties document
    ///
    /// Absent or null keys leave the field unchanged. Unknown keys (such as
    /// `$version`) are ignored.
    pub fn apply_desired_properties(&self, desired: &Value) -> DesiredUpdate {
        let mut update = DesiredUpdate::default();

        let Some(props) = desired.as_object() else {
            let err = ConfigFieldError::NotAnObject(desired.to_string());
            warn!(error = %err, "desired_properties_rejected");
            update.errors.push(err);
            self.metrics.record_desired_update(update.errors.len());
            return update;
        };

        if let Some(value) = props.get(SENSOR_ID_KEY).filter(|v| !v.is_null()) {
            match parse_sensor_id(value) {
                Ok(sensor_id) => {
                    self.state.set_sensor_id(sensor_id);
                    update.sensor_id = Some(sensor_id);
                    info!(sensor_id = %sensor_id, "desired_sensor_id_applied");
                }
                Err(err) => {
                    warn!(error = %err, "desired_property_invalid");
                    update.errors.push(err);
                }
            }
        }

        if let Some(value) = props.get(MAX_CAPACITY_KEY).filter(|v| !v.is_null()) {
            match parse_max_capacity(value) {
                Ok(max_capacity) => {
                    self.state.set_max_capacity(max_capacity);
                    update.max_capacity = Some(max_capacity);
                    info!(max_capacity = %max_capacity, "desired_max_capacity_applied");
                }
                Err(err) => {
                    warn!(error = %err, "desired_property_invalid");
                    update.errors.push(err);
                }
            }
        }

        if let Some(value) = props.get(STORE_STATUS_KEY).filter(|v| !v.is_null()) {
            match parse_store_status(value) {
                Ok(store_status) => {
                    self.state.set_store_status(store_status);
                    update.store_status = Some(store_status);
                    info!(store_status = %store_status.as_str(), "desired_store_status_applied");
                }
                Err(err) => {
                    warn!(error = %err, "desired_property_invalid");
                    update.errors.push(err);
                }
            }
        }

        self.metrics.record_desired_update(update.errors.len());
        update
    }

    /// Overwrite the customer count, clamped to `[0, max_capacity]`
    ///
    /// No-op (returns `None`) while capacity is unset.
    pub fn set_customer_count(&self, value: i64) -> Option<u32> {
        self.metrics.record_command();
        let applied = self.state.with_lock(|fields| {
            let max_capacity = fields.max_capacity?;
            fields.customer_count = clamp_customer_count(value, max_capacity);
            Some(fields.customer_count)
        });

        match applied {
            Some(count) => info!(requested = %value, customer_count = %count, "customer_count_set"),
            None => info!(requested = %value, "customer_count_ignored_no_capacity"),
        }
        applied
    }

    /// Handle the `SetCustomerCount` direct method
    ///
    /// Payload is `{"CustomerCount": n}`; anything else is a 500.
    pub fn handle_set_customer_count(&self, payload: &str) -> MethodResponse {
        info!(payload = %payload, "set_customer_count_received");

        match serde_json::from_str::<SetCustomerCountPayload>(payload) {
            Ok(request) => {
                self.set_customer_count(request.customer_count);
                MethodResponse::OK
            }
            Err(e) => {
                warn!(error = %e, "set_customer_count_malformed");
                MethodResponse::INTERNAL_ERROR
            }
        }
    }
}

fn parse_sensor_id(value: &Value) -> Result<SensorId, ConfigFieldError> {
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .map(SensorId)
        .ok_or_else(|| ConfigFieldError::InvalidSensorId(value.to_string()))
}

fn parse_max_capacity(value: &Value) -> Result<u32, ConfigFieldError> {
    value
        .as_u64()
        .and_then(|cap| u32::try_from(cap).ok())
        .filter(|cap| *cap > 0)
        .ok_or_else(|| ConfigFieldError::InvalidMaxCapacity(value.to_string()))
}

fn parse_store_status(value: &Value) -> Result<StoreStatus, ConfigFieldError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(StoreStatus::from_code),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ConfigFieldError::InvalidStoreStatus(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn surface() -> ControlSurface {
        let state = Arc::new(SimulationState::new("edge-01", "DoorSensor"));
        ControlSurface::new(state, Arc::new(Metrics::new()))
    }

    #[test]
    fn test_apply_all_fields() {
        let control = surface();
        let update = control.apply_desired_properties(&json!({
            "SensorId": 3,
            "MaxCapacity": 25,
            "StoreStatus": 1,
            "$version": 7
        }));

        assert!(update.is_clean());
        assert_eq!(update.applied_fields(), 3);

        let snap = control.state().snapshot();
        assert_eq!(snap.sensor_id, Some(SensorId(3)));
        assert_eq!(snap.max_capacity, Some(25));
        assert_eq!(snap.store_status, StoreStatus::Open);
    }

    #[test]
    fn test_partial_update_leaves_other_fields() {
        let control = surface();
        control.apply_desired_properties(&json!({ "SensorId": 3, "MaxCapacity": 25 }));

        let update = control.apply_desired_properties(&json!({ "StoreStatus": "Open" }));
        assert_eq!(update.applied_fields(), 1);

        let snap = control.state().snapshot();
        assert_eq!(snap.sensor_id, Some(SensorId(3)));
        assert_eq!(snap.max_capacity, Some(25));
        assert_eq!(snap.store_status, StoreStatus::Open);
    }

    #[test]
    fn test_null_fields_are_ignored() {
        let control = surface();
        control.apply_desired_properties(&json!({ "SensorId": 3 }));

        let update = control.apply_desired_properties(&json!({ "SensorId": null }));
        assert!(update.is_clean());
        assert_eq!(update.applied_fields(), 0);
        assert_eq!(control.state().snapshot().sensor_id, Some(SensorId(3)));
    }

    #[test]
    fn test_malformed_field_does_not_block_valid_ones() {
        let control = surface();
        let update = control.apply_desired_properties(&json!({
            "SensorId": "kitchen",
            "MaxCapacity": 0,
            "StoreStatus": 1
        }));

        assert_eq!(update.errors.len(), 2);
        assert!(matches!(update.errors[0], ConfigFieldError::InvalidSensorId(_)));
        assert!(matches!(update.errors[1], ConfigFieldError::InvalidMaxCapacity(_)));
        assert_eq!(update.store_status, Some(StoreStatus::Open));

        let snap = control.state().snapshot();
        assert!(snap.sensor_id.is_none());
        assert!(snap.max_capacity.is_none());
        assert_eq!(snap.store_status, StoreStatus::Open);
    }

    #[test]
    fn test_invalid_store_status_codes() {
        let control = surface();
        for bad in [json!(2), json!(-1), json!("ajar"), json!(true)] {
            let update = control.apply_desired_properties(&json!({ "StoreStatus": bad }));
            assert!(matches!(update.errors[0], ConfigFieldError::InvalidStoreStatus(_)));
        }
        assert_eq!(control.state().snapshot().store_status, StoreStatus::Closed);
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let control = surface();
        let update = control.apply_desired_properties(&json!([1, 2, 3]));
        assert!(matches!(update.errors[0], ConfigFieldError::NotAnObject(_)));
        assert_eq!(update.applied_fields(), 0);
    }

    #[test]
    fn test_set_customer_count_clamps_to_capacity() {
        let control = surface();
        control.state().set_max_capacity(5);

        assert_eq!(control.set_customer_count(3), Some(3));
        assert_eq!(control.set_customer_count(50), Some(5));
        assert_eq!(control.set_customer_count(-2), Some(0));
        assert_eq!(control.state().snapshot().customer_count, 0);
    }

    #[test]
    fn test_set_customer_count_without_capacity_is_noop() {
        let control = surface();
        assert_eq!(control.set_customer_count(4), None);
        assert_eq!(control.state().snapshot().customer_count, 0);
    }

    #[test]
    fn test_method_handler_status_codes() {
        let control = surface();
        control.state().set_max_capacity(10);

        assert_eq!(control.handle_set_customer_count(r#"{"CustomerCount": 7}"#), MethodResponse::OK);
        assert_eq!(control.state().snapshot().customer_count, 7);

        assert_eq!(
            control.handle_set_customer_count("not json"),
            MethodResponse::INTERNAL_ERROR
        );
        assert_eq!(control.handle_set_customer_count("{}"), MethodResponse::INTERNAL_ERROR);
        assert_eq!(
            control.handle_set_customer_count(r#"{"CustomerCount": "many"}"#),
            MethodResponse::INTERNAL_ERROR
        );
        assert_eq!(control.state().snapshot().customer_count, 7);
    }

    #[test]
    fn test_method_response_serializes_status() {
        let json = serde_json::to_string(&MethodResponse::OK).unwrap();
        assert_eq!(json, r#"{"status":200}"#);
        assert!(!MethodResponse::INTERNAL_ERROR.is_success());
    }
}
