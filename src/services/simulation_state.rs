//! Shared simulation state guarded by a single lock
//!
//! The publish loop's simulator and the control surface both write here.
//! Every read and write of the mutable fields goes through the one
//! `parking_lot::Mutex`, and the lock is never held across an await.

use crate::domain::types::{SensorId, StoreStatus};
use parking_lot::Mutex;

/// Mutable fields, only reachable while the lock is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFields {
    pub sensor_id: Option<SensorId>,
    pub max_capacity: Option<u32>,
    pub store_status: StoreStatus,
    pub customer_count: u32,
}

impl StateFields {
    /// Both sensor id and capacity are required before anything is published
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.sensor_id.is_some() && self.max_capacity.is_some()
    }
}

/// Process-wide sensor state
///
/// Device and module identity are fixed at construction; everything else
/// is behind the lock.
pub struct SimulationState {
    device_id: String,
    module_id: String,
    fields: Mutex<StateFields>,
}

impl SimulationState {
    pub fn new(device_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            module_id: module_id.into(),
            fields: Mutex::new(StateFields::default()),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Copy of all four fields from a single lock acquisition
    pub fn snapshot(&self) -> StateFields {
        *self.fields.lock()
    }

    pub fn set_sensor_id(&self, sensor_id: SensorId) {
        self.fields.lock().sensor_id = Some(sensor_id);
    }

    /// Set the capacity, clamping the current count down if it no longer fits
    pub fn set_max_capacity(&self, max_capacity: u32) {
        let mut fields = self.fields.lock();
        fields.max_capacity = Some(max_capacity);
        if fields.customer_count > max_capacity {
            fields.customer_count = max_capacity;
        }
    }

    pub fn set_store_status(&self, store_status: StoreStatus) {
        self.fields.lock().store_status = store_status;
    }

    /// Run `f` with exclusive access to the fields
    ///
    /// This is the only way to change `customer_count`.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut StateFields) -> R) -> R {
        let mut fields = self.fields.lock();
        f(&mut fields)
    }
}
