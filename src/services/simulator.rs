//! Customer flow simulation
//!
//! Decides what the door sensor sees on each tick and keeps the customer
//! count in step with it. The decision and the count update happen in one
//! critical section on `SimulationState`.

use crate::domain::types::{Decision, DoorEvent, NotificationKind, StoreStatus};
use crate::services::simulation_state::{SimulationState, StateFields};
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Arc;
use tracing::debug;

/// Pick the next notification and apply it to the count
///
/// Returns `None` without touching anything when sensor id or capacity is
/// still unset. Caller must hold the state lock (i.e. run this inside
/// `SimulationState::with_lock`).
pub fn decide_notification<R: Rng + ?Sized>(
    fields: &mut StateFields,
    rng: &mut R,
) -> Option<NotificationKind> {
    if !fields.is_initialized() {
        return None;
    }
    let max_capacity = fields.max_capacity?;

    let kind = match fields.store_status {
        StoreStatus::Closed if fields.customer_count == 0 => {
            return Some(NotificationKind::StoreClosed);
        }
        StoreStatus::Closed => NotificationKind::CustomerExited,
        StoreStatus::Open if fields.customer_count == 0 => NotificationKind::CustomerEntered,
        StoreStatus::Open if fields.customer_count >= max_capacity => {
            NotificationKind::CustomerExited
        }
        StoreStatus::Open => {
            if rng.gen_bool(0.5) {
                NotificationKind::CustomerEntered
            } else {
                NotificationKind::CustomerExited
            }
        }
    };

    match kind {
        NotificationKind::CustomerEntered => fields.customer_count += 1,
        NotificationKind::CustomerExited => fields.customer_count -= 1,
        NotificationKind::StoreClosed => {}
    }

    Some(kind)
}

/// Clamp a commanded count into `[0, max_capacity]`
#[inline]
pub fn clamp_customer_count(value: i64, max_capacity: u32) -> u32 {
    value.clamp(0, i64::from(max_capacity)) as u32
}

/// Produces one `Decision` per tick from the shared state
pub struct FlowSimulator {
    state: Arc<SimulationState>,
    rng: Box<dyn RngCore + Send>,
}

impl FlowSimulator {
    pub fn new(state: Arc<SimulationState>) -> Self {
        Self { state, rng: Box::new(rand::rngs::StdRng::from_entropy()) }
    }

    /// Deterministic simulator for tests and reproducible runs
    pub fn with_seed(state: Arc<SimulationState>, seed: u64) -> Self {
        Self { state, rng: Box::new(rand::rngs::StdRng::seed_from_u64(seed)) }
    }

    pub fn state(&self) -> &Arc<SimulationState> {
        &self.state
    }

    /// Run one decision under the lock and build the resulting event
    pub fn decide(&mut self) -> Decision {
        let rng = &mut self.rng;
        let state = &self.state;

        state.with_lock(|fields| {
            let Some(kind) = decide_notification(fields, rng) else {
                return Decision::NotInitialized;
            };
            let (Some(sensor_id), Some(max_capacity)) = (fields.sensor_id, fields.max_capacity)
            else {
                return Decision::NotInitialized;
            };

            debug!(
                kind = %kind.as_str(),
                customer_count = %fields.customer_count,
                max_capacity = %max_capacity,
                "notification_decided"
            );

            Decision::Event(DoorEvent {
                device_id: state.device_id().to_string(),
                module_id: state.module_id().to_string(),
                sensor_id,
                max_capacity,
                notification_kind: kind,
                customer_count: fields.customer_count,
                store_status: fields.store_status,
            })
        })
    }
}
