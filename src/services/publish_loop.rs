//! Tick loop: wait, decide, publish
//!
//! Each iteration sleeps for a randomized delay, asks the simulator for the
//! next door event and hands it to the publisher. Publish failures are
//! retried on the next tick; ten in a row stops the loop with a failure
//! outcome that the binary turns into a non-zero exit code.

use crate::domain::types::{Decision, DoorEvent};
use crate::infra::metrics::Metrics;
use crate::services::delay::{wait_for_shutdown, DelayScheduler};
use crate::services::simulator::FlowSimulator;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Consecutive publish failures that stop the loop
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Why a publish did not go through
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize door event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Sink for finished door events
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &DoorEvent) -> Result<(), PublishError>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, event: &DoorEvent) -> Result<(), PublishError> {
        (**self).publish(event).await
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Waiting,
    Deciding,
    Skipping,
    Publishing,
    Stopped,
}

impl LoopState {
    pub fn as_str(&self) -> &str {
        match self {
            LoopState::Waiting => "waiting",
            LoopState::Deciding => "deciding",
            LoopState::Skipping => "skipping",
            LoopState::Publishing => "publishing",
            LoopState::Stopped => "stopped",
        }
    }
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was signalled
    Cancelled,
    /// Too many publishes failed back to back
    PublishFailuresExceeded { failures: u32 },
}

impl LoopExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, LoopExit::PublishFailuresExceeded { .. })
    }
}

pub struct PublishLoop<P: Publisher> {
    simulator: FlowSimulator,
    scheduler: DelayScheduler,
    publisher: P,
    metrics: Arc<Metrics>,
    state: LoopState,
    consecutive_failures: u32,
}

impl<P: Publisher> PublishLoop<P> {
    pub fn new(
        simulator: FlowSimulator,
        scheduler: DelayScheduler,
        publisher: P,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            simulator,
            scheduler,
            publisher,
            metrics,
            state: LoopState::Waiting,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = %self.state.as_str(), to = %next.as_str(), "publish_loop_transition");
        self.state = next;
    }

    /// Run until shutdown or too many publish failures
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> LoopExit {
        info!("publish_loop_started");

        let exit = loop {
            if *shutdown.borrow() {
                break LoopExit::Cancelled;
            }

            self.transition(LoopState::Waiting);
            let status = self.simulator.state().snapshot().store_status;
            let delay = self.scheduler.next_delay(status);
            if !DelayScheduler::wait(delay, &mut shutdown).await {
                break LoopExit::Cancelled;
            }

            self.transition(LoopState::Deciding);
            let event = match self.simulator.decide() {
                Decision::NotInitialized => {
                    self.transition(LoopState::Skipping);
                    self.metrics.record_skipped();
                    info!("tick_skipped_not_initialized");
                    continue;
                }
                Decision::Event(event) => event,
            };

            self.transition(LoopState::Publishing);
            // None when shutdown interrupts the publish
            let result = tokio::select! {
                result = self.publisher.publish(&event) => Some(result),
                _ = wait_for_shutdown(&mut shutdown) => None,
            };
            let Some(result) = result else {
                break LoopExit::Cancelled;
            };

            match result {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    self.metrics.record_published(event.customer_count);
                    info!(
                        sensor_id = %event.sensor_id,
                        kind = %event.notification_kind.as_str(),
                        customer_count = %event.customer_count,
                        store_status = %event.store_status.as_str(),
                        "door_event_published"
                    );
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    self.metrics.record_publish_failure();
                    warn!(
                        error = %e,
                        consecutive_failures = %self.consecutive_failures,
                        "door_event_publish_failed"
                    );
                    if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        break LoopExit::PublishFailuresExceeded {
                            failures: self.consecutive_failures,
                        };
                    }
                }
            }
        };

        self.transition(LoopState::Stopped);
        match exit {
            LoopExit::Cancelled => info!("publish_loop_cancelled"),
            LoopExit::PublishFailuresExceeded { failures } => {
                error!(failures = %failures, "publish_loop_giving_up")
            }
        }
        exit
    }
}
