//! MQTT publisher for door events
//!
//! Serializes each `DoorEvent` to JSON and publishes it to the events topic
//! with QoS 1. The rumqttc eventloop is driven by the control listener,
//! which shares the same client connection and reports broker
//! connectivity through a watch channel.

use crate::domain::types::DoorEvent;
use crate::services::publish_loop::{PublishError, Publisher};
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tokio::sync::watch;
use tracing::debug;

pub struct MqttEventPublisher {
    client: AsyncClient,
    topic: String,
    connected: watch::Receiver<bool>,
}

impl MqttEventPublisher {
    pub fn new(
        client: AsyncClient,
        topic: impl Into<String>,
        connected: watch::Receiver<bool>,
    ) -> Self {
        Self { client, topic: topic.into(), connected }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Publisher for MqttEventPublisher {
    async fn publish(&self, event: &DoorEvent) -> Result<(), PublishError> {
        if !*self.connected.borrow() {
            return Err(PublishError::Transport("not connected to broker".to_string()));
        }

        let json = event.to_json()?;

        // Non-blocking: a full request queue counts as a failed publish
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, json.as_bytes())
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        debug!(topic = %self.topic, payload = %json, "door_event_sent");
        Ok(())
    }
}
