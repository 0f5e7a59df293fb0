//! MQTT control listener
//!
//! Owns the rumqttc eventloop for the sensor's single broker connection.
//! Desired-property documents and `SetCustomerCount` method calls arrive
//! on their own topics and are routed to the `ControlSurface`; method
//! responses go back out on the response topic.

use crate::infra::config::Config;
use crate::services::control::{ControlSurface, MethodResponse};
use anyhow::Context;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Upper bound on flushing the connection during shutdown
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the shared MQTT client and its eventloop from config
pub fn connect(config: &Config) -> (AsyncClient, EventLoop) {
    let client_id = format!("{}-{}", config.device_id(), config.module_id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs()));
    mqttoptions.set_clean_session(true);

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    AsyncClient::new(mqttoptions, 100)
}

/// Which inbound stream a topic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTopic {
    Desired,
    SetCustomerCount,
    Other,
}

pub struct ControlListener {
    client: AsyncClient,
    eventloop: EventLoop,
    control: ControlSurface,
    desired_topic: String,
    method_topic: String,
    method_response_topic: String,
    connected: watch::Sender<bool>,
}

impl ControlListener {
    pub fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        control: ControlSurface,
        config: &Config,
    ) -> (Self, watch::Receiver<bool>) {
        let (connected, connected_rx) = watch::channel(false);
        let listener = Self {
            client,
            eventloop,
            control,
            desired_topic: config.desired_topic().to_string(),
            method_topic: config.method_topic().to_string(),
            method_response_topic: config.method_response_topic().to_string(),
            connected,
        };
        (listener, connected_rx)
    }

    pub fn classify(&self, topic: &str) -> ControlTopic {
        if topic == self.desired_topic {
            ControlTopic::Desired
        } else if topic == self.method_topic {
            ControlTopic::SetCustomerCount
        } else {
            ControlTopic::Other
        }
    }

    /// Poll the connection until shutdown
    ///
    /// Subscriptions are (re)issued on every ConnAck since the session is
    /// clean.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            desired = %self.desired_topic,
            method = %self.method_topic,
            "control_listener_started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("control_listener_shutdown");
                        let _ = self.connected.send(false);
                        self.disconnect().await;
                        return Ok(());
                    }
                }
                result = self.eventloop.poll() => {
                    match result {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("mqtt_connected");
                            subscribe(&self.client, &self.desired_topic, &self.method_topic)
                                .await?;
                            let _ = self.connected.send(true);
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            match std::str::from_utf8(&publish.payload) {
                                Ok(payload) => self.dispatch(&publish.topic, payload),
                                Err(e) => warn!(topic = %publish.topic, error = %e, "control_payload_invalid_utf8"),
                            }
                        }
                        Ok(Event::Incoming(Packet::PubAck(_))) => {
                            debug!("mqtt_puback");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = self.connected.send(false);
                            error!(error = %e, "mqtt_error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    /// Queue DISCONNECT and keep polling until it is written out
    ///
    /// Requests queued ahead of it (pending event publishes, method
    /// responses) are flushed on the way.
    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "mqtt_disconnect_request_failed");
            return;
        }

        let eventloop = &mut self.eventloop;
        let flush = async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break true,
                    Ok(_) => {}
                    Err(_) => break false,
                }
            }
        };

        match tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await {
            Ok(true) => info!("mqtt_disconnected"),
            Ok(false) => debug!("mqtt_connection_closed_before_disconnect"),
            Err(_) => warn!("mqtt_disconnect_flush_timed_out"),
        }
    }

    fn dispatch(&self, topic: &str, payload: &str) {
        match self.classify(topic) {
            ControlTopic::Desired => {
                info!(payload = %payload, "desired_properties_received");
                match serde_json::from_str::<serde_json::Value>(payload) {
                    Ok(desired) => {
                        self.control.apply_desired_properties(&desired);
                    }
                    Err(e) => warn!(error = %e, "desired_properties_unparseable"),
                }
            }
            ControlTopic::SetCustomerCount => {
                let response = self.control.handle_set_customer_count(payload);
                self.respond(response);
            }
            ControlTopic::Other => {
                debug!(topic = %topic, "control_topic_ignored");
            }
        }
    }

    fn respond(&self, response: MethodResponse) {
        let Ok(json) = serde_json::to_string(&response) else {
            return;
        };
        if let Err(e) =
            self.client.try_publish(&self.method_response_topic, QoS::AtMostOnce, false, json)
        {
            warn!(error = %e, status = %response.status, "method_response_failed");
        }
    }
}

async fn subscribe(client: &AsyncClient, desired: &str, method: &str) -> anyhow::Result<()> {
    client
        .subscribe(desired, QoS::AtLeastOnce)
        .await
        .with_context(|| format!("Failed to subscribe to {}", desired))?;
    client
        .subscribe(method, QoS::AtLeastOnce)
        .await
        .with_context(|| format!("Failed to subscribe to {}", method))?;
    Ok(())
}
