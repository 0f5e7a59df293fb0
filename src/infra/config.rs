//! Configuration loading from TOML files
//!
//! The binary picks the path from `--config` or the `CONFIG_FILE`
//! environment variable, defaulting to config/dev.toml. Every section is
//! optional; a missing file falls back to defaults.

use crate::domain::types::StoreStatus;
use crate::services::control::{MAX_CAPACITY_KEY, SENSOR_ID_KEY, STORE_STATUS_KEY};
use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Environment variables the edge runtime sets for module identity
pub const DEVICE_ID_ENV: &str = "IOTEDGE_DEVICEID";
pub const MODULE_ID_ENV: &str = "IOTEDGE_MODULEID";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    /// Door events output (QoS 1)
    #[serde(default = "default_events_topic")]
    pub events: String,
    /// Desired-property documents from the cloud
    #[serde(default = "default_desired_topic")]
    pub desired: String,
    /// SetCustomerCount direct method requests
    #[serde(default = "default_method_topic")]
    pub method: String,
    /// Direct method responses
    #[serde(default = "default_method_response_topic")]
    pub method_response: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            events: default_events_topic(),
            desired: default_desired_topic(),
            method: default_method_topic(),
            method_response: default_method_response_topic(),
        }
    }
}

fn default_events_topic() -> String {
    "doorevents".to_string()
}

fn default_desired_topic() -> String {
    "doorsensor/twin/desired".to_string()
}

fn default_method_topic() -> String {
    "doorsensor/methods/SetCustomerCount".to_string()
}

fn default_method_response_topic() -> String {
    "doorsensor/methods/res".to_string()
}

/// Desired properties applied once at startup, before any remote update
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InitialConfig {
    #[serde(default)]
    pub sensor_id: Option<i64>,
    #[serde(default)]
    pub max_capacity: Option<i64>,
    #[serde(default)]
    pub store_status: Option<StoreStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub initial: InitialConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    device_id: String,
    module_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_keep_alive_secs: u64,
    events_topic: String,
    desired_topic: String,
    method_topic: String,
    method_response_topic: String,
    initial: InitialConfig,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults on error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let device_id = toml_config
            .device
            .device_id
            .or_else(|| env::var(DEVICE_ID_ENV).ok())
            .unwrap_or_else(|| "door-sensor".to_string());
        let module_id = toml_config
            .device
            .module_id
            .or_else(|| env::var(MODULE_ID_ENV).ok())
            .unwrap_or_else(|| "DoorSensor".to_string());

        Self {
            device_id,
            module_id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            mqtt_keep_alive_secs: toml_config.mqtt.keep_alive_secs,
            events_topic: toml_config.topics.events,
            desired_topic: toml_config.topics.desired,
            method_topic: toml_config.topics.method,
            method_response_topic: toml_config.topics.method_response,
            initial: toml_config.initial,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Startup desired properties in the same shape the cloud sends
    ///
    /// Only keys present in `[initial]` are included, so the document goes
    /// through the same per-field validation as a remote update.
    pub fn initial_desired_properties(&self) -> Value {
        let mut props = Map::new();
        if let Some(sensor_id) = self.initial.sensor_id {
            props.insert(SENSOR_ID_KEY.to_string(), Value::from(sensor_id));
        }
        if let Some(max_capacity) = self.initial.max_capacity {
            props.insert(MAX_CAPACITY_KEY.to_string(), Value::from(max_capacity));
        }
        if let Some(store_status) = self.initial.store_status {
            props.insert(STORE_STATUS_KEY.to_string(), Value::from(store_status.code()));
        }
        Value::Object(props)
    }

    // Getters for all config fields
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_keep_alive_secs(&self) -> u64 {
        self.mqtt_keep_alive_secs
    }

    pub fn events_topic(&self) -> &str {
        &self.events_topic
    }

    pub fn desired_topic(&self) -> &str {
        &self.desired_topic
    }

    pub fn method_topic(&self) -> &str {
        &self.method_topic
    }

    pub fn method_response_topic(&self) -> &str {
        &self.method_response_topic
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set module identity
    #[cfg(test)]
    pub fn with_identity(mut self, device_id: &str, module_id: &str) -> Self {
        self.device_id = device_id.to_string();
        self.module_id = module_id.to_string();
        self
    }
}
