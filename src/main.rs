//! Door sensor - simulated retail door occupancy publisher
//!
//! Simulates customers passing one store door and publishes each movement
//! to the telemetry pipeline over MQTT. Capacity, sensor id and store status
//! arrive as desired properties; the SetCustomerCount method resets the count.
//!
//! Module structure:
//! - `domain/` - Value types (DoorEvent, NotificationKind, StoreStatus)
//! - `services/` - Simulation state, decision, delay, publish loop, control
//! - `io/` - MQTT publisher and control listener
//! - `infra/` - Config, Metrics

use anyhow::Context;
use clap::Parser;
use door_sensor::infra::{Config, Metrics};
use door_sensor::io::{connect, ControlListener, MqttEventPublisher};
use door_sensor::services::{
    ControlSurface, DelayScheduler, FlowSimulator, LoopExit, PublishLoop, SimulationState,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Door sensor - simulated customer flow publisher
#[derive(Parser, Debug)]
#[command(name = "door-sensor", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Seed the simulation RNG for a reproducible customer sequence
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Default: INFO, use RUST_LOG=debug for loop transitions and payloads
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("door-sensor starting");

    let args = Args::parse();

    match run(args).await {
        Ok(exit) if exit.is_failure() => {
            error!(exit = ?exit, "door-sensor stopped after publish failures");
            ExitCode::FAILURE
        }
        Ok(_) => {
            info!("door-sensor shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "door-sensor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<LoopExit> {
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        device_id = %config.device_id(),
        module_id = %config.module_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        events_topic = %config.events_topic(),
        desired_topic = %config.desired_topic(),
        method_topic = %config.method_topic(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared state, seeded from [initial] the same way a twin read would
    let state = Arc::new(SimulationState::new(config.device_id(), config.module_id()));
    let metrics = Arc::new(Metrics::new());
    let control = ControlSurface::new(state.clone(), metrics.clone());
    control.apply_desired_properties(&config.initial_desired_properties());

    // One broker connection: the listener drives it, the publisher shares the client
    let (client, eventloop) = connect(&config);
    let (listener, connected_rx) =
        ControlListener::new(client.clone(), eventloop, control, &config);
    let listener_shutdown = shutdown_rx.clone();
    let listener_task = tokio::spawn(async move {
        if let Err(e) = listener.run(listener_shutdown).await {
            error!(error = %format!("{:#}", e), "control listener error");
        }
    });

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    let simulator = match args.seed {
        Some(seed) => FlowSimulator::with_seed(state, seed),
        None => FlowSimulator::new(state),
    };
    let publisher = MqttEventPublisher::new(client, config.events_topic(), connected_rx);
    let mut publish_loop = PublishLoop::new(simulator, DelayScheduler::new(), publisher, metrics);

    info!("publish_loop_starting");
    let exit = publish_loop.run(shutdown_rx).await;

    // Stop the listener whichever way the loop ended
    let _ = shutdown_tx.send(true);
    listener_task.await.context("control listener task panicked")?;

    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test touching CONFIG_FILE so no other test races on it
    #[test]
    fn test_config_path_resolution() {
        std::env::remove_var("CONFIG_FILE");
        let args = Args::try_parse_from(["door-sensor"]).unwrap();
        assert_eq!(args.config, "config/dev.toml");

        std::env::set_var("CONFIG_FILE", "config/mall.toml");
        let args = Args::try_parse_from(["door-sensor"]).unwrap();
        assert_eq!(args.config, "config/mall.toml");

        let args = Args::try_parse_from(["door-sensor", "--config", "config/outlet.toml"]).unwrap();
        assert_eq!(args.config, "config/outlet.toml");
        std::env::remove_var("CONFIG_FILE");
    }
}
