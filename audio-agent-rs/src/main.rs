//! Audio Agent - Console runner.
//!
//! Wires the Windows audio host to the command service and drives it from
//! stdin: each line is `<topic> <payload>`, the shape bus messages arrive
//! in, plus two local commands for inspection (`devices`, `quit`).

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use audio_agent_rs::{
    platform, AgentConfig, AgentService, BusPublisher, DeviceControl, DeviceRegistry,
    DiscoveryOptions,
};

/// Publishes to the log instead of a real transport.
struct LogBus;

impl BusPublisher for LogBus {
    fn publish(&self, topic: &str, payload: &str) {
        info!("[bus] {topic} <- {payload}");
    }

    fn publish_discovery(&self, topic: &str, options: &DiscoveryOptions) {
        match serde_json::to_string(options) {
            Ok(json) => info!("[bus] discovery {topic} <- {json}"),
            Err(e) => error!("Discovery options failed to serialize: {e}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Audio agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::from_env();
    let host = platform::default_host().context("audio backend unavailable")?;
    let registry = Arc::new(DeviceRegistry::new(host));
    registry
        .initialize()
        .context("device registry failed to start")?;

    let control = Arc::new(DeviceControl::new(Arc::clone(&registry)));
    let service = Arc::new(AgentService::new(
        Arc::clone(&control),
        Arc::new(LogBus),
        config,
    ));

    service.announce();
    let telemetry = service.spawn_telemetry();

    info!("Reading commands from stdin: <topic> <payload>, or 'devices' / 'quit'");
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "quit" | "exit" => break,
            "devices" => print_devices(&control),
            _ => {
                let (topic, payload) = line.split_once(' ').unwrap_or((line, ""));
                service.handle_message(topic, payload.trim()).await;
            }
        }
    }

    telemetry.abort();
    info!("Audio agent stopped");
    Ok(())
}

fn print_devices(control: &DeviceControl) {
    let devices = control.devices();
    if devices.is_empty() {
        println!("no devices tracked");
        return;
    }
    for device in devices {
        let kind = if device.is_playback { "playback" } else { "capture" };
        let mut flags = String::new();
        if device.is_default {
            flags.push_str(" [default]");
        }
        if device.is_default_communications {
            flags.push_str(" [comms]");
        }
        if device.is_muted {
            flags.push_str(" [muted]");
        }
        println!(
            "{kind:8} {:5.1}%  {}{flags}  ({})",
            device.volume, device.name, device.id
        );
    }
}
