//! Bus-facing command and telemetry layer.
//!
//! [`AgentService`] owns the subscription list, parses inbound command
//! payloads and forwards them to the [`DeviceControl`] facade, and
//! periodically reports the default playback volume on the stats topic.
//! Transport is abstracted behind [`BusPublisher`], so the same service
//! drives the console runner, tests and the embedding API.

mod payload;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::audio::{DeviceControl, DeviceId, DeviceRef};
use crate::bus::{BusPublisher, Component, DiscoveryOptions};
use crate::config::AgentConfig;

/// Command topic carrying volume changes.
pub const TOPIC_VOLUME: &str = "audio/volume";
/// Command topic carrying mute changes.
pub const TOPIC_MUTE: &str = "audio/mute";
/// Command topic selecting the default playback device.
pub const TOPIC_DEFAULT: &str = "audio/default";
/// Command topic selecting the default communications device.
pub const TOPIC_DEFAULT_COMMS: &str = "audio/default-comms";
/// Stats topic the default playback volume is reported on.
pub const VOLUME_SENSOR_TOPIC: &str = "stats/audio/volume";

const SUBSCRIPTIONS: &[&str] = &[TOPIC_VOLUME, TOPIC_MUTE, TOPIC_DEFAULT, TOPIC_DEFAULT_COMMS];

pub struct AgentService {
    control: Arc<DeviceControl>,
    bus: Arc<dyn BusPublisher>,
    config: AgentConfig,
}

impl AgentService {
    pub fn new(control: Arc<DeviceControl>, bus: Arc<dyn BusPublisher>, config: AgentConfig) -> Self {
        Self { control, bus, config }
    }

    /// Command topics the embedding transport should subscribe to.
    pub fn subscriptions() -> &'static [&'static str] {
        SUBSCRIPTIONS
    }

    /// Routes one inbound message to its handler. Unknown topics are ignored.
    pub async fn handle_message(&self, topic: &str, payload: &str) {
        match topic {
            TOPIC_VOLUME => self.on_volume(payload).await,
            TOPIC_MUTE => self.on_mute(payload).await,
            TOPIC_DEFAULT => self.on_default(payload),
            TOPIC_DEFAULT_COMMS => self.on_default_communications(payload),
            other => debug!("Ignoring message on unhandled topic {other}"),
        }
    }

    async fn on_volume(&self, payload: &str) {
        trace!("Volume message received");
        if payload.trim().is_empty() {
            warn!("Volume message with an empty payload");
            return;
        }
        let Some((reference, volume)) = payload::volume_command(payload) else {
            debug!("Volume message with a malformed payload: {payload:?}");
            return;
        };
        match self.control.set_volume(&reference, volume).await {
            Ok(()) => debug!("Volume of {reference} set to {volume}"),
            Err(e) => debug!("Volume message rejected: {e}"),
        }
    }

    async fn on_mute(&self, payload: &str) {
        trace!("Mute message received");
        if payload.trim().is_empty() {
            debug!("Toggling mute flag of the default playback device");
            let muted = self.control.toggle_mute(&DeviceRef::Default).await;
            debug!("Default device mute flag is now {muted}");
            return;
        }
        let Some((reference, mute)) = payload::mute_command(payload) else {
            debug!("Mute message with a malformed payload: {payload:?}");
            return;
        };
        self.control.set_mute(&reference, mute).await;
        debug!("Mute flag of {reference} set to {mute}");
    }

    fn on_default(&self, payload: &str) {
        trace!("Default device message received");
        if payload.trim().is_empty() {
            warn!("Default device message with an empty payload");
            return;
        }
        let reference = DeviceRef::Id(DeviceId::new(payload.trim()));
        if self.control.set_default(&reference) {
            debug!("Device {reference} set as default playback device");
        }
    }

    fn on_default_communications(&self, payload: &str) {
        trace!("Default communications device message received");
        if payload.trim().is_empty() {
            warn!("Default communications device message with an empty payload");
            return;
        }
        let reference = DeviceRef::Id(DeviceId::new(payload.trim()));
        if self.control.set_default_communications(&reference) {
            debug!("Device {reference} set as default communications device");
        }
    }

    /// Announces the volume sensor so the receiving side can discover it.
    pub fn announce(&self) {
        let options = DiscoveryOptions {
            id: "volume".into(),
            name: "Volume".into(),
            unit: "%".into(),
            icon: "mdi:volume-high".into(),
            component: Component::Sensor,
        };
        self.bus.publish_discovery(VOLUME_SENSOR_TOPIC, &options);
    }

    /// Publishes the current default playback volume on the stats topic.
    pub fn publish_volume(&self) {
        match self.control.device_info(&DeviceRef::Default) {
            Some(device) => {
                info!("Sending default device volume: {}", device.volume);
                self.bus.publish(VOLUME_SENSOR_TOPIC, &device.volume.to_string());
            }
            None => debug!("No default playback device, skipping volume report"),
        }
    }

    /// Starts the periodic volume report. The first tick fires one full
    /// interval after the call, not immediately.
    pub fn spawn_telemetry(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let period = self.config.telemetry_interval();
        tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                service.publish_volume();
            }
        })
    }
}
