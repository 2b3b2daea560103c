//! Device control facade.
//!
//! Thin command surface over the registry: resolves device references,
//! validates input, and forwards to the platform endpoint. Missing devices
//! and platform refusals come back as neutral results, not errors; only
//! invalid input raises.

use std::sync::Arc;

use tracing::{debug, warn};

use super::device::{AudioDevice, AudioError, DeviceRef};
use super::registry::DeviceRegistry;

pub struct DeviceControl {
    registry: Arc<DeviceRegistry>,
}

impl DeviceControl {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Devices currently tracked and reported by the platform.
    pub fn devices(&self) -> Vec<AudioDevice> {
        self.registry.list_devices()
    }

    /// Snapshot of one device; the sentinel resolves to the default
    /// playback device.
    pub fn device_info(&self, reference: &DeviceRef) -> Option<AudioDevice> {
        self.registry.device_info(reference)
    }

    /// Last observed peak value, 0.0 when unknown.
    pub fn peak_value(&self, reference: &DeviceRef) -> f64 {
        self.registry.peak_value(reference)
    }

    /// Make the referenced device the console-role default. The sentinel
    /// is refused here; switching the default requires naming a device.
    pub fn set_default(&self, reference: &DeviceRef) -> bool {
        let Some(endpoint) = self.registry.resolve(reference, false) else {
            warn!("Cannot set default device, {reference} not found");
            return false;
        };
        match endpoint.set_default() {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to set default device {}: {err}", endpoint.id());
                false
            }
        }
    }

    /// Make the referenced device the communications-role default.
    pub fn set_default_communications(&self, reference: &DeviceRef) -> bool {
        let Some(endpoint) = self.registry.resolve(reference, false) else {
            warn!("Cannot set default communications device, {reference} not found");
            return false;
        };
        match endpoint.set_default_communications() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Failed to set default communications device {}: {err}",
                    endpoint.id()
                );
                false
            }
        }
    }

    /// Set the mute state. Returns the resulting state, false when the
    /// device is missing or the platform refused.
    pub async fn set_mute(&self, reference: &DeviceRef, muted: bool) -> bool {
        let Some(endpoint) = self.registry.resolve(reference, true) else {
            debug!("Mute target {reference} not found");
            return false;
        };
        match endpoint.set_mute(muted).await {
            Ok(state) => state,
            Err(err) => {
                warn!("Failed to set mute on {}: {err}", endpoint.id());
                false
            }
        }
    }

    /// Flip the mute state. Same result conventions as `set_mute`.
    pub async fn toggle_mute(&self, reference: &DeviceRef) -> bool {
        let Some(endpoint) = self.registry.resolve(reference, true) else {
            debug!("Mute target {reference} not found");
            return false;
        };
        match endpoint.toggle_mute().await {
            Ok(state) => state,
            Err(err) => {
                warn!("Failed to toggle mute on {}: {err}", endpoint.id());
                false
            }
        }
    }

    /// Set the volume as a percentage. Values outside 0 to 100 are
    /// rejected before any device work; a missing device is a no-op.
    pub async fn set_volume(&self, reference: &DeviceRef, volume: f64) -> Result<(), AudioError> {
        if !(0.0..=100.0).contains(&volume) {
            return Err(AudioError::InvalidVolume { value: volume });
        }
        let Some(endpoint) = self.registry.resolve(reference, true) else {
            debug!("Volume target {reference} not found, ignoring");
            return Ok(());
        };
        endpoint.set_volume(volume).await
    }
}
