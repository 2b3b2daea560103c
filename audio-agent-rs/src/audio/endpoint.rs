//! Endpoint descriptors backed by Windows Core Audio.
//!
//! A [`WindowsEndpoint`] is an immutable snapshot of one device's identity
//! and role flags, taken when the enumerator materialized it. Control
//! actions re-open the device by id on a blocking thread with its own COM
//! apartment, so descriptors never carry COM pointers between threads.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use windows::Win32::Media::Audio::DEVICE_STATE;

use super::device::{AudioError, DeviceId, DeviceState};
use super::enumerator::{open_device, with_com};
use super::host::{AudioEndpoint, PeakSink, PeakSubscription};
use super::volume::VolumeController;
use super::{meter, policy};

pub(crate) fn state_from_raw(state: DEVICE_STATE) -> DeviceState {
    match state.0 {
        1 => DeviceState::Active,
        2 => DeviceState::Disabled,
        4 => DeviceState::NotPresent,
        8 => DeviceState::Unplugged,
        _ => DeviceState::NotPresent,
    }
}

pub struct WindowsEndpoint {
    pub(crate) id: DeviceId,
    pub(crate) name: String,
    pub(crate) state: DeviceState,
    pub(crate) playback: bool,
    pub(crate) capture: bool,
    pub(crate) default: bool,
    pub(crate) default_communications: bool,
    pub(crate) volume: f64,
    pub(crate) muted: bool,
}

/// Run a COM-bound action off the async runtime.
async fn blocking<T, F>(task: F) -> Result<T, AudioError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AudioError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || with_com(task)).await {
        Ok(result) => result,
        Err(e) => Err(AudioError::OperationFailed(e.to_string())),
    }
}

#[async_trait]
impl AudioEndpoint for WindowsEndpoint {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn is_playback(&self) -> bool {
        self.playback
    }

    fn is_capture(&self) -> bool {
        self.capture
    }

    fn is_default(&self) -> bool {
        self.default
    }

    fn is_default_communications(&self) -> bool {
        self.default_communications
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_default(&self) -> Result<(), AudioError> {
        with_com(|| policy::set_default_playback(self.id.as_str()))
    }

    fn set_default_communications(&self) -> Result<(), AudioError> {
        with_com(|| policy::set_default_communications(self.id.as_str()))
    }

    async fn set_mute(&self, muted: bool) -> Result<bool, AudioError> {
        let id = self.id.clone();
        blocking(move || {
            let device = open_device(id.as_str())?;
            VolumeController::new(&device)?.set_muted(muted)?;
            Ok(muted)
        })
        .await
    }

    async fn toggle_mute(&self) -> Result<bool, AudioError> {
        let id = self.id.clone();
        blocking(move || {
            let device = open_device(id.as_str())?;
            VolumeController::new(&device)?.toggle_muted()
        })
        .await
    }

    async fn set_volume(&self, volume: f64) -> Result<(), AudioError> {
        let id = self.id.clone();
        blocking(move || {
            let device = open_device(id.as_str())?;
            VolumeController::new(&device)?.set_volume_percent(volume)
        })
        .await
    }

    fn watch_peak(&self, active: Arc<AtomicBool>, sink: PeakSink) -> PeakSubscription {
        let worker = meter::spawn_peak_worker(self.id.clone(), Arc::clone(&active), sink);
        PeakSubscription::new(active, Some(worker))
    }
}
