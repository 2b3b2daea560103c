//! Volume and mute control through IAudioEndpointVolume.
//!
//! Volumes are expressed in percent (0.0 to 100.0) everywhere above this
//! module; the scalar conversion happens here.

use windows::Win32::Media::Audio::{Endpoints::IAudioEndpointVolume, IMMDevice};
use windows::Win32::System::Com::CLSCTX_ALL;

use super::device::AudioError;

/// Master volume and mute control for one endpoint.
pub struct VolumeController {
    endpoint_volume: IAudioEndpointVolume,
}

impl VolumeController {
    pub fn new(device: &IMMDevice) -> Result<Self, AudioError> {
        unsafe {
            let endpoint_volume: IAudioEndpointVolume = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|_| AudioError::VolumeNotAvailable)?;

            Ok(Self { endpoint_volume })
        }
    }

    /// Current master volume in percent.
    pub fn volume_percent(&self) -> Result<f64, AudioError> {
        unsafe {
            let scalar = self
                .endpoint_volume
                .GetMasterVolumeLevelScalar()
                .map_err(AudioError::WindowsError)?;
            Ok(f64::from(scalar) * 100.0)
        }
    }

    /// Set the master volume in percent. Values outside 0-100 are clamped.
    pub fn set_volume_percent(&self, percent: f64) -> Result<(), AudioError> {
        let scalar = (percent.clamp(0.0, 100.0) / 100.0) as f32;
        unsafe {
            self.endpoint_volume
                .SetMasterVolumeLevelScalar(scalar, std::ptr::null())
                .map_err(AudioError::WindowsError)
        }
    }

    pub fn muted(&self) -> Result<bool, AudioError> {
        unsafe {
            let muted = self
                .endpoint_volume
                .GetMute()
                .map_err(AudioError::WindowsError)?;
            Ok(muted.as_bool())
        }
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), AudioError> {
        unsafe {
            self.endpoint_volume
                .SetMute(muted, std::ptr::null())
                .map_err(AudioError::WindowsError)
        }
    }

    /// Flip the mute flag. Returns the new state.
    pub fn toggle_muted(&self) -> Result<bool, AudioError> {
        let muted = !self.muted()?;
        self.set_muted(muted)?;
        Ok(muted)
    }
}
