//! Audio device data models.
//!
//! Defines the core data structures for representing host audio devices,
//! their state, device references, and related events.

use std::fmt;

use thiserror::Error;

use super::host::AudioEndpoint;

/// Platform-native endpoint identifier.
///
/// Carried as an opaque string so ids cross process and bus boundaries
/// losslessly, whatever textual form the platform uses. Ordered so device
/// maps keep a stable iteration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A reference to a device in a command or query.
///
/// Commands may omit the device, meaning "whatever the current default
/// playback device is". Blank input parses to `Default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    /// The current default playback device, resolved at call time.
    Default,

    /// A specific device by platform id.
    Id(DeviceId),
}

impl DeviceRef {
    /// Parse a textual device reference. Empty or whitespace-only text
    /// selects the default playback device.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            DeviceRef::Default
        } else {
            DeviceRef::Id(DeviceId::new(trimmed))
        }
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRef::Default => f.write_str("<default>"),
            DeviceRef::Id(id) => f.write_str(id.as_str()),
        }
    }
}

/// Point-in-time snapshot of a device.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Platform device id.
    pub id: DeviceId,

    /// Human-readable device name (from device properties).
    pub name: String,

    /// Master volume as a percentage (0.0 to 100.0).
    pub volume: f64,

    /// Most recent peak meter value as a percentage (0.0 to 100.0).
    pub peak_volume: f64,

    /// Whether the device is currently rendering audio (peak above zero).
    pub is_audio_playing: bool,

    /// Current mute state.
    pub is_muted: bool,

    /// Whether this is the default device for the console role.
    pub is_default: bool,

    /// Whether this is the default device for the communications role.
    pub is_default_communications: bool,

    /// Whether this is a playback (render) device.
    pub is_playback: bool,

    /// Whether this is a capture device.
    pub is_capture: bool,
}

impl AudioDevice {
    /// Build a snapshot from an endpoint plus the last observed peak value.
    pub fn from_endpoint(endpoint: &dyn AudioEndpoint, peak_volume: f64) -> Self {
        Self {
            id: endpoint.id().clone(),
            name: endpoint.name().to_string(),
            volume: endpoint.volume(),
            peak_volume,
            is_audio_playing: peak_volume > 0.0,
            is_muted: endpoint.is_muted(),
            is_default: endpoint.is_default(),
            is_default_communications: endpoint.is_default_communications(),
            is_playback: endpoint.is_playback(),
            is_capture: endpoint.is_capture(),
        }
    }
}

/// Platform device activity states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is active and available for use
    Active,

    /// Device is disabled in the platform sound settings
    Disabled,

    /// Device is not present (driver issue)
    NotPresent,

    /// Device is unplugged (for pluggable devices)
    Unplugged,
}

/// Change notifications from the platform audio system.
///
/// Added and Updated carry the endpoint materialized at event time, so the
/// flags on it are the platform's current statement about the device.
#[derive(Clone)]
pub enum DeviceEvent {
    /// A device appeared or became active
    Added(std::sync::Arc<dyn AudioEndpoint>),

    /// An existing device changed (volume, properties, default roles)
    Updated(std::sync::Arc<dyn AudioEndpoint>),

    /// A device was removed or became inactive
    Removed(DeviceId),
}

impl DeviceEvent {
    /// The id of the device this event concerns.
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceEvent::Added(endpoint) | DeviceEvent::Updated(endpoint) => endpoint.id(),
            DeviceEvent::Removed(id) => id,
        }
    }

    /// Short event kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::Added(_) => "added",
            DeviceEvent::Updated(_) => "updated",
            DeviceEvent::Removed(_) => "removed",
        }
    }
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEvent")
            .field("kind", &self.kind())
            .field("device_id", &self.device_id())
            .finish()
    }
}

/// Audio service error types.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio control is not supported on this platform")]
    UnsupportedPlatform,

    #[error("Volume level needs to be between 0 and 100 (got {value})")]
    InvalidVolume { value: f64 },

    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Device change stream already claimed")]
    ChangeStreamClaimed,

    #[error("Volume control not available for device")]
    VolumeNotAvailable,

    #[error("Level meter not available for device")]
    MeterNotAvailable,

    #[error("String conversion error: {0}")]
    StringConversion(String),

    #[error("Audio operation failed: {0}")]
    OperationFailed(String),

    #[cfg(windows)]
    #[error("COM initialization failed: {0}")]
    ComInitFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Failed to enumerate devices: {0}")]
    EnumerationFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Failed to set default device: {0}")]
    SetDefaultFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsError(#[source] windows::core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_reference_selects_default() {
        assert_eq!(DeviceRef::parse(""), DeviceRef::Default);
        assert_eq!(DeviceRef::parse("   "), DeviceRef::Default);
    }

    #[test]
    fn reference_trims_surrounding_whitespace() {
        assert_eq!(
            DeviceRef::parse(" dev-1 "),
            DeviceRef::Id(DeviceId::new("dev-1"))
        );
    }

    #[test]
    fn device_ids_order_by_string_value() {
        let mut ids = vec![DeviceId::new("b"), DeviceId::new("a"), DeviceId::new("c")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
        assert_eq!(ids[2].as_str(), "c");
    }
}
