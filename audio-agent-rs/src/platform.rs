//! Platform gate for the Windows-only backend.
//!
//! Every outer surface funnels through [`default_host`] so that on an
//! unsupported platform the agent fails with one well-known error instead
//! of a missing-symbol surprise. The check is stateless and callers may
//! repeat it as often as they like.

use std::sync::Arc;

use crate::audio::{AudioError, AudioHost};

/// Whether the audio backend can run on this build target.
pub fn is_supported() -> bool {
    cfg!(windows)
}

/// Errors out on platforms without an audio backend.
pub fn ensure_supported() -> Result<(), AudioError> {
    if is_supported() {
        Ok(())
    } else {
        Err(AudioError::UnsupportedPlatform)
    }
}

/// Builds the platform audio host, or fails on unsupported platforms.
pub fn default_host() -> Result<Arc<dyn AudioHost>, AudioError> {
    ensure_supported()?;
    #[cfg(windows)]
    {
        let host = crate::audio::WindowsHost::new()?;
        Ok(Arc::new(host))
    }
    #[cfg(not(windows))]
    {
        Err(AudioError::UnsupportedPlatform)
    }
}
