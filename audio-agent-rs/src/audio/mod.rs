//! Audio module for endpoint tracking and control.
//!
//! The portable half defines the device model, the platform seam traits,
//! the registry that mirrors the platform's device collection, and the
//! control facade. The Windows half implements the seam on top of the
//! Core Audio APIs.

pub mod control;
pub mod device;
pub mod host;
pub mod registry;

#[cfg(windows)]
pub mod endpoint;
#[cfg(windows)]
pub mod enumerator;
#[cfg(windows)]
pub mod meter;
#[cfg(windows)]
pub mod notifications;
#[cfg(windows)]
pub mod policy;
#[cfg(windows)]
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

pub use control::DeviceControl;
pub use device::{AudioDevice, AudioError, DeviceEvent, DeviceId, DeviceRef, DeviceState};
pub use host::{AudioEndpoint, AudioHost, PeakSink, PeakSubscription};
pub use registry::DeviceRegistry;

#[cfg(windows)]
pub use enumerator::WindowsHost;
