//! Audio Agent - Library
//!
//! Tracks the system's audio endpoints and exposes them to an automation
//! bus: volume and mute control, default playback and communications
//! device selection, and live peak level readings.
//!
//! ## Features
//!
//! - Mirror of the active playback and capture devices, kept current
//!   through platform change notifications
//! - Volume, mute and default-device commands addressed to a specific
//!   device or to the current default playback device
//! - Peak level metering per device for "is audio playing" detection
//! - Periodic default-volume publication with one-time sensor discovery
//! - Platform seam that keeps everything above the Windows backend
//!   portable and testable

pub mod audio;
pub mod bus;
pub mod config;
pub mod platform;
pub mod service;

pub use audio::{
    AudioDevice, AudioError, AudioHost, DeviceControl, DeviceId, DeviceRef, DeviceRegistry,
};
pub use bus::{BusPublisher, Component, DiscoveryOptions};
pub use config::AgentConfig;
pub use service::AgentService;
