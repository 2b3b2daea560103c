//! Platform seam for device access.
//!
//! The registry and control layers talk to the platform audio system only
//! through these traits, so the core logic runs against mocks in tests and
//! against the Core Audio implementation on Windows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use super::device::{AudioError, DeviceEvent, DeviceId, DeviceState};

/// Callback receiving peak meter values for one device.
pub type PeakSink = Arc<dyn Fn(f64) + Send + Sync>;

/// A single audio endpoint as the platform currently reports it.
///
/// Identity and flags are captured when the endpoint is materialized, so
/// reading them never touches the platform again; re-query the host for
/// fresh values. Actions go back to the platform and may fail there.
#[async_trait]
pub trait AudioEndpoint: Send + Sync {
    fn id(&self) -> &DeviceId;
    fn name(&self) -> &str;
    fn state(&self) -> DeviceState;
    fn is_playback(&self) -> bool;
    fn is_capture(&self) -> bool;
    fn is_default(&self) -> bool;
    fn is_default_communications(&self) -> bool;

    /// Master volume as a percentage (0.0 to 100.0).
    fn volume(&self) -> f64;
    fn is_muted(&self) -> bool;

    /// Make this device the default for the console role.
    fn set_default(&self) -> Result<(), AudioError>;

    /// Make this device the default for the communications role.
    fn set_default_communications(&self) -> Result<(), AudioError>;

    /// Set the mute state. Returns the resulting state as the platform
    /// reports it.
    async fn set_mute(&self, muted: bool) -> Result<bool, AudioError>;

    /// Flip the mute state. Returns the resulting state.
    async fn toggle_mute(&self) -> Result<bool, AudioError>;

    /// Set the master volume as a percentage (0.0 to 100.0).
    async fn set_volume(&self, volume: f64) -> Result<(), AudioError>;

    /// Start delivering peak meter values for this device through `sink`.
    ///
    /// Implementations must never invoke the sink from inside this call
    /// (the caller typically holds a lock the sink will re-acquire), and
    /// must stop delivering once `active` is cleared.
    fn watch_peak(&self, active: Arc<AtomicBool>, sink: PeakSink) -> PeakSubscription;
}

/// Access to the platform's device collection and its change stream.
pub trait AudioHost: Send + Sync {
    /// Enumerate the active devices as the platform reports them right now.
    fn devices(&self) -> Result<Vec<Arc<dyn AudioEndpoint>>, AudioError>;

    /// Materialize a single device by id, if the platform still has it.
    fn device(&self, id: &DeviceId) -> Option<Arc<dyn AudioEndpoint>>;

    /// Claim the device change stream. Events arrive in the order the
    /// platform delivered them. There is exactly one stream per host; a
    /// second claim fails with `ChangeStreamClaimed`.
    fn subscribe_changes(&self) -> Result<UnboundedReceiver<DeviceEvent>, AudioError>;
}

/// Owned handle to a running peak watch.
///
/// Replaces ad-hoc disposal handles with a single-teardown resource: once
/// cancelled (explicitly or on drop), the sink never runs again and the
/// worker, if any, winds down.
pub struct PeakSubscription {
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PeakSubscription {
    pub fn new(active: Arc<AtomicBool>, worker: Option<JoinHandle<()>>) -> Self {
        Self { active, worker }
    }

    /// Stop deliveries without waiting for the worker.
    ///
    /// Sinks check this flag under the registry lock, so clearing it while
    /// that lock is held guarantees no delivery lands afterwards even if a
    /// worker is already blocked on the lock.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Tear down: stop deliveries and wait for the worker to exit.
    /// Safe to call more than once. Do not call while holding a lock the
    /// sink acquires; use `deactivate` there and drop the handle later.
    pub fn cancel(&mut self) {
        self.deactivate();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PeakSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
