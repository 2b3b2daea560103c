//! Device registry.
//!
//! Tracks the active device set, the default playback and communications
//! devices, and one peak watch per tracked device. The registry mutates
//! only through the platform change stream (plus the one-time initial
//! enumeration, which feeds every device through the same add path), so
//! events apply strictly in delivery order under a single exclusive lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::device::{AudioDevice, AudioError, DeviceEvent, DeviceId, DeviceRef, DeviceState};
use super::host::{AudioEndpoint, AudioHost, PeakSink, PeakSubscription};

pub struct DeviceRegistry {
    host: Arc<dyn AudioHost>,
    initialized: AtomicBool,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    /// Tracked devices keyed by id, snapshot rebuilt on every event.
    devices: BTreeMap<DeviceId, AudioDevice>,
    /// Last peak meter value per tracked device.
    peak_values: HashMap<DeviceId, f64>,
    /// Exactly one live peak watch per tracked device.
    peak_subs: HashMap<DeviceId, PeakSubscription>,
    /// Id of the default playback device, as last reported by an event.
    /// Left untouched on removal; a stale id resolves to nothing.
    default_playback: Option<DeviceId>,
    /// Id of the default communications playback device.
    default_comms: Option<DeviceId>,
}

impl DeviceRegistry {
    pub fn new(host: Arc<dyn AudioHost>) -> Self {
        Self {
            host,
            initialized: AtomicBool::new(false),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Enumerate the current devices, then start consuming the change
    /// stream. Idempotent after the first success; a failed attempt
    /// latches nothing and can be retried.
    pub fn initialize(self: &Arc<Self>) -> Result<(), AudioError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let endpoints = self.host.devices()?;
        for endpoint in endpoints {
            trace!(
                "Audio device - id: {}, name: {}, volume: {}, default: {}, default comms: {}, capture: {}, playback: {}",
                endpoint.id(),
                endpoint.name(),
                endpoint.volume(),
                endpoint.is_default(),
                endpoint.is_default_communications(),
                endpoint.is_capture(),
                endpoint.is_playback(),
            );
            self.apply_event(DeviceEvent::Added(endpoint));
        }

        {
            let state = self.state.lock();
            if state.default_comms.is_none() {
                info!("No communications playback device found");
            }
            if state.default_playback.is_none() {
                info!("No default playback device found");
            }
        }

        let events = self.host.subscribe_changes()?;
        self.spawn_event_pump(events);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Apply one change notification. This is the only write path.
    pub(crate) fn apply_event(self: &Arc<Self>, event: DeviceEvent) {
        trace!("Audio device {} - change: {}", event.device_id(), event.kind());
        let retired = {
            let mut state = self.state.lock();
            match event {
                DeviceEvent::Removed(id) => Self::remove_locked(&mut state, &id),
                DeviceEvent::Added(endpoint) => self.upsert_locked(&mut state, endpoint, true),
                DeviceEvent::Updated(endpoint) => self.upsert_locked(&mut state, endpoint, false),
            }
        };
        // Joining a peak worker must happen with the lock released; a
        // worker can be blocked in the sink waiting for that same lock.
        drop(retired);
    }

    /// List the devices that are both currently reported by the platform
    /// and tracked by the registry. A failed platform query yields an
    /// empty list, never an error.
    pub fn list_devices(&self) -> Vec<AudioDevice> {
        let state = self.state.lock();
        let live = match self.host.devices() {
            Ok(endpoints) => endpoints,
            Err(err) => {
                debug!("Device enumeration failed, returning empty list: {err}");
                return Vec::new();
            }
        };

        live.into_iter()
            .filter(|endpoint| state.devices.contains_key(endpoint.id()))
            .map(|endpoint| Self::snapshot_locked(&state, endpoint.as_ref()))
            .collect()
    }

    /// Snapshot one device. The default sentinel resolves through the
    /// recorded default playback id.
    pub fn device_info(&self, reference: &DeviceRef) -> Option<AudioDevice> {
        let state = self.state.lock();
        let endpoint = self.resolve_locked(&state, reference, true)?;
        Some(Self::snapshot_locked(&state, endpoint.as_ref()))
    }

    /// Last observed peak value for a device, 0.0 when the device or its
    /// peak is unknown.
    pub fn peak_value(&self, reference: &DeviceRef) -> f64 {
        let state = self.state.lock();
        match self.resolve_locked(&state, reference, true) {
            Some(endpoint) => state
                .peak_values
                .get(endpoint.id())
                .copied()
                .unwrap_or(0.0),
            None => 0.0,
        }
    }

    /// Resolve a reference to a live endpoint. With `use_default`, the
    /// sentinel falls back to the recorded default playback device;
    /// without it the sentinel resolves to nothing. Either way the id
    /// must still be tracked before the live lookup: per-id platform
    /// lookups return endpoints in any state, and tracking is what keeps
    /// resolution on active devices.
    pub fn resolve(
        &self,
        reference: &DeviceRef,
        use_default: bool,
    ) -> Option<Arc<dyn AudioEndpoint>> {
        let state = self.state.lock();
        self.resolve_locked(&state, reference, use_default)
    }

    fn resolve_locked(
        &self,
        state: &RegistryState,
        reference: &DeviceRef,
        use_default: bool,
    ) -> Option<Arc<dyn AudioEndpoint>> {
        let id = match reference {
            DeviceRef::Default => {
                if !use_default {
                    return None;
                }
                state.default_playback.as_ref()?
            }
            DeviceRef::Id(id) => id,
        };
        if !state.devices.contains_key(id) {
            return None;
        }
        self.host.device(id)
    }

    fn snapshot_locked(state: &RegistryState, endpoint: &dyn AudioEndpoint) -> AudioDevice {
        let peak = state
            .peak_values
            .get(endpoint.id())
            .copied()
            .unwrap_or(0.0);
        AudioDevice::from_endpoint(endpoint, peak)
    }

    /// Add or refresh a tracked device. Non-active endpoints take the
    /// removal path whatever the event said. Returns a peak subscription
    /// to retire outside the lock, if any.
    fn upsert_locked(
        self: &Arc<Self>,
        state: &mut RegistryState,
        endpoint: Arc<dyn AudioEndpoint>,
        subscribe: bool,
    ) -> Option<PeakSubscription> {
        if endpoint.state() != DeviceState::Active {
            return Self::remove_locked(state, endpoint.id());
        }

        let id = endpoint.id().clone();

        if endpoint.is_playback() {
            if endpoint.is_default_communications() {
                state.default_comms = Some(id.clone());
            }
            if endpoint.is_default() {
                state.default_playback = Some(id.clone());
            }
        }

        let retired = if subscribe {
            let old = state.peak_subs.remove(&id);
            if let Some(old) = &old {
                old.deactivate();
            }
            let sub = self.watch_peak(&endpoint);
            state.peak_subs.insert(id.clone(), sub);
            old
        } else {
            None
        };

        let snapshot = Self::snapshot_locked(state, endpoint.as_ref());
        state.devices.insert(id, snapshot);
        retired
    }

    /// Drop a device from every map and deactivate its peak watch. The
    /// default pointers are intentionally left alone; they converge on the
    /// next event that reports a default device.
    fn remove_locked(state: &mut RegistryState, id: &DeviceId) -> Option<PeakSubscription> {
        let sub = state.peak_subs.remove(id);
        if let Some(sub) = &sub {
            sub.deactivate();
        }
        state.devices.remove(id);
        state.peak_values.remove(id);
        sub
    }

    fn watch_peak(self: &Arc<Self>, endpoint: &Arc<dyn AudioEndpoint>) -> PeakSubscription {
        let active = Arc::new(AtomicBool::new(true));
        let registry = Arc::downgrade(self);
        let id = endpoint.id().clone();
        let flag = Arc::clone(&active);
        let sink: PeakSink = Arc::new(move |value| {
            if let Some(registry) = registry.upgrade() {
                registry.store_peak(&id, &flag, value);
            }
        });
        endpoint.watch_peak(active, sink)
    }

    /// Record a peak value delivered by a watch. The active check happens
    /// under the lock so a watch deactivated during removal can never
    /// write again, even if its worker was already blocked here.
    fn store_peak(&self, id: &DeviceId, active: &AtomicBool, value: f64) {
        let mut state = self.state.lock();
        if !active.load(Ordering::SeqCst) {
            return;
        }
        state.peak_values.insert(id.clone(), value);
    }

    fn spawn_event_pump(self: &Arc<Self>, mut events: tokio::sync::mpsc::UnboundedReceiver<DeviceEvent>) {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.apply_event(event);
            }
            debug!("Device change stream closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{MockEndpoint, MockHost};

    fn harness() -> (Arc<MockHost>, Arc<DeviceRegistry>) {
        let host = Arc::new(MockHost::new());
        let registry = Arc::new(DeviceRegistry::new(Arc::clone(&host) as Arc<dyn AudioHost>));
        (host, registry)
    }

    #[test]
    fn add_event_tracks_device_and_watches_peaks() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));

        let devices = registry.list_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, DeviceId::new("d1"));
        assert!(devices[0].is_default);
        assert_eq!(d1.active_watches(), 1);
    }

    #[test]
    fn removal_purges_maps_and_tears_down_watch() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1"));
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        d1.push_peak(0.4);
        assert!(registry.peak_value(&DeviceRef::Id(DeviceId::new("d1"))) > 0.0);

        registry.apply_event(DeviceEvent::Removed(DeviceId::new("d1")));

        assert!(registry.list_devices().is_empty());
        assert_eq!(registry.peak_value(&DeviceRef::Id(DeviceId::new("d1"))), 0.0);
        assert_eq!(d1.active_watches(), 0);

        // a late delivery from the platform must not resurrect state
        d1.push_peak(0.9);
        assert_eq!(registry.peak_value(&DeviceRef::Id(DeviceId::new("d1"))), 0.0);
    }

    #[test]
    fn inactive_update_takes_the_removal_path() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1"));
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        d1.set_state(DeviceState::Unplugged);
        registry.apply_event(DeviceEvent::Updated(d1.clone()));

        assert!(registry.list_devices().is_empty());
        assert_eq!(d1.active_watches(), 0);
    }

    #[test]
    fn readd_replaces_watch_without_duplicate_deliveries() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1"));
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        registry.apply_event(DeviceEvent::Added(d1.clone()));

        // the first watch was deactivated when the second arrived
        assert_eq!(d1.active_watches(), 1);

        d1.push_peak(0.5);
        assert_eq!(registry.peak_value(&DeviceRef::Id(DeviceId::new("d1"))), 0.5);
    }

    #[test]
    fn update_refreshes_defaults_from_event_flags() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        let d2 = Arc::new(MockEndpoint::new("d2"));
        host.add(&d1);
        host.add(&d2);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        registry.apply_event(DeviceEvent::Added(d2.clone()));
        assert_eq!(
            registry.device_info(&DeviceRef::Default).map(|d| d.id),
            Some(DeviceId::new("d1"))
        );

        d1.mark_default(false);
        d2.mark_default(true);
        registry.apply_event(DeviceEvent::Updated(d2.clone()));

        assert_eq!(
            registry.device_info(&DeviceRef::Default).map(|d| d.id),
            Some(DeviceId::new("d2"))
        );
    }

    #[test]
    fn communications_default_follows_event_flags() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default().as_default_communications());
        let d2 = Arc::new(MockEndpoint::new("d2"));
        host.add(&d1);
        host.add(&d2);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        registry.apply_event(DeviceEvent::Added(d2.clone()));

        let devices = registry.list_devices();
        assert!(devices.iter().any(|d| d.id == DeviceId::new("d1") && d.is_default_communications));

        d1.mark_default_communications(false);
        d2.mark_default_communications(true);
        registry.apply_event(DeviceEvent::Updated(d1.clone()));
        registry.apply_event(DeviceEvent::Updated(d2.clone()));

        let devices = registry.list_devices();
        assert!(devices.iter().any(|d| d.id == DeviceId::new("d2") && d.is_default_communications));
        assert!(!devices.iter().any(|d| d.id == DeviceId::new("d1") && d.is_default_communications));
    }

    #[test]
    fn capture_device_flags_never_touch_defaults() {
        let (host, registry) = harness();
        let mic = Arc::new(MockEndpoint::capture("mic").as_default());
        host.add(&mic);

        registry.apply_event(DeviceEvent::Added(mic.clone()));

        assert!(registry.device_info(&DeviceRef::Default).is_none());
        // still tracked and peak-watched like any other device
        assert_eq!(registry.list_devices().len(), 1);
        assert_eq!(mic.active_watches(), 1);
    }

    #[test]
    fn stale_default_resolves_to_nothing_after_removal() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        host.remove(&DeviceId::new("d1"));
        registry.apply_event(DeviceEvent::Removed(DeviceId::new("d1")));

        // the pointer is stale on purpose; resolution just fails
        assert!(registry.device_info(&DeviceRef::Default).is_none());
        assert_eq!(registry.peak_value(&DeviceRef::Default), 0.0);
        assert!(registry.resolve(&DeviceRef::Default, true).is_none());
    }

    #[test]
    fn default_sentinel_ignores_device_gone_inactive() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        assert!(registry.device_info(&DeviceRef::Default).is_some());

        // the platform still hands the endpoint out by id after it goes
        // inactive; only the tracked set says it is gone
        d1.set_state(DeviceState::Unplugged);
        registry.apply_event(DeviceEvent::Updated(d1.clone()));

        assert!(registry.list_devices().is_empty());
        assert!(registry.device_info(&DeviceRef::Default).is_none());
        assert!(registry.resolve(&DeviceRef::Default, true).is_none());
        assert_eq!(registry.peak_value(&DeviceRef::Default), 0.0);

        // coming back active re-enters through the add path and the
        // sentinel resolves again
        d1.set_state(DeviceState::Active);
        registry.apply_event(DeviceEvent::Added(d1.clone()));
        assert_eq!(
            registry.device_info(&DeviceRef::Default).map(|d| d.id),
            Some(DeviceId::new("d1"))
        );
    }

    #[test]
    fn default_pointer_converges_on_next_default_event() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        let d2 = Arc::new(MockEndpoint::new("d2"));
        host.add(&d1);
        host.add(&d2);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        registry.apply_event(DeviceEvent::Added(d2.clone()));

        host.remove(&DeviceId::new("d1"));
        registry.apply_event(DeviceEvent::Removed(DeviceId::new("d1")));
        assert!(registry.device_info(&DeviceRef::Default).is_none());

        d2.mark_default(true);
        registry.apply_event(DeviceEvent::Updated(d2.clone()));
        assert_eq!(
            registry.device_info(&DeviceRef::Default).map(|d| d.id),
            Some(DeviceId::new("d2"))
        );
    }

    #[test]
    fn list_excludes_untracked_devices() {
        let (host, registry) = harness();
        let tracked = Arc::new(MockEndpoint::new("tracked"));
        let untracked = Arc::new(MockEndpoint::new("untracked"));
        host.add(&tracked);
        host.add(&untracked);

        registry.apply_event(DeviceEvent::Added(tracked.clone()));

        let devices = registry.list_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, DeviceId::new("tracked"));
    }

    #[test]
    fn list_excludes_tracked_devices_the_platform_no_longer_reports() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1"));
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        // vanished between the event and the read, no removal event yet
        host.remove(&DeviceId::new("d1"));

        assert!(registry.list_devices().is_empty());
    }

    #[test]
    fn list_is_empty_when_enumeration_fails() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1"));
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        host.set_fail_enumeration(true);

        assert!(registry.list_devices().is_empty());
    }

    #[test]
    fn unknown_peak_reads_as_zero() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1"));
        host.add(&d1);

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        assert_eq!(registry.peak_value(&DeviceRef::Id(DeviceId::new("d1"))), 0.0);
        assert_eq!(
            registry.peak_value(&DeviceRef::Id(DeviceId::new("missing"))),
            0.0
        );
    }

    #[test]
    fn explicit_id_requires_tracking_before_live_lookup() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1"));
        host.add(&d1);

        // live but never seen through an event: not resolvable
        assert!(registry
            .resolve(&DeviceRef::Id(DeviceId::new("d1")), true)
            .is_none());

        registry.apply_event(DeviceEvent::Added(d1.clone()));
        assert!(registry
            .resolve(&DeviceRef::Id(DeviceId::new("d1")), true)
            .is_some());
    }

    #[tokio::test]
    async fn initialize_enumerates_once_and_is_idempotent() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        let d2 = Arc::new(MockEndpoint::capture("d2"));
        host.add(&d1);
        host.add(&d2);

        registry.initialize().unwrap();
        assert_eq!(registry.list_devices().len(), 2);
        assert_eq!(d1.active_watches(), 1);

        // second call must not re-enumerate or re-subscribe
        registry.initialize().unwrap();
        assert_eq!(d1.active_watches(), 1);
    }

    #[tokio::test]
    async fn failed_initialize_can_be_retried() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        host.add(&d1);

        host.set_fail_enumeration(true);
        assert!(registry.initialize().is_err());

        host.set_fail_enumeration(false);
        registry.initialize().unwrap();
        assert_eq!(registry.list_devices().len(), 1);

        // the retry started the event pump, not just the enumeration
        let d2 = Arc::new(MockEndpoint::new("d2"));
        host.add(&d2);
        host.emit(DeviceEvent::Added(d2.clone()));
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            if registry.list_devices().len() == 2 {
                break;
            }
        }
        assert_eq!(registry.list_devices().len(), 2);
    }

    #[tokio::test]
    async fn event_pump_applies_changes_in_order() {
        let (host, registry) = harness();
        let d1 = Arc::new(MockEndpoint::new("d1").as_default());
        host.add(&d1);

        registry.initialize().unwrap();

        let d2 = Arc::new(MockEndpoint::new("d2"));
        host.add(&d2);
        host.emit(DeviceEvent::Added(d2.clone()));
        host.emit(DeviceEvent::Removed(DeviceId::new("d2")));
        host.emit(DeviceEvent::Added(d2.clone()));

        // wait for the pump to drain
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            if registry.list_devices().len() == 2 {
                break;
            }
        }
        assert_eq!(registry.list_devices().len(), 2);
    }
}
