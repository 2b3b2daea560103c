//! Test doubles for the platform seam.
//!
//! A scriptable host and endpoint pair used by the registry, control, and
//! service tests. Endpoints record the calls they receive and let tests
//! flip the flags the platform would normally report.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::device::{AudioError, DeviceEvent, DeviceId, DeviceState};
use super::host::{AudioEndpoint, AudioHost, PeakSink, PeakSubscription};
use crate::bus::{BusPublisher, DiscoveryOptions};

pub(crate) struct MockEndpoint {
    id: DeviceId,
    name: String,
    state: Mutex<DeviceState>,
    playback: bool,
    capture: bool,
    default: AtomicBool,
    default_communications: AtomicBool,
    volume: Mutex<f64>,
    muted: AtomicBool,
    fail_ops: AtomicBool,
    pub(crate) set_volume_calls: Mutex<Vec<f64>>,
    pub(crate) set_mute_calls: Mutex<Vec<bool>>,
    pub(crate) set_default_calls: AtomicUsize,
    pub(crate) set_default_communications_calls: AtomicUsize,
    sinks: Mutex<Vec<(Arc<AtomicBool>, PeakSink)>>,
}

impl MockEndpoint {
    /// A playback endpoint named after its id, active, volume 50, unmuted.
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: DeviceId::new(id),
            name: format!("Device {id}"),
            state: Mutex::new(DeviceState::Active),
            playback: true,
            capture: false,
            default: AtomicBool::new(false),
            default_communications: AtomicBool::new(false),
            volume: Mutex::new(50.0),
            muted: AtomicBool::new(false),
            fail_ops: AtomicBool::new(false),
            set_volume_calls: Mutex::new(Vec::new()),
            set_mute_calls: Mutex::new(Vec::new()),
            set_default_calls: AtomicUsize::new(0),
            set_default_communications_calls: AtomicUsize::new(0),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// A capture endpoint (microphone-like) instead of a playback one.
    pub(crate) fn capture(id: &str) -> Self {
        let mut endpoint = Self::new(id);
        endpoint.playback = false;
        endpoint.capture = true;
        endpoint
    }

    pub(crate) fn as_default(self) -> Self {
        self.default.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn as_default_communications(self) -> Self {
        self.default_communications.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_volume(self, volume: f64) -> Self {
        *self.volume.lock() = volume;
        self
    }

    /// Every platform action on this endpoint fails.
    pub(crate) fn failing(self) -> Self {
        self.fail_ops.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn set_state(&self, state: DeviceState) {
        *self.state.lock() = state;
    }

    pub(crate) fn mark_default(&self, is_default: bool) {
        self.default.store(is_default, Ordering::SeqCst);
    }

    pub(crate) fn mark_default_communications(&self, is_default: bool) {
        self.default_communications.store(is_default, Ordering::SeqCst);
    }

    /// Deliver a peak value through every sink whose watch is still active,
    /// the way a platform meter callback would.
    pub(crate) fn push_peak(&self, value: f64) {
        let sinks = self.sinks.lock().clone();
        for (active, sink) in sinks {
            if active.load(Ordering::SeqCst) {
                sink(value);
            }
        }
    }

    /// Number of watches that have been created and not yet torn down.
    pub(crate) fn active_watches(&self) -> usize {
        self.sinks
            .lock()
            .iter()
            .filter(|(active, _)| active.load(Ordering::SeqCst))
            .count()
    }

    fn check_ops(&self) -> Result<(), AudioError> {
        if self.fail_ops.load(Ordering::SeqCst) {
            Err(AudioError::OperationFailed("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AudioEndpoint for MockEndpoint {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    fn is_playback(&self) -> bool {
        self.playback
    }

    fn is_capture(&self) -> bool {
        self.capture
    }

    fn is_default(&self) -> bool {
        self.default.load(Ordering::SeqCst)
    }

    fn is_default_communications(&self) -> bool {
        self.default_communications.load(Ordering::SeqCst)
    }

    fn volume(&self) -> f64 {
        *self.volume.lock()
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn set_default(&self) -> Result<(), AudioError> {
        self.check_ops()?;
        self.set_default_calls.fetch_add(1, Ordering::SeqCst);
        self.default.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_default_communications(&self) -> Result<(), AudioError> {
        self.check_ops()?;
        self.set_default_communications_calls
            .fetch_add(1, Ordering::SeqCst);
        self.default_communications.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn set_mute(&self, muted: bool) -> Result<bool, AudioError> {
        self.check_ops()?;
        self.set_mute_calls.lock().push(muted);
        self.muted.store(muted, Ordering::SeqCst);
        Ok(muted)
    }

    async fn toggle_mute(&self) -> Result<bool, AudioError> {
        self.check_ops()?;
        let muted = !self.muted.load(Ordering::SeqCst);
        self.set_mute_calls.lock().push(muted);
        self.muted.store(muted, Ordering::SeqCst);
        Ok(muted)
    }

    async fn set_volume(&self, volume: f64) -> Result<(), AudioError> {
        self.check_ops()?;
        self.set_volume_calls.lock().push(volume);
        *self.volume.lock() = volume;
        Ok(())
    }

    fn watch_peak(&self, active: Arc<AtomicBool>, sink: PeakSink) -> PeakSubscription {
        self.sinks.lock().push((Arc::clone(&active), sink));
        PeakSubscription::new(active, None)
    }
}

pub(crate) struct MockHost {
    endpoints: Mutex<Vec<Arc<MockEndpoint>>>,
    fail_enumeration: AtomicBool,
    events: UnboundedSender<DeviceEvent>,
    receiver: Mutex<Option<UnboundedReceiver<DeviceEvent>>>,
}

impl MockHost {
    pub(crate) fn new() -> Self {
        let (events, receiver) = unbounded_channel();
        Self {
            endpoints: Mutex::new(Vec::new()),
            fail_enumeration: AtomicBool::new(false),
            events,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Make the endpoint part of the live device collection.
    pub(crate) fn add(&self, endpoint: &Arc<MockEndpoint>) {
        self.endpoints.lock().push(Arc::clone(endpoint));
    }

    /// Drop the endpoint from the live device collection.
    pub(crate) fn remove(&self, id: &DeviceId) {
        self.endpoints.lock().retain(|endpoint| endpoint.id != *id);
    }

    /// Push a change notification down the event stream.
    pub(crate) fn emit(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }
}

impl AudioHost for MockHost {
    fn devices(&self) -> Result<Vec<Arc<dyn AudioEndpoint>>, AudioError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(AudioError::OperationFailed(
                "injected enumeration failure".to_string(),
            ));
        }
        Ok(self
            .endpoints
            .lock()
            .iter()
            .map(|endpoint| Arc::clone(endpoint) as Arc<dyn AudioEndpoint>)
            .collect())
    }

    fn device(&self, id: &DeviceId) -> Option<Arc<dyn AudioEndpoint>> {
        self.endpoints
            .lock()
            .iter()
            .find(|endpoint| endpoint.id == *id)
            .map(|endpoint| Arc::clone(endpoint) as Arc<dyn AudioEndpoint>)
    }

    fn subscribe_changes(&self) -> Result<UnboundedReceiver<DeviceEvent>, AudioError> {
        self.receiver
            .lock()
            .take()
            .ok_or(AudioError::ChangeStreamClaimed)
    }
}

/// Bus publisher that records everything it is asked to publish.
#[derive(Default)]
pub(crate) struct RecordingBus {
    pub(crate) messages: Mutex<Vec<(String, String)>>,
    pub(crate) discoveries: Mutex<Vec<(String, DiscoveryOptions)>>,
}

impl RecordingBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn published(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }
}

impl BusPublisher for RecordingBus {
    fn publish(&self, topic: &str, payload: &str) {
        self.messages
            .lock()
            .push((topic.to_string(), payload.to_string()));
    }

    fn publish_discovery(&self, topic: &str, options: &DiscoveryOptions) {
        self.discoveries
            .lock()
            .push((topic.to_string(), options.clone()));
    }
}
