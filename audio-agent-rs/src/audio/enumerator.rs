//! Device enumeration and the Windows audio host.
//!
//! Wraps the MMDevice API: COM lifetime, endpoint enumeration across both
//! data flows, default endpoint lookup, and the host event thread that
//! feeds change notifications to the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use windows::core::{Interface, PCWSTR};
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eConsole, eRender, EDataFlow, ERole, IMMDevice,
    IMMDeviceEnumerator, IMMEndpoint, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_APARTMENTTHREADED, STGM,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

use super::device::{AudioError, DeviceEvent, DeviceId, DeviceState};
use super::endpoint::{state_from_raw, WindowsEndpoint};
use super::host::{AudioEndpoint, AudioHost};
use super::notifications::{ChangeNotificationClient, EndpointNotice};
use super::volume::VolumeController;

const NOTICE_POLL: Duration = Duration::from_millis(250);

/// COM initialization guard that uninitializes COM on drop.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Initialize COM for the current thread.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            CoInitializeEx(None, COINIT_APARTMENTTHREADED)
                .ok()
                .map_err(AudioError::ComInitFailed)?;
        }
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// Run the task with COM initialized on the current thread.
pub(crate) fn with_com<T, F>(task: F) -> Result<T, AudioError>
where
    F: FnOnce() -> Result<T, AudioError>,
{
    let _guard = ComGuard::new()?;
    task()
}

/// Open a device by its endpoint id.
///
/// COM must be initialized on this thread.
pub(crate) fn open_device(device_id: &str) -> Result<IMMDevice, AudioError> {
    unsafe {
        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(AudioError::EnumerationFailed)?;

        let device_id_wide: Vec<u16> = device_id
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        enumerator
            .GetDevice(PCWSTR::from_raw(device_id_wide.as_ptr()))
            .map_err(|_| AudioError::DeviceNotFound {
                device_id: device_id.to_string(),
            })
    }
}

/// Default endpoint ids per flow and role at one point in time.
#[derive(Default)]
struct DefaultIds {
    playback: Option<String>,
    playback_communications: Option<String>,
    capture: Option<String>,
    capture_communications: Option<String>,
}

impl DefaultIds {
    fn is_default(&self, id: &str, playback: bool) -> bool {
        let default = if playback { &self.playback } else { &self.capture };
        default.as_deref() == Some(id)
    }

    fn is_default_communications(&self, id: &str, playback: bool) -> bool {
        let default = if playback {
            &self.playback_communications
        } else {
            &self.capture_communications
        };
        default.as_deref() == Some(id)
    }
}

/// Device enumerator over the MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new DeviceEnumerator.
    ///
    /// Note: COM must be initialized before calling this function.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(AudioError::EnumerationFailed)?;

            Ok(Self { enumerator })
        }
    }

    /// All active playback and capture endpoints.
    pub fn endpoints(&self) -> Result<Vec<WindowsEndpoint>, AudioError> {
        let defaults = self.default_ids()?;
        let mut endpoints = Vec::new();

        for flow in [eRender, eCapture] {
            unsafe {
                let collection = self
                    .enumerator
                    .EnumAudioEndpoints(flow, DEVICE_STATE_ACTIVE)
                    .map_err(AudioError::EnumerationFailed)?;

                let count = collection
                    .GetCount()
                    .map_err(AudioError::EnumerationFailed)?;

                for i in 0..count {
                    let device = collection.Item(i).map_err(AudioError::EnumerationFailed)?;

                    // Skip endpoints that stop answering mid-enumeration.
                    if let Ok(endpoint) = self.materialize(&device, &defaults) {
                        endpoints.push(endpoint);
                    }
                }
            }
        }

        Ok(endpoints)
    }

    /// One endpoint by id.
    pub fn endpoint(&self, id: &DeviceId) -> Result<WindowsEndpoint, AudioError> {
        unsafe {
            let id_wide: Vec<u16> = id
                .as_str()
                .encode_utf16()
                .chain(std::iter::once(0))
                .collect();

            let device = self
                .enumerator
                .GetDevice(PCWSTR::from_raw(id_wide.as_ptr()))
                .map_err(|_| AudioError::DeviceNotFound {
                    device_id: id.to_string(),
                })?;

            let defaults = self.default_ids()?;
            self.materialize(&device, &defaults)
        }
    }

    fn default_ids(&self) -> Result<DefaultIds, AudioError> {
        Ok(DefaultIds {
            playback: self.default_endpoint_id(eRender, eConsole)?,
            playback_communications: self.default_endpoint_id(eRender, eCommunications)?,
            capture: self.default_endpoint_id(eCapture, eConsole)?,
            capture_communications: self.default_endpoint_id(eCapture, eCommunications)?,
        })
    }

    /// Default endpoint id for a flow and role, or None when the system has
    /// no default for it.
    fn default_endpoint_id(
        &self,
        flow: EDataFlow,
        role: ERole,
    ) -> Result<Option<String>, AudioError> {
        unsafe {
            let device = match self.enumerator.GetDefaultAudioEndpoint(flow, role) {
                Ok(device) => device,
                Err(_) => return Ok(None),
            };

            let id = device.GetId().map_err(AudioError::EnumerationFailed)?;
            let id = id
                .to_string()
                .map_err(|e| AudioError::StringConversion(e.to_string()))?;

            Ok(Some(id))
        }
    }

    /// Build the descriptor snapshot for one IMMDevice.
    fn materialize(
        &self,
        device: &IMMDevice,
        defaults: &DefaultIds,
    ) -> Result<WindowsEndpoint, AudioError> {
        unsafe {
            let id = device.GetId().map_err(AudioError::EnumerationFailed)?;
            let id = id
                .to_string()
                .map_err(|e| AudioError::StringConversion(e.to_string()))?;

            let flow = device
                .cast::<IMMEndpoint>()
                .and_then(|endpoint| endpoint.GetDataFlow())
                .map_err(AudioError::EnumerationFailed)?;
            let playback = flow == eRender;

            let state = device
                .GetState()
                .map(state_from_raw)
                .map_err(AudioError::EnumerationFailed)?;

            let props: IPropertyStore = device
                .OpenPropertyStore(STGM(0))
                .map_err(AudioError::EnumerationFailed)?;
            let name = friendly_name(&props).unwrap_or_else(|| "Unknown".to_string());

            let (volume, muted) = match VolumeController::new(device) {
                Ok(control) => (
                    control.volume_percent().unwrap_or(0.0),
                    control.muted().unwrap_or(false),
                ),
                Err(_) => (0.0, false),
            };

            let default = defaults.is_default(&id, playback);
            let default_communications = defaults.is_default_communications(&id, playback);

            Ok(WindowsEndpoint {
                id: DeviceId::new(id),
                name,
                state,
                playback,
                capture: !playback,
                default,
                default_communications,
                volume,
                muted,
            })
        }
    }
}

/// Get the friendly name of a device from its property store.
fn friendly_name(props: &IPropertyStore) -> Option<String> {
    unsafe {
        // Convert DEVPROPKEY to PROPERTYKEY
        let key = PROPERTYKEY {
            fmtid: DEVPKEY_Device_FriendlyName.fmtid,
            pid: DEVPKEY_Device_FriendlyName.pid,
        };

        let value = props.GetValue(&key).ok()?;
        let name = value.to_string();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// Audio host backed by the MMDevice API.
///
/// Lookup methods run with per-call COM, so they are safe from any thread.
/// A dedicated event thread owns the notification registration and
/// materializes changed endpoints before they reach the registry.
pub struct WindowsHost {
    events: Mutex<Option<UnboundedReceiver<DeviceEvent>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl WindowsHost {
    pub fn new() -> Result<Self, AudioError> {
        let (event_tx, event_rx) = unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let worker = spawn_event_thread(event_tx, Arc::clone(&running))?;

        Ok(Self {
            events: Mutex::new(Some(event_rx)),
            running,
            worker: Some(worker),
        })
    }
}

impl AudioHost for WindowsHost {
    fn devices(&self) -> Result<Vec<Arc<dyn AudioEndpoint>>, AudioError> {
        with_com(|| {
            let enumerator = DeviceEnumerator::new()?;
            Ok(enumerator
                .endpoints()?
                .into_iter()
                .map(|endpoint| Arc::new(endpoint) as Arc<dyn AudioEndpoint>)
                .collect())
        })
    }

    fn device(&self, id: &DeviceId) -> Option<Arc<dyn AudioEndpoint>> {
        with_com(|| DeviceEnumerator::new()?.endpoint(id))
            .ok()
            .map(|endpoint| Arc::new(endpoint) as Arc<dyn AudioEndpoint>)
    }

    fn subscribe_changes(&self) -> Result<UnboundedReceiver<DeviceEvent>, AudioError> {
        self.events
            .lock()
            .take()
            .ok_or(AudioError::ChangeStreamClaimed)
    }
}

impl Drop for WindowsHost {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Spawn the event thread and wait for its registration handshake.
fn spawn_event_thread(
    events: UnboundedSender<DeviceEvent>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, AudioError> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let worker = thread::Builder::new()
        .name("audio-events".into())
        .spawn(move || event_thread(events, running, ready_tx))
        .map_err(|e| AudioError::OperationFailed(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(worker),
        Ok(Err(e)) => {
            let _ = worker.join();
            Err(e)
        }
        Err(_) => {
            let _ = worker.join();
            Err(AudioError::OperationFailed(
                "event thread exited during startup".to_string(),
            ))
        }
    }
}

fn event_thread(
    events: UnboundedSender<DeviceEvent>,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), AudioError>>,
) {
    let _com = match ComGuard::new() {
        Ok(guard) => guard,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let enumerator = match DeviceEnumerator::new() {
        Ok(enumerator) => enumerator,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let (notice_tx, notice_rx) = mpsc::channel();
    let client = match ChangeNotificationClient::new(notice_tx).register(&enumerator.enumerator) {
        Ok(client) => client,
        Err(e) => {
            let _ = ready.send(Err(AudioError::WindowsError(e)));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        match notice_rx.recv_timeout(NOTICE_POLL) {
            Ok(notice) => {
                if let Some(event) = realize_notice(&enumerator, notice) {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    unsafe {
        let _ = enumerator
            .enumerator
            .UnregisterEndpointNotificationCallback(&client);
    }
}

/// Turn a raw notice into a registry event, looking the device up where the
/// event needs a fresh descriptor.
fn realize_notice(enumerator: &DeviceEnumerator, notice: EndpointNotice) -> Option<DeviceEvent> {
    match notice {
        EndpointNotice::Added(id) => added_event(enumerator, id),
        EndpointNotice::Removed(id) => Some(DeviceEvent::Removed(id)),
        // A device coming back to active re-enters like a new arrival so its
        // peak watch gets re-established.
        EndpointNotice::StateChanged(id, DeviceState::Active) => added_event(enumerator, id),
        EndpointNotice::StateChanged(id, _) => Some(DeviceEvent::Removed(id)),
        EndpointNotice::DefaultChanged(id) | EndpointNotice::PropertyChanged(id) => {
            match enumerator.endpoint(&id) {
                Ok(endpoint) => Some(DeviceEvent::Updated(Arc::new(endpoint))),
                Err(e) => {
                    debug!("Changed device {id} could not be read: {e}");
                    None
                }
            }
        }
    }
}

fn added_event(enumerator: &DeviceEnumerator, id: DeviceId) -> Option<DeviceEvent> {
    match enumerator.endpoint(&id) {
        Ok(endpoint) => Some(DeviceEvent::Added(Arc::new(endpoint))),
        Err(e) => {
            debug!("Added device {id} could not be read: {e}");
            None
        }
    }
}
