//! FFI bindings for the audio agent.
//!
//! This crate provides C ABI functions for embedding the agent in a host
//! process (e.g. via P/Invoke). All functions use panic::catch_unwind to
//! prevent Rust panics from unwinding across the FFI boundary, and report
//! failures through a thread-local last-error slot.

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic;
use std::ptr;
use std::sync::Arc;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::debug;

use audio_agent_rs::{
    platform, AgentConfig, AgentService, AudioDevice, AudioError, BusPublisher, DeviceControl,
    DeviceRef, DeviceRegistry, DiscoveryOptions,
};

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes returned by FFI functions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = -1,
    InvalidArgument = -2,
    DeviceNotFound = -3,
    ComError = -4,
    JsonError = -5,
    VolumeNotAvailable = -6,
    UnsupportedPlatform = -7,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::UnsupportedPlatform => ErrorCode::UnsupportedPlatform,
            AudioError::InvalidVolume { .. } => ErrorCode::InvalidArgument,
            AudioError::DeviceNotFound { .. } => ErrorCode::DeviceNotFound,
            AudioError::VolumeNotAvailable => ErrorCode::VolumeNotAvailable,
            AudioError::StringConversion(_) => ErrorCode::JsonError,
            _ => ErrorCode::ComError,
        }
    }
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: RefCell<Option<(ErrorCode, String)>> = const { RefCell::new(None) };
}

fn set_last_error(code: ErrorCode, message: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some((code, message.into()));
    });
}

fn set_audio_error(err: &AudioError) -> ErrorCode {
    let code = ErrorCode::from(err);
    set_last_error(code, err.to_string());
    code
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

// ============================================================================
// Data Types for JSON Serialization
// ============================================================================

/// Configuration for engine creation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between periodic volume reports. Zero or absent uses the
    /// built-in default.
    #[serde(default)]
    pub telemetry_interval_secs: Option<u64>,
}

impl EngineConfig {
    fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::default();
        if let Some(secs) = self.telemetry_interval_secs {
            config.telemetry_interval_secs = secs;
        }
        config
    }
}

/// One audio device with its current state.
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioDeviceDto {
    pub id: String,
    pub name: String,
    pub volume: f64,
    pub peak_volume: f64,
    pub is_audio_playing: bool,
    pub is_muted: bool,
    pub is_default: bool,
    pub is_default_communications: bool,
    pub is_playback: bool,
    pub is_capture: bool,
}

impl From<AudioDevice> for AudioDeviceDto {
    fn from(device: AudioDevice) -> Self {
        Self {
            id: device.id.to_string(),
            name: device.name,
            volume: device.volume,
            peak_volume: device.peak_volume,
            is_audio_playing: device.is_audio_playing,
            is_muted: device.is_muted,
            is_default: device.is_default,
            is_default_communications: device.is_default_communications,
            is_playback: device.is_playback,
            is_capture: device.is_capture,
        }
    }
}

/// Response containing the tracked device list.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceListResponse {
    pub devices: Vec<AudioDeviceDto>,
}

/// Response containing a single device.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub device: AudioDeviceDto,
}

/// Response containing an operation result.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
}

/// Response listing the command topics the host should subscribe to.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionsResponse {
    pub topics: Vec<String>,
}

// ============================================================================
// Bus Callback
// ============================================================================

/// Message kind passed to the publish callback.
pub const PUBLISH_KIND_MESSAGE: i32 = 0;
/// Discovery kind: the payload is the discovery options as JSON.
pub const PUBLISH_KIND_DISCOVERY: i32 = 1;

/// Callback invoked whenever the agent publishes to the bus.
///
/// `topic` and `payload` are valid UTF-8, only for the duration of the call.
pub type PublishCallback =
    extern "C" fn(kind: i32, topic: *const c_char, payload: *const c_char, user_data: *mut c_void);

/// Bus publisher that forwards to a host-process callback.
struct CallbackBus {
    callback: PublishCallback,
    user_data: *mut c_void,
}

// The callback contract requires the host-provided function and context to
// be callable from any thread.
unsafe impl Send for CallbackBus {}
unsafe impl Sync for CallbackBus {}

impl CallbackBus {
    fn emit(&self, kind: i32, topic: &str, payload: &str) {
        let (Ok(topic), Ok(payload)) = (CString::new(topic), CString::new(payload)) else {
            return;
        };
        (self.callback)(kind, topic.as_ptr(), payload.as_ptr(), self.user_data);
    }
}

impl BusPublisher for CallbackBus {
    fn publish(&self, topic: &str, payload: &str) {
        self.emit(PUBLISH_KIND_MESSAGE, topic, payload);
    }

    fn publish_discovery(&self, topic: &str, options: &DiscoveryOptions) {
        match serde_json::to_string(options) {
            Ok(json) => self.emit(PUBLISH_KIND_DISCOVERY, topic, &json),
            Err(e) => debug!("Discovery options failed to serialize: {e}"),
        }
    }
}

/// Bus publisher that drops everything, for hosts that only poll.
struct NullBus;

impl BusPublisher for NullBus {
    fn publish(&self, _topic: &str, _payload: &str) {}
    fn publish_discovery(&self, _topic: &str, _options: &DiscoveryOptions) {}
}

// ============================================================================
// Engine Handle Type
// ============================================================================

/// Opaque handle to the audio engine.
pub type AudioAgentHandle = *mut c_void;

/// Internal engine state: the runtime, the device registry stack, and the
/// bus-facing service.
struct AudioEngine {
    runtime: Runtime,
    control: Arc<DeviceControl>,
    service: Arc<AgentService>,
    telemetry: Mutex<Option<JoinHandle<()>>>,
}

impl AudioEngine {
    fn new(config: &EngineConfig, bus: Arc<dyn BusPublisher>) -> Result<Self, AudioError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("audio-agent")
            .enable_all()
            .build()
            .map_err(|e| AudioError::OperationFailed(e.to_string()))?;

        let host = platform::default_host()?;
        let registry = Arc::new(DeviceRegistry::new(host));
        {
            // The registry spawns its event pump, so it needs the runtime.
            let _guard = runtime.enter();
            registry.initialize()?;
        }

        let control = Arc::new(DeviceControl::new(registry));
        let service = Arc::new(AgentService::new(
            Arc::clone(&control),
            bus,
            config.agent_config(),
        ));

        Ok(Self {
            runtime,
            control,
            service,
            telemetry: Mutex::new(None),
        })
    }

    fn start_telemetry(&self) {
        if let Ok(mut slot) = self.telemetry.lock() {
            if slot.is_none() {
                let _guard = self.runtime.enter();
                *slot = Some(self.service.spawn_telemetry());
            }
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.telemetry.lock() {
            if let Some(worker) = slot.take() {
                worker.abort();
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Allocate a C string from a Rust string. Caller must free with
/// audio_agent_free_string.
fn alloc_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            // String contained a null byte, replace with empty
            CString::new("").unwrap().into_raw()
        }
    }
}

/// Parse a C string to a Rust string slice.
unsafe fn parse_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

unsafe fn engine_ref<'a>(handle: AudioAgentHandle) -> Option<&'a AudioEngine> {
    (handle as *const AudioEngine).as_ref()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

// ============================================================================
// FFI Functions - Lifecycle
// ============================================================================

/// Create a new audio engine instance.
///
/// # Arguments
/// * `config_json` - JSON configuration string (can be null for defaults)
/// * `callback` - invoked for every bus publication (can be null to drop them)
/// * `user_data` - passed through to the callback untouched
///
/// # Returns
/// Handle to the engine, or null on failure. Check
/// audio_agent_last_error_code() on failure.
///
/// # Safety
/// The returned handle must be freed with audio_agent_destroy().
#[no_mangle]
pub extern "C" fn audio_agent_create(
    config_json: *const c_char,
    callback: Option<PublishCallback>,
    user_data: *mut c_void,
) -> AudioAgentHandle {
    clear_last_error();
    init_tracing();

    let result = panic::catch_unwind(|| {
        let config = if config_json.is_null() {
            EngineConfig::default()
        } else {
            let Some(json) = (unsafe { parse_c_str(config_json) }) else {
                set_last_error(ErrorCode::InvalidArgument, "Invalid config string");
                return ptr::null_mut();
            };
            match serde_json::from_str(json) {
                Ok(config) => config,
                Err(e) => {
                    set_last_error(ErrorCode::JsonError, e.to_string());
                    return ptr::null_mut();
                }
            }
        };

        let bus: Arc<dyn BusPublisher> = match callback {
            Some(callback) => Arc::new(CallbackBus {
                callback,
                user_data,
            }),
            None => Arc::new(NullBus),
        };

        match AudioEngine::new(&config, bus) {
            Ok(engine) => Box::into_raw(Box::new(engine)) as AudioAgentHandle,
            Err(e) => {
                set_audio_error(&e);
                ptr::null_mut()
            }
        }
    });

    match result {
        Ok(handle) => handle,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during engine creation");
            ptr::null_mut()
        }
    }
}

/// Destroy an audio engine instance.
///
/// # Safety
/// The handle must have been created by audio_agent_create() and must not be
/// used after this call.
#[no_mangle]
pub extern "C" fn audio_agent_destroy(handle: AudioAgentHandle) {
    if handle.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = Box::from_raw(handle as *mut AudioEngine);
    });
}

/// Start the periodic volume report. Safe to call more than once.
#[no_mangle]
pub extern "C" fn audio_agent_start_telemetry(handle: AudioAgentHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        engine.start_telemetry();
        ErrorCode::Success as i32
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during telemetry start");
        ErrorCode::Panic as i32
    })
}

// ============================================================================
// FFI Functions - Device Operations
// ============================================================================

/// Get all tracked audio devices.
///
/// # Returns
/// JSON string containing the device list. Caller must free with
/// audio_agent_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_agent_get_devices(handle: AudioAgentHandle) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ptr::null_mut();
        };

        let response = DeviceListResponse {
            devices: engine.control.devices().into_iter().map(Into::into).collect(),
        };
        match serde_json::to_string(&response) {
            Ok(json) => alloc_c_string(&json),
            Err(e) => {
                set_last_error(ErrorCode::JsonError, e.to_string());
                ptr::null_mut()
            }
        }
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during device enumeration");
        ptr::null_mut()
    })
}

/// Get one device by reference.
///
/// # Arguments
/// * `device_ref` - device id, or an empty string for the current default
///   playback device
///
/// # Returns
/// JSON string containing the device. Caller must free with
/// audio_agent_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_agent_get_device(
    handle: AudioAgentHandle,
    device_ref: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ptr::null_mut();
        };
        let Some(reference) = (unsafe { parse_c_str(device_ref) }) else {
            set_last_error(ErrorCode::InvalidArgument, "Invalid device reference");
            return ptr::null_mut();
        };

        let reference = DeviceRef::parse(reference);
        let Some(device) = engine.control.device_info(&reference) else {
            set_last_error(
                ErrorCode::DeviceNotFound,
                format!("Device {reference} not found"),
            );
            return ptr::null_mut();
        };

        let response = DeviceResponse {
            device: device.into(),
        };
        match serde_json::to_string(&response) {
            Ok(json) => alloc_c_string(&json),
            Err(e) => {
                set_last_error(ErrorCode::JsonError, e.to_string());
                ptr::null_mut()
            }
        }
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during device get");
        ptr::null_mut()
    })
}

/// Get the live peak level of a device. Unknown devices read as zero.
#[no_mangle]
pub extern "C" fn audio_agent_get_peak(
    handle: AudioAgentHandle,
    device_ref: *const c_char,
    out_peak: *mut f64,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        let Some(reference) = (unsafe { parse_c_str(device_ref) }) else {
            set_last_error(ErrorCode::InvalidArgument, "Invalid device reference");
            return ErrorCode::InvalidArgument as i32;
        };
        if out_peak.is_null() {
            set_last_error(ErrorCode::InvalidArgument, "Null output pointer");
            return ErrorCode::InvalidArgument as i32;
        }

        let peak = engine.control.peak_value(&DeviceRef::parse(reference));
        unsafe {
            *out_peak = peak;
        }
        ErrorCode::Success as i32
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during peak read");
        ErrorCode::Panic as i32
    })
}

/// Set a device as the default playback device.
///
/// # Arguments
/// * `device_id` - the device id; unlike the other calls this must name a
///   specific device
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn audio_agent_set_default(
    handle: AudioAgentHandle,
    device_id: *const c_char,
) -> i32 {
    set_default_impl(handle, device_id, false)
}

/// Set a device as the default communications device.
#[no_mangle]
pub extern "C" fn audio_agent_set_default_communications(
    handle: AudioAgentHandle,
    device_id: *const c_char,
) -> i32 {
    set_default_impl(handle, device_id, true)
}

fn set_default_impl(handle: AudioAgentHandle, device_id: *const c_char, communications: bool) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        let Some(id) = (unsafe { parse_c_str(device_id) }) else {
            set_last_error(ErrorCode::InvalidArgument, "Invalid device id");
            return ErrorCode::InvalidArgument as i32;
        };

        let reference = DeviceRef::parse(id);
        let changed = if communications {
            engine.control.set_default_communications(&reference)
        } else {
            engine.control.set_default(&reference)
        };
        if changed {
            ErrorCode::Success as i32
        } else {
            set_last_error(
                ErrorCode::DeviceNotFound,
                format!("Device {reference} not found or not switchable"),
            );
            ErrorCode::DeviceNotFound as i32
        }
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during set default device");
        ErrorCode::Panic as i32
    })
}

/// Set the mute state of a device.
///
/// # Arguments
/// * `device_ref` - device id, or an empty string for the default playback
///   device
/// * `muted` - 1 = muted, 0 = unmuted
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn audio_agent_set_mute(
    handle: AudioAgentHandle,
    device_ref: *const c_char,
    muted: i32,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        let Some(reference) = (unsafe { parse_c_str(device_ref) }) else {
            set_last_error(ErrorCode::InvalidArgument, "Invalid device reference");
            return ErrorCode::InvalidArgument as i32;
        };

        let reference = DeviceRef::parse(reference);
        if engine.control.device_info(&reference).is_none() {
            set_last_error(
                ErrorCode::DeviceNotFound,
                format!("Device {reference} not found"),
            );
            return ErrorCode::DeviceNotFound as i32;
        }

        engine
            .runtime
            .block_on(engine.control.set_mute(&reference, muted != 0));
        ErrorCode::Success as i32
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during set mute");
        ErrorCode::Panic as i32
    })
}

/// Toggle the mute state of a device.
///
/// # Returns
/// JSON string with the result (includes the new mute state). Caller must
/// free with audio_agent_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_agent_toggle_mute(
    handle: AudioAgentHandle,
    device_ref: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ptr::null_mut();
        };
        let Some(reference) = (unsafe { parse_c_str(device_ref) }) else {
            set_last_error(ErrorCode::InvalidArgument, "Invalid device reference");
            return ptr::null_mut();
        };

        let reference = DeviceRef::parse(reference);
        if engine.control.device_info(&reference).is_none() {
            set_last_error(
                ErrorCode::DeviceNotFound,
                format!("Device {reference} not found"),
            );
            return ptr::null_mut();
        }

        let muted = engine.runtime.block_on(engine.control.toggle_mute(&reference));
        let response = OperationResult {
            success: true,
            error: None,
            is_muted: Some(muted),
        };
        match serde_json::to_string(&response) {
            Ok(json) => alloc_c_string(&json),
            Err(e) => {
                set_last_error(ErrorCode::JsonError, e.to_string());
                ptr::null_mut()
            }
        }
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during toggle mute");
        ptr::null_mut()
    })
}

/// Set the volume of a device.
///
/// # Arguments
/// * `device_ref` - device id, or an empty string for the default playback
///   device
/// * `volume` - volume in percent (0.0 to 100.0)
///
/// # Returns
/// 0 on success, negative error code on failure. Out-of-range volumes fail
/// with InvalidArgument before any device is touched.
#[no_mangle]
pub extern "C" fn audio_agent_set_volume(
    handle: AudioAgentHandle,
    device_ref: *const c_char,
    volume: f64,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        let Some(reference) = (unsafe { parse_c_str(device_ref) }) else {
            set_last_error(ErrorCode::InvalidArgument, "Invalid device reference");
            return ErrorCode::InvalidArgument as i32;
        };

        let reference = DeviceRef::parse(reference);
        match engine
            .runtime
            .block_on(engine.control.set_volume(&reference, volume))
        {
            Ok(()) => ErrorCode::Success as i32,
            Err(e) => set_audio_error(&e) as i32,
        }
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during set volume");
        ErrorCode::Panic as i32
    })
}

// ============================================================================
// FFI Functions - Bus Integration
// ============================================================================

/// Feed one inbound bus message to the agent.
///
/// Unknown topics are ignored, malformed payloads are dropped, both with a
/// log line. The return value only reports transport-level problems.
#[no_mangle]
pub extern "C" fn audio_agent_handle_message(
    handle: AudioAgentHandle,
    topic: *const c_char,
    payload: *const c_char,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        let (Some(topic), Some(payload)) =
            (unsafe { parse_c_str(topic) }, unsafe { parse_c_str(payload) })
        else {
            set_last_error(ErrorCode::InvalidArgument, "Invalid topic or payload");
            return ErrorCode::InvalidArgument as i32;
        };

        engine
            .runtime
            .block_on(engine.service.handle_message(topic, payload));
        ErrorCode::Success as i32
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during message handling");
        ErrorCode::Panic as i32
    })
}

/// Publish the volume sensor discovery message through the callback.
#[no_mangle]
pub extern "C" fn audio_agent_announce(handle: AudioAgentHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        engine.service.announce();
        ErrorCode::Success as i32
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during announce");
        ErrorCode::Panic as i32
    })
}

/// Publish the current default playback volume through the callback.
#[no_mangle]
pub extern "C" fn audio_agent_publish_volume(handle: AudioAgentHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(engine) = (unsafe { engine_ref(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Null engine handle");
            return ErrorCode::InvalidHandle as i32;
        };
        engine.service.publish_volume();
        ErrorCode::Success as i32
    });

    result.unwrap_or_else(|_| {
        set_last_error(ErrorCode::Panic, "Panic during volume publish");
        ErrorCode::Panic as i32
    })
}

/// Get the command topics the host should subscribe to.
///
/// # Returns
/// JSON string listing the topics. Caller must free with
/// audio_agent_free_string().
#[no_mangle]
pub extern "C" fn audio_agent_subscriptions() -> *mut c_char {
    let response = SubscriptionsResponse {
        topics: AgentService::subscriptions()
            .iter()
            .map(|topic| topic.to_string())
            .collect(),
    };
    match serde_json::to_string(&response) {
        Ok(json) => alloc_c_string(&json),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// FFI Functions - Memory Management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of the audio_agent_*
/// functions. Do not call this on strings from other sources.
#[no_mangle]
pub extern "C" fn audio_agent_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// FFI Functions - Error Handling
// ============================================================================

/// Get the last error code.
///
/// # Returns
/// The error code from the last failed operation, or 0 if no error.
#[no_mangle]
pub extern "C" fn audio_agent_last_error_code() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(code, _)| *code as i32)
            .unwrap_or(0)
    })
}

/// Get the last error message.
///
/// # Returns
/// Error message string. Caller must free with audio_agent_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn audio_agent_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(_, msg)| alloc_c_string(msg))
            .unwrap_or(ptr::null_mut())
    })
}

// ============================================================================
// FFI Functions - Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Version string. Caller must free with audio_agent_free_string().
#[no_mangle]
pub extern "C" fn audio_agent_version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================
