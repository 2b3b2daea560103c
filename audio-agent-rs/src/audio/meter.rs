//! Peak level metering through IAudioMeterInformation.
//!
//! Every watched endpoint gets a dedicated polling thread reporting peak
//! values through the sink it was handed. The thread owns its own COM
//! apartment and exits as soon as the shared flag clears or the device
//! stops answering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;
use windows::Win32::Media::Audio::{Endpoints::IAudioMeterInformation, IMMDevice};
use windows::Win32::System::Com::CLSCTX_ALL;

use super::device::{AudioError, DeviceId};
use super::enumerator::{open_device, ComGuard};
use super::host::PeakSink;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Peak meter for one endpoint.
pub struct LevelMeter {
    meter: IAudioMeterInformation,
}

impl LevelMeter {
    pub fn new(device: &IMMDevice) -> Result<Self, AudioError> {
        unsafe {
            let meter: IAudioMeterInformation = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|_| AudioError::MeterNotAvailable)?;

            Ok(Self { meter })
        }
    }

    /// Current peak level in percent, matching the volume scale.
    pub fn peak_percent(&self) -> Result<f64, AudioError> {
        unsafe {
            let peak = self
                .meter
                .GetPeakValue()
                .map_err(AudioError::WindowsError)?;
            Ok(f64::from(peak) * 100.0)
        }
    }
}

/// Poll the endpoint's peak meter until the flag clears, reporting each
/// changed value through the sink.
pub(crate) fn spawn_peak_worker(
    id: DeviceId,
    active: Arc<AtomicBool>,
    sink: PeakSink,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let _com = match ComGuard::new() {
            Ok(guard) => guard,
            Err(e) => {
                debug!("Peak watch for {id} could not initialize COM: {e}");
                return;
            }
        };
        let meter = match open_device(id.as_str()).and_then(|device| LevelMeter::new(&device)) {
            Ok(meter) => meter,
            Err(e) => {
                debug!("No peak meter for {id}: {e}");
                return;
            }
        };

        let mut last = -1.0f64;
        while active.load(Ordering::SeqCst) {
            match meter.peak_percent() {
                Ok(value) => {
                    if (value - last).abs() > f64::EPSILON {
                        last = value;
                        if active.load(Ordering::SeqCst) {
                            sink(value);
                        }
                    }
                }
                Err(e) => {
                    debug!("Peak watch for {id} stopped: {e}");
                    break;
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    })
}
