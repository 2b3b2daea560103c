//! Device change notifications through IMMNotificationClient.
//!
//! The client turns raw callbacks into [`EndpointNotice`] values on a plain
//! channel. Callbacks arrive on system worker threads, so they stay minimal
//! and all device lookups happen later on the host's event thread.

use std::sync::mpsc::Sender;

use windows::core::{implement, PCWSTR};
use windows::Win32::Media::Audio::{
    EDataFlow, ERole, IMMDeviceEnumerator, IMMNotificationClient, IMMNotificationClient_Impl,
    DEVICE_STATE,
};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

use super::device::{DeviceId, DeviceState};
use super::endpoint::state_from_raw;

/// Raw change notice, before any device lookup.
#[derive(Debug, Clone)]
pub(crate) enum EndpointNotice {
    Added(DeviceId),
    Removed(DeviceId),
    StateChanged(DeviceId, DeviceState),
    /// A role's default endpoint moved to this device.
    DefaultChanged(DeviceId),
    PropertyChanged(DeviceId),
}

/// Notification client that forwards raw notices to a channel.
#[implement(IMMNotificationClient)]
pub(crate) struct ChangeNotificationClient {
    notices: Sender<EndpointNotice>,
}

impl ChangeNotificationClient {
    pub(crate) fn new(notices: Sender<EndpointNotice>) -> Self {
        Self { notices }
    }

    /// Register this client with an enumerator.
    /// Takes ownership of self because the COM interface needs to own the data.
    pub(crate) fn register(
        self,
        enumerator: &IMMDeviceEnumerator,
    ) -> Result<IMMNotificationClient, windows::core::Error> {
        unsafe {
            let client: IMMNotificationClient = self.into();
            enumerator.RegisterEndpointNotificationCallback(&client)?;
            Ok(client)
        }
    }
}

impl IMMNotificationClient_Impl for ChangeNotificationClient_Impl {
    fn OnDeviceStateChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        unsafe {
            if let Ok(id) = pwstrdeviceid.to_string() {
                let _ = self.notices.send(EndpointNotice::StateChanged(
                    DeviceId::new(id),
                    state_from_raw(dwnewstate),
                ));
            }
        }
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        unsafe {
            if let Ok(id) = pwstrdeviceid.to_string() {
                let _ = self.notices.send(EndpointNotice::Added(DeviceId::new(id)));
            }
        }
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        unsafe {
            if let Ok(id) = pwstrdeviceid.to_string() {
                let _ = self.notices.send(EndpointNotice::Removed(DeviceId::new(id)));
            }
        }
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        _flow: EDataFlow,
        _role: ERole,
        pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        unsafe {
            // Null id means the role lost its default entirely; there is no
            // device left to refresh in that case.
            if pwstrdefaultdeviceid.is_null() {
                return Ok(());
            }
            if let Ok(id) = pwstrdefaultdeviceid.to_string() {
                let _ = self
                    .notices
                    .send(EndpointNotice::DefaultChanged(DeviceId::new(id)));
            }
        }
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        _key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        unsafe {
            if let Ok(id) = pwstrdeviceid.to_string() {
                let _ = self
                    .notices
                    .send(EndpointNotice::PropertyChanged(DeviceId::new(id)));
            }
        }
        Ok(())
    }
}
