//! Default endpoint selection through IPolicyConfig.
//!
//! The interface is undocumented but stable; it is what the OS sound
//! settings use to change default endpoints.

use windows::core::{IUnknown, GUID, HRESULT, PCWSTR};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_ALL};

use super::device::AudioError;

const ROLE_CONSOLE: u32 = 0;
const ROLE_MULTIMEDIA: u32 = 1;
const ROLE_COMMUNICATIONS: u32 = 2;

/// Reserved methods keep the vtable layout of the real interface.
#[windows::core::interface("F8679F50-850A-41CF-9C72-430F290290C8")]
pub unsafe trait IPolicyConfig: IUnknown {
    fn reserved1(&self) -> HRESULT;
    fn reserved2(&self) -> HRESULT;
    fn reserved3(&self) -> HRESULT;
    fn reserved4(&self) -> HRESULT;
    fn reserved5(&self) -> HRESULT;
    fn reserved6(&self) -> HRESULT;
    fn reserved7(&self) -> HRESULT;
    fn reserved8(&self) -> HRESULT;
    fn reserved9(&self) -> HRESULT;
    fn reserved10(&self) -> HRESULT;

    fn SetDefaultEndpoint(&self, device_id: PCWSTR, role: u32) -> HRESULT;
}

const CLSID_POLICY_CONFIG_CLIENT: GUID = GUID::from_u128(0x870af99c_171d_4f9e_af0d_e63df40c2bc9);

/// Make the endpoint the default playback device for media and system
/// sounds. Covers both the console and multimedia roles, the way the OS
/// sound settings do.
pub(crate) fn set_default_playback(device_id: &str) -> Result<(), AudioError> {
    set_default_endpoint(device_id, ROLE_CONSOLE)?;
    set_default_endpoint(device_id, ROLE_MULTIMEDIA)
}

/// Make the endpoint the default for communications streams.
pub(crate) fn set_default_communications(device_id: &str) -> Result<(), AudioError> {
    set_default_endpoint(device_id, ROLE_COMMUNICATIONS)
}

fn set_default_endpoint(device_id: &str, role: u32) -> Result<(), AudioError> {
    unsafe {
        let policy: IPolicyConfig = CoCreateInstance(&CLSID_POLICY_CONFIG_CLIENT, None, CLSCTX_ALL)
            .map_err(AudioError::SetDefaultFailed)?;

        let device_id_wide: Vec<u16> = device_id
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        policy
            .SetDefaultEndpoint(PCWSTR(device_id_wide.as_ptr()), role)
            .ok()
            .map_err(AudioError::SetDefaultFailed)
    }
}
