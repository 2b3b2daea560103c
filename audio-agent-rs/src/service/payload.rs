//! Inbound payload grammar.
//!
//! Command payloads are comma separated text: a volume payload is
//! "<volume>" for the default device or "<id>,<volume>" for a specific
//! one, and mute payloads follow the same shape with a boolean. Device
//! ids are opaque text and pass through untouched apart from trimming.
//! Anything that does not fit the grammar parses to `None` and is dropped
//! by the handlers.

use crate::audio::{DeviceId, DeviceRef};

pub(crate) fn volume_command(payload: &str) -> Option<(DeviceRef, f64)> {
    let parts: Vec<&str> = payload.split(',').collect();
    match parts.as_slice() {
        [volume] => Some((DeviceRef::Default, number(volume)?)),
        [id, volume] => Some((device(id)?, number(volume)?)),
        _ => None,
    }
}

pub(crate) fn mute_command(payload: &str) -> Option<(DeviceRef, bool)> {
    let parts: Vec<&str> = payload.split(',').collect();
    match parts.as_slice() {
        [flag] => Some((DeviceRef::Default, boolean(flag)?)),
        [id, flag] => Some((device(id)?, boolean(flag)?)),
        _ => None,
    }
}

fn device(text: &str) -> Option<DeviceRef> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(DeviceRef::Id(DeviceId::new(trimmed)))
}

fn number(text: &str) -> Option<f64> {
    text.trim().parse().ok()
}

fn boolean(text: &str) -> Option<bool> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
