//! RenderingControl service operations
//!
//! Volume is exchanged in the device's native `ui2` units; conversion to
//! percent happens in the renderer layer, which knows the advertised range.

use crate::define_upnp_operation;
use crate::operation::{Validate, ValidationError};

/// The channel used when a caller does not name one
pub const MASTER_CHANNEL: &str = "Master";

define_upnp_operation! {
    operation: SetVolumeOperation,
    action: "SetVolume",
    service: RenderingControl,
    request: {
        instance_id: u32,
        channel: String,
        desired_volume: u16,
    },
    response: (),
    payload: |req| {
        format!(
            "<InstanceID>{}</InstanceID><Channel>{}</Channel><DesiredVolume>{}</DesiredVolume>",
            req.instance_id, req.channel, req.desired_volume
        )
    },
    parse: |_xml| Ok(()),
}

impl Validate for SetVolumeOperationRequest {
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        validate_channel(&self.channel)
    }
}

define_upnp_operation! {
    operation: SetMuteOperation,
    action: "SetMute",
    service: RenderingControl,
    request: {
        instance_id: u32,
        channel: String,
        desired_mute: bool,
    },
    response: (),
    payload: |req| {
        format!(
            "<InstanceID>{}</InstanceID><Channel>{}</Channel><DesiredMute>{}</DesiredMute>",
            req.instance_id,
            req.channel,
            if req.desired_mute { "1" } else { "0" }
        )
    },
    parse: |_xml| Ok(()),
}

impl Validate for SetMuteOperationRequest {
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        validate_channel(&self.channel)
    }
}

/// Channel names are single tokens such as `Master`, `LF` or `RF`
fn validate_channel(channel: &str) -> Result<(), ValidationError> {
    if channel.is_empty() || !channel.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::invalid_value("Channel", channel));
    }
    Ok(())
}

/// Parse a UPnP boolean (`1`, `0`, `true`, `false`, `yes`, `no`)
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
