//! AVTransport service operations
//!
//! Transport URI, playback commands, play mode and position queries. All
//! actions address an AVTransport instance id learned from connection
//! negotiation (0 when the device does not negotiate).

use crate::operation::{Validate, ValidationError};
use crate::{define_operation_with_response, define_upnp_operation, xml_escape};

// =============================================================================
// TRANSPORT URI
// =============================================================================

define_upnp_operation! {
    operation: SetAVTransportURIOperation,
    action: "SetAVTransportURI",
    service: AVTransport,
    request: {
        instance_id: u32,
        current_uri: String,
        current_uri_meta_data: String,
    },
    response: (),
    payload: |req| {
        format!(
            "<InstanceID>{}</InstanceID><CurrentURI>{}</CurrentURI><CurrentURIMetaData>{}</CurrentURIMetaData>",
            req.instance_id,
            xml_escape(&req.current_uri),
            xml_escape(&req.current_uri_meta_data)
        )
    },
    parse: |_xml| Ok(()),
}

impl Validate for SetAVTransportURIOperationRequest {
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        if self.current_uri.trim().is_empty() {
            return Err(ValidationError::missing("CurrentURI"));
        }
        Ok(())
    }
}

// =============================================================================
// BASIC PLAYBACK CONTROL
// =============================================================================

define_upnp_operation! {
    operation: PlayOperation,
    action: "Play",
    service: AVTransport,
    request: {
        instance_id: u32,
        speed: String,
    },
    response: (),
    payload: |req| {
        format!("<InstanceID>{}</InstanceID><Speed>{}</Speed>", req.instance_id, xml_escape(&req.speed))
    },
    parse: |_xml| Ok(()),
}

impl Validate for PlayOperationRequest {
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        if self.speed.is_empty() {
            return Err(ValidationError::invalid_value("Speed", &self.speed));
        }
        // TransportPlaySpeed is "1" or a fraction such as "1/2"
        let numeric = self
            .speed
            .trim_start_matches('-')
            .split('/')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if numeric {
            Ok(())
        } else {
            Err(ValidationError::Custom {
                parameter: "Speed".to_string(),
                message: "Speed must be an integer or a fraction such as '1/2'".to_string(),
            })
        }
    }
}

define_upnp_operation! {
    operation: StopOperation,
    action: "Stop",
    service: AVTransport,
    request: {
        instance_id: u32,
    },
    response: (),
    payload: |req| format!("<InstanceID>{}</InstanceID>", req.instance_id),
    parse: |_xml| Ok(()),
}

impl Validate for StopOperationRequest {}

define_upnp_operation! {
    operation: PauseOperation,
    action: "Pause",
    service: AVTransport,
    request: {
        instance_id: u32,
    },
    response: (),
    payload: |req| format!("<InstanceID>{}</InstanceID>", req.instance_id),
    parse: |_xml| Ok(()),
}

impl Validate for PauseOperationRequest {}

define_upnp_operation! {
    operation: RecordOperation,
    action: "Record",
    service: AVTransport,
    request: {
        instance_id: u32,
    },
    response: (),
    payload: |req| format!("<InstanceID>{}</InstanceID>", req.instance_id),
    parse: |_xml| Ok(()),
}

impl Validate for RecordOperationRequest {}

define_upnp_operation! {
    operation: NextOperation,
    action: "Next",
    service: AVTransport,
    request: {
        instance_id: u32,
    },
    response: (),
    payload: |req| format!("<InstanceID>{}</InstanceID>", req.instance_id),
    parse: |_xml| Ok(()),
}

impl Validate for NextOperationRequest {}

define_upnp_operation! {
    operation: PreviousOperation,
    action: "Previous",
    service: AVTransport,
    request: {
        instance_id: u32,
    },
    response: (),
    payload: |req| format!("<InstanceID>{}</InstanceID>", req.instance_id),
    parse: |_xml| Ok(()),
}

impl Validate for PreviousOperationRequest {}

// =============================================================================
// SEEK, PLAY MODE AND POSITION
// =============================================================================

/// `Seek` unit for an absolute position within the current track
pub const SEEK_UNIT_REL_TIME: &str = "REL_TIME";
/// `Seek` unit for a track number
pub const SEEK_UNIT_TRACK_NR: &str = "TRACK_NR";

define_upnp_operation! {
    operation: SeekOperation,
    action: "Seek",
    service: AVTransport,
    request: {
        instance_id: u32,
        unit: String,
        target: String,
    },
    response: (),
    payload: |req| {
        format!(
            "<InstanceID>{}</InstanceID><Unit>{}</Unit><Target>{}</Target>",
            req.instance_id,
            req.unit,
            xml_escape(&req.target)
        )
    },
    parse: |_xml| Ok(()),
}

impl Validate for SeekOperationRequest {
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        match self.unit.as_str() {
            "TRACK_NR" | "REL_TIME" | "ABS_TIME" | "ABS_COUNT" | "REL_COUNT" | "X_DLNA_REL_BYTE" => Ok(()),
            other => Err(ValidationError::Custom {
                parameter: "Unit".to_string(),
                message: format!("Invalid seek unit '{other}'"),
            }),
        }
    }
}

define_upnp_operation! {
    operation: SetPlayModeOperation,
    action: "SetPlayMode",
    service: AVTransport,
    request: {
        instance_id: u32,
        new_play_mode: String,
    },
    response: (),
    payload: |req| {
        format!(
            "<InstanceID>{}</InstanceID><NewPlayMode>{}</NewPlayMode>",
            req.instance_id,
            xml_escape(&req.new_play_mode)
        )
    },
    parse: |_xml| Ok(()),
}

impl Validate for SetPlayModeOperationRequest {
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        if self.new_play_mode.trim().is_empty() {
            return Err(ValidationError::missing("NewPlayMode"));
        }
        Ok(())
    }
}

define_operation_with_response! {
    operation: GetPositionInfoOperation,
    action: "GetPositionInfo",
    service: AVTransport,
    request: {
        instance_id: u32 => "InstanceID",
    },
    response: GetPositionInfoResponse {
        track: u32 => "Track",
        track_duration: String => "TrackDuration",
        track_meta_data: String => "TrackMetaData",
        track_uri: String => "TrackURI",
        rel_time: String => "RelTime",
        abs_time: String => "AbsTime",
    },
}

impl Validate for GetPositionInfoOperationRequest {}

/// Format a non-negative number of seconds as `HH:MM:SS`
pub fn format_time(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Parse an `H+:MM:SS[.F+]` time value into whole seconds
///
/// Returns `None` for `NOT_IMPLEMENTED`, empty strings and malformed values.
pub fn parse_time(value: &str) -> Option<u64> {
    let value = value.trim();
    let whole = value.split('.').next()?;
    let mut parts = whole.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}
