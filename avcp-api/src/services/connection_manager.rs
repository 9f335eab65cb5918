//! ConnectionManager service operations
//!
//! Protocol-info discovery and the optional connection negotiation actions
//! (PrepareForConnection / ConnectionComplete).

use crate::operation::{Validate, ValidationError};
use crate::{define_operation_with_response, define_upnp_operation};

/// Value of `PeerConnectionID` when the peer is not a ConnectionManager
pub const UNKNOWN_PEER_CONNECTION_ID: i32 = -1;

define_operation_with_response! {
    operation: GetProtocolInfoOperation,
    action: "GetProtocolInfo",
    service: ConnectionManager,
    request: {},
    response: GetProtocolInfoResponse {
        source: String => "Source",
        sink: String => "Sink",
    },
}

impl Validate for GetProtocolInfoOperationRequest {}

define_operation_with_response! {
    operation: PrepareForConnectionOperation,
    action: "PrepareForConnection",
    service: ConnectionManager,
    request: {
        remote_protocol_info: String => "RemoteProtocolInfo",
        peer_connection_manager: String => "PeerConnectionManager",
        peer_connection_id: i32 => "PeerConnectionID",
        direction: String => "Direction",
    },
    response: PrepareForConnectionResponse {
        connection_id: i32 => "ConnectionID",
        av_transport_id: i32 => "AVTransportID",
        rcs_id: i32 => "RcsID",
    },
}

impl Validate for PrepareForConnectionOperationRequest {
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        if self.remote_protocol_info.trim().is_empty() {
            return Err(ValidationError::missing("RemoteProtocolInfo"));
        }
        validate_direction(&self.direction)
    }
}

define_upnp_operation! {
    operation: ConnectionCompleteOperation,
    action: "ConnectionComplete",
    service: ConnectionManager,
    request: {
        connection_id: i32,
    },
    response: (),
    payload: |req| format!("<ConnectionID>{}</ConnectionID>", req.connection_id),
    parse: |_xml| Ok(()),
}

impl Validate for ConnectionCompleteOperationRequest {}

define_operation_with_response! {
    operation: GetCurrentConnectionIDsOperation,
    action: "GetCurrentConnectionIDs",
    service: ConnectionManager,
    request: {},
    response: GetCurrentConnectionIDsResponse {
        connection_ids: String => "ConnectionIDs",
    },
}

impl Validate for GetCurrentConnectionIDsOperationRequest {}

define_operation_with_response! {
    operation: GetCurrentConnectionInfoOperation,
    action: "GetCurrentConnectionInfo",
    service: ConnectionManager,
    request: {
        connection_id: i32 => "ConnectionID",
    },
    response: GetCurrentConnectionInfoResponse {
        rcs_id: i32 => "RcsID",
        av_transport_id: i32 => "AVTransportID",
        protocol_info: String => "ProtocolInfo",
        peer_connection_manager: String => "PeerConnectionManager",
        peer_connection_id: i32 => "PeerConnectionID",
        direction: String => "Direction",
        status: String => "Status",
    },
}

impl Validate for GetCurrentConnectionInfoOperationRequest {}

fn validate_direction(direction: &str) -> Result<(), ValidationError> {
    match direction {
        "Input" | "Output" => Ok(()),
        other => Err(ValidationError::Custom {
            parameter: "Direction".to_string(),
            message: format!("Invalid direction '{other}'. Must be 'Input' or 'Output'"),
        }),
    }
}

/// Parse a `CurrentConnectionIDs` value (`"0,3,7"`)
///
/// Entries that are not integers are skipped; an empty string is an empty
/// list.
pub fn parse_connection_ids(value: &str) -> Vec<i32> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .filter_map(|id| id.parse().ok())
        .collect()
}
