//! Type-safe UPnP AV API for media renderer control
//!
//! This crate models the three services a UPnP MediaRenderer exposes to a
//! control point:
//!
//! - **ConnectionManager**: protocol-info lists and connection negotiation
//! - **AVTransport**: transport URI, playback commands and position
//! - **RenderingControl**: volume and mute per channel
//!
//! Each SOAP action is a zero-sized type implementing [`UPnPOperation`],
//! which builds the request payload and parses the response element. The
//! crate does not perform I/O; callers hand the payload to a transport (for
//! example the private `soap-client` crate) and feed the response back.
//!
//! Event bodies (GENA property sets and `LastChange` documents) are parsed by
//! the [`events`] module, and DIDL-Lite metadata by [`didl`].
//!
//! ```rust
//! use avcp_api::services::av_transport::{PlayOperation, PlayOperationRequest};
//! use avcp_api::UPnPOperation;
//!
//! let request = PlayOperationRequest::new(0, "1".to_string());
//! let payload = PlayOperation::build_payload(&request).unwrap();
//! assert_eq!(payload, "<InstanceID>0</InstanceID><Speed>1</Speed>");
//! ```

pub mod didl;
pub mod error;
pub mod events;
pub mod operation;
pub mod protocol_info;
pub mod service;
pub mod services;

pub use didl::{DidlLite, MediaContainer, MediaItem, MediaResource};
pub use error::{ApiError, Result};
pub use events::{InstanceChanges, LastChange, PropertySet, StateVariable};
pub use operation::{UPnPOperation, Validate, ValidationError, ValidationLevel};
pub use protocol_info::ProtocolInfo;
pub use service::Service;

// Re-exported for the operation macros
#[doc(hidden)]
pub use paste::paste;
pub use soap_client::xml_escape;
