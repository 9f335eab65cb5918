//! Control-point sessions for UPnP AV MediaRenderers
//!
//! Tracks the connections of remote rendering devices, negotiates new ones,
//! and republishes device notifications as typed events.
//!
//! # Architecture
//!
//! ```text
//! discovery ──► RendererRegistry ──► Renderer (one per device)
//!                                      │  connection table, reconciliation,
//!                                      │  resource matching
//!                                      └─► Session (one per connection)
//!                                             readiness barrier, typed events,
//!                                             transport / volume commands
//!
//! Renderer / Session ──► RendererTransport (SoapTransport or your own)
//! ```
//!
//! The core performs no I/O of its own. All device calls go through a
//! [`RendererTransport`] whose completions may arrive on any thread, and the
//! one deferred timeout goes through a [`Timer`]. [`SoapTransport`] implements
//! both over `soap_client`.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use avcp_renderer::{MediaRequest, RendererConfig, RendererEvent, RendererRegistry, RequestTag};
//!
//! let registry = RendererRegistry::new(RendererConfig::default())?;
//! let renderer = registry.device_added(device, transport.clone(), transport);
//!
//! let events = renderer.events();
//! renderer.create_connection(MediaRequest::Item(item), Some(RequestTag::from("kitchen")));
//!
//! for event in events {
//!     if let RendererEvent::ConnectionCreated { session, .. } = event {
//!         session.play(|result| println!("play: {result:?}"));
//!     }
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod listeners;
pub mod logging;
pub mod matcher;
pub mod poller;
pub mod registry;
pub mod renderer;
pub mod session;
pub mod soap_transport;
pub mod transport;
pub mod types;
pub mod volume;

pub use config::RendererConfig;
pub use device::{DeviceCapabilities, RendererDevice};
pub use error::{RendererError, Result, SessionError};
pub use listeners::{EventIterator, Listeners, SubscriptionToken};
pub use poller::PositionPoller;
pub use registry::{RegistryEvent, RendererRegistry};
pub use renderer::{CreateFailedReason, MediaRequest, PlaylistBuilder, Renderer, RendererEvent};
pub use session::{Session, SessionEvent, SessionState};
pub use soap_transport::{ServiceEndpoint, SoapTransport};
pub use transport::{execute, execute_blocking, Completion, EventCallback, RendererTransport, SubscriptionId, Timer};
pub use types::{Channel, ConnectionId, PlayMode, PlayState, RequestTag, DEFAULT_CONNECTION_ID};
pub use volume::VolumeRange;

// Media and protocol types used throughout the public API
pub use avcp_api::{ApiError, MediaContainer, MediaItem, MediaResource, PropertySet, ProtocolInfo, Service};
