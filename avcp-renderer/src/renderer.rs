//! The renderer aggregate: every connection on one MediaRenderer
//!
//! A [`Renderer`] owns the device's sessions in a table keyed by connection
//! id and keeps that table consistent with the device's own view, which
//! arrives as `CurrentConnectionIDs` events racing against our own
//! PrepareForConnection requests.
//!
//! # Reconciliation
//!
//! When the device reports an id we have no session for:
//! - with no negotiation in flight, the id is fetched with
//!   GetCurrentConnectionInfo and a session is built from the answer;
//! - with a negotiation in flight, the id is deferred, because it may be the
//!   connection that negotiation is about to return. The negotiation either
//!   claims it, or the deferral times out and the id is fetched as above.
//!
//! Ids we hold but the device no longer reports are disposed. Devices that do
//! not negotiate have a single connection 0 that is never removed.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};
use std::time::Instant;

use avcp_api::services::connection_manager::{
    parse_connection_ids, GetCurrentConnectionIDsOperation, GetCurrentConnectionIDsOperationRequest,
    GetCurrentConnectionInfoOperation, GetCurrentConnectionInfoOperationRequest, GetCurrentConnectionInfoResponse,
    GetProtocolInfoOperation, GetProtocolInfoOperationRequest, PrepareForConnectionOperation,
    PrepareForConnectionOperationRequest, PrepareForConnectionResponse, UNKNOWN_PEER_CONNECTION_ID,
};
use avcp_api::{ApiError, MediaContainer, MediaItem, MediaResource, PropertySet, ProtocolInfo, Service};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::RendererConfig;
use crate::device::{DeviceCapabilities, RendererDevice};
use crate::listeners::{EventIterator, Listeners, SubscriptionToken};
use crate::matcher;
use crate::session::{Session, SessionBinding, SessionEvent};
use crate::transport::{execute, EventCallback, RendererTransport, SubscriptionId, Timer};
use crate::types::{ConnectionId, RequestTag, DEFAULT_CONNECTION_ID};

/// Combines several resources into one transportable resource
///
/// Implemented by the application, typically by serving a generated playlist.
pub trait PlaylistBuilder: Send + Sync {
    /// Build one resource playing `resources` in order, using one of the
    /// `accepted` protocol infos; `None` declines
    fn build(&self, resources: &[MediaResource], accepted: &[ProtocolInfo]) -> Option<MediaResource>;
}

/// Media a connection is requested for
#[derive(Debug, Clone, PartialEq)]
pub enum MediaRequest {
    /// One resource
    Resource(MediaResource),
    /// Alternative encodings of the same media; the best match is used
    Resources(Vec<MediaResource>),
    Item(MediaItem),
    /// Several items played in sequence
    Items(Vec<MediaItem>),
    Container(MediaContainer),
}

/// Why a connection request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailedReason {
    /// No resource matches the device's sink protocol info
    UnsupportedMedia,
    /// The device rejected PrepareForConnection
    CreateAttemptDenied,
    /// The connection exists but the device refused the media
    TransportUriRejected,
}

/// Connection lifecycle notifications published by a [`Renderer`]
#[derive(Debug, Clone)]
pub enum RendererEvent {
    /// A new session became ready; `tag` is `None` for connections that
    /// were discovered through events rather than requested
    ConnectionCreated {
        connection_id: ConnectionId,
        session: Arc<Session>,
        tag: Option<RequestTag>,
    },
    /// A request resolved to a connection that already had a session
    ConnectionRecycled {
        connection_id: ConnectionId,
        session: Arc<Session>,
        tag: Option<RequestTag>,
    },
    ConnectionRemoved {
        connection_id: ConnectionId,
    },
    CreateFailed {
        reason: CreateFailedReason,
        tag: Option<RequestTag>,
        connection_id: Option<ConnectionId>,
        error: Option<ApiError>,
    },
    /// GetCurrentConnectionInfo failed for a connection the device reported;
    /// the id gets no session until the device reports it again or
    /// [`Renderer::resync`] is called
    ConnectionInfoFailed {
        connection_id: ConnectionId,
        error: ApiError,
    },
    /// The sink or source protocol info list changed
    ProtocolInfoUpdated,
}

#[derive(Debug, Clone, Default)]
struct ProtocolLists {
    sink: Vec<ProtocolInfo>,
    source: Vec<ProtocolInfo>,
}

#[derive(Debug, Clone, Copy)]
struct DeferredEntry {
    deadline: Instant,
    generation: u64,
}

#[derive(Default)]
struct ConnectionTable {
    sessions: HashMap<ConnectionId, Arc<Session>>,
    pending_creations: usize,
    deferred: HashMap<ConnectionId, DeferredEntry>,
    next_generation: u64,
    /// Last id set reported by the device
    reported: HashSet<ConnectionId>,
    /// Ids with a GetCurrentConnectionInfo in flight
    fetching: HashSet<ConnectionId>,
    disposed: bool,
}

/// The resource chosen for a request and the metadata sent with it
#[derive(Debug, Clone)]
struct ResolvedMedia {
    resource: MediaResource,
    metadata: Option<MediaItem>,
}

/// One MediaRenderer and its connections
pub struct Renderer {
    device: RendererDevice,
    config: RendererConfig,
    transport: Arc<dyn RendererTransport>,
    timer: Arc<dyn Timer>,
    protocols: RwLock<ProtocolLists>,
    table: Mutex<ConnectionTable>,
    cm_subscription: Mutex<Option<SubscriptionId>>,
    listeners: Listeners<RendererEvent>,
    weak_self: Weak<Renderer>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("udn", &self.device.udn)
            .field("friendly_name", &self.device.friendly_name)
            .field("sessions", &self.table.lock().sessions.len())
            .finish()
    }
}

impl Renderer {
    /// Create the aggregate for a discovered device and start talking to it
    ///
    /// Issues GetProtocolInfo, subscribes to ConnectionManager events when the
    /// device exposes them, and for devices without negotiation creates
    /// session 0 immediately.
    pub fn new(
        device: RendererDevice,
        transport: Arc<dyn RendererTransport>,
        timer: Arc<dyn Timer>,
        config: RendererConfig,
    ) -> Arc<Self> {
        let renderer = Arc::new_cyclic(|weak_self| Self {
            device,
            config,
            transport,
            timer,
            protocols: RwLock::new(ProtocolLists::default()),
            table: Mutex::new(ConnectionTable::default()),
            cm_subscription: Mutex::new(None),
            listeners: Listeners::new(),
            weak_self: weak_self.clone(),
        });
        renderer.start();
        renderer
    }

    fn start(&self) {
        info!(udn = %self.device.udn, name = %self.device.friendly_name, "renderer added");

        self.fetch_protocol_info();

        let capabilities = &self.device.capabilities;
        if capabilities.connection_manager_events {
            self.subscribe_connection_manager();
        } else if capabilities.prepare_for_connection {
            self.fetch_connection_ids();
        }

        if !capabilities.prepare_for_connection {
            let session = self.new_session(SessionBinding {
                connection_id: DEFAULT_CONNECTION_ID,
                av_transport_id: 0,
                rcs_id: 0,
                protocol_info: None,
                tag: None,
            });
            self.table.lock().sessions.insert(DEFAULT_CONNECTION_ID, Arc::clone(&session));
            self.announce_when_ready(&session, None);
            session.start();
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn udn(&self) -> &str {
        &self.device.udn
    }

    pub fn friendly_name(&self) -> &str {
        &self.device.friendly_name
    }

    pub fn device(&self) -> &RendererDevice {
        &self.device
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.device.capabilities
    }

    /// Protocol infos the device can render, in device priority order
    pub fn sink_protocol_info(&self) -> Vec<ProtocolInfo> {
        self.protocols.read().sink.clone()
    }

    pub fn source_protocol_info(&self) -> Vec<ProtocolInfo> {
        self.protocols.read().source.clone()
    }

    /// True if at least one resource matches a sink protocol info
    pub fn is_compatible(&self, resources: &[MediaResource]) -> bool {
        matcher::is_compatible(&self.protocols.read().sink, resources)
    }

    /// The resource this device should be given, if any is playable
    pub fn best_match(&self, resources: &[MediaResource]) -> Option<MediaResource> {
        let protocols = self.protocols.read();
        matcher::best_match(&protocols.sink, self.device.address, resources).cloned()
    }

    /// Live sessions ordered by connection id
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.table.lock().sessions.values().cloned().collect();
        sessions.sort_by_key(|session| session.connection_id());
        sessions
    }

    pub fn session(&self, connection_id: ConnectionId) -> Option<Arc<Session>> {
        self.table.lock().sessions.get(&connection_id).cloned()
    }

    /// Negotiations issued and not yet answered
    pub fn pending_creations(&self) -> usize {
        self.table.lock().pending_creations
    }

    /// Reported ids waiting for an in-flight negotiation or their timeout
    pub fn deferred_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.table.lock().deferred.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_disposed(&self) -> bool {
        self.table.lock().disposed
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionToken
    where
        F: Fn(&RendererEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.listeners.unsubscribe(token)
    }

    /// Blocking iterator over this renderer's events; ends on dispose
    pub fn events(&self) -> EventIterator<RendererEvent> {
        self.listeners.iter()
    }

    // =========================================================================
    // Connection creation
    // =========================================================================

    /// Request a connection for `request`
    ///
    /// The outcome arrives as [`RendererEvent::ConnectionCreated`],
    /// [`RendererEvent::ConnectionRecycled`] or [`RendererEvent::CreateFailed`],
    /// each carrying `tag`. Once the connection exists the media is pushed
    /// with SetAVTransportURI.
    pub fn create_connection(&self, request: MediaRequest, tag: Option<RequestTag>) {
        if self.is_disposed() {
            debug!(udn = %self.device.udn, "create_connection on a disposed renderer");
            return;
        }

        let Some(media) = self.resolve_media(&request) else {
            info!(udn = %self.device.udn, tag = ?tag, "no playable resource for request");
            self.listeners.emit(&RendererEvent::CreateFailed {
                reason: CreateFailedReason::UnsupportedMedia,
                tag,
                connection_id: None,
                error: None,
            });
            return;
        };

        if !self.device.capabilities.prepare_for_connection {
            self.reuse_default_connection(media, tag);
            return;
        }

        self.table.lock().pending_creations += 1;

        let weak = self.weak_self.clone();
        let request = PrepareForConnectionOperationRequest::new(
            media.resource.protocol_info.clone(),
            self.config.peer_connection_manager.clone(),
            UNKNOWN_PEER_CONNECTION_ID,
            "Input".to_string(),
        );
        execute::<PrepareForConnectionOperation>(
            self.transport.as_ref(),
            &request,
            Box::new(move |result| match weak.upgrade() {
                Some(renderer) => renderer.on_prepare_complete(result, media, tag),
                None => debug!("negotiation completed for a dropped renderer"),
            }),
        );
    }

    fn resolve_media(&self, request: &MediaRequest) -> Option<ResolvedMedia> {
        match request {
            MediaRequest::Resource(resource) => self.resolve_resources(std::slice::from_ref(resource), None),
            MediaRequest::Resources(resources) => self.resolve_resources(resources, None),
            MediaRequest::Item(item) => self.resolve_resources(&item.resources, Some(item)),
            MediaRequest::Items(items) => self.resolve_items(items),
            MediaRequest::Container(container) if !container.resources.is_empty() => {
                self.resolve_resources(&container.resources, None)
            }
            MediaRequest::Container(container) => self.resolve_items(&container.items),
        }
    }

    fn resolve_resources(&self, resources: &[MediaResource], item: Option<&MediaItem>) -> Option<ResolvedMedia> {
        self.best_match(resources).map(|resource| ResolvedMedia {
            resource,
            metadata: item.cloned(),
        })
    }

    fn resolve_items(&self, items: &[MediaItem]) -> Option<ResolvedMedia> {
        let mut chosen: Vec<ResolvedMedia> = items
            .iter()
            .filter_map(|item| self.resolve_resources(&item.resources, Some(item)))
            .collect();

        match chosen.len() {
            0 => None,
            1 => chosen.pop(),
            count => {
                let Some(builder) = self.config.playlist_builder.as_ref() else {
                    debug!(count, "several items but no playlist builder configured");
                    return None;
                };
                let resources: Vec<MediaResource> = chosen.into_iter().map(|media| media.resource).collect();
                let sink = self.sink_protocol_info();
                let playlist = builder.build(&resources, &sink)?;
                if !self.is_compatible(std::slice::from_ref(&playlist)) {
                    warn!(protocol_info = %playlist.protocol_info, "playlist builder returned an unsupported resource");
                    return None;
                }
                Some(ResolvedMedia {
                    resource: playlist,
                    metadata: None,
                })
            }
        }
    }

    fn reuse_default_connection(&self, media: ResolvedMedia, tag: Option<RequestTag>) {
        let Some(session) = self.session(DEFAULT_CONNECTION_ID) else {
            debug!(udn = %self.device.udn, "default connection is gone");
            return;
        };

        self.recycle(&session, media, tag);
    }

    /// Publish `ConnectionRecycled` and push the media once `session` is
    /// ready, which for a reused connection is usually right away
    fn recycle(&self, session: &Arc<Session>, media: ResolvedMedia, tag: Option<RequestTag>) {
        self.when_ready(session, move |renderer, session| {
            info!(connection_id = session.connection_id(), "connection recycled");
            renderer.listeners.emit(&RendererEvent::ConnectionRecycled {
                connection_id: session.connection_id(),
                session: Arc::clone(session),
                tag: tag.clone(),
            });
            renderer.push_media(session, media, tag);
        });
    }

    fn on_prepare_complete(
        &self,
        result: Result<PrepareForConnectionResponse, ApiError>,
        media: ResolvedMedia,
        tag: Option<RequestTag>,
    ) {
        enum Outcome {
            Created(Arc<Session>),
            Recycled(Arc<Session>),
            Denied(ApiError),
            Stale,
        }

        let outcome = {
            let mut table = self.table.lock();
            table.pending_creations = table.pending_creations.saturating_sub(1);

            if table.disposed {
                Outcome::Stale
            } else {
                match result {
                    Err(e) => Outcome::Denied(e),
                    Ok(response) => {
                        let id = response.connection_id;
                        if table.deferred.remove(&id).is_some() {
                            debug!(connection_id = id, "negotiation claimed a deferred id");
                        }
                        match table.sessions.get(&id) {
                            Some(existing) => Outcome::Recycled(Arc::clone(existing)),
                            None => {
                                let session = self.new_session(SessionBinding {
                                    connection_id: id,
                                    av_transport_id: response.av_transport_id,
                                    rcs_id: response.rcs_id,
                                    protocol_info: media.resource.parsed_protocol_info(),
                                    tag: tag.clone(),
                                });
                                table.sessions.insert(id, Arc::clone(&session));
                                Outcome::Created(session)
                            }
                        }
                    }
                }
            }
        };

        match outcome {
            Outcome::Stale => debug!(udn = %self.device.udn, "dropping negotiation result for disposed renderer"),
            Outcome::Denied(error) => {
                warn!(udn = %self.device.udn, tag = ?tag, "PrepareForConnection failed: {error}");
                self.listeners.emit(&RendererEvent::CreateFailed {
                    reason: CreateFailedReason::CreateAttemptDenied,
                    tag,
                    connection_id: None,
                    error: Some(error),
                });
            }
            Outcome::Recycled(session) => self.recycle(&session, media, tag),
            Outcome::Created(session) => {
                self.announce_when_ready(&session, Some((media, tag)));
                session.start();
            }
        }
    }

    fn new_session(&self, binding: SessionBinding) -> Arc<Session> {
        Session::new(
            binding,
            self.device.capabilities.clone(),
            Arc::clone(&self.transport),
            self.config.playlist_builder.clone(),
        )
    }

    /// Run `action` once `session` has passed its readiness barrier, provided
    /// it is still the live session for its connection id
    fn when_ready<F>(&self, session: &Arc<Session>, action: F)
    where
        F: FnOnce(&Renderer, &Arc<Session>) + Send + 'static,
    {
        let action = Arc::new(Mutex::new(Some(action)));

        // Subscribe before checking so a Ready racing with the check is not lost
        let renderer = self.weak_self.clone();
        let weak_session = Arc::downgrade(session);
        let on_ready = Arc::clone(&action);
        session.subscribe(move |event| {
            if !matches!(event, SessionEvent::Ready { .. }) {
                return;
            }
            let (Some(renderer), Some(session)) = (renderer.upgrade(), weak_session.upgrade()) else {
                return;
            };
            let Some(action) = on_ready.lock().take() else {
                return;
            };
            if renderer.is_live(&session) {
                action(&renderer, &session);
            }
        });

        if !session.is_ready() {
            return;
        }
        let Some(action) = action.lock().take() else {
            return;
        };
        if self.is_live(session) {
            action(self, session);
        }
    }

    fn is_live(&self, session: &Arc<Session>) -> bool {
        let table = self.table.lock();
        let live = !table.disposed
            && table
                .sessions
                .get(&session.connection_id())
                .is_some_and(|live| Arc::ptr_eq(live, session));
        if !live {
            debug!(connection_id = session.connection_id(), "session is no longer live");
        }
        live
    }

    /// Publish `ConnectionCreated` once `session` is ready, then push the
    /// requested media if there is any
    fn announce_when_ready(&self, session: &Arc<Session>, request: Option<(ResolvedMedia, Option<RequestTag>)>) {
        self.when_ready(session, move |renderer, session| {
            let connection_id = session.connection_id();
            info!(udn = %renderer.device.udn, connection_id, "connection created");
            renderer.listeners.emit(&RendererEvent::ConnectionCreated {
                connection_id,
                session: Arc::clone(session),
                tag: session.tag().cloned(),
            });

            if let Some((media, tag)) = request {
                renderer.push_media(session, media, tag);
            }
        });
    }

    fn push_media(&self, session: &Arc<Session>, media: ResolvedMedia, tag: Option<RequestTag>) {
        let connection_id = session.connection_id();
        let weak = self.weak_self.clone();
        let failure_tag = tag.clone();

        let result = session.set_av_transport_uri(
            std::slice::from_ref(&media.resource),
            media.metadata.as_ref(),
            move |result| {
                let (Err(error), Some(renderer)) = (result, weak.upgrade()) else {
                    return;
                };
                warn!(connection_id, "SetAVTransportURI failed: {error}");
                renderer.listeners.emit(&RendererEvent::CreateFailed {
                    reason: CreateFailedReason::TransportUriRejected,
                    tag: failure_tag,
                    connection_id: Some(connection_id),
                    error: Some(error),
                });
            },
        );

        if let Err(e) = result {
            warn!(connection_id, "media rejected before sending: {e}");
            self.listeners.emit(&RendererEvent::CreateFailed {
                reason: CreateFailedReason::TransportUriRejected,
                tag,
                connection_id: Some(connection_id),
                error: Some(ApiError::InvalidParameter(e.to_string())),
            });
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconcile the session table with the device's reported connection ids
    ///
    /// Has no effect for devices that do not negotiate connections.
    pub fn on_connection_id_list(&self, ids: &[ConnectionId]) {
        if !self.device.capabilities.prepare_for_connection {
            debug!(udn = %self.device.udn, "ignoring connection ids from a non-negotiating device");
            return;
        }

        let timeout = self.config.deferred_reconciliation_timeout;
        let mut removed = Vec::new();
        let mut fetch = Vec::new();
        let mut schedule = Vec::new();

        {
            let mut table = self.table.lock();
            if table.disposed {
                return;
            }

            let reported: HashSet<ConnectionId> = ids.iter().copied().collect();

            let gone: Vec<ConnectionId> = table
                .sessions
                .keys()
                .filter(|id| !reported.contains(id))
                .copied()
                .collect();
            for id in gone {
                if let Some(session) = table.sessions.remove(&id) {
                    removed.push(session);
                }
            }
            table.deferred.retain(|id, _| reported.contains(id));

            let mut seen = HashSet::new();
            for &id in ids {
                if !seen.insert(id) || table.sessions.contains_key(&id) || table.fetching.contains(&id) {
                    continue;
                }

                if table.pending_creations == 0 {
                    table.deferred.remove(&id);
                    table.fetching.insert(id);
                    fetch.push(id);
                } else if !table.deferred.contains_key(&id) {
                    let generation = table.next_generation;
                    table.next_generation += 1;
                    table.deferred.insert(
                        id,
                        DeferredEntry {
                            deadline: Instant::now() + timeout,
                            generation,
                        },
                    );
                    schedule.push((id, generation));
                }
            }

            table.reported = reported;
        }

        for session in removed {
            let connection_id = session.connection_id();
            info!(udn = %self.device.udn, connection_id, "connection removed by device");
            session.dispose();
            self.listeners.emit(&RendererEvent::ConnectionRemoved { connection_id });
        }

        for (id, generation) in schedule {
            debug!(connection_id = id, ?timeout, "deferring reported id while a negotiation is pending");
            let weak = self.weak_self.clone();
            self.timer.schedule(
                timeout,
                Box::new(move || {
                    if let Some(renderer) = weak.upgrade() {
                        renderer.on_deferred_timeout(id, generation);
                    }
                }),
            );
        }

        for id in fetch {
            self.fetch_reported_connection(id);
        }
    }

    fn on_deferred_timeout(&self, id: ConnectionId, generation: u64) {
        let fetch = {
            let mut table = self.table.lock();
            match table.deferred.get(&id).copied() {
                Some(entry) if !table.disposed && entry.generation == generation => {
                    table.deferred.remove(&id);
                    let wanted = table.reported.contains(&id)
                        && !table.sessions.contains_key(&id)
                        && !table.fetching.contains(&id);
                    if wanted {
                        table.fetching.insert(id);
                        debug!(
                            connection_id = id,
                            overdue = ?Instant::now().saturating_duration_since(entry.deadline),
                            "deferred id timed out"
                        );
                    }
                    wanted
                }
                _ => false,
            }
        };

        if fetch {
            self.fetch_reported_connection(id);
        } else {
            debug!(connection_id = id, generation, "stale deferred timeout");
        }
    }

    fn fetch_reported_connection(&self, id: ConnectionId) {
        let weak = self.weak_self.clone();
        let request = GetCurrentConnectionInfoOperationRequest::new(id);
        execute::<GetCurrentConnectionInfoOperation>(
            self.transport.as_ref(),
            &request,
            Box::new(move |result| {
                if let Some(renderer) = weak.upgrade() {
                    renderer.on_reported_connection_info(id, result);
                }
            }),
        );
    }

    fn on_reported_connection_info(&self, id: ConnectionId, result: Result<GetCurrentConnectionInfoResponse, ApiError>) {
        let session = {
            let mut table = self.table.lock();
            table.fetching.remove(&id);

            if table.disposed || table.sessions.contains_key(&id) || !table.reported.contains(&id) {
                debug!(connection_id = id, "dropping stale connection info");
                return;
            }

            result.map(|info| {
                let session = self.new_session(SessionBinding {
                    connection_id: id,
                    av_transport_id: info.av_transport_id,
                    rcs_id: info.rcs_id,
                    protocol_info: info.protocol_info.parse().ok(),
                    tag: None,
                });
                table.sessions.insert(id, Arc::clone(&session));
                session
            })
        };

        match session {
            Ok(session) => {
                self.announce_when_ready(&session, None);
                session.start();
            }
            Err(error) => {
                warn!(connection_id = id, "GetCurrentConnectionInfo failed: {error}");
                self.listeners.emit(&RendererEvent::ConnectionInfoFailed {
                    connection_id: id,
                    error,
                });
            }
        }
    }

    // =========================================================================
    // ConnectionManager state
    // =========================================================================

    fn fetch_protocol_info(&self) {
        let weak = self.weak_self.clone();
        execute::<GetProtocolInfoOperation>(
            self.transport.as_ref(),
            &GetProtocolInfoOperationRequest::new(),
            Box::new(move |result| {
                let Some(renderer) = weak.upgrade().filter(|r| !r.is_disposed()) else {
                    return;
                };
                match result {
                    Ok(info) => renderer.update_protocol_info(Some(&info.sink), Some(&info.source)),
                    Err(e) => warn!(udn = %renderer.device.udn, "GetProtocolInfo failed: {e}"),
                }
            }),
        );
    }

    fn fetch_connection_ids(&self) {
        let weak = self.weak_self.clone();
        execute::<GetCurrentConnectionIDsOperation>(
            self.transport.as_ref(),
            &GetCurrentConnectionIDsOperationRequest::new(),
            Box::new(move |result| {
                let Some(renderer) = weak.upgrade() else {
                    return;
                };
                match result {
                    Ok(response) => renderer.on_connection_id_list(&parse_connection_ids(&response.connection_ids)),
                    Err(e) => warn!(udn = %renderer.device.udn, "GetCurrentConnectionIDs failed: {e}"),
                }
            }),
        );
    }

    fn update_protocol_info(&self, sink: Option<&str>, source: Option<&str>) {
        let changed = {
            let mut protocols = self.protocols.write();
            let mut changed = false;
            if let Some(sink) = sink.map(ProtocolInfo::parse_list) {
                changed |= protocols.sink != sink;
                protocols.sink = sink;
            }
            if let Some(source) = source.map(ProtocolInfo::parse_list) {
                changed |= protocols.source != source;
                protocols.source = source;
            }
            changed
        };

        if changed {
            debug!(udn = %self.device.udn, "protocol info updated");
            self.listeners.emit(&RendererEvent::ProtocolInfoUpdated);
        }
    }

    fn subscribe_connection_manager(&self) {
        let events = self.weak_self.clone();
        let on_event: EventCallback = Arc::new(move |set: &PropertySet| {
            if let Some(renderer) = events.upgrade() {
                renderer.on_connection_manager_event(set);
            }
        });

        let weak = self.weak_self.clone();
        let transport = Arc::clone(&self.transport);
        self.transport.subscribe(
            Service::ConnectionManager,
            on_event,
            Box::new(move |result| {
                let Some(renderer) = weak.upgrade() else {
                    if let Ok(subscription) = result {
                        transport.unsubscribe(&subscription);
                    }
                    return;
                };
                match result {
                    Ok(subscription) => {
                        // Checked under the slot lock so dispose cannot miss the SID
                        let mut slot = renderer.cm_subscription.lock();
                        if renderer.is_disposed() {
                            drop(slot);
                            debug!(udn = %renderer.device.udn, "ConnectionManager subscription completed after dispose");
                            renderer.transport.unsubscribe(&subscription);
                        } else {
                            *slot = Some(subscription);
                        }
                    }
                    Err(e) => {
                        warn!(udn = %renderer.device.udn, "ConnectionManager subscription failed: {e}");
                        if renderer.device.capabilities.prepare_for_connection {
                            renderer.fetch_connection_ids();
                        }
                    }
                }
            }),
        );
    }

    fn on_connection_manager_event(&self, set: &PropertySet) {
        if self.is_disposed() {
            return;
        }

        self.update_protocol_info(set.get("SinkProtocolInfo"), set.get("SourceProtocolInfo"));

        if let Some(ids) = set.get("CurrentConnectionIDs") {
            self.on_connection_id_list(&parse_connection_ids(ids));
        }
    }

    /// Re-fetch protocol info and, for negotiating devices, the current
    /// connection ids
    pub fn resync(&self) {
        if self.is_disposed() {
            return;
        }
        info!(udn = %self.device.udn, "resync");
        self.fetch_protocol_info();
        if self.device.capabilities.prepare_for_connection {
            self.fetch_connection_ids();
        }
    }

    /// Dispose every session, cancel the ConnectionManager subscription and
    /// drop all listeners; later completions are ignored
    pub fn dispose(&self) {
        // Lock order: subscription slot, then table
        let (sessions, subscription) = {
            let mut slot = self.cm_subscription.lock();
            let mut table = self.table.lock();
            if table.disposed {
                return;
            }
            table.disposed = true;
            table.deferred.clear();
            table.fetching.clear();
            let sessions: Vec<Arc<Session>> = table.sessions.drain().map(|(_, session)| session).collect();
            (sessions, slot.take())
        };

        if let Some(subscription) = subscription {
            self.transport.unsubscribe(&subscription);
        }

        for session in sessions {
            let connection_id = session.connection_id();
            session.dispose();
            self.listeners.emit(&RendererEvent::ConnectionRemoved { connection_id });
        }

        self.listeners.clear();
        info!(udn = %self.device.udn, "renderer disposed");
    }

    /// The device's IPv4 address used for locality scoring
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.device.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Completion;
    use std::time::Duration;
    use xmltree::Element;

    #[derive(Default)]
    struct SilentTransport {
        actions: Mutex<Vec<&'static str>>,
    }

    impl RendererTransport for SilentTransport {
        fn invoke(&self, _service: Service, action: &'static str, _payload: String, _done: Completion<Element>) {
            self.actions.lock().push(action);
        }

        fn subscribe(&self, _service: Service, _on_event: EventCallback, _done: Completion<SubscriptionId>) {}

        fn unsubscribe(&self, _subscription: &SubscriptionId) {}
    }

    struct NoTimer;

    impl Timer for NoTimer {
        fn schedule(&self, _delay: Duration, _task: Box<dyn FnOnce() + Send + 'static>) {}
    }

    fn renderer(capabilities: DeviceCapabilities) -> (Arc<Renderer>, Arc<SilentTransport>) {
        let transport = Arc::new(SilentTransport::default());
        let device = RendererDevice::new("uuid:r1", "Den")
            .with_address(Ipv4Addr::new(10, 0, 0, 9))
            .with_capabilities(capabilities);
        let renderer = Renderer::new(device, transport.clone(), Arc::new(NoTimer), RendererConfig::default());
        (renderer, transport)
    }

    fn mp3(uri: &str) -> MediaResource {
        MediaResource::new(uri, "http-get:*:audio/mpeg:*")
    }

    #[test]
    fn test_construction_requests() {
        let (negotiating, transport) = renderer(DeviceCapabilities::standard().with_negotiation());
        assert_eq!(*transport.actions.lock(), vec!["GetProtocolInfo"]);
        assert!(negotiating.sessions().is_empty());

        let (fixed, transport) = renderer(DeviceCapabilities::standard());
        assert_eq!(
            *transport.actions.lock(),
            vec!["GetProtocolInfo", "GetCurrentConnectionInfo"]
        );
        assert_eq!(fixed.sessions().len(), 1);
        assert!(fixed.session(DEFAULT_CONNECTION_ID).is_some());
    }

    #[test]
    fn test_protocol_info_queries() {
        let (renderer, _) = renderer(DeviceCapabilities::standard().with_negotiation());
        assert!(!renderer.is_compatible(&[mp3("http://10.0.0.5/a.mp3")]));

        let updates = renderer.events();
        renderer.update_protocol_info(Some("http-get:*:audio/mpeg:*,http-get:*:audio/flac:*"), Some(""));
        renderer.update_protocol_info(Some("http-get:*:audio/mpeg:*,http-get:*:audio/flac:*"), None);
        assert_eq!(updates.try_iter().count(), 1);

        assert_eq!(renderer.sink_protocol_info().len(), 2);
        assert!(renderer.source_protocol_info().is_empty());
        assert!(renderer.is_compatible(&[mp3("http://10.0.0.5/a.mp3")]));

        let best = renderer.best_match(&[mp3("http://example.com/a.mp3"), mp3("http://10.0.0.5/a.mp3")]);
        assert_eq!(best.map(|r| r.uri), Some("http://10.0.0.5/a.mp3".to_string()));
    }

    #[test]
    fn test_connection_ids_ignored_without_negotiation() {
        let (renderer, _) = renderer(DeviceCapabilities::standard());
        renderer.on_connection_id_list(&[]);
        assert!(renderer.session(DEFAULT_CONNECTION_ID).is_some());
    }

    #[test]
    fn test_items_need_a_playlist_builder() {
        let (renderer, transport) = renderer(DeviceCapabilities::standard().with_negotiation());
        renderer.update_protocol_info(Some("http-get:*:audio/mpeg:*"), None);
        let events = renderer.events();

        let item = |uri: &str| MediaItem {
            id: uri.to_string(),
            resources: vec![mp3(uri)],
            ..MediaItem::default()
        };
        renderer.create_connection(
            MediaRequest::Items(vec![item("http://10.0.0.5/a.mp3"), item("http://10.0.0.5/b.mp3")]),
            Some(RequestTag::from("two")),
        );

        assert!(matches!(
            events.try_recv(),
            Some(RendererEvent::CreateFailed {
                reason: CreateFailedReason::UnsupportedMedia,
                ..
            })
        ));
        assert!(!transport.actions.lock().contains(&"PrepareForConnection"));
        assert_eq!(renderer.pending_creations(), 0);
    }

    #[test]
    fn test_dispose_is_terminal() {
        let (renderer, _) = renderer(DeviceCapabilities::standard());
        let events = renderer.events();

        renderer.dispose();
        assert!(renderer.is_disposed());
        assert!(renderer.sessions().is_empty());
        assert!(matches!(
            events.try_recv(),
            Some(RendererEvent::ConnectionRemoved { connection_id: 0 })
        ));
        assert!(events.recv().is_none());

        // No-ops after dispose
        renderer.dispose();
        renderer.create_connection(MediaRequest::Resource(mp3("http://10.0.0.5/a.mp3")), None);
        assert_eq!(renderer.pending_creations(), 0);
    }
}
