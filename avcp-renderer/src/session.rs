//! One rendering connection on a device
//!
//! A [`Session`] binds a negotiated connection id to the AVTransport and
//! RenderingControl instances the device assigned to it. On start it issues
//! up to three requests in parallel (AVTransport subscription, RenderingControl
//! subscription, connection info) and withholds [`SessionEvent::Ready`] until
//! all of them have completed, successfully or not.
//!
//! Device notifications are translated into typed [`SessionEvent`]s. A value
//! that did not change produces no event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use avcp_api::services::av_transport::{
    format_time, GetPositionInfoOperation, GetPositionInfoOperationRequest, GetPositionInfoResponse, NextOperation,
    NextOperationRequest, PauseOperation, PauseOperationRequest, PlayOperation, PlayOperationRequest,
    PreviousOperation, PreviousOperationRequest, RecordOperation, RecordOperationRequest, SeekOperation,
    SeekOperationRequest, SetAVTransportURIOperation, SetAVTransportURIOperationRequest, SetPlayModeOperation,
    SetPlayModeOperationRequest, StopOperation, StopOperationRequest, SEEK_UNIT_REL_TIME, SEEK_UNIT_TRACK_NR,
};
use avcp_api::services::connection_manager::{
    ConnectionCompleteOperation, ConnectionCompleteOperationRequest, GetCurrentConnectionInfoOperation,
    GetCurrentConnectionInfoOperationRequest, GetCurrentConnectionInfoResponse,
};
use avcp_api::services::rendering_control::{
    parse_bool, SetMuteOperation, SetMuteOperationRequest, SetVolumeOperation, SetVolumeOperationRequest,
};
use avcp_api::{
    ApiError, DidlLite, InstanceChanges, MediaItem, MediaResource, PropertySet, ProtocolInfo, Service,
    UPnPOperation,
};
use chrono::TimeDelta;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::device::DeviceCapabilities;
use crate::error::SessionError;
use crate::listeners::{EventIterator, Listeners, SubscriptionToken};
use crate::renderer::PlaylistBuilder;
use crate::transport::{execute, EventCallback, RendererTransport, SubscriptionId};
use crate::types::{Channel, ConnectionId, PlayMode, PlayState, RequestTag};
use crate::volume::VolumeRange;

/// Typed notifications published by a [`Session`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Every initial request has completed; carries the tag of the request
    /// that created the connection
    Ready { tag: Option<RequestTag> },
    TrackChanged(u32),
    NumberOfTracksChanged(u32),
    PositionChanged(String),
    DurationChanged(String),
    MuteChanged { channel: Channel, muted: bool },
    /// Volume in percent of the device's range
    VolumeChanged { channel: Channel, percent: u8 },
    PlayStateChanged(PlayState),
    PlayModeChanged(PlayMode),
    TransportStatusChanged(String),
    TrackUriChanged(String),
    MetadataChanged(String),
    CurrentItemChanged(Option<MediaItem>),
    ProtocolInfoChanged(Option<ProtocolInfo>),
    /// The session was disposed; no further events follow
    Removed,
}

/// Snapshot of a session's derived state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub track_uri: String,
    pub metadata: String,
    pub current_item: Option<MediaItem>,
    pub track: u32,
    pub number_of_tracks: u32,
    pub transport_status: String,
    pub play_state: Option<PlayState>,
    pub play_mode: Option<PlayMode>,
    pub position: Option<String>,
    pub duration: Option<String>,
    pub mute: HashMap<Channel, bool>,
    /// Native volume per channel
    pub volume: HashMap<Channel, u16>,
    pub protocol_info: Option<ProtocolInfo>,
    pub current_resource: Option<MediaResource>,
}

/// Identifiers and negotiated values a session is built from
#[derive(Debug, Clone)]
pub(crate) struct SessionBinding {
    pub connection_id: ConnectionId,
    pub av_transport_id: i32,
    pub rcs_id: i32,
    pub protocol_info: Option<ProtocolInfo>,
    pub tag: Option<RequestTag>,
}

struct Readiness {
    pending: usize,
    fired: bool,
}

/// One rendering connection and its derived state
pub struct Session {
    id: String,
    connection_id: ConnectionId,
    av_transport_id: i32,
    rcs_id: i32,
    tag: Option<RequestTag>,
    capabilities: DeviceCapabilities,
    volume_range: VolumeRange,
    transport: Arc<dyn RendererTransport>,
    playlist_builder: Option<Arc<dyn PlaylistBuilder>>,
    readiness: Mutex<Readiness>,
    state: RwLock<SessionState>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    listeners: Listeners<SessionEvent>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("av_transport_id", &self.av_transport_id)
            .field("rcs_id", &self.rcs_id)
            .field("ready", &self.is_ready())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        binding: SessionBinding,
        capabilities: DeviceCapabilities,
        transport: Arc<dyn RendererTransport>,
        playlist_builder: Option<Arc<dyn PlaylistBuilder>>,
    ) -> Arc<Self> {
        let state = SessionState {
            protocol_info: binding.protocol_info,
            ..SessionState::default()
        };

        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: binding.connection_id,
            av_transport_id: binding.av_transport_id,
            rcs_id: binding.rcs_id,
            tag: binding.tag,
            volume_range: capabilities.effective_volume_range(),
            capabilities,
            transport,
            playlist_builder,
            readiness: Mutex::new(Readiness {
                pending: 1,
                fired: false,
            }),
            state: RwLock::new(state),
            subscriptions: Mutex::new(Vec::new()),
            listeners: Listeners::new(),
            disposed: AtomicBool::new(false),
        })
    }

    /// Issue the initial subscriptions and connection-info fetch
    ///
    /// The barrier starts with one guard count that is released after every
    /// request has been issued, so completions arriving synchronously cannot
    /// fire `Ready` early.
    pub(crate) fn start(self: &Arc<Self>) {
        debug!(connection_id = self.connection_id, session = %self.id, "starting session");

        if self.capabilities.av_transport_events {
            self.subscribe_service(Service::AVTransport);
        }
        if self.capabilities.rendering_control_events {
            self.subscribe_service(Service::RenderingControl);
        }
        self.fetch_initial_connection_info();

        self.barrier_step_complete();
    }

    fn barrier_step_begin(&self) {
        self.readiness.lock().pending += 1;
    }

    fn barrier_step_complete(&self) {
        let fire = {
            let mut readiness = self.readiness.lock();
            readiness.pending = readiness.pending.saturating_sub(1);
            if readiness.pending == 0 && !readiness.fired {
                readiness.fired = true;
                true
            } else {
                false
            }
        };

        if fire && !self.is_disposed() {
            info!(connection_id = self.connection_id, session = %self.id, "session ready");
            self.listeners.emit(&SessionEvent::Ready { tag: self.tag.clone() });
        }
    }

    fn subscribe_service(self: &Arc<Self>, service: Service) {
        self.barrier_step_begin();

        let events = Arc::downgrade(self);
        let on_event: EventCallback = Arc::new(move |set: &PropertySet| {
            if let Some(session) = events.upgrade() {
                session.on_property_set(service, set);
            }
        });

        let weak = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);
        self.transport.subscribe(
            service,
            on_event,
            Box::new(move |result| {
                let Some(session) = weak.upgrade() else {
                    debug!(%service, "subscription completed for a dropped session");
                    if let Ok(subscription) = result {
                        transport.unsubscribe(&subscription);
                    }
                    return;
                };
                match result {
                    Ok(subscription) => {
                        // dispose flips the flag under this lock
                        let mut subscriptions = session.subscriptions.lock();
                        if session.is_disposed() {
                            drop(subscriptions);
                            debug!(%service, "subscription completed after dispose, cancelling");
                            session.transport.unsubscribe(&subscription);
                        } else {
                            subscriptions.push(subscription);
                        }
                    }
                    Err(e) => warn!(connection_id = session.connection_id, %service, "subscription failed: {e}"),
                }
                session.barrier_step_complete();
            }),
        );
    }

    fn fetch_initial_connection_info(self: &Arc<Self>) {
        self.barrier_step_begin();

        let weak = Arc::downgrade(self);
        let request = GetCurrentConnectionInfoOperationRequest::new(self.connection_id);
        execute::<GetCurrentConnectionInfoOperation>(
            self.transport.as_ref(),
            &request,
            Box::new(move |result| {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                match result {
                    Ok(info) => session.apply_connection_info(&info),
                    Err(e) => warn!(connection_id = session.connection_id, "connection info failed: {e}"),
                }
                session.barrier_step_complete();
            }),
        );
    }

    /// Re-query connection info outside the readiness barrier
    fn refresh_connection_info(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let request = GetCurrentConnectionInfoOperationRequest::new(self.connection_id);
        execute::<GetCurrentConnectionInfoOperation>(
            self.transport.as_ref(),
            &request,
            Box::new(move |result| {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                match result {
                    Ok(info) => session.apply_connection_info(&info),
                    Err(e) => debug!(connection_id = session.connection_id, "connection info refresh failed: {e}"),
                }
            }),
        );
    }

    // =========================================================================
    // Notification translation
    // =========================================================================

    fn on_property_set(self: &Arc<Self>, service: Service, set: &PropertySet) {
        if self.is_disposed() {
            debug!(%service, "dropping event for disposed session");
            return;
        }

        let last_change = match set.last_change() {
            Some(Ok(last_change)) => last_change,
            Some(Err(e)) => {
                warn!(connection_id = self.connection_id, %service, "unparsable LastChange: {e}");
                return;
            }
            None => return,
        };

        match service {
            Service::AVTransport => {
                if let Some(changes) = last_change.instance(instance_id(self.av_transport_id)) {
                    self.apply_av_transport_changes(changes);
                }
            }
            Service::RenderingControl => {
                if let Some(changes) = last_change.instance(instance_id(self.rcs_id)) {
                    self.apply_rendering_control_changes(changes);
                }
            }
            Service::ConnectionManager => {}
        }
    }

    fn apply_av_transport_changes(self: &Arc<Self>, changes: &InstanceChanges) {
        let mut events = Vec::new();
        let mut uri_changed = false;
        let mut item_stale = false;

        {
            let mut state = self.state.write();
            for variable in &changes.variables {
                let value = variable.value.as_str();
                match variable.name.as_str() {
                    "TransportState" => {
                        let play_state = PlayState::from_upnp(value);
                        if replace(&mut state.play_state, Some(play_state.clone())) {
                            events.push(SessionEvent::PlayStateChanged(play_state));
                        }
                    }
                    "TransportStatus" => {
                        if replace(&mut state.transport_status, value.to_string()) {
                            events.push(SessionEvent::TransportStatusChanged(value.to_string()));
                        }
                    }
                    "CurrentPlayMode" => {
                        let play_mode = PlayMode::from_upnp(value);
                        if replace(&mut state.play_mode, Some(play_mode.clone())) {
                            events.push(SessionEvent::PlayModeChanged(play_mode));
                        }
                    }
                    "CurrentTrack" => {
                        if let Ok(track) = value.trim().parse::<u32>() {
                            if replace(&mut state.track, track) {
                                events.push(SessionEvent::TrackChanged(track));
                            }
                        }
                    }
                    "NumberOfTracks" => {
                        if let Ok(count) = value.trim().parse::<u32>() {
                            if replace(&mut state.number_of_tracks, count) {
                                events.push(SessionEvent::NumberOfTracksChanged(count));
                            }
                        }
                    }
                    "CurrentTrackURI" => {
                        if replace(&mut state.track_uri, value.to_string()) {
                            uri_changed = true;
                            item_stale = true;
                            events.push(SessionEvent::TrackUriChanged(value.to_string()));
                        }
                    }
                    "CurrentTrackMetaData" => {
                        if replace(&mut state.metadata, value.to_string()) {
                            item_stale = true;
                            events.push(SessionEvent::MetadataChanged(value.to_string()));
                        }
                    }
                    "CurrentTrackDuration" => {
                        if replace(&mut state.duration, Some(value.to_string())) {
                            events.push(SessionEvent::DurationChanged(value.to_string()));
                        }
                    }
                    "RelativeTimePosition" => {
                        if replace(&mut state.position, Some(value.to_string())) {
                            events.push(SessionEvent::PositionChanged(value.to_string()));
                        }
                    }
                    _ => {}
                }
            }

            if item_stale {
                let item = find_current_item(&state.metadata, &state.track_uri);
                if replace(&mut state.current_item, item.clone()) {
                    events.push(SessionEvent::CurrentItemChanged(item));
                }
            }
        }

        self.emit_all(events);

        if uri_changed {
            self.refresh_connection_info();
        }
    }

    fn apply_rendering_control_changes(&self, changes: &InstanceChanges) {
        let mut events = Vec::new();

        {
            let mut state = self.state.write();
            for variable in &changes.variables {
                let channel = Channel::from_upnp(variable.channel.as_deref().unwrap_or_default());
                match variable.name.as_str() {
                    "Volume" => {
                        let Ok(native) = variable.value.trim().parse::<u16>() else {
                            debug!(value = %variable.value, "ignoring non-numeric volume");
                            continue;
                        };
                        if state.volume.insert(channel.clone(), native) != Some(native) {
                            events.push(SessionEvent::VolumeChanged {
                                percent: self.volume_range.to_percent(native),
                                channel,
                            });
                        }
                    }
                    "Mute" => {
                        let Some(muted) = parse_bool(&variable.value) else {
                            continue;
                        };
                        if state.mute.insert(channel.clone(), muted) != Some(muted) {
                            events.push(SessionEvent::MuteChanged { channel, muted });
                        }
                    }
                    _ => {}
                }
            }
        }

        self.emit_all(events);
    }

    fn apply_connection_info(&self, info: &GetCurrentConnectionInfoResponse) {
        let protocol_info = info.protocol_info.parse::<ProtocolInfo>().ok();
        let mut events = Vec::new();

        {
            let mut state = self.state.write();
            if replace(&mut state.protocol_info, protocol_info.clone()) {
                events.push(SessionEvent::ProtocolInfoChanged(protocol_info));
            }
            state.current_resource = resolve_current_resource(&state);
        }

        self.emit_all(events);
    }

    fn apply_position_info(&self, info: &GetPositionInfoResponse) {
        let mut events = Vec::new();

        {
            let mut state = self.state.write();
            if replace(&mut state.track, info.track) {
                events.push(SessionEvent::TrackChanged(info.track));
            }
            if replace(&mut state.position, Some(info.rel_time.clone())) {
                events.push(SessionEvent::PositionChanged(info.rel_time.clone()));
            }
            if replace(&mut state.duration, Some(info.track_duration.clone())) {
                events.push(SessionEvent::DurationChanged(info.track_duration.clone()));
            }
        }

        self.emit_all(events);
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.listeners.emit(&event);
        }
    }

    // =========================================================================
    // Transport commands
    // =========================================================================

    fn command<Op, F>(&self, request: Op::Request, done: F)
    where
        Op: UPnPOperation<Response = ()>,
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        execute::<Op>(self.transport.as_ref(), &request, Box::new(done));
    }

    /// Issue a command only when the device advertises it; otherwise
    /// complete immediately with `Ok(())`
    fn guarded<Op, F>(&self, supported: bool, request: Op::Request, done: F)
    where
        Op: UPnPOperation<Response = ()>,
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        if !supported {
            debug!(connection_id = self.connection_id, action = Op::ACTION, "not supported by device, skipping");
            done(Ok(()));
            return;
        }
        self.command::<Op, F>(request, done);
    }

    pub fn play<F>(&self, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = PlayOperationRequest::new(self.transport_instance(), "1".to_string());
        self.command::<PlayOperation, F>(request, done);
    }

    pub fn stop<F>(&self, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = StopOperationRequest::new(self.transport_instance());
        self.command::<StopOperation, F>(request, done);
    }

    pub fn pause<F>(&self, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = PauseOperationRequest::new(self.transport_instance());
        self.guarded::<PauseOperation, F>(self.capabilities.pause, request, done);
    }

    pub fn record<F>(&self, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = RecordOperationRequest::new(self.transport_instance());
        self.guarded::<RecordOperation, F>(self.capabilities.record, request, done);
    }

    /// Seek within the current track; negative positions seek to the start
    pub fn seek_position<F>(&self, position: TimeDelta, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let seconds = u64::try_from(position.num_seconds()).unwrap_or(0);
        let request = SeekOperationRequest::new(
            self.transport_instance(),
            SEEK_UNIT_REL_TIME.to_string(),
            format_time(seconds),
        );
        self.guarded::<SeekOperation, F>(self.capabilities.seek, request, done);
    }

    pub fn seek_track<F>(&self, track: u32, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request =
            SeekOperationRequest::new(self.transport_instance(), SEEK_UNIT_TRACK_NR.to_string(), track.to_string());
        self.guarded::<SeekOperation, F>(self.capabilities.seek, request, done);
    }

    pub fn next_track<F>(&self, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = NextOperationRequest::new(self.transport_instance());
        self.guarded::<NextOperation, F>(self.capabilities.next, request, done);
    }

    pub fn previous_track<F>(&self, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = PreviousOperationRequest::new(self.transport_instance());
        self.guarded::<PreviousOperation, F>(self.capabilities.previous, request, done);
    }

    pub fn set_play_mode<F>(&self, mode: PlayMode, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = SetPlayModeOperationRequest::new(self.transport_instance(), mode.as_upnp().to_string());
        self.guarded::<SetPlayModeOperation, F>(self.capabilities.set_play_mode, request, done);
    }

    /// Set the volume of `channel` (Master when `None`) in percent
    pub fn set_volume<F>(&self, channel: Option<Channel>, percent: u8, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let channel = Channel::or_master(channel);
        let request = SetVolumeOperationRequest::new(
            self.rendering_instance(),
            channel.as_upnp().to_string(),
            self.volume_range.to_native(percent),
        );
        self.command::<SetVolumeOperation, F>(request, done);
    }

    /// Last reported volume of `channel` (Master when `None`) in percent
    pub fn volume(&self, channel: Option<Channel>) -> Option<u8> {
        let channel = Channel::or_master(channel);
        self.state
            .read()
            .volume
            .get(&channel)
            .map(|native| self.volume_range.to_percent(*native))
    }

    pub fn mute<F>(&self, muted: bool, channel: Option<Channel>, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let channel = Channel::or_master(channel);
        let request = SetMuteOperationRequest::new(self.rendering_instance(), channel.as_upnp().to_string(), muted);
        self.command::<SetMuteOperation, F>(request, done);
    }

    /// Invert the last reported mute state; an unknown state counts as unmuted
    pub fn toggle_mute<F>(&self, channel: Option<Channel>, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let muted = self.is_muted(channel.clone()).unwrap_or(false);
        self.mute(!muted, channel, done);
    }

    pub fn is_muted(&self, channel: Option<Channel>) -> Option<bool> {
        let channel = Channel::or_master(channel);
        self.state.read().mute.get(&channel).copied()
    }

    /// Push media to the device with SetAVTransportURI
    ///
    /// Usage errors are returned synchronously and nothing is sent:
    /// * an empty slice
    /// * a single resource incompatible with the negotiated protocol info
    /// * several resources when the negotiated protocol info is not a
    ///   playlist type, or no playlist could be built
    pub fn set_av_transport_uri<F>(
        &self,
        resources: &[MediaResource],
        metadata: Option<&MediaItem>,
        done: F,
    ) -> Result<(), SessionError>
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let resource = self.resolve_transport_resource(resources)?;
        let metadata = metadata.map(MediaItem::to_didl).unwrap_or_default();

        debug!(connection_id = self.connection_id, uri = %resource.uri, "setting transport URI");
        let request = SetAVTransportURIOperationRequest::new(self.transport_instance(), resource.uri, metadata);
        self.command::<SetAVTransportURIOperation, F>(request, done);
        Ok(())
    }

    fn resolve_transport_resource(&self, resources: &[MediaResource]) -> Result<MediaResource, SessionError> {
        let negotiated = self.state.read().protocol_info.clone();

        match resources {
            [] => Err(SessionError::NoResources),
            [single] => {
                check_compatible(negotiated.as_ref(), single)?;
                Ok(single.clone())
            }
            several => {
                let playlist_type = match negotiated {
                    Some(protocol) if protocol.is_playlist() => protocol,
                    other => {
                        return Err(SessionError::PlaylistRequired {
                            connection_id: self.connection_id,
                            count: several.len(),
                            negotiated: other.map(|p| p.to_string()).unwrap_or_default(),
                        })
                    }
                };

                let built = self
                    .playlist_builder
                    .as_ref()
                    .and_then(|builder| builder.build(several, std::slice::from_ref(&playlist_type)))
                    .ok_or(SessionError::PlaylistUnavailable(several.len()))?;
                check_compatible(Some(&playlist_type), &built)?;
                Ok(built)
            }
        }
    }

    /// Request ConnectionComplete when the device supports it
    pub fn close<F>(&self, done: F)
    where
        F: FnOnce(Result<(), ApiError>) + Send + 'static,
    {
        let request = ConnectionCompleteOperationRequest::new(self.connection_id);
        self.guarded::<ConnectionCompleteOperation, F>(self.capabilities.connection_complete, request, done);
    }

    /// Refresh position, duration and track number while playing
    ///
    /// Does nothing (no device call) in any other play state.
    pub fn poll(self: &Arc<Self>) {
        if self.is_disposed() || !self.play_state().is_some_and(|state| state.is_playing()) {
            return;
        }

        let weak = Arc::downgrade(self);
        let request = GetPositionInfoOperationRequest::new(self.transport_instance());
        execute::<GetPositionInfoOperation>(
            self.transport.as_ref(),
            &request,
            Box::new(move |result| {
                let Some(session) = weak.upgrade().filter(|s| !s.is_disposed()) else {
                    return;
                };
                match result {
                    Ok(info) => session.apply_position_info(&info),
                    Err(e) => debug!(connection_id = session.connection_id, "position poll failed: {e}"),
                }
            }),
        );
    }

    /// Cancel subscriptions, publish [`SessionEvent::Removed`] and drop every
    /// listener
    pub fn dispose(&self) {
        let subscriptions = {
            let mut subscriptions = self.subscriptions.lock();
            if self.disposed.swap(true, Ordering::SeqCst) {
                debug!(connection_id = self.connection_id, "session already disposed");
                return;
            }
            std::mem::take(&mut *subscriptions)
        };
        for subscription in &subscriptions {
            self.transport.unsubscribe(subscription);
        }

        info!(connection_id = self.connection_id, session = %self.id, "session removed");
        self.listeners.emit(&SessionEvent::Removed);
        self.listeners.clear();
    }

    // =========================================================================
    // Queries and listeners
    // =========================================================================

    /// Locally generated identifier, stable for the session's lifetime
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn av_transport_id(&self) -> i32 {
        self.av_transport_id
    }

    pub fn rcs_id(&self) -> i32 {
        self.rcs_id
    }

    pub fn tag(&self) -> Option<&RequestTag> {
        self.tag.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.lock().fired
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn play_state(&self) -> Option<PlayState> {
        self.state.read().play_state.clone()
    }

    pub fn play_mode(&self) -> Option<PlayMode> {
        self.state.read().play_mode.clone()
    }

    pub fn track_uri(&self) -> String {
        self.state.read().track_uri.clone()
    }

    pub fn current_item(&self) -> Option<MediaItem> {
        self.state.read().current_item.clone()
    }

    pub fn protocol_info(&self) -> Option<ProtocolInfo> {
        self.state.read().protocol_info.clone()
    }

    pub fn current_resource(&self) -> Option<MediaResource> {
        self.state.read().current_resource.clone()
    }

    pub fn position(&self) -> Option<String> {
        self.state.read().position.clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionToken
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.listeners.unsubscribe(token)
    }

    /// Blocking iterator over this session's events; ends on dispose
    pub fn events(&self) -> EventIterator<SessionEvent> {
        self.listeners.iter()
    }

    fn transport_instance(&self) -> u32 {
        instance_id(self.av_transport_id)
    }

    fn rendering_instance(&self) -> u32 {
        instance_id(self.rcs_id)
    }
}

/// Instance ids of -1 ("unknown") address instance 0
fn instance_id(id: i32) -> u32 {
    u32::try_from(id).unwrap_or(0)
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// The item in `metadata` that has a resource for `track_uri`
fn find_current_item(metadata: &str, track_uri: &str) -> Option<MediaItem> {
    if track_uri.is_empty() {
        return None;
    }
    match DidlLite::parse_reported(metadata)? {
        Ok(didl) => didl.find_item_by_resource_uri(track_uri).cloned(),
        Err(e) => {
            debug!("ignoring unparsable track metadata: {e}");
            None
        }
    }
}

fn resolve_current_resource(state: &SessionState) -> Option<MediaResource> {
    if state.track_uri.is_empty() {
        return None;
    }

    let from_item = state
        .current_item
        .as_ref()
        .and_then(|item| item.resource_for_uri(&state.track_uri))
        .cloned();

    from_item.or_else(|| {
        let protocol_info = state.protocol_info.as_ref().map(ToString::to_string).unwrap_or_default();
        Some(MediaResource::new(state.track_uri.clone(), protocol_info))
    })
}

fn check_compatible(negotiated: Option<&ProtocolInfo>, resource: &MediaResource) -> Result<(), SessionError> {
    let Some(negotiated) = negotiated.filter(|p| !p.is_wildcard()) else {
        return Ok(());
    };

    match resource.parsed_protocol_info() {
        Some(offered) if negotiated.matches(&offered) => Ok(()),
        _ => Err(SessionError::ProtocolMismatch {
            negotiated: negotiated.to_string(),
            offered: resource.protocol_info.clone(),
        }),
    }
}
