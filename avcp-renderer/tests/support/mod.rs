//! Scripted transport and manual timer for renderer scenarios
//!
//! Nothing completes on its own: tests take pending calls and subscriptions
//! and answer them explicitly, in whatever order the scenario needs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use avcp_renderer::{
    ApiError, Completion, DeviceCapabilities, EventCallback, PropertySet, Renderer, RendererConfig, RendererDevice,
    RendererEvent, RendererTransport, Service, SubscriptionId, Timer,
};
use parking_lot::Mutex;
use xmltree::{Element, XMLNode};

pub const MP3: &str = "http-get:*:audio/mp3:*";

/// An action invocation waiting for its answer
pub struct PendingCall {
    pub service: Service,
    pub action: &'static str,
    pub payload: String,
    done: Completion<Element>,
}

impl PendingCall {
    /// Complete with `<{action}Response>` holding the given outputs
    pub fn reply(self, outputs: &[(&str, &str)]) {
        let mut response = Element::new(&format!("{}Response", self.action));
        for (name, value) in outputs {
            let mut child = Element::new(name);
            child.children.push(XMLNode::Text(value.to_string()));
            response.children.push(XMLNode::Element(child));
        }
        (self.done)(Ok(response));
    }

    pub fn fail(self, error: ApiError) {
        (self.done)(Err(error));
    }
}

/// A subscription request waiting to be accepted or refused
pub struct PendingSubscription {
    pub service: Service,
    on_event: EventCallback,
    done: Completion<SubscriptionId>,
}

impl PendingSubscription {
    /// Accept, deliver `initial` as the initial event, then complete
    pub fn accept(self, transport: &MockTransport, initial: &PropertySet) -> SubscriptionId {
        let sid = transport.activate(self.service, Arc::clone(&self.on_event));
        (self.on_event)(initial);
        (self.done)(Ok(sid.clone()));
        sid
    }

    pub fn refuse(self) {
        (self.done)(Err(ApiError::SubscriptionError("refused".to_string())));
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<PendingCall>,
    subscriptions: Vec<PendingSubscription>,
    active: HashMap<SubscriptionId, (Service, EventCallback)>,
    unsubscribed: Vec<SubscriptionId>,
    counts: HashMap<&'static str, usize>,
    next_sid: u64,
}

#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the oldest unanswered call for `action`
    pub fn take(&self, action: &str) -> Option<PendingCall> {
        let mut state = self.state.lock();
        let index = state.calls.iter().position(|call| call.action == action)?;
        Some(state.calls.remove(index))
    }

    pub fn expect(&self, action: &str) -> PendingCall {
        self.take(action)
            .unwrap_or_else(|| panic!("no pending {action}; pending: {:?}", self.pending_actions()))
    }

    pub fn pending_actions(&self) -> Vec<&'static str> {
        self.state.lock().calls.iter().map(|call| call.action).collect()
    }

    /// How many times `action` has been invoked in total
    pub fn count(&self, action: &str) -> usize {
        self.state.lock().counts.get(action).copied().unwrap_or(0)
    }

    pub fn take_subscription(&self, service: Service) -> Option<PendingSubscription> {
        let mut state = self.state.lock();
        let index = state.subscriptions.iter().position(|s| s.service == service)?;
        Some(state.subscriptions.remove(index))
    }

    pub fn expect_subscription(&self, service: Service) -> PendingSubscription {
        self.take_subscription(service)
            .unwrap_or_else(|| panic!("no pending {service} subscription"))
    }

    pub fn pending_subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    fn activate(&self, service: Service, on_event: EventCallback) -> SubscriptionId {
        let mut state = self.state.lock();
        state.next_sid += 1;
        let sid = SubscriptionId(format!("uuid:sub-{}", state.next_sid));
        state.active.insert(sid.clone(), (service, on_event));
        sid
    }

    /// Deliver an event to every active subscription on `service`
    pub fn notify(&self, service: Service, set: &PropertySet) {
        let callbacks: Vec<EventCallback> = self
            .state
            .lock()
            .active
            .values()
            .filter(|(s, _)| *s == service)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(set);
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.state.lock().unsubscribed.clone()
    }
}

impl RendererTransport for MockTransport {
    fn invoke(&self, service: Service, action: &'static str, payload: String, done: Completion<Element>) {
        let mut state = self.state.lock();
        *state.counts.entry(action).or_default() += 1;
        state.calls.push(PendingCall {
            service,
            action,
            payload,
            done,
        });
    }

    fn subscribe(&self, service: Service, on_event: EventCallback, done: Completion<SubscriptionId>) {
        self.state.lock().subscriptions.push(PendingSubscription {
            service,
            on_event,
            done,
        });
    }

    fn unsubscribe(&self, subscription: &SubscriptionId) {
        let mut state = self.state.lock();
        state.active.remove(subscription);
        state.unsubscribed.push(subscription.clone());
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct TimerState {
    now: Duration,
    sequence: u64,
    tasks: Vec<(Duration, u64, Task)>,
}

/// Timer driven by [`ManualTimer::advance`]
#[derive(Default)]
pub struct ManualTimer {
    state: Mutex<TimerState>,
}

impl ManualTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Move time forward and run every task that became due, in order
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        loop {
            let next = {
                let mut state = self.state.lock();
                let due = state
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, (deadline, _, _))| *deadline <= target)
                    .min_by_key(|(_, (deadline, sequence, _))| (*deadline, *sequence))
                    .map(|(index, _)| index);
                match due {
                    Some(index) => {
                        let (deadline, _, task) = state.tasks.remove(index);
                        state.now = deadline;
                        Some(task)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: Task) {
        let mut state = self.state.lock();
        let deadline = state.now + delay;
        let sequence = state.sequence;
        state.sequence += 1;
        state.tasks.push((deadline, sequence, task));
    }
}

pub fn last_change(namespace: &str, instance: u32, body: &str) -> PropertySet {
    PropertySet::from_pairs([(
        "LastChange",
        format!(
            r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/{namespace}/"><InstanceID val="{instance}">{body}</InstanceID></Event>"#
        ),
    )])
}

pub fn connection_info_outputs(avt: &str, rcs: &str, protocol_info: &str) -> Vec<(&'static str, String)> {
    vec![
        ("RcsID", rcs.to_string()),
        ("AVTransportID", avt.to_string()),
        ("ProtocolInfo", protocol_info.to_string()),
        ("PeerConnectionManager", "/".to_string()),
        ("PeerConnectionID", "-1".to_string()),
        ("Direction", "Input".to_string()),
        ("Status", "OK".to_string()),
    ]
}

/// Answer a pending GetCurrentConnectionInfo
pub fn reply_connection_info(call: PendingCall, avt: &str, rcs: &str, protocol_info: &str) {
    let outputs = connection_info_outputs(avt, rcs, protocol_info);
    let borrowed: Vec<(&str, &str)> = outputs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    call.reply(&borrowed);
}

/// A negotiating device whose sink list is `[MP3]`, with the initial
/// GetProtocolInfo answered and the ConnectionManager subscription accepted
pub struct Scenario {
    pub transport: Arc<MockTransport>,
    pub timer: Arc<ManualTimer>,
    pub renderer: Arc<Renderer>,
    pub events: Arc<Mutex<Vec<RendererEvent>>>,
}

impl Scenario {
    pub fn negotiating() -> Self {
        Self::with_capabilities(DeviceCapabilities::standard().with_negotiation())
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        let transport = MockTransport::new();
        let timer = ManualTimer::new();
        let device = RendererDevice::new("uuid:renderer-1", "Living Room")
            .with_address("10.0.0.9".parse().unwrap())
            .with_capabilities(capabilities.clone());

        let renderer = Renderer::new(device, transport.clone(), timer.clone(), RendererConfig::default());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        renderer.subscribe(move |event| sink.lock().push(event.clone()));

        transport.expect("GetProtocolInfo").reply(&[("Source", ""), ("Sink", MP3)]);
        if capabilities.connection_manager_events {
            transport
                .expect_subscription(Service::ConnectionManager)
                .accept(&transport, &PropertySet::from_pairs([("SinkProtocolInfo", MP3)]));
        }

        Self {
            transport,
            timer,
            renderer,
            events,
        }
    }

    /// Send a CurrentConnectionIDs event
    pub fn report_ids(&self, ids: &str) {
        self.transport.notify(
            Service::ConnectionManager,
            &PropertySet::from_pairs([("CurrentConnectionIDs", ids)]),
        );
    }

    /// Complete the readiness barrier of the most recently started session
    pub fn complete_session_start(&self, avt: &str, rcs: &str) {
        let capabilities = self.renderer.capabilities().clone();
        if capabilities.av_transport_events {
            self.transport
                .expect_subscription(Service::AVTransport)
                .accept(&self.transport, &last_change("AVT", 0, r#"<TransportState val="STOPPED"/>"#));
        }
        if capabilities.rendering_control_events {
            self.transport
                .expect_subscription(Service::RenderingControl)
                .accept(&self.transport, &last_change("RCS", 0, r#"<Volume channel="Master" val="20"/>"#));
        }
        reply_connection_info(self.transport.expect("GetCurrentConnectionInfo"), avt, rcs, MP3);
    }

    pub fn take_events(&self) -> Vec<RendererEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn created_ids(&self) -> Vec<i32> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                RendererEvent::ConnectionCreated { connection_id, .. } => Some(*connection_id),
                _ => None,
            })
            .collect()
    }
}
