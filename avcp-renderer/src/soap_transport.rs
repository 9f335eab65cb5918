//! [`RendererTransport`] over SOAP and GENA for one device
//!
//! Actions and (un)subscriptions are blocking `ureq` calls made on a tokio
//! runtime's blocking pool, so callers never block. The host application
//! runs the HTTP server that receives NOTIFY requests and passes each body to
//! [`SoapTransport::deliver_notification`]. Subscriptions are not renewed.
//!
//! ```rust,ignore
//! let transport = Arc::new(SoapTransport::new(endpoints, "http://10.0.0.2:3400/notify", &config)?);
//! let renderer = registry.device_added(device, transport.clone(), transport.clone());
//!
//! // in the NOTIFY handler
//! transport.deliver_notification(&sid, &body)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use avcp_api::{ApiError, PropertySet, Service};
use parking_lot::Mutex;
use soap_client::SoapClient;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};
use xmltree::Element;

use crate::config::RendererConfig;
use crate::error::{RendererError, Result};
use crate::transport::{Completion, EventCallback, RendererTransport, SubscriptionId, Timer};

/// Notifications buffered for SIDs whose SUBSCRIBE response has not been
/// processed yet
const MAX_UNCLAIMED_SUBSCRIPTIONS: usize = 16;

/// Control and event URLs of one service, from the device description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub control_url: String,
    pub event_url: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(control_url: impl Into<String>, event_url: Option<String>) -> Self {
        Self {
            control_url: control_url.into(),
            event_url,
        }
    }
}

struct ActiveSubscription {
    service: Service,
    on_event: EventCallback,
    /// Completion still waiting for the initial event
    ready: Option<Completion<SubscriptionId>>,
}

#[derive(Default)]
struct SubscriptionTable {
    active: HashMap<String, ActiveSubscription>,
    unclaimed: HashMap<String, Vec<PropertySet>>,
}

/// SOAP/GENA transport for a single device
pub struct SoapTransport {
    client: SoapClient,
    endpoints: HashMap<Service, ServiceEndpoint>,
    callback_url: String,
    subscription_timeout_secs: u32,
    initial_event_timeout: Duration,
    handle: Handle,
    runtime: Option<Runtime>,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
}

impl std::fmt::Debug for SoapTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoapTransport")
            .field("endpoints", &self.endpoints)
            .field("callback_url", &self.callback_url)
            .field("subscriptions", &self.subscriptions.lock().active.len())
            .finish()
    }
}

impl SoapTransport {
    /// Create a transport with its own small runtime
    pub fn new(
        endpoints: HashMap<Service, ServiceEndpoint>,
        callback_url: impl Into<String>,
        config: &RendererConfig,
    ) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("avcp-soap")
            .enable_time()
            .build()
            .map_err(|e| RendererError::Transport(format!("failed to build runtime: {e}")))?;

        let mut transport = Self::with_handle(runtime.handle().clone(), endpoints, callback_url, config)?;
        transport.runtime = Some(runtime);
        Ok(transport)
    }

    /// Create a transport on an existing runtime; the runtime must have its
    /// time driver enabled
    pub fn with_handle(
        handle: Handle,
        endpoints: HashMap<Service, ServiceEndpoint>,
        callback_url: impl Into<String>,
        config: &RendererConfig,
    ) -> Result<Self> {
        let callback_url = callback_url.into();
        check_url(&callback_url)?;
        for endpoint in endpoints.values() {
            check_url(&endpoint.control_url)?;
            if let Some(event_url) = &endpoint.event_url {
                check_url(event_url)?;
            }
        }

        Ok(Self {
            client: SoapClient::new(),
            endpoints,
            callback_url,
            subscription_timeout_secs: u32::try_from(config.subscription_timeout.as_secs()).unwrap_or(u32::MAX),
            initial_event_timeout: config.initial_event_timeout,
            handle,
            runtime: None,
            subscriptions: Arc::new(Mutex::new(SubscriptionTable::default())),
        })
    }

    /// Replace the SOAP client, e.g. to change its timeouts
    pub fn with_client(mut self, client: SoapClient) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self, service: Service) -> Option<&ServiceEndpoint> {
        self.endpoints.get(&service)
    }

    /// Hand a NOTIFY body received for `sid` to its subscriber
    ///
    /// Notifications that arrive before the SUBSCRIBE response has been
    /// processed are held and replayed once it is.
    pub fn deliver_notification(&self, sid: &str, body: &str) -> Result<()> {
        let set = PropertySet::from_xml(body)?;

        let (on_event, ready) = {
            let mut table = self.subscriptions.lock();
            match table.active.get_mut(sid) {
                Some(active) => (Arc::clone(&active.on_event), active.ready.take()),
                None => {
                    if table.unclaimed.len() < MAX_UNCLAIMED_SUBSCRIPTIONS || table.unclaimed.contains_key(sid) {
                        table.unclaimed.entry(sid.to_string()).or_default().push(set);
                    } else {
                        debug!(sid, "dropping notification for unknown subscription");
                    }
                    return Ok(());
                }
            }
        };

        on_event(&set);
        if let Some(done) = ready {
            done(Ok(SubscriptionId(sid.to_string())));
        }
        Ok(())
    }

    fn register(
        table: &Arc<Mutex<SubscriptionTable>>,
        handle: &Handle,
        wait: Duration,
        sid: String,
        service: Service,
        on_event: EventCallback,
        done: Completion<SubscriptionId>,
    ) {
        let mut guard = table.lock();

        if let Some(events) = guard.unclaimed.remove(&sid) {
            guard.active.insert(
                sid.clone(),
                ActiveSubscription {
                    service,
                    on_event: Arc::clone(&on_event),
                    ready: None,
                },
            );
            drop(guard);

            for set in &events {
                on_event(set);
            }
            done(Ok(SubscriptionId(sid)));
            return;
        }

        guard.active.insert(
            sid.clone(),
            ActiveSubscription {
                service,
                on_event,
                ready: Some(done),
            },
        );
        drop(guard);

        // Report the subscription even if the device never sends its initial event
        let table = Arc::clone(table);
        handle.spawn(async move {
            tokio::time::sleep(wait).await;
            let ready = table.lock().active.get_mut(&sid).and_then(|active| active.ready.take());
            if let Some(done) = ready {
                warn!(%sid, %service, "no initial event received");
                done(Ok(SubscriptionId(sid)));
            }
        });
    }
}

impl RendererTransport for SoapTransport {
    fn invoke(&self, service: Service, action: &'static str, payload: String, done: Completion<Element>) {
        let Some(endpoint) = self.endpoints.get(&service) else {
            done(Err(ApiError::Unsupported(format!("device does not expose {service}"))));
            return;
        };

        let client = self.client.clone();
        let control_url = endpoint.control_url.clone();
        self.handle.spawn_blocking(move || {
            let result = client
                .call(&control_url, service.service_uri(), action, &payload)
                .map_err(ApiError::from);
            done(result);
        });
    }

    fn subscribe(&self, service: Service, on_event: EventCallback, done: Completion<SubscriptionId>) {
        let Some(event_url) = self.endpoints.get(&service).and_then(|e| e.event_url.clone()) else {
            done(Err(ApiError::Unsupported(format!("device does not event {service}"))));
            return;
        };

        let client = self.client.clone();
        let callback_url = self.callback_url.clone();
        let timeout = self.subscription_timeout_secs;
        let table = Arc::clone(&self.subscriptions);
        let handle = self.handle.clone();
        let wait = self.initial_event_timeout;

        self.handle.spawn_blocking(move || match client.subscribe(&event_url, &callback_url, timeout) {
            Ok(response) => {
                debug!(%service, sid = %response.sid, timeout = response.timeout_seconds, "subscribed");
                Self::register(&table, &handle, wait, response.sid, service, on_event, done);
            }
            Err(e) => done(Err(ApiError::SubscriptionError(format!("{service}: {e}")))),
        });
    }

    fn unsubscribe(&self, subscription: &SubscriptionId) {
        let Some(active) = self.subscriptions.lock().active.remove(subscription.as_str()) else {
            debug!(sid = subscription.as_str(), "unsubscribe for unknown subscription");
            return;
        };
        let Some(event_url) = self.endpoints.get(&active.service).and_then(|e| e.event_url.clone()) else {
            return;
        };

        let client = self.client.clone();
        let sid = subscription.0.clone();
        self.handle.spawn_blocking(move || {
            if let Err(e) = client.unsubscribe(&event_url, &sid) {
                debug!(%sid, "UNSUBSCRIBE failed: {e}");
            }
        });
    }
}

impl Timer for SoapTransport {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send + 'static>) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

impl Drop for SoapTransport {
    fn drop(&mut self) {
        // May run on one of the runtime's own threads
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn check_url(value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| RendererError::Transport(format!("invalid URL '{value}': {e}")))
}
