//! Renderers keyed by device UDN
//!
//! The registry is the boundary to device discovery: whatever finds devices
//! calls [`RendererRegistry::device_added`] and
//! [`RendererRegistry::device_removed`]; applications observe the resulting
//! [`RegistryEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::RendererConfig;
use crate::device::RendererDevice;
use crate::error::Result;
use crate::listeners::{EventIterator, Listeners, SubscriptionToken};
use crate::renderer::Renderer;
use crate::transport::{RendererTransport, Timer};

/// Renderer appearance and disappearance
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    RendererAdded(Arc<Renderer>),
    RendererRemoved { udn: String },
}

/// Owns one [`Renderer`] per discovered device
pub struct RendererRegistry {
    config: RendererConfig,
    renderers: RwLock<HashMap<String, Arc<Renderer>>>,
    listeners: Listeners<RegistryEvent>,
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("config", &self.config)
            .field("renderers", &self.renderers.read().len())
            .finish()
    }
}

impl RendererRegistry {
    /// Create a registry; fails if `config` does not validate
    pub fn new(config: RendererConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            renderers: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Register a discovered device
    ///
    /// A device that is already registered keeps its existing renderer.
    pub fn device_added(
        &self,
        device: RendererDevice,
        transport: Arc<dyn RendererTransport>,
        timer: Arc<dyn Timer>,
    ) -> Arc<Renderer> {
        let renderer = {
            let mut renderers = self.renderers.write();
            if let Some(existing) = renderers.get(&device.udn) {
                debug!(udn = %device.udn, "device already registered");
                return Arc::clone(existing);
            }

            let udn = device.udn.clone();
            let renderer = Renderer::new(device, transport, timer, self.config.clone());
            renderers.insert(udn, Arc::clone(&renderer));
            renderer
        };

        self.listeners.emit(&RegistryEvent::RendererAdded(Arc::clone(&renderer)));
        renderer
    }

    /// Dispose and forget a device's renderer; false if it was unknown
    pub fn device_removed(&self, udn: &str) -> bool {
        let Some(renderer) = self.renderers.write().remove(udn) else {
            debug!(udn, "removal of unknown device");
            return false;
        };

        renderer.dispose();
        info!(udn, "renderer removed");
        self.listeners.emit(&RegistryEvent::RendererRemoved { udn: udn.to_string() });
        true
    }

    pub fn renderer(&self, udn: &str) -> Option<Arc<Renderer>> {
        self.renderers.read().get(udn).cloned()
    }

    /// Registered renderers ordered by UDN
    pub fn renderers(&self) -> Vec<Arc<Renderer>> {
        let mut renderers: Vec<_> = self.renderers.read().values().cloned().collect();
        renderers.sort_by(|a, b| a.udn().cmp(b.udn()));
        renderers
    }

    pub fn len(&self) -> usize {
        self.renderers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.read().is_empty()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionToken
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.listeners.unsubscribe(token)
    }

    pub fn events(&self) -> EventIterator<RegistryEvent> {
        self.listeners.iter()
    }

    /// Remove every device, then drop all listeners
    pub fn shutdown(&self) {
        let udns: Vec<String> = self.renderers.read().keys().cloned().collect();
        for udn in udns {
            self.device_removed(&udn);
        }
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Completion, EventCallback, SubscriptionId};
    use avcp_api::Service;
    use std::time::Duration;
    use xmltree::Element;

    struct Idle;

    impl RendererTransport for Idle {
        fn invoke(&self, _service: Service, _action: &'static str, _payload: String, _done: Completion<Element>) {}
        fn subscribe(&self, _service: Service, _on_event: EventCallback, _done: Completion<SubscriptionId>) {}
        fn unsubscribe(&self, _subscription: &SubscriptionId) {}
    }

    impl Timer for Idle {
        fn schedule(&self, _delay: Duration, _task: Box<dyn FnOnce() + Send + 'static>) {}
    }

    fn add(registry: &RendererRegistry, udn: &str) -> Arc<Renderer> {
        let idle = Arc::new(Idle);
        registry.device_added(RendererDevice::new(udn, "Speaker"), idle.clone(), idle)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = RendererConfig::new().with_poll_interval(Duration::ZERO);
        assert!(RendererRegistry::new(config).is_err());
    }

    #[test]
    fn test_add_and_remove_devices() {
        let registry = RendererRegistry::new(RendererConfig::default()).unwrap();
        let events = registry.events();

        let first = add(&registry, "uuid:b");
        let again = add(&registry, "uuid:b");
        add(&registry, "uuid:a");

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.len(), 2);
        let udns: Vec<_> = registry.renderers().iter().map(|r| r.udn().to_string()).collect();
        assert_eq!(udns, vec!["uuid:a", "uuid:b"]);
        assert_eq!(events.try_iter().count(), 2);

        assert!(registry.device_removed("uuid:b"));
        assert!(!registry.device_removed("uuid:b"));
        assert!(first.is_disposed());
        assert!(registry.renderer("uuid:b").is_none());
        assert!(matches!(
            events.try_recv(),
            Some(RegistryEvent::RendererRemoved { udn }) if udn == "uuid:b"
        ));
    }

    #[test]
    fn test_shutdown_disposes_everything() {
        let registry = RendererRegistry::new(RendererConfig::default()).unwrap();
        let renderer = add(&registry, "uuid:a");
        let events = registry.events();

        registry.shutdown();
        assert!(registry.is_empty());
        assert!(renderer.is_disposed());
        assert!(matches!(events.recv(), Some(RegistryEvent::RendererRemoved { .. })));
        assert!(events.recv().is_none());
    }
}
