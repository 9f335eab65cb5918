//! Background position polling
//!
//! One thread wakes every `poll_interval` and calls [`Session::poll`] on each
//! live session of each registered renderer. Sessions that are not playing
//! make no device call.
//!
//! [`Session::poll`]: crate::session::Session::poll

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{RendererError, Result};
use crate::registry::RendererRegistry;

/// Handle to the polling thread; stops it on drop
#[derive(Debug)]
pub struct PositionPoller {
    shutdown: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl PositionPoller {
    /// Start polling `registry` at its configured interval
    ///
    /// The thread holds only a weak reference and exits once the registry is
    /// dropped.
    pub fn spawn(registry: &Arc<RendererRegistry>) -> Result<Self> {
        Self::with_interval(registry, registry.config().poll_interval)
    }

    pub fn with_interval(registry: &Arc<RendererRegistry>, interval: Duration) -> Result<Self> {
        let (shutdown, signal) = mpsc::channel();
        let registry = Arc::downgrade(registry);

        let worker = thread::Builder::new()
            .name("avcp-position-poller".to_string())
            .spawn(move || run(registry, interval, signal))
            .map_err(|source| RendererError::Thread {
                name: "position poller",
                source,
            })?;

        Ok(Self {
            shutdown: Some(shutdown),
            worker: Some(worker),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        // Dropping the sender wakes the thread
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("position poller panicked");
            }
        }
    }
}

impl Drop for PositionPoller {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run(registry: Weak<RendererRegistry>, interval: Duration, shutdown: mpsc::Receiver<()>) {
    info!(?interval, "position poller started");

    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(registry) = registry.upgrade() else {
            break;
        };
        poll_once(&registry);
    }

    info!("position poller stopped");
}

/// Poll every live session once
pub fn poll_once(registry: &RendererRegistry) {
    for renderer in registry.renderers() {
        for session in renderer.sessions() {
            session.poll();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;

    #[test]
    fn test_poller_stops_on_drop() {
        let registry = Arc::new(RendererRegistry::new(RendererConfig::default()).unwrap());
        let poller = PositionPoller::with_interval(&registry, Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        drop(poller);
    }

    #[test]
    fn test_poller_exits_when_registry_is_dropped() {
        let registry = Arc::new(RendererRegistry::new(RendererConfig::default()).unwrap());
        let poller = PositionPoller::with_interval(&registry, Duration::from_millis(5)).unwrap();
        drop(registry);
        poller.stop();
    }
}
