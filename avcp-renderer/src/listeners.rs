//! Token-based listener tables
//!
//! Publishers (sessions, renderers, the registry) own a [`Listeners`] table.
//! Registering returns a [`SubscriptionToken`]; the subscriber hands it back
//! to unsubscribe, and the publisher clears the whole table when it is torn
//! down. Listeners are invoked outside the table lock, so a listener may
//! subscribe or unsubscribe re-entrantly.
//!
//! [`Listeners::iter`] adapts a table to a blocking iterator backed by
//! `std::sync::mpsc`:
//!
//! ```rust,ignore
//! for event in renderer.events() {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::{mpsc, Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`Listeners::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Table<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// A table of listeners for one event type
pub struct Listeners<E> {
    table: Arc<Mutex<Table<E>>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(Table {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionToken
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut table = self.table.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, Arc::new(listener)));
        SubscriptionToken(id)
    }

    /// Remove a listener; returns false if the token was already removed
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut table = self.table.lock();
        let before = table.entries.len();
        table.entries.retain(|(id, _)| *id != token.0);
        table.entries.len() != before
    }

    /// Remove every listener
    pub fn clear(&self) {
        self.table.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every listener registered at the time of the call
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .table
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }
}

impl<E: Clone + Send + 'static> Listeners<E> {
    /// Subscribe a channel and return a blocking iterator over it
    ///
    /// The iterator ends once the table is cleared. Dropping the iterator
    /// unsubscribes it.
    pub fn iter(&self) -> EventIterator<E> {
        let (tx, rx) = mpsc::channel();
        let token = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        EventIterator {
            rx,
            token,
            table: Arc::downgrade(&self.table),
        }
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

/// Blocking iterator over events from one listener table
///
/// All methods are synchronous.
pub struct EventIterator<E> {
    rx: mpsc::Receiver<E>,
    token: SubscriptionToken,
    table: Weak<Mutex<Table<E>>>,
}

impl<E> EventIterator<E> {
    /// Block until the next event is available
    ///
    /// Returns `None` once the publisher has cleared its listeners.
    pub fn recv(&self) -> Option<E> {
        self.rx.recv().ok()
    }

    /// Block until the next event or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<E> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Iterate over the events currently queued, without blocking
    pub fn try_iter(&self) -> impl Iterator<Item = E> + '_ {
        self.rx.try_iter()
    }

    /// Iterate, waiting up to `timeout` for each event
    pub fn timeout_iter(&self, timeout: Duration) -> impl Iterator<Item = E> + '_ {
        std::iter::from_fn(move || self.recv_timeout(timeout))
    }
}

impl<E> Iterator for EventIterator<E> {
    type Item = E;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl<E> Drop for EventIterator<E> {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().entries.retain(|(id, _)| *id != self.token.0);
        }
    }
}
