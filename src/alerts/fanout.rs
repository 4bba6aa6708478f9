//! Bounded per-listener alert fanout.
//!
//! The transport layer registers one listener per connected client and
//! drains it at its own pace. Producers never block: an alert that does not
//! fit in a listener's queue is silently dropped for that listener — a live
//! stream tolerates loss because clients re-sync from the store on demand.

use crate::alerts::types::Alert;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

pub const DEFAULT_LISTENER_CAPACITY: usize = 50;

pub struct AlertFanout {
    listeners: Mutex<Vec<Sender<Alert>>>,
    capacity: usize,
}

impl AlertFanout {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Registers a new listener and returns its bounded receiving end.
    /// Dropping the receiver unregisters the listener on the next publish.
    pub fn register(&self) -> Receiver<Alert> {
        let (tx, rx) = bounded(self.capacity);
        self.listeners.lock().push(tx);
        rx
    }

    /// Delivers the alert to every registered listener, dropping it for any
    /// listener whose queue is full and pruning disconnected listeners.
    pub fn publish(&self, alert: &Alert) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| match tx.try_send(alert.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for AlertFanout {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_CAPACITY)
    }
}
