//! In-memory [`Publisher`] that records every event it is asked to send.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use safewatch_shared::events::PushEvent;
use safewatch_shared::ConnectionId;

use crate::dispatcher::{DeliveryError, Publisher};

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(ConnectionId, PushEvent)>>,
    failing: Mutex<HashSet<ConnectionId>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `conn` fail with [`DeliveryError::Closed`].
    pub fn fail_on(&self, conn: ConnectionId) {
        lock(&self.failing).insert(conn);
    }

    pub fn events_for(&self, conn: ConnectionId) -> Vec<PushEvent> {
        lock(&self.sent)
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Names of the events sent to `conn`, in order.
    pub fn names_for(&self, conn: ConnectionId) -> Vec<&'static str> {
        self.events_for(conn).iter().map(PushEvent::name).collect()
    }

    /// Number of events named `name` sent anywhere.
    pub fn count(&self, name: &str) -> usize {
        lock(&self.sent)
            .iter()
            .filter(|(_, e)| e.name() == name)
            .count()
    }

    pub fn total(&self) -> usize {
        lock(&self.sent).len()
    }

    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

impl Publisher for RecordingPublisher {
    fn send(&self, conn: ConnectionId, event: &PushEvent) -> Result<(), DeliveryError> {
        if lock(&self.failing).contains(&conn) {
            return Err(DeliveryError::Closed(conn));
        }
        lock(&self.sent).push((conn, event.clone()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
