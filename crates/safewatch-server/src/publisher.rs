//! Per-connection outbound queues backing the hub's [`Publisher`].
//!
//! Each WebSocket owns a bounded mpsc receiver drained by its writer task.
//! Sends use `try_send`, so a slow socket drops its own events and never
//! holds up a fan-out to anyone else.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use safewatch_hub::{DeliveryError, Publisher};
use safewatch_shared::events::PushEvent;
use safewatch_shared::ConnectionId;

#[derive(Debug, Default)]
pub struct ChannelPublisher {
    channels: Mutex<HashMap<ConnectionId, mpsc::Sender<PushEvent>>>,
}

impl ChannelPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an outbound queue for `conn`. `buffer` must be non-zero.
    pub fn open(&self, conn: ConnectionId, buffer: usize) -> mpsc::Receiver<PushEvent> {
        let (tx, rx) = mpsc::channel(buffer);
        self.channels().insert(conn, tx);
        debug!(conn = %conn, "Outbound queue opened");
        rx
    }

    pub fn close(&self, conn: ConnectionId) {
        if self.channels().remove(&conn).is_some() {
            debug!(conn = %conn, "Outbound queue closed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.channels().len()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::Sender<PushEvent>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Publisher for ChannelPublisher {
    fn send(&self, conn: ConnectionId, event: &PushEvent) -> Result<(), DeliveryError> {
        let tx = self
            .channels()
            .get(&conn)
            .cloned()
            .ok_or(DeliveryError::UnknownConnection(conn))?;

        tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full(conn),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed(conn),
        })
    }
}
