//! Notification fan-out.
//!
//! The [`Dispatcher`] never touches hub state. It receives a snapshot of
//! recipients (each with the connection it had when the snapshot was taken)
//! and pushes one event to every bound recipient. Offline recipients are
//! skipped; failed sends are logged and counted as not delivered. Delivery is
//! best-effort and at-most-once per call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use safewatch_shared::events::{
    Acknowledged, EmergencyAlert, EventSource, Presence, PushEvent, TrackingStarted,
    TrackingStopped,
};
use safewatch_shared::{ConnectionId, Location, UserId};

use crate::identity::User;

// ---------------------------------------------------------------------------
// Publisher capability
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Connection {0} is not registered with the publisher")]
    UnknownConnection(ConnectionId),

    #[error("Connection {0} is closed")]
    Closed(ConnectionId),

    #[error("Outbound queue for connection {0} is full")]
    Full(ConnectionId),
}

/// Pushes an event onto one live connection.
///
/// Implementations must not block: a slow recipient has to fail fast (or
/// queue) rather than hold up the rest of a fan-out.
pub trait Publisher: Send + Sync + 'static {
    fn send(&self, conn: ConnectionId, event: &PushEvent) -> Result<(), DeliveryError>;
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn send(&self, conn: ConnectionId, event: &PushEvent) -> Result<(), DeliveryError> {
        (**self).send(conn, event)
    }
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// What happened to the source user, before it is addressed and stamped.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Online,
    Offline,
    TrackingStarted {
        duration_seconds: u64,
        started_at: DateTime<Utc>,
        location: Option<Location>,
    },
    TrackingStopped,
    Acknowledged {
        location: Option<Location>,
    },
    EmergencyAlert {
        location: Option<Location>,
    },
}

impl Notice {
    /// Build the wire event, enriched with the source user and a timestamp.
    pub fn into_event(self, source: &User, now: DateTime<Utc>) -> PushEvent {
        let from = EventSource {
            name: source.display_name.clone(),
            user_id: source.id.clone(),
        };

        match self {
            Notice::Online => PushEvent::ContactOnline(Presence {
                user_id: from.user_id,
                name: from.name,
                timestamp: now,
            }),
            Notice::Offline => PushEvent::ContactOffline(Presence {
                user_id: from.user_id,
                name: from.name,
                timestamp: now,
            }),
            Notice::TrackingStarted {
                duration_seconds,
                started_at,
                location,
            } => PushEvent::ContactTrackingStarted(TrackingStarted {
                from,
                duration: duration_seconds,
                start_time: started_at,
                location,
                timestamp: now,
            }),
            Notice::TrackingStopped => {
                PushEvent::ContactTrackingStopped(TrackingStopped {
                    from,
                    timestamp: now,
                })
            }
            Notice::Acknowledged { location } => PushEvent::ContactAcknowledged(Acknowledged {
                from,
                location,
                timestamp: now,
            }),
            Notice::EmergencyAlert { location } => {
                let message = alert_message(&source.display_name);
                PushEvent::EmergencyAlert(EmergencyAlert {
                    from,
                    location,
                    timestamp: now,
                    message,
                })
            }
        }
    }
}

fn alert_message(name: &str) -> String {
    format!("EMERGENCY: {name} has raised an emergency alert and may need help")
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// One addressee of a fan-out, resolved under the hub lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: UserId,
    /// `None` when the contact was offline at snapshot time.
    pub conn: Option<ConnectionId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub total: usize,
    pub delivered: usize,
}

/// Outcome of raising an emergency alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResult {
    pub contacts_total: usize,
    pub contacts_delivered: usize,
    /// Whether an active tracking session was ended by this alert.
    pub tracking_stopped: bool,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher<P> {
    publisher: P,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    /// Push `notice` about `source` to every online recipient.
    pub fn notify(&self, source: &User, recipients: &[Recipient], notice: Notice) -> DeliveryReport {
        let event = notice.into_event(source, Utc::now());
        let mut report = DeliveryReport {
            total: recipients.len(),
            delivered: 0,
        };

        for recipient in recipients {
            let Some(conn) = recipient.conn else {
                debug!(
                    event = event.name(),
                    recipient = %recipient.user_id,
                    "Recipient offline, skipping"
                );
                continue;
            };

            match self.publisher.send(conn, &event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        event = event.name(),
                        recipient = %recipient.user_id,
                        error = %e,
                        "Dropping event for recipient"
                    );
                }
            }
        }

        debug!(
            event = event.name(),
            source = %source.id,
            total = report.total,
            delivered = report.delivered,
            "Fan-out complete"
        );
        report
    }

    /// Send an event to a single connection (replies on the presence channel).
    pub fn send_direct(&self, conn: ConnectionId, event: &PushEvent) -> bool {
        match self.publisher.send(conn, event) {
            Ok(()) => true,
            Err(e) => {
                debug!(conn = %conn, event = event.name(), error = %e, "Direct send failed");
                false
            }
        }
    }
}
