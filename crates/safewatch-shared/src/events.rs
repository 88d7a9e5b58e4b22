use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Location, UserId};

/// Events pushed from the hub to a live connection.
///
/// Encoded as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// The connection is now bound to this user
    Authenticated(Authenticated),

    /// Authentication was rejected; nothing changed
    AuthenticationFailed(Rejection),

    /// Some other presence-channel request was rejected
    RequestFailed(RequestFailed),

    /// A user who lists the recipient as a contact came online
    ContactOnline(Presence),

    /// ... or went offline
    ContactOffline(Presence),

    ContactTrackingStarted(TrackingStarted),

    ContactTrackingStopped(TrackingStopped),

    /// The source user checked in
    ContactAcknowledged(Acknowledged),

    EmergencyAlert(EmergencyAlert),
}

/// Who an event is about, as shown to the recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub name: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticated {
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFailed {
    /// Name of the client message that failed (e.g. `acknowledge`)
    pub action: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: UserId,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStarted {
    pub from: EventSource,
    /// Session length in seconds
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStopped {
    pub from: EventSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledged {
    pub from: EventSource,
    pub location: Option<Location>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    pub from: EventSource,
    pub location: Option<Location>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl PushEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::RequestFailed(_) => "request_failed",
            Self::ContactOnline(_) => "contact_online",
            Self::ContactOffline(_) => "contact_offline",
            Self::ContactTrackingStarted(_) => "contact_tracking_started",
            Self::ContactTrackingStopped(_) => "contact_tracking_stopped",
            Self::ContactAcknowledged(_) => "contact_acknowledged",
            Self::EmergencyAlert(_) => "emergency_alert",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

/// Messages a client sends over its presence connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to `user_id`
    #[serde(rename_all = "camelCase")]
    Authenticate { user_id: UserId },

    /// Check in with all contacts
    #[serde(rename_all = "camelCase")]
    Acknowledge {
        user_id: UserId,
        #[serde(default)]
        location: Option<Location>,
    },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::Acknowledge { .. } => "acknowledge",
        }
    }
}
