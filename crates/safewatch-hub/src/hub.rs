//! The hub facade.
//!
//! All four stores sit behind one `RwLock`. Every read-then-write on a user's
//! entry happens inside a single guard, and every fan-out takes its recipient
//! snapshot (contacts plus their current connections) inside that same
//! guard. The guard is dropped before any event is pushed, so deliveries
//! never serialize behind the lock.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use safewatch_shared::events::{Authenticated, PushEvent, Rejection};
use safewatch_shared::views::{ContactView, PublicUserView};
use safewatch_shared::{ConnectionId, Location, UserId};

use crate::connections::ConnectionRegistry;
use crate::contacts::ContactGraph;
use crate::dispatcher::{AlertResult, DeliveryReport, Dispatcher, Notice, Publisher, Recipient};
use crate::error::{HubError, Result};
use crate::identity::{IdentityStore, User};
use crate::tracking::{TrackingSession, TrackingSessions};

#[derive(Debug, Default)]
struct HubState {
    identities: IdentityStore,
    contacts: ContactGraph,
    connections: ConnectionRegistry,
    tracking: TrackingSessions,
}

impl HubState {
    /// Contacts of `owner` paired with their live connection, if any.
    fn recipients_of(&self, owner: &UserId) -> Vec<Recipient> {
        self.contacts
            .list(owner)
            .iter()
            .map(|contact| Recipient {
                user_id: contact.clone(),
                conn: self.connections.lookup(contact),
            })
            .collect()
    }

    fn contact_view(&self, id: &UserId) -> Option<ContactView> {
        let user = self.identities.get(id).ok()?;
        Some(ContactView {
            user_id: user.id.clone(),
            name: user.display_name.clone(),
            is_online: self.connections.is_online(id),
        })
    }
}

/// Counters for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub registered_users: usize,
    pub online_users: usize,
    pub active_tracking: usize,
}

pub struct SafetyHub<P> {
    state: RwLock<HubState>,
    dispatcher: Dispatcher<P>,
}

impl<P: Publisher> SafetyHub<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            dispatcher: Dispatcher::new(publisher),
        }
    }

    // -----------------------------------------------------------------------
    // Identity & contacts
    // -----------------------------------------------------------------------

    /// Register a user and give it an empty contact list.
    pub async fn register(&self, id: UserId, display_name: String) -> Result<User> {
        let mut state = self.state.write().await;
        let user = state.identities.register(id, display_name, Utc::now())?;
        state.contacts.insert_owner(user.id.clone());
        drop(state);

        info!(user = %user.id, "User registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: &UserId) -> Result<User> {
        self.state.read().await.identities.get(id).cloned()
    }

    /// User record plus current online status.
    pub async fn public_user(&self, id: &UserId) -> Result<PublicUserView> {
        let state = self.state.read().await;
        let user = state.identities.get(id)?;
        Ok(PublicUserView {
            user_id: user.id.clone(),
            name: user.display_name.clone(),
            created_at: user.created_at,
            last_active: user.last_active_at,
            is_online: state.connections.is_online(id),
        })
    }

    pub async fn add_contact(&self, owner: &UserId, contact: &UserId) -> Result<ContactView> {
        let mut state = self.state.write().await;
        state.contacts.add(owner, contact)?;
        let view = state
            .contact_view(contact)
            .ok_or_else(|| HubError::UnknownUser(contact.clone()))?;
        drop(state);

        info!(owner = %owner, contact = %contact, "Emergency contact added");
        Ok(view)
    }

    /// Contacts in insertion order; empty for unknown users.
    pub async fn list_contacts(&self, owner: &UserId) -> Vec<ContactView> {
        let state = self.state.read().await;
        state
            .contacts
            .list(owner)
            .iter()
            .filter_map(|id| state.contact_view(id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Tracking
    // -----------------------------------------------------------------------

    pub async fn start_tracking(
        &self,
        owner: &UserId,
        duration_seconds: i64,
        location: Option<Location>,
    ) -> Result<TrackingSession> {
        let mut state = self.state.write().await;
        let source = state.identities.get(owner)?.clone();
        let session =
            state
                .tracking
                .start(owner.clone(), duration_seconds, location, Utc::now())?;
        let recipients = state.recipients_of(owner);
        drop(state);

        let report = self.dispatcher.notify(
            &source,
            &recipients,
            Notice::TrackingStarted {
                duration_seconds: session.duration_seconds,
                started_at: session.started_at,
                location: session.location.clone(),
            },
        );
        info!(
            user = %owner,
            duration = session.duration_seconds,
            notified = report.delivered,
            "Tracking started"
        );
        Ok(session)
    }

    /// End tracking for `owner`. Stopping when nothing is active is a silent
    /// no-op and returns `None`.
    pub async fn stop_tracking(&self, owner: &UserId) -> Option<DeliveryReport> {
        let mut state = self.state.write().await;
        state.tracking.stop(owner)?;
        let source = state.identities.get(owner).ok()?.clone();
        let recipients = state.recipients_of(owner);
        drop(state);

        let report = self
            .dispatcher
            .notify(&source, &recipients, Notice::TrackingStopped);
        info!(user = %owner, notified = report.delivered, "Tracking stopped");
        Some(report)
    }

    pub async fn is_tracking(&self, owner: &UserId) -> bool {
        self.state.read().await.tracking.is_active(owner)
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    /// Alert every contact of `owner`. Ends any active tracking session.
    ///
    /// Fails with [`HubError::NoContacts`] when the contact list is empty; in
    /// that case tracking state is left alone.
    pub async fn raise_alert(
        &self,
        owner: &UserId,
        location: Option<Location>,
    ) -> Result<AlertResult> {
        let mut state = self.state.write().await;
        let source = state.identities.get(owner)?.clone();
        let recipients = state.recipients_of(owner);
        if recipients.is_empty() {
            return Err(HubError::NoContacts(owner.clone()));
        }
        let tracking_stopped = state.tracking.stop(owner).is_some();
        drop(state);

        let report =
            self.dispatcher
                .notify(&source, &recipients, Notice::EmergencyAlert { location });
        info!(
            user = %owner,
            contacts = report.total,
            delivered = report.delivered,
            tracking_stopped,
            "Emergency alert raised"
        );

        Ok(AlertResult {
            contacts_total: report.total,
            contacts_delivered: report.delivered,
            tracking_stopped,
        })
    }

    // -----------------------------------------------------------------------
    // Presence channel
    // -----------------------------------------------------------------------

    /// Bind `conn` to `user_id` and announce it to the user's contacts.
    ///
    /// An unknown user gets `authentication_failed` on `conn` and nothing
    /// else changes.
    pub async fn authenticate(&self, conn: ConnectionId, user_id: &UserId) -> Result<DeliveryReport> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        if !state.identities.contains(user_id) {
            drop(state);
            debug!(conn = %conn, user = %user_id, "Authentication rejected");
            self.dispatcher.send_direct(
                conn,
                &PushEvent::AuthenticationFailed(Rejection {
                    error: "Invalid user".to_string(),
                }),
            );
            return Err(HubError::InvalidUser(user_id.clone()));
        }

        let outcome = state.connections.bind(user_id.clone(), conn);
        state.identities.touch(user_id, now);
        let source = state.identities.get(user_id)?.clone();
        let recipients = state.recipients_of(user_id);
        let evicted = match outcome.evicted_user {
            Some(ref evicted) => match state.identities.get(evicted) {
                Ok(user) => Some((user.clone(), state.recipients_of(evicted))),
                Err(_) => None,
            },
            None => None,
        };
        drop(state);

        if let Some(old) = outcome.superseded_conn {
            debug!(user = %user_id, old = %old, new = %conn, "Connection superseded");
        }
        if let Some((previous, previous_recipients)) = evicted {
            info!(user = %previous.id, conn = %conn, "Connection switched user, previous user offline");
            self.dispatcher.notify(&previous, &previous_recipients, Notice::Offline);
        }
        info!(user = %user_id, conn = %conn, "User authenticated");

        self.dispatcher.send_direct(
            conn,
            &PushEvent::Authenticated(Authenticated {
                user_id: user_id.clone(),
                timestamp: now,
            }),
        );
        Ok(self.dispatcher.notify(&source, &recipients, Notice::Online))
    }

    /// Check in with all contacts. Being online is not required.
    pub async fn acknowledge(
        &self,
        user_id: &UserId,
        location: Option<Location>,
    ) -> Result<DeliveryReport> {
        let state = self.state.read().await;
        let source = state
            .identities
            .get(user_id)
            .map_err(|_| HubError::InvalidUser(user_id.clone()))?
            .clone();
        let recipients = state.recipients_of(user_id);
        drop(state);

        Ok(self
            .dispatcher
            .notify(&source, &recipients, Notice::Acknowledged { location }))
    }

    /// Tear down `conn`. Contacts hear `contact_offline` only if this
    /// connection was still the user's current one.
    pub async fn disconnect(&self, conn: ConnectionId) -> Option<DeliveryReport> {
        let mut state = self.state.write().await;
        let Some(user_id) = state.connections.release(conn) else {
            debug!(conn = %conn, "Disconnect of unbound or superseded connection");
            return None;
        };
        let source = state.identities.get(&user_id).ok()?.clone();
        let recipients = state.recipients_of(&user_id);
        drop(state);

        info!(user = %user_id, conn = %conn, "User disconnected");
        Some(self.dispatcher.notify(&source, &recipients, Notice::Offline))
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.state.read().await.connections.is_online(user_id)
    }

    pub async fn lookup(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.state.read().await.connections.lookup(user_id)
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.state.read().await;
        HubStats {
            registered_users: state.identities.len(),
            online_users: state.connections.online_count(),
            active_tracking: state.tracking.active_count(),
        }
    }
}
