//! Read-only projections returned to front-ends.
//!
//! Online status is not part of a stored record; it is resolved from the
//! live connection registry at the moment the view is built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// A user as seen by other clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserView {
    pub user_id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub is_online: bool,
}

/// One entry of a user's emergency contact list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub user_id: UserId,
    pub name: String,
    pub is_online: bool,
}
