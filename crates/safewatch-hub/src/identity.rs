//! Registered users.
//!
//! Records are created on registration and never deleted. The store is a
//! plain map; locking is the caller's concern (see [`crate::hub`]).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use safewatch_shared::constants::{MAX_DISPLAY_NAME_LEN, MAX_USER_ID_LEN};
use safewatch_shared::UserId;

use crate::error::{HubError, Result};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every successful authentication.
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct IdentityStore {
    users: HashMap<UserId, User>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user. Fails if `id` is taken; the existing record is left
    /// untouched.
    pub fn register(
        &mut self,
        id: UserId,
        display_name: String,
        now: DateTime<Utc>,
    ) -> Result<User> {
        validate(&id, &display_name)?;
        if self.users.contains_key(&id) {
            return Err(HubError::DuplicateId(id));
        }

        let user = User {
            id: id.clone(),
            display_name,
            created_at: now,
            last_active_at: now,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    pub fn get(&self, id: &UserId) -> Result<&User> {
        self.users
            .get(id)
            .ok_or_else(|| HubError::UnknownUser(id.clone()))
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.users.contains_key(id)
    }

    /// Set `last_active_at`. No-op for unknown ids.
    pub fn touch(&mut self, id: &UserId, now: DateTime<Utc>) {
        if let Some(user) = self.users.get_mut(id) {
            user.last_active_at = now;
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn validate(id: &UserId, display_name: &str) -> Result<()> {
    if id.is_empty() {
        return Err(HubError::InvalidInput("userId is required".into()));
    }
    if display_name.trim().is_empty() {
        return Err(HubError::InvalidInput("name is required".into()));
    }
    if id.as_str().len() > MAX_USER_ID_LEN {
        return Err(HubError::InvalidInput(format!(
            "userId longer than {MAX_USER_ID_LEN} bytes"
        )));
    }
    if display_name.len() > MAX_DISPLAY_NAME_LEN {
        return Err(HubError::InvalidInput(format!(
            "name longer than {MAX_DISPLAY_NAME_LEN} bytes"
        )));
    }
    Ok(())
}
