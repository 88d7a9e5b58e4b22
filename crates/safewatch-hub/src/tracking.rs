//! Per-user safety-tracking sessions.
//!
//! Last start wins; there is no queueing. Sessions are never expired here,
//! they end on an explicit stop or when an alert is raised.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use safewatch_shared::{Location, UserId};

use crate::error::{HubError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub owner: UserId,
    pub duration_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub location: Option<Location>,
    pub active: bool,
}

impl TrackingSession {
    /// When the user expects to check in by.
    pub fn ends_at(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.duration_seconds).unwrap_or(i64::MAX);
        Duration::try_seconds(secs)
            .and_then(|d| self.started_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Default)]
pub struct TrackingSessions {
    sessions: HashMap<UserId, TrackingSession>,
}

impl TrackingSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) tracking for `owner`, replacing any current
    /// session. The caller checks that `owner` is registered.
    pub fn start(
        &mut self,
        owner: UserId,
        duration_seconds: i64,
        location: Option<Location>,
        now: DateTime<Utc>,
    ) -> Result<TrackingSession> {
        let duration_seconds = u64::try_from(duration_seconds)
            .ok()
            .filter(|d| *d > 0)
            .ok_or(HubError::InvalidDuration(duration_seconds))?;

        let session = TrackingSession {
            owner: owner.clone(),
            duration_seconds,
            started_at: now,
            location,
            active: true,
        };
        self.sessions.insert(owner, session.clone());
        Ok(session)
    }

    /// End the session for `owner`, returning it if there was one.
    pub fn stop(&mut self, owner: &UserId) -> Option<TrackingSession> {
        self.sessions.remove(owner).map(|mut session| {
            session.active = false;
            session
        })
    }

    pub fn get(&self, owner: &UserId) -> Option<&TrackingSession> {
        self.sessions.get(owner)
    }

    pub fn is_active(&self, owner: &UserId) -> bool {
        self.sessions.contains_key(owner)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_stop() {
        let mut tracking = TrackingSessions::new();
        let alice = UserId::from("alice");
        let now = Utc::now();

        let session = tracking.start(alice.clone(), 300, None, now).unwrap();
        assert!(session.active);
        assert_eq!(session.ends_at(), now + Duration::seconds(300));
        assert!(tracking.is_active(&alice));

        let stopped = tracking.stop(&alice).unwrap();
        assert!(!stopped.active);
        assert!(!tracking.is_active(&alice));
        assert!(tracking.stop(&alice).is_none());
    }

    #[test]
    fn test_last_start_wins() {
        let mut tracking = TrackingSessions::new();
        let alice = UserId::from("alice");
        tracking.start(alice.clone(), 300, None, Utc::now()).unwrap();
        tracking.start(alice.clone(), 60, None, Utc::now()).unwrap();

        assert_eq!(tracking.get(&alice).unwrap().duration_seconds, 60);
        assert_eq!(tracking.active_count(), 1);
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        let mut tracking = TrackingSessions::new();
        let alice = UserId::from("alice");
        tracking.start(alice.clone(), 300, None, Utc::now()).unwrap();

        for bad in [0, -5] {
            assert_eq!(
                tracking.start(alice.clone(), bad, None, Utc::now()).unwrap_err(),
                HubError::InvalidDuration(bad)
            );
        }
        // the existing session survives a rejected restart
        assert_eq!(tracking.get(&alice).unwrap().duration_seconds, 300);
    }
}
