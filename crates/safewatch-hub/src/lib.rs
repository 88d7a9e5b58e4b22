//! # safewatch-hub
//!
//! In-memory presence and safety-notification core.
//!
//! The hub owns four stores and mutates them only through its own
//! operations:
//! - **Identity store**: registered users
//! - **Contact graph**: directed owner -> emergency contact edges
//! - **Connection registry**: which connection, if any, each user is on
//! - **Tracking sessions**: at most one active session per user
//!
//! Events are pushed to contacts through a [`Publisher`], so the core never
//! depends on a concrete transport.

pub mod connections;
pub mod contacts;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod identity;
pub mod tracking;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use dispatcher::{AlertResult, DeliveryError, DeliveryReport, Dispatcher, Notice, Publisher};
pub use error::{ErrorKind, HubError, Result};
pub use hub::{HubStats, SafetyHub};
pub use identity::User;
pub use tracking::TrackingSession;
