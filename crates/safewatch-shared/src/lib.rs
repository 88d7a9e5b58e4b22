pub mod constants;
pub mod error;
pub mod events;
pub mod types;
pub mod views;

pub use error::ProtocolError;
pub use types::{ConnectionId, Location, UserId};
