use safewatch_shared::UserId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("User not found: {0}")]
    UnknownUser(UserId),

    #[error("User ID already exists: {0}")]
    DuplicateId(UserId),

    #[error("{contact} is already a contact of {owner}")]
    AlreadyExists { owner: UserId, contact: UserId },

    #[error("Invalid duration: {0} (must be a positive number of seconds)")]
    InvalidDuration(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No emergency contacts configured for {0}")]
    NoContacts(UserId),

    /// Presence-channel authentication for an unregistered user.
    #[error("Invalid user: {0}")]
    InvalidUser(UserId),
}

/// Coarse error classes front-ends map onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Precondition,
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownUser(_) | Self::InvalidUser(_) => ErrorKind::NotFound,
            Self::DuplicateId(_) | Self::AlreadyExists { .. } => ErrorKind::Conflict,
            Self::InvalidDuration(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NoContacts(_) => ErrorKind::Precondition,
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
