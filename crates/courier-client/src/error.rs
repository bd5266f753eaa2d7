use std::path::PathBuf;

use courier_shared::constants::MESSAGE_CHARACTER_LIMIT;
use courier_store::StoreError;
use thiserror::Error;

/// Rejected user input. `Display` is the message shown to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message text cannot be empty")]
    EmptyText,

    #[error("Message is {len} characters long (max {MESSAGE_CHARACTER_LIMIT})")]
    TextTooLong { len: usize },

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Tag cannot be empty")]
    EmptyTag,

    #[error("Invalid tag '{0}': use letters, digits, '_', '-' or '.'")]
    MalformedTag(String),

    #[error("Tag '{0}' is already taken")]
    DuplicateTag(String),

    #[error("No user with tag '{0}'")]
    UnknownTag(String),

    #[error("Wrong password")]
    WrongPassword,

    #[error("You must be logged in")]
    NotConnected,

    #[error("You cannot follow yourself")]
    SelfFollow,

    #[error("You already follow '{0}'")]
    AlreadyFollowing(String),

    #[error("You do not follow '{0}'")]
    NotFollowing(String),

    #[error("Unknown user")]
    UnknownUser,

    #[error("'{}' is not a readable and writable directory", .0.display())]
    InvalidDirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Store(StoreError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
