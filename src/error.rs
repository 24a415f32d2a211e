use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::quota::QuotaTier;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not authenticated: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Habit limit reached: the {tier} plan allows at most {limit} habits")]
    QuotaExceeded { tier: QuotaTier, limit: usize },

    #[error("A toggle for habit {habit_id} on {date} is already in flight")]
    Conflict { habit_id: String, date: NaiveDate },

    #[error("Habit not found: {0}")]
    NotFound(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures of the remote collaborator, which trigger rollback.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Sync(_) | Error::Network(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
