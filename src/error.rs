//! Error taxonomy for the core library.
//!
//! Every operation distinguishes caller mistakes (validation), missing
//! entities, ownership violations, scheduling conflicts, and broken internal
//! links (misconfiguration). The CLI layer maps these onto user-facing
//! messages via anyhow.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input. Nothing was mutated.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} #{id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// No local user for the identity the caller presented.
    #[error("no user registered for identity '{0}'")]
    UnknownIdentity(String),

    /// Caller lacks the required role or ownership.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Someone else already holds this; the caller may pick another slot.
    #[error("{0}")]
    Conflict(String),

    /// The tutor already holds an overlapping session.
    #[error("tutor already has a session at this time (session #{session_id})")]
    Overlap { session_id: i64 },

    /// A broken internal link, e.g. an availability whose tutor profile
    /// points at a missing user. Should alert operators.
    #[error("misconfiguration: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Error::NotFound { entity, id }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Error::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Error::Misconfigured(msg.into())
    }

    /// True for the "someone else already has this" family.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Overlap { .. })
    }
}
