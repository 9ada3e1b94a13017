use thiserror::Error;

use crate::reply::PurgeReply;

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("bad request: {reason}")]
    BadRequest { reason: String },
    #[error("not found: {what}")]
    NotFound { what: String },
    #[error("resource exhausted: requested {requested} bytes, {available} available")]
    ResourceExhausted { requested: usize, available: usize },
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl PurgeError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// The canned reply a client receives for this failure.
    pub fn reply(&self) -> PurgeReply {
        match self {
            Self::BadRequest { .. } => PurgeReply::BadRequest,
            Self::NotFound { .. } => PurgeReply::NotFound,
            Self::ResourceExhausted { .. } | Self::Internal { .. } => PurgeReply::ServerError,
        }
    }
}

pub type Result<T> = std::result::Result<T, PurgeError>;
