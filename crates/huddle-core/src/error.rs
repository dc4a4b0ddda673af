use thiserror::Error;

use crate::auth::TokenError;

/// Why a credential was refused. Logged, never shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("no token provided")]
    MissingToken,
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
}

impl From<TokenError> for AuthFailure {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::BadSignature => AuthFailure::BadSignature,
            TokenError::Expired => AuthFailure::Expired,
            TokenError::Malformed | TokenError::Signing => AuthFailure::Malformed,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid project")]
    InvalidRoom,
    #[error("unauthenticated: {0}")]
    Unauthenticated(AuthFailure),
    #[error("revocation store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("project lookup unavailable: {0}")]
    ProjectLookup(String),
}

impl AdmissionError {
    /// Short tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionError::InvalidRoom => "invalid_room",
            AdmissionError::Unauthenticated(_) => "unauthenticated",
            AdmissionError::StoreUnavailable(_) => "store_unavailable",
            AdmissionError::ProjectLookup(_) => "project_lookup",
        }
    }
}
