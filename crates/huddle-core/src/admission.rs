//! One-shot connection admission: project check, then token, then revocation.

use std::sync::Arc;

use huddle_models::message::SenderInfo;

use crate::auth;
use crate::error::{AdmissionError, AuthFailure};
use crate::projects::ProjectDirectory;
use crate::revocation::Revocations;
use crate::rooms::RoomId;

/// What a connecting client presented during the handshake.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Admitted {
    pub identity: SenderInfo,
    pub room: RoomId,
}

pub struct Admission {
    projects: Arc<dyn ProjectDirectory>,
    revocations: Revocations,
    jwt_secret: String,
}

impl Admission {
    pub fn new(
        projects: Arc<dyn ProjectDirectory>,
        revocations: Revocations,
        jwt_secret: impl Into<String>,
    ) -> Self {
        Self {
            projects,
            revocations,
            jwt_secret: jwt_secret.into(),
        }
    }

    pub async fn admit(&self, credentials: &Credentials) -> Result<Admitted, AdmissionError> {
        let project_id = credentials
            .project_id
            .as_deref()
            .ok_or(AdmissionError::InvalidRoom)?;
        if huddle_util::validation::validate_project_id(project_id).is_err() {
            return Err(AdmissionError::InvalidRoom);
        }
        let exists = self
            .projects
            .exists(project_id)
            .await
            .map_err(|e| AdmissionError::ProjectLookup(e.to_string()))?;
        if !exists {
            return Err(AdmissionError::InvalidRoom);
        }

        let token = credentials
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AdmissionError::Unauthenticated(AuthFailure::MissingToken))?;

        let claims = auth::validate_token(token, &self.jwt_secret)
            .map_err(|e| AdmissionError::Unauthenticated(e.into()))?;

        let revoked = self
            .revocations
            .is_revoked(token)
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;
        if revoked {
            return Err(AdmissionError::Unauthenticated(AuthFailure::Revoked));
        }

        Ok(Admitted {
            identity: claims.sender(),
            room: project_id.to_string(),
        })
    }
}
