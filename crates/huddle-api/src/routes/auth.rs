use axum::{extract::State, http::header, response::IntoResponse, Json};
use chrono::Utc;
use huddle_core::auth::{remaining_lifetime, validate_token};
use huddle_core::AppState;
use serde_json::json;

use crate::error::ApiError;
use crate::middleware::{SessionToken, TOKEN_COOKIE_NAME};

/// Revoke the presented token for the rest of its lifetime and clear the
/// token cookie.
pub async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    let claims = validate_token(&token, &state.config.jwt_secret)?;
    let ttl = remaining_lifetime(&claims, Utc::now().timestamp());
    let stored = state.revocations.revoke(&token, ttl).await?;
    tracing::info!(user_id = %claims.sub, ttl, stored, "token revoked");
    let clear_cookie = format!("{TOKEN_COOKIE_NAME}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0");
    Ok((
        [(header::SET_COOKIE, clear_cookie)],
        Json(json!({ "message": "Logged out successfully" })),
    ))
}
