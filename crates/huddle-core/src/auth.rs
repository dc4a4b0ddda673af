use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use huddle_models::message::SenderInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token could not be signed")]
    Signing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// The identity messages from this session are attributed to.
    pub fn sender(&self) -> SenderInfo {
        let label = self.email.clone().unwrap_or_else(|| self.sub.clone());
        SenderInfo::new(self.sub.clone(), label)
    }
}

pub fn create_token(
    subject: &str,
    email: Option<&str>,
    secret: &str,
    expiry_secs: u64,
) -> Result<String, TokenError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        email: email.map(str::to_string),
        iat: now,
        exp: now + expiry_secs as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Signing)
}

/// Checks signature first, then expiry, with no leeway.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    })
}

/// Seconds until the token's natural expiry, clamped at zero.
pub fn remaining_lifetime(claims: &Claims, now: i64) -> u64 {
    (claims.exp - now).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-0123456789abcdef";

    fn sign_raw(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_round_trips_claims() {
        let token = create_token("u1", Some("u1@example.com"), SECRET, 300).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.sender(), SenderInfo::new("u1", "u1@example.com"));
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn label_falls_back_to_subject() {
        let token = create_token("u2", None, SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sender().label, "u2");
    }

    #[test]
    fn expired_but_well_signed_is_expired() {
        let now = chrono::Utc::now().timestamp();
        let token = sign_raw(
            &Claims {
                sub: "u1".into(),
                email: None,
                iat: now - 600,
                exp: now - 10,
            },
            SECRET,
        );
        assert_eq!(validate_token(&token, SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn signature_is_checked_before_expiry() {
        let now = chrono::Utc::now().timestamp();
        let token = sign_raw(
            &Claims {
                sub: "u1".into(),
                email: None,
                iat: now - 600,
                exp: now - 10,
            },
            "some-other-secret-that-is-long-enough",
        );
        assert_eq!(validate_token(&token, SECRET), Err(TokenError::BadSignature));
    }

    #[test]
    fn tampered_payload_is_bad_signature() {
        let token = create_token("u1", None, SECRET, 300).unwrap();
        let forged = create_token("admin", None, SECRET, 300).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        parts[1] = forged_parts[1];
        let tampered = parts.join(".");
        assert_eq!(validate_token(&tampered, SECRET), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(validate_token("not-a-jwt", SECRET), Err(TokenError::Malformed));
        assert_eq!(validate_token("", SECRET), Err(TokenError::Malformed));
    }

    #[test]
    fn remaining_lifetime_clamps_at_zero() {
        let claims = Claims {
            sub: "u1".into(),
            email: None,
            iat: 0,
            exp: 1_000,
        };
        assert_eq!(remaining_lifetime(&claims, 700), 300);
        assert_eq!(remaining_lifetime(&claims, 1_000), 0);
        assert_eq!(remaining_lifetime(&claims, 5_000), 0);
    }
}
