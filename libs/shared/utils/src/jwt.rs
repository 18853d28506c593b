use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT secret is not set")]
    MissingSecret,
    #[error("Invalid token format")]
    Malformed,
    #[error("Invalid signature encoding")]
    BadSignatureEncoding,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Invalid claims encoding")]
    BadClaimsEncoding,
    #[error("Invalid claims format")]
    BadClaims,
    #[error("Token expired")]
    Expired,
}

/// Validates an HS256 token against the backend JWT secret and returns the caller.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, TokenError> {
    validate_token_at(token, jwt_secret, Utc::now().timestamp())
}

pub fn validate_token_at(token: &str, jwt_secret: &str, now_ts: i64) -> Result<User, TokenError> {
    if jwt_secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let mut parts = token.split('.');
    let (header_b64, claims_b64, signature_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(s), None) => (h, c, s),
            _ => return Err(TokenError::Malformed),
        };

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        TokenError::BadSignatureEncoding
    })?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| TokenError::MissingSecret)?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err(TokenError::BadSignature);
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| TokenError::BadClaimsEncoding)?;

    let claims: JwtClaims = serde_json::from_slice(&claims_bytes).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        TokenError::BadClaims
    })?;

    if let Some(exp) = claims.exp {
        if (exp as i64) < now_ts {
            debug!("Token expired at {} (now: {})", exp, now_ts);
            return Err(TokenError::Expired);
        }
    }

    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let user = User {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sign_hs256, TestCaller, TEST_JWT_SECRET as SECRET};
    use serde_json::json;

    #[test]
    fn test_valid_token_round_trip() {
        let caller = TestCaller::doctor("doc@example.com");
        let token = caller.token(SECRET);

        let decoded = validate_token(&token, SECRET).unwrap();
        assert_eq!(decoded.id, caller.id);
        assert_eq!(decoded.role.as_deref(), Some("doctor"));
        assert!(decoded.created_at.is_some());
    }

    #[test]
    fn test_rejects_expired_and_tampered_tokens() {
        let caller = TestCaller::patient("pat@example.com");

        let expired = caller.expired_token(SECRET);
        assert_eq!(validate_token(&expired, SECRET).unwrap_err(), TokenError::Expired);

        let wrong = caller.token("wrong-secret");
        assert_eq!(validate_token(&wrong, SECRET).unwrap_err(), TokenError::BadSignature);

        assert!(validate_token("invalid.token.format", SECRET).is_err());
        assert_eq!(validate_token("a.b", SECRET).unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn test_claims_without_expiry_are_accepted() {
        let token = sign_hs256(&json!({ "sub": "service-1" }), SECRET);

        let user = validate_token_at(&token, SECRET, i64::MAX).unwrap();
        assert_eq!(user.id, "service-1");
        assert_eq!(user.created_at, None);
    }

    #[test]
    fn test_missing_secret() {
        assert_eq!(validate_token("a.b.c", "").unwrap_err(), TokenError::MissingSecret);
    }
}
