//! Fixtures for tests across the workspace: a wired config, signed callers and
//! backend rows shaped like the hosted REST API returns them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{JwtClaims, User};

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";

/// Fast timeouts and a four-seat room cap, pointed at a local backend.
pub fn test_config() -> AppConfig {
    test_config_for("http://localhost:54321")
}

/// Same as `test_config`, but talking to `backend_url` (usually a wiremock server).
pub fn test_config_for(backend_url: impl Into<String>) -> AppConfig {
    AppConfig {
        supabase_url: backend_url.into(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: TEST_JWT_SECRET.to_string(),
        realtime_connect_timeout_secs: 1,
        realtime_max_subscribers_per_room: 4,
        realtime_reconnect_max_attempts: 3,
        realtime_reconnect_backoff_ms: 1,
        ..AppConfig::default()
    }
}

/// A consultation participant with a fresh id.
#[derive(Debug, Clone)]
pub struct TestCaller {
    pub id: String,
    pub email: String,
    pub role: &'static str,
}

impl TestCaller {
    pub fn doctor(email: &str) -> Self {
        Self::with_role(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::with_role(email, "patient")
    }

    fn with_role(email: &str, role: &'static str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role,
        }
    }

    pub fn user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.to_string()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    /// Bearer token valid for a day.
    pub fn token(&self, secret: &str) -> String {
        self.token_expiring_in(secret, Duration::hours(24))
    }

    pub fn expired_token(&self, secret: &str) -> String {
        self.token_expiring_in(secret, Duration::hours(-1))
    }

    pub fn token_expiring_in(&self, secret: &str, lifetime: Duration) -> String {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: self.id.clone(),
            exp: Some((now + lifetime).timestamp().max(0) as u64),
            email: Some(self.email.clone()),
            role: Some(self.role.to_string()),
            user_metadata: None,
            aud: Some("authenticated".to_string()),
            iat: Some(now.timestamp() as u64),
        };
        sign_hs256(&json!(claims), secret)
    }
}

/// Encodes `claims` as a compact HS256 JWT.
pub fn sign_hs256(claims: &Value, secret: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "HS256", "typ": "JWT" }).to_string());
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{}.{}", header, body);

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(signing_input.as_bytes());

    format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    )
}

/// One `consultations` row; 30 minutes long, no notes or summary.
pub fn consultation_row(
    id: Uuid,
    patient_id: &str,
    doctor_id: &str,
    date: &str,
    time: &str,
    status: &str,
) -> Value {
    json!({
        "id": id,
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "scheduled_date": date,
        "scheduled_time": time,
        "duration_minutes": 30,
        "status": status,
        "notes": null,
        "summary": null,
        "created_at": "2025-01-06T08:00:00Z",
        "updated_at": "2025-01-06T08:00:00Z"
    })
}

/// PostgREST error body.
pub fn backend_error(message: &str, code: &str) -> Value {
    json!({ "message": message, "code": code })
}
