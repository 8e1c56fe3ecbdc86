//! Session management
//!
//! Sessions are HMAC-signed bearer tokens minted by the account system
//! that owns billing. No server-side session storage needed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::data::PlanTier;

/// Account session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Account the request acts for
    pub account_id: String,
    /// Plan tier name; unknown names fall back to the free tier
    pub plan: String,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(account_id: impl Into<String>, plan: PlanTier, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            account_id: account_id.into(),
            plan: plan.as_str().to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn plan_tier(&self) -> PlanTier {
        PlanTier::parse(&self.plan)
    }

    /// Check if session is expired, or older than `max_age` seconds
    pub fn is_expired(&self, max_age: i64) -> bool {
        let now = Utc::now();
        self.expires_at < now || self.created_at + Duration::seconds(max_age) < now
    }
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
pub fn create_session_token(
    session: &Session,
    secret: &str,
) -> Result<String, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let payload =
        serde_json::to_string(session).map_err(|e| crate::error::AppError::Internal(e.into()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// # Errors
/// `InvalidSignature` for a tampered token, `Unauthorized` for anything
/// malformed or expired.
pub fn verify_session_token(
    token: &str,
    secret: &str,
    max_age: i64,
) -> Result<Session, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let (payload_b64, signature_b64) = token
        .split_once('.')
        .ok_or(crate::error::AppError::Unauthorized)?;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| crate::error::AppError::InvalidSignature)?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    let session: Session =
        serde_json::from_slice(&payload_bytes).map_err(|_| crate::error::AppError::Unauthorized)?;

    if session.account_id.trim().is_empty() || session.is_expired(max_age) {
        return Err(crate::error::AppError::Unauthorized);
    }

    Ok(session)
}
