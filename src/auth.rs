//! Admin/WS auth (§4.7 handshake, §4.9 `/api/admin/auth`): JWT issuance
//! and verification plus bcrypt password checking. A JWT is required to
//! join the `gm` room over the WebSocket Router and to call any
//! `/api/admin/*` HTTP route.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const MAX_TOKEN_AGE: Duration = Duration::hours(24);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Always `"admin"` today; kept as a string so device-scoped tokens
    /// can reuse the same envelope later without a breaking change.
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthService {
    secret: String,
    /// bcrypt hash of the configured admin password, computed once at
    /// startup whether the config held a hash already or a plaintext
    /// password (detected by the `$2` prefix).
    admin_hash: String,
}

impl AuthService {
    pub fn new(jwt_secret: &str, admin_password: &str) -> AppResult<Self> {
        let admin_hash = if admin_password.starts_with("$2") {
            admin_password.to_string()
        } else {
            bcrypt::hash(admin_password, bcrypt::DEFAULT_COST)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash admin password: {e}")))?
        };
        Ok(Self {
            secret: jwt_secret.to_string(),
            admin_hash,
        })
    }

    pub fn verify_admin_password(&self, candidate: &str) -> bool {
        bcrypt::verify(candidate, &self.admin_hash).unwrap_or(false)
    }

    pub fn issue_admin_token(&self) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: "admin".to_string(),
            role: "gm".to_string(),
            iat: now.timestamp(),
            exp: (now + MAX_TOKEN_AGE).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign jwt: {e}")))
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let auth = AuthService::new("test-secret", "changeme").unwrap();
        let token = auth.issue_admin_token().unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.role, "gm");
    }

    #[test]
    fn wrong_password_is_rejected() {
        let auth = AuthService::new("test-secret", "changeme").unwrap();
        assert!(auth.verify_admin_password("changeme"));
        assert!(!auth.verify_admin_password("wrong"));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = AuthService::new("test-secret", "changeme").unwrap();
        let mut token = auth.issue_admin_token().unwrap();
        token.push('x');
        let err = auth.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn pre_hashed_admin_password_is_accepted_as_is() {
        let hash = bcrypt::hash("s3cret", bcrypt::DEFAULT_COST).unwrap();
        let auth = AuthService::new("test-secret", &hash).unwrap();
        assert!(auth.verify_admin_password("s3cret"));
    }
}
