use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::models::{AuthenticatedUser, Role};
use crate::error::AppError;

/// Claims carried by an InternConnect session token.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    email: String,
    role: Role,
    iat: i64,
    exp: i64,
}

/// Signs and verifies HS256 session tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Token lifetime, also used as the cookie max-age.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &AuthenticatedUser) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| AppError::Auth(format!("Invalid or expired token: {e}")))?;

        Ok(AuthenticatedUser {
            user_id: data.claims.sub,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn user() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "user-123".to_string(),
            email: "ana@school.edu".to_string(),
            role: Role::Student,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = TokenService::new("test-secret-of-decent-length", 1);
        let token = tokens.issue(&user()).unwrap();
        let verified = tokens.verify(&token).unwrap();
        assert_eq!(verified, user());
    }

    #[test]
    fn test_token_payload_structure() {
        let tokens = TokenService::new("test-secret-of-decent-length", 2);
        let token = tokens.issue(&user()).unwrap();

        // JWT has 3 parts separated by dots
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1])
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).unwrap();
        assert_eq!(payload["sub"], "user-123");
        assert_eq!(payload["role"], "student");
        let lifetime = payload["exp"].as_i64().unwrap() - payload["iat"].as_i64().unwrap();
        assert_eq!(lifetime, 2 * 3600);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenService::new("test-secret-of-decent-length", 1);
        let other = TokenService::new("another-secret-entirely!", 1);
        let token = issuer.issue(&user()).unwrap();
        assert!(matches!(other.verify(&token), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = TokenService::new("test-secret-of-decent-length", -2);
        let token = tokens.issue(&user()).unwrap();
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let tokens = TokenService::new("test-secret-of-decent-length", 1);
        assert!(tokens.verify("not.a.token").is_err());
    }
}
