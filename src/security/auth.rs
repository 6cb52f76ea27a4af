//! Token Module
//!
//! JWT issuance and verification for the four token kinds the API uses:
//! access, refresh, email verification and password reset.

use chrono::{Duration, Utc};
use derive_more::Display;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::config::SecurityConfig;
use crate::error::{AppError, Result};

/// Kind of token, carried in the claims so tokens cannot be swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    #[display("access")]
    Access,
    #[display("refresh")]
    Refresh,
    #[display("email_verification")]
    EmailVerification,
    #[display("password_reset")]
    PasswordReset,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user ID, or email for email verification / password reset
    pub sub: String,
    pub token_type: TokenType,
    pub exp: usize,
    pub iat: usize,
    pub nbf: usize,
    pub iss: String,
    /// Unique token ID
    pub jti: String,
}

impl Claims {
    fn new(sub: &str, token_type: TokenType, ttl: Duration, issuer: &str) -> Self {
        let now = Utc::now();
        let iat = now.timestamp() as usize;
        Self {
            sub: sub.to_string(),
            token_type,
            exp: (now + ttl).timestamp() as usize,
            iat,
            nbf: iat,
            iss: issuer.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// Access + refresh token pair returned by register, login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues and verifies JWTs (HS256).
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expire_days),
        }
    }

    fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
            TokenType::EmailVerification => Duration::hours(24),
            TokenType::PasswordReset => Duration::hours(1),
        }
    }

    /// Issue a token of the given kind for `subject`.
    pub fn issue(&self, subject: &str, token_type: TokenType) -> Result<String> {
        let claims = Claims::new(subject, token_type, self.ttl(token_type), &self.issuer);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    pub fn issue_pair(&self, user_id: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenType::Access)?,
            refresh_token: self.issue(user_id, TokenType::Refresh)?,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Verify signature, expiry, issuer and token kind.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;
        if claims.token_type != expected {
            return Err(AppError::Authentication(format!(
                "Expected {} token, got {}",
                expected, claims.token_type
            )));
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SecurityConfig {
        SecurityConfig {
            secret_key: "test-secret-key-that-is-at-least-32-chars".into(),
            ..SecurityConfig::default()
        }
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let service = TokenService::new(&config());
        let token = service.issue("user-1", TokenType::Access).unwrap();
        let claims = service.verify(&token, TokenType::Access).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.iss, "scholarly");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn test_token_type_is_enforced() {
        let service = TokenService::new(&config());
        let refresh = service.issue("user-1", TokenType::Refresh).unwrap();

        let err = service.verify(&refresh, TokenType::Access).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
        assert!(service.verify(&refresh, TokenType::Refresh).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = TokenService::new(&SecurityConfig {
            access_token_expire_minutes: -5,
            ..config()
        });
        let token = service.issue("user-1", TokenType::Access).unwrap();
        assert!(service.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let ours = TokenService::new(&config());
        let theirs = TokenService::new(&SecurityConfig {
            secret_key: "another-secret-key-that-is-32-chars-long".into(),
            ..config()
        });
        let token = theirs.issue("user-1", TokenType::Access).unwrap();
        assert!(ours.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_token_pair() {
        let pair = TokenService::new(&config()).issue_pair("user-1").unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_eq!(pair.expires_in, 1800);
        assert_ne!(pair.access_token, pair.refresh_token);
    }
}
