//! JWT token generation and validation
//!
//! Implements access and refresh tokens with HMAC-SHA256 signing. The two
//! token kinds are signed with distinct secrets and carry a `typ` claim, so a
//! refresh token is never accepted where an access token is expected and vice
//! versa, even if both secrets happen to be equal.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use wayfarer_core::AuthConfig;

/// JWT Claims structure
///
/// Tokens carry only the subject; role and profile are always loaded fresh
/// from the user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: Uuid,
    /// JWT ID - unique per issued token
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Issued at (Unix milliseconds), used by the password freshness check
    pub iat_ms: i64,
    /// Expiration (Unix seconds)
    pub exp: u64,
    /// Token kind, `"access"` or `"refresh"`
    pub typ: TokenKind,
}

/// Which secret and lifetime a token uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT token generation and validation errors
///
/// Messages never include the token, the subject or any credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,
}

/// Claims that survived signature and expiry checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub jti: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl SigningKeys {
    fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }
}

/// Issues and verifies access and refresh tokens
///
/// Built once at startup from [`AuthConfig`] and shared read-only.
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: SigningKeys::new(&config.access_secret, config.access_ttl_secs),
            refresh: SigningKeys::new(&config.refresh_secret, config.refresh_ttl_secs),
            issuer: config.issuer.clone(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of the given token kind in seconds
    pub fn ttl_secs(&self, kind: TokenKind) -> u64 {
        self.keys(kind).ttl_secs
    }

    /// Sign a short-lived access token for `user_id`
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, JwtError> {
        self.issue_at(TokenKind::Access, user_id, Utc::now())
    }

    /// Sign a long-lived refresh token for `user_id`
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, JwtError> {
        self.issue_at(TokenKind::Refresh, user_id, Utc::now())
    }

    /// Sign a token as if issued at `now`
    pub fn issue_at(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        let keys = self.keys(kind);
        let iat = now.timestamp().max(0) as u64;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: user_id,
            jti: Uuid::new_v4().to_string(),
            iat,
            iat_ms: now.timestamp_millis(),
            exp: iat + keys.ttl_secs,
            typ: kind,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }

    /// Verify signature, issuer, expiry and kind of a token
    ///
    /// Signature failures, malformed tokens and a `typ` other than `kind` map
    /// to [`JwtError::InvalidToken`]; a well-signed but expired token maps to
    /// [`JwtError::ExpiredToken`].
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<VerifiedToken, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                _ => JwtError::InvalidToken,
            },
        )?;

        let claims = data.claims;
        if claims.typ != kind {
            return Err(JwtError::InvalidToken);
        }

        let issued_at = Utc
            .timestamp_millis_opt(claims.iat_ms)
            .single()
            .ok_or(JwtError::InvalidToken)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .ok_or(JwtError::InvalidToken)?;

        Ok(VerifiedToken {
            subject: claims.sub,
            issued_at,
            expires_at,
            jti: claims.jti,
        })
    }
}
