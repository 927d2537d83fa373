//! `X-Auth` token verification
//!
//! Tokens are HS256-signed JWTs. The claims carry the caller's `username`,
//! the token `version` and an `exp` NumericDate.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::handlers::ApiError;
use crate::AppState;

/// Header carrying the caller's token
pub const AUTH_HEADER: &str = "X-Auth";

/// Only tokens of this version are accepted
pub const TOKEN_VERSION: u32 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("No X-Auth token supplied")]
    Missing,

    #[error("Malformed auth token")]
    Malformed,

    #[error("Invalid auth token signature")]
    BadSignature,

    #[error("Auth token expired")]
    Expired,

    #[error("Unsupported token version {0}")]
    WrongVersion(u32),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            message: self.to_string(),
        }
        .into_response()
    }
}

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub version: u32,
    /// Seconds since the epoch, possibly fractional
    pub exp: f64,
}

/// Signs and verifies tokens with one shared secret
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for `username` valid for `ttl`
    pub fn issue(&self, username: &str, ttl: Duration) -> jsonwebtoken::errors::Result<String> {
        let claims = Claims {
            username: username.to_string(),
            version: TOKEN_VERSION,
            exp: (Utc::now() + ttl).timestamp() as f64,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Check the signature, expiry and version of `token`
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            })?;

        if data.claims.version != TOKEN_VERSION {
            return Err(AuthError::WrongVersion(data.claims.version));
        }

        Ok(data.claims)
    }
}

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTH_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::Missing)?;

        let claims = state.verifier.verify(token)?;
        Ok(AuthUser {
            username: claims.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(b"s3cret")
    }

    fn sign(verifier: &TokenVerifier, claims: Value) -> String {
        jsonwebtoken::encode(&Header::default(), &claims, &verifier.encoding).unwrap()
    }

    fn in_five_minutes() -> i64 {
        Utc::now().timestamp() + 300
    }

    #[test]
    fn test_issued_token_verifies() {
        let token = verifier().issue("alice", Duration::minutes(5)).unwrap();
        let claims = verifier().verify(&token).unwrap();

        assert_eq!(claims.username, "alice");
        assert_eq!(claims.version, TOKEN_VERSION);
    }

    #[test]
    fn test_fractional_expiry_accepted() {
        let verifier = verifier();
        let token = sign(
            &verifier,
            json!({"username": "alice", "version": 2, "exp": in_five_minutes() as f64 + 0.5}),
        );

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = TokenVerifier::new(b"other")
            .issue("alice", Duration::minutes(5))
            .unwrap();
        assert_eq!(verifier().verify(&token).unwrap_err(), AuthError::BadSignature);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = verifier().issue("alice", Duration::seconds(-10)).unwrap();
        assert_eq!(verifier().verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_spliced_payload_rejected() {
        let alice = verifier().issue("alice", Duration::minutes(5)).unwrap();
        let bob = verifier().issue("bob", Duration::minutes(5)).unwrap();
        let alice: Vec<&str> = alice.split('.').collect();
        let bob: Vec<&str> = bob.split('.').collect();

        let spliced = format!("{}.{}.{}", alice[0], bob[1], alice[2]);
        assert_eq!(
            verifier().verify(&spliced).unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(verifier().verify("").unwrap_err(), AuthError::Malformed);
        assert_eq!(verifier().verify("a.b").unwrap_err(), AuthError::Malformed);
        assert_eq!(verifier().verify("a.b.c.d").unwrap_err(), AuthError::Malformed);
    }

    #[test]
    fn test_missing_claims_rejected() {
        let verifier = verifier();

        let no_expiry = sign(&verifier, json!({"username": "alice", "version": 2}));
        assert_eq!(verifier.verify(&no_expiry).unwrap_err(), AuthError::Malformed);

        let no_version = sign(&verifier, json!({"username": "alice", "exp": in_five_minutes()}));
        assert_eq!(verifier.verify(&no_version).unwrap_err(), AuthError::Malformed);
    }

    #[test]
    fn test_wrong_version_rejected() {
        let verifier = verifier();
        let token = sign(
            &verifier,
            json!({"username": "alice", "version": 1, "exp": in_five_minutes()}),
        );
        assert_eq!(verifier.verify(&token).unwrap_err(), AuthError::WrongVersion(1));
    }
}
