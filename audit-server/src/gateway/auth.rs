//! Handshake authentication
//!
//! Credentials come from the `token` query parameter (browsers cannot set
//! headers on a WebSocket upgrade) or an `Authorization: Bearer` header.
//! Verification is delegated to a [`TokenVerifier`].

use async_trait::async_trait;
use axum::response::IntoResponse;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::error::BoxError;

/// Verified identity bound to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Token verification collaborator.
///
/// `Ok(None)` means the token was checked and rejected; `Err` means the
/// verifier itself failed.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Option<Principal>, BoxError>;
}

/// Handshake refusal, one per rejection path
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Authentication token required")]
    MissingToken,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Authentication failed")]
    VerifierFailed,
}

impl HandshakeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingToken => ErrorCode::NotAuthenticated,
            Self::InvalidToken => ErrorCode::TokenInvalid,
            Self::VerifierFailed => ErrorCode::AuthenticationFailed,
        }
    }
}

impl From<HandshakeError> for AppError {
    fn from(e: HandshakeError) -> Self {
        AppError::with_message(e.code(), e.to_string())
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> axum::response::Response {
        AppError::from(self).into_response()
    }
}

/// Query parameter first, then the bearer header. Blank values count as absent.
pub fn extract_credential(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    let from_query = query_token.map(str::trim).filter(|t| !t.is_empty());
    let from_header = || {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    };
    from_query.or_else(from_header).map(str::to_string)
}

/// Run the three-way handshake check
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    credential: Option<&str>,
) -> Result<Principal, HandshakeError> {
    let token = credential.ok_or(HandshakeError::MissingToken)?;
    match verifier.verify(token).await {
        Ok(Some(principal)) => Ok(principal),
        Ok(None) => Err(HandshakeError::InvalidToken),
        Err(e) => {
            tracing::warn!(error = %e, "Token verifier failed during handshake");
            Err(HandshakeError::VerifierFailed)
        }
    }
}

/// JWT claims carried by gateway tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayClaims {
    /// Principal ID
    pub sub: String,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

const JWT_EXPIRY_HOURS: i64 = 24;

/// HS256 verifier with `sub` as the principal id
#[derive(Clone)]
pub struct JwtTokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl std::fmt::Debug for JwtTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenVerifier").finish_non_exhaustive()
    }
}

impl JwtTokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for `principal_id` (tooling and tests)
    pub fn create_token(&self, principal_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let claims = GatewayClaims {
            sub: principal_id.to_string(),
            exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Option<Principal>, BoxError> {
        match jsonwebtoken::decode::<GatewayClaims>(token, &self.decoding, &Validation::default()) {
            Ok(data) => Ok(Some(Principal::new(data.claims.sub))),
            Err(e) => match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::ExpiredSignature
                | ErrorKind::ImmatureSignature
                | ErrorKind::InvalidAudience
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidSubject
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => {
                    tracing::debug!("Gateway JWT rejected: {e}");
                    Ok(None)
                }
                _ => Err(e.into()),
            },
        }
    }
}
