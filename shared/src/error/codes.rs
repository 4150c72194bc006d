//! Unified error codes
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Audit pipeline errors
//! - 3xxx: Realtime gateway errors
//! - 9xxx: System errors

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Serialized as its `u16` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,

    // ==================== 1xxx: Auth ====================
    /// No credential presented
    NotAuthenticated = 1001,
    /// Token is invalid
    TokenInvalid = 1004,
    /// Verifier failed while checking the token
    AuthenticationFailed = 1007,

    // ==================== 2xxx: Audit ====================
    /// Category/action combination outside the closed set
    InvalidAuditAction = 2001,
    /// System entries must not carry an actor
    ActorNotAllowed = 2002,

    // ==================== 3xxx: Realtime ====================
    /// Gateway is shutting down
    GatewayClosed = 3001,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9002,
    /// Timed out waiting on a dependency
    Timeout = 9003,
}

impl ErrorCode {
    /// Numeric code value
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Default human-readable message
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ValidationFailed => "Validation failed",
            Self::NotAuthenticated => "Authentication token required",
            Self::TokenInvalid => "Invalid authentication token",
            Self::AuthenticationFailed => "Authentication failed",
            Self::InvalidAuditAction => "Invalid audit category/action combination",
            Self::ActorNotAllowed => "System entries cannot carry an actor",
            Self::GatewayClosed => "Realtime gateway is shut down",
            Self::DatabaseError => "Database error",
            Self::Timeout => "Operation timed out",
        }
    }

    /// HTTP status for this code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::ValidationFailed
            | Self::InvalidAuditAction
            | Self::ActorNotAllowed => StatusCode::BAD_REQUEST,
            Self::NotAuthenticated | Self::TokenInvalid | Self::AuthenticationFailed => {
                StatusCode::UNAUTHORIZED
            }
            Self::GatewayClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// System errors are logged when turned into a response
    pub fn is_system(&self) -> bool {
        self.code() >= 9000
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

/// Error returned when converting an unknown `u16`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            2 => Ok(Self::ValidationFailed),
            1001 => Ok(Self::NotAuthenticated),
            1004 => Ok(Self::TokenInvalid),
            1007 => Ok(Self::AuthenticationFailed),
            2001 => Ok(Self::InvalidAuditAction),
            2002 => Ok(Self::ActorNotAllowed),
            3001 => Ok(Self::GatewayClosed),
            9002 => Ok(Self::DatabaseError),
            9003 => Ok(Self::Timeout),
            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
