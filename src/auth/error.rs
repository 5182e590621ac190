//! Typed outcomes for every auth operation.
//!
//! Infrastructure failures (store, hashing) are carried as `Internal` and are
//! never reported to clients in detail.

use thiserror::Error;

use super::policy::PolicyViolation;

#[derive(Debug, Error)]
pub enum LoginError {
    /// Unknown email or wrong password. Deliberately indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("too many login attempts, try again later")]
    TooManyAttempts,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("account has no password set")]
    NoPasswordSet,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Why a presented session token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid session token")]
    Invalid,
    #[error("session token expired")]
    Expired,
    #[error("session revoked")]
    Revoked,
}

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("invalid or expired reset link")]
    InvalidToken,
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("admin role required")]
    Forbidden,
    #[error("user not found")]
    NotFound,
    #[error("{0}")]
    Blocked(&'static str),
    #[error("invalid email")]
    InvalidEmail,
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
