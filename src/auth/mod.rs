//! Authentication core: credentials, sessions, password recovery and admin
//! account management.
//!
//! `AuthService` is the single entry point. It owns no global state; the
//! store, clock, email sender and signing key are injected, and every
//! operation that records the caller takes an explicit `RequestContext`.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

pub mod admin;
pub mod clock;
pub mod config;
pub mod email;
pub mod error;
pub mod guard;
pub mod login;
pub mod password;
pub mod policy;
pub mod rate_limit;
pub mod reset;
pub mod session;
pub mod store;
pub mod token;
pub mod types;
pub mod utils;

pub use admin::{AdminUserUpdate, NewAccount};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use email::{EmailMessage, EmailSender, LogEmailSender};
pub use error::{AdminError, LoginError, ResetError, SessionError};
pub use guard::GuardDecision;
pub use login::LoginSuccess;
pub use password::PasswordHasher;
pub use policy::{PolicyRule, PolicyViolation};
pub use rate_limit::LoginRateLimiter;
pub use reset::ResetRequestOutcome;
pub use session::{IssuedSession, Principal};
pub use store::{AuthStore, MemoryStore, PgStore};
pub use token::{SessionClaims, TokenSigner, TokenVerifier};
pub use types::{RequestContext, Role, User};

pub struct AuthService {
    config: AuthConfig,
    store: Arc<dyn AuthStore>,
    email: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
    signer: TokenSigner,
    verifier: TokenVerifier,
    hasher: PasswordHasher,
    rate_limiter: LoginRateLimiter,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("config", &self.config)
            .field("signer", &self.signer)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Service with the system clock, a logging email sender, default Argon2
    /// parameters and a verifier that trusts only `signer`'s key.
    #[must_use]
    pub fn new(config: AuthConfig, store: Arc<dyn AuthStore>, signer: TokenSigner) -> Self {
        let verifier = signer.verifier(config.issuer());
        Self {
            config,
            store,
            email: Arc::new(LogEmailSender),
            clock: Arc::new(SystemClock),
            signer,
            verifier,
            hasher: PasswordHasher::new(),
            rate_limiter: LoginRateLimiter::new(),
        }
    }

    #[must_use]
    pub fn with_email_sender(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = email;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub const fn with_rate_limiter(mut self, rate_limiter: LoginRateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Replace the verifier, e.g. to also trust a previous signing key.
    #[must_use]
    pub fn with_verifier(mut self, verifier: TokenVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn AuthStore {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Hash a password after checking it against the policy.
    async fn hash_new_password(&self, password: &str) -> Result<String, PasswordError> {
        policy::check_password(password)?;
        Ok(self.hasher.hash(password).await?)
    }
}

/// Internal split between "user must pick another password" and failures.
#[derive(Debug, thiserror::Error)]
enum PasswordError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PasswordError> for ResetError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Policy(violation) => Self::Policy(violation),
            PasswordError::Internal(err) => Self::Internal(err),
        }
    }
}

impl From<PasswordError> for AdminError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Policy(violation) => Self::Policy(violation),
            PasswordError::Internal(err) => Self::Internal(err),
        }
    }
}
