//! Session issuance, verification and revocation.
//!
//! Flow Overview:
//! 1) Issue: mint a ULID `jti`, persist the session row, then sign claims.
//! 2) Verify: signature/issuer, then `exp`, then the session row and the
//!    user's active flag. Any lookup failure rejects the token.
//! 3) Revoke: set `revoked_at` on one row (logout) or all of a user's rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error};
use ulid::Ulid;

use super::{
    AuthService,
    error::SessionError,
    token::{Error as TokenError, SessionClaims},
    types::{RequestContext, SessionRecord, User},
};

/// A freshly minted session, ready to hand to the client.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    pub remember: bool,
}

impl IssuedSession {
    /// Cookie `Max-Age`, never negative.
    #[must_use]
    pub fn max_age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// An authenticated caller. `user` is read fresh from the store during
/// verification, so role and profile reflect the current state.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: User,
    pub claims: SessionClaims,
}

impl Principal {
    #[must_use]
    pub fn jti(&self) -> &str {
        &self.claims.jti
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.user.role.is_admin()
    }
}

impl AuthService {
    pub(crate) async fn issue_session(
        &self,
        user: &User,
        remember: bool,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession> {
        let ttl = if remember {
            self.config.remember_ttl()
        } else {
            self.config.session_ttl()
        };
        let expires_at = now
            .checked_add_signed(ttl)
            .context("session expiry is out of range")?;
        let jti = Ulid::new().to_string();

        self.store
            .insert_session(&SessionRecord {
                jti: jti.clone(),
                user_id: user.id,
                created_at: now,
                expires_at,
                revoked_at: None,
                remember,
                origin: ctx.origin.clone(),
                user_agent_hash: ctx.user_agent_hash(),
            })
            .await?;

        let claims = SessionClaims {
            iss: self.config.issuer().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            sub: user.id.to_string(),
            jti: jti.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
        };
        let token = self
            .signer
            .sign(&claims)
            .context("failed to sign session token")?;

        Ok(IssuedSession {
            token,
            jti,
            expires_at,
            remember,
        })
    }

    /// Check a presented token against the signature, its expiry and the
    /// server-side session ledger.
    ///
    /// # Errors
    /// `Invalid` for malformed/forged tokens and for store failures,
    /// `Expired` once `exp` has passed, `Revoked` when the session row or the
    /// account no longer permits access.
    pub async fn verify_session(&self, token: &str) -> Result<Principal, SessionError> {
        let now = self.now();
        let claims = match self.verifier.verify(token, now.timestamp()) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => return Err(SessionError::Expired),
            Err(err) => {
                debug!("Rejected session token: {err}");
                return Err(SessionError::Invalid);
            }
        };
        let user_id = claims.user_id().map_err(|_| SessionError::Invalid)?;

        let session = match self.store.find_active_session(&claims.jti, now).await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(SessionError::Revoked),
            Err(err) => {
                error!("Failed to lookup session: {err:#}");
                return Err(SessionError::Invalid);
            }
        };
        if session.user_id != user_id {
            return Err(SessionError::Invalid);
        }

        match self.store.find_user_by_id(user_id).await {
            Ok(Some(user)) if user.is_active => Ok(Principal { user, claims }),
            Ok(_) => Err(SessionError::Revoked),
            Err(err) => {
                error!("Failed to lookup session user: {err:#}");
                Err(SessionError::Invalid)
            }
        }
    }

    /// Revoke the session behind `token`, if it names one.
    ///
    /// Returns whether a live session was revoked. Tokens that fail signature
    /// checks are ignored; already-expired tokens have nothing left to revoke.
    ///
    /// # Errors
    /// Returns an error if the store update fails.
    pub async fn logout(&self, token: &str) -> Result<bool> {
        let now = self.now();
        let Ok(claims) = self.verifier.verify(token, now.timestamp()) else {
            return Ok(false);
        };
        self.store.revoke_session(&claims.jti, now).await
    }
}
