//! Password-reset token lifecycle.
//!
//! Flow Overview:
//! 1) Request: for an existing account, store the SHA-256 of a fresh 256-bit
//!    token (superseding older unused ones) and email the raw token as a link.
//! 2) Open: the browser following the link loses whatever session it had, and
//!    the token is checked without being consumed.
//! 3) Complete: policy check, then one store call consumes the token, swaps
//!    the hash and revokes every session of the user.

use anyhow::Context;
use tracing::{info, warn};

use super::{
    AuthService,
    email::{self, Delivery},
    error::ResetError,
    types::ResetRecord,
    utils::{build_reset_url, generate_token, hash_token, normalize_email},
};

/// Result of a reset request. Callers facing the public must collapse all
/// three into one neutral response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResetRequestOutcome {
    Sent,
    /// Email could not be delivered; the link is handed back for an
    /// out-of-band channel.
    DeliveryFailed { reset_url: String },
    NoSuchUser,
}

impl AuthService {
    /// # Errors
    /// Returns an error if the token cannot be generated or stored. Delivery
    /// problems are not errors.
    pub async fn request_password_reset(&self, email: &str) -> anyhow::Result<ResetRequestOutcome> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            info!("Password reset requested for unknown email");
            return Ok(ResetRequestOutcome::NoSuchUser);
        };
        self.issue_reset(user.id, &user.email).await
    }

    pub(crate) async fn issue_reset(
        &self,
        user_id: i64,
        email_address: &str,
    ) -> anyhow::Result<ResetRequestOutcome> {
        let now = self.now();
        let token = generate_token()?;
        let expires_at = now
            .checked_add_signed(self.config.reset_ttl())
            .context("reset expiry is out of range")?;
        self.store
            .insert_password_reset(user_id, &hash_token(&token), expires_at, now)
            .await?;

        let reset_url = build_reset_url(self.config.base_url(), &token);
        let message = email::reset_message(
            self.config.mail_from(),
            email_address,
            &reset_url,
            self.config.reset_ttl().num_minutes(),
        );
        match email::deliver(self.email.as_ref(), &message, self.config.email_timeout()).await {
            Delivery::Delivered => {
                info!(user_id, "Password reset email sent");
                Ok(ResetRequestOutcome::Sent)
            }
            Delivery::Failed => {
                warn!(user_id, "Password reset email not delivered");
                Ok(ResetRequestOutcome::DeliveryFailed { reset_url })
            }
        }
    }

    /// Check a reset token without consuming it.
    ///
    /// # Errors
    /// `InvalidToken` for unknown, used, superseded or expired tokens.
    pub async fn verify_reset_token(&self, token: &str) -> Result<ResetRecord, ResetError> {
        if token.trim().is_empty() {
            return Err(ResetError::InvalidToken);
        }
        self.store
            .find_password_reset(&hash_token(token.trim()), self.now())
            .await?
            .ok_or(ResetError::InvalidToken)
    }

    /// Follow a reset link: revoke the session presented by this browser,
    /// then check the token.
    ///
    /// # Errors
    /// Same as `verify_reset_token`.
    pub async fn open_reset_link(
        &self,
        token: &str,
        presented_session: Option<&str>,
    ) -> Result<ResetRecord, ResetError> {
        if let Some(session_token) = presented_session {
            if self.logout(session_token).await? {
                info!("Revoked session presented with reset link");
            }
        }
        self.verify_reset_token(token).await
    }

    /// Set a new password with a reset token.
    ///
    /// # Errors
    /// `Policy` before any state change if the password is weak;
    /// `InvalidToken` if the token is not live at the moment of consumption.
    pub async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), ResetError> {
        let new_hash = self.hash_new_password(new_password).await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(ResetError::InvalidToken);
        }
        let consumed = self
            .store
            .consume_password_reset(&hash_token(token), &new_hash, self.now())
            .await?;
        match consumed {
            Some(user_id) => {
                info!(user_id, "Password reset completed, sessions revoked");
                Ok(())
            }
            None => Err(ResetError::InvalidToken),
        }
    }
}
