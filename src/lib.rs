//! # portal-auth (Session & Identity Provider)
//!
//! `portal-auth` authenticates portal users against stored credentials, issues
//! signed session tokens, enforces the `User`/`Admin` role split, and drives
//! self-service and admin-triggered password recovery.
//!
//! ## Sessions
//!
//! A session is an Ed25519-signed bearer token (JWT, `alg=EdDSA`) whose `jti`
//! claim names a server-side session row. Verification needs only the public
//! key, but a token is accepted only while its row exists, is not revoked and
//! has not expired. Logout and admin actions revoke rows; the token's own `exp`
//! is enforced independently.
//!
//! ## Enumeration resistance
//!
//! Login failures for unknown emails and wrong passwords return the same
//! error, and password-reset requests always answer with the same neutral
//! message. Account-state problems (disabled account, no password set) are
//! only reported after the password check or for accounts that cannot log in.
//!
//! ## Last-admin invariant
//!
//! Demoting or disabling an administrator is checked and written inside one
//! serialized store transaction so the portal always keeps at least one active
//! administrator.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }
}
