//! Login, session and password-reset endpoints.
//!
//! Browsers receive the session token as an `HttpOnly` cookie; other clients
//! may send it back as `Authorization: Bearer <token>`. Both paths go through
//! the same verifier.

pub mod login;
pub mod password_reset;
pub mod session;
pub mod types;
pub(crate) mod utils;

pub(crate) use session::authenticate;
