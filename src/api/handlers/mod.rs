//! API handlers for the portal auth service.
//!
//! Handlers stay thin: they translate HTTP into `AuthService` calls and map
//! the typed outcomes back to status codes via `error::ApiError`.

pub mod admin;
pub mod auth;
pub(crate) mod error;
pub mod health;
