//! Admin user-management endpoints.
//!
//! Every handler authenticates the caller first (401) and then lets the auth
//! core enforce the Admin role (403) and the last-admin guard (409).

pub mod types;
pub mod users;
