//! Core library for cloudvault.
//!
//! Talks to a personal cloud-storage REST API: authentication with an
//! access/refresh token pair, file upload and download, comments, share
//! links and user administration.
//!
//! The [`api::Gateway`] attaches the access token to every request and, on a
//! 401, refreshes it once and retries once. If the refresh fails, both tokens
//! are cleared and the session reports a forced logout.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod state;
pub mod utils;

pub use api::{is_session_expired, ApiClient, ApiError, Gateway, GatewayError, RefreshPolicy};
pub use auth::{Session, SessionState};
pub use config::Config;
