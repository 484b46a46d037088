//! Data models for cloud-storage entities.
//!
//! - `StoredFile`, `ShareInfo`: uploaded files and their public share view
//! - `User`: account profile, including admin flag and storage totals
//! - `TokenPair`, `LoginRequest`, `RegisterRequest`: authentication payloads

pub mod file;
pub mod user;

pub use file::{ShareInfo, StoredFile};
pub use user::{LoginRequest, RegisterRequest, TokenPair, User};
