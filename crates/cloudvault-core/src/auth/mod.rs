//! Authentication module for managing the session token pair.
//!
//! This module provides:
//! - `Session`: Shared handle to the access/refresh tokens with change notifications
//! - `TokenStorage`: Where tokens persist between runs
//! - `FileTokenStorage`, `KeyringTokenStorage`, `MemoryTokenStorage`: storage backends
//!
//! Both tokens are always cleared together, on logout or when a refresh fails.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::KeyringTokenStorage;
pub use session::{Session, SessionState, TokenUpdate};
pub use storage::{Credentials, FileTokenStorage, MemoryTokenStorage, TokenStorage};
