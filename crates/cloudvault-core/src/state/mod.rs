//! Client-side mirrors of server state.
//!
//! Each state struct is updated from API results and never talks to the
//! network itself:
//! - `FilesState`: the file list being browsed, upload progress
//! - `AdminState`: the user list for administrators
//! - `AuthState`: who is logged in

pub mod admin;
pub mod auth;
pub mod files;

pub use admin::AdminState;
pub use auth::AuthState;
pub use files::FilesState;

/// Progress of the last operation against the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Uploading,
    Updating,
    Succeeded,
    Failed,
}

impl LoadStatus {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Loading | Self::Uploading | Self::Updating)
    }
}
