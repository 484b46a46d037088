use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;
use crate::utils::format_size;

/// A file stored in the user's cloud storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct StoredFile {
    pub id: i64,
    pub owner: Option<User>,
    pub original_name: String,
    #[serde(default)]
    pub storage_path: String,
    /// Size in bytes
    pub size: i64,
    pub upload_date: DateTime<Utc>,
    pub last_download: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comment: String,
    /// Opaque token granting public download access
    pub share_link: String,
    pub download_url: Option<String>,
    pub share_url: Option<String>,
}

impl StoredFile {
    pub fn size_display(&self) -> String {
        format_size(self.size)
    }

    /// Link to the public share page for this file under `origin`.
    pub fn share_page_url(&self, origin: &str) -> String {
        format!("{}/share/{}/", origin.trim_end_matches('/'), self.share_link)
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.username.as_str())
    }
}

/// What anyone holding a share link can see about a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ShareInfo {
    pub original_name: String,
    pub size: i64,
    pub upload_date: DateTime<Utc>,
    pub last_download: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comment: String,
}

impl ShareInfo {
    pub fn size_display(&self) -> String {
        format_size(self.size)
    }
}
