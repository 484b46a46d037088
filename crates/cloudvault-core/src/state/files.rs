use chrono::{DateTime, Utc};

use super::LoadStatus;
use crate::models::StoredFile;
use crate::utils::contains_ignore_case;

#[derive(Debug, Clone, Default)]
pub struct FilesState {
    pub files: Vec<StoredFile>,
    pub status: LoadStatus,
    pub error: Option<String>,
    /// Upload progress in percent (0-100)
    pub upload_progress: u8,
}

impl FilesState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, status: LoadStatus) {
        self.status = status;
        self.error = None;
    }

    pub fn loaded(&mut self, files: Vec<StoredFile>) {
        self.files = files;
        self.status = LoadStatus::Succeeded;
    }

    /// Newest uploads go first
    pub fn uploaded(&mut self, file: StoredFile) {
        self.files.insert(0, file);
        self.status = LoadStatus::Succeeded;
        self.upload_progress = 0;
    }

    pub fn removed(&mut self, file_id: i64) {
        self.files.retain(|f| f.id != file_id);
    }

    pub fn comment_updated(&mut self, updated: StoredFile) {
        if let Some(file) = self.files.iter_mut().find(|f| f.id == updated.id) {
            *file = updated;
        }
        self.status = LoadStatus::Succeeded;
    }

    pub fn downloaded(&mut self, file_id: i64, at: DateTime<Utc>) {
        if let Some(file) = self.files.iter_mut().find(|f| f.id == file_id) {
            file.last_download = Some(at);
        }
    }

    pub fn failed(&mut self, error: impl ToString) {
        self.status = LoadStatus::Failed;
        self.error = Some(error.to_string());
        self.upload_progress = 0;
    }

    pub fn set_upload_progress(&mut self, sent: u64, total: u64) {
        self.upload_progress = if total == 0 {
            100
        } else {
            ((sent.min(total) * 100) / total) as u8
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn find(&self, file_id: i64) -> Option<&StoredFile> {
        self.files.iter().find(|f| f.id == file_id)
    }

    /// Files whose name contains `query`, ignoring case
    pub fn filtered(&self, query: &str) -> Vec<&StoredFile> {
        self.files
            .iter()
            .filter(|f| contains_ignore_case(&f.original_name, query))
            .collect()
    }

    pub fn total_size(&self) -> i64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
