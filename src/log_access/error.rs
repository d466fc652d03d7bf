use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("notification log not found at {0}")]
    Missing(PathBuf),

    /// The file is visible but could not be opened or queried. Permission
    /// denials at the OS layer land here.
    #[error("notification log at {path} is unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("notification log reader has shut down")]
    WorkerGone,
}

impl AccessError {
    pub(crate) fn unreadable(path: &Path, reason: impl ToString) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
