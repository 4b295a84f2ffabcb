use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// One physical file belonging to a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TempFile {
    pub id: String,
    pub original_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// A unit of work owning a temp directory and every file inside it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TempJob {
    pub id: String,
    #[serde(skip)]
    pub directory: PathBuf,
    pub files: Vec<TempFile>,
    pub created_at: DateTime<Utc>,
}

impl TempJob {
    pub fn file(&self, file_id: &str) -> Option<&TempFile> {
        self.files.iter().find(|f| f.id == file_id)
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
