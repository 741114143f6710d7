use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored file record
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub mime_type: String,
    pub blob_locator: String,
    pub content_hash: String,
    pub size: i64,
    pub iv: String,
    pub thumbnail_locator: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Output of the ingestion pipeline for one file, not yet persisted.
/// The blob already exists in the store when a draft is produced.
#[derive(Debug, Clone)]
pub struct FileRecordDraft {
    pub name: String,
    pub mime_type: String,
    pub blob_locator: String,
    pub content_hash: String,
    pub size: i64,
    /// Hex-encoded 16-byte IV, unique per upload. Losing it makes the
    /// stored ciphertext unrecoverable.
    pub iv: String,
    pub thumbnail_locator: Option<String>,
}

/// File response returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub content_hash: String,
    pub size: i64,
    pub has_thumbnail: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(file: FileRecord) -> Self {
        Self {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            content_hash: file.content_hash,
            size: file.size,
            has_thumbnail: file.thumbnail_locator.is_some(),
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

/// One rejected file in an upload batch
#[derive(Debug, Serialize)]
pub struct FailedUpload {
    pub file_name: String,
    pub error: String,
}

/// Upload batch response: persisted records plus per-file failures
#[derive(Debug, Serialize)]
pub struct UploadBatchResponse {
    pub uploaded: Vec<FileResponse>,
    pub failed: Vec<FailedUpload>,
}

/// File list response
#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Rename file request
#[derive(Debug, Deserialize)]
pub struct RenameFileRequest {
    pub name: String,
}

/// Bulk delete request
#[derive(Debug, Deserialize)]
pub struct DeleteManyRequest {
    pub ids: Vec<String>,
}

/// File listing query parameters
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
