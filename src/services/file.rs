use chrono::Utc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{FileListResponse, FileQuery, FileRecord, FileRecordDraft, FileResponse};
use crate::services::cipher::FileCipher;
use crate::services::hasher;
use crate::storage::BlobStore;

const DEFAULT_PER_PAGE: u32 = 50;
const MAX_PER_PAGE: u32 = 200;

/// File metadata service and retrieval path
pub struct FileService;

impl FileService {
    /// Persist the drafts a successful ingest produced.
    ///
    /// Blobs already exist at this point; if an insert fails, the blob is
    /// orphaned in the store. That gap is logged and accepted, there is no
    /// two-phase commit across the blob store and the database.
    pub async fn create_records(
        db: &Database,
        owner_id: &str,
        drafts: Vec<FileRecordDraft>,
    ) -> Result<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();

            let inserted = sqlx::query(
                r#"
                INSERT INTO files (id, owner_id, name, mime_type, blob_locator, content_hash, size, iv, thumbnail_locator, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(owner_id)
            .bind(&draft.name)
            .bind(&draft.mime_type)
            .bind(&draft.blob_locator)
            .bind(&draft.content_hash)
            .bind(draft.size)
            .bind(&draft.iv)
            .bind(&draft.thumbnail_locator)
            .bind(&now)
            .bind(&now)
            .execute(db.pool())
            .await;

            if let Err(e) = inserted {
                tracing::error!(
                    "Failed to persist record for {}; blob {} is now orphaned: {}",
                    draft.name,
                    draft.blob_locator,
                    e
                );
                return Err(e.into());
            }

            records.push(Self::get_any(db, &id).await?);
        }

        Ok(records)
    }

    /// Fetch a record scoped to its owner.
    ///
    /// A record owned by someone else is reported with the same NotFound as
    /// a missing one, so existence of other owners' files never leaks.
    pub async fn get_owned(db: &Database, owner_id: &str, file_id: &str) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE id = ? AND owner_id = ?")
            .bind(file_id)
            .bind(owner_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Fetch a record by id alone. Used by the public share route: anyone
    /// holding the id may read the file, which is the documented trust
    /// boundary of that route.
    pub async fn get_any(db: &Database, file_id: &str) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// List an owner's files with search, sort, and pagination
    pub async fn list(db: &Database, owner_id: &str, query: FileQuery) -> Result<FileListResponse> {
        let sort_column = match query.sort_by.as_deref() {
            None | Some("created_at") => "created_at",
            Some("name") => "name",
            Some("size") => "size",
            Some(other) => {
                return Err(AppError::Validation(format!("Invalid sort field: {}", other)));
            }
        };
        let order = match query.order.as_deref() {
            None | Some("desc") => "DESC",
            Some("asc") => "ASC",
            Some(other) => {
                return Err(AppError::Validation(format!("Invalid sort order: {}", other)));
            }
        };

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let offset = (page - 1) as i64 * per_page as i64;

        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let (total, files): (i64, Vec<FileRecord>) = if let Some(ref pattern) = search {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM files WHERE owner_id = ? AND name LIKE ?",
            )
            .bind(owner_id)
            .bind(pattern)
            .fetch_one(db.pool())
            .await?;

            let rows = sqlx::query_as(&format!(
                "SELECT * FROM files WHERE owner_id = ? AND name LIKE ? ORDER BY {} {} LIMIT ? OFFSET ?",
                sort_column, order
            ))
            .bind(owner_id)
            .bind(pattern)
            .bind(per_page as i64)
            .bind(offset)
            .fetch_all(db.pool())
            .await?;

            (count, rows)
        } else {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM files WHERE owner_id = ?")
                    .bind(owner_id)
                    .fetch_one(db.pool())
                    .await?;

            let rows = sqlx::query_as(&format!(
                "SELECT * FROM files WHERE owner_id = ? ORDER BY {} {} LIMIT ? OFFSET ?",
                sort_column, order
            ))
            .bind(owner_id)
            .bind(per_page as i64)
            .bind(offset)
            .fetch_all(db.pool())
            .await?;

            (count, rows)
        };

        Ok(FileListResponse {
            files: files.into_iter().map(FileResponse::from).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Rename a file. Only the display name is mutable.
    pub async fn rename(
        db: &Database,
        owner_id: &str,
        file_id: &str,
        new_name: &str,
    ) -> Result<FileResponse> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(AppError::Validation("Invalid file name".to_string()));
        }

        let file = Self::get_owned(db, owner_id, file_id).await?;

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE files SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(&now)
            .bind(&file.id)
            .execute(db.pool())
            .await?;

        let updated = Self::get_owned(db, owner_id, file_id).await?;
        Ok(FileResponse::from(updated))
    }

    /// Delete a file: blobs first, then the record.
    ///
    /// A failed blob delete leaves a detectable orphan in the store; it is
    /// logged and does not block removal of the record.
    pub async fn delete(
        db: &Database,
        store: &dyn BlobStore,
        blob_timeout: Duration,
        owner_id: &str,
        file_id: &str,
    ) -> Result<()> {
        let file = Self::get_owned(db, owner_id, file_id).await?;

        Self::delete_blob_logged(store, blob_timeout, &file.blob_locator).await;
        if let Some(ref thumb) = file.thumbnail_locator {
            Self::delete_blob_logged(store, blob_timeout, thumb).await;
        }

        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(&file.id)
            .execute(db.pool())
            .await?;

        Ok(())
    }

    /// Bulk delete; skips ids that are missing or not owned and reports the
    /// number actually deleted
    pub async fn delete_many(
        db: &Database,
        store: &dyn BlobStore,
        blob_timeout: Duration,
        owner_id: &str,
        file_ids: &[String],
    ) -> Result<u64> {
        if file_ids.is_empty() {
            return Err(AppError::Validation("No file ids provided".to_string()));
        }

        let mut deleted = 0u64;
        for file_id in file_ids {
            match Self::delete(db, store, blob_timeout, owner_id, file_id).await {
                Ok(()) => deleted += 1,
                Err(AppError::NotFound(_)) => {
                    tracing::debug!("Skipping missing or foreign file {}", file_id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(deleted)
    }

    async fn delete_blob_logged(store: &dyn BlobStore, blob_timeout: Duration, locator: &str) {
        match timeout(blob_timeout, store.delete(locator)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Blob delete failed, orphan left at {}: {}", locator, e);
            }
            Err(_) => {
                tracing::warn!("Blob delete timed out, orphan left at {}", locator);
            }
        }
    }

    /// Owner-scoped retrieval: fetch ciphertext, decrypt with the stored
    /// IV, and verify the plaintext hash before returning. The ownership
    /// check happens before any blob access.
    pub async fn retrieve(
        db: &Database,
        store: &dyn BlobStore,
        cipher: &FileCipher,
        blob_timeout: Duration,
        owner_id: &str,
        file_id: &str,
    ) -> Result<(Vec<u8>, FileRecord)> {
        let file = Self::get_owned(db, owner_id, file_id).await?;
        let plaintext = Self::fetch_and_decrypt(store, cipher, blob_timeout, &file).await?;
        Ok((plaintext, file))
    }

    /// Unauthenticated retrieval by file id for the public share route
    pub async fn retrieve_public(
        db: &Database,
        store: &dyn BlobStore,
        cipher: &FileCipher,
        blob_timeout: Duration,
        file_id: &str,
    ) -> Result<(Vec<u8>, FileRecord)> {
        let file = Self::get_any(db, file_id).await?;
        let plaintext = Self::fetch_and_decrypt(store, cipher, blob_timeout, &file).await?;
        Ok((plaintext, file))
    }

    /// Fetch a file's thumbnail preview bytes
    pub async fn retrieve_thumbnail(
        db: &Database,
        store: &dyn BlobStore,
        blob_timeout: Duration,
        owner_id: &str,
        file_id: &str,
    ) -> Result<bytes::Bytes> {
        let file = Self::get_owned(db, owner_id, file_id).await?;
        let locator = file
            .thumbnail_locator
            .ok_or_else(|| AppError::NotFound("No thumbnail for this file".to_string()))?;

        match timeout(blob_timeout, store.get(&locator)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::StorageTimeout(format!(
                "Fetching thumbnail {} timed out",
                locator
            ))),
        }
    }

    async fn fetch_and_decrypt(
        store: &dyn BlobStore,
        cipher: &FileCipher,
        blob_timeout: Duration,
        file: &FileRecord,
    ) -> Result<Vec<u8>> {
        let ciphertext = match timeout(blob_timeout, store.get(&file.blob_locator)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::StorageTimeout(format!(
                    "Fetching {} timed out",
                    file.blob_locator
                )));
            }
        };

        let plaintext = cipher.decrypt_hex_iv(&ciphertext, &file.iv)?;

        // The stored hash is the integrity anchor: decryption must never
        // hand back corrupted bytes framed as success.
        if hasher::digest_hex(&plaintext) != file.content_hash {
            return Err(AppError::Cipher(format!(
                "Integrity check failed for file {}",
                file.id
            )));
        }

        Ok(plaintext)
    }
}
