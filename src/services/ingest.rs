use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::error::{AppError, Result};
use crate::models::FileRecordDraft;
use crate::services::cipher::FileCipher;
use crate::services::{hasher, thumbnail};
use crate::storage::{self, BlobStore};

pub const MAX_BATCH_SIZE: usize = 10;
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Filename extensions accepted for upload
const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "pdf", "doc", "docx", "xlsx", "pptx", "txt", "zip", "mp4", "mov",
    "avi",
];

/// One raw file pulled out of a multipart request
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Per-file ingestion result, in upload order
pub struct IngestOutcome {
    pub file_name: String,
    pub result: Result<FileRecordDraft>,
}

/// Upload ingestion pipeline.
///
/// For each file in a batch: validate, hash the plaintext, best-effort
/// thumbnail, encrypt, store the ciphertext under a content-addressed key,
/// and assemble a draft record. Files are processed concurrently and
/// independently; one file's hard failure never aborts the rest. The caller
/// persists the resulting drafts — there is no two-phase commit between the
/// blob store and the database, so a failed persist after a successful put
/// leaves an orphaned blob (logged, accepted).
pub struct IngestPipeline {
    cipher: Arc<FileCipher>,
    store: Arc<dyn BlobStore>,
    blob_timeout: Duration,
}

impl IngestPipeline {
    pub fn new(cipher: Arc<FileCipher>, store: Arc<dyn BlobStore>, blob_timeout: Duration) -> Self {
        Self {
            cipher,
            store,
            blob_timeout,
        }
    }

    /// Ingest a batch of up to `MAX_BATCH_SIZE` files for one owner.
    ///
    /// Returns one outcome per input file, in upload order. Only
    /// batch-level validation (empty or oversized batch) fails the call as
    /// a whole.
    pub async fn ingest(&self, owner_id: &str, uploads: Vec<RawUpload>) -> Result<Vec<IngestOutcome>> {
        if uploads.is_empty() {
            return Err(AppError::Validation("No files selected for upload".to_string()));
        }
        if uploads.len() > MAX_BATCH_SIZE {
            return Err(AppError::Validation(format!(
                "Too many files: maximum is {} per upload",
                MAX_BATCH_SIZE
            )));
        }

        let mut tasks = JoinSet::new();
        for (index, upload) in uploads.into_iter().enumerate() {
            let cipher = Arc::clone(&self.cipher);
            let store = Arc::clone(&self.store);
            let blob_timeout = self.blob_timeout;
            let owner_id = owner_id.to_string();

            tasks.spawn(async move {
                let file_name = upload.file_name.clone();
                let result =
                    process_one(&cipher, store.as_ref(), blob_timeout, &owner_id, upload).await;
                (index, IngestOutcome { file_name, result })
            });
        }

        let mut outcomes: Vec<Option<IngestOutcome>> = Vec::new();
        outcomes.resize_with(tasks.len(), || None);

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) =
                joined.map_err(|e| AppError::Internal(format!("Ingest task panicked: {}", e)))?;
            outcomes[index] = Some(outcome);
        }

        Ok(outcomes.into_iter().flatten().collect())
    }
}

/// Hash, thumbnail, encrypt, and store a single file. Steps are sequential
/// within a file; encryption completes before the store upload starts.
async fn process_one(
    cipher: &FileCipher,
    store: &dyn BlobStore,
    blob_timeout: Duration,
    owner_id: &str,
    upload: RawUpload,
) -> Result<FileRecordDraft> {
    validate_upload(&upload)?;

    let content_hash = hasher::digest_hex(&upload.data);

    let mut thumbnail_locator = None;
    if thumbnail::is_previewable(&upload.mime_type) {
        match thumbnail::generate(&upload.data) {
            Ok(preview) => {
                let namespace = storage::thumbnail_namespace(owner_id);
                let key = format!("{}-thumb", content_hash);
                match timeout(blob_timeout, store.put(&namespace, &key, Bytes::from(preview), true))
                    .await
                {
                    Ok(Ok(locator)) => thumbnail_locator = Some(locator),
                    Ok(Err(e)) => {
                        tracing::warn!("Thumbnail upload failed for {}: {}", upload.file_name, e);
                    }
                    Err(_) => {
                        tracing::warn!("Thumbnail upload timed out for {}", upload.file_name);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Could not generate thumbnail for {}: {}",
                    upload.file_name,
                    e
                );
            }
        }
    }

    let (ciphertext, iv) = cipher.encrypt(&upload.data);

    let namespace = storage::file_namespace(owner_id);
    let blob_locator = match timeout(
        blob_timeout,
        store.put(&namespace, &content_hash, Bytes::from(ciphertext), true),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(AppError::StorageTimeout(format!(
                "Storing {} timed out",
                upload.file_name
            )));
        }
    };

    Ok(FileRecordDraft {
        name: upload.file_name,
        mime_type: upload.mime_type,
        blob_locator,
        content_hash,
        size: upload.data.len() as i64,
        iv: hex::encode(iv),
        thumbnail_locator,
    })
}

/// Reject a file before any processing if its name, extension, or size is
/// out of bounds
fn validate_upload(upload: &RawUpload) -> Result<()> {
    let name = upload.file_name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Missing file name".to_string()));
    }
    if upload.data.is_empty() {
        return Err(AppError::Validation(format!("File {} is empty", name)));
    }
    if upload.data.len() > MAX_FILE_SIZE {
        return Err(AppError::Validation(format!(
            "File {} exceeds the 10MB limit",
            name
        )));
    }

    let extension = name
        .rfind('.')
        .map(|i| name[i + 1..].to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| AppError::Validation(format!("Unsupported file type: {}", name)))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported file type: {}",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory blob store test double
    #[derive(Default)]
    struct MemoryBlobStore {
        blobs: Mutex<HashMap<String, Bytes>>,
    }

    impl MemoryBlobStore {
        fn get_sync(&self, locator: &str) -> Option<Bytes> {
            self.blobs.lock().unwrap().get(locator).cloned()
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(
            &self,
            namespace: &str,
            key: &str,
            data: Bytes,
            overwrite: bool,
        ) -> crate::error::Result<String> {
            let locator = format!("{}/{}", namespace, key);
            let mut blobs = self.blobs.lock().unwrap();
            if !overwrite && blobs.contains_key(&locator) {
                return Err(AppError::Storage(format!("Blob already exists: {}", locator)));
            }
            blobs.insert(locator.clone(), data);
            Ok(locator)
        }

        async fn get(&self, locator: &str) -> crate::error::Result<Bytes> {
            self.get_sync(locator)
                .ok_or_else(|| AppError::NotFound(format!("Blob not found: {}", locator)))
        }

        async fn delete(&self, locator: &str) -> crate::error::Result<()> {
            self.blobs.lock().unwrap().remove(locator);
            Ok(())
        }
    }

    /// Blob store that refuses every write
    struct FailingBlobStore;

    #[async_trait]
    impl BlobStore for FailingBlobStore {
        async fn put(
            &self,
            _namespace: &str,
            _key: &str,
            _data: Bytes,
            _overwrite: bool,
        ) -> crate::error::Result<String> {
            Err(AppError::Storage("Store unreachable".to_string()))
        }

        async fn get(&self, _locator: &str) -> crate::error::Result<Bytes> {
            Err(AppError::Storage("Store unreachable".to_string()))
        }

        async fn delete(&self, _locator: &str) -> crate::error::Result<()> {
            Err(AppError::Storage("Store unreachable".to_string()))
        }
    }

    fn pipeline_with(store: Arc<dyn BlobStore>) -> IngestPipeline {
        IngestPipeline::new(
            Arc::new(FileCipher::new("test-secret")),
            store,
            Duration::from_secs(5),
        )
    }

    fn text_upload(name: &str, data: &'static [u8]) -> RawUpload {
        RawUpload {
            file_name: name.to_string(),
            mime_type: "text/plain".to_string(),
            data: Bytes::from_static(data),
        }
    }

    fn png_upload(name: &str) -> RawUpload {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(200, 150));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageOutputFormat::Png).unwrap();
        RawUpload {
            file_name: name.to_string(),
            mime_type: "image/png".to_string(),
            data: Bytes::from(buf.into_inner()),
        }
    }

    #[tokio::test]
    async fn test_single_text_file() {
        let store = Arc::new(MemoryBlobStore::default());
        let pipeline = pipeline_with(store.clone());

        let outcomes = pipeline
            .ingest("alice", vec![text_upload("notes.txt", b"hello world!")])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);

        let draft = outcomes[0].result.as_ref().unwrap();
        assert_eq!(draft.name, "notes.txt");
        assert_eq!(draft.mime_type, "text/plain");
        assert_eq!(draft.size, 12);
        assert_eq!(draft.content_hash.len(), 64);
        assert_eq!(draft.iv.len(), 32);
        assert!(draft.thumbnail_locator.is_none());
        assert_eq!(
            draft.blob_locator,
            format!("file-storage/alice/{}", draft.content_hash)
        );

        // Stored bytes are ciphertext, and decrypt back to the original
        let stored = store.get_sync(&draft.blob_locator).unwrap();
        assert_ne!(&stored[..], b"hello world!");
        let cipher = FileCipher::new("test-secret");
        assert_eq!(
            cipher.decrypt_hex_iv(&stored, &draft.iv).unwrap(),
            b"hello world!"
        );
    }

    #[tokio::test]
    async fn test_batch_partial_success() {
        let store = Arc::new(MemoryBlobStore::default());
        let pipeline = pipeline_with(store);

        let outcomes = pipeline
            .ingest(
                "alice",
                vec![
                    text_upload("one.txt", b"first"),
                    text_upload("malware.exe", b"nope"),
                    text_upload("three.txt", b"third"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(AppError::Validation(_))));
        assert!(outcomes[2].result.is_ok());
        assert_eq!(outcomes[0].file_name, "one.txt");
        assert_eq!(outcomes[2].file_name, "three.txt");
    }

    #[tokio::test]
    async fn test_duplicate_content_same_key_distinct_ivs() {
        let store = Arc::new(MemoryBlobStore::default());
        let pipeline = pipeline_with(store);

        let first = pipeline
            .ingest("alice", vec![text_upload("a.txt", b"identical")])
            .await
            .unwrap();
        let second = pipeline
            .ingest("alice", vec![text_upload("b.txt", b"identical")])
            .await
            .unwrap();

        let a = first[0].result.as_ref().unwrap();
        let b = second[0].result.as_ref().unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.blob_locator, b.blob_locator);
        assert_ne!(a.iv, b.iv);
    }

    #[tokio::test]
    async fn test_image_gets_thumbnail() {
        let store = Arc::new(MemoryBlobStore::default());
        let pipeline = pipeline_with(store.clone());

        let outcomes = pipeline
            .ingest("alice", vec![png_upload("photo.png")])
            .await
            .unwrap();
        let draft = outcomes[0].result.as_ref().unwrap();

        let locator = draft.thumbnail_locator.as_ref().unwrap();
        assert_eq!(
            locator,
            &format!(
                "file-storage-thumbnails/alice/{}-thumb",
                draft.content_hash
            )
        );

        // Preview is stored unencrypted and within bounds
        let preview = store.get_sync(locator).unwrap();
        let decoded = image::load_from_memory(&preview).unwrap();
        assert!(decoded.width() <= 100 && decoded.height() <= 100);
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_soft() {
        let store = Arc::new(MemoryBlobStore::default());
        let pipeline = pipeline_with(store);

        let outcomes = pipeline
            .ingest(
                "alice",
                vec![RawUpload {
                    file_name: "broken.png".to_string(),
                    mime_type: "image/png".to_string(),
                    data: Bytes::from_static(b"this is not a png"),
                }],
            )
            .await
            .unwrap();

        let draft = outcomes[0].result.as_ref().unwrap();
        assert!(draft.thumbnail_locator.is_none());
        assert_eq!(draft.size, 17);
    }

    #[tokio::test]
    async fn test_store_failure_is_isolated_per_file() {
        let pipeline = pipeline_with(Arc::new(FailingBlobStore));

        let outcomes = pipeline
            .ingest(
                "alice",
                vec![text_upload("a.txt", b"aaa"), text_upload("b.txt", b"bbb")],
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert!(matches!(outcome.result, Err(AppError::Storage(_))));
        }
    }

    #[tokio::test]
    async fn test_batch_limits() {
        let pipeline = pipeline_with(Arc::new(MemoryBlobStore::default()));

        assert!(matches!(
            pipeline.ingest("alice", vec![]).await,
            Err(AppError::Validation(_))
        ));

        let too_many = (0..11)
            .map(|i| RawUpload {
                file_name: format!("f{}.txt", i),
                mime_type: "text/plain".to_string(),
                data: Bytes::from_static(b"x"),
            })
            .collect();
        assert!(matches!(
            pipeline.ingest("alice", too_many).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_nameless_file_rejected_without_aborting_batch() {
        let store = Arc::new(MemoryBlobStore::default());
        let pipeline = pipeline_with(store);

        let outcomes = pipeline
            .ingest(
                "alice",
                vec![text_upload("", b"anonymous"), text_upload("named.txt", b"fine")],
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].result, Err(AppError::Validation(_))));
        let draft = outcomes[1].result.as_ref().unwrap();
        assert_eq!(draft.name, "named.txt");
    }

    #[tokio::test]
    async fn test_oversized_and_empty_files_rejected() {
        let pipeline = pipeline_with(Arc::new(MemoryBlobStore::default()));

        let big = RawUpload {
            file_name: "big.zip".to_string(),
            mime_type: "application/zip".to_string(),
            data: Bytes::from(vec![0u8; MAX_FILE_SIZE + 1]),
        };
        let empty = text_upload("empty.txt", b"");

        let outcomes = pipeline.ingest("alice", vec![big, empty]).await.unwrap();
        assert!(matches!(outcomes[0].result, Err(AppError::Validation(_))));
        assert!(matches!(outcomes[1].result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_extension_allow_list() {
        let ok = |name: &str| {
            validate_upload(&RawUpload {
                file_name: name.to_string(),
                mime_type: "application/octet-stream".to_string(),
                data: Bytes::from_static(b"x"),
            })
        };
        assert!(ok("report.PDF").is_ok());
        assert!(ok("archive.zip").is_ok());
        assert!(ok("clip.MOV").is_ok());
        assert!(ok("script.sh").is_err());
        assert!(ok("binary.exe").is_err());
        assert!(ok("no_extension").is_err());
        assert!(ok("trailing.").is_err());
    }
}
