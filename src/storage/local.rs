use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::BlobStore;

/// Local file system blob store
///
/// Locators are relative paths under the base directory, in the form
/// `{namespace}/{key}`.
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Reject path segments that could escape the base directory
    fn validate_segment(segment: &str) -> Result<()> {
        if segment.is_empty()
            || segment.contains("..")
            || segment.starts_with('/')
            || segment.contains('\\')
        {
            return Err(AppError::Storage(format!(
                "Invalid blob path segment: {}",
                segment
            )));
        }
        Ok(())
    }

    fn full_path(&self, locator: &str) -> Result<PathBuf> {
        Self::validate_segment(locator)?;
        Ok(self.base_path.join(locator))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, namespace: &str, key: &str, data: Bytes, overwrite: bool) -> Result<String> {
        Self::validate_segment(namespace)?;
        Self::validate_segment(key)?;

        let locator = format!("{}/{}", namespace, key);
        let full_path = self.base_path.join(&locator);

        if !overwrite && fs::try_exists(&full_path).await? {
            return Err(AppError::Storage(format!(
                "Blob already exists: {}",
                locator
            )));
        }

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::debug!("Stored blob at {:?}", full_path);
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Bytes> {
        let full_path = self.full_path(locator)?;

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Blob not found: {}", locator))
            } else {
                AppError::Storage(format!("Failed to read blob: {}", e))
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        let full_path = self.full_path(locator)?;

        if fs::try_exists(&full_path).await? {
            fs::remove_file(&full_path).await?;
            tracing::debug!("Deleted blob {:?}", full_path);

            // Remove empty parent directories up to the base path
            let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
            while let Some(dir) = current_dir {
                if dir == self.base_path {
                    break;
                }
                match fs::read_dir(&dir).await {
                    Ok(mut entries) => {
                        if entries.next_entry().await?.is_some() {
                            break;
                        }
                        let _ = fs::remove_dir(&dir).await;
                    }
                    Err(_) => break,
                }
                current_dir = dir.parent().map(|p| p.to_path_buf());
            }
        }

        Ok(())
    }
}
