pub mod local;

pub use local::LocalBlobStore;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Namespace for encrypted file payloads, scoped per owner
pub fn file_namespace(owner_id: &str) -> String {
    format!("file-storage/{}", owner_id)
}

/// Namespace for unencrypted thumbnail previews, scoped per owner
pub fn thumbnail_namespace(owner_id: &str) -> String {
    format!("file-storage-thumbnails/{}", owner_id)
}

/// Blob store adapter
///
/// Stores opaque byte buffers under a namespaced key and hands back a
/// durable locator. With `overwrite`, a second put of the same key replaces
/// the prior blob, which gives content-addressed keys their idempotent
/// re-upload semantics.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob, returning its locator
    async fn put(&self, namespace: &str, key: &str, data: Bytes, overwrite: bool) -> Result<String>;

    /// Fetch a blob by locator
    async fn get(&self, locator: &str) -> Result<Bytes>;

    /// Delete a blob by locator
    async fn delete(&self, locator: &str) -> Result<()>;
}
