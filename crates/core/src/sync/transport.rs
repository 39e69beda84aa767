//! Remote blob store contract.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::sync::model::RemoteBlobName;

/// Thin client over the shared blob store holding sync objects.
///
/// Objects are immutable once written; there is no delete and no partial
/// update. Failures surface as [`TransportError`] with no internal retry —
/// the engine's caller decides whether to re-invoke sync.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Writes one complete object under the blob's key.
    async fn upload(
        &self,
        name: &RemoteBlobName,
        bytes: Vec<u8>,
    ) -> std::result::Result<(), TransportError>;

    /// Lists blobs under the user's sync prefix. `after_timestamp` keeps
    /// only blobs whose embedded timestamp is strictly greater;
    /// `exclude_device_id` drops the caller's own uploads. No ordering is
    /// guaranteed — the engine sorts.
    async fn list(
        &self,
        after_timestamp: Option<i64>,
        exclude_device_id: Option<&str>,
    ) -> std::result::Result<Vec<RemoteBlobName>, TransportError>;

    /// Fetches one object's raw content.
    async fn download(
        &self,
        name: &RemoteBlobName,
    ) -> std::result::Result<Vec<u8>, TransportError>;
}
