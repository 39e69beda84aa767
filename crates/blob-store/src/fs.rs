//! Filesystem transport: objects as files under a root directory.
//!
//! Pointing the root at a folder mirrored by a file-sync service gives a
//! zero-infrastructure shared store. Uploads write a temp file then rename
//! it into place, so a concurrently listing device never observes a partial
//! object.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use daybook_core::errors::TransportError;
use daybook_core::sync::{BlobTransport, RemoteBlobName, SYNC_USER_ID};

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn sync_dir(&self) -> PathBuf {
        self.root.join("sync").join(SYNC_USER_ID)
    }
}

fn io_error(err: std::io::Error) -> TransportError {
    TransportError::io(err.to_string())
}

#[async_trait]
impl BlobTransport for FsBlobStore {
    async fn upload(
        &self,
        name: &RemoteBlobName,
        bytes: Vec<u8>,
    ) -> std::result::Result<(), TransportError> {
        let path = self.object_path(&name.object_key(SYNC_USER_ID));
        let parent = path
            .parent()
            .ok_or_else(|| TransportError::io("Object path has no parent directory"))?;
        fs::create_dir_all(parent).await.map_err(io_error)?;
        // The `.tmp` suffix keeps the file invisible to `list` until the
        // rename lands.
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, &bytes).await.map_err(io_error)?;
        fs::rename(&temp, &path).await.map_err(io_error)?;
        Ok(())
    }

    async fn list(
        &self,
        after_timestamp: Option<i64>,
        exclude_device_id: Option<&str>,
    ) -> std::result::Result<Vec<RemoteBlobName>, TransportError> {
        let dir = self.sync_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A store nothing was ever pushed to lists as empty.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(err)),
        };

        let mut blobs = Vec::new();
        while let Some(dir_entry) = entries.next_entry().await.map_err(io_error)? {
            let file_name = dir_entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(blob) = RemoteBlobName::parse(file_name) else {
                continue;
            };
            if let Some(after) = after_timestamp {
                if blob.timestamp <= after {
                    continue;
                }
            }
            if let Some(own) = exclude_device_id {
                if blob.device_id == own {
                    continue;
                }
            }
            blobs.push(blob);
        }
        Ok(blobs)
    }

    async fn download(
        &self,
        name: &RemoteBlobName,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let path = self.object_path(&name.object_key(SYNC_USER_ID));
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(TransportError::not_found(name.object_key(SYNC_USER_ID)))
            }
            Err(err) => Err(io_error(err)),
        }
    }
}
