//! Blob-store transports for the sync engine.
//!
//! Two interchangeable [`daybook_core::sync::BlobTransport`] implementations:
//! an HTTP object-store client and a plain directory store for folders
//! already mirrored by a file-sync service.

pub mod fs;
pub mod http;

pub use fs::FsBlobStore;
pub use http::HttpBlobStore;
