//! Storage abstraction trait
//!
//! This module defines the `StorageService` trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected the upload because the content did not match its checksum.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "storage-azure")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage backend error ({status}): {message}")]
    BackendError {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Source of bytes for an upload. Consumed until EOF.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Consumer for chunked downloads. Returning an error stops the download.
pub type ChunkSink<'a> = dyn FnMut(Bytes) -> StorageResult<()> + Send + 'a;

/// Storage abstraction trait
///
/// Both backends (local filesystem, Azure Blob Storage) implement this trait so
/// the attachment layer can work with either one without knowing which.
///
/// Every operation reports exactly one instrumentation event to the backend's
/// [`Instrumenter`](crate::Instrumenter), whether it succeeds or fails.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Store every byte of `reader` under `key`.
    ///
    /// When `checksum` (base64 MD5) is given and the backend verifies integrity,
    /// a mismatch fails with [`StorageError::Integrity`]. The local backend does
    /// not verify checksums.
    async fn upload(&self, key: &str, reader: ByteReader, checksum: Option<&str>)
        -> StorageResult<()>;

    /// Download the whole blob.
    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Download the blob in bounded chunks, handing each one to `sink` in order.
    ///
    /// Chunks are contiguous and end exactly at the blob length. An empty blob
    /// produces no chunks.
    async fn download_chunks(&self, key: &str, sink: &mut ChunkSink<'_>) -> StorageResult<()>;

    /// Delete the blob. Deleting a blob that does not exist is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check whether a blob is stored under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Generate a read-only URL that expires `expires_in` from now.
    ///
    /// The served response carries `{disposition}; filename="{filename}"` as
    /// its content disposition.
    async fn url(
        &self,
        key: &str,
        expires_in: Duration,
        disposition: &str,
        filename: &str,
    ) -> StorageResult<String>;

    /// Generate a URL a client can upload to directly, bypassing this process.
    async fn url_for_direct_upload(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
        content_length: u64,
        checksum: &str,
    ) -> StorageResult<String>;

    /// Headers a direct-upload client must send along with the body.
    fn headers_for_direct_upload(
        &self,
        key: &str,
        content_type: &str,
        checksum: &str,
    ) -> HashMap<String, String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
