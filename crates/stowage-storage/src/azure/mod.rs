//! Azure Blob Storage backend.

pub mod client;
pub mod sas;

use crate::instrument::{Instrumenter, Operation, StorageEvent, TracingInstrumenter};
use crate::keys::validate_key;
use crate::traits::{ByteReader, ChunkSink, StorageError, StorageResult, StorageService};
use crate::verified_key::expiry_from_now;
use crate::StorageBackend;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use client::AzureBlobClient;
use sas::{SasOptions, SasSigner};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stowage_core::AzureConfig;
use tokio::io::AsyncReadExt;

const SERVICE_NAME: &str = "azure";

/// Size of each ranged read in a chunked download
pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Error codes Azure returns when Content-MD5 does not match the body
const CHECKSUM_ERROR_CODES: &[&str] = &["Md5Mismatch", "InvalidMd5"];

/// Azure Blob Storage implementation
#[derive(Clone)]
pub struct AzureService {
    client: AzureBlobClient,
    signer: SasSigner,
    container: String,
    instrumenter: Arc<dyn Instrumenter>,
}

impl AzureService {
    /// Create a new AzureService
    ///
    /// The account key is decoded once and shared by the REST client (Shared Key
    /// request signing) and the SAS signer.
    pub fn new(config: &AzureConfig) -> StorageResult<Self> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(config.storage_access_key.trim())
            .map_err(|_| {
                StorageError::ConfigError("Azure storage access key is not valid base64".to_string())
            })?;

        Ok(AzureService {
            client: AzureBlobClient::new(&config.path, &config.storage_account_name, key.clone())?,
            signer: SasSigner::new(&config.storage_account_name, key),
            container: config.container.clone(),
            instrumenter: Arc::new(TracingInstrumenter),
        })
    }

    pub fn with_instrumenter(mut self, instrumenter: Arc<dyn Instrumenter>) -> Self {
        self.instrumenter = instrumenter;
        self
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    fn emit(&self, event: StorageEvent) {
        self.instrumenter.instrument(event);
    }

    async fn put_blob(
        &self,
        key: &str,
        mut reader: ByteReader,
        checksum: Option<&str>,
    ) -> StorageResult<()> {
        validate_key(key)?;
        let start = Instant::now();

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        let size = buffer.len();

        self.client
            .put_block_blob(&self.container, key, Bytes::from(buffer), checksum)
            .await
            .map_err(|e| {
                let e = integrity_or(e, checksum.is_some());
                tracing::error!(
                    error = %e,
                    container = %self.container,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Azure upload failed"
                );
                e
            })?;

        tracing::info!(
            container = %self.container,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Azure upload successful"
        );
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.client
            .get_blob(&self.container, key, None)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn stream_blob(&self, key: &str, sink: &mut ChunkSink<'_>) -> StorageResult<()> {
        validate_key(key)?;
        let properties = self
            .client
            .get_blob_properties(&self.container, key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let mut offset = 0u64;
        while offset < properties.content_length {
            let range = (offset, offset + CHUNK_SIZE - 1);
            let chunk = self
                .client
                .get_blob(&self.container, key, Some(range))
                .await?
                // Deleted between the properties call and this read
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
            sink(chunk)?;
            offset += CHUNK_SIZE;
        }
        Ok(())
    }

    async fn delete_blob(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let existed = self.client.delete_blob(&self.container, key).await?;
        if !existed {
            tracing::debug!(container = %self.container, key = %key, "Azure delete of missing blob");
        }
        Ok(())
    }

    async fn blob_exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self
            .client
            .get_blob_properties(&self.container, key)
            .await?
            .is_some())
    }

    fn sign_url(&self, key: &str, options: &SasOptions<'_>) -> StorageResult<String> {
        validate_key(key)?;
        let base_url = self.client.blob_url(&self.container, key);
        self.signer.signed_url(&base_url, &self.container, key, options)
    }
}

/// Map a checksum rejection to `Integrity`; anything else passes through.
fn integrity_or(err: StorageError, checksum_given: bool) -> StorageError {
    match err {
        StorageError::BackendError {
            code: Some(ref code),
            ref message,
            ..
        } if checksum_given && CHECKSUM_ERROR_CODES.contains(&code.as_str()) => {
            StorageError::Integrity(format!("{}: {}", code, message))
        }
        other => other,
    }
}

#[async_trait]
impl StorageService for AzureService {
    async fn upload(
        &self,
        key: &str,
        reader: ByteReader,
        checksum: Option<&str>,
    ) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.put_blob(key, reader, checksum).await;

        self.emit(
            StorageEvent::new(Operation::Upload, SERVICE_NAME, key, start)
                .with_checksum(checksum)
                .with_outcome(&result),
        );
        result
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let start = Instant::now();
        let result = self.get_blob(key).await;

        self.emit(StorageEvent::new(Operation::Download, SERVICE_NAME, key, start).with_outcome(&result));
        result
    }

    async fn download_chunks(&self, key: &str, sink: &mut ChunkSink<'_>) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.stream_blob(key, sink).await;

        self.emit(
            StorageEvent::new(Operation::StreamingDownload, SERVICE_NAME, key, start)
                .with_outcome(&result),
        );
        result
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.delete_blob(key).await;

        self.emit(StorageEvent::new(Operation::Delete, SERVICE_NAME, key, start).with_outcome(&result));
        result
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let start = Instant::now();
        let result = self.blob_exists(key).await;

        let mut event = StorageEvent::new(Operation::Exist, SERVICE_NAME, key, start).with_outcome(&result);
        if let Ok(answer) = &result {
            event = event.with_exist(*answer);
        }
        self.emit(event);
        result
    }

    async fn url(
        &self,
        key: &str,
        expires_in: Duration,
        disposition: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let start = Instant::now();
        let content_disposition = format!("{}; filename=\"{}\"", disposition, filename);
        let result = expiry_from_now(expires_in).and_then(|expiry| {
            self.sign_url(
                key,
                &SasOptions {
                    permissions: "r",
                    expiry,
                    content_disposition: Some(content_disposition.as_str()),
                },
            )
        });

        let mut event = StorageEvent::new(Operation::Url, SERVICE_NAME, key, start).with_outcome(&result);
        if let Ok(url) = &result {
            event = event.with_url(url);
        }
        self.emit(event);
        result
    }

    async fn url_for_direct_upload(
        &self,
        key: &str,
        expires_in: Duration,
        _content_type: &str,
        _content_length: u64,
        _checksum: &str,
    ) -> StorageResult<String> {
        let start = Instant::now();
        let result = expiry_from_now(expires_in).and_then(|expiry| {
            self.sign_url(
                key,
                &SasOptions {
                    permissions: "rw",
                    expiry,
                    content_disposition: None,
                },
            )
        });

        let mut event = StorageEvent::new(Operation::Url, SERVICE_NAME, key, start).with_outcome(&result);
        if let Ok(url) = &result {
            event = event.with_url(url);
        }
        self.emit(event);
        result
    }

    fn headers_for_direct_upload(
        &self,
        _key: &str,
        content_type: &str,
        checksum: &str,
    ) -> HashMap<String, String> {
        HashMap::from([
            ("Content-Type".to_string(), content_type.to_string()),
            ("Content-MD5".to_string(), checksum.to_string()),
            ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
        ])
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Azure
    }
}
