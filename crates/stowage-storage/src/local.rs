use crate::instrument::{Instrumenter, Operation, StorageEvent, TracingInstrumenter};
use crate::keys::{encode_component, shard_segments, validate_disk_key};
use crate::traits::{ByteReader, ChunkSink, StorageError, StorageResult, StorageService};
use crate::verified_key::{expiry_from_now, BlobKeyClaims, DirectUploadClaims, KeyVerifier};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stowage_core::DiskConfig;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const SERVICE_NAME: &str = "disk";

/// Read and write buffer size
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Turns signed tokens into URLs served by whatever HTTP layer redeems them.
pub trait UrlBuilder: Send + Sync {
    /// URL that streams the blob named by a download token
    fn blob_url(&self, token: &str, disposition: &str, filename: &str) -> String;

    /// URL that accepts a PUT of the blob named by a direct-upload token
    fn direct_upload_url(&self, token: &str) -> String;
}

/// Default builder: `{prefix}/{token}?disposition=...&filename=...`
#[derive(Debug, Clone)]
pub struct PathUrlBuilder {
    prefix: String,
}

impl PathUrlBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }
}

impl UrlBuilder for PathUrlBuilder {
    fn blob_url(&self, token: &str, disposition: &str, filename: &str) -> String {
        format!(
            "{}/{}?disposition={}&filename={}",
            self.prefix,
            token,
            encode_component(disposition),
            encode_component(filename)
        )
    }

    fn direct_upload_url(&self, token: &str) -> String {
        format!("{}/{}", self.prefix, token)
    }
}

/// Local filesystem storage implementation
///
/// Blobs live at `root/{key[0..2]}/{key[2..4]}/{key}`.
#[derive(Clone)]
pub struct DiskService {
    root: PathBuf,
    verifier: KeyVerifier,
    url_builder: Arc<dyn UrlBuilder>,
    instrumenter: Arc<dyn Instrumenter>,
}

impl DiskService {
    /// Create a new DiskService, creating the root directory if needed.
    ///
    /// URLs use a [`PathUrlBuilder`] on `config.url_prefix` and events go to
    /// [`TracingInstrumenter`]; both can be replaced with the `with_*` methods.
    pub async fn new(config: &DiskConfig) -> StorageResult<Self> {
        fs::create_dir_all(&config.root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                config.root.display(),
                e
            ))
        })?;

        Ok(DiskService {
            root: config.root.clone(),
            verifier: KeyVerifier::new(config.signing_secret.as_bytes()),
            url_builder: Arc::new(PathUrlBuilder::new(config.url_prefix.clone())),
            instrumenter: Arc::new(TracingInstrumenter),
        })
    }

    pub fn with_url_builder(mut self, url_builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = url_builder;
        self
    }

    pub fn with_instrumenter(mut self, instrumenter: Arc<dyn Instrumenter>) -> Self {
        self.instrumenter = instrumenter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Verify a download token and return its claims.
    pub fn resolve_download(&self, token: &str) -> StorageResult<BlobKeyClaims> {
        let claims = self.verifier.verify_blob_key(token)?;
        validate_disk_key(&claims.key)?;
        Ok(claims)
    }

    /// Verify a direct-upload token and return its claims.
    pub fn resolve_direct_upload(&self, token: &str) -> StorageResult<DirectUploadClaims> {
        let claims = self.verifier.verify_direct_upload(token)?;
        validate_disk_key(&claims.key)?;
        Ok(claims)
    }

    /// Filesystem location of `key`.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_disk_key(key)?;
        let mut path = self.root.clone();
        for segment in shard_segments(key) {
            path.push(segment);
        }
        path.push(key);

        if !path.starts_with(&self.root) {
            return Err(StorageError::InvalidKey(format!(
                "Storage key resolves outside storage directory: {}",
                key
            )));
        }
        Ok(path)
    }

    fn emit(&self, event: StorageEvent) {
        self.instrumenter.instrument(event);
    }

    async fn write_blob(&self, key: &str, mut reader: ByteReader) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let start = Instant::now();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        let mut size = 0u64;
        loop {
            let chunk = read_chunk(&mut reader, CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.sync_all().await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );
        Ok(())
    }

    async fn read_blob(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.path_for(key)?;
        let data = fs::read(&path).await.map_err(|e| not_found_or_io(e, key))?;
        Ok(Bytes::from(data))
    }

    async fn remove_blob(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Already deleted
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    async fn blob_exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn signed_blob_url(
        &self,
        key: &str,
        expires_in: Duration,
        disposition: &str,
        filename: &str,
    ) -> StorageResult<String> {
        validate_disk_key(key)?;
        let token = self.verifier.encode_blob_key(&BlobKeyClaims {
            key: key.to_string(),
            disposition: disposition.to_string(),
            filename: filename.to_string(),
            expires_at: expiry_from_now(expires_in)?,
        })?;
        Ok(self.url_builder.blob_url(&token, disposition, filename))
    }

    fn signed_upload_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
        content_length: u64,
        checksum: &str,
    ) -> StorageResult<String> {
        validate_disk_key(key)?;
        let token = self.verifier.encode_direct_upload(&DirectUploadClaims {
            key: key.to_string(),
            content_type: content_type.to_string(),
            content_length,
            checksum: checksum.to_string(),
            expires_at: expiry_from_now(expires_in)?,
        })?;
        Ok(self.url_builder.direct_upload_url(&token))
    }

    async fn stream_file(&self, key: &str, sink: &mut ChunkSink<'_>) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, key))?;

        loop {
            let chunk = read_chunk(&mut file, CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            let last = chunk.len() < CHUNK_SIZE;
            sink(Bytes::from(chunk))?;
            if last {
                break;
            }
        }
        Ok(())
    }
}

/// Read up to `size` bytes, stopping short only at EOF.
async fn read_chunk<R>(reader: &mut R, size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}

fn not_found_or_io(err: std::io::Error, key: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::IoError(err)
    }
}

#[async_trait]
impl StorageService for DiskService {
    async fn upload(
        &self,
        key: &str,
        reader: ByteReader,
        checksum: Option<&str>,
    ) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.write_blob(key, reader).await;

        self.emit(
            StorageEvent::new(Operation::Upload, SERVICE_NAME, key, start)
                .with_checksum(checksum)
                .with_outcome(&result),
        );
        result
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let start = Instant::now();
        let result = self.read_blob(key).await;

        self.emit(StorageEvent::new(Operation::Download, SERVICE_NAME, key, start).with_outcome(&result));
        result
    }

    async fn download_chunks(&self, key: &str, sink: &mut ChunkSink<'_>) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.stream_file(key, sink).await;

        self.emit(
            StorageEvent::new(Operation::StreamingDownload, SERVICE_NAME, key, start)
                .with_outcome(&result),
        );
        result
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.remove_blob(key).await;

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
        let result = self.signed_blob_url(key, expires_in, disposition, filename);

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
        content_type: &str,
        content_length: u64,
        checksum: &str,
    ) -> StorageResult<String> {
        let start = Instant::now();
        let result = self.signed_upload_url(key, expires_in, content_type, content_length, checksum);

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
        _checksum: &str,
    ) -> HashMap<String, String> {
        HashMap::from([("Content-Type".to_string(), content_type.to_string())])
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
