//! Drives the disk backend through the `StorageService` contract, the way callers
//! see it: built by the factory and used behind `Arc<dyn StorageService>`.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use stowage_core::{DiskConfig, StorageBackend, StorageConfig};
use stowage_storage::{
    compute_checksum, create_storage, ByteReader, DiskService, KeyVerifier, StorageError,
    StorageService,
};
use tempfile::TempDir;

const SECRET: &str = "integration-secret-0123456789abcdef";

fn disk_config(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        storage_backend: StorageBackend::Local,
        disk: Some(DiskConfig {
            root: dir.path().to_path_buf(),
            url_prefix: "/blobs".to_string(),
            signing_secret: SECRET.to_string(),
        }),
        azure: None,
    }
}

fn reader(data: Vec<u8>) -> ByteReader {
    Box::pin(std::io::Cursor::new(data))
}

async fn storage(dir: &TempDir) -> Arc<dyn StorageService> {
    create_storage(&disk_config(dir)).await.unwrap()
}

fn token_from(url: &str) -> &str {
    let path = url.strip_prefix("/blobs/").unwrap();
    path.split('?').next().unwrap()
}

#[tokio::test]
async fn test_blob_lifecycle() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;
    let data = b"attachment body".to_vec();
    let checksum = compute_checksum(&data);

    assert!(!storage.exists("3fa85f6457174562").await.unwrap());

    storage
        .upload("3fa85f6457174562", reader(data.clone()), Some(&checksum))
        .await
        .unwrap();
    assert!(storage.exists("3fa85f6457174562").await.unwrap());
    assert!(dir.path().join("3f/a8/3fa85f6457174562").is_file());

    let downloaded = storage.download("3fa85f6457174562").await.unwrap();
    assert_eq!(compute_checksum(&downloaded), checksum);

    storage.delete("3fa85f6457174562").await.unwrap();
    assert!(!storage.exists("3fa85f6457174562").await.unwrap());
    assert!(matches!(
        storage.download("3fa85f6457174562").await,
        Err(StorageError::NotFound(_))
    ));

    // Deleting again is not an error
    storage.delete("3fa85f6457174562").await.unwrap();
}

#[tokio::test]
async fn test_chunks_reassemble_to_the_uploaded_bytes() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    storage.upload("chunkykey", reader(data.clone()), None).await.unwrap();

    let mut chunks: Vec<Bytes> = Vec::new();
    storage
        .download_chunks("chunkykey", &mut |chunk| {
            chunks.push(chunk);
            Ok(())
        })
        .await
        .unwrap();

    assert!(chunks.iter().all(|c| !c.is_empty()));
    assert_eq!(chunks.concat(), data);
}

#[tokio::test]
async fn test_signed_url_verifies_with_the_configured_secret() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;

    let url = storage
        .url("3fa85f6457174562", Duration::from_secs(300), "inline", "photo.png")
        .await
        .unwrap();

    assert!(url.starts_with("/blobs/"));
    assert!(url.contains("disposition=inline"));
    assert!(url.contains("filename=photo.png"));

    let claims = KeyVerifier::new(SECRET).verify_blob_key(token_from(&url)).unwrap();
    assert_eq!(claims.key, "3fa85f6457174562");
    assert_eq!(claims.disposition, "inline");
    assert_eq!(claims.filename, "photo.png");

    let other = KeyVerifier::new("a-different-secret-0123456789abcdef");
    assert!(matches!(
        other.verify_blob_key(token_from(&url)),
        Err(StorageError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_direct_upload_round_trip() {
    let dir = TempDir::new().unwrap();
    let disk = DiskService::new(disk_config(&dir).disk.as_ref().unwrap())
        .await
        .unwrap();
    let data = b"uploaded by the browser".to_vec();
    let checksum = compute_checksum(&data);

    let url = disk
        .url_for_direct_upload(
            "direct0001",
            Duration::from_secs(60),
            "text/plain",
            data.len() as u64,
            &checksum,
        )
        .await
        .unwrap();
    let headers = disk.headers_for_direct_upload("direct0001", "text/plain", &checksum);
    assert_eq!(headers.get("Content-Type").map(String::as_str), Some("text/plain"));

    // What an upload endpoint does with the token before accepting the body
    let claims = disk.resolve_direct_upload(token_from(&url)).unwrap();
    assert_eq!(claims.key, "direct0001");
    assert_eq!(claims.content_length, data.len() as u64);
    assert_eq!(claims.checksum, checksum);

    disk.upload(&claims.key, reader(data.clone()), Some(&claims.checksum))
        .await
        .unwrap();
    assert_eq!(&disk.download("direct0001").await.unwrap()[..], &data[..]);
}

#[tokio::test]
async fn test_invalid_keys_never_touch_the_filesystem() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;

    for key in ["", "../outside", "/etc/passwd", "a\\b"] {
        assert!(matches!(
            storage.upload(key, reader(b"x".to_vec()), None).await,
            Err(StorageError::InvalidKey(_))
        ));
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
