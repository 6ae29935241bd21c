#[cfg(feature = "storage-azure")]
use crate::AzureService;
#[cfg(feature = "storage-local")]
use crate::DiskService;
use crate::{StorageBackend, StorageError, StorageResult, StorageService};
use std::sync::Arc;
use stowage_core::StorageConfig;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn StorageService>> {
    match config.storage_backend {
        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let disk = config.disk.as_ref().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_ROOT not configured".to_string())
            })?;

            let storage = DiskService::new(disk).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-azure")]
        StorageBackend::Azure => {
            let azure = config.azure.as_ref().ok_or_else(|| {
                StorageError::ConfigError(
                    "AZURE_STORAGE_ACCOUNT_NAME, AZURE_STORAGE_ACCESS_KEY and AZURE_STORAGE_CONTAINER must be configured"
                        .to_string(),
                )
            })?;

            let storage = AzureService::new(azure)?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-azure"))]
        StorageBackend::Azure => Err(StorageError::ConfigError(
            "Azure storage backend not available (storage-azure feature not enabled)".to_string(),
        )),
    }
}

#[cfg(all(test, feature = "storage-local", feature = "storage-azure"))]
mod tests {
    use super::*;
    use stowage_core::{AzureConfig, DiskConfig};

    fn config(backend: StorageBackend) -> StorageConfig {
        StorageConfig {
            storage_backend: backend,
            disk: None,
            azure: None,
        }
    }

    #[tokio::test]
    async fn test_creates_disk_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(StorageBackend::Local);
        config.disk = Some(DiskConfig {
            root: dir.path().join("blobs"),
            url_prefix: "/blobs".to_string(),
            signing_secret: "0123456789abcdef0123456789abcdef".to_string(),
        });

        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert!(dir.path().join("blobs").is_dir());
    }

    #[tokio::test]
    async fn test_creates_azure_service() {
        let mut config = config(StorageBackend::Azure);
        config.azure = Some(AzureConfig {
            path: "https://devstoreaccount1.blob.core.windows.net".to_string(),
            storage_account_name: "devstoreaccount1".to_string(),
            storage_access_key: "c2VjcmV0LWtleQ==".to_string(),
            container: "attachments".to_string(),
        });

        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Azure);
    }

    #[tokio::test]
    async fn test_missing_backend_section_is_config_error() {
        for backend in [StorageBackend::Local, StorageBackend::Azure] {
            let result = create_storage(&config(backend)).await;
            assert!(matches!(result, Err(StorageError::ConfigError(_))));
        }
    }
}
