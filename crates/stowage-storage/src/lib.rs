//! Stowage Storage Library
//!
//! This crate provides the `StorageService` trait and two implementations:
//! a local filesystem backend ([`DiskService`]) and an Azure Blob Storage
//! backend ([`AzureService`]).
//!
//! # Storage key format
//!
//! Keys are opaque strings chosen by the caller. They must not be empty or
//! contain `.` or `..` as a whole `/`-separated segment. The disk backend also
//! refuses a leading `/`, `\` and NUL, and shards files into two directory
//! levels taken from the first four characters of the key
//! (`root/ab/cd/abcdef...`, separators in the prefix dropped). Azure stores the
//! key verbatim inside the container.

pub mod checksum;
pub mod factory;
pub mod instrument;
pub(crate) mod keys;
#[cfg(feature = "storage-azure")]
pub mod azure;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod traits;
pub mod verified_key;

// Re-export commonly used types
#[cfg(feature = "storage-azure")]
pub use azure::AzureService;
pub use checksum::compute_checksum;
pub use factory::create_storage;
pub use instrument::{Instrumenter, MemoryInstrumenter, Operation, StorageEvent, TracingInstrumenter};
#[cfg(feature = "storage-local")]
pub use local::{DiskService, PathUrlBuilder, UrlBuilder};
pub use stowage_core::StorageBackend;
pub use traits::{ByteReader, ChunkSink, StorageError, StorageResult, StorageService};
pub use verified_key::{BlobKeyClaims, DirectUploadClaims, KeyVerifier};
