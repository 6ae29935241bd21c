//! Stowage Core Library
//!
//! This crate provides the configuration and shared types used by the
//! storage backends and the command-line tool.

pub mod config;
pub mod storage_types;

// Re-export commonly used types
pub use config::{AzureConfig, DiskConfig, StorageConfig};
pub use storage_types::StorageBackend;
