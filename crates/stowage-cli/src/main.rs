//! Stowage CLI: drive the configured storage backend from the command line.
//!
//! Configuration comes from the environment (see `StorageConfig::from_env`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use stowage_cli::{checksum_file, init_tracing, open_reader, print_json};
use stowage_core::StorageConfig;
use stowage_storage::{create_storage, StorageError};

#[derive(Parser)]
#[command(name = "stowage", about = "Blob storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the base64 MD5 checksum of a file
    Checksum { file: PathBuf },
    #[command(flatten)]
    Storage(StorageCommands),
}

/// Commands that need a configured backend
#[derive(Subcommand)]
enum StorageCommands {
    /// Upload a file under a key
    Upload {
        key: String,
        file: PathBuf,
        /// Base64 MD5 the backend should verify
        #[arg(long)]
        checksum: Option<String>,
        /// Compute the checksum from the file and send it
        #[arg(long, conflicts_with = "checksum")]
        verify: bool,
    },
    /// Download a blob to a file or stdout
    Download {
        key: String,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Download in chunks instead of all at once
        #[arg(long)]
        stream: bool,
    },
    /// Delete a blob
    Delete { key: String },
    /// Check whether a blob exists
    Exists { key: String },
    /// Generate a signed download URL
    Url {
        key: String,
        /// Lifetime in seconds
        #[arg(long, default_value = "300")]
        expires_in: u64,
        #[arg(long, default_value = "inline")]
        disposition: String,
        /// Defaults to the key
        #[arg(long)]
        filename: Option<String>,
    },
    /// Generate a direct-upload URL and the headers the client must send
    DirectUpload {
        key: String,
        #[arg(long)]
        content_type: String,
        #[arg(long)]
        content_length: u64,
        #[arg(long)]
        checksum: String,
        #[arg(long, default_value = "300")]
        expires_in: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Checksum { file } => {
            let checksum = checksum_file(&file).await?;
            return print_json(&serde_json::json!({ "file": file, "checksum": checksum }));
        }
        Commands::Storage(command) => command,
    };

    let config = StorageConfig::from_env().context("Failed to load storage configuration")?;
    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::debug!(backend = %storage.backend_type(), "Storage backend ready");

    match command {
        StorageCommands::Upload {
            key,
            file,
            checksum,
            verify,
        } => {
            let checksum = match (checksum, verify) {
                (Some(checksum), _) => Some(checksum),
                (None, true) => Some(checksum_file(&file).await?),
                (None, false) => None,
            };
            let reader = open_reader(&file).await?;
            storage.upload(&key, reader, checksum.as_deref()).await?;
            print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "checksum": checksum,
            }))?;
        }
        StorageCommands::Download { key, out, stream } => {
            let mut sink: Box<dyn Write + Send> = match &out {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout()),
            };

            let size = if stream {
                let mut size = 0usize;
                storage
                    .download_chunks(&key, &mut |chunk| {
                        size += chunk.len();
                        sink.write_all(&chunk).map_err(StorageError::from)
                    })
                    .await?;
                size
            } else {
                let data = storage.download(&key).await?;
                sink.write_all(&data)?;
                data.len()
            };
            sink.flush()?;

            // Keep stdout clean when it carries the blob
            if let Some(path) = out {
                print_json(&serde_json::json!({
                    "key": key,
                    "file": path,
                    "size_bytes": size,
                }))?;
            }
        }
        StorageCommands::Delete { key } => {
            storage.delete(&key).await?;
            print_json(&serde_json::json!({ "success": true, "key": key }))?;
        }
        StorageCommands::Exists { key } => {
            let exists = storage.exists(&key).await?;
            print_json(&serde_json::json!({ "key": key, "exists": exists }))?;
        }
        StorageCommands::Url {
            key,
            expires_in,
            disposition,
            filename,
        } => {
            let filename = filename.unwrap_or_else(|| key.clone());
            let url = storage
                .url(&key, Duration::from_secs(expires_in), &disposition, &filename)
                .await?;
            print_json(&serde_json::json!({ "key": key, "url": url }))?;
        }
        StorageCommands::DirectUpload {
            key,
            content_type,
            content_length,
            checksum,
            expires_in,
        } => {
            let url = storage
                .url_for_direct_upload(
                    &key,
                    Duration::from_secs(expires_in),
                    &content_type,
                    content_length,
                    &checksum,
                )
                .await?;
            let headers = storage.headers_for_direct_upload(&key, &content_type, &checksum);
            print_json(&serde_json::json!({
                "key": key,
                "url": url,
                "headers": headers,
            }))?;
        }
    }

    Ok(())
}
