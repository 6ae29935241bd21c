use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use stowage_storage::checksum::ChecksumWriter;
use stowage_storage::ByteReader;
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Initialize tracing for CLI binaries.
///
/// Logs go to stderr so stdout carries only JSON results.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize result")?;
    println!("{}", out);
    Ok(())
}

/// Base64 MD5 of a file, read in bounded pieces.
pub async fn checksum_file(path: &Path) -> anyhow::Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut writer = ChecksumWriter::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        writer.update(&buffer[..read]);
    }
    Ok(writer.finish())
}

/// Open a file as an upload source.
pub async fn open_reader(path: &Path) -> anyhow::Result<ByteReader> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::pin(file))
}
