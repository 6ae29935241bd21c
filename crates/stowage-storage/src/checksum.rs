//! Content checksums in the `Content-MD5` format (base64 of the raw MD5 digest).

use base64::Engine;
use md5::{Digest, Md5};

/// Base64-encoded MD5 digest of `data`.
pub fn compute_checksum(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Incremental variant for content read in chunks.
#[derive(Default)]
pub struct ChecksumWriter {
    hasher: Md5,
}

impl ChecksumWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finish(self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.hasher.finalize())
    }
}
