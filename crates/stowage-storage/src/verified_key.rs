//! Signed, expiring tokens for the disk backend.
//!
//! The disk backend cannot serve bytes itself, so `url` hands out a token that
//! an external HTTP endpoint redeems. Token = `base64url(claims_json) "." base64url(mac)`
//! where mac = HMAC-SHA256(secret, claims_json). The claims carry a purpose so a
//! download token cannot be replayed as an upload token.

use crate::traits::{StorageError, StorageResult};
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

const BLOB_KEY_PURPOSE: &str = "blob_key";
const DIRECT_UPLOAD_PURPOSE: &str = "blob_token";

/// Claims of a download token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobKeyClaims {
    pub key: String,
    pub disposition: String,
    pub filename: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

/// Claims of a direct-upload token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectUploadClaims {
    pub key: String,
    pub content_type: String,
    pub content_length: u64,
    pub checksum: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    purpose: String,
    #[serde(flatten)]
    claims: T,
}

/// Current UTC time plus `expires_in`.
pub fn expiry_from_now(expires_in: Duration) -> StorageResult<DateTime<Utc>> {
    TimeDelta::from_std(expires_in)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .ok_or_else(|| StorageError::InvalidToken(format!("Expiry out of range: {:?}", expires_in)))
}

/// Signs and verifies blob tokens with a shared secret.
#[derive(Clone)]
pub struct KeyVerifier {
    secret: Vec<u8>,
}

impl KeyVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn encode_blob_key(&self, claims: &BlobKeyClaims) -> StorageResult<String> {
        self.encode(BLOB_KEY_PURPOSE, claims)
    }

    pub fn verify_blob_key(&self, token: &str) -> StorageResult<BlobKeyClaims> {
        let claims: BlobKeyClaims = self.verify(BLOB_KEY_PURPOSE, token)?;
        check_expiry(claims.expires_at)?;
        Ok(claims)
    }

    pub fn encode_direct_upload(&self, claims: &DirectUploadClaims) -> StorageResult<String> {
        self.encode(DIRECT_UPLOAD_PURPOSE, claims)
    }

    pub fn verify_direct_upload(&self, token: &str) -> StorageResult<DirectUploadClaims> {
        let claims: DirectUploadClaims = self.verify(DIRECT_UPLOAD_PURPOSE, token)?;
        check_expiry(claims.expires_at)?;
        Ok(claims)
    }

    fn mac(&self) -> StorageResult<Hmac<Sha256>> {
        Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|e| StorageError::ConfigError(format!("Invalid signing secret: {}", e)))
    }

    fn encode<T: Serialize>(&self, purpose: &str, claims: &T) -> StorageResult<String> {
        let envelope = Envelope {
            purpose: purpose.to_string(),
            claims,
        };
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| StorageError::InvalidToken(format!("Failed to encode claims: {}", e)))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            base64_url_encode(&payload),
            base64_url_encode(&tag)
        ))
    }

    fn verify<T: DeserializeOwned>(&self, purpose: &str, token: &str) -> StorageResult<T> {
        let invalid = || StorageError::InvalidToken("Invalid blob token".to_string());

        let (payload_b64, tag_b64) = token.split_once('.').ok_or_else(invalid)?;
        let payload = base64_url_decode(payload_b64).map_err(|_| invalid())?;
        let tag = base64_url_decode(tag_b64).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&tag).map_err(|_| invalid())?;

        let envelope: Envelope<T> = serde_json::from_slice(&payload).map_err(|_| invalid())?;
        if envelope.purpose != purpose {
            return Err(StorageError::InvalidToken(format!(
                "Token purpose mismatch: expected {}",
                purpose
            )));
        }
        Ok(envelope.claims)
    }
}

fn check_expiry(expires_at: DateTime<Utc>) -> StorageResult<()> {
    if Utc::now() > expires_at {
        return Err(StorageError::InvalidToken("Blob token has expired".to_string()));
    }
    Ok(())
}

fn base64_url_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)
}
