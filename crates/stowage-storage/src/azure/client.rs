//! Minimal Azure Blob REST client authenticated with Shared Key.
//!
//! Only the four calls the storage service needs: Put Blob, Get Blob (optionally
//! ranged), Get Blob Properties and Delete Blob. Absence (HTTP 404) is reported
//! as `None`/`false`; every other non-success status becomes
//! [`StorageError::BackendError`].

use crate::keys::encode_key_path;
use crate::traits::{StorageError, StorageResult};
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use http::{Method, StatusCode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use sha2::Sha256;

pub const API_VERSION: &str = "2019-12-12";

const MAX_ERROR_BODY_LEN: usize = 512;

/// Properties returned by Get Blob Properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub content_md5: Option<String>,
}

#[derive(Clone)]
pub struct AzureBlobClient {
    http: reqwest::Client,
    path: String,
    account: String,
    key: Vec<u8>,
}

impl AzureBlobClient {
    /// `path` is the blob service base URL, `key` the decoded account key.
    pub fn new(path: &str, account: &str, key: Vec<u8>) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            path: path.trim_end_matches('/').to_string(),
            account: account.to_string(),
            key,
        })
    }

    /// Address of a blob: `{path}/{container}/{key}`
    pub fn blob_url(&self, container: &str, key: &str) -> String {
        format!("{}/{}/{}", self.path, container, encode_key_path(key))
    }

    pub async fn put_block_blob(
        &self,
        container: &str,
        key: &str,
        body: Bytes,
        content_md5: Option<&str>,
    ) -> StorageResult<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-ms-blob-type"),
            HeaderValue::from_static("BlockBlob"),
        );
        if let Some(md5) = content_md5 {
            let value = HeaderValue::from_str(md5)
                .map_err(|_| StorageError::Integrity(format!("Malformed checksum: {}", md5)))?;
            headers.insert(HeaderName::from_static("content-md5"), value);
        }

        let response = self
            .send(Method::PUT, container, key, headers, Some(body))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// Get Blob, optionally restricted to the inclusive byte range `(start, end)`.
    pub async fn get_blob(
        &self,
        container: &str,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> StorageResult<Option<Bytes>> {
        let mut headers = HeaderMap::new();
        if let Some((start, end)) = range {
            let value = HeaderValue::from_str(&format!("bytes={}-{}", start, end))
                .map_err(|e| StorageError::ConfigError(e.to_string()))?;
            headers.insert(HeaderName::from_static("x-ms-range"), value);
        }

        let response = self.send(Method::GET, container, key, headers, None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            _ => Err(error_from_response(response).await),
        }
    }

    pub async fn get_blob_properties(
        &self,
        container: &str,
        key: &str,
    ) -> StorageResult<Option<BlobProperties>> {
        let response = self
            .send(Method::HEAD, container, key, HeaderMap::new(), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let headers = response.headers();
                // reqwest reports a zero body length for HEAD, so read the header itself
                let content_length = header_str(headers, CONTENT_LENGTH.as_str())
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| StorageError::BackendError {
                        status: status.as_u16(),
                        code: None,
                        message: "Blob properties response has no Content-Length".to_string(),
                    })?;
                Ok(Some(BlobProperties {
                    content_length,
                    content_type: header_str(headers, "content-type").map(String::from),
                    content_md5: header_str(headers, "content-md5").map(String::from),
                }))
            }
            _ => Err(error_from_response(response).await),
        }
    }

    /// Returns `false` when the blob did not exist.
    pub async fn delete_blob(&self, container: &str, key: &str) -> StorageResult<bool> {
        let response = self
            .send(Method::DELETE, container, key, HeaderMap::new(), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn send(
        &self,
        method: Method,
        container: &str,
        key: &str,
        mut headers: HeaderMap,
        body: Option<Bytes>,
    ) -> StorageResult<reqwest::Response> {
        let url = reqwest::Url::parse(&self.blob_url(container, key))
            .map_err(|e| StorageError::InvalidKey(format!("Invalid blob URL for {}: {}", key, e)))?;

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert(
            HeaderName::from_static("x-ms-date"),
            HeaderValue::from_str(&date).map_err(|e| StorageError::ConfigError(e.to_string()))?,
        );
        headers.insert(
            HeaderName::from_static("x-ms-version"),
            HeaderValue::from_static(API_VERSION),
        );

        let content_length = body.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        let string_to_sign = self.string_to_sign(&method, url.path(), &headers, content_length);
        let authorization = format!("SharedKey {}:{}", self.account, self.sign(&string_to_sign)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| StorageError::ConfigError(e.to_string()))?,
        );

        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }

    /// Shared Key string-to-sign for the Blob service.
    pub(crate) fn string_to_sign(
        &self,
        method: &Method,
        url_path: &str,
        headers: &HeaderMap,
        content_length: u64,
    ) -> String {
        let standard = |name: &str| header_str(headers, name).unwrap_or("").to_string();
        let content_length = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };

        let mut canonical_headers: Vec<(String, String)> = headers
            .iter()
            .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("").trim().to_string(),
                )
            })
            .collect();
        canonical_headers.sort();
        let canonical_headers: String = canonical_headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect();

        format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}/{}{}",
            method.as_str(),
            standard("content-encoding"),
            standard("content-language"),
            content_length,
            standard("content-md5"),
            standard("content-type"),
            standard("date"),
            standard("if-modified-since"),
            standard("if-match"),
            standard("if-none-match"),
            standard("if-unmodified-since"),
            standard("range"),
            canonical_headers,
            self.account,
            url_path
        )
    }

    fn sign(&self, string_to_sign: &str) -> StorageResult<String> {
        sign_with_key(&self.key, string_to_sign)
    }
}

/// base64(HMAC-SHA256(key, string_to_sign))
pub(crate) fn sign_with_key(key: &[u8], string_to_sign: &str) -> StorageResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| StorageError::ConfigError(format!("Invalid account key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn error_from_response(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let code = header_str(response.headers(), "x-ms-error-code").map(String::from);
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY_LEN {
        let mut end = MAX_ERROR_BODY_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    if message.is_empty() {
        message = code.clone().unwrap_or_else(|| format!("HTTP {}", status));
    }

    StorageError::BackendError {
        status,
        code,
        message,
    }
}
