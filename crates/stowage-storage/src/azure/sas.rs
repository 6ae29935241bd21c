//! Service shared access signatures for individual blobs.
//!
//! Signing is purely local: the account key signs a canonical description of
//! the grant (permissions, expiry, resource, response overrides).

use super::client::sign_with_key;
use crate::keys::encode_component;
use crate::traits::StorageResult;
use chrono::{DateTime, Utc};

pub const SAS_VERSION: &str = "2018-11-09";

/// What a signed URL grants
#[derive(Debug, Clone)]
pub struct SasOptions<'a> {
    /// e.g. "r" or "rw"
    pub permissions: &'a str,
    pub expiry: DateTime<Utc>,
    /// Sent back as the response's Content-Disposition (`rscd`)
    pub content_disposition: Option<&'a str>,
}

#[derive(Clone)]
pub struct SasSigner {
    account: String,
    key: Vec<u8>,
}

impl SasSigner {
    pub fn new(account: &str, key: Vec<u8>) -> Self {
        Self {
            account: account.to_string(),
            key,
        }
    }

    /// Append a SAS query string to `base_url`, the address of `container/key`.
    pub fn signed_url(
        &self,
        base_url: &str,
        container: &str,
        key: &str,
        options: &SasOptions<'_>,
    ) -> StorageResult<String> {
        Ok(format!("{}?{}", base_url, self.query(container, key, options)?))
    }

    /// The SAS query string (without the leading `?`).
    pub fn query(&self, container: &str, key: &str, options: &SasOptions<'_>) -> StorageResult<String> {
        let expiry = format_expiry(options.expiry);
        let signature = sign_with_key(&self.key, &self.string_to_sign(container, key, options, &expiry))?;

        let mut params = vec![
            ("sv", SAS_VERSION.to_string()),
            ("se", expiry),
            ("sr", "b".to_string()),
            ("sp", options.permissions.to_string()),
        ];
        if let Some(disposition) = options.content_disposition {
            params.push(("rscd", disposition.to_string()));
        }
        params.push(("sig", signature));

        Ok(params
            .iter()
            .map(|(name, value)| format!("{}={}", name, encode_component(value)))
            .collect::<Vec<_>>()
            .join("&"))
    }

    pub(crate) fn string_to_sign(
        &self,
        container: &str,
        key: &str,
        options: &SasOptions<'_>,
        expiry: &str,
    ) -> String {
        let canonical_resource = format!("/blob/{}/{}/{}", self.account, container, key);
        [
            options.permissions,
            "", // signed start
            expiry,
            canonical_resource.as_str(),
            "", // signed identifier
            "", // signed IP
            "", // signed protocol
            SAS_VERSION,
            "b", // signed resource
            "", // snapshot time
            "", // rscc
            options.content_disposition.unwrap_or(""),
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n")
    }
}

/// ISO 8601 in UTC with second precision, e.g. `2026-10-14T12:00:00Z`
pub fn format_expiry(expiry: DateTime<Utc>) -> String {
    expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
