//! Shared key validation, the disk shard layout, and URL encoding of key components.

use crate::traits::{StorageError, StorageResult};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped in a URL component (RFC 3986 unreserved set).
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a query value or a single path segment.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URL_COMPONENT).to_string()
}

/// Percent-encode a key for use as a URL path, keeping `/` separators.
pub fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject keys no backend can address.
///
/// URL parsing collapses `.` and `..` path segments, so those are refused as
/// whole segments. `..` inside a segment (`report..v2.pdf`) is fine.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains a dot segment: {}",
            key
        )));
    }
    Ok(())
}

/// Reject keys that could escape a filesystem root.
pub fn validate_disk_key(key: &str) -> StorageResult<()> {
    validate_key(key)?;
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

/// Two-level shard folders for a key: characters `[0, 2)` and `[2, 4)`.
///
/// Separators inside the prefix are dropped, as are segments left empty, so a
/// segment is never absolute. Short keys yield shorter (or no) segments.
pub fn shard_segments(key: &str) -> Vec<String> {
    let chars: Vec<char> = key.chars().take(4).collect();
    chars
        .chunks(2)
        .map(|pair| pair.iter().filter(|c| **c != '/').collect::<String>())
        .filter(|segment| !segment.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_by_first_four_characters() {
        assert_eq!(shard_segments("abcdef123"), vec!["ab", "cd"]);
    }

    #[test]
    fn short_keys_produce_partial_shards() {
        assert_eq!(shard_segments("abc"), vec!["ab", "c"]);
        assert_eq!(shard_segments("a"), vec!["a"]);
    }

    #[test]
    fn shards_count_characters_not_bytes() {
        assert_eq!(shard_segments("éèàù-x"), vec!["éè", "àù"]);
    }

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(encode_component("inline; filename=\"a b.png\""), "inline%3B%20filename%3D%22a%20b.png%22");
        assert_eq!(encode_component("2026-10-14T12:00:00Z"), "2026-10-14T12%3A00%3A00Z");
        assert_eq!(encode_key_path("variants/a b"), "variants/a%20b");
    }

    #[test]
    fn separators_never_reach_a_shard_segment() {
        assert_eq!(shard_segments("ab/zfile"), vec!["ab", "z"]);
        assert_eq!(shard_segments("abc/file"), vec!["ab", "c"]);
        assert_eq!(shard_segments("a/bcdef"), vec!["a", "bc"]);
        assert_eq!(shard_segments("ab//x"), vec!["ab"]);
    }

    #[test]
    fn rejects_traversal_and_absolute_keys() {
        assert!(matches!(validate_disk_key(""), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_disk_key("../etc/passwd"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_disk_key("a/../../b"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_disk_key("/etc/passwd"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_disk_key("a\\b"), Err(StorageError::InvalidKey(_))));
        assert!(validate_disk_key("xk3j9q0p2m").is_ok());
    }

    #[test]
    fn double_dots_inside_a_segment_are_allowed() {
        assert!(validate_disk_key("report..v2.pdf").is_ok());
        assert!(validate_disk_key("a..b/c..").is_ok());
    }

    #[test]
    fn addressable_keys_only_exclude_empty_and_dot_segments() {
        assert!(matches!(validate_key(""), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_key("../x"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_key("a/./b"), Err(StorageError::InvalidKey(_))));
        assert!(validate_key("report..v2.pdf").is_ok());
        assert!(validate_key("/leading/slash").is_ok());
        assert!(validate_key("back\\slash").is_ok());
    }
}
