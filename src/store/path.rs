//! Deterministic key-to-path derivation.
//!
//! A content key is hashed (SHA-1), hex-encoded, and the digest split into
//! fixed-size blocks that become directory segments. The file name is the
//! full digest. The derivation is a pure function: no I/O, same key always
//! yields the same [`PathKey`].
//!
//! ```text
//! key "password"
//!   → sha1 = 5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8
//!   → dirs  5baa6/1e4c9/b93f3/f0682/250b6/cf833/1b7ee/68fd8
//!   → file  5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8
//! ```
//!
//! Trailing digest characters shorter than one block are dropped, not
//! padded. Many keys share the same first segment; that first segment is
//! the deletion granularity for the whole shard subtree.

use sha1::{Digest, Sha1};
use std::path::PathBuf;
use std::sync::Arc;

/// Number of hex characters per directory segment.
const BLOCK_SIZE: usize = 5;

/// Derived on-disk location for a content key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathKey {
    /// Directory segments, outermost first.
    pub segments: Vec<String>,
    /// File name under the innermost segment (the full digest).
    pub file_name: String,
}

impl PathKey {
    /// The first (outermost) segment — the shard this key lives in, or
    /// `None` when the transform produced no directory segments.
    pub fn first_segment(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Directory chain relative to the store root.
    pub fn dir_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Full file path relative to the store root.
    pub fn full_path(&self) -> PathBuf {
        let mut p = self.dir_path();
        p.push(&self.file_name);
        p
    }
}

/// Pluggable key-to-path strategy.
///
/// Injected once at store construction and immutable thereafter.
/// Implementations must be pure: repeated calls for the same key must
/// yield an identical [`PathKey`].
pub type PathTransform = Arc<dyn Fn(&str) -> PathKey + Send + Sync>;

/// The default transform: SHA-1 digest split into 5-character segments.
pub fn sha1_path_transform(key: &str) -> PathKey {
    let digest = hex::encode(Sha1::digest(key.as_bytes()));

    let block_count = digest.len() / BLOCK_SIZE;
    let segments = (0..block_count)
        .map(|i| digest[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE].to_string())
        .collect();

    PathKey {
        segments,
        file_name: digest,
    }
}

/// Default transform wrapped for injection into `StoreOpts`.
pub fn default_transform() -> PathTransform {
    Arc::new(sha1_path_transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest_for_password() {
        let pk = sha1_path_transform("password");

        let expected_segments = vec![
            "5baa6", "1e4c9", "b93f3", "f0682", "250b6", "cf833", "1b7ee", "68fd8",
        ];
        assert_eq!(pk.segments, expected_segments);
        assert_eq!(pk.file_name, "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8");
    }

    #[test]
    fn test_transform_is_pure() {
        let a = sha1_path_transform("some-key");
        let b = sha1_path_transform("some-key");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_keys_diverge() {
        let a = sha1_path_transform("key-a");
        let b = sha1_path_transform("key-b");
        assert_ne!(a.file_name, b.file_name);
    }

    #[test]
    fn test_full_path_layout() {
        let pk = sha1_path_transform("password");
        let full = pk.full_path();
        assert!(full.starts_with("5baa6"));
        assert!(full.ends_with("5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8"));
        assert_eq!(pk.first_segment(), Some("5baa6"));
    }

    #[test]
    fn test_segmentless_key_has_no_shard() {
        let pk = PathKey {
            segments: Vec::new(),
            file_name: "flat".to_string(),
        };
        assert_eq!(pk.first_segment(), None);
        assert_eq!(pk.full_path(), PathBuf::from("flat"));
    }

    #[test]
    fn test_segments_cover_whole_digest() {
        // SHA-1 hex is 40 chars: exactly 8 blocks of 5, nothing dropped.
        let pk = sha1_path_transform("anything");
        assert_eq!(pk.segments.len(), 8);
        assert_eq!(pk.segments.concat(), pk.file_name);
        for seg in &pk.segments {
            assert_eq!(seg.len(), 5);
        }
    }
}
