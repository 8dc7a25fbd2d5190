//! Content fingerprints in git's blob digest format.
//!
//! Both GitHub's contents API and a local clone report the stored object id
//! of a file, which is the SHA-1 of `"blob <len>\0"` followed by the bytes.
//! Computing the same digest locally lets a write be skipped when the
//! destination already holds identical content.
use std::fmt::Write as _;

use sha1::{Digest, Sha1};

/// Lowercase hex git blob digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Wrap a digest reported by a remote (normalised to lowercase).
    #[must_use]
    pub fn from_hex(hex: &str) -> Self {
        Self(hex.to_ascii_lowercase())
    }

    /// Hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest `bytes` the way git hashes a blob.
///
/// # Examples
///
/// ```
/// use repo_sync::fingerprint::fingerprint;
///
/// assert_eq!(
///     fingerprint(b"hello\n").as_str(),
///     "ce013625030ba8dba906f756967f9e9ca394464a"
/// );
/// ```
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> ContentFingerprint {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}", bytes.len()).as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(40);
    for b in &digest {
        // write! to a String is infallible
        write!(hex, "{b:02x}").unwrap_or(());
    }
    ContentFingerprint(hex)
}

/// Whether writing `candidate` over an object with digest `existing` would
/// change nothing. A missing object is never a no-op.
#[must_use]
pub fn is_noop(existing: Option<&ContentFingerprint>, candidate: &[u8]) -> bool {
    existing.is_some_and(|digest| *digest == fingerprint(candidate))
}
