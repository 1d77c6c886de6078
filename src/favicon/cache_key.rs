//! Filesystem-safe cache keys derived from page URLs

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::fmt;

/// Longest base64 key used verbatim; longer URLs are hashed instead
pub const MAX_ENCODED_KEY_LEN: usize = 200;

/// Prefix marking hashed keys. It is outside the base64url alphabet, so a
/// hashed key can never equal an encoded one.
const HASHED_KEY_PREFIX: char = '~';

/// Deterministic file name for a page URL
///
/// Base64url (no padding) over the URL's UTF-8 bytes, so distinct URLs never
/// share a key. URLs whose encoding would exceed [`MAX_ENCODED_KEY_LEN`] use
/// `~` + SHA-256 hex instead to stay within file name limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn encode(url: &str) -> Self {
        let encoded = URL_SAFE_NO_PAD.encode(url.as_bytes());
        if encoded.len() <= MAX_ENCODED_KEY_LEN {
            return Self(encoded);
        }

        let digest = Sha256::digest(url.as_bytes());
        Self(format!("{HASHED_KEY_PREFIX}{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_hashed(&self) -> bool {
        self.0.starts_with(HASHED_KEY_PREFIX)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
