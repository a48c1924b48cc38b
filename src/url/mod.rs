//! URL handling module for Weir
//!
//! This module provides URL normalization, the content hash used as a URL's
//! identity in the visited store, and the `UrlTask` unit of fetch work.

mod normalize;

pub use normalize::normalize_url;

use crate::UrlError;
use sha2::{Digest, Sha256};
use url::Url;

/// Computes the stable identity of a URL
///
/// The identity is the lowercase hex SHA-256 of the URL's serialized form, so
/// it is independent of the URL's length and encoding. Callers should pass a
/// normalized URL.
///
/// # Examples
///
/// ```
/// use weir::url::{hash_url, normalize_url};
///
/// let a = normalize_url("http://a.test").unwrap();
/// let b = normalize_url("http://A.test/#frag").unwrap();
/// assert_eq!(hash_url(&a), hash_url(&b));
/// assert_eq!(hash_url(&a).len(), 64);
/// ```
pub fn hash_url(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTask {
    /// The normalized URL
    pub url: Url,

    /// Content hash of `url`, the key used in the visited store
    pub hash: String,

    /// Link distance from the seed that led here (seeds are 0)
    pub depth: u32,
}

impl UrlTask {
    /// Creates a task from an already-normalized URL
    pub fn new(url: Url, depth: u32) -> Self {
        let hash = hash_url(&url);
        Self { url, hash, depth }
    }

    /// Normalizes `raw` and creates a task for it
    pub fn parse(raw: &str, depth: u32) -> Result<Self, UrlError> {
        Ok(Self::new(normalize_url(raw)?, depth))
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}
