//! Content-addressed result cache.
//!
//! Keys are derived from the normalized request parameters so that an
//! identical request can skip the remote call entirely.

mod fs;
mod memory;

pub use fs::{FileCacheStore, PruneReport};
pub use memory::MemoryCacheStore;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, VolcError};

/// Key/bytes store shared between sessions.
///
/// Concurrent `store` calls for the same key must leave one complete value;
/// `lookup` never observes a partially written entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, key: &str, format: &str) -> Result<Option<Vec<u8>>>;

    async fn store(&self, key: &str, format: &str, bytes: &[u8]) -> Result<()>;

    /// Drop an entry. Removing an absent entry succeeds.
    async fn remove(&self, key: &str, format: &str) -> Result<()>;

    /// Where an entry lives, for stores that have a user-visible location.
    fn location(&self, _key: &str, _format: &str) -> Option<String> {
        None
    }
}

/// How the cache key is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKeySettings {
    /// Hash of the normalized parameters plus an optional extra string.
    Auto { additional_params: String },
    /// Caller-chosen key, used literally or hashed.
    Custom { key: String, hash: bool },
}

impl Default for CacheKeySettings {
    fn default() -> Self {
        Self::Auto {
            additional_params: String::new(),
        }
    }
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(bytes.as_ref());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Derive the cache key for `normalized` parameters.
///
/// Map keys are emitted in sorted order, so logically equal parameter sets
/// always hash the same.
pub fn compute_key<T: Serialize>(normalized: &T, settings: &CacheKeySettings) -> Result<String> {
    match settings {
        CacheKeySettings::Auto { additional_params } => {
            let canonical = serde_json::to_value(normalized)?;
            let material = serde_json::to_string(&serde_json::json!({
                "params": canonical,
                "additional_params": additional_params,
            }))?;
            Ok(sha256_hex(material))
        }
        CacheKeySettings::Custom { key, hash } => {
            let key = key.trim();
            if key.is_empty() {
                return Err(VolcError::InvalidArgument(
                    "Custom cache key cannot be empty".into(),
                ));
            }
            if *hash {
                return Ok(sha256_hex(key));
            }
            if key.contains(['/', '\\']) || key.contains("..") {
                return Err(VolcError::InvalidArgument(format!(
                    "Custom cache key must be a plain file name: {key}"
                )));
            }
            Ok(key.to_string())
        }
    }
}
