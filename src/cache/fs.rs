use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::CacheStore;
use crate::error::{Result, VolcError};

const TEMP_SUFFIX: &str = ".tmp";

/// Stores entries as `<dir>/<key>.<format>`.
///
/// Writes land in a uniquely named temp file that is renamed over the final
/// path, so concurrent writers of one key resolve to the last rename.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

/// Result of [`FileCacheStore::prune`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: usize,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &str, format: &str) -> PathBuf {
        self.dir.join(format!("{key}.{format}"))
    }

    /// Delete the oldest entries until the directory holds at most
    /// `max_bytes`.
    pub async fn prune(&self, max_bytes: u64) -> Result<PruneReport> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Ok(PruneReport::default())
            }
            Err(error) => return Err(VolcError::cache_io(&self.dir, error)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| VolcError::cache_io(&self.dir, error))?
        {
            let path = entry.path();
            if is_temp_file(&path) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, metadata.len(), path));
        }

        let mut total: u64 = files.iter().map(|(_, len, _)| len).sum();
        files.sort_by_key(|(modified, _, _)| *modified);

        let mut report = PruneReport::default();
        for (_, len, path) in files {
            if total <= max_bytes {
                break;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(VolcError::cache_io(&path, error)),
            }
            total = total.saturating_sub(len);
            report.removed += 1;
            report.freed_bytes += len;
        }
        report.remaining_bytes = total;

        debug!(dir = %self.dir.display(), removed = report.removed, "pruned cache");
        Ok(report)
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn lookup(&self, key: &str, format: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key, format);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(VolcError::cache_io(&path, error)),
        }
    }

    async fn store(&self, key: &str, format: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| VolcError::cache_io(&self.dir, error))?;

        let path = self.entry_path(key, format);
        let temp = self
            .dir
            .join(format!(".{key}.{}{TEMP_SUFFIX}", Uuid::new_v4().simple()));

        if let Err(error) = tokio::fs::write(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(VolcError::cache_io(&temp, error));
        }
        if let Err(error) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(VolcError::cache_io(&path, error));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "cached entry");
        Ok(())
    }

    async fn remove(&self, key: &str, format: &str) -> Result<()> {
        let path = self.entry_path(key, format);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(VolcError::cache_io(&path, error)),
        }
    }

    fn location(&self, key: &str, format: &str) -> Option<String> {
        Some(self.entry_path(key, format).display().to_string())
    }
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.') && name.ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}
