use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};
use uuid::Uuid;

use super::cache_key::CacheKey;

/// Flat on-disk icon cache: one file per page URL, named by its [`CacheKey`]
///
/// Files hold the raw icon bytes with no header. Nothing here ever deletes a
/// cached icon.
#[derive(Debug, Clone)]
pub struct IconCache {
    cache_dir: PathBuf,
}

impl IconCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the icon for `url` lives (or would live). Does not touch the disk.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.cache_dir.join(CacheKey::encode(url).as_str())
    }

    /// `true` iff a regular file exists at [`path_for`](Self::path_for)
    pub fn has(&self, url: &str) -> bool {
        std::fs::metadata(self.path_for(url))
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }

    /// Persist icon bytes for `url`, returning the final path
    ///
    /// Bytes go to a hidden temporary file in the cache directory first and
    /// are renamed into place, so a partial write never shows up as a hit.
    pub async fn store(&self, url: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        self.ensure_cache_dir().await?;

        let key = CacheKey::encode(url);
        let final_path = self.cache_dir.join(key.as_str());
        let temp_path = self
            .cache_dir
            .join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()));

        if let Err(e) = Self::write_file(&temp_path, bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!(
            "Stored {} bytes in icon cache: {}",
            bytes.len(),
            final_path.display()
        );
        Ok(final_path)
    }

    /// Create the cache directory and any missing ancestors; existing directories are fine
    pub async fn ensure_cache_dir(&self) -> io::Result<()> {
        match fs::create_dir_all(&self.cache_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.cache_dir.is_dir() => {
                trace!("Cache directory already exists: {}", self.cache_dir.display());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://example.test/";

    #[test]
    fn test_path_for_is_pure() {
        let cache = IconCache::new("/nonexistent/favicons");
        let path = cache.path_for(URL);
        assert_eq!(
            path,
            PathBuf::from("/nonexistent/favicons").join(CacheKey::encode(URL).as_str())
        );
        assert_eq!(path, cache.path_for(URL));
        assert!(!cache.has(URL));
    }

    #[tokio::test]
    async fn test_store_creates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let cache = IconCache::new(temp_dir.path().join("nested").join("favicons"));

        let path = cache.store(URL, b"PNGDATA").await.unwrap();

        assert_eq!(path, cache.path_for(URL));
        assert!(cache.has(URL));
        assert_eq!(std::fs::read(&path).unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn test_store_overwrites_and_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = IconCache::new(temp_dir.path());

        cache.store(URL, b"first").await.unwrap();
        cache.store(URL, b"second").await.unwrap();

        assert_eq!(std::fs::read(cache.path_for(URL)).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_has_ignores_directories() {
        let temp_dir = TempDir::new().unwrap();
        let cache = IconCache::new(temp_dir.path());
        std::fs::create_dir(cache.path_for(URL)).unwrap();
        assert!(!cache.has(URL));
    }

    #[tokio::test]
    async fn test_store_fails_when_cache_dir_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("favicons");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let cache = IconCache::new(&blocker);
        assert!(cache.store(URL, b"PNGDATA").await.is_err());
        assert!(!cache.has(URL));
    }

    #[tokio::test]
    async fn test_concurrent_stores_for_different_urls() {
        let temp_dir = TempDir::new().unwrap();
        let cache = IconCache::new(temp_dir.path());

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let url = format!("https://site{i}.example.test/");
                cache.store(&url, url.as_bytes()).await.unwrap();
                url
            }));
        }

        for handle in handles {
            let url = handle.await.unwrap();
            assert_eq!(std::fs::read(cache.path_for(&url)).unwrap(), url.as_bytes());
        }
    }
}
