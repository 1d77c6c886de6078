use std::path::PathBuf;
use std::sync::Arc;

use super::fetcher::FaviconFetcher;

/// Entry point for the query frontend
///
/// Cheap to clone and safe to call on every keystroke: a lookup either
/// returns the cached icon path or nothing, scheduling at most one background
/// fetch per never-seen URL.
#[derive(Clone)]
pub struct FaviconLookup {
    fetcher: Arc<FaviconFetcher>,
}

impl FaviconLookup {
    pub fn new(fetcher: Arc<FaviconFetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Arc<FaviconFetcher> {
        &self.fetcher
    }

    /// Cached icon path for `url`, or `None` while pending or after failure
    pub fn icon_for(&self, url: &str) -> Option<PathBuf> {
        self.fetcher.request(url).into_path()
    }
}
