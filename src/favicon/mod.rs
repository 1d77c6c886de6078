//! Favicon discovery and on-disk icon cache
//!
//! - [`extractor`]: finds the favicon `<link>` in a page head
//! - [`cache_key`]: URL to filesystem-safe file name
//! - [`storage`]: flat cache directory, atomic writes
//! - [`fetcher`]: worker pool, in-flight dedup, permanent failures
//! - [`lookup`]: non-blocking facade used by the query frontend

pub mod cache_key;
pub mod extractor;
pub mod fetcher;
pub mod lookup;
pub mod state;
pub mod storage;

pub use cache_key::CacheKey;
pub use extractor::{extract_favicon_url, extract_favicon_url_from_lines};
pub use fetcher::FaviconFetcher;
pub use lookup::FaviconLookup;
pub use state::{FetchOutcome, FetchState};
pub use storage::IconCache;
