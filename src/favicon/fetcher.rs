//! Background favicon fetch orchestration
//!
//! [`FaviconFetcher`] owns a fixed pool of worker tasks fed by an unbounded
//! queue. `request` never waits on the network: it consults the failure set
//! and the disk, marks the URL in flight and enqueues it. Each worker runs
//! the two-stage fetch (page, then favicon) and writes the result into the
//! [`IconCache`] under the page URL's key.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::extractor::extract_favicon_url;
use super::state::{Admission, FetchOutcome, FetchState, FetchStateTable};
use super::storage::IconCache;
use crate::config::Config;
use crate::errors::{AppResult, FetchError, FetchResult};
use crate::utils::http_client::{FaviconHttpClient, HttpResponse, StandardHttpClient};
use crate::utils::url::UrlUtils;

type WorkQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>;

struct FetcherInner {
    cache: IconCache,
    client: Arc<dyn FaviconHttpClient>,
    states: FetchStateTable,
}

/// Deduplicating, bounded-concurrency favicon fetcher
pub struct FaviconFetcher {
    inner: Arc<FetcherInner>,
    /// Taken by `shutdown`; admission and enqueueing happen under this lock
    queue_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    queue_rx: WorkQueue,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FaviconFetcher {
    /// Spawn `workers` fetch tasks on the current Tokio runtime
    pub fn start(cache: IconCache, client: Arc<dyn FaviconHttpClient>, workers: usize) -> Self {
        let workers = workers.max(1);
        let inner = Arc::new(FetcherInner {
            cache,
            client,
            states: FetchStateTable::new(),
        });
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx: WorkQueue = Arc::new(tokio::sync::Mutex::new(queue_rx));
        let shutdown = CancellationToken::new();

        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    inner.clone(),
                    queue_rx.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            "Favicon fetcher started with {} workers (cache: {})",
            workers,
            inner.cache.cache_dir().display()
        );

        Self {
            inner,
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx,
            shutdown,
            workers: Mutex::new(handles),
        }
    }

    /// Build the reqwest client and icon cache described by `config` and start the pool
    pub fn from_config(config: &Config) -> AppResult<Self> {
        config.validate()?;
        let client = StandardHttpClient::new(&config.fetcher)?;
        Ok(Self::start(
            IconCache::new(config.cache.directory.clone()),
            Arc::new(client),
            config.fetcher.workers,
        ))
    }

    pub fn cache(&self) -> &IconCache {
        &self.inner.cache
    }

    /// Answer immediately for `url`, scheduling a background fetch if it was never seen
    pub fn request(&self, url: &str) -> FetchOutcome {
        let sender = self.queue_tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue_tx) = sender.as_ref() else {
            return match self.state_of(url) {
                FetchState::Cached => FetchOutcome::Cached(self.inner.cache.path_for(url)),
                FetchState::Failed => FetchOutcome::Failed,
                FetchState::Unknown | FetchState::InFlight => {
                    debug!(
                        "Fetcher shut down, not scheduling {}",
                        UrlUtils::obfuscate_credentials(url)
                    );
                    FetchOutcome::Pending
                }
            };
        };

        let cache = &self.inner.cache;
        match self.inner.states.try_begin(url, || cache.has(url)) {
            Admission::Failed => {
                trace!("{}: failed url", UrlUtils::obfuscate_credentials(url));
                FetchOutcome::Failed
            }
            Admission::Cached => {
                trace!("{}: served from cache", UrlUtils::obfuscate_credentials(url));
                FetchOutcome::Cached(cache.path_for(url))
            }
            Admission::AlreadyInFlight => {
                trace!("{}: fetch already in flight", UrlUtils::obfuscate_credentials(url));
                FetchOutcome::Pending
            }
            Admission::Started => {
                debug!("{}: scheduling favicon fetch", UrlUtils::obfuscate_credentials(url));
                if queue_tx.send(url.to_string()).is_err() {
                    warn!(
                        "Favicon work queue closed, dropping {}",
                        UrlUtils::obfuscate_credentials(url)
                    );
                    self.inner.states.abandon(url);
                }
                FetchOutcome::Pending
            }
        }
    }

    /// Full four-way state for `url`; the disk decides `Cached`
    pub fn state_of(&self, url: &str) -> FetchState {
        match self.inner.states.tracked(url) {
            Some(FetchState::Failed) => FetchState::Failed,
            _ if self.inner.cache.has(url) => FetchState::Cached,
            Some(state) => state,
            None => FetchState::Unknown,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.states.in_flight_count()
    }

    pub fn failed_count(&self) -> usize {
        self.inner.states.failed_count()
    }

    /// Wait until every scheduled fetch has reached a terminal outcome
    pub async fn wait_idle(&self) {
        self.inner.states.wait_idle().await;
    }

    /// Stop taking queued work, let running fetches finish, and join the workers
    ///
    /// URLs still waiting in the queue lose their in-flight marker so they do
    /// not read as pending forever.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        // Once the sender is gone nothing new can land in the queue behind the drain below
        drop(
            self.queue_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Favicon worker ended abnormally: {}", e);
            }
        }

        let mut queue = self.queue_rx.lock().await;
        let mut dropped = 0usize;
        while let Ok(url) = queue.try_recv() {
            self.inner.states.abandon(&url);
            dropped += 1;
        }

        info!(
            "Favicon fetcher stopped ({} queued fetches dropped)",
            dropped
        );
    }
}

async fn run_worker(
    id: usize,
    inner: Arc<FetcherInner>,
    queue: WorkQueue,
    shutdown: CancellationToken,
) {
    trace!("Favicon worker {} started", id);
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            url = async { queue.lock().await.recv().await } => url,
        };
        let Some(url) = next else {
            break;
        };
        inner.clone().process(url).await;
    }
    trace!("Favicon worker {} exiting", id);
}

impl FetcherInner {
    /// Run one fetch episode in its own task so a panic only fails this URL
    ///
    /// Relies on the default unwinding panic strategy.
    async fn process(self: Arc<Self>, url: String) {
        let safe_url = UrlUtils::obfuscate_credentials(&url);
        let episode = tokio::spawn(self.clone().run_fetch(url.clone()));

        match episode.await {
            Ok(Ok(path)) => {
                self.states.finish_success(&url);
                debug!("{}: favicon cached at {}", safe_url, path.display());
            }
            Ok(Err(e)) => {
                self.states.finish_failure(&url);
                warn!(error.kind = e.kind(), "{}: favicon fetch failed: {}", safe_url, e);
            }
            Err(e) => {
                self.states.finish_failure(&url);
                warn!(error.kind = "panic", "{}: favicon fetch task aborted: {}", safe_url, e);
            }
        }
    }

    async fn run_fetch(self: Arc<Self>, url: String) -> FetchResult<PathBuf> {
        self.fetch_and_store(&url).await
    }

    async fn fetch_and_store(&self, url: &str) -> FetchResult<PathBuf> {
        let page_url = UrlUtils::parse(url)?;

        debug!("{}: fetching page", UrlUtils::obfuscate_credentials(url));
        let page = self.get_success(&page_url).await?;
        let html = String::from_utf8_lossy(&page.body);
        let reference = extract_favicon_url(&html)?;
        let favicon_url = UrlUtils::resolve_reference(&page_url, &reference)?;

        debug!(
            "{}: fetching favicon {}",
            UrlUtils::obfuscate_credentials(url),
            UrlUtils::obfuscate_credentials(favicon_url.as_str())
        );
        let icon = self.get_success(&favicon_url).await?;

        Ok(self.cache.store(url, &icon.body).await?)
    }

    async fn get_success(&self, url: &Url) -> FetchResult<HttpResponse> {
        let response = self.client.get(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: UrlUtils::obfuscate_credentials(url.as_str()),
                status: response.status,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Canned responses keyed by URL, with a call counter per URL
    #[derive(Default)]
    struct FakeClient {
        routes: HashMap<String, HttpResponse>,
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    impl FakeClient {
        fn route(mut self, url: &str, status: u16, body: &'static [u8]) -> Self {
            self.routes
                .insert(url.to_string(), HttpResponse::new(status, body));
            self
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl FaviconHttpClient for FakeClient {
        async fn get(&self, url: &Url) -> FetchResult<HttpResponse> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self
                .calls
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default() += 1;
            self.routes
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| FetchError::transport(url.as_str(), "connection refused"))
        }
    }

    async fn settle(fetcher: &FaviconFetcher) {
        tokio::time::timeout(Duration::from_secs(5), fetcher.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_successful_fetch_lands_in_cache() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(
            FakeClient::default()
                .route(
                    "https://example.test/",
                    200,
                    b"<head><link rel=\"icon\" href=\"/f.ico\"></head>",
                )
                .route("https://example.test/f.ico", 200, b"ICO"),
        );
        let fetcher = FaviconFetcher::start(IconCache::new(temp_dir.path()), client.clone(), 2);

        assert_eq!(fetcher.request("https://example.test/"), FetchOutcome::Pending);
        settle(&fetcher).await;

        assert_eq!(fetcher.state_of("https://example.test/"), FetchState::Cached);
        let outcome = fetcher.request("https://example.test/");
        let path = outcome.into_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"ICO");
        assert_eq!(client.total.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_favicon_link_is_terminal_failure() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::default().route(
            "https://example.test/",
            200,
            b"<head><title>none</title></head>",
        ));
        let fetcher = FaviconFetcher::start(IconCache::new(temp_dir.path()), client.clone(), 1);

        fetcher.request("https://example.test/");
        settle(&fetcher).await;

        assert_eq!(fetcher.request("https://example.test/"), FetchOutcome::Failed);
        assert_eq!(fetcher.state_of("https://example.test/"), FetchState::Failed);
        assert_eq!(fetcher.failed_count(), 1);
        assert_eq!(client.calls_to("https://example.test/"), 1);
    }

    #[tokio::test]
    async fn test_favicon_download_failure_clears_in_flight() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(
            FakeClient::default()
                .route(
                    "https://example.test/",
                    200,
                    b"<link rel=\"icon\" href=\"missing.ico\">",
                )
                .route("https://example.test/missing.ico", 404, b""),
        );
        let fetcher = FaviconFetcher::start(IconCache::new(temp_dir.path()), client.clone(), 1);

        fetcher.request("https://example.test/");
        settle(&fetcher).await;

        assert_eq!(fetcher.in_flight_count(), 0);
        assert_eq!(fetcher.state_of("https://example.test/"), FetchState::Failed);
        assert_eq!(client.calls_to("https://example.test/missing.ico"), 1);
        assert!(!fetcher.cache().has("https://example.test/"));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::default());
        let fetcher = FaviconFetcher::start(IconCache::new(temp_dir.path()), client.clone(), 1);

        fetcher.request("not a url");
        settle(&fetcher).await;

        assert_eq!(fetcher.request("not a url"), FetchOutcome::Failed);
        assert_eq!(client.total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("favicons");
        std::fs::write(&blocker, b"file in the way").unwrap();

        let client = Arc::new(
            FakeClient::default()
                .route("https://a.example.test/", 200, b"<link rel=\"icon\" href=\"/i\">")
                .route("https://a.example.test/i", 200, b"A"),
        );
        let fetcher = FaviconFetcher::start(IconCache::new(&blocker), client, 1);

        fetcher.request("https://a.example.test/");
        settle(&fetcher).await;

        assert_eq!(fetcher.state_of("https://a.example.test/"), FetchState::Failed);
        // The pool is still alive and answering
        assert_eq!(fetcher.request("https://b.example.test/"), FetchOutcome::Pending);
        settle(&fetcher).await;
        assert_eq!(fetcher.state_of("https://b.example.test/"), FetchState::Failed);
    }

    #[tokio::test]
    async fn test_existing_file_is_cached_without_state() {
        let temp_dir = TempDir::new().unwrap();
        let cache = IconCache::new(temp_dir.path());
        cache.store("https://example.test/", b"old").await.unwrap();

        let client = Arc::new(FakeClient::default());
        let fetcher = FaviconFetcher::start(cache, client.clone(), 1);

        assert!(matches!(
            fetcher.request("https://example.test/"),
            FetchOutcome::Cached(_)
        ));
        assert_eq!(fetcher.in_flight_count(), 0);
        assert_eq!(client.total.load(Ordering::SeqCst), 0);
    }

    /// Panics while fetching one particular page
    struct PanickyClient {
        poisoned: &'static str,
        inner: FakeClient,
    }

    #[async_trait]
    impl FaviconHttpClient for PanickyClient {
        async fn get(&self, url: &Url) -> FetchResult<HttpResponse> {
            if url.as_str() == self.poisoned {
                panic!("client blew up on {url}");
            }
            self.inner.get(url).await
        }
    }

    #[tokio::test]
    async fn test_panicking_fetch_only_fails_its_url() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(PanickyClient {
            poisoned: "https://bad.example.test/",
            inner: FakeClient::default()
                .route("https://good.example.test/", 200, b"<link rel=\"icon\" href=\"/i\">")
                .route("https://good.example.test/i", 200, b"GOOD"),
        });
        let fetcher = FaviconFetcher::start(IconCache::new(temp_dir.path()), client, 1);

        fetcher.request("https://bad.example.test/");
        settle(&fetcher).await;
        assert_eq!(fetcher.state_of("https://bad.example.test/"), FetchState::Failed);
        assert_eq!(fetcher.in_flight_count(), 0);

        // Same single worker keeps serving
        fetcher.request("https://good.example.test/");
        settle(&fetcher).await;
        assert_eq!(fetcher.state_of("https://good.example.test/"), FetchState::Cached);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_requests_racing_shutdown_never_stay_in_flight() {
        for _ in 0..20 {
            let temp_dir = TempDir::new().unwrap();
            let fetcher = Arc::new(FaviconFetcher::start(
                IconCache::new(temp_dir.path()),
                Arc::new(FakeClient::default()),
                2,
            ));

            let requester = {
                let fetcher = fetcher.clone();
                tokio::spawn(async move {
                    for n in 0..200 {
                        fetcher.request(&format!("https://site{n}.example.test/"));
                        tokio::task::yield_now().await;
                    }
                })
            };
            tokio::task::yield_now().await;
            fetcher.shutdown().await;
            requester.await.unwrap();

            settle(&fetcher).await;
            assert_eq!(fetcher.in_flight_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduling() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::default());
        let fetcher = FaviconFetcher::start(IconCache::new(temp_dir.path()), client.clone(), 2);

        fetcher.shutdown().await;

        assert_eq!(fetcher.request("https://example.test/"), FetchOutcome::Pending);
        assert_eq!(fetcher.in_flight_count(), 0);
        assert_eq!(fetcher.state_of("https://example.test/"), FetchState::Unknown);
        assert_eq!(client.total.load(Ordering::SeqCst), 0);
    }
}
