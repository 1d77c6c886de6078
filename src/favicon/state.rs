//! Per-URL fetch state tracking

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Lifecycle of a page URL as seen by the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// Never requested in this process and not on disk
    Unknown,
    /// A worker owns this URL right now
    InFlight,
    /// Icon file present on disk
    Cached,
    /// Tried once and gave up; not retried until restart
    Failed,
}

/// Immediate answer to a fetch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Cached(PathBuf),
    Pending,
    Failed,
}

impl FetchOutcome {
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            FetchOutcome::Cached(path) => Some(path),
            FetchOutcome::Pending | FetchOutcome::Failed => None,
        }
    }
}

/// What `try_begin` decided for a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Failed,
    Cached,
    AlreadyInFlight,
    Started,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracked {
    InFlight,
    Failed,
}

/// In-memory `InFlight`/`Failed` sets behind a single lock
///
/// `Cached` is never stored here; the disk is authoritative for it.
#[derive(Debug)]
pub(crate) struct FetchStateTable {
    entries: Mutex<HashMap<String, Tracked>>,
    in_flight_tx: watch::Sender<usize>,
}

impl FetchStateTable {
    pub(crate) fn new() -> Self {
        let (in_flight_tx, _) = watch::channel(0);
        Self {
            entries: Mutex::new(HashMap::new()),
            in_flight_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Tracked>> {
        // Critical sections never leave the map half-updated, so a poisoned lock is still usable
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_in_flight(&self, entries: &HashMap<String, Tracked>) {
        let count = entries.values().filter(|t| **t == Tracked::InFlight).count();
        self.in_flight_tx.send_replace(count);
    }

    /// Decide and record, atomically, whether `url` needs a new fetch
    ///
    /// `is_cached` runs under the lock so a worker cannot finish between the
    /// disk check and the `InFlight` insert.
    pub(crate) fn try_begin(&self, url: &str, is_cached: impl FnOnce() -> bool) -> Admission {
        let mut entries = self.lock();
        let tracked = entries.get(url).copied();
        if tracked == Some(Tracked::Failed) {
            return Admission::Failed;
        }
        if is_cached() {
            return Admission::Cached;
        }
        if tracked == Some(Tracked::InFlight) {
            return Admission::AlreadyInFlight;
        }

        entries.insert(url.to_string(), Tracked::InFlight);
        self.publish_in_flight(&entries);
        Admission::Started
    }

    /// Drop the `InFlight` marker without recording failure
    pub(crate) fn abandon(&self, url: &str) {
        let mut entries = self.lock();
        if entries.get(url) == Some(&Tracked::InFlight) {
            entries.remove(url);
            self.publish_in_flight(&entries);
        }
    }

    pub(crate) fn finish_success(&self, url: &str) {
        self.abandon(url);
    }

    pub(crate) fn finish_failure(&self, url: &str) {
        let mut entries = self.lock();
        entries.insert(url.to_string(), Tracked::Failed);
        self.publish_in_flight(&entries);
    }

    /// Tracked state only; callers combine this with the disk check
    pub(crate) fn tracked(&self, url: &str) -> Option<FetchState> {
        self.lock().get(url).map(|tracked| match tracked {
            Tracked::InFlight => FetchState::InFlight,
            Tracked::Failed => FetchState::Failed,
        })
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        *self.in_flight_tx.borrow()
    }

    pub(crate) fn failed_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|t| **t == Tracked::Failed)
            .count()
    }

    /// Resolves once nothing is in flight
    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.in_flight_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}
