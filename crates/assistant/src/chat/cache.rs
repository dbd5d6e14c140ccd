use std::collections::HashMap;

use campus_protocol::{ChatHistoryPage, is_history_key};
use tokio::sync::{RwLock, watch};

#[derive(Debug, Clone)]
struct CachedPage {
    page: ChatHistoryPage,
    stale: bool,
}

/// Shared cache of history pages keyed by request path.
///
/// Entries are never dropped by invalidation, only marked stale, so a list can
/// keep rendering the previous data while it revalidates.
#[derive(Debug)]
pub struct HistoryCache {
    pages: RwLock<HashMap<String, CachedPage>>,
    revision: watch::Sender<u64>,
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryCache {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            pages: RwLock::new(HashMap::new()),
            revision,
        }
    }

    /// Cached page when present and not marked stale.
    pub async fn get_fresh(&self, key: &str) -> Option<ChatHistoryPage> {
        self.pages
            .read()
            .await
            .get(key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.page.clone())
    }

    /// Missing keys count as stale.
    pub async fn is_stale(&self, key: &str) -> bool {
        self.pages
            .read()
            .await
            .get(key)
            .is_none_or(|entry| entry.stale)
    }

    pub async fn insert(&self, key: String, page: ChatHistoryPage) {
        self.pages
            .write()
            .await
            .insert(key, CachedPage { page, stale: false });
    }

    /// Applies a local edit to every cached page without changing staleness.
    pub async fn update_pages(&self, mut edit: impl FnMut(&mut ChatHistoryPage)) {
        let mut pages = self.pages.write().await;
        for entry in pages.values_mut() {
            edit(&mut entry.page);
        }
    }

    /// Marks every history listing stale and returns how many entries flipped.
    ///
    /// Re-marking an already stale entry is a no-op, and subscribers are only
    /// woken when something flipped.
    pub async fn invalidate_history(&self) -> usize {
        let mut flipped = 0;
        {
            let mut pages = self.pages.write().await;
            for (key, entry) in pages.iter_mut() {
                if is_history_key(key) && !entry.stale {
                    entry.stale = true;
                    flipped += 1;
                }
            }
        }

        if flipped > 0 {
            self.revision.send_modify(|revision| *revision += 1);
            tracing::debug!(flipped, "invalidated chat history cache");
        }
        flipped
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that changes whenever history pages go stale.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
