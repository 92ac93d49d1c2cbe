//! Per-batch artwork cache
//!
//! One slot per release key. Concurrent requests for the same key share a
//! single fetch; requests for different keys never wait on each other.
//! Only successful fetches are stored, so a failed or empty lookup is
//! attempted again by the next file of that release.

use crate::models::ArtworkAsset;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<ArtworkAsset>>>;

/// Artwork cache created at batch start and dropped at batch end
#[derive(Debug, Default)]
pub struct ArtworkCache {
    slots: Mutex<HashMap<String, Slot>>,
}

/// Why a fetch produced nothing to cache
pub enum FetchMiss<E> {
    NotFound,
    Failed(E),
}

impl ArtworkCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        // A poisoned map is still structurally valid
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Cached asset for `key`, if one was stored
    pub fn get(&self, key: &str) -> Option<Arc<ArtworkAsset>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Return the cached asset or run `fetch` while holding the key's slot
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<Arc<ArtworkAsset>, FetchMiss<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ArtworkAsset, FetchMiss<E>>>,
    {
        let slot = self.slot(key);
        slot.get_or_try_init(move || async move { fetch().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Number of cached releases
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
