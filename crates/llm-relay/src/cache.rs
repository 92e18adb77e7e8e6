//! Offline response cache.
//!
//! Registrations flagged offline answer from this cache instead of the
//! network. The key is the exact prompt string: no normalization, no
//! fuzzy matching. A miss falls back to a live call whose response is
//! written back, so later offline runs can replay it. Writes overwrite
//! unconditionally, so under concurrent completions for the same prompt
//! the last writer wins.
//!
//! There is no TTL and no eviction. The store grows with the number of
//! distinct prompts; hosts with long-lived processes and unbounded
//! prompt variety should supply their own [`ResponseCache`].

use std::collections::HashMap;
use std::sync::RwLock;

/// Store for previously completed responses, keyed by exact prompt.
pub trait ResponseCache: Send + Sync {
    /// Returns the cached content for `prompt`, if any.
    fn get(&self, prompt: &str) -> Option<String>;

    /// Stores `content` under `prompt`, replacing any previous entry.
    fn set(&self, prompt: &str, content: &str);
}

/// In-process [`ResponseCache`] backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached prompts.
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |map| map.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, prompt: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(prompt).cloned())
    }

    fn set(&self, prompt: &str, content: &str) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(prompt.to_owned(), content.to_owned());
        }
    }
}
