//! Tent name cache: slug -> human-readable name.
//!
//! The refresher task is the only writer and replaces the mapping wholesale;
//! readers take an `Arc` snapshot and can never observe a partial update.
//! Staleness up to one refresh interval is acceptable because the physical
//! fair layout rarely changes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use fairpush_common::error::AppError;

#[derive(Debug, Default)]
pub struct TentCache {
    names: RwLock<Arc<HashMap<String, String>>>,
}

impl TentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a slug to its display name, falling back to the raw slug when
    /// the mapping has no entry (or has not loaded yet).
    pub fn resolve(&self, slug: &str) -> String {
        self.snapshot()
            .get(slug)
            .cloned()
            .unwrap_or_else(|| slug.to_string())
    }

    /// A consistent view of the current mapping.
    ///
    /// A poisoned lock is recovered rather than propagated: the swap is a
    /// single assignment, so the guarded value is always a complete mapping.
    pub fn snapshot(&self) -> Arc<HashMap<String, String>> {
        let guard = self.names.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the whole mapping in a single assignment.
    pub fn replace(&self, names: HashMap<String, String>) {
        let mut guard = self.names.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(names);
    }
}

/// Background refresher with a lifecycle independent from the delivery
/// pipeline. A failed fetch keeps the previous mapping and is retried on the
/// next tick; the fixed interval is the only retry mechanism.
pub async fn run_refresher(
    cache: Arc<TentCache>,
    http: reqwest::Client,
    url: String,
    interval: Duration,
) {
    loop {
        match fetch_tent_names(&http, &url).await {
            Ok(names) => {
                let count = names.len();
                cache.replace(names);
                tracing::info!(count, "tent names updated");
            }
            Err(err) => {
                tracing::warn!(error = %err, "tent name refresh failed, keeping previous mapping");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

async fn fetch_tent_names(
    http: &reqwest::Client,
    url: &str,
) -> Result<HashMap<String, String>, AppError> {
    let names = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_falls_back_to_slug() {
        let cache = TentCache::new();
        assert_eq!(cache.resolve("barn1"), "barn1");
    }

    #[test]
    fn test_resolve_uses_mapping() {
        let cache = TentCache::new();
        cache.replace(HashMap::from([(
            "barn1".to_string(),
            "Main Barn".to_string(),
        )]));
        assert_eq!(cache.resolve("barn1"), "Main Barn");
    }

    #[test]
    fn test_replace_is_wholesale() {
        let cache = TentCache::new();
        cache.replace(HashMap::from([
            ("barn1".to_string(), "Main Barn".to_string()),
            ("ring".to_string(), "Show Ring".to_string()),
        ]));
        cache.replace(HashMap::from([(
            "barn1".to_string(),
            "North Barn".to_string(),
        )]));

        assert_eq!(cache.resolve("barn1"), "North Barn");
        // The old mapping's other key is gone, not merged.
        assert_eq!(cache.resolve("ring"), "ring");
    }

    #[test]
    fn test_poisoned_lock_still_serves_readers() {
        let cache = Arc::new(TentCache::new());
        cache.replace(HashMap::from([(
            "barn1".to_string(),
            "Main Barn".to_string(),
        )]));

        // Panic while holding the write guard to poison the lock.
        let poisoner = Arc::clone(&cache);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.names.write().unwrap();
            panic!("writer died");
        })
        .join();
        assert!(result.is_err());

        assert_eq!(cache.resolve("barn1"), "Main Barn");
        cache.replace(HashMap::from([(
            "barn1".to_string(),
            "North Barn".to_string(),
        )]));
        assert_eq!(cache.resolve("barn1"), "North Barn");
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let cache = TentCache::new();
        cache.replace(HashMap::from([(
            "barn1".to_string(),
            "Main Barn".to_string(),
        )]));

        let before = cache.snapshot();
        cache.replace(HashMap::new());

        // A reader holding a snapshot keeps a fully consistent old view.
        assert_eq!(before.get("barn1").map(String::as_str), Some("Main Barn"));
        assert!(cache.snapshot().is_empty());
    }
}
