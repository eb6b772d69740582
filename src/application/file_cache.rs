//! Source file cache whose entries the build engine invalidates on change.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use metrics::counter;
use tracing::{debug, trace};

use crate::build::{DependencyKey, InvalidationCache, deps, mutex_lock};

const SOURCE: &str = "application::file_cache";
const METRIC_HIT_TOTAL: &str = "folio_file_cache_hit_total";
const METRIC_MISS_TOTAL: &str = "folio_file_cache_miss_total";

/// LRU cache of file contents keyed by normalised path.
///
/// Every read records the file's key with the active dependency collector,
/// including reads that fail. A render that tolerates a missing file, as the
/// layout fallback does, is therefore rebuilt once the file appears. A render
/// that fails outright records nothing new and keeps its previous record.
pub struct FileCache {
    entries: Mutex<LruCache<DependencyKey, Arc<str>>>,
}

impl FileCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn read_to_string(&self, path: &Path) -> std::io::Result<Arc<str>> {
        let key = DependencyKey::from_path(path);
        deps::record(key.clone());

        if let Some(cached) = mutex_lock(&self.entries, SOURCE, "get").get(&key).cloned() {
            counter!(METRIC_HIT_TOTAL).increment(1);
            trace!(key = %key, "File cache hit");
            return Ok(cached);
        }

        counter!(METRIC_MISS_TOTAL).increment(1);
        let contents: Arc<str> = tokio::fs::read_to_string(path).await?.into();
        mutex_lock(&self.entries, SOURCE, "put").put(key, Arc::clone(&contents));
        Ok(contents)
    }

    pub fn contains(&self, key: &DependencyKey) -> bool {
        mutex_lock(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvalidationCache for FileCache {
    fn invalidate(&self, key: &DependencyKey) {
        if mutex_lock(&self.entries, SOURCE, "invalidate")
            .pop(key)
            .is_some()
        {
            debug!(key = %key, "File cache entry invalidated");
        }
    }
}
