//! Bounded, time-expiring cache of decoded images keyed by storage path.
//!
//! The filesystem stays the source of truth; the cache only saves decode
//! work and can be cleared at any time.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::processing::decode::decode_rgba8_apply_exif;

type Decoder = dyn Fn(&Path) -> Result<RgbaImage> + Send + Sync;

struct CacheEntry {
    image: Arc<RgbaImage>,
    stored_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<PathBuf, CacheEntry>,
    // Insertion order, oldest first. Holds exactly the keys of `entries`.
    order: VecDeque<PathBuf>,
}

impl CacheState {
    fn remove(&mut self, path: &Path) -> bool {
        if self.entries.remove(path).is_none() {
            return false;
        }
        self.order.retain(|p| p != path);
        true
    }
}

pub struct ImageCache {
    capacity: usize,
    ttl: Duration,
    decoder: Box<Decoder>,
    state: Mutex<CacheState>,
}

impl fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("stored", &self.lock().entries.len())
            .finish()
    }
}

impl ImageCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_decoder(capacity, ttl, decode_rgba8_apply_exif)
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.capacity, settings.ttl)
    }

    /// Cache that decodes misses with `decoder` instead of reading image files.
    pub fn with_decoder<F>(capacity: usize, ttl: Duration, decoder: F) -> Self
    where
        F: Fn(&Path) -> Result<RgbaImage> + Send + Sync + 'static,
    {
        Self {
            capacity: capacity.max(1),
            ttl,
            decoder: Box::new(decoder),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.duration_since(entry.stored_at) < self.ttl
    }

    /// Decoded image for `path`, decoding and storing it on a miss.
    ///
    /// Returns `None` when the file cannot be decoded. The lock is not held
    /// while decoding, so racing callers may decode the same file twice.
    pub fn get(&self, path: &Path) -> Option<Arc<RgbaImage>> {
        if let Some(hit) = self.lookup(path) {
            debug!(path = %path.display(), "cache hit");
            return Some(hit);
        }
        debug!(path = %path.display(), "cache miss; decoding");
        match (self.decoder)(path) {
            Ok(image) => {
                let image = Arc::new(image);
                self.insert(path.to_path_buf(), Arc::clone(&image));
                Some(image)
            }
            Err(err) => {
                warn!(path = %path.display(), "failed to decode image: {err:#}");
                None
            }
        }
    }

    fn lookup(&self, path: &Path) -> Option<Arc<RgbaImage>> {
        let now = Instant::now();
        let mut state = self.lock();
        let fresh = state.entries.get(path).map(|e| self.is_fresh(e, now))?;
        if fresh {
            state.entries.get(path).map(|e| Arc::clone(&e.image))
        } else {
            state.remove(path);
            None
        }
    }

    fn insert(&self, path: PathBuf, image: Arc<RgbaImage>) {
        let now = Instant::now();
        let mut state = self.lock();
        state.remove(&path);
        state.order.push_back(path.clone());
        state.entries.insert(
            path,
            CacheEntry {
                image,
                stored_at: now,
            },
        );

        if state.entries.len() <= self.capacity {
            return;
        }
        let before = state.entries.len();
        state.entries.retain(|_, e| now.duration_since(e.stored_at) < self.ttl);
        if state.entries.len() != before {
            let CacheState { entries, order } = &mut *state;
            order.retain(|p| entries.contains_key(p));
            debug!(purged = before - entries.len(), "purged expired cache entries");
        }
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            debug!(path = %oldest.display(), "evicted oldest cache entry");
        }
    }

    /// Drop `path` from the cache. Returns whether it was stored.
    pub fn invalidate(&self, path: &Path) -> bool {
        let removed = self.lock().remove(path);
        if removed {
            debug!(path = %path.display(), "cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Whether an unexpired entry exists for `path`.
    pub fn contains(&self, path: &Path) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(path)
            .is_some_and(|e| self.is_fresh(e, now))
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .entries
            .values()
            .filter(|e| self.is_fresh(e, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::sleep;

    fn counting_cache(capacity: usize, ttl: Duration) -> (ImageCache, Arc<AtomicUsize>) {
        let decodes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&decodes);
        let cache = ImageCache::with_decoder(capacity, ttl, move |path: &Path| {
            counter.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("broken") {
                anyhow::bail!("corrupt image");
            }
            Ok(RgbaImage::new(1, 1))
        });
        (cache, decodes)
    }

    fn stored(cache: &ImageCache) -> usize {
        let state = cache.lock();
        assert_eq!(state.entries.len(), state.order.len());
        state.entries.len()
    }

    #[test]
    fn second_get_within_ttl_reuses_decoded_image() {
        let (cache, decodes) = counting_cache(4, Duration::from_secs(60));
        let first = cache.get(Path::new("/img/a.png")).unwrap();
        let second = cache.get(Path::new("/img/a.png")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(decodes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entry_is_decoded_again() {
        let (cache, decodes) = counting_cache(4, Duration::from_millis(30));
        let first = cache.get(Path::new("/img/a.png")).unwrap();
        sleep(Duration::from_millis(60));
        assert!(!cache.contains(Path::new("/img/a.png")));
        let second = cache.get(Path::new("/img/a.png")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(decodes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn overflow_evicts_earliest_insert() {
        let (cache, _) = counting_cache(3, Duration::from_secs(60));
        for name in ["a", "b", "c", "d"] {
            cache.get(&PathBuf::from(format!("/img/{name}.png"))).unwrap();
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(Path::new("/img/a.png")));
        for name in ["b", "c", "d"] {
            assert!(cache.contains(&PathBuf::from(format!("/img/{name}.png"))));
        }
    }

    #[test]
    fn overflow_purges_every_expired_entry_first() {
        let (cache, _) = counting_cache(3, Duration::from_millis(40));
        cache.get(Path::new("/img/a.png")).unwrap();
        cache.get(Path::new("/img/b.png")).unwrap();
        sleep(Duration::from_millis(80));
        cache.get(Path::new("/img/c.png")).unwrap();
        assert_eq!(stored(&cache), 3);
        cache.get(Path::new("/img/d.png")).unwrap();
        assert_eq!(stored(&cache), 2);
        assert!(cache.contains(Path::new("/img/c.png")));
        assert!(cache.contains(Path::new("/img/d.png")));
    }

    #[test]
    fn decode_failure_is_absent_and_not_cached() {
        let (cache, decodes) = counting_cache(2, Duration::from_secs(60));
        assert!(cache.get(Path::new("/img/broken.png")).is_none());
        assert!(cache.get(Path::new("/img/broken.png")).is_none());
        assert_eq!(decodes.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_and_clear_force_redecode() {
        let (cache, decodes) = counting_cache(4, Duration::from_secs(60));
        cache.get(Path::new("/img/a.png")).unwrap();
        cache.get(Path::new("/img/b.png")).unwrap();
        assert!(cache.invalidate(Path::new("/img/a.png")));
        assert!(!cache.invalidate(Path::new("/img/a.png")));
        cache.get(Path::new("/img/a.png")).unwrap();
        assert_eq!(decodes.load(Ordering::SeqCst), 3);

        cache.clear();
        assert_eq!(stored(&cache), 0);
        cache.get(Path::new("/img/b.png")).unwrap();
        assert_eq!(decodes.load(Ordering::SeqCst), 4);
    }
}
