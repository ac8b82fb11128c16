//! Scroll offsets remembered across remounts of a windowed list.

use lru::LruCache;
use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroUsize;
use trellis_common::RuntimeConfig;
use tracing::trace;

/// Logical position of a windowed list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RestoreKey {
    pub document: String,
    pub location: String,
    /// Source expression of the list binding
    pub binding: String,
    pub key_policy: String,
    /// Scroll container id attribute, else its child-index path, else its node id
    pub container: String,
    /// Child-index path of the container from the document root
    pub template_path: Vec<usize>,
}

impl fmt::Display for RestoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}[{}]#{}",
            self.document, self.location, self.binding, self.key_policy, self.container
        )
    }
}

thread_local! {
    static RESTORE_CACHE: RefCell<Option<LruCache<RestoreKey, f64>>> =
        RefCell::new(restore_cache(RuntimeConfig::default().scroll_restore.capacity));
}

fn restore_cache(capacity: usize) -> Option<LruCache<RestoreKey, f64>> {
    NonZeroUsize::new(capacity).map(LruCache::new)
}

/// Replace the restoration cache; a zero capacity disables restoration
pub fn configure_scroll_restore(capacity: usize) {
    RESTORE_CACHE.with(|cache| *cache.borrow_mut() = restore_cache(capacity));
}

pub fn reset_scroll_restore() {
    RESTORE_CACHE.with(|cache| {
        if let Some(entries) = cache.borrow_mut().as_mut() {
            entries.clear();
        }
    });
}

pub fn save_scroll(key: RestoreKey, offset: f64) {
    trace!(key = %key, offset, "Saving scroll offset");
    RESTORE_CACHE.with(|cache| {
        if let Some(entries) = cache.borrow_mut().as_mut() {
            entries.put(key, offset);
        }
    });
}

pub fn restored_scroll(key: &RestoreKey) -> Option<f64> {
    RESTORE_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .as_mut()
            .and_then(|entries| entries.get(key).copied())
    })
}

pub fn scroll_restore_len() -> usize {
    RESTORE_CACHE.with(|cache| cache.borrow().as_ref().map_or(0, LruCache::len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(container: &str) -> RestoreKey {
        RestoreKey {
            document: "doc".to_string(),
            location: "/inbox".to_string(),
            binding: "messages".to_string(),
            key_policy: "default".to_string(),
            container: container.to_string(),
            template_path: vec![0, 1],
        }
    }

    #[test]
    fn test_capacity_bounds_entries() {
        configure_scroll_restore(2);
        save_scroll(key("a"), 10.0);
        save_scroll(key("b"), 20.0);
        save_scroll(key("c"), 30.0);

        assert_eq!(scroll_restore_len(), 2);
        assert_eq!(restored_scroll(&key("a")), None);
        assert_eq!(restored_scroll(&key("c")), Some(30.0));
        configure_scroll_restore(RuntimeConfig::default().scroll_restore.capacity);
    }

    #[test]
    fn test_zero_capacity_disables() {
        configure_scroll_restore(0);
        save_scroll(key("a"), 10.0);
        assert_eq!(restored_scroll(&key("a")), None);
        assert_eq!(scroll_restore_len(), 0);
        configure_scroll_restore(RuntimeConfig::default().scroll_restore.capacity);
    }
}
