//! The byte-bounded LRU cache behind a [`ClientState`][crate::state::ClientState].
//!
//! One cache serves three key families: public parameters per hierarchy,
//! the per-URI encryption entry, and the per-encapsulation decryption
//! entry. Mutable entries are allocated empty by the cache and initialized
//! later by the caller under the entry's own lock; sizes are conservative
//! constants fixed at allocation, never updated as entries fill, so the
//! loader never has to re-enter the cache.
//!
//! Loads for the same missing key are single-flighted: the first caller
//! runs the loader outside the cache lock, everyone else waits on a
//! condvar. A failed load leaves no entry behind; waiters observe the
//! vacancy and retry the load themselves.

use std::collections::HashSet;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use lru::LruCache;
use tracing::{debug, trace};

use crate::error::Result;
use crate::pattern::{AttributeList, Pattern};
use crate::uri::UriPath;
use crate::wkdibe::{
    Ciphertext, Params, PreparedAttributeList, CIPHERTEXT_BYTES, SYMMETRIC_KEY_BYTES,
};

/// Cache keys. Using a structured key rather than a concatenated byte
/// string keeps URI components containing arbitrary bytes unambiguous and
/// scopes decryption entries to their hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    Hierarchy(Vec<u8>),
    Encryption { hierarchy: Vec<u8>, uri: UriPath },
    Decryption { hierarchy: Vec<u8>, encapsulation: Vec<u8> },
}

impl CacheKey {
    fn payload_size(&self) -> u64 {
        (match self {
            CacheKey::Hierarchy(h) => h.len(),
            CacheKey::Encryption { hierarchy, uri } => {
                hierarchy.len()
                    + uri
                        .components()
                        .iter()
                        .map(|c| c.as_ref().map_or(1, |c| 2 + c.name().len()))
                        .sum::<usize>()
            }
            CacheKey::Decryption { hierarchy, encapsulation } => {
                hierarchy.len() + encapsulation.len()
            }
        }) as u64
    }
}

/// Mutable per-URI state accelerating encryption. `pattern == None` means
/// the entry has been allocated but never filled.
#[derive(Default)]
pub(crate) struct EncryptionEntryState {
    pub pattern: Option<Pattern>,
    pub attrs: AttributeList,
    pub key: [u8; SYMMETRIC_KEY_BYTES],
    pub encrypted_key: Option<Ciphertext>,
    pub prepared: Option<PreparedAttributeList>,
}

#[derive(Default)]
pub(crate) struct EncryptionEntry {
    pub state: RwLock<EncryptionEntryState>,
}

/// The cached decapsulation of one encrypted key. `None` until populated.
#[derive(Default)]
pub(crate) struct DecryptionEntry {
    pub key: RwLock<Option<[u8; SYMMETRIC_KEY_BYTES]>>,
}

#[derive(Clone)]
pub(crate) enum CacheValue {
    Params(Arc<Params>),
    Encryption(Arc<EncryptionEntry>),
    Decryption(Arc<DecryptionEntry>),
}

// Conservative fixed sizes for the group elements boxed inside entries.
const PREPARED_BYTES: u64 = 288;

pub(crate) fn hierarchy_entry_size(key: &CacheKey, params: &Params) -> u64 {
    key.payload_size() + mem::size_of::<Params>() as u64 + 96 * (params.num_slots() as u64 + 2)
}

pub(crate) fn encryption_entry_size(key: &CacheKey) -> u64 {
    key.payload_size()
        + mem::size_of::<EncryptionEntry>() as u64
        + CIPHERTEXT_BYTES as u64
        + PREPARED_BYTES
}

pub(crate) fn decryption_entry_size(key: &CacheKey) -> u64 {
    key.payload_size() + mem::size_of::<DecryptionEntry>() as u64
}

struct Inner {
    entries: LruCache<CacheKey, (CacheValue, u64)>,
    used: u64,
    loading: HashSet<CacheKey>,
}

/// A bounded LRU cache with per-key single-flight loading.
pub(crate) struct MemoryCache {
    capacity: u64,
    inner: Mutex<Inner>,
    load_finished: Condvar,
}

impl MemoryCache {
    pub fn new(capacity: u64) -> MemoryCache {
        MemoryCache {
            capacity,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                used: 0,
                loading: HashSet::new(),
            }),
            load_finished: Condvar::new(),
        }
    }

    /// Returns the cached value for `key`, loading it with `load` on a
    /// miss. At most one loader runs per key at a time; concurrent callers
    /// block until it finishes. The loader returns the value and its
    /// accounted size; if it fails, nothing is cached.
    pub fn get_or_load(
        &self,
        key: CacheKey,
        load: impl FnOnce(&CacheKey) -> Result<(CacheValue, u64)>,
    ) -> Result<CacheValue> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some((value, _)) = inner.entries.get(&key) {
                return Ok(value.clone());
            }
            if !inner.loading.contains(&key) {
                break;
            }
            inner = self.load_finished.wait(inner).unwrap();
        }
        inner.loading.insert(key.clone());
        drop(inner);

        trace!(?key, "cache miss");
        let loaded = load(&key);

        let mut inner = self.inner.lock().unwrap();
        inner.loading.remove(&key);
        self.load_finished.notify_all();
        let (value, size) = loaded?;
        inner.entries.put(key, (value.clone(), size));
        inner.used += size;
        while inner.used > self.capacity {
            match inner.entries.pop_lru() {
                Some((evicted, (_, evicted_size))) => {
                    debug!(key = ?evicted, size = evicted_size, "evicting cache entry");
                    inner.used -= evicted_size;
                }
                None => break,
            }
        }
        Ok(value)
    }

    #[cfg(test)]
    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().unwrap().used
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn decryption_key(hierarchy: &[u8], tag: u8) -> CacheKey {
        CacheKey::Decryption {
            hierarchy: hierarchy.to_vec(),
            encapsulation: vec![tag; 8],
        }
    }

    fn load_counted(
        counter: &AtomicUsize,
        size: u64,
    ) -> impl FnOnce(&CacheKey) -> Result<(CacheValue, u64)> + '_ {
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok((CacheValue::Decryption(Arc::new(DecryptionEntry::default())), size))
        }
    }

    #[test]
    fn loads_only_once() {
        let cache = MemoryCache::new(1024);
        let loads = AtomicUsize::new(0);
        cache
            .get_or_load(decryption_key(b"h", 1), load_counted(&loads, 10))
            .unwrap();
        cache
            .get_or_load(decryption_key(b"h", 1), load_counted(&loads, 10))
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = MemoryCache::new(100);
        let loads = AtomicUsize::new(0);
        for tag in 0..4 {
            cache
                .get_or_load(decryption_key(b"h", tag), load_counted(&loads, 40))
                .unwrap();
        }
        assert!(cache.used_bytes() <= 100);
        assert_eq!(cache.entry_count(), 2);

        // the oldest entry is gone, so touching it loads again
        cache
            .get_or_load(decryption_key(b"h", 0), load_counted(&loads, 40))
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn failed_load_caches_nothing() {
        let cache = MemoryCache::new(1024);
        let result = cache.get_or_load(decryption_key(b"h", 1), |_| {
            Err(crate::error::Error::NoKeyForPattern)
        });
        assert!(result.is_err());
        assert_eq!(cache.entry_count(), 0);

        let loads = AtomicUsize::new(0);
        cache
            .get_or_load(decryption_key(b"h", 1), load_counted(&loads, 10))
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_loads_single_flight() {
        let cache = Arc::new(MemoryCache::new(1 << 20));
        let loads = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                std::thread::spawn(move || {
                    cache
                        .get_or_load(decryption_key(b"h", 7), move |_| {
                            loads.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok((
                                CacheValue::Decryption(Arc::new(DecryptionEntry::default())),
                                10,
                            ))
                        })
                        .unwrap();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
