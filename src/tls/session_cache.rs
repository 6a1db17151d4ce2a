//! Bounded TLS session-resumption cache
//!
//! Client sessions are keyed by server identity so that a reconnect to the
//! same remote can use an abbreviated handshake. The cache is shared by every
//! dial of a [`SecureDialer`](crate::tunnel::SecureDialer) and is safe to use
//! from any number of tasks at once.

use lru::LruCache;
use openssl::ssl::SslSession;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of cached sessions
pub const DEFAULT_CAPACITY: usize = 32;

/// Session cache used by the secure dialer
pub type SessionCache = SharedLru<String, SslSession>;

/// A least-recently-used map with a fixed capacity, shareable across tasks
///
/// `get` and `put` both count as a use. Inserting into a full cache evicts
/// the least recently used entry.
pub struct SharedLru<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K, V> SharedLru<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create an empty cache holding at most `capacity` entries
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, V>> {
        // Every operation leaves the map consistent, a panic elsewhere
        // cannot leave it half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an entry and mark it most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().get(key).cloned()
    }

    /// Insert or replace an entry, evicting the least recently used one
    /// when the cache is full
    ///
    /// Returns the evicted key, if any.
    pub fn put(&self, key: K, value: V) -> Option<K> {
        let mut cache = self.lock();
        let replacing = cache.contains(&key);
        let pushed_out = cache.push(key, value);

        if replacing {
            None
        } else {
            pushed_out.map(|(evicted, _)| evicted)
        }
    }

    /// Remove an entry
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().pop(key)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}

impl<K, V> Default for SharedLru<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<K, V> std::fmt::Debug for SharedLru<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SharedLru")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}
