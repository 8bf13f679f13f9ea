//! Cache Store Module
//!
//! The public cache: an [`OrderedStore`] behind a re-entrant lock, plus a
//! [`CleanupCoordinator`] created once any entry may expire.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::ReentrantMutex;
use tracing::debug;

use crate::cache::{CacheStats, Entry, EntryHandle, Expiration, OrderedStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{CleanupCoordinator, ExpirySink};

// == Source ==
/// Bulk input for building a cache.
pub enum Source<'a, K, V> {
    Empty,
    /// Written in order, so the last pair ends up most recently used
    Pairs(Vec<(K, V)>),
    /// Written in the map's iteration order
    Mapping(HashMap<K, V>),
    /// Copied keeping the other cache's recency order
    Cache(&'a Cache<K, V>),
}

impl<K, V> Default for Source<'_, K, V> {
    fn default() -> Self {
        Source::Empty
    }
}

struct State<K, V> {
    store: OrderedStore<K, V>,
    stats: CacheStats,
}

impl<K, V> State<K, V>
where
    K: Hash + Eq + Clone,
{
    fn sync_len(&mut self) {
        let len = self.store.len();
        self.stats.set_total_entries(len);
    }
}

struct Shared<K, V> {
    state: ReentrantMutex<RefCell<State<K, V>>>,
    default_ttl: Option<Expiration>,
    cleaner: OnceLock<CleanupCoordinator>,
    this: Weak<Self>,
}

impl<K, V> Shared<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    fn cleaner(&self) -> &CleanupCoordinator {
        self.cleaner.get_or_init(|| {
            let owner: Weak<dyn ExpirySink> = self.this.clone();
            CleanupCoordinator::new(owner)
        })
    }

    fn notify_removed(&self) {
        if let Some(cleaner) = self.cleaner.get() {
            cleaner.notify_removed();
        }
    }
}

impl<K, V> ExpirySink for Shared<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    fn is_live(&self, handle: EntryHandle) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.store.is_live(handle)
    }

    fn expire(&self, handle: EntryHandle) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        match state.store.remove_handle(handle) {
            Some(_) => {
                state.stats.record_expiration();
                state.sync_len();
                true
            }
            None => false,
        }
    }
}

// == Cache ==
/// Thread-safe LRU cache with optional per-entry TTL.
///
/// Entries are kept in recency order, most recently used first. Reads and
/// writes move an entry to the front; inserting a new key into a full cache
/// evicts the entry at the back. Entries written with a TTL are removed by a
/// background thread once their deadline passes. That thread is started by the
/// first TTL write and stopped when the cache is dropped.
///
/// All operations take `&self`; share the cache between threads with an
/// [`Arc`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use ttl_lru::Cache;
///
/// let cache = Cache::with_capacity(2).unwrap();
/// cache.set("a", 1);
/// cache.set("b", 2);
/// assert_eq!(cache.get("a").unwrap(), 1);
///
/// cache.set("c", 3); // evicts "b"
/// assert!(!cache.contains("b"));
///
/// cache.set_with("d", 4, Duration::from_secs(60));
/// assert_eq!(cache.keys(), vec!["d", "c"]);
/// ```
pub struct Cache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    // == Constructors ==
    /// Creates an unbounded cache whose entries never expire by default.
    pub fn new() -> Self {
        Self::with_parts(None, None)
    }

    /// Creates a cache holding at most `capacity` entries.
    ///
    /// Fails with [`CacheError::InvalidArgument`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::from_config(&CacheConfig::with_capacity(capacity))
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_parts(
            config.capacity,
            config.default_ttl.map(Expiration::After),
        ))
    }

    pub fn builder<'a>() -> CacheBuilder<'a, K, V> {
        CacheBuilder::default()
    }

    fn with_parts(capacity: Option<usize>, default_ttl: Option<Expiration>) -> Self {
        let shared = Arc::new_cyclic(|this| Shared {
            state: ReentrantMutex::new(RefCell::new(State {
                store: OrderedStore::new(capacity),
                stats: CacheStats::new(),
            })),
            default_ttl,
            cleaner: OnceLock::new(),
            this: this.clone(),
        });

        if default_ttl.is_some() {
            shared.cleaner();
        }

        Self { shared }
    }

    // == Get ==
    /// Returns a clone of the value stored under `key` and marks the key most
    /// recently used.
    ///
    /// Expiry is decided by the cleanup worker alone: an entry stays visible
    /// to every operation until the worker removes it.
    pub fn get<Q>(&self, key: &Q) -> Result<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + fmt::Debug + ?Sized,
    {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        let State { store, stats } = &mut *state;

        match store.get_move_front(key) {
            Some(entry) => {
                stats.record_hit();
                Ok(entry.value().clone())
            }
            None => {
                stats.record_miss();
                Err(not_found(key))
            }
        }
    }

    /// Returns a clone of the value stored under `key` without changing its
    /// recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        state.store.peek(key).map(|entry| entry.value().clone())
    }

    /// Membership test. Does not affect recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        state.store.contains_key(key)
    }

    // == Set ==
    /// Stores `value` under `key` with the default TTL, if any.
    ///
    /// An existing entry is replaced. Adding a key to a full cache evicts the
    /// least recently used entry.
    pub fn set(&self, key: K, value: V) {
        self.write(key, value, None);
    }

    /// Stores `value` under `key`, expiring as given instead of the default.
    pub fn set_with(&self, key: K, value: V, expiration: impl Into<Expiration>) {
        self.write(key, value, Some(expiration.into()));
    }

    /// Same as [`set`](Self::set), with an optional TTL override.
    pub fn add(&self, key: K, value: V, expiration: Option<Expiration>) {
        self.write(key, value, expiration);
    }

    /// Write path for callers holding nullable keys or values.
    ///
    /// Fails with [`CacheError::InvalidArgument`] if either is missing, leaving
    /// the cache untouched.
    pub fn set_optional(
        &self,
        key: Option<K>,
        value: Option<V>,
        expiration: Option<Expiration>,
    ) -> Result<()> {
        match (key, value) {
            (Some(key), Some(value)) => {
                self.write(key, value, expiration);
                Ok(())
            }
            (None, _) => Err(CacheError::InvalidArgument(
                "key must not be None".to_string(),
            )),
            (_, None) => Err(CacheError::InvalidArgument(
                "value must not be None".to_string(),
            )),
        }
    }

    /// Writes every pair in order with the default TTL, holding the lock for
    /// the whole batch.
    pub fn update<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let _batch = self.shared.state.lock();
        for (key, value) in pairs {
            self.write(key, value, None);
        }
    }

    /// Replaces the value of an existing entry in place, keeping its deadline,
    /// and marks it most recently used. Returns the previous value.
    pub fn replace<Q>(&self, key: &Q, value: V) -> Result<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + fmt::Debug + ?Sized,
    {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        match state.store.get_move_front(key) {
            Some(entry) => Ok(std::mem::replace(entry.value_mut(), value)),
            None => Err(not_found(key)),
        }
    }

    fn write(&self, key: K, value: V, expiration: Option<Expiration>) {
        let entry = Entry::new(key, value, expiration.or(self.shared.default_ttl));
        let deadline = entry.deadline();

        let guard = self.shared.state.lock();
        let (handle, evicted) = {
            let mut state = guard.borrow_mut();
            let (handle, evicted) = state.store.put_front(entry);
            if evicted.is_some() {
                state.stats.record_eviction();
            }
            state.sync_len();
            (handle, evicted)
        };

        if let Some(deadline) = deadline {
            self.shared.cleaner().register(handle, deadline);
        }

        if evicted.is_some() {
            debug!("LRU eviction: cache at capacity");
            self.shared.notify_removed();
        }
        drop(guard);
    }

    // == Delete ==
    /// Removes `key`, returning its value.
    ///
    /// Fails with [`CacheError::KeyNotFound`] if the key is absent.
    pub fn delete<Q>(&self, key: &Q) -> Result<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + fmt::Debug + ?Sized,
    {
        let guard = self.shared.state.lock();
        let removed = {
            let mut state = guard.borrow_mut();
            let removed = state.store.remove(key);
            state.sync_len();
            removed
        };

        match removed {
            Some(entry) => {
                self.shared.notify_removed();
                Ok(entry.into_parts().1)
            }
            None => Err(not_found(key)),
        }
    }

    // == Clear ==
    /// Removes every entry. Pending expirations become stale.
    pub fn clear(&self) {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        state.store.clear();
        state.sync_len();
    }

    // == Introspection ==
    pub fn len(&self) -> usize {
        self.shared.state.lock().borrow().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries, `None` if unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.shared.state.lock().borrow().store.capacity()
    }

    pub fn default_ttl(&self) -> Option<Expiration> {
        self.shared.default_ttl
    }

    /// Remaining lifetime of the entry under `key`.
    ///
    /// `None` if the key is absent or its entry never expires.
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        state.store.peek(key).and_then(Entry::ttl_remaining)
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.store.len());
        stats
    }

    // == Snapshots ==
    /// `(key, value)` pairs, most recently used first.
    pub fn items(&self) -> Vec<(K, V)> {
        self.shared.state.lock().borrow().store.snapshot_front_to_back()
    }

    pub fn keys(&self) -> Vec<K> {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        state.store.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn values(&self) -> Vec<V> {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        state.store.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Iterates values, most recently used first, over a snapshot taken now.
    pub fn iter(&self) -> Values<V> {
        Values {
            inner: self.values().into_iter(),
        }
    }

    // == Copy ==
    /// Returns an independent cache with the same capacity, default TTL and
    /// entries in the same order. Expiring entries keep their deadlines.
    pub fn copy(&self) -> Self {
        let copy = Self::with_parts(self.capacity(), self.shared.default_ttl);
        let entries: Vec<Entry<K, V>> = {
            let guard = self.shared.state.lock();
            let state = guard.borrow();
            state.store.iter().cloned().collect()
        };

        let guard = copy.shared.state.lock();
        for entry in entries.into_iter().rev() {
            let deadline = entry.deadline();
            let (handle, _) = guard.borrow_mut().store.put_front(entry);
            if let Some(deadline) = deadline {
                copy.shared.cleaner().register(handle, deadline);
            }
        }
        guard.borrow_mut().sync_len();
        drop(guard);

        copy
    }
}

fn not_found<Q: fmt::Debug + ?Sized>(key: &Q) -> CacheError {
    CacheError::KeyNotFound(format!("{:?}", key))
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        if let Some(cleaner) = self.shared.cleaner.get() {
            cleaner.shutdown();
        }
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl<K, V> PartialEq for Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + PartialEq + Send + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) || self.items() == other.items()
    }
}

impl<K, V> Eq for Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Eq + Send + 'static,
{
}

impl<K, V> fmt::Display for Cache<K, V>
where
    K: Hash + Eq + Clone + fmt::Display + Send + 'static,
    V: Clone + fmt::Display + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.items().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        f.write_str("}")
    }
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + 'static,
    V: Clone + fmt::Debug + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.items()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let cache = Self::new();
        cache.update(iter);
        cache
    }
}

impl<K, V> Extend<(K, V)> for Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.update(iter);
    }
}

impl<'a, K, V> IntoIterator for &'a Cache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    type Item = V;
    type IntoIter = Values<V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// == Values Iterator ==
/// Values of a cache snapshot, most recently used first.
#[derive(Debug)]
pub struct Values<V> {
    inner: std::vec::IntoIter<V>,
}

impl<V> Iterator for Values<V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Values<V> {}

// == Cache Builder ==
/// Builds a [`Cache`] from a bulk source, options and extra pairs.
///
/// The source is written first, then the extra pairs; later writes to the same
/// key win.
pub struct CacheBuilder<'a, K, V> {
    source: Source<'a, K, V>,
    capacity: Option<usize>,
    default_ttl: Option<Expiration>,
    extra: Vec<(K, V)>,
}

impl<K, V> Default for CacheBuilder<'_, K, V> {
    fn default() -> Self {
        Self {
            source: Source::Empty,
            capacity: None,
            default_ttl: None,
            extra: Vec::new(),
        }
    }
}

impl<'a, K, V> CacheBuilder<'a, K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn source(mut self, source: Source<'a, K, V>) -> Self {
        self.source = source;
        self
    }

    pub fn pairs<I>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.source(Source::Pairs(pairs.into_iter().collect()))
    }

    pub fn mapping(self, mapping: HashMap<K, V>) -> Self {
        self.source(Source::Mapping(mapping))
    }

    pub fn from_cache(self, cache: &'a Cache<K, V>) -> Self {
        self.source(Source::Cache(cache))
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn default_ttl(mut self, expiration: impl Into<Expiration>) -> Self {
        self.default_ttl = Some(expiration.into());
        self
    }

    /// Takes capacity and default TTL from `config`.
    pub fn config(mut self, config: &CacheConfig) -> Self {
        self.capacity = config.capacity;
        self.default_ttl = config.default_ttl.map(Expiration::After);
        self
    }

    /// Adds a pair written after the source.
    pub fn pair(mut self, key: K, value: V) -> Self {
        self.extra.push((key, value));
        self
    }

    // == Build ==
    /// Fails with [`CacheError::InvalidArgument`] on a zero capacity.
    pub fn build(self) -> Result<Cache<K, V>> {
        let config = CacheConfig {
            capacity: self.capacity,
            default_ttl: None,
        };
        config.validate()?;

        let cache = Cache::with_parts(self.capacity, self.default_ttl);
        let batch = cache.shared.state.lock();
        match self.source {
            Source::Empty => {}
            Source::Pairs(pairs) => cache.update(pairs),
            Source::Mapping(mapping) => cache.update(mapping),
            Source::Cache(other) => cache.update(other.items().into_iter().rev()),
        }
        cache.update(self.extra);
        drop(batch);

        Ok(cache)
    }
}
