//! Ordered Store Module
//!
//! Capacity-bounded key/entry map that keeps entries in recency order.
//!
//! Entries live in a `Vec` arena linked into a doubly-linked list by index
//! (head = most recently used, tail = least recently used), with a `HashMap`
//! from key to arena slot. Lookups, inserts, removals and move-to-front are all
//! O(1) amortized. Freed slots are recycled through a free list.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use crate::cache::Entry;

/// Null link in the arena list.
const SENTINEL: usize = usize::MAX;

// == Entry Handle ==
/// Non-owning reference to an entry in an [`OrderedStore`].
///
/// Every inserted entry receives a stamp that is never reused, so a handle
/// stays valid only as long as that exact entry is stored. Deleting, evicting
/// or overwriting the entry leaves the handle stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryHandle {
    slot: usize,
    stamp: u64,
}

#[derive(Debug)]
struct Node<K, V> {
    entry: Option<Entry<K, V>>,
    stamp: u64,
    prev: usize,
    next: usize,
}

// == Ordered Store ==
#[derive(Debug)]
pub struct OrderedStore<K, V> {
    /// Maximum number of entries, `None` = unbounded
    capacity: Option<usize>,
    /// Key -> arena slot
    map: HashMap<K, usize>,
    arena: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    free_head: usize,
    next_stamp: u64,
}

impl<K, V> OrderedStore<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates an empty store. A capacity of zero is the caller's to reject.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            arena: Vec::new(),
            head: SENTINEL,
            tail: SENTINEL,
            free_head: SENTINEL,
            next_stamp: 0,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    // == Get ==
    /// Returns the entry for `key` and marks it most recently used.
    pub fn get_move_front<Q>(&mut self, key: &Q) -> Option<&mut Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_head(idx);
        self.arena[idx].entry.as_mut()
    }

    /// Returns the entry for `key` without touching the recency order.
    pub fn peek<Q>(&self, key: &Q) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map
            .get(key)
            .and_then(|&idx| self.arena[idx].entry.as_ref())
    }

    /// Returns the handle of the entry currently stored under `key`.
    #[cfg(test)]
    fn handle_of<Q>(&self, key: &Q) -> Option<EntryHandle>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|&idx| EntryHandle {
            slot: idx,
            stamp: self.arena[idx].stamp,
        })
    }

    // == Put ==
    /// Stores `entry` at the front of the recency order.
    ///
    /// An existing entry under the same key is replaced and dropped. Inserting a
    /// new key into a full store evicts the least recently used entry, which is
    /// returned alongside the handle of the stored entry.
    pub fn put_front(&mut self, entry: Entry<K, V>) -> (EntryHandle, Option<Entry<K, V>>) {
        let key = entry.key().clone();

        if let Some(&idx) = self.map.get(&key) {
            let stamp = self.take_stamp();
            let node = &mut self.arena[idx];
            node.entry = Some(entry);
            node.stamp = stamp;
            self.move_to_head(idx);
            return (EntryHandle { slot: idx, stamp }, None);
        }

        let evicted = match self.capacity {
            Some(capacity) if self.map.len() >= capacity => self.pop_back(),
            _ => None,
        };

        let (idx, stamp) = self.alloc_slot(entry);
        self.push_head(idx);
        self.map.insert(key, idx);

        (EntryHandle { slot: idx, stamp }, evicted)
    }

    // == Remove ==
    /// Removes the entry stored under `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        Some(self.release(idx))
    }

    /// Removes the entry `handle` refers to, if it is still stored.
    pub fn remove_handle(&mut self, handle: EntryHandle) -> Option<Entry<K, V>> {
        if !self.is_live(handle) {
            return None;
        }
        let key = self.arena[handle.slot].entry.as_ref()?.key().clone();
        self.remove(&key)
    }

    /// Checks whether `handle` still denotes a stored entry.
    pub fn is_live(&self, handle: EntryHandle) -> bool {
        self.arena
            .get(handle.slot)
            .is_some_and(|node| node.stamp == handle.stamp && node.entry.is_some())
    }

    /// Removes and returns the least recently used entry.
    fn pop_back(&mut self) -> Option<Entry<K, V>> {
        if self.tail == SENTINEL {
            return None;
        }
        let idx = self.tail;
        let key = self.arena[idx].entry.as_ref()?.key().clone();
        self.map.remove(&key);
        Some(self.release(idx))
    }

    // == Clear ==
    /// Drops every entry. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.map.clear();
        self.arena.clear();
        self.head = SENTINEL;
        self.tail = SENTINEL;
        self.free_head = SENTINEL;
    }

    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            arena: &self.arena,
            current: self.head,
            remaining: self.map.len(),
        }
    }

    /// Copies out `(key, value)` pairs, most recently used first.
    pub fn snapshot_front_to_back(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    // --- Internal linked-list operations ---

    fn take_stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    /// Places `entry` in a free slot, reusing one from the free list if possible.
    fn alloc_slot(&mut self, entry: Entry<K, V>) -> (usize, u64) {
        let stamp = self.take_stamp();
        let node = Node {
            entry: Some(entry),
            stamp,
            prev: SENTINEL,
            next: SENTINEL,
        };

        if self.free_head != SENTINEL {
            let idx = self.free_head;
            self.free_head = self.arena[idx].next;
            self.arena[idx] = node;
            (idx, stamp)
        } else {
            self.arena.push(node);
            (self.arena.len() - 1, stamp)
        }
    }

    /// Unlinks the node at `idx`, takes its entry and puts the slot on the
    /// free list. The map must already be updated by the caller.
    fn release(&mut self, idx: usize) -> Entry<K, V> {
        self.unlink(idx);
        let entry = self.arena[idx].entry.take();
        self.arena[idx].next = self.free_head;
        self.free_head = idx;
        entry.expect("linked arena slot always holds an entry")
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.arena[idx].prev;
        let next = self.arena[idx].next;

        if prev != SENTINEL {
            self.arena[prev].next = next;
        } else {
            self.head = next;
        }

        if next != SENTINEL {
            self.arena[next].prev = prev;
        } else {
            self.tail = prev;
        }

        self.arena[idx].prev = SENTINEL;
        self.arena[idx].next = SENTINEL;
    }

    fn push_head(&mut self, idx: usize) {
        self.arena[idx].prev = SENTINEL;
        self.arena[idx].next = self.head;

        if self.head != SENTINEL {
            self.arena[self.head].prev = idx;
        }
        self.head = idx;

        if self.tail == SENTINEL {
            self.tail = idx;
        }
    }

    fn move_to_head(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_head(idx);
    }
}

// == Iterator ==
/// Iterator over stored entries, most recently used first.
pub struct Iter<'a, K, V> {
    arena: &'a [Node<K, V>],
    current: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == SENTINEL {
            return None;
        }
        let node = &self.arena[self.current];
        self.current = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        node.entry.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn plain(key: &'static str, value: i32) -> Entry<&'static str, i32> {
        Entry::new(key, value, None)
    }

    fn keys(store: &OrderedStore<&'static str, i32>) -> Vec<&'static str> {
        store.iter().map(|entry| *entry.key()).collect()
    }

    #[test]
    fn test_store_new() {
        let store: OrderedStore<&str, i32> = OrderedStore::new(Some(3));
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.capacity(), Some(3));
        assert!(store.snapshot_front_to_back().is_empty());
    }

    #[test]
    fn test_put_front_orders_most_recent_first() {
        let mut store = OrderedStore::new(None);

        store.put_front(plain("a", 1));
        store.put_front(plain("b", 2));
        store.put_front(plain("c", 3));

        assert_eq!(keys(&store), vec!["c", "b", "a"]);
        assert_eq!(
            store.snapshot_front_to_back(),
            vec![("c", 3), ("b", 2), ("a", 1)]
        );
    }

    #[test]
    fn test_get_moves_to_front() {
        let mut store = OrderedStore::new(None);

        store.put_front(plain("a", 1));
        store.put_front(plain("b", 2));
        store.put_front(plain("c", 3));

        assert_eq!(store.get_move_front("a").map(|e| *e.value()), Some(1));
        assert_eq!(keys(&store), vec!["a", "c", "b"]);

        assert!(store.get_move_front("missing").is_none());
        assert_eq!(keys(&store), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_peek_keeps_order() {
        let mut store = OrderedStore::new(None);

        store.put_front(plain("a", 1));
        store.put_front(plain("b", 2));

        assert_eq!(store.peek("a").map(|e| *e.value()), Some(1));
        assert_eq!(keys(&store), vec!["b", "a"]);
    }

    #[test]
    fn test_overwrite_moves_to_front_and_keeps_len() {
        let mut store = OrderedStore::new(Some(3));

        store.put_front(plain("a", 1));
        store.put_front(plain("b", 2));
        let (_, evicted) = store.put_front(plain("a", 3));

        assert!(evicted.is_none());
        assert_eq!(store.len(), 2);
        assert_eq!(store.snapshot_front_to_back(), vec![("a", 3), ("b", 2)]);
    }

    #[test]
    fn test_overflow_evicts_least_recent() {
        let mut store = OrderedStore::new(Some(3));

        store.put_front(plain("a", 1));
        store.put_front(plain("b", 2));
        store.put_front(plain("c", 3));
        store.get_move_front("a");

        let (_, evicted) = store.put_front(plain("d", 4));

        assert_eq!(evicted.map(Entry::into_parts), Some(("b", 2)));
        assert_eq!(keys(&store), vec!["d", "a", "c"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_capacity_one() {
        let mut store = OrderedStore::new(Some(1));

        store.put_front(plain("a", 1));
        let (_, evicted) = store.put_front(plain("b", 2));

        assert_eq!(evicted.map(Entry::into_parts), Some(("a", 1)));
        assert_eq!(keys(&store), vec!["b"]);
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let mut store = OrderedStore::new(None);

        for (key, value) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            store.put_front(plain(key, value));
        }

        assert_eq!(store.remove("c").map(Entry::into_parts), Some(("c", 3)));
        assert_eq!(keys(&store), vec!["d", "b", "a"]);

        assert!(store.remove("d").is_some());
        assert_eq!(keys(&store), vec!["b", "a"]);

        assert!(store.remove("a").is_some());
        assert_eq!(keys(&store), vec!["b"]);

        assert!(store.remove("a").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut store = OrderedStore::new(None);

        store.put_front(plain("a", 1));
        store.put_front(plain("b", 2));
        store.remove("a");
        store.put_front(plain("c", 3));

        assert_eq!(store.arena.len(), 2);
        assert_eq!(keys(&store), vec!["c", "b"]);
    }

    #[test]
    fn test_handle_goes_stale_on_remove() {
        let mut store = OrderedStore::new(None);

        let (handle, _) = store.put_front(plain("a", 1));
        assert!(store.is_live(handle));
        assert_eq!(store.handle_of("a"), Some(handle));

        store.remove("a");
        assert!(!store.is_live(handle));

        // Slot reuse does not revive the old handle
        let (reused, _) = store.put_front(plain("b", 2));
        assert_eq!(reused.slot, handle.slot);
        assert!(!store.is_live(handle));
        assert!(store.remove_handle(handle).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_handle_goes_stale_on_overwrite() {
        let mut store = OrderedStore::new(None);

        let (old, _) = store.put_front(Entry::new("a", 1, Some(Duration::from_secs(5).into())));
        let (new, _) = store.put_front(plain("a", 2));

        assert!(!store.is_live(old));
        assert!(store.is_live(new));
        assert!(store.remove_handle(old).is_none());
        assert_eq!(store.remove_handle(new).map(Entry::into_parts), Some(("a", 2)));
    }

    #[test]
    fn test_handle_goes_stale_on_clear() {
        let mut store = OrderedStore::new(None);

        let (handle, _) = store.put_front(plain("a", 1));
        store.clear();

        assert!(!store.is_live(handle));
        assert!(store.is_empty());

        let (fresh, _) = store.put_front(plain("a", 1));
        assert_ne!(fresh, handle);
        assert!(!store.is_live(handle));
    }

    #[test]
    fn test_pop_back() {
        let mut store = OrderedStore::new(None);
        assert!(store.pop_back().is_none());

        store.put_front(plain("a", 1));
        store.put_front(plain("b", 2));

        assert_eq!(store.pop_back().map(Entry::into_parts), Some(("a", 1)));
        assert_eq!(store.pop_back().map(Entry::into_parts), Some(("b", 2)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = OrderedStore::new(Some(2));

        store.put_front(plain("a", 1));
        store.clear();
        store.clear();

        assert!(store.is_empty());
        store.put_front(plain("b", 2));
        assert_eq!(keys(&store), vec!["b"]);
    }
}
