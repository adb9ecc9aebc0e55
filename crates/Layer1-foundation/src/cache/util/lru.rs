//! Ordered map with O(1) recency bookkeeping
//!
//! A hash index over a slab of nodes threaded into a doubly-linked list.
//! The front of the list is the least recently used (or oldest appended)
//! entry, the back is the most recent one.
//!
//! Both the response cache (LRU order) and the history log (append order)
//! are built on top of it.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Hash map that remembers insertion / access order
///
/// All point operations (`get`, `touch`, `push_back`, `remove`, `pop_front`)
/// are O(1). Freed slots are recycled so the slab never grows past the peak
/// number of live entries.
#[derive(Debug)]
pub struct OrderedMap<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<K: Eq + Hash + Clone, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Look up a value without changing its position
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Mutable lookup without changing position
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_mut().map(|node| &mut node.value)
    }

    /// Move an entry to the most-recent position
    ///
    /// Returns `false` if the key is absent.
    pub fn touch<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index.get(key) {
            Some(&idx) => {
                if idx != self.tail {
                    self.unlink(idx);
                    self.link_back(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Insert at the most-recent position
    ///
    /// An existing key has its value replaced and is moved to the back.
    /// Returns the replaced value.
    pub fn push_back(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.index.get(&key) {
            let old = self.slots[idx]
                .as_mut()
                .map(|node| std::mem::replace(&mut node.value, value));
            if idx != self.tail {
                self.unlink(idx);
                self.link_back(idx);
            }
            return old;
        }

        let idx = self.alloc(Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        });
        self.link_back(idx);
        self.index.insert(key, idx);
        None
    }

    /// Remove a specific key
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.index.remove(key)?;
        self.release(idx).map(|node| node.value)
    }

    /// Remove and return the least recent entry
    pub fn pop_front(&mut self) -> Option<(K, V)> {
        if self.head == NIL {
            return None;
        }
        let node = self.release(self.head)?;
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Least recent entry
    pub fn front(&self) -> Option<(&K, &V)> {
        self.iter().next()
    }

    /// Most recent entry
    pub fn back(&self) -> Option<(&K, &V)> {
        self.iter().next_back()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Iterate from least recent to most recent
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            map: self,
            front: self.head,
            back: self.tail,
            remaining: self.len(),
        }
    }

    /// Apply `f` to the first `limit` entries, oldest first
    pub fn for_each_front_mut<F>(&mut self, limit: usize, mut f: F)
    where
        F: FnMut(&K, &mut V),
    {
        let mut cursor = self.head;
        let mut visited = 0;
        while cursor != NIL && visited < limit {
            match self.slots[cursor].as_mut() {
                Some(node) => {
                    f(&node.key, &mut node.value);
                    cursor = node.next;
                    visited += 1;
                }
                None => break,
            }
        }
    }

    /// Remove every entry matching the predicate, returning them oldest first
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<K> = self
            .iter()
            .filter(|(k, v)| predicate(*k, *v))
            .map(|(k, _)| k.clone())
            .collect();

        doomed
            .into_iter()
            .filter_map(|key| self.remove(&key).map(|value| (key, value)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Linked list plumbing
    // ------------------------------------------------------------------------

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<Node<K, V>> {
        self.unlink(idx);
        let node = self.slots[idx].take();
        if node.is_some() {
            self.free.push(idx);
        }
        node
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        if prev == NIL {
            self.head = next;
        } else if let Some(p) = self.slots[prev].as_mut() {
            p.next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else if let Some(n) = self.slots[next].as_mut() {
            n.prev = prev;
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = NIL;
            node.next = NIL;
        }
    }

    fn link_back(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = old_tail;
            node.next = NIL;
        }

        if old_tail == NIL {
            self.head = idx;
        } else if let Some(t) = self.slots[old_tail].as_mut() {
            t.next = idx;
        }
        self.tail = idx;
    }
}

impl<K: Eq + Hash + Clone, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Double-ended iterator over an [`OrderedMap`], oldest first
pub struct Iter<'a, K, V> {
    map: &'a OrderedMap<K, V>,
    front: usize,
    back: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.front == NIL {
            return None;
        }
        let node = self.map.slots[self.front].as_ref()?;
        self.front = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.back == NIL {
            return None;
        }
        let node = self.map.slots[self.back].as_ref()?;
        self.back = node.prev;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(map: &OrderedMap<&'static str, i32>) -> Vec<&'static str> {
        map.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_push_and_get() {
        let mut map = OrderedMap::new();

        map.push_back("a", 1);
        map.push_back("b", 2);
        map.push_back("c", 3);

        assert_eq!(map.get(&"a"), Some(&1));
        assert_eq!(map.get(&"b"), Some(&2));
        assert_eq!(map.get(&"c"), Some(&3));
        assert_eq!(map.len(), 3);
        assert_eq!(keys(&map), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_touch_moves_to_back() {
        let mut map = OrderedMap::new();

        map.push_back("a", 1);
        map.push_back("b", 2);

        // Access "a" to make it more recent
        assert!(map.touch(&"a"));
        assert!(!map.touch(&"missing"));

        // "b" is now the least recently used
        assert_eq!(map.pop_front(), Some(("b", 2)));
        assert_eq!(keys(&map), vec!["a"]);
    }

    #[test]
    fn test_push_existing_replaces_and_moves() {
        let mut map = OrderedMap::new();

        map.push_back("a", 1);
        map.push_back("b", 2);
        let old = map.push_back("a", 10);

        assert_eq!(old, Some(1));
        assert_eq!(map.get(&"a"), Some(&10));
        assert_eq!(map.len(), 2);
        assert_eq!(keys(&map), vec!["b", "a"]);
    }

    #[test]
    fn test_remove_middle_keeps_links() {
        let mut map = OrderedMap::new();
        map.push_back("a", 1);
        map.push_back("b", 2);
        map.push_back("c", 3);

        assert_eq!(map.remove(&"b"), Some(2));
        assert_eq!(map.remove(&"b"), None);
        assert_eq!(keys(&map), vec!["a", "c"]);
        assert_eq!(map.front(), Some((&"a", &1)));
        assert_eq!(map.back(), Some((&"c", &3)));

        let reversed: Vec<_> = map.iter().rev().map(|(k, _)| *k).collect();
        assert_eq!(reversed, vec!["c", "a"]);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut map = OrderedMap::new();
        for round in 0..10 {
            map.push_back("x", round);
            map.push_back("y", round);
            map.pop_front();
            map.pop_front();
        }
        assert!(map.is_empty());
        assert!(map.slots.len() <= 2);
        assert_eq!(map.pop_front(), None);
    }

    #[test]
    fn test_remove_where() {
        let mut map = OrderedMap::new();
        map.push_back("a", 1);
        map.push_back("b", 2);
        map.push_back("c", 3);
        map.push_back("d", 4);

        let removed = map.remove_where(|_, v| v % 2 == 0);
        assert_eq!(removed, vec![("b", 2), ("d", 4)]);
        assert_eq!(keys(&map), vec!["a", "c"]);
    }

    #[test]
    fn test_for_each_front_mut_respects_limit() {
        let mut map = OrderedMap::new();
        map.push_back("a", 1);
        map.push_back("b", 2);
        map.push_back("c", 3);

        map.for_each_front_mut(2, |_, v| *v *= 10);

        let values: Vec<_> = map.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10, 20, 3]);
    }

    #[test]
    fn test_string_keys_borrow_as_str() {
        let mut map: OrderedMap<String, usize> = OrderedMap::new();
        map.push_back("fingerprint".to_string(), 7);

        assert!(map.contains_key("fingerprint"));
        assert_eq!(map.get("fingerprint"), Some(&7));
        assert_eq!(map.remove("fingerprint"), Some(7));
    }
}
