//! Fixed-capacity least-recently-used cache.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

type Idx = usize;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<Idx>,
    next: Option<Idx>,
}

/// Fixed-capacity key-value store with least-recently-used eviction.
///
/// Recency order is exact: every `get` hit and every `set` moves the touched
/// key to the most-recently-used position, and inserting a new key at
/// capacity evicts the single least-recently-used key. A `HashMap` index
/// points into a slab of doubly linked nodes (index links, free slots
/// recycled), so promotion, insertion and removal are all O(1) and never
/// scan.
///
/// Evicted values are dropped silently; callers recompute from their source
/// of truth on a later miss.
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, Idx>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<Idx>,
    head: Option<Idx>,
    tail: Option<Idx>,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be positive");
        LruCache {
            capacity,
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    /// Maximum number of resident entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    ///
    /// A miss returns `None` and leaves the recency order untouched.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_front(idx);
        Some(&self.node(idx).value)
    }

    /// Insert or update `key`, placing it at the most-recently-used position.
    ///
    /// A new key inserted at capacity first evicts the least-recently-used
    /// entry.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(&idx) = self.map.get(&key) {
            self.node_mut(idx).value = value;
            self.move_front(idx);
            return;
        }

        if self.map.len() >= self.capacity {
            self.evict_tail();
        }

        let idx = self.alloc(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.map.insert(key, idx);
        self.attach_front(idx);
    }

    fn node(&self, idx: Idx) -> &Node<K, V> {
        self.nodes[idx].as_ref().expect("dangling lru slot")
    }

    fn node_mut(&mut self, idx: Idx) -> &mut Node<K, V> {
        self.nodes[idx].as_mut().expect("dangling lru slot")
    }

    fn alloc(&mut self, node: Node<K, V>) -> Idx {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn detach(&mut self, idx: Idx) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn attach_front(&mut self, idx: Idx) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.node_mut(h).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn move_front(&mut self, idx: Idx) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    fn evict_tail(&mut self) {
        let Some(idx) = self.tail else { return };
        self.detach(idx);
        if let Some(node) = self.nodes[idx].take() {
            self.map.remove(&node.key);
            self.free.push(idx);
        }
    }
}
