//! Bounded LRU cache with time-to-live for retrieval plans.
//!
//! Entries live in a slab of nodes linked into a recency list (head = most
//! recent) with a map from key to slot. One lock guards both reads, which
//! move the entry to the head, and writes, which evict from the tail.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::plan::RetrievalPlan;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Cache key for a query: trimmed and case-folded.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    inserted_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Unsynchronized LRU list. Wrapped by [`PlanCache`].
#[derive(Debug)]
struct LruList<V> {
    nodes: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> LruList<V> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn node(&self, slot: usize) -> Option<&Node<V>> {
        self.nodes.get(slot).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<V>> {
        self.nodes.get_mut(slot).and_then(Option::as_mut)
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.node(slot) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.node_mut(h) {
                node.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn remove(&mut self, slot: usize) -> Option<Node<V>> {
        self.unlink(slot);
        let node = self.nodes.get_mut(slot).and_then(Option::take)?;
        self.index.remove(&node.key);
        self.free.push(slot);
        Some(node)
    }

    fn insert(&mut self, key: String, value: V, now: Instant) {
        if let Some(&slot) = self.index.get(&key) {
            if let Some(node) = self.node_mut(slot) {
                node.value = value;
                node.inserted_at = now;
            }
            self.unlink(slot);
            self.push_front(slot);
            return;
        }

        let node = Node {
            key: key.clone(),
            value,
            inserted_at: now,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_front(slot);
    }
}

/// Thread-safe plan cache.
#[derive(Debug)]
pub struct PlanCache {
    inner: Mutex<LruList<RetrievalPlan>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl PlanCache {
    /// Create a cache. Zero capacity or TTL fall back to the defaults.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruList::new()),
            capacity: if capacity == 0 { DEFAULT_CAPACITY } else { capacity },
            ttl: if ttl.is_zero() { DEFAULT_TTL } else { ttl },
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a query. Refreshes recency on hit; drops expired entries.
    pub fn get(&self, query: &str) -> Option<RetrievalPlan> {
        let key = normalize_query(query);
        let mut list = self.inner.lock();
        let slot = *list.index.get(&key)?;

        let expired = list
            .node(slot)
            .map(|node| node.inserted_at.elapsed() > self.ttl)
            .unwrap_or(true);
        if expired {
            list.remove(slot);
            return None;
        }

        list.unlink(slot);
        list.push_front(slot);
        list.node(slot).map(|node| node.value.clone())
    }

    /// Store a plan, evicting the least recently used entry when full.
    pub fn insert(&self, query: &str, plan: RetrievalPlan) {
        let key = normalize_query(query);
        let mut list = self.inner.lock();

        if !list.index.contains_key(&key) && list.len() >= self.capacity {
            if let Some(tail) = list.tail {
                list.remove(tail);
            }
        }
        list.insert(key, plan, Instant::now());
    }

    /// Whether a live entry exists, without touching recency.
    pub fn contains(&self, query: &str) -> bool {
        let key = normalize_query(query);
        let list = self.inner.lock();
        list.index
            .get(&key)
            .and_then(|&slot| list.node(slot))
            .is_some_and(|node| node.inserted_at.elapsed() <= self.ttl)
    }

    pub fn clear(&self) {
        *self.inner.lock() = LruList::new();
    }
}
