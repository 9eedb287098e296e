//! Interning caches for the particle encoder
//!
//! Each fixed shape owns a 256-entry table keyed by the low-order value
//! byte. A table slot starts empty, holds a single particle after the first
//! miss, and is promoted to a bounded LRU map keyed by the 8-byte prefix on
//! the first collision.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use super::Particle;

/// Access-ordered map that evicts the least recently used entry
#[derive(Debug)]
pub struct BoundedLru<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K: Hash + Eq + Clone, V> BoundedLru<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a value, marking it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        let (_, last) = self.entries.get_mut(key)?;
        self.order.remove(&*last);
        *last = tick;
        self.order.insert(tick, key.clone());
        self.entries.get(key).map(|(value, _)| value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.tick += 1;
        let tick = self.tick;
        let (value, last) = self.entries.get_mut(key)?;
        self.order.remove(&*last);
        *last = tick;
        self.order.insert(tick, key.clone());
        Some(value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a value, evicting the eldest entry when full
    pub fn insert(&mut self, key: K, value: V) {
        self.tick += 1;
        if let Some((_, last)) = self.entries.remove(&key) {
            self.order.remove(&last);
        }
        while self.entries.len() >= self.capacity {
            let Some((_, eldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&eldest);
        }
        self.order.insert(self.tick, key.clone());
        self.entries.insert(key, (value, self.tick));
    }
}

/// One slot of a shape table
#[derive(Debug)]
pub enum CacheSlot {
    Empty,
    Single { prefix: u64, particle: Particle },
    Many(BoundedLru<u64, Particle>),
}

impl CacheSlot {
    /// Return the cached particle for `prefix`, creating it on a miss
    ///
    /// Returns the particle and whether it was a hit.
    pub fn intern(
        &mut self,
        prefix: u64,
        map_capacity: usize,
        create: impl FnOnce() -> Particle,
    ) -> (Particle, bool) {
        match self {
            CacheSlot::Empty => {
                let particle = create();
                *self = CacheSlot::Single {
                    prefix,
                    particle: particle.clone(),
                };
                (particle, false)
            }
            CacheSlot::Single {
                prefix: cached_prefix,
                particle: cached,
            } => {
                if *cached_prefix == prefix {
                    return (cached.clone(), true);
                }
                // First collision: promote to a map holding both
                let mut map = BoundedLru::new(map_capacity);
                map.insert(*cached_prefix, cached.clone());
                let particle = create();
                map.insert(prefix, particle.clone());
                *self = CacheSlot::Many(map);
                (particle, false)
            }
            CacheSlot::Many(map) => {
                if let Some(cached) = map.get(&prefix) {
                    return (cached.clone(), true);
                }
                let particle = create();
                map.insert(prefix, particle.clone());
                (particle, false)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CacheSlot::Empty => 0,
            CacheSlot::Single { .. } => 1,
            CacheSlot::Many(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 256 slots indexed by the low-order value byte
#[derive(Debug)]
pub struct ByteTableCache {
    slots: Vec<CacheSlot>,
    map_capacity: usize,
}

impl ByteTableCache {
    pub fn new(map_capacity: usize) -> Self {
        Self {
            slots: (0..256).map(|_| CacheSlot::Empty).collect(),
            map_capacity,
        }
    }

    pub fn intern(
        &mut self,
        prefix: u64,
        value_byte: u8,
        create: impl FnOnce() -> Particle,
    ) -> (Particle, bool) {
        let capacity = self.map_capacity;
        self.slots[value_byte as usize].intern(prefix, capacity, create)
    }

    pub fn slot(&self, value_byte: u8) -> &CacheSlot {
        &self.slots[value_byte as usize]
    }

    /// Number of cached particles across all slots
    pub fn len(&self) -> usize {
        self.slots.iter().map(CacheSlot::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
