//! Particle encoder and memory optimizer
//!
//! Turns raw byte content into the most compact particle shape and interns
//! shapes whose content repeats.
//!
//! ## Decision rule
//! ```text
//! len 0             -> Empty
//! len 9             -> key + value1, interned by value byte
//! len 12, v < 256   -> key + value4, interned by value byte
//! len 12            -> key + value4
//! len 16, v < 256   -> key + value8, interned by value byte
//! len 16, v < 2^32  -> key + value8, interned by value (LRU)
//! len 16            -> key + value8
//! len 10,11,13..15  -> rare (key + suffix)
//! anything else     -> arena
//! ```
//!
//! ## Failure policy
//! - Arena capacity exceeded is returned as a fatal error
//! - A failed segment allocation disables the optimizer for the rest of the
//!   encoder's life; later particles stay as plain `Bytes`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use super::arena::{AppendError, Arena};
use super::cache::{BoundedLru, ByteTableCache, CacheSlot};
use super::{ArenaBytes, Particle, Row};
use crate::error::Result;

/// Per-slot prefix map size for the fixed-shape tables
const SLOT_MAP_CAPACITY: usize = 10;

/// Entries in the 16-byte cache keyed by a 32-bit value
const VALUE4_CACHE_CAPACITY: usize = 1000;

/// Entries in the string interning cache
const STRING_CACHE_CAPACITY: usize = 50;

struct ShapeCaches {
    row9: ByteTableCache,
    row12: ByteTableCache,
    row16: ByteTableCache,
    row16_value4: BoundedLru<u32, CacheSlot>,
    strings: BoundedLru<Arc<str>, Arc<str>>,
}

impl ShapeCaches {
    fn new() -> Self {
        Self {
            row9: ByteTableCache::new(SLOT_MAP_CAPACITY),
            row12: ByteTableCache::new(SLOT_MAP_CAPACITY),
            row16: ByteTableCache::new(SLOT_MAP_CAPACITY),
            row16_value4: BoundedLru::new(VALUE4_CACHE_CAPACITY),
            strings: BoundedLru::new(STRING_CACHE_CAPACITY),
        }
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub arena_bytes: u64,
    pub enabled: bool,
}

/// Shared encoder owning the arena and interning caches of one universe
///
/// ## Concurrency:
/// - Caches sit behind their own mutex, independent of the commit lock
/// - The arena guards its append cursor with its own lock
pub struct ParticleEncoder {
    arena: Arc<Arena>,
    caches: Mutex<ShapeCaches>,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ParticleEncoder {
    pub fn new(arena: Arc<Arena>, enabled: bool) -> Self {
        Self {
            arena,
            caches: Mutex::new(ShapeCaches::new()),
            enabled: AtomicBool::new(enabled),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            arena_bytes: self.arena.size(),
            enabled: self.is_enabled(),
        }
    }

    /// Encode raw bytes into their most compact shape
    pub fn encode(&self, raw: &[u8]) -> Result<Particle> {
        if raw.is_empty() {
            return Ok(Particle::Empty);
        }
        if !self.is_enabled() {
            return Ok(Particle::Bytes(Bytes::copy_from_slice(raw)));
        }

        let len = raw.len();
        let particle = match len {
            9 | 12 | 16 => self.encode_row(raw),
            10 | 11 | 13 | 14 | 15 => {
                let (key, suffix) = split_row(raw);
                Particle::Row(Row::Rare {
                    key,
                    len: len as u8,
                    suffix,
                })
            }
            _ => return self.encode_generic(raw),
        };
        Ok(particle)
    }

    /// Re-encode a particle built by a caller
    ///
    /// Typed longs and already-optimized shapes are returned as is.
    pub fn optimize(&self, particle: &Particle) -> Result<Particle> {
        match particle {
            Particle::Bytes(bytes) => self.encode(bytes),
            Particle::Str(s) if self.is_enabled() => Ok(Particle::Str(self.intern_str(s))),
            _ => Ok(particle.clone()),
        }
    }

    fn encode_row(&self, raw: &[u8]) -> Particle {
        let (key, value) = split_row(raw);
        let mut guard = self.caches.lock();
        let caches = &mut *guard;
        let (particle, hit) = match raw.len() {
            9 => caches
                .row9
                .intern(key, value as u8, || Particle::Row(Row::value1(key, value as u8))),
            12 if value < 256 => caches
                .row12
                .intern(key, value as u8, || Particle::Row(Row::value4(key, value as u32))),
            12 => (Particle::Row(Row::value4(key, value as u32)), false),
            _ if value < 256 => caches
                .row16
                .intern(key, value as u8, || Particle::Row(Row::value8(key, value))),
            _ if value <= u32::MAX as u64 => {
                let create = || Particle::Row(Row::value8(key, value));
                let small = value as u32;
                match caches.row16_value4.get_mut(&small) {
                    Some(slot) => slot.intern(key, SLOT_MAP_CAPACITY, create),
                    None => {
                        let mut slot = CacheSlot::Empty;
                        let result = slot.intern(key, SLOT_MAP_CAPACITY, create);
                        caches.row16_value4.insert(small, slot);
                        result
                    }
                }
            }
            _ => (Particle::Row(Row::value8(key, value)), false),
        };
        drop(guard);

        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        particle
    }

    fn encode_generic(&self, raw: &[u8]) -> Result<Particle> {
        match self.arena.append(raw) {
            Ok(span) => Ok(Particle::Arena(ArenaBytes::new(self.arena.clone(), span))),
            Err(AppendError::Exhausted) => {
                self.disable();
                Ok(Particle::Bytes(Bytes::copy_from_slice(raw)))
            }
            Err(AppendError::Capacity(e)) => Err(e),
        }
    }

    fn intern_str(&self, s: &Arc<str>) -> Arc<str> {
        let mut caches = self.caches.lock();
        if let Some(cached) = caches.strings.get(s) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }
        caches.strings.insert(s.clone(), s.clone());
        self.misses.fetch_add(1, Ordering::Relaxed);
        s.clone()
    }

    /// Turn the optimizer off for good
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            warn!(
                arena_bytes = self.arena.size(),
                "Particle optimizer disabled after allocation failure"
            );
        }
    }
}

impl std::fmt::Debug for ParticleEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleEncoder")
            .field("arena", &self.arena)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Split a 9..=16 byte row into its big-endian key and suffix
fn split_row(raw: &[u8]) -> (u64, u64) {
    let mut key = [0u8; 8];
    key.copy_from_slice(&raw[..8]);
    let suffix = raw[8..]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);
    (u64::from_be_bytes(key), suffix)
}
