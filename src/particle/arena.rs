//! Byte Arena
//!
//! Append-only, segmented byte pool backing generic particle content.
//!
//! ## Layout
//! ```text
//! segment 0            segment 1            segment 2
//! ┌──────────────────┐ ┌──────────────────┐ ┌────────────
//! │ aaaaabbbbbbbbbbb │ │ bbbccccdddddddd  │ │ dd...
//! └──────────────────┘ └──────────────────┘ └────────────
//!   offset = segment << bits | position
//! ```
//!
//! Content may span segment boundaries. Offsets are permanent once
//! allocated: there are no in-place edits and no reclamation.

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::AtomError;

/// Location of a chunk inside an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaSpan {
    pub offset: u32,
    pub len: u32,
}

/// Outcome of a failed append
#[derive(Debug)]
pub enum AppendError {
    /// The arena is full; fatal for the owning universe
    Capacity(AtomError),
    /// A segment could not be allocated
    Exhausted,
}

impl From<AppendError> for AtomError {
    fn from(err: AppendError) -> Self {
        match err {
            AppendError::Capacity(e) => e,
            AppendError::Exhausted => AtomError::IllegalState(
                "arena segment allocation failed".to_string(),
            ),
        }
    }
}

struct ArenaInner {
    segments: Vec<Box<[u8]>>,
    size: u64,
}

/// Shared append-only byte pool
///
/// ## Concurrency:
/// - Appends take the write lock for the copy only
/// - Reads take the read lock; published content never changes
pub struct Arena {
    bits: u32,
    capacity: u64,
    inner: RwLock<ArenaInner>,
}

impl Arena {
    /// Create an arena with `1 << segment_bits` byte segments
    pub fn new(segment_bits: u32, capacity: u64) -> Self {
        Self {
            bits: segment_bits,
            capacity,
            inner: RwLock::new(ArenaInner {
                segments: Vec::new(),
                size: 0,
            }),
        }
    }

    fn segment_size(&self) -> usize {
        1 << self.bits
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    /// Total bytes appended so far
    pub fn size(&self) -> u64 {
        self.inner.read().size
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of allocated segments
    pub fn segment_count(&self) -> usize {
        self.inner.read().segments.len()
    }

    /// Append bytes and return their permanent location
    pub fn append(&self, bytes: &[u8]) -> std::result::Result<ArenaSpan, AppendError> {
        let len = bytes.len() as u64;
        let mut inner = self.inner.write();

        let offset = inner.size;
        let new_size = offset + len;
        if new_size > self.capacity {
            return Err(AppendError::Capacity(AtomError::CapacityExceeded {
                requested: new_size,
                capacity: self.capacity,
            }));
        }
        if len == 0 {
            return Ok(ArenaSpan {
                offset: offset as u32,
                len: 0,
            });
        }

        let first = (offset >> self.bits) as usize;
        let last = ((new_size - 1) >> self.bits) as usize;

        // Allocate every segment first so a failure leaves the arena untouched
        while inner.segments.len() <= last {
            let mut segment: Vec<u8> = Vec::new();
            segment
                .try_reserve_exact(self.segment_size())
                .map_err(|_| AppendError::Exhausted)?;
            segment.resize(self.segment_size(), 0);
            inner.segments.push(segment.into_boxed_slice());
        }

        let mut position = (offset & self.mask()) as usize;
        let mut copied = 0usize;
        for index in first..=last {
            let segment = &mut inner.segments[index];
            let chunk = (segment.len() - position).min(bytes.len() - copied);
            segment[position..position + chunk].copy_from_slice(&bytes[copied..copied + chunk]);
            copied += chunk;
            position = 0;
        }
        debug_assert_eq!(copied, bytes.len());

        inner.size = new_size;
        Ok(ArenaSpan {
            offset: offset as u32,
            len: len as u32,
        })
    }

    /// Copy a chunk out of the arena
    pub fn read(&self, span: ArenaSpan) -> Bytes {
        let mut result = Vec::with_capacity(span.len as usize);
        self.for_each_chunk(span, |chunk| {
            result.extend_from_slice(chunk);
            true
        });
        Bytes::from(result)
    }

    /// Read a single byte
    pub fn byte_at(&self, offset: u32) -> u8 {
        let inner = self.inner.read();
        let offset = offset as u64;
        inner.segments[(offset >> self.bits) as usize][(offset & self.mask()) as usize]
    }

    /// Compare a chunk against a byte slice without copying it out
    pub fn compare_with(&self, span: ArenaSpan, other: &[u8]) -> Ordering {
        let mut position = 0usize;
        let mut result = Ordering::Equal;
        self.for_each_chunk(span, |chunk| {
            let end = (position + chunk.len()).min(other.len());
            let theirs = &other[position.min(other.len())..end];
            result = chunk[..theirs.len()].cmp(theirs);
            if result == Ordering::Equal && theirs.len() < chunk.len() {
                result = Ordering::Greater;
            }
            position += chunk.len();
            result == Ordering::Equal
        });
        result.then_with(|| (span.len as usize).cmp(&other.len()))
    }

    /// Compare two chunks of this arena
    pub fn compare_spans(&self, a: ArenaSpan, b: ArenaSpan) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        // Segment-aligned walk over both chunks
        let inner = self.inner.read();
        let common = a.len.min(b.len) as u64;
        let (mut pa, mut pb) = (a.offset as u64, b.offset as u64);
        let mut remaining = common;
        while remaining > 0 {
            let sa = &inner.segments[(pa >> self.bits) as usize];
            let sb = &inner.segments[(pb >> self.bits) as usize];
            let ya = (pa & self.mask()) as usize;
            let yb = (pb & self.mask()) as usize;
            let n = ((sa.len() - ya).min(sb.len() - yb) as u64).min(remaining) as usize;
            match sa[ya..ya + n].cmp(&sb[yb..yb + n]) {
                Ordering::Equal => {}
                other => return other,
            }
            pa += n as u64;
            pb += n as u64;
            remaining -= n as u64;
        }
        a.len.cmp(&b.len)
    }

    fn for_each_chunk(&self, span: ArenaSpan, mut f: impl FnMut(&[u8]) -> bool) {
        let inner = self.inner.read();
        let mut offset = span.offset as u64;
        let mut remaining = span.len as usize;
        while remaining > 0 {
            let segment = &inner.segments[(offset >> self.bits) as usize];
            let position = (offset & self.mask()) as usize;
            let chunk = (segment.len() - position).min(remaining);
            if !f(&segment[position..position + chunk]) {
                return;
            }
            remaining -= chunk;
            offset += chunk as u64;
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("segment_size", &self.segment_size())
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .finish()
    }
}
