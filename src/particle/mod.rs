//! Particle Module
//!
//! Immutable encoded field values and the machinery that packs them.
//!
//! ## Responsibilities
//! - Represent field values in the most compact shape available
//! - Reproduce the exact original bytes for every shape (`raw()`)
//! - Compare particles without materializing bytes where shapes agree
//! - Keep generic content in a shared append-only arena
//!
//! ## Shapes
//! ```text
//! ┌──────────────┬───────────────┬──────────────────────────────────┐
//! │ raw length   │ shape         │ storage                          │
//! ├──────────────┼───────────────┼──────────────────────────────────┤
//! │ 0            │ Empty         │ none                             │
//! │ 1..=8, >16   │ Arena         │ (offset, len) into the arena     │
//! │ 9            │ Key4/8Value1  │ key + 1-byte value, interned     │
//! │ 12           │ Key4/8Value4  │ key + 4-byte value, interned     │
//! │ 16           │ Key4/8Value8  │ key + 8-byte value, interned     │
//! │ 10,11,13..15 │ Rare          │ key + suffix of up to 7 bytes    │
//! │ > threshold  │ Hosted        │ (offset, len) into the data file │
//! └──────────────┴───────────────┴──────────────────────────────────┘
//! ```
//!
//! Typed particles (`Long`, `Str`) and unoptimized `Bytes` exist before
//! the encoder runs, and remain when optimization is disabled.

mod arena;
mod cache;
mod encoder;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::log::HostedBytes;

pub use arena::{AppendError, Arena, ArenaSpan};
pub use cache::{BoundedLru, ByteTableCache, CacheSlot};
pub use encoder::{EncoderStats, ParticleEncoder};

/// Fixed-shape particle: 8-byte big-endian key followed by a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Key4Value1 { key: u32, value: u8 },
    Key8Value1 { key: u64, value: u8 },
    Key4Value4 { key: u32, value: u32 },
    Key8Value4 { key: u64, value: u32 },
    Key4Value8 { key: u32, value: u64 },
    Key8Value8 { key: u64, value: u64 },
    /// Lengths 10, 11, 13, 14 and 15: key plus a right-aligned suffix
    Rare { key: u64, len: u8, suffix: u64 },
}

impl Row {
    pub(crate) fn value1(key: u64, value: u8) -> Self {
        match u32::try_from(key) {
            Ok(key) => Row::Key4Value1 { key, value },
            Err(_) => Row::Key8Value1 { key, value },
        }
    }

    pub(crate) fn value4(key: u64, value: u32) -> Self {
        match u32::try_from(key) {
            Ok(key) => Row::Key4Value4 { key, value },
            Err(_) => Row::Key8Value4 { key, value },
        }
    }

    pub(crate) fn value8(key: u64, value: u64) -> Self {
        match u32::try_from(key) {
            Ok(key) => Row::Key4Value8 { key, value },
            Err(_) => Row::Key8Value8 { key, value },
        }
    }

    /// The 8-byte prefix
    pub fn key(&self) -> u64 {
        match *self {
            Row::Key4Value1 { key, .. } | Row::Key4Value4 { key, .. } | Row::Key4Value8 { key, .. } => {
                key as u64
            }
            Row::Key8Value1 { key, .. }
            | Row::Key8Value4 { key, .. }
            | Row::Key8Value8 { key, .. }
            | Row::Rare { key, .. } => key,
        }
    }

    /// The suffix as an unsigned big-endian number
    pub fn value(&self) -> u64 {
        match *self {
            Row::Key4Value1 { value, .. } | Row::Key8Value1 { value, .. } => value as u64,
            Row::Key4Value4 { value, .. } | Row::Key8Value4 { value, .. } => value as u64,
            Row::Key4Value8 { value, .. } | Row::Key8Value8 { value, .. } => value,
            Row::Rare { suffix, .. } => suffix,
        }
    }

    /// Raw length in bytes
    pub fn len(&self) -> usize {
        match *self {
            Row::Key4Value1 { .. } | Row::Key8Value1 { .. } => 9,
            Row::Key4Value4 { .. } | Row::Key8Value4 { .. } => 12,
            Row::Key4Value8 { .. } | Row::Key8Value8 { .. } => 16,
            Row::Rare { len, .. } => len as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn write_raw(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.key().to_be_bytes());
        let width = self.len() - 8;
        out.extend_from_slice(&self.value().to_be_bytes()[8 - width..]);
    }

    /// Same-length rows order by (key, value), matching byte order
    fn compare_same_len(&self, other: &Row) -> Option<Ordering> {
        (self.len() == other.len())
            .then(|| (self.key(), self.value()).cmp(&(other.key(), other.value())))
    }
}

/// Arena-backed generic content
#[derive(Clone)]
pub struct ArenaBytes {
    arena: Arc<Arena>,
    span: ArenaSpan,
}

impl ArenaBytes {
    pub(crate) fn new(arena: Arc<Arena>, span: ArenaSpan) -> Self {
        Self { arena, span }
    }

    pub fn span(&self) -> ArenaSpan {
        self.span
    }

    pub fn read(&self) -> Bytes {
        self.arena.read(self.span)
    }
}

/// Shape discriminator, mostly for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Empty,
    Long,
    Str,
    Bytes,
    Key4Value1,
    Key8Value1,
    Key4Value4,
    Key8Value4,
    Key4Value8,
    Key8Value8,
    Rare,
    Arena,
    Hosted,
}

/// Immutable encoded field value
#[derive(Clone)]
pub enum Particle {
    Empty,
    Long(i64),
    Str(Arc<str>),
    /// Unoptimized generic bytes
    Bytes(Bytes),
    Row(Row),
    Arena(ArenaBytes),
    Hosted(HostedBytes),
}

impl Particle {
    pub fn empty() -> Self {
        Particle::Empty
    }

    pub fn long(value: i64) -> Self {
        Particle::Long(value)
    }

    pub fn string(value: impl AsRef<str>) -> Self {
        Particle::Str(Arc::from(value.as_ref()))
    }

    pub fn bytes(value: impl Into<Bytes>) -> Self {
        Particle::Bytes(value.into())
    }

    pub fn shape(&self) -> Shape {
        match self {
            Particle::Empty => Shape::Empty,
            Particle::Long(_) => Shape::Long,
            Particle::Str(_) => Shape::Str,
            Particle::Bytes(_) => Shape::Bytes,
            Particle::Row(row) => match row {
                Row::Key4Value1 { .. } => Shape::Key4Value1,
                Row::Key8Value1 { .. } => Shape::Key8Value1,
                Row::Key4Value4 { .. } => Shape::Key4Value4,
                Row::Key8Value4 { .. } => Shape::Key8Value4,
                Row::Key4Value8 { .. } => Shape::Key4Value8,
                Row::Key8Value8 { .. } => Shape::Key8Value8,
                Row::Rare { .. } => Shape::Rare,
            },
            Particle::Arena(_) => Shape::Arena,
            Particle::Hosted(_) => Shape::Hosted,
        }
    }

    /// Length of the raw form in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            Particle::Empty => 0,
            Particle::Long(_) => 8,
            Particle::Str(s) => s.len(),
            Particle::Bytes(b) => b.len(),
            Particle::Row(row) => row.len(),
            Particle::Arena(a) => a.span.len as usize,
            Particle::Hosted(h) => h.len(),
        }
    }

    /// Reproduce the original bytes
    ///
    /// # Panics
    ///
    /// Panics if a file-hosted particle cannot be read back. I/O failures
    /// are fatal for the owning universe; use [`Particle::try_raw`] to
    /// observe them instead.
    pub fn raw(&self) -> Bytes {
        match self.try_raw() {
            Ok(bytes) => bytes,
            Err(e) => panic!("failed to hydrate file-hosted particle: {}", e),
        }
    }

    /// Reproduce the original bytes, surfacing hydration failures
    pub fn try_raw(&self) -> Result<Bytes> {
        Ok(match self {
            Particle::Empty => Bytes::new(),
            Particle::Long(v) => Bytes::copy_from_slice(&v.to_be_bytes()),
            Particle::Str(s) => Bytes::copy_from_slice(s.as_bytes()),
            Particle::Bytes(b) => b.clone(),
            Particle::Row(row) => {
                let mut out = Vec::with_capacity(row.len());
                row.write_raw(&mut out);
                Bytes::from(out)
            }
            Particle::Arena(a) => a.read(),
            Particle::Hosted(h) => h.read()?,
        })
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Particle::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Particle::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the content lives outside this particle's own memory
    pub fn is_out_of_line(&self) -> bool {
        matches!(self, Particle::Arena(_) | Particle::Hosted(_))
    }

    /// Compare by shape fields where possible, by raw bytes otherwise
    fn compare(&self, other: &Particle) -> Ordering {
        match (self, other) {
            (Particle::Empty, Particle::Empty) => Ordering::Equal,
            // Big-endian two's complement orders like the unsigned value
            (Particle::Long(a), Particle::Long(b)) => (*a as u64).cmp(&(*b as u64)),
            (Particle::Str(a), Particle::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Particle::Bytes(a), Particle::Bytes(b)) => a.cmp(b),
            (Particle::Row(a), Particle::Row(b)) => match a.compare_same_len(b) {
                Some(ordering) => ordering,
                None => self.raw().cmp(&other.raw()),
            },
            (Particle::Arena(a), Particle::Arena(b)) if Arc::ptr_eq(&a.arena, &b.arena) => {
                a.arena.compare_spans(a.span, b.span)
            }
            (Particle::Arena(a), _) => a.arena.compare_with(a.span, &other.raw()),
            (_, Particle::Arena(b)) => b.arena.compare_with(b.span, &self.raw()).reverse(),
            _ => self.raw().cmp(&other.raw()),
        }
    }
}

impl PartialEq for Particle {
    fn eq(&self, other: &Self) -> bool {
        self.byte_len() == other.byte_len() && self.compare(other) == Ordering::Equal
    }
}

impl Eq for Particle {}

impl PartialOrd for Particle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Particle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Debug for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Particle::Empty => write!(f, "[E]"),
            Particle::Long(v) => write!(f, "L:{}", v),
            Particle::Str(s) => write!(f, "S:{}", s),
            Particle::Bytes(b) => write!(f, "A:[{}]", b.len()),
            Particle::Row(row) => write!(f, "R{}:{:x}/{:x}", row.len(), row.key(), row.value()),
            Particle::Arena(a) => write!(f, "H:[{}@{}]", a.span.len, a.span.offset),
            Particle::Hosted(h) => write!(f, "F:[{}@{}]", h.len(), h.offset()),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Particle {
    fn from(value: i64) -> Self {
        Particle::Long(value)
    }
}

impl From<&str> for Particle {
    fn from(value: &str) -> Self {
        Particle::string(value)
    }
}

impl From<String> for Particle {
    fn from(value: String) -> Self {
        Particle::Str(Arc::from(value))
    }
}

impl From<Vec<u8>> for Particle {
    fn from(value: Vec<u8>) -> Self {
        Particle::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for Particle {
    fn from(value: &[u8]) -> Self {
        Particle::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Bytes> for Particle {
    fn from(value: Bytes) -> Self {
        Particle::Bytes(value)
    }
}

impl<T: Into<Particle>> From<Option<T>> for Particle {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Particle::Empty)
    }
}
