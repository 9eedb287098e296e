//! Index Module
//!
//! Sorted views over committed atoms.
//!
//! ## Responsibilities
//! - Decide membership once, when a commit is published
//! - Keep members in comparator order with a deterministic tie-break
//! - Serve point, boundary and range queries without blocking commits
//!   for longer than one publication
//!
//! ## Ordering
//! ```text
//! loose  = comparator(a, b)
//! strict = comparator(a, b), then UCN descending, then AtomID descending
//! ```
//! `search(key)` starts at the first member not loosely less than `key`;
//! members the comparator considers equal come out newest first.

mod iterator;
mod sorted_set;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::atom::Atom;
use crate::particle::Particle;
use crate::universe::Published;

pub use iterator::SetIter;
pub use sorted_set::{CompactingSortedSet, SetOrdering, SetStats};

/// Name of the index holding every committed atom
pub const GLOBAL_INDEX_NAME: &str = ".GLOBAL";

// =============================================================================
// Comparators and conditions
// =============================================================================

/// Orders atoms for an index
pub trait AtomComparator: Send + Sync {
    fn compare(&self, a: &Atom, b: &Atom) -> Ordering;

    /// Compare an atom with a search key
    fn compare_to_key(&self, atom: &Atom, key: &Particle) -> Ordering;
}

/// Decides index membership
pub trait AtomCondition: Send + Sync {
    fn accepts(&self, atom: &Atom) -> bool;
}

impl<F> AtomCondition for F
where
    F: Fn(&Atom) -> bool + Send + Sync,
{
    fn accepts(&self, atom: &Atom) -> bool {
        self(atom)
    }
}

/// UCN descending; search keys are `Particle::Long(ucn)`
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalComparator;

impl AtomComparator for GlobalComparator {
    fn compare(&self, a: &Atom, b: &Atom) -> Ordering {
        b.ucn().cmp(&a.ucn())
    }

    fn compare_to_key(&self, atom: &Atom, key: &Particle) -> Ordering {
        match key.as_long() {
            Some(ucn) => (ucn as u64).cmp(&atom.ucn().unwrap_or(0)),
            None => Ordering::Less,
        }
    }
}

/// Orders by the particle at `field`; atoms without it sort first
#[derive(Debug, Clone, Copy)]
pub struct FieldComparator {
    pub field: i64,
}

impl FieldComparator {
    pub fn new(field: i64) -> Self {
        Self { field }
    }
}

impl AtomComparator for FieldComparator {
    fn compare(&self, a: &Atom, b: &Atom) -> Ordering {
        a.get(self.field).cmp(&b.get(self.field))
    }

    fn compare_to_key(&self, atom: &Atom, key: &Particle) -> Ordering {
        atom.get(self.field).cmp(&Some(key))
    }
}

/// Accepts atoms carrying `field`
#[derive(Debug, Clone, Copy)]
pub struct FieldCondition {
    pub field: i64,
}

impl FieldCondition {
    pub fn new(field: i64) -> Self {
        Self { field }
    }
}

impl AtomCondition for FieldCondition {
    fn accepts(&self, atom: &Atom) -> bool {
        atom.has(self.field)
    }
}

/// Accepts every atom
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl AtomCondition for Always {
    fn accepts(&self, _atom: &Atom) -> bool {
        true
    }
}

// =============================================================================
// Index description
// =============================================================================

/// Name, comparator and membership condition of an index
#[derive(Clone)]
pub struct IndexInfo {
    name: String,
    comparator: Arc<dyn AtomComparator>,
    condition: Arc<dyn AtomCondition>,
}

impl IndexInfo {
    pub fn new(
        name: impl Into<String>,
        comparator: impl AtomComparator + 'static,
        condition: impl AtomCondition + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            comparator: Arc::new(comparator),
            condition: Arc::new(condition),
        }
    }

    /// Atoms carrying `field`, ordered by its value
    pub fn field(name: impl Into<String>, field: i64) -> Self {
        Self::new(name, FieldComparator::new(field), FieldCondition::new(field))
    }

    pub(crate) fn global() -> Self {
        Self::new(GLOBAL_INDEX_NAME, GlobalComparator, Always)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self, atom: &Atom) -> bool {
        self.condition.accepts(atom)
    }
}

impl fmt::Debug for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexInfo").field("name", &self.name).finish()
    }
}

/// Strict and loose ordering of index members
pub struct AtomOrdering {
    comparator: Arc<dyn AtomComparator>,
}

impl SetOrdering<Arc<Atom>> for AtomOrdering {
    type Key = Particle;

    fn strict(&self, a: &Arc<Atom>, b: &Arc<Atom>) -> Ordering {
        self.comparator
            .compare(a, b)
            .then_with(|| b.ucn().cmp(&a.ucn()))
            .then_with(|| b.id().cmp(&a.id()))
    }

    fn loose(&self, item: &Arc<Atom>, key: &Particle) -> Ordering {
        self.comparator.compare_to_key(item, key)
    }
}

/// Iterator over index members
pub type IndexIter = SetIter<Arc<Atom>, AtomOrdering>;

// =============================================================================
// Index
// =============================================================================

struct IndexInner {
    id: u32,
    info: IndexInfo,
    set: RwLock<CompactingSortedSet<Arc<Atom>, AtomOrdering>>,
    /// Held for reading around every query so a commit is seen whole
    gate: Arc<RwLock<Published>>,
}

/// Shared handle on one index of a universe
#[derive(Clone)]
pub struct Index {
    inner: Arc<IndexInner>,
}

impl Index {
    pub(crate) fn new(
        id: u32,
        info: IndexInfo,
        gate: Arc<RwLock<Published>>,
        small_tree_limit: usize,
    ) -> Self {
        let ordering = AtomOrdering {
            comparator: info.comparator.clone(),
        };
        Self {
            inner: Arc::new(IndexInner {
                id,
                info,
                set: RwLock::new(CompactingSortedSet::new(ordering, small_tree_limit)),
                gate,
            }),
        }
    }

    /// Sequential id within the universe; the global index is 0
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        self.inner.info.name()
    }

    pub fn info(&self) -> &IndexInfo {
        &self.inner.info
    }

    pub fn accepts(&self, atom: &Atom) -> bool {
        self.inner.info.accepts(atom)
    }

    /// Members from the first one not loosely less than `key`
    pub fn search(&self, key: impl Into<Particle>) -> IndexIter {
        let key = key.into();
        let _gate = self.inner.gate.read();
        self.inner.set.read().iter_from(&key)
    }

    /// Newest member loosely equal to `key`
    pub fn search_exact(&self, key: impl Into<Particle>) -> Option<Arc<Atom>> {
        let key = key.into();
        let _gate = self.inner.gate.read();
        self.inner.set.read().search_exact(&key)
    }

    pub fn first(&self) -> Option<Arc<Atom>> {
        let _gate = self.inner.gate.read();
        self.inner.set.read().first()
    }

    pub fn last(&self) -> Option<Arc<Atom>> {
        let _gate = self.inner.gate.read();
        self.inner.set.read().last()
    }

    /// Every member in order
    pub fn all(&self) -> IndexIter {
        let _gate = self.inner.gate.read();
        self.inner.set.read().iter()
    }

    pub fn len(&self) -> usize {
        let _gate = self.inner.gate.read();
        self.inner.set.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> SetStats {
        self.inner.set.read().stats()
    }

    /// Insert the accepted atoms of one batch
    ///
    /// Caller holds the publication gate for writing. Batches larger than
    /// `bulk_threshold` go through bulk mode.
    pub(crate) fn publish(&self, atoms: &[Arc<Atom>], bulk_threshold: usize) -> usize {
        let mut set = self.inner.set.write();
        let bulk = atoms.len() > bulk_threshold && !set.is_adding();
        if bulk {
            set.start_adding(atoms.len());
        }
        let mut added = 0;
        for atom in atoms.iter().filter(|a| self.accepts(a)) {
            set.insert(atom.clone());
            added += 1;
        }
        if bulk {
            set.stop_adding();
        }
        added
    }

    pub(crate) fn start_adding(&self, expected: usize) {
        self.inner.set.write().start_adding(expected);
    }

    pub(crate) fn stop_adding(&self) {
        self.inner.set.write().stop_adding();
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("id", &self.inner.id)
            .field("name", &self.inner.info.name)
            .field("set", &*self.inner.set.read())
            .finish()
    }
}
