//! Compacting sorted set
//!
//! A large sorted array plus a small sorted buffer for point inserts. The
//! buffer is merged into the array once it outgrows its limit. Bulk mode
//! collects additions unsorted and sorts them once on `stop_adding`.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────┐  ┌───────────────┐  ┌─────────┐
//! │ array (sorted, Arc, copy-on-write)  │  │ tree (sorted) │  │ pending │
//! └─────────────────────────────────────┘  └───────────────┘  └─────────┘
//!            merged on overflow  <───────────────┘    sorted on stop_adding
//! ```
//!
//! Iterators hold `Arc` snapshots of the array and the tree taken at
//! creation, so later mutation is never observed and never disturbs them.
//! Additions made in bulk mode become visible at `stop_adding`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::iterator::SetIter;

/// Two-level ordering of set elements
///
/// `strict` is a total order used for placement and deduplication;
/// `loose` compares an element with a search key and may report equal
/// for elements that `strict` tells apart.
pub trait SetOrdering<T> {
    type Key: ?Sized;

    fn strict(&self, a: &T, b: &T) -> Ordering;

    fn loose(&self, item: &T, key: &Self::Key) -> Ordering;
}

/// Element counts per level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetStats {
    pub array: usize,
    pub tree: usize,
    pub pending: usize,
}

impl fmt::Display for SetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arr:{} tree:{} pend:{}", self.array, self.tree, self.pending)
    }
}

pub struct CompactingSortedSet<T, O> {
    ordering: Arc<O>,
    array: Arc<Vec<T>>,
    tree: Arc<Vec<T>>,
    pending: Option<Vec<T>>,
    small_tree_limit: usize,
}

impl<T: Clone, O: SetOrdering<T>> CompactingSortedSet<T, O> {
    pub fn new(ordering: O, small_tree_limit: usize) -> Self {
        Self {
            ordering: Arc::new(ordering),
            array: Arc::new(Vec::new()),
            tree: Arc::new(Vec::new()),
            pending: None,
            small_tree_limit: small_tree_limit.max(1),
        }
    }

    pub fn ordering(&self) -> &O {
        &self.ordering
    }

    /// Visible elements (bulk additions excluded until `stop_adding`)
    pub fn len(&self) -> usize {
        self.array.len() + self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_adding(&self) -> bool {
        self.pending.is_some()
    }

    pub fn stats(&self) -> SetStats {
        SetStats {
            array: self.array.len(),
            tree: self.tree.len(),
            pending: self.pending.as_ref().map_or(0, Vec::len),
        }
    }

    /// Add an element; returns false if a strictly equal one is present
    ///
    /// In bulk mode the element is buffered and duplicates are dropped at
    /// `stop_adding`.
    pub fn insert(&mut self, item: T) -> bool {
        if let Some(pending) = self.pending.as_mut() {
            pending.push(item);
            return true;
        }
        if self.find_strict(&self.array, &item).is_ok() {
            return false;
        }
        let ordering = self.ordering.clone();
        let tree = Arc::make_mut(&mut self.tree);
        match tree.binary_search_by(|member| ordering.strict(member, &item)) {
            Ok(_) => return false,
            Err(i) => tree.insert(i, item),
        }
        if self.tree.len() > self.small_tree_limit {
            self.merge_tree();
        }
        true
    }

    /// Remove a strictly equal element
    pub fn remove(&mut self, item: &T) -> bool {
        if let Some(pending) = self.pending.as_mut() {
            let ordering = &self.ordering;
            if let Some(i) = pending
                .iter()
                .position(|p| ordering.strict(p, item) == Ordering::Equal)
            {
                pending.swap_remove(i);
                return true;
            }
        }
        if let Ok(i) = self.find_strict(&self.tree, item) {
            Arc::make_mut(&mut self.tree).remove(i);
            return true;
        }
        if let Ok(i) = self.find_strict(&self.array, item) {
            Arc::make_mut(&mut self.array).remove(i);
            return true;
        }
        false
    }

    /// Enter bulk mode, expecting about `expected` additions
    pub fn start_adding(&mut self, expected: usize) {
        match self.pending.as_mut() {
            Some(pending) => pending.reserve(expected),
            None => self.pending = Some(Vec::with_capacity(expected)),
        }
    }

    /// Leave bulk mode, sorting buffered additions into the array
    pub fn stop_adding(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.is_empty() {
            return;
        }

        let started = Instant::now();
        let added = pending.len();
        let ordering = self.ordering.clone();

        let mut all = Vec::with_capacity(self.array.len() + self.tree.len() + added);
        all.extend(self.array.iter().cloned());
        all.extend(self.tree.iter().cloned());
        all.extend(pending);
        all.sort_by(|a, b| ordering.strict(a, b));
        all.dedup_by(|a, b| ordering.strict(a, b) == Ordering::Equal);

        let size = all.len();
        self.array = Arc::new(all);
        self.tree = Arc::new(Vec::new());
        debug!(added, size, elapsed_us = started.elapsed().as_micros() as u64, "Bulk addition sorted");
    }

    fn merge_tree(&mut self) {
        let started = Instant::now();
        let tree = std::mem::replace(&mut self.tree, Arc::new(Vec::new()));
        let merged = merge_sorted(&self.array, &tree, |a, b| self.ordering.strict(a, b));
        self.array = Arc::new(merged);
        debug!(
            merged = tree.len(),
            size = self.array.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Small tree merged into array"
        );
    }

    pub fn first(&self) -> Option<T> {
        self.pick(self.array.first(), self.tree.first(), Ordering::Less)
    }

    pub fn last(&self) -> Option<T> {
        self.pick(self.array.last(), self.tree.last(), Ordering::Greater)
    }

    /// Strictly smallest element that loosely equals `key`
    pub fn search_exact(&self, key: &O::Key) -> Option<T> {
        self.pick(
            self.exact_in(&self.array, key),
            self.exact_in(&self.tree, key),
            Ordering::Less,
        )
    }

    fn exact_in<'a>(&self, v: &'a [T], key: &O::Key) -> Option<&'a T> {
        v.get(self.start_index(v, key))
            .filter(|item| self.ordering.loose(item, key) == Ordering::Equal)
    }

    /// Iterate from the first element not loosely less than `key`
    pub fn iter_from(&self, key: &O::Key) -> SetIter<T, O> {
        let a = self.start_index(&self.array, key);
        let t = self.start_index(&self.tree, key);
        SetIter::new(
            self.array.clone(),
            a,
            self.tree.clone(),
            t,
            self.ordering.clone(),
        )
    }

    /// Iterate over every visible element
    pub fn iter(&self) -> SetIter<T, O> {
        SetIter::new(
            self.array.clone(),
            0,
            self.tree.clone(),
            0,
            self.ordering.clone(),
        )
    }

    /// First position whose element is not loosely less than `key`
    ///
    /// Loosely equal elements are contiguous, so this lands on the first
    /// of them.
    fn start_index(&self, v: &[T], key: &O::Key) -> usize {
        v.partition_point(|item| self.ordering.loose(item, key) == Ordering::Less)
    }

    fn find_strict(&self, v: &[T], item: &T) -> std::result::Result<usize, usize> {
        v.binary_search_by(|member| self.ordering.strict(member, item))
    }

    fn pick(&self, a: Option<&T>, b: Option<&T>, want: Ordering) -> Option<T> {
        match (a, b) {
            (Some(a), Some(b)) => {
                if self.ordering.strict(a, b) == want {
                    Some(a.clone())
                } else {
                    Some(b.clone())
                }
            }
            (a, b) => a.or(b).cloned(),
        }
    }
}

fn merge_sorted<T: Clone>(a: &[T], b: &[T], cmp: impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if cmp(&a[i], &b[j]) == Ordering::Greater {
            out.push(b[j].clone());
            j += 1;
        } else {
            out.push(a[i].clone());
            i += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

impl<T, O> fmt::Debug for CompactingSortedSet<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactingSortedSet")
            .field("array", &self.array.len())
            .field("tree", &self.tree.len())
            .field("pending", &self.pending.as_ref().map(Vec::len))
            .finish()
    }
}
