//! Snapshot merge iterator
//!
//! Walks the array and tree snapshots of a sorted set side by side,
//! yielding the strictly smaller head each step.

use std::cmp::Ordering;
use std::sync::Arc;

use super::sorted_set::SetOrdering;

pub struct SetIter<T, O> {
    array: Arc<Vec<T>>,
    a: usize,
    tree: Arc<Vec<T>>,
    t: usize,
    ordering: Arc<O>,
}

impl<T, O> SetIter<T, O> {
    pub(crate) fn new(
        array: Arc<Vec<T>>,
        a: usize,
        tree: Arc<Vec<T>>,
        t: usize,
        ordering: Arc<O>,
    ) -> Self {
        Self {
            array,
            a,
            tree,
            t,
            ordering,
        }
    }

    /// Elements left to yield
    pub fn remaining(&self) -> usize {
        (self.array.len() - self.a) + (self.tree.len() - self.t)
    }
}

impl<T: Clone, O: SetOrdering<T>> Iterator for SetIter<T, O> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let take_tree = match (self.array.get(self.a), self.tree.get(self.t)) {
            (None, None) => return None,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some(a), Some(t)) => self.ordering.strict(a, t) == Ordering::Greater,
        };
        if take_tree {
            self.t += 1;
            Some(self.tree[self.t - 1].clone())
        } else {
            self.a += 1;
            Some(self.array[self.a - 1].clone())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl<T: Clone, O: SetOrdering<T>> ExactSizeIterator for SetIter<T, O> {}
