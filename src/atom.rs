//! Atom and Junction model
//!
//! An atom is a record of (field key, particle) junctions. It is ethereal
//! while its expansion is open and frozen, with a UCN, once committed.
//! Frozen atoms are shared as `Arc<Atom>` and never change again.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::error::{AtomError, Result};
use crate::particle::Particle;

/// Permanent atom identity; never reused, even after rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u64);

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A (field key, value) pair
pub type Junction = (i64, Particle);

pub struct Atom {
    id: AtomId,
    ucn: Option<u64>,
    /// Sorted by key, one particle per key
    junctions: Vec<Junction>,
}

impl Atom {
    pub(crate) fn new(id: AtomId) -> Self {
        Self {
            id,
            ucn: None,
            junctions: Vec::new(),
        }
    }

    pub fn id(&self) -> AtomId {
        self.id
    }

    /// UCN of the commit that froze this atom
    pub fn ucn(&self) -> Option<u64> {
        self.ucn
    }

    pub fn is_committed(&self) -> bool {
        self.ucn.is_some()
    }

    /// Set a field, replacing any earlier value for the same key
    pub fn build_junction(&mut self, key: i64, value: impl Into<Particle>) -> Result<&mut Self> {
        if self.is_committed() {
            return Err(AtomError::IllegalState(format!(
                "atom {} is frozen",
                self.id
            )));
        }
        let particle = value.into();
        match self.position(key) {
            Ok(i) => self.junctions[i].1 = particle,
            Err(i) => self.junctions.insert(i, (key, particle)),
        }
        Ok(self)
    }

    /// Freeze the atom under `ucn`
    pub fn build_finished(&mut self, ucn: u64) -> Result<()> {
        if let Some(existing) = self.ucn {
            return Err(AtomError::IllegalState(format!(
                "atom {} already frozen at UCN {}",
                self.id, existing
            )));
        }
        self.junctions.shrink_to_fit();
        self.ucn = Some(ucn);
        Ok(())
    }

    pub fn get(&self, key: i64) -> Option<&Particle> {
        self.position(key).ok().map(|i| &self.junctions[i].1)
    }

    pub fn get_long(&self, key: i64) -> Option<i64> {
        self.get(key).and_then(Particle::as_long)
    }

    pub fn get_string(&self, key: i64) -> Option<&str> {
        self.get(key).and_then(Particle::as_str)
    }

    /// Raw bytes of a field, hydrating hosted content
    pub fn get_bytes(&self, key: i64) -> Option<Bytes> {
        self.get(key).map(Particle::raw)
    }

    pub fn has(&self, key: i64) -> bool {
        self.position(key).is_ok()
    }

    /// Junctions in key order
    pub fn junctions(&self) -> impl Iterator<Item = (i64, &Particle)> + '_ {
        self.junctions.iter().map(|(k, p)| (*k, p))
    }

    pub fn junction_count(&self) -> usize {
        self.junctions.len()
    }

    /// Snapshot of all junctions
    pub fn copy_junctions(&self) -> BTreeMap<i64, Particle> {
        self.junctions.iter().cloned().collect()
    }

    /// Fold over junctions in key order
    pub fn visit<T>(&self, init: T, mut f: impl FnMut(T, i64, &Particle) -> T) -> T {
        self.junctions
            .iter()
            .fold(init, |acc, (key, particle)| f(acc, *key, particle))
    }

    /// Replace every particle; used by the optimizer before freezing
    pub(crate) fn try_map_particles(
        &mut self,
        mut f: impl FnMut(&Particle) -> Result<Particle>,
    ) -> Result<()> {
        for (_, particle) in self.junctions.iter_mut() {
            *particle = f(particle)?;
        }
        Ok(())
    }

    pub(crate) fn replace_particle(&mut self, key: i64, particle: Particle) {
        if let Ok(i) = self.position(key) {
            self.junctions[i].1 = particle;
        }
    }

    fn position(&self, key: i64) -> std::result::Result<usize, usize> {
        self.junctions.binary_search_by_key(&key, |(k, _)| *k)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        map.entry(&"id", &self.id);
        map.entry(&"ucn", &self.ucn);
        for (key, particle) in &self.junctions {
            map.entry(key, particle);
        }
        map.finish()
    }
}

/// A reference to another atom is stored as its id
impl From<&Atom> for Particle {
    fn from(atom: &Atom) -> Self {
        Particle::Long(atom.id.0 as i64)
    }
}

impl From<AtomId> for Particle {
    fn from(id: AtomId) -> Self {
        Particle::Long(id.0 as i64)
    }
}
