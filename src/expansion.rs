//! Expansion (transaction)
//!
//! An expansion builds ethereal atoms that only it can see, then commits
//! them as one unit or discards them. It ends exactly once: `commit` and
//! `rollback` both consume it, and dropping it is a rollback.

use std::sync::Arc;

use tracing::trace;

use crate::atom::{Atom, AtomId};
use crate::error::{AtomError, VerificationError};
use crate::universe::Shared;

/// A check run inside the commit, before a UCN is assigned
pub type Verifier =
    Box<dyn FnOnce(&[Atom]) -> std::result::Result<(), VerificationError> + Send + 'static>;

/// Why a commit did not happen
#[derive(Debug)]
pub enum RollbackReason {
    /// A verifier rejected the expansion; the universe is unaffected
    Verification(VerificationError),
    /// The commit itself failed
    Failure(AtomError),
}

/// Outcome of `Expansion::commit`
#[derive(Debug)]
#[must_use]
pub enum CommitResult {
    Committed { ucn: u64 },
    RolledBack(RollbackReason),
}

impl CommitResult {
    pub fn is_successful(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }

    /// UCN assigned to the committed atoms
    pub fn commit_ucn(&self) -> Option<u64> {
        match self {
            CommitResult::Committed { ucn } => Some(*ucn),
            CommitResult::RolledBack(_) => None,
        }
    }

    pub fn verification_error(&self) -> Option<&VerificationError> {
        match self {
            CommitResult::RolledBack(RollbackReason::Verification(e)) => Some(e),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AtomError> {
        match self {
            CommitResult::RolledBack(RollbackReason::Failure(e)) => Some(e),
            _ => None,
        }
    }
}

/// A batch of atom creations committed or rolled back as one unit
///
/// Built by a single logical writer; several expansions may be open at
/// once on the same universe.
pub struct Expansion {
    shared: Arc<Shared>,
    start_ucn: u64,
    atoms: Vec<Atom>,
    verifiers: Vec<Verifier>,
}

impl Expansion {
    pub(crate) fn new(shared: Arc<Shared>, start_ucn: u64) -> Self {
        Self {
            shared,
            start_ucn,
            atoms: Vec::new(),
            verifiers: Vec::new(),
        }
    }

    /// UCN of the universe when this expansion began
    pub fn start_ucn(&self) -> u64 {
        self.start_ucn
    }

    /// Allocate a new ethereal atom
    pub fn create_atom(&mut self) -> &mut Atom {
        let id = self.shared.allocate_atom_id();
        self.atoms.push(Atom::new(id));
        let last = self.atoms.len() - 1;
        &mut self.atoms[last]
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.iter().find(|a| a.id() == id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.iter_mut().find(|a| a.id() == id)
    }

    /// Atoms created so far, in creation order
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Register a check that can reject the whole expansion
    ///
    /// Verifiers run under the commit lock. They may read the universe, but
    /// committing an expansion, `Universe::create_index`, `start` and `stop`
    /// all take that lock and deadlock when called from a verifier.
    pub fn add_verifier<F>(&mut self, verifier: F)
    where
        F: FnOnce(&[Atom]) -> std::result::Result<(), VerificationError> + Send + 'static,
    {
        self.verifiers.push(Box::new(verifier));
    }

    /// Verify, assign the next UCN, freeze and publish every atom
    pub fn commit(mut self) -> CommitResult {
        let atoms = std::mem::take(&mut self.atoms);
        let verifiers = std::mem::take(&mut self.verifiers);
        self.shared.commit(atoms, verifiers)
    }

    /// Discard every atom; their ids are never handed out again
    pub fn rollback(self) {}
}

impl Drop for Expansion {
    fn drop(&mut self) {
        if !self.atoms.is_empty() {
            trace!(
                start_ucn = self.start_ucn,
                atoms = self.atoms.len(),
                "Expansion rolled back"
            );
        }
    }
}

impl std::fmt::Debug for Expansion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expansion")
            .field("start_ucn", &self.start_ucn)
            .field("atoms", &self.atoms.len())
            .field("verifiers", &self.verifiers.len())
            .finish()
    }
}
