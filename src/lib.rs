//! # atomstore
//!
//! An embedded atom store with:
//! - Compact particle encoding over a shared append-only arena
//! - Transactional expansions with verifiers and all-or-nothing commits
//! - Sorted indexes with bulk loading and deterministic tie-breaks
//! - An append-only data file with lazy hydration of large values
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Universe                            │
//! │          (begin / get_atom / indexes / start / stop)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Expansion::commit
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Commit critical section                    │
//! │         (verify → persist → freeze → publish)               │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │  Particles  │        │   Indexes   │        │  Data file  │
//! │ (Arena +    │        │ (Compacting │        │ (Append +   │
//! │  caches)    │        │  sorted set)│        │  hosted)    │
//! └─────────────┘        └─────────────┘        └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod atom;
pub mod expansion;
pub mod index;
pub mod log;
pub mod particle;
pub mod universe;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use atom::{Atom, AtomId, Junction};
pub use config::{Config, ConfigBuilder, LogSyncStrategy};
pub use error::{AtomError, Result, VerificationError};
pub use expansion::{CommitResult, Expansion, RollbackReason};
pub use index::{
    Always, AtomComparator, AtomCondition, FieldComparator, FieldCondition, GlobalComparator,
    Index, IndexInfo, IndexIter, GLOBAL_INDEX_NAME,
};
pub use particle::{Particle, Shape};
pub use universe::{Universe, START_UCN};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of atomstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
