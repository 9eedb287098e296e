//! Tests for file-backed universes
//!
//! These tests verify:
//! - Committed atoms survive a stop and reopen with their UCNs
//! - Large values are hosted in the data file and hydrated lazily
//! - Header properties and index contents are rebuilt on replay
//! - Damaged data files are reported, not repaired
//! - Read-only opens never write to the data file

mod durability_tests;
mod recovery_tests;

use std::path::Path;

use atomstore::{Config, LogSyncStrategy, Universe};
use tempfile::TempDir;

/// Field key used for the test values
pub const VALUE: i64 = 1;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn config_for(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .sync_strategy(LogSyncStrategy::EveryCommit)
        .hosted_threshold(32)
        .build()
}

pub fn open(dir: &Path) -> Universe {
    let universe = Universe::file_backed(config_for(dir)).unwrap();
    universe.start().unwrap();
    universe
}

pub fn setup_temp_universe() -> (TempDir, Universe) {
    let temp_dir = TempDir::new().unwrap();
    let universe = open(temp_dir.path());
    (temp_dir, universe)
}
