//! Tests for Universe and Expansion
//!
//! These tests verify:
//! - Atom creation, lookup and UCN assignment
//! - Verification failures and rollback
//! - Global index order
//! - Commit atomicity under concurrent readers and writers

mod basic_tests;
mod concurrency_tests;

/// Field key used for the test values
pub const VALUE: i64 = 1;

/// Field key linking an atom to its predecessor
pub const PREV: i64 = 2;
