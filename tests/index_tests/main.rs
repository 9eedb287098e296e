//! Tests for the compacting sorted set
//!
//! These tests verify:
//! - Deterministic tie-break order across point and bulk insertion
//! - Snapshot iteration while the set is being mutated
//! - Merge behaviour of the small tree into the array
