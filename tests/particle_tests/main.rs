//! Tests for particle encoding through the public API
//!
//! These tests verify:
//! - Raw bytes survive encoding at every length, including shape boundaries
//! - Encoded particles order like their raw bytes
//! - Committed atoms read back the bytes they were built with

use std::sync::Arc;

use atomstore::particle::{Arena, ParticleEncoder};
use atomstore::{Config, Particle, Shape, Universe};

// =============================================================================
// Helper Functions
// =============================================================================

fn encoder() -> ParticleEncoder {
    ParticleEncoder::new(Arc::new(Arena::new(6, 1 << 20)), true)
}

/// Bytes with both small and large row values
fn sample(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_mul(31).wrapping_add((i as u8).wrapping_mul(7)))
        .collect()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_round_trip_every_length() {
    let enc = encoder();
    for len in 0..=300 {
        for seed in [0u8, 1, 200] {
            let raw = sample(len, seed);
            let particle = enc.encode(&raw).unwrap();
            assert_eq!(particle.raw().as_ref(), raw.as_slice(), "len {}", len);
            assert_eq!(particle.byte_len(), len);
        }
    }
}

#[test]
fn test_round_trip_row_boundaries() {
    let enc = encoder();
    for len in [8usize, 9, 10, 11, 12, 15, 16, 17] {
        let mut small = vec![0u8; len];
        if len > 0 {
            small[len - 1] = 7;
        }
        let mut large = vec![0xFFu8; len];
        large[0] = 1;

        for raw in [small, large] {
            let particle = enc.encode(&raw).unwrap();
            assert_eq!(particle.raw().as_ref(), raw.as_slice(), "len {}", len);
        }
    }
    assert_eq!(enc.encode(&[]).unwrap().shape(), Shape::Empty);
}

#[test]
fn test_encoded_order_matches_raw_order() {
    let enc = encoder();
    let mut raws: Vec<Vec<u8>> = Vec::new();
    for len in [4usize, 9, 12, 16, 24] {
        for seed in 0..8u8 {
            raws.push(sample(len, seed));
        }
    }

    for a in &raws {
        for b in &raws {
            let pa = enc.encode(a).unwrap();
            let pb = enc.encode(b).unwrap();
            assert_eq!(pa.cmp(&pb), a.cmp(b), "{:?} vs {:?}", a, b);
            assert_eq!(pa == pb, a == b);
        }
    }
}

#[test]
fn test_disabled_optimizer_keeps_bytes() {
    let config = Config::builder().optimizer_enabled(false).build();
    let universe = Universe::in_memory_with(config).unwrap();

    let mut exp = universe.begin().unwrap();
    let id = exp
        .create_atom()
        .build_junction(1, sample(12, 3))
        .unwrap()
        .id();
    assert!(exp.commit().is_successful());

    let atom = universe.get_atom(id).unwrap();
    assert_eq!(atom.get(1).unwrap().shape(), Shape::Bytes);
    assert!(!universe.encoder_stats().enabled);
}

#[test]
fn test_committed_atoms_read_back_bytes() {
    let universe = Universe::in_memory();
    let mut exp = universe.begin().unwrap();
    let mut ids = Vec::new();
    for len in 0..=40 {
        let id = exp
            .create_atom()
            .build_junction(1, sample(len, len as u8))
            .unwrap()
            .id();
        ids.push((id, len));
    }
    assert!(exp.commit().is_successful());

    for (id, len) in ids {
        let atom = universe.get_atom(id).unwrap();
        let particle = atom.get(1).unwrap();
        assert_eq!(particle.raw().as_ref(), sample(len, len as u8).as_slice());
        if len > 0 {
            assert_eq!(*particle, Particle::bytes(sample(len, len as u8)));
        }
    }
    assert!(universe.encoder_stats().arena_bytes > 0);
}
