use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use atomstore::{AtomId, IndexInfo, Universe};

use super::{PREV, VALUE};

const BATCH: i64 = 3;
const ATOMS_PER_BATCH: usize = 5;

// =============================================================================
// Concurrent Writer Tests
// =============================================================================

#[test]
fn test_concurrent_chains_get_increasing_ucns() {
    let universe = Universe::in_memory();
    let writers = 20;
    let chain = 100;

    let chains: Vec<Vec<(AtomId, u64)>> = crossbeam::scope(|s| {
        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let universe = universe.clone();
                s.spawn(move |_| {
                    let mut committed = Vec::with_capacity(chain);
                    let mut prev: Option<AtomId> = None;
                    for i in 0..chain {
                        let mut exp = universe.begin().unwrap();
                        let atom = exp.create_atom();
                        atom.build_junction(VALUE, (w * 1_000 + i) as i64).unwrap();
                        atom.build_junction(PREV, prev).unwrap();
                        let id = atom.id();
                        let ucn = exp.commit().commit_ucn().unwrap();
                        committed.push((id, ucn));
                        prev = Some(id);
                    }
                    committed
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    let mut all_ucns = Vec::new();
    for committed in &chains {
        // Later commits of one writer always get larger UCNs
        for pair in committed.windows(2) {
            assert!(pair[1].1 > pair[0].1);
        }
        // Each link points at its predecessor
        for pair in committed.windows(2) {
            let atom = universe.get_atom(pair[1].0).unwrap();
            assert_eq!(atom.get_long(PREV), Some(pair[0].0 .0 as i64));
        }
        all_ucns.extend(committed.iter().map(|(_, ucn)| *ucn));
    }

    all_ucns.sort_unstable();
    all_ucns.dedup();
    assert_eq!(all_ucns.len(), writers * chain);
    assert_eq!(universe.atom_count(), writers * chain);
    assert!(universe.ucn() > *all_ucns.last().unwrap());
}

// =============================================================================
// Atomic Visibility Tests
// =============================================================================

#[test]
fn test_readers_never_see_partial_commits() {
    let universe = Universe::in_memory();
    let index = universe.create_index(IndexInfo::field("by-batch", BATCH)).unwrap();
    let done = AtomicBool::new(false);

    crossbeam::scope(|s| {
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let universe = universe.clone();
                s.spawn(move |_| {
                    for b in 0..50i64 {
                        let mut exp = universe.begin().unwrap();
                        for i in 0..ATOMS_PER_BATCH {
                            exp.create_atom()
                                .build_junction(BATCH, w * 1_000 + b)
                                .unwrap()
                                .build_junction(VALUE, i as i64)
                                .unwrap();
                        }
                        assert!(exp.commit().is_successful());
                    }
                })
            })
            .collect();

        for _ in 0..4 {
            let universe = universe.clone();
            let index = index.clone();
            let done = &done;
            s.spawn(move |_| {
                let mut last_ucn = 0;
                while !done.load(Ordering::Acquire) {
                    let ucn = universe.ucn();
                    assert!(ucn >= last_ucn);
                    last_ucn = ucn;

                    let mut per_ucn: BTreeMap<u64, usize> = BTreeMap::new();
                    for atom in universe.global_index().all() {
                        *per_ucn.entry(atom.ucn().unwrap()).or_default() += 1;
                    }
                    assert!(per_ucn.values().all(|&n| n == ATOMS_PER_BATCH));

                    let mut per_batch: BTreeMap<i64, usize> = BTreeMap::new();
                    for atom in index.all() {
                        *per_batch.entry(atom.get_long(BATCH).unwrap()).or_default() += 1;
                    }
                    assert!(per_batch.values().all(|&n| n == ATOMS_PER_BATCH));
                }
            });
        }

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
    })
    .unwrap();

    assert_eq!(universe.atom_count(), 4 * 50 * ATOMS_PER_BATCH);
    assert_eq!(index.len(), 4 * 50 * ATOMS_PER_BATCH);
}

#[test]
fn test_large_batch_visible_all_at_once() {
    // Above the bulk threshold, so indexes load the batch in bulk mode
    let universe = Universe::in_memory();
    let index = universe.create_index(IndexInfo::field("by-value", VALUE)).unwrap();
    let total = 5_000usize;

    crossbeam::scope(|s| {
        let reader = {
            let index = index.clone();
            s.spawn(move |_| {
                let mut seen = 0;
                while seen < total {
                    seen = index.all().count();
                    assert!(seen == 0 || seen == total, "saw {} atoms", seen);
                }
            })
        };

        let mut exp = universe.begin().unwrap();
        for i in 0..total {
            exp.create_atom().build_junction(VALUE, i as i64).unwrap();
        }
        assert!(exp.commit().is_successful());
        reader.join().unwrap();
    })
    .unwrap();

    let values: Vec<i64> = index.all().map(|a| a.get_long(VALUE).unwrap()).collect();
    assert_eq!(values, (0..total as i64).collect::<Vec<_>>());
}
