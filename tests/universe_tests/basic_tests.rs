use atomstore::{AtomError, IndexInfo, Universe, VerificationError, START_UCN};

use super::VALUE;

// =============================================================================
// Helper Functions
// =============================================================================

fn commit_value(universe: &Universe, value: &str) -> (atomstore::AtomId, u64) {
    let mut exp = universe.begin().unwrap();
    let id = exp.create_atom().build_junction(VALUE, value).unwrap().id();
    let result = exp.commit();
    assert!(result.is_successful(), "{:?}", result);
    (id, result.commit_ucn().unwrap())
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_create_atom_and_read_back() {
    let universe = Universe::in_memory();
    let (id, ucn) = commit_value(&universe, "hello");

    let atom = universe.get_atom(id).unwrap();
    assert_eq!(atom.get_string(VALUE), Some("hello"));
    assert_eq!(atom.ucn(), Some(ucn));
    assert!(atom.is_committed());
}

#[test]
fn test_ucn_increases_with_each_commit() {
    let universe = Universe::in_memory();
    assert_eq!(universe.ucn(), START_UCN);

    let mut last = 0;
    for i in 0..5 {
        let (_, ucn) = commit_value(&universe, &i.to_string());
        assert!(ucn > last);
        assert!(universe.ucn() > ucn);
        last = ucn;
    }
}

#[test]
fn test_commit_ucn_equals_start_ucn_without_concurrency() {
    let universe = Universe::in_memory();
    commit_value(&universe, "a");

    let mut exp = universe.begin().unwrap();
    let start = exp.start_ucn();
    exp.create_atom().build_junction(VALUE, "b").unwrap();
    assert_eq!(exp.commit().commit_ucn(), Some(start));
}

#[test]
fn test_all_atoms_of_expansion_share_ucn() {
    let universe = Universe::in_memory();
    let mut exp = universe.begin().unwrap();
    let ids: Vec<_> = (0..5)
        .map(|i| exp.create_atom().build_junction(VALUE, i as i64).unwrap().id())
        .collect();
    let ucn = exp.commit().commit_ucn().unwrap();

    for id in ids {
        assert_eq!(universe.get_atom(id).unwrap().ucn(), Some(ucn));
    }
}

// =============================================================================
// Verification and Rollback Tests
// =============================================================================

#[test]
fn test_verification_failure_rolls_back_everything() {
    let universe = Universe::in_memory();
    let before = universe.ucn();

    let mut exp = universe.begin().unwrap();
    let a = exp.create_atom().build_junction(VALUE, "x").unwrap().id();
    let b = exp.create_atom().build_junction(VALUE, "y").unwrap().id();
    exp.add_verifier(|_| Ok(()));
    exp.add_verifier(|atoms| {
        if atoms.len() > 1 {
            Err(VerificationError::new("too many atoms"))
        } else {
            Ok(())
        }
    });

    let result = exp.commit();
    assert!(!result.is_successful());
    assert_eq!(
        result.verification_error(),
        Some(&VerificationError::new("too many atoms"))
    );
    assert!(result.error().is_none());

    assert_eq!(universe.ucn(), before);
    assert!(universe.get_atom(a).is_none());
    assert!(universe.get_atom(b).is_none());
    assert!(universe.global_index().is_empty());

    // The universe stays usable
    commit_value(&universe, "after");
    assert_eq!(universe.global_index().len(), 1);
}

#[test]
fn test_verifier_may_read_universe() {
    let universe = Universe::in_memory();
    let (existing, _) = commit_value(&universe, "first");

    let reader = universe.clone();
    let mut exp = universe.begin().unwrap();
    exp.create_atom().build_junction(VALUE, "second").unwrap();
    exp.add_verifier(move |_| match reader.get_atom(existing) {
        Some(_) => Ok(()),
        None => Err(VerificationError::new("missing")),
    });
    assert!(exp.commit().is_successful());
}

#[test]
fn test_rollback_discards_atoms() {
    let universe = Universe::in_memory();
    let mut exp = universe.begin().unwrap();
    let id = exp.create_atom().build_junction(VALUE, "gone").unwrap().id();
    exp.rollback();

    assert!(universe.get_atom(id).is_none());
    assert_eq!(universe.atom_count(), 0);

    // Dropping an expansion is a rollback too
    {
        let mut exp = universe.begin().unwrap();
        exp.create_atom();
    }
    assert_eq!(universe.atom_count(), 0);
    assert_eq!(universe.ucn(), START_UCN);
}

// =============================================================================
// Index Tests
// =============================================================================

#[test]
fn test_global_index_is_newest_first() {
    let universe = Universe::in_memory();
    for value in ["1", "2", "3"] {
        commit_value(&universe, value);
    }

    let values: Vec<String> = universe
        .global_index()
        .all()
        .map(|atom| atom.get_string(VALUE).unwrap().to_string())
        .collect();
    assert_eq!(values, vec!["3", "2", "1"]);
}

#[test]
fn test_global_index_search_by_ucn() {
    let universe = Universe::in_memory();
    let ucns: Vec<u64> = ["1", "2", "3"]
        .iter()
        .map(|v| commit_value(&universe, v).1)
        .collect();

    let global = universe.global_index();
    let from_middle: Vec<u64> = global
        .search(ucns[1] as i64)
        .map(|a| a.ucn().unwrap())
        .collect();
    assert_eq!(from_middle, vec![ucns[1], ucns[0]]);
    assert_eq!(global.first().unwrap().ucn(), Some(ucns[2]));
    assert_eq!(global.last().unwrap().ucn(), Some(ucns[0]));
}

#[test]
fn test_field_index_orders_by_value() {
    let universe = Universe::in_memory();
    let index = universe.create_index(IndexInfo::field("by-value", VALUE)).unwrap();

    for value in ["b", "c", "a"] {
        commit_value(&universe, value);
    }
    // Atoms without the field are not members
    let mut exp = universe.begin().unwrap();
    exp.create_atom().build_junction(99, "other").unwrap();
    assert!(exp.commit().is_successful());

    let values: Vec<String> = index
        .all()
        .map(|atom| atom.get_string(VALUE).unwrap().to_string())
        .collect();
    assert_eq!(values, vec!["a", "b", "c"]);
    assert_eq!(index.len(), 3);
    assert_eq!(universe.global_index().len(), 4);

    let found = index.search_exact("b").unwrap();
    assert_eq!(found.get_string(VALUE), Some("b"));
    assert!(index.search_exact("zzz").is_none());
}

#[test]
fn test_create_index_backfills_existing_atoms() {
    let universe = Universe::in_memory();
    for value in ["x", "y"] {
        commit_value(&universe, value);
    }

    let index = universe.create_index(IndexInfo::field("late", VALUE)).unwrap();
    assert_eq!(index.id(), 1);
    assert_eq!(index.len(), 2);
    assert!(universe.index("late").is_some());
    assert_eq!(universe.indices().len(), 2);

    let duplicate = universe.create_index(IndexInfo::field("late", VALUE));
    assert!(matches!(duplicate, Err(AtomError::IllegalState(_))));
}

#[test]
fn test_indices_for_atom() {
    let universe = Universe::in_memory();
    universe.create_index(IndexInfo::field("by-value", VALUE)).unwrap();
    universe.create_index(IndexInfo::field("by-other", 42)).unwrap();

    let (id, _) = commit_value(&universe, "v");
    let atom = universe.get_atom(id).unwrap();
    let names: Vec<String> = universe
        .indices_for(&atom)
        .iter()
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(names, vec![".GLOBAL", "by-value"]);
}

#[test]
fn test_stopped_universe_refuses_expansions() {
    let universe = Universe::in_memory();
    let mut open = universe.begin().unwrap();
    open.create_atom();
    universe.stop().unwrap();

    assert!(matches!(universe.begin(), Err(AtomError::IllegalState(_))));
    let result = open.commit();
    assert!(matches!(result.error(), Some(AtomError::IllegalState(_))));
}
