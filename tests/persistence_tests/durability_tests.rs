use atomstore::{AtomError, Config, IndexInfo, Shape, Universe};
use tempfile::TempDir;

use super::{config_for, open, setup_temp_universe, VALUE};

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_atom_survives_reopen_with_same_ucn() {
    let (temp_dir, universe) = setup_temp_universe();

    let mut exp = universe.begin().unwrap();
    let id = exp.create_atom().build_junction(VALUE, "f2").unwrap().id();
    let ucn = exp.commit().commit_ucn().unwrap();
    universe.stop().unwrap();

    let reopened = open(temp_dir.path());
    let atom = reopened.get_atom(id).unwrap();
    assert_eq!(atom.get_string(VALUE), Some("f2"));
    assert_eq!(atom.ucn(), Some(ucn));
    assert!(reopened.ucn() > ucn);
    reopened.stop().unwrap();
}

#[test]
fn test_reopen_continues_ids_and_ucns() {
    let (temp_dir, universe) = setup_temp_universe();

    let mut last_id = None;
    for i in 0..10i64 {
        let mut exp = universe.begin().unwrap();
        last_id = Some(exp.create_atom().build_junction(VALUE, i).unwrap().id());
        assert!(exp.commit().is_successful());
    }
    let ucn_before = universe.ucn();
    universe.stop().unwrap();

    let reopened = open(temp_dir.path());
    assert_eq!(reopened.ucn(), ucn_before);
    assert_eq!(reopened.atom_count(), 10);

    let mut exp = reopened.begin().unwrap();
    let id = exp.create_atom().build_junction(VALUE, 10i64).unwrap().id();
    assert_eq!(exp.commit().commit_ucn(), Some(ucn_before));
    assert!(id > last_id.unwrap());

    let values: Vec<i64> = reopened
        .global_index()
        .all()
        .map(|a| a.get_long(VALUE).unwrap())
        .collect();
    assert_eq!(values, (0..=10).rev().collect::<Vec<_>>());
    reopened.stop().unwrap();
}

#[test]
fn test_custom_properties_persist() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .custom_property("owner", "tests")
        .custom_property("schema", "3")
        .build();
    let universe = Universe::file_backed(config).unwrap();
    universe.start().unwrap();
    assert_eq!(universe.custom_properties().get("owner").map(String::as_str), Some("tests"));
    universe.stop().unwrap();

    // Properties come from the file header, not from the new config
    let reopened = open(temp_dir.path());
    let properties = reopened.custom_properties();
    assert_eq!(properties.get("owner").map(String::as_str), Some("tests"));
    assert_eq!(properties.get("schema").map(String::as_str), Some("3"));
    reopened.stop().unwrap();
}

// =============================================================================
// Hosted Value Tests
// =============================================================================

#[test]
fn test_large_bytes_are_hosted_and_hydrated() {
    let (temp_dir, universe) = setup_temp_universe();
    let big: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let small = vec![9u8; 20];

    let mut exp = universe.begin().unwrap();
    let id = exp
        .create_atom()
        .build_junction(VALUE, big.clone())
        .unwrap()
        .build_junction(2, small.clone())
        .unwrap()
        .id();
    assert!(exp.commit().is_successful());

    let atom = universe.get_atom(id).unwrap();
    assert_eq!(atom.get(VALUE).unwrap().shape(), Shape::Hosted);
    assert_eq!(atom.get_bytes(VALUE).unwrap().as_ref(), big.as_slice());
    assert_ne!(atom.get(2).unwrap().shape(), Shape::Hosted);
    universe.stop().unwrap();

    let reopened = open(temp_dir.path());
    let atom = reopened.get_atom(id).unwrap();
    assert_eq!(atom.get(VALUE).unwrap().shape(), Shape::Hosted);
    assert_eq!(atom.get_bytes(VALUE).unwrap().as_ref(), big.as_slice());
    assert_eq!(atom.get_bytes(2).unwrap().as_ref(), small.as_slice());
    reopened.stop().unwrap();
}

#[test]
fn test_in_memory_never_hosts() {
    let universe = Universe::in_memory();
    let big = vec![1u8; 4096];

    let mut exp = universe.begin().unwrap();
    let id = exp.create_atom().build_junction(VALUE, big.clone()).unwrap().id();
    assert!(exp.commit().is_successful());

    let atom = universe.get_atom(id).unwrap();
    assert_ne!(atom.get(VALUE).unwrap().shape(), Shape::Hosted);
    assert_eq!(atom.get_bytes(VALUE).unwrap().as_ref(), big.as_slice());
}

// =============================================================================
// Index Replay Tests
// =============================================================================

#[test]
fn test_indexes_are_rebuilt_by_replay() {
    let (temp_dir, universe) = setup_temp_universe();
    universe.create_index(IndexInfo::field("by-value", VALUE)).unwrap();

    let mut exp = universe.begin().unwrap();
    for value in ["m", "z", "a"] {
        exp.create_atom().build_junction(VALUE, value).unwrap();
    }
    assert!(exp.commit().is_successful());
    universe.stop().unwrap();

    // Indexes are declared before start and filled while replaying
    let reopened = Universe::file_backed(config_for(temp_dir.path())).unwrap();
    let index = reopened.create_index(IndexInfo::field("by-value", VALUE)).unwrap();
    reopened.start().unwrap();

    let values: Vec<String> = index
        .all()
        .map(|a| a.get_string(VALUE).unwrap().to_string())
        .collect();
    assert_eq!(values, vec!["a", "m", "z"]);
    assert_eq!(reopened.global_index().len(), 3);
    reopened.stop().unwrap();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_begin_requires_started_universe() {
    let temp_dir = TempDir::new().unwrap();
    let universe = Universe::file_backed(config_for(temp_dir.path())).unwrap();
    assert!(matches!(universe.begin(), Err(AtomError::IllegalState(_))));

    universe.start().unwrap();
    assert!(universe.begin().is_ok());
    universe.stop().unwrap();

    assert!(matches!(universe.begin(), Err(AtomError::IllegalState(_))));
    assert!(matches!(universe.start(), Err(AtomError::IllegalState(_))));
}

#[test]
fn test_read_only_universe_still_reads() {
    let (_temp_dir, universe) = setup_temp_universe();
    let mut exp = universe.begin().unwrap();
    let id = exp.create_atom().build_junction(VALUE, 5i64).unwrap().id();
    assert!(exp.commit().is_successful());

    universe.set_read_only(true);
    assert!(universe.is_read_only());
    assert!(matches!(universe.begin(), Err(AtomError::IllegalState(_))));
    assert_eq!(universe.get_atom(id).unwrap().get_long(VALUE), Some(5));

    universe.set_read_only(false);
    assert!(universe.begin().is_ok());
    universe.stop().unwrap();
}

#[test]
fn test_read_only_start_leaves_file_untouched() {
    let (temp_dir, universe) = setup_temp_universe();
    let big = vec![7u8; 512];

    let mut exp = universe.begin().unwrap();
    let small_id = exp.create_atom().build_junction(VALUE, 42i64).unwrap().id();
    let big_id = exp.create_atom().build_junction(VALUE, big.clone()).unwrap().id();
    assert!(exp.commit().is_successful());
    let ucn = universe.ucn();
    universe.stop().unwrap();

    let path = temp_dir.path().join(atomstore::log::DATA_FILE_NAME);
    let before = std::fs::read(&path).unwrap();

    let reader = Universe::file_backed(config_for(temp_dir.path())).unwrap();
    reader.start_read_only().unwrap();
    assert!(reader.is_read_only());
    assert_eq!(reader.ucn(), ucn);
    assert_eq!(reader.get_atom(small_id).unwrap().get_long(VALUE), Some(42));
    let hosted = reader.get_atom(big_id).unwrap();
    assert_eq!(hosted.get(VALUE).unwrap().shape(), Shape::Hosted);
    assert_eq!(hosted.get_bytes(VALUE).unwrap().as_ref(), big.as_slice());

    assert!(matches!(reader.begin(), Err(AtomError::IllegalState(_))));
    // Lifting the flag still cannot write through a read-only handle
    reader.set_read_only(false);
    let mut exp = reader.begin().unwrap();
    exp.create_atom().build_junction(VALUE, 1i64).unwrap();
    assert!(matches!(exp.commit().error(), Some(AtomError::IllegalState(_))));
    assert!(!reader.is_failed());
    reader.stop().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_read_only_start_requires_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("missing");

    let universe = Universe::file_backed(config_for(&data_dir)).unwrap();
    assert!(matches!(universe.start_read_only(), Err(AtomError::Io(_))));
    assert!(!data_dir.exists());
    assert!(matches!(universe.begin(), Err(AtomError::IllegalState(_))));
}
