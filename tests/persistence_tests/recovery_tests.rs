use std::fs::{self, OpenOptions};
use std::path::Path;

use atomstore::log::{LogReader, DATA_FILE_NAME};
use atomstore::{AtomError, Universe};

use super::{config_for, setup_temp_universe, VALUE};

// =============================================================================
// Helper Functions
// =============================================================================

/// Commit `count` single-atom expansions and stop
fn write_commits(universe: &Universe, count: i64) {
    for i in 0..count {
        let mut exp = universe.begin().unwrap();
        exp.create_atom().build_junction(VALUE, i).unwrap();
        assert!(exp.commit().is_successful());
    }
    universe.stop().unwrap();
}

fn start_error(dir: &Path) -> (Universe, AtomError) {
    let universe = Universe::file_backed(config_for(dir)).unwrap();
    let err = universe.start().unwrap_err();
    (universe, err)
}

// =============================================================================
// Record Layout Tests
// =============================================================================

#[test]
fn test_reader_sees_one_record_per_commit() {
    let (temp_dir, universe) = setup_temp_universe();
    write_commits(&universe, 5);

    let (reader, _header) = LogReader::open(&temp_dir.path().join(DATA_FILE_NAME)).unwrap();
    let records: Vec<_> = reader.records().map(|r| r.unwrap().1).collect();
    assert_eq!(records.len(), 5);
    for pair in records.windows(2) {
        assert_eq!(pair[1].ucn, pair[0].ucn + 1);
    }
    assert!(records.iter().all(|r| r.atoms.len() == 1));
}

#[test]
fn test_rolled_back_expansions_are_not_written() {
    let (temp_dir, universe) = setup_temp_universe();

    let mut exp = universe.begin().unwrap();
    exp.create_atom().build_junction(VALUE, 1i64).unwrap();
    exp.add_verifier(|_| Err(atomstore::VerificationError::new("no")));
    assert!(!exp.commit().is_successful());
    universe.stop().unwrap();

    let (reader, _header) = LogReader::open(&temp_dir.path().join(DATA_FILE_NAME)).unwrap();
    assert_eq!(reader.records().count(), 0);
}

// =============================================================================
// Damage Tests
// =============================================================================

#[test]
fn test_truncated_tail_is_reported() {
    let (temp_dir, universe) = setup_temp_universe();
    write_commits(&universe, 3);

    let path = temp_dir.path().join(DATA_FILE_NAME);
    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let (universe, err) = start_error(temp_dir.path());
    assert!(matches!(err, AtomError::LogCorruption { .. }));
    assert!(universe.is_failed());
    assert!(matches!(universe.begin(), Err(AtomError::UniverseFailed)));

    // Nothing is repaired in place
    assert_eq!(fs::metadata(&path).unwrap().len(), len - 3);
}

#[test]
fn test_flipped_payload_byte_is_reported() {
    let (temp_dir, universe) = setup_temp_universe();
    write_commits(&universe, 2);

    let path = temp_dir.path().join(DATA_FILE_NAME);
    let mut bytes = fs::read(&path).unwrap();
    // The last atom's long value sits just before the end word and 0xC0
    let at = bytes.len() - 6;
    bytes[at] ^= 0x55;
    fs::write(&path, &bytes).unwrap();

    let (_universe, err) = start_error(temp_dir.path());
    assert!(matches!(err, AtomError::LogCorruption { .. }));
}

#[test]
fn test_unknown_version_is_rejected() {
    let (temp_dir, universe) = setup_temp_universe();
    write_commits(&universe, 1);

    let path = temp_dir.path().join(DATA_FILE_NAME);
    let mut bytes = fs::read(&path).unwrap();
    bytes[4..6].copy_from_slice(&7u16.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let (_universe, err) = start_error(temp_dir.path());
    assert!(matches!(err, AtomError::UnsupportedVersion(7)));
}

#[test]
fn test_foreign_file_is_rejected() {
    let (temp_dir, universe) = setup_temp_universe();
    universe.stop().unwrap();

    let path = temp_dir.path().join(DATA_FILE_NAME);
    fs::write(&path, b"definitely not an atom store").unwrap();

    let (_universe, err) = start_error(temp_dir.path());
    assert!(matches!(err, AtomError::LogCorruption { .. }));
}
