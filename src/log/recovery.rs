//! Log Replay
//!
//! Rebuilds committed atoms from the data file in commit order.

use std::sync::Arc;

use bytes::Bytes;

use crate::atom::{Atom, AtomId};
use crate::error::{AtomError, Result};
use crate::particle::Particle;

use super::hosted::{HostedBytes, HostedFile};
use super::reader::LogReader;
use super::record::{CommitRecord, RecordValue};

/// Result of a replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of commit records applied
    pub commits_recovered: u64,

    /// Number of atoms rebuilt
    pub atoms_recovered: u64,

    /// UCN of the last record, if any
    pub last_ucn: Option<u64>,

    /// Highest AtomID seen, if any
    pub max_atom_id: Option<u64>,

    /// Offset just past the last record
    pub end_offset: u64,
}

/// One replayed commit, atoms still unfrozen
#[derive(Debug)]
pub struct ReplayedCommit {
    /// Offset of the record in the data file
    pub offset: u64,
    pub ucn: u64,
    pub atoms: Vec<Atom>,
}

/// Replays a data file through a caller-supplied sink
pub struct LogRecovery;

impl LogRecovery {
    /// Replay every record, handing each commit to `apply`
    ///
    /// This will:
    /// 1. Read records in file order
    /// 2. Reject a UCN not above its predecessor's
    /// 3. Rebuild atoms, with hosted values pointing into `hosted`
    /// 4. Stop at the first error; nothing is truncated or repaired
    pub fn replay(
        reader: LogReader,
        hosted: &Arc<HostedFile>,
        mut apply: impl FnMut(ReplayedCommit) -> Result<()>,
    ) -> Result<RecoveryResult> {
        let mut result = RecoveryResult {
            end_offset: reader.position(),
            ..RecoveryResult::default()
        };

        let mut records = reader.records();
        while let Some(next) = records.next() {
            let (offset, record) = next?;
            if let Some(last) = result.last_ucn {
                if record.ucn <= last {
                    return Err(AtomError::LogCorruption {
                        offset,
                        reason: format!("UCN {} follows UCN {}", record.ucn, last),
                    });
                }
            }

            result.commits_recovered += 1;
            result.atoms_recovered += record.atoms.len() as u64;
            result.last_ucn = Some(record.ucn);
            if let Some(max) = record.atoms.iter().map(|a| a.id).max() {
                result.max_atom_id = Some(result.max_atom_id.map_or(max, |m| m.max(max)));
            }

            apply(rebuild(offset, record, hosted)?)?;
            result.end_offset = records.position();
        }

        Ok(result)
    }
}

fn rebuild(offset: u64, record: CommitRecord, hosted: &Arc<HostedFile>) -> Result<ReplayedCommit> {
    let mut atoms = Vec::with_capacity(record.atoms.len());
    for stored in record.atoms {
        let mut atom = Atom::new(AtomId(stored.id));
        for (key, value) in stored.junctions {
            let particle = match value {
                RecordValue::Empty => Particle::Empty,
                RecordValue::Long(v) => Particle::Long(v),
                RecordValue::Str(s) => Particle::from(s),
                RecordValue::Bytes(b) => Particle::Bytes(Bytes::from(b)),
                RecordValue::Hosted { offset, len } => {
                    Particle::Hosted(HostedBytes::new(hosted.clone(), offset, len))
                }
            };
            atom.build_junction(key, particle)?;
        }
        atoms.push(atom);
    }
    Ok(ReplayedCommit {
        offset,
        ucn: record.ucn,
        atoms,
    })
}
