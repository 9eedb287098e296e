//! Log Writer
//!
//! Appends commit records to the data file through the shared hosted handle.

use std::sync::Arc;

use tracing::trace;

use crate::atom::Atom;
use crate::config::LogSyncStrategy;
use crate::error::Result;

use super::hosted::{HostedBytes, HostedFile};
use super::record::{encode_record, LogHeader};

/// A hosted value placed by an append, ready to swap into its atom
#[derive(Debug, Clone)]
pub struct PlacedHosted {
    /// Position of the atom in the committed batch
    pub atom: usize,
    pub key: i64,
    pub bytes: HostedBytes,
}

/// Writes commit records to the end of the data file
pub struct LogWriter {
    file: Arc<HostedFile>,
    /// Logical end of the file; next record starts here
    position: u64,
    sync_strategy: LogSyncStrategy,
    hosted_threshold: usize,
    unsynced_commits: usize,
}

impl LogWriter {
    /// Write a fresh header into an empty data file
    pub fn create(
        file: Arc<HostedFile>,
        header: &LogHeader,
        sync_strategy: LogSyncStrategy,
        hosted_threshold: usize,
    ) -> Result<Self> {
        let bytes = header.encode()?;
        file.write_at(0, &bytes)?;
        file.sync()?;

        Ok(Self {
            file,
            position: bytes.len() as u64,
            sync_strategy,
            hosted_threshold,
            unsynced_commits: 0,
        })
    }

    /// Resume appending after the last replayed record
    pub fn resume(
        file: Arc<HostedFile>,
        position: u64,
        sync_strategy: LogSyncStrategy,
        hosted_threshold: usize,
    ) -> Self {
        Self {
            file,
            position,
            sync_strategy,
            hosted_threshold,
            unsynced_commits: 0,
        }
    }

    /// Append one commit and return the hosted values it placed
    pub fn append(&mut self, ucn: u64, atoms: &[Atom]) -> Result<Vec<PlacedHosted>> {
        let record = encode_record(ucn, atoms, self.hosted_threshold)?;
        let start = self.file.write_at(self.position, &record.bytes)?;
        self.position = start + record.bytes.len() as u64;

        self.unsynced_commits += 1;
        let due = match self.sync_strategy {
            LogSyncStrategy::EveryCommit => true,
            LogSyncStrategy::EveryNCommits { count } => self.unsynced_commits >= count,
        };
        if due {
            self.sync()?;
        }

        trace!(
            ucn,
            atoms = atoms.len(),
            bytes = record.bytes.len(),
            hosted = record.hosted.len(),
            "Commit record appended"
        );

        Ok(record
            .hosted
            .into_iter()
            .map(|slot| PlacedHosted {
                atom: slot.atom,
                key: slot.key,
                bytes: HostedBytes::new(self.file.clone(), start + slot.offset, slot.len),
            })
            .collect())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()?;
        self.unsynced_commits = 0;
        Ok(())
    }

    /// Offset where the next record will start
    pub fn position(&self) -> u64 {
        self.position
    }
}
