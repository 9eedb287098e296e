//! Log Reader
//!
//! Sequential reader over the data file, used by replay and the dump tool.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{AtomError, Result};

use super::record::{
    decode_payload, CommitRecord, LogHeader, RECORD_END, RECORD_MARKER, RECORD_PREFIX_SIZE,
};

/// Reads commit records in file order
pub struct LogReader {
    reader: BufReader<File>,
    /// Offset of the next unread byte
    position: u64,
}

impl LogReader {
    /// Open a data file and validate its header
    pub fn open(path: &Path) -> Result<(Self, LogHeader)> {
        let mut reader = BufReader::new(File::open(path)?);
        let (header, header_len) = LogHeader::decode(&mut reader)?;
        Ok((
            Self {
                reader,
                position: header_len,
            },
            header,
        ))
    }

    /// Offset of the next record (the end of the log once exhausted)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record with its starting offset
    ///
    /// Returns `Ok(None)` at a clean end of file. A partial record is
    /// corruption; the log is never repaired in place.
    pub fn next_record(&mut self) -> Result<Option<(u64, CommitRecord)>> {
        let start = self.position;

        let mut prefix = [0u8; RECORD_PREFIX_SIZE as usize];
        if !self.read_or_eof(&mut prefix)? {
            return Ok(None);
        }
        let word = |i: usize| u32::from_le_bytes([prefix[i], prefix[i + 1], prefix[i + 2], prefix[i + 3]]);

        if word(0) != RECORD_MARKER {
            return Err(corrupt(start, format!("bad record marker {:#010x}", word(0))));
        }
        let len = word(4) as usize;
        let crc = word(8);

        let mut payload = vec![0u8; len];
        self.read_exact_at(start, &mut payload)?;
        if crc32fast::hash(&payload) != crc {
            return Err(corrupt(start, "record checksum mismatch"));
        }

        let mut end = [0u8; 4];
        self.read_exact_at(start, &mut end)?;
        if u32::from_le_bytes(end) != RECORD_END {
            return Err(corrupt(start, "missing record end marker"));
        }

        let record = decode_payload(&payload, start + RECORD_PREFIX_SIZE)?;
        Ok(Some((start, record)))
    }

    /// Iterate over the remaining records
    pub fn records(self) -> RecordIterator {
        RecordIterator {
            reader: self,
            done: false,
        }
    }

    /// Fill `buf`, or report a clean end of file if nothing was read
    fn read_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.position += filled as u64;
        match filled {
            0 => Ok(false),
            n if n == buf.len() => Ok(true),
            _ => Err(corrupt(self.position - filled as u64, "truncated record header")),
        }
    }

    fn read_exact_at(&mut self, record_start: u64, buf: &mut [u8]) -> Result<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(corrupt(record_start, "truncated record"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn corrupt(offset: u64, reason: impl Into<String>) -> AtomError {
    AtomError::LogCorruption {
        offset,
        reason: reason.into(),
    }
}

/// Iterator over log records; stops after the first error
pub struct RecordIterator {
    reader: LogReader,
    done: bool,
}

impl RecordIterator {
    /// Offset just past the last record read
    pub fn position(&self) -> u64 {
        self.reader.position()
    }
}

impl Iterator for RecordIterator {
    type Item = Result<(u64, CommitRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
