//! Data File Module
//!
//! Durability for file-backed universes through one append-only data file.
//!
//! ## Responsibilities
//! - Append one record per commit before the commit is published
//! - CRC32 checksums and end markers for corruption detection
//! - Replay of every record, in commit order, on start
//! - Lazy hydration of large byte values straight from the file
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header (signature, version, properties) │
//! ├─────────────────────────────────────────┤
//! │ Record 1                                │
//! │ ┌────────┬───────┬───────┬──────┬─────┐ │
//! │ │ Marker │  Len  │  CRC  │ Data │ End │ │
//! │ └────────┴───────┴───────┴──────┴─────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2 ...                            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Records are never rewritten. Hosted values are the raw bytes inside a
//! record; particles refer to them by (offset, length).

mod hosted;
mod reader;
mod record;
mod recovery;
mod writer;

pub use hosted::{HostedBytes, HostedFile};
pub use reader::{LogReader, RecordIterator};
pub use record::{
    decode_payload, encode_record, CommitRecord, EncodedRecord, HostedSlot, LogHeader, RecordAtom,
    RecordValue, FORMAT_VERSION, RECORD_END, RECORD_MARKER, SIGNATURE,
};
pub use recovery::{LogRecovery, RecoveryResult, ReplayedCommit};
pub use writer::{LogWriter, PlacedHosted};

/// Name of the data file inside the data directory
pub const DATA_FILE_NAME: &str = "universe.db";
