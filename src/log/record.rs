//! Data file header and commit record codec
//!
//! ## Header
//! ```text
//! ┌───────────────┬─────────────┬──────────┬────────────────┬─────────┐
//! │ Signature (4) │ Version (2) │ Len (4)  │ bincode header │ CRC (4) │
//! └───────────────┴─────────────┴──────────┴────────────────┴─────────┘
//! ```
//!
//! ## Commit record
//! ```text
//! ┌────────────┬─────────┬─────────┬──────────────────────┬─────────┐
//! │ Marker (4) │ Len (4) │ CRC (4) │ Payload (Len bytes)  │ End (4) │
//! └────────────┴─────────┴─────────┴──────────────────────┴─────────┘
//!
//! Payload:
//!   UCN (8)
//!   { 0x80, AtomID (8), Count (4), { Key (8), Value }* }*
//!   0xC0
//!
//! Value:
//!   0x00                       empty
//!   0x01 i64 (8)               long
//!   0x02 Len (4) UTF-8         string
//!   0x03 Len (4) bytes         inline bytes
//!   0x04 Len (4) bytes         hosted bytes, read lazily from the file
//! ```
//!
//! All integers are little-endian.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::atom::Atom;
use crate::error::{AtomError, Result};
use crate::particle::Particle;

/// Data file signature
pub const SIGNATURE: u32 = 0xDA7A_F11E;

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// First word of every commit record
pub const RECORD_MARKER: u32 = 0xFFFF_FFFF;

/// Last word of every commit record
pub const RECORD_END: u32 = 0xAAAA_AAAA;

/// Marker + length + CRC
pub const RECORD_PREFIX_SIZE: u64 = 12;

/// Prefix plus end word
pub const RECORD_OVERHEAD: u64 = RECORD_PREFIX_SIZE + 4;

const ATOM_MARKER: u8 = 0x80;
const NO_MORE_ATOMS: u8 = 0xC0;

const TAG_EMPTY: u8 = 0x00;
const TAG_LONG: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_BYTES: u8 = 0x03;
const TAG_HOSTED: u8 = 0x04;

// =============================================================================
// Header
// =============================================================================

/// Self-description written once at the start of a data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHeader {
    /// Identifies this file across copies
    pub uid: u64,
    /// Creation time (unix millis)
    pub created_millis: u64,
    /// Caller-supplied properties
    pub properties: BTreeMap<String, String>,
}

impl LogHeader {
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let uid = (now.as_nanos() as u64) ^ ((std::process::id() as u64) << 40);
        Self {
            uid,
            created_millis: now.as_millis() as u64,
            properties,
        }
    }

    /// Serialize the framed header
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(body.len() + 14);
        out.extend_from_slice(&SIGNATURE.to_le_bytes());
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        Ok(out)
    }

    /// Read and validate a framed header, returning it with its size
    pub fn decode(reader: &mut impl Read) -> Result<(Self, u64)> {
        let mut prefix = [0u8; 10];
        reader.read_exact(&mut prefix)?;

        let signature = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if signature != SIGNATURE {
            return Err(AtomError::LogCorruption {
                offset: 0,
                reason: format!("bad signature {:#010x}", signature),
            });
        }
        let version = u16::from_le_bytes([prefix[4], prefix[5]]);
        if version != FORMAT_VERSION {
            return Err(AtomError::UnsupportedVersion(version));
        }
        let len = u32::from_le_bytes([prefix[6], prefix[7], prefix[8], prefix[9]]) as usize;

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        let mut crc = [0u8; 4];
        reader.read_exact(&mut crc)?;
        if u32::from_le_bytes(crc) != crc32fast::hash(&body) {
            return Err(AtomError::LogCorruption {
                offset: 10,
                reason: "header checksum mismatch".into(),
            });
        }

        let header: LogHeader = bincode::deserialize(&body)?;
        Ok((header, 14 + len as u64))
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// A byte value written out of line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostedSlot {
    /// Position of the atom in the committed batch
    pub atom: usize,
    pub key: i64,
    /// Offset of the content from the start of the record
    pub offset: u64,
    pub len: u32,
}

/// A framed record ready to append
#[derive(Debug)]
pub struct EncodedRecord {
    pub bytes: Vec<u8>,
    pub hosted: Vec<HostedSlot>,
}

/// Frame one commit
///
/// Byte content longer than `hosted_threshold` is tagged as hosted so that
/// the committed atom can drop its in-memory copy.
pub fn encode_record(ucn: u64, atoms: &[Atom], hosted_threshold: usize) -> Result<EncodedRecord> {
    let mut payload = Vec::with_capacity(64);
    let mut hosted = Vec::new();

    payload.extend_from_slice(&ucn.to_le_bytes());
    for (index, atom) in atoms.iter().enumerate() {
        payload.push(ATOM_MARKER);
        payload.extend_from_slice(&atom.id().0.to_le_bytes());
        payload.extend_from_slice(&(atom.junction_count() as u32).to_le_bytes());

        for (key, particle) in atom.junctions() {
            payload.extend_from_slice(&key.to_le_bytes());
            match particle {
                Particle::Empty => payload.push(TAG_EMPTY),
                Particle::Long(v) => {
                    payload.push(TAG_LONG);
                    payload.extend_from_slice(&v.to_le_bytes());
                }
                Particle::Str(s) => {
                    payload.push(TAG_STRING);
                    payload.extend_from_slice(&(s.len() as u32).to_le_bytes());
                    payload.extend_from_slice(s.as_bytes());
                }
                other => {
                    let raw = other.try_raw()?;
                    let is_hosted = raw.len() > hosted_threshold;
                    payload.push(if is_hosted { TAG_HOSTED } else { TAG_BYTES });
                    payload.extend_from_slice(&(raw.len() as u32).to_le_bytes());
                    if is_hosted {
                        hosted.push(HostedSlot {
                            atom: index,
                            key,
                            offset: RECORD_PREFIX_SIZE + payload.len() as u64,
                            len: raw.len() as u32,
                        });
                    }
                    payload.extend_from_slice(&raw);
                }
            }
        }
    }
    payload.push(NO_MORE_ATOMS);

    let mut bytes = Vec::with_capacity(payload.len() + RECORD_OVERHEAD as usize);
    bytes.extend_from_slice(&RECORD_MARKER.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&RECORD_END.to_le_bytes());

    Ok(EncodedRecord { bytes, hosted })
}

// =============================================================================
// Decoding
// =============================================================================

/// A junction value as stored in a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    Empty,
    Long(i64),
    Str(String),
    Bytes(Vec<u8>),
    /// Absolute file offset and length of out-of-line content
    Hosted { offset: u64, len: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAtom {
    pub id: u64,
    pub junctions: Vec<(i64, RecordValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub ucn: u64,
    pub atoms: Vec<RecordAtom>,
}

/// Decode a record payload read from absolute file offset `base`
pub fn decode_payload(payload: &[u8], base: u64) -> Result<CommitRecord> {
    let mut cursor = PayloadCursor {
        buf: payload,
        pos: 0,
        base,
    };

    let ucn = cursor.u64()?;
    let mut atoms = Vec::new();
    loop {
        match cursor.u8()? {
            NO_MORE_ATOMS => break,
            ATOM_MARKER => {}
            other => return Err(cursor.corrupt(format!("unexpected atom tag {:#04x}", other))),
        }
        let id = cursor.u64()?;
        let count = cursor.u32()? as usize;
        let mut junctions = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = cursor.u64()? as i64;
            let value = match cursor.u8()? {
                TAG_EMPTY => RecordValue::Empty,
                TAG_LONG => RecordValue::Long(cursor.u64()? as i64),
                TAG_STRING => {
                    let len = cursor.u32()? as usize;
                    let bytes = cursor.take(len)?;
                    let s = std::str::from_utf8(bytes)
                        .map_err(|_| cursor.corrupt("invalid UTF-8 in string value"))?;
                    RecordValue::Str(s.to_owned())
                }
                TAG_BYTES => {
                    let len = cursor.u32()? as usize;
                    RecordValue::Bytes(cursor.take(len)?.to_vec())
                }
                TAG_HOSTED => {
                    let len = cursor.u32()?;
                    let offset = cursor.absolute();
                    cursor.take(len as usize)?;
                    RecordValue::Hosted { offset, len }
                }
                other => {
                    return Err(cursor.corrupt(format!("unknown value tag {:#04x}", other)))
                }
            };
            junctions.push((key, value));
        }
        atoms.push(RecordAtom { id, junctions });
    }

    if cursor.pos != payload.len() {
        return Err(cursor.corrupt("trailing bytes after last atom"));
    }
    Ok(CommitRecord { ucn, atoms })
}

struct PayloadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> PayloadCursor<'a> {
    fn absolute(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn corrupt(&self, reason: impl Into<String>) -> AtomError {
        AtomError::LogCorruption {
            offset: self.absolute(),
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let buf = self.buf;
        if buf.len() - self.pos < n {
            return Err(self.corrupt("record payload truncated"));
        }
        let slice = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(word))
    }
}
