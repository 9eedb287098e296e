//! Hosted file access
//!
//! One handle on the data file, shared by the commit path (appends) and by
//! every file-hosted particle (lazy reads). A single mutex guards the
//! handle, so commits and hydration serialize only against each other.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::error;

use crate::error::Result;

/// Random-access handle on the data file
pub struct HostedFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl HostedFile {
    /// Open (creating if needed) the data file for reading and appending
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Open an existing data file without write access
    ///
    /// Hosted reads work as usual; `write_at` fails with an I/O error.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Append bytes at `position` and return where they start
    ///
    /// The caller owns the logical end of the file; anything past it (a
    /// torn write from a failed commit) is overwritten.
    pub fn write_at(&self, position: u64, bytes: &[u8]) -> Result<u64> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(position))?;
        file.write_all(bytes)?;
        Ok(position)
    }

    /// Read `len` bytes starting at `offset`
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf).map_err(|e| {
            error!(path = %self.path.display(), offset, len, error = %e, "Hosted read failed");
            e
        })?;
        Ok(Bytes::from(buf))
    }

    /// Flush OS buffers to disk
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}

impl std::fmt::Debug for HostedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedFile").field("path", &self.path).finish()
    }
}

/// Byte content that stays in the data file until read
#[derive(Clone)]
pub struct HostedBytes {
    file: Arc<HostedFile>,
    offset: u64,
    len: u32,
}

impl HostedBytes {
    pub fn new(file: Arc<HostedFile>, offset: u64, len: u32) -> Self {
        Self { file, offset, len }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hydrate the content; every call goes to the file
    pub fn read(&self) -> Result<Bytes> {
        self.file.read_at(self.offset, self.len as usize)
    }
}

impl std::fmt::Debug for HostedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedBytes")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}
