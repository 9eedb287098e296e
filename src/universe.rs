//! Universe Module
//!
//! The top-level store that coordinates particles, atoms, indexes and the
//! data file.
//!
//! ## Responsibilities
//! - Hand out expansions and AtomIDs
//! - Run the commit critical section: verify, persist, freeze, publish
//! - Keep the slot table of committed atoms and every index
//! - Replay the data file on start (file-backed variant)

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace};

use crate::atom::{Atom, AtomId};
use crate::config::Config;
use crate::error::{AtomError, Result};
use crate::expansion::{CommitResult, Expansion, RollbackReason, Verifier};
use crate::index::{Index, IndexInfo};
use crate::log::{
    HostedFile, LogHeader, LogReader, LogRecovery, LogWriter, ReplayedCommit, DATA_FILE_NAME,
};
use crate::particle::{Arena, EncoderStats, Particle, ParticleEncoder};

/// UCN handed to the first commit of a fresh universe
pub const START_UCN: u64 = 1;

/// Committed state, swapped in whole by each publication
pub(crate) struct Published {
    /// Next UCN to assign; always above the last commit's
    ucn: u64,
    /// Committed atoms by AtomID; rolled back ids stay empty
    atoms: Vec<Option<Arc<Atom>>>,
    count: usize,
}

impl Published {
    fn slot_taken(&self, id: AtomId) -> bool {
        matches!(self.atoms.get(id.0 as usize), Some(Some(_)))
    }

    fn put(&mut self, atom: Arc<Atom>) {
        let slot = atom.id().0 as usize;
        if self.atoms.len() <= slot {
            self.atoms.resize(slot + 1, None);
        }
        if self.atoms[slot].replace(atom).is_none() {
            self.count += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Lifecycle {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Created,
            1 => Lifecycle::Running,
            _ => Lifecycle::Stopped,
        }
    }
}

struct CommitState {
    writer: Option<LogWriter>,
}

/// State shared by a universe and its expansions
///
/// ## Concurrency Model
///
/// - **Commits**: serialized by `commit_lock`
///   - verify → append to data file → freeze → publish
///   - publication holds `published` for writing, so readers see a commit
///     either whole or not at all
///
/// - **Reads** (`get_atom`, index queries): take `published` for reading
///   - block only while one commit is being published
///
/// - **Particles**: the encoder's caches and arena have their own locks;
///   hosted reads share one file lock with commit appends
///
/// Lock order: `commit_lock` → `published` → `indexes` → index sets.
pub(crate) struct Shared {
    config: Config,
    file_backed: bool,
    encoder: ParticleEncoder,
    next_atom_id: AtomicU64,
    commit_lock: Mutex<CommitState>,
    published: Arc<RwLock<Published>>,
    indexes: RwLock<Vec<Index>>,
    /// Changed only under `commit_lock`
    lifecycle: AtomicU8,
    failed: AtomicBool,
    read_only: AtomicBool,
    properties: RwLock<BTreeMap<String, String>>,
}

impl Shared {
    fn new(config: Config, file_backed: bool) -> Self {
        let arena = Arc::new(Arena::new(config.arena_segment_bits, config.arena_capacity));
        let encoder = ParticleEncoder::new(arena, config.optimizer_enabled);
        let published = Arc::new(RwLock::new(Published {
            ucn: START_UCN,
            atoms: Vec::new(),
            count: 0,
        }));
        let global = Index::new(0, IndexInfo::global(), published.clone(), config.small_tree_limit);
        let lifecycle = if file_backed {
            Lifecycle::Created
        } else {
            Lifecycle::Running
        };
        let properties = if file_backed {
            BTreeMap::new()
        } else {
            config.custom_properties.clone()
        };

        Self {
            config,
            file_backed,
            encoder,
            next_atom_id: AtomicU64::new(0),
            commit_lock: Mutex::new(CommitState { writer: None }),
            published,
            indexes: RwLock::new(vec![global]),
            lifecycle: AtomicU8::new(lifecycle as u8),
            failed: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            properties: RwLock::new(properties),
        }
    }

    pub(crate) fn allocate_atom_id(&self) -> AtomId {
        AtomId(self.next_atom_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn ucn(&self) -> u64 {
        self.published.read().ucn
    }

    fn check_failed(&self) -> Result<()> {
        if self.failed.load(Ordering::Acquire) {
            return Err(AtomError::UniverseFailed);
        }
        Ok(())
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::Release);
    }

    fn check_running(&self) -> Result<()> {
        match self.lifecycle() {
            Lifecycle::Running => Ok(()),
            Lifecycle::Created => Err(AtomError::IllegalState("universe is not started".into())),
            Lifecycle::Stopped => Err(AtomError::IllegalState("universe is stopped".into())),
        }
    }

    /// Mark the universe unusable after a fatal error
    fn fail(&self, err: &AtomError) {
        if err.is_fatal() && !self.failed.swap(true, Ordering::AcqRel) {
            error!(error = %err, "Universe failed");
        }
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commit a batch of ethereal atoms as one indivisible step
    ///
    /// 1. Run verifiers over the final junction data
    /// 2. Optimize particles (large byte values are left for the file)
    /// 3. Append the record to the data file and swap in hosted handles
    /// 4. Freeze every atom with the UCN
    /// 5. Publish into the slot table and every accepting index
    pub(crate) fn commit(&self, mut atoms: Vec<Atom>, verifiers: Vec<Verifier>) -> CommitResult {
        if let Err(e) = self.check_failed() {
            return CommitResult::RolledBack(RollbackReason::Failure(e));
        }

        let mut state = self.commit_lock.lock();
        if let Err(e) = self.check_failed().and_then(|_| self.check_running()) {
            return CommitResult::RolledBack(RollbackReason::Failure(e));
        }

        for verifier in verifiers {
            if let Err(e) = verifier(atoms.as_slice()) {
                debug!(reason = %e.reason, atoms = atoms.len(), "Expansion rejected by verifier");
                return CommitResult::RolledBack(RollbackReason::Verification(e));
            }
        }
        if let Some(atom) = atoms.iter().find(|a| a.is_committed()) {
            return CommitResult::RolledBack(RollbackReason::Failure(AtomError::IllegalState(
                format!("atom {} was frozen before commit", atom.id()),
            )));
        }

        let ucn = self.ucn();
        if let Err(e) = self.persist(&mut state, ucn, &mut atoms) {
            self.fail(&e);
            return CommitResult::RolledBack(RollbackReason::Failure(e));
        }

        let mut frozen = Vec::with_capacity(atoms.len());
        for mut atom in atoms {
            // Checked above; cannot fail
            if let Err(e) = atom.build_finished(ucn) {
                return CommitResult::RolledBack(RollbackReason::Failure(e));
            }
            frozen.push(Arc::new(atom));
        }

        let count = frozen.len();
        self.publish(ucn, frozen);
        trace!(ucn, atoms = count, "Expansion committed");
        CommitResult::Committed { ucn }
    }

    fn persist(&self, state: &mut CommitState, ucn: u64, atoms: &mut [Atom]) -> Result<()> {
        if self.file_backed && state.writer.is_none() {
            return Err(AtomError::IllegalState("data file is open read-only".into()));
        }
        let hosting = state.writer.as_ref().map(|_| self.config.hosted_threshold);
        for atom in atoms.iter_mut() {
            self.optimize_atom(atom, hosting)?;
        }

        if let Some(writer) = state.writer.as_mut() {
            for placed in writer.append(ucn, atoms)? {
                atoms[placed.atom].replace_particle(placed.key, Particle::Hosted(placed.bytes));
            }
        }
        Ok(())
    }

    /// Optimize every particle, leaving byte values above `hosting` as is
    fn optimize_atom(&self, atom: &mut Atom, hosting: Option<usize>) -> Result<()> {
        atom.try_map_particles(|particle| match (particle, hosting) {
            (Particle::Bytes(b), Some(threshold)) if b.len() > threshold => Ok(particle.clone()),
            _ => self.encoder.optimize(particle),
        })
    }

    fn publish(&self, ucn: u64, atoms: Vec<Arc<Atom>>) {
        let mut published = self.published.write();
        for atom in &atoms {
            published.put(atom.clone());
        }
        for index in self.indexes.read().iter() {
            index.publish(&atoms, self.config.bulk_threshold);
        }
        published.ucn = ucn + 1;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the data file, replaying it if it already has content
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Write a header into a new file, or validate an existing one
    /// 3. Replay every record into atoms and indexes
    /// 4. Resume appending after the last record
    ///
    /// With `read_only` the file must already exist; it is opened without
    /// write access, nothing is created, and no writer is kept.
    fn start(&self, read_only: bool) -> Result<()> {
        let mut state = self.commit_lock.lock();
        match self.lifecycle() {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Stopped => {
                return Err(AtomError::IllegalState("a stopped universe cannot restart".into()))
            }
            Lifecycle::Created => {}
        }
        self.check_failed()?;
        let started = Instant::now();

        let path = self.config.data_dir.join(DATA_FILE_NAME);
        let file = if read_only {
            Arc::new(HostedFile::open_read_only(&path)?)
        } else {
            // Step 1: Create data directory if it doesn't exist
            fs::create_dir_all(&self.config.data_dir)?;
            Arc::new(HostedFile::open(&path)?)
        };

        let writer = if !read_only && file.is_empty()? {
            // Step 2: Fresh file
            let header = LogHeader::new(self.config.custom_properties.clone());
            let writer = LogWriter::create(
                file,
                &header,
                self.config.sync_strategy,
                self.config.hosted_threshold,
            )?;
            *self.properties.write() = header.properties;
            info!(path = %path.display(), uid = header.uid, "Created data file");
            writer
        } else {
            // Step 3: Replay
            let (reader, header) = LogReader::open(&path)?;
            let indexes = self.indexes.read().clone();
            for index in &indexes {
                index.start_adding(0);
            }
            let replayed = LogRecovery::replay(reader, &file, |commit| self.apply_replayed(commit));
            for index in &indexes {
                index.stop_adding();
            }
            let result = replayed.map_err(|e| {
                self.fail(&e);
                e
            })?;

            if let Some(max) = result.max_atom_id {
                self.next_atom_id.fetch_max(max + 1, Ordering::AcqRel);
            }
            *self.properties.write() = header.properties;
            info!(
                path = %path.display(),
                commits = result.commits_recovered,
                atoms = result.atoms_recovered,
                ucn = self.ucn(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                read_only,
                "Data file replayed"
            );

            if read_only {
                self.read_only.store(true, Ordering::Release);
                self.set_lifecycle(Lifecycle::Running);
                return Ok(());
            }

            // Step 4: Resume after the last record
            LogWriter::resume(
                file,
                result.end_offset,
                self.config.sync_strategy,
                self.config.hosted_threshold,
            )
        };

        state.writer = Some(writer);
        self.set_lifecycle(Lifecycle::Running);
        Ok(())
    }

    fn apply_replayed(&self, commit: ReplayedCommit) -> Result<()> {
        let ReplayedCommit { offset, ucn, atoms } = commit;
        let mut frozen = Vec::with_capacity(atoms.len());
        {
            let published = self.published.read();
            if ucn < published.ucn {
                return Err(AtomError::LogCorruption {
                    offset,
                    reason: format!("UCN {} is below the next UCN {}", ucn, published.ucn),
                });
            }
            let mut seen = HashSet::with_capacity(atoms.len());
            for atom in &atoms {
                if !seen.insert(atom.id()) {
                    return Err(AtomError::LogCorruption {
                        offset,
                        reason: format!("atom slot {} appears twice in one record", atom.id()),
                    });
                }
                if published.slot_taken(atom.id()) {
                    return Err(AtomError::LogCorruption {
                        offset,
                        reason: format!("atom slot {} is already taken", atom.id()),
                    });
                }
            }
        }

        for mut atom in atoms {
            self.optimize_atom(&mut atom, None)?;
            atom.build_finished(ucn)?;
            frozen.push(Arc::new(atom));
        }
        self.publish(ucn, frozen);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.commit_lock.lock();
        if self.lifecycle() == Lifecycle::Stopped {
            return Ok(());
        }
        let result = match state.writer.take() {
            Some(mut writer) => writer.sync(),
            None => Ok(()),
        };
        self.set_lifecycle(Lifecycle::Stopped);
        info!(ucn = self.ucn(), atoms = self.published.read().count, "Universe stopped");
        result
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    fn create_index(&self, info: IndexInfo) -> Result<Index> {
        self.check_failed()?;
        let _state = self.commit_lock.lock();
        let published = self.published.write();
        let mut indexes = self.indexes.write();

        if indexes.iter().any(|i| i.name() == info.name()) {
            return Err(AtomError::IllegalState(format!(
                "index {} already exists",
                info.name()
            )));
        }

        let index = Index::new(
            indexes.len() as u32,
            info,
            self.published.clone(),
            self.config.small_tree_limit,
        );
        let existing: Vec<Arc<Atom>> = published.atoms.iter().flatten().cloned().collect();
        if !existing.is_empty() {
            index.start_adding(existing.len());
            index.publish(&existing, self.config.bulk_threshold);
            index.stop_adding();
        }
        debug!(id = index.id(), name = index.name(), members = existing.len(), "Index created");
        indexes.push(index.clone());
        Ok(index)
    }
}

/// Top-level atom store
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Universe {
    shared: Arc<Shared>,
}

impl Universe {
    /// Create a running in-memory universe with default settings
    pub fn in_memory() -> Self {
        Self {
            shared: Arc::new(Shared::new(Config::default(), false)),
        }
    }

    /// Create a running in-memory universe
    pub fn in_memory_with(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config, false)),
        })
    }

    /// Create a file-backed universe over `config.data_dir`
    ///
    /// Indexes may be created before `start()`; they are filled by replay.
    pub fn file_backed(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config, true)),
        })
    }

    /// Replay the data file and accept commits
    pub fn start(&self) -> Result<()> {
        if !self.shared.file_backed {
            return Ok(());
        }
        self.shared.start(false)
    }

    /// Replay an existing data file for reading only
    ///
    /// The file is opened without write access and never created. The
    /// universe stays read-only: `begin` is refused, and a commit fails
    /// even after `set_read_only(false)`.
    pub fn start_read_only(&self) -> Result<()> {
        if !self.shared.file_backed {
            return Err(AtomError::IllegalState(
                "an in-memory universe has no data file".into(),
            ));
        }
        self.shared.start(true)
    }

    /// Flush and close the data file; commits are refused afterwards
    pub fn stop(&self) -> Result<()> {
        self.shared.stop()
    }

    pub fn is_file_backed(&self) -> bool {
        self.shared.file_backed
    }

    /// Whether a fatal error made this universe unusable
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    pub fn is_read_only(&self) -> bool {
        self.shared.read_only.load(Ordering::Acquire)
    }

    /// Refuse new expansions while set
    pub fn set_read_only(&self, read_only: bool) {
        self.shared.read_only.store(read_only, Ordering::Release);
    }

    /// Open an expansion bound to the current UCN
    ///
    /// Its commit takes the commit lock, so a verifier must not commit one.
    pub fn begin(&self) -> Result<Expansion> {
        self.shared.check_failed()?;
        self.shared.check_running()?;
        if self.is_read_only() {
            return Err(AtomError::IllegalState("universe is read-only".into()));
        }
        Ok(Expansion::new(self.shared.clone(), self.shared.ucn()))
    }

    /// Next UCN to be assigned; always above the last commit's
    pub fn ucn(&self) -> u64 {
        self.shared.ucn()
    }

    /// A committed atom by id
    pub fn get_atom(&self, id: AtomId) -> Option<Arc<Atom>> {
        self.shared
            .published
            .read()
            .atoms
            .get(id.0 as usize)
            .cloned()
            .flatten()
    }

    /// Number of committed atoms
    pub fn atom_count(&self) -> usize {
        self.shared.published.read().count
    }

    /// Every committed atom, newest first
    pub fn global_index(&self) -> Index {
        // The global index is created with the universe and never removed
        self.shared.indexes.read()[0].clone()
    }

    pub fn index(&self, name: &str) -> Option<Index> {
        self.shared
            .indexes
            .read()
            .iter()
            .find(|i| i.name() == name)
            .cloned()
    }

    /// All indexes in creation order, global first
    pub fn indices(&self) -> Vec<Index> {
        self.shared.indexes.read().clone()
    }

    /// Indexes whose condition accepts `atom`
    pub fn indices_for(&self, atom: &Atom) -> Vec<Index> {
        self.shared
            .indexes
            .read()
            .iter()
            .filter(|i| i.accepts(atom))
            .cloned()
            .collect()
    }

    /// Add an index and fill it with the atoms committed so far
    ///
    /// Takes the commit lock; calling it from a verifier deadlocks.
    pub fn create_index(&self, info: IndexInfo) -> Result<Index> {
        self.shared.create_index(info)
    }

    /// Header properties of the data file (or of the config, in memory)
    pub fn custom_properties(&self) -> BTreeMap<String, String> {
        self.shared.properties.read().clone()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn encoder_stats(&self) -> EncoderStats {
        self.shared.encoder.stats()
    }

    /// One line of sorted-set statistics per index
    pub fn index_stats(&self) -> String {
        let mut out = String::new();
        for index in self.shared.indexes.read().iter() {
            let _ = writeln!(out, "{}: {}", index.name(), index.stats());
        }
        out
    }
}

impl std::fmt::Debug for Universe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Universe")
            .field("file_backed", &self.shared.file_backed)
            .field("ucn", &self.ucn())
            .field("atoms", &self.atom_count())
            .field("failed", &self.is_failed())
            .finish()
    }
}
