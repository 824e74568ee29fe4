//! The shared front file and the optimistic update protocol around it.
//!
//! A submission reads the front under the lock, merges without holding it,
//! then re-takes the lock and commits only if the front it merged against is
//! still the one on disk. If another writer got in first, the configured
//! [`ConflictPolicy`] decides how to reconcile.
//!
//! Under [`ConflictPolicy::Reconcile`] the recomputation happens with the lock
//! held. Every write is computed against the front read under that same lock.

use crate::config::{ConflictPolicy, StoreConfig};
use crate::error::{FrontError, Result};
use crate::lock::{FrontLock, LockMode};
use crate::merge::{audit, merge, MergeOutcome, Verdict, Violation};
use crate::oracle::DominanceOracle;
use crate::record::Candidate;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

/// Members of the front as read at one point in time.
#[derive(Debug, Clone, Default)]
pub struct FrontSnapshot {
    pub members: Vec<Candidate>,
    /// Malformed lines skipped while reading.
    pub dropped: usize,
}

impl FrontSnapshot {
    /// Field-for-field comparison of the valid members.
    pub fn same_front(&self, other: &FrontSnapshot) -> bool {
        self.members == other.members
    }

    pub fn digest(&self) -> String {
        front_digest(&self.members)
    }
}

pub fn serialize_front(members: &[Candidate]) -> String {
    let mut out = String::new();
    for m in members {
        out.push_str(m.raw());
        out.push('\n');
    }
    out
}

pub fn front_digest(members: &[Candidate]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serialize_front(members).as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Nothing written: duplicate or dominated.
    NoOp,
    /// Written against the snapshot read first.
    Committed,
    /// Written after recomputing against a newer front.
    Reconciled,
}

impl SubmitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitStatus::NoOp => "no_op",
            SubmitStatus::Committed => "committed",
            SubmitStatus::Reconciled => "reconciled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitReport {
    pub status: SubmitStatus,
    pub verdict: Verdict,
    pub evicted: Vec<Candidate>,
    /// Optimistic compare-and-swap attempts made.
    pub attempts: u32,
    pub front_len: usize,
    pub digest: String,
}

impl SubmitReport {
    pub fn changed(&self) -> bool {
        self.status != SubmitStatus::NoOp
    }

    fn from_outcome(status: SubmitStatus, outcome: MergeOutcome, attempts: u32) -> Self {
        Self {
            status,
            verdict: outcome.verdict,
            attempts,
            front_len: outcome.front.len(),
            digest: front_digest(&outcome.front),
            evicted: outcome.evicted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditReport {
    pub snapshot: FrontSnapshot,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// One shared front file plus its sidecar lock.
pub struct ParetoFrontStore {
    front_path: PathBuf,
    lock_path: PathBuf,
    config: StoreConfig,
    oracle: Box<dyn DominanceOracle + Send + Sync>,
}

impl std::fmt::Debug for ParetoFrontStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParetoFrontStore")
            .field("front_path", &self.front_path)
            .field("lock_path", &self.lock_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ParetoFrontStore {
    pub fn open(front_path: impl Into<PathBuf>, config: StoreConfig) -> Result<Self> {
        let oracle = config.oracle.build();
        Self::with_oracle(front_path, config, oracle)
    }

    pub fn with_oracle(
        front_path: impl Into<PathBuf>,
        config: StoreConfig,
        oracle: Box<dyn DominanceOracle + Send + Sync>,
    ) -> Result<Self> {
        let front_path = front_path.into();
        config
            .validate()
            .map_err(|message| FrontError::Config {
                path: front_path.clone(),
                message,
            })?;
        if let Some(parent) = front_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| FrontError::io(parent, e))?;
        }
        let lock_path = config.lock_path_for(&front_path);
        Ok(Self {
            front_path,
            lock_path,
            config,
            oracle,
        })
    }

    pub fn front_path(&self) -> &Path {
        &self.front_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn parse_candidate(&self, raw: &str) -> Result<Candidate> {
        Candidate::parse(raw, &self.config.layout)
    }

    /// Reads the front under a shared lock, for reporting.
    pub fn snapshot(&self) -> Result<FrontSnapshot> {
        let _lock = self.lock(LockMode::Shared)?;
        self.read_front()
    }

    pub fn audit(&self) -> Result<AuditReport> {
        let snapshot = self.snapshot()?;
        let violations = audit(
            &snapshot.members,
            self.config.track_identity,
            self.oracle.as_ref(),
        )?;
        Ok(AuditReport {
            snapshot,
            violations,
        })
    }

    /// Validates `raw` and submits it. A malformed record is returned as
    /// [`FrontError::InvalidRecord`] and leaves the front untouched.
    pub fn submit_raw(&self, raw: &str) -> Result<SubmitReport> {
        let candidate = self.parse_candidate(raw)?;
        self.submit(&candidate)
    }

    pub fn submit(&self, candidate: &Candidate) -> Result<SubmitReport> {
        let span = info_span!("submit", candidate = %candidate.objectives());
        let _enter = span.enter();
        let old = self.read_initial()?;
        let outcome = self.speculate(&old, candidate)?;
        self.commit(candidate, old, outcome)
    }

    fn lock(&self, mode: LockMode) -> Result<FrontLock> {
        FrontLock::acquire(&self.lock_path, mode, self.config.lock_timeout())
    }

    fn merge_into(&self, front: &[Candidate], candidate: &Candidate) -> Result<MergeOutcome> {
        merge(
            front,
            candidate,
            self.config.track_identity,
            self.oracle.as_ref(),
        )
    }

    /// First locked read. Creates the front file if it does not exist yet.
    pub(crate) fn read_initial(&self) -> Result<FrontSnapshot> {
        let _lock = self.lock(LockMode::Exclusive)?;
        fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.front_path)
            .map_err(|e| FrontError::io(&self.front_path, e))?;
        self.read_front()
    }

    pub(crate) fn speculate(
        &self,
        old: &FrontSnapshot,
        candidate: &Candidate,
    ) -> Result<MergeOutcome> {
        self.merge_into(&old.members, candidate)
    }

    /// Compare-and-swap phase. `old` is the snapshot `outcome` was computed
    /// from.
    pub(crate) fn commit(
        &self,
        candidate: &Candidate,
        mut old: FrontSnapshot,
        mut outcome: MergeOutcome,
    ) -> Result<SubmitReport> {
        let mut retries_left = match self.config.conflict_policy {
            ConflictPolicy::Reconcile => Some(0),
            ConflictPolicy::Retry { max_retries } => Some(max_retries),
            ConflictPolicy::Converge => None,
        };
        let mut attempts = 1;

        loop {
            if !outcome.changed() {
                debug!(verdict = outcome.verdict.as_str(), "nothing to write");
                return Ok(SubmitReport::from_outcome(
                    SubmitStatus::NoOp,
                    outcome,
                    attempts,
                ));
            }

            let lock = self.lock(LockMode::Exclusive)?;
            let current = self.read_front()?;
            if current.same_front(&old) {
                self.write_front(&outcome.front)?;
                info!(members = outcome.front.len(), attempts, "front committed");
                return Ok(SubmitReport::from_outcome(
                    SubmitStatus::Committed,
                    outcome,
                    attempts,
                ));
            }

            warn!(
                expected = %old.digest(),
                found = %current.digest(),
                attempts,
                "front changed by another writer"
            );

            match retries_left.as_mut() {
                Some(0) => {
                    let reconciled = self.merge_into(&current.members, candidate)?;
                    if !reconciled.changed() {
                        return Ok(SubmitReport::from_outcome(
                            SubmitStatus::NoOp,
                            reconciled,
                            attempts,
                        ));
                    }
                    self.write_front(&reconciled.front)?;
                    info!(members = reconciled.front.len(), attempts, "front reconciled");
                    return Ok(SubmitReport::from_outcome(
                        SubmitStatus::Reconciled,
                        reconciled,
                        attempts,
                    ));
                }
                Some(n) => *n -= 1,
                None => {}
            }

            drop(lock);
            attempts += 1;
            outcome = self.merge_into(&current.members, candidate)?;
            old = current;
        }
    }

    /// Caller must hold the lock. A missing file reads as an empty front.
    fn read_front(&self) -> Result<FrontSnapshot> {
        let text = match fs::read_to_string(&self.front_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(FrontError::io(&self.front_path, e)),
        };
        let mut snapshot = FrontSnapshot::default();
        for line in text.lines() {
            match Candidate::parse(line, &self.config.layout) {
                Ok(c) => snapshot.members.push(c),
                Err(err) => {
                    debug!(path = %self.front_path.display(), %err, "dropping malformed front line");
                    snapshot.dropped += 1;
                }
            }
        }
        Ok(snapshot)
    }

    /// Caller must hold the exclusive lock.
    fn write_front(&self, members: &[Candidate]) -> Result<()> {
        atomic_write_bytes(&self.front_path, serialize_front(members).as_bytes())
    }
}

fn temp_prefix(target: &Path) -> String {
    let name = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("front");
    format!(".{}.tmp.", name)
}

fn parent_dir(target: &Path) -> &Path {
    target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Removes temp files left by a writer that died before its rename. Only
/// sound while holding the exclusive lock, since a live writer's temp file
/// exists only under that lock.
fn sweep_stale_temp_files(target: &Path) {
    let prefix = temp_prefix(target);
    let Ok(entries) = fs::read_dir(parent_dir(target)) else {
        return;
    };
    for entry in entries.flatten() {
        let stale = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(&prefix));
        if stale {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(path = %entry.path().display(), "removed stale temp file"),
                Err(err) => {
                    debug!(path = %entry.path().display(), %err, "could not remove stale temp file")
                }
            }
        }
    }
}

/// Replaces the file at `path` with `bytes`. A symlinked front is rewritten
/// at its resolved target, keeping the link and the target's permissions.
fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(FrontError::io(path, e)),
    };
    let permissions = fs::metadata(&target).ok().map(|m| m.permissions());
    sweep_stale_temp_files(&target);

    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let tmp = target.with_file_name(format!("{}{}.{}", temp_prefix(&target), pid, ts));
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        if let Some(permissions) = &permissions {
            file.set_permissions(permissions.clone())?;
        }
        file.sync_all()?;
        fs::rename(&tmp, &target)
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(FrontError::io(path, e));
    }
    if let Ok(dir) = fs::File::open(parent_dir(&target)) {
        let _ = dir.sync_all();
    }
    Ok(())
}
