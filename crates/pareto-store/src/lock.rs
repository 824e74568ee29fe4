use crate::error::{FrontError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

const RETRY_SLEEP: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Writers and submitters.
    Exclusive,
    /// Readers that only report on the front.
    Shared,
}

/// Advisory lock on the sidecar lock file, held until dropped.
///
/// The OS releases it on process exit too, so a crashed holder never wedges
/// the other writers. The lock file itself is never removed.
#[derive(Debug)]
pub struct FrontLock {
    file: File,
    path: PathBuf,
}

impl FrontLock {
    pub fn acquire(path: &Path, mode: LockMode, timeout: Option<Duration>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FrontError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| FrontError::Lock {
                path: path.to_path_buf(),
                source,
            })?;

        let started = Instant::now();
        match timeout {
            None => lock_blocking(&file, mode).map_err(|source| FrontError::Lock {
                path: path.to_path_buf(),
                source,
            })?,
            Some(limit) => loop {
                match try_lock(&file, mode) {
                    Ok(()) => break,
                    Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                        if started.elapsed() >= limit {
                            return Err(FrontError::LockTimeout {
                                path: path.to_path_buf(),
                                waited: started.elapsed(),
                            });
                        }
                        std::thread::sleep(RETRY_SLEEP);
                    }
                    Err(source) => {
                        return Err(FrontError::Lock {
                            path: path.to_path_buf(),
                            source,
                        })
                    }
                }
            },
        }
        debug!(path = %path.display(), ?mode, waited = ?started.elapsed(), "lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Called through `FileExt` so std's inherent `File` locking methods don't shadow fs2's.
fn lock_blocking(file: &File, mode: LockMode) -> std::io::Result<()> {
    match mode {
        LockMode::Exclusive => FileExt::lock_exclusive(file),
        LockMode::Shared => FileExt::lock_shared(file),
    }
}

fn try_lock(file: &File, mode: LockMode) -> std::io::Result<()> {
    match mode {
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
        LockMode::Shared => FileExt::try_lock_shared(file),
    }
}

impl Drop for FrontLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "lock released");
    }
}
