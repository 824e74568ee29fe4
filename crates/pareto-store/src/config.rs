use crate::error::{FrontError, Result};
use crate::oracle::{CommandOracle, DominanceOracle, ParetoOracle};
use crate::record::RecordLayout;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a writer does when the front changed under it between its first read
/// and its commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ConflictPolicy {
    /// Recompute once against the newer front while still holding the lock.
    #[default]
    Reconcile,
    /// Release the lock, recompute speculatively and retry the compare step up
    /// to `max_retries` times, then fall back to `Reconcile`.
    Retry { max_retries: u32 },
    /// Retry the optimistic compare step until it succeeds.
    Converge,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Reconcile => "reconcile",
            ConflictPolicy::Retry { .. } => "retry",
            ConflictPolicy::Converge => "converge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OracleConfig {
    #[default]
    Builtin,
    Command { command: Vec<String> },
}

impl OracleConfig {
    pub fn build(&self) -> Box<dyn DominanceOracle + Send + Sync> {
        match self {
            OracleConfig::Builtin => Box::new(ParetoOracle),
            OracleConfig::Command { command } => Box::new(CommandOracle::new(command.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Sidecar lock file. Defaults to `<front file>.lock`.
    pub lock_file: Option<PathBuf>,
    /// Count candidates with equal objectives but different identities as
    /// distinct members.
    pub track_identity: bool,
    /// Give up on the lock after this long. Blocks forever when unset.
    pub lock_timeout_ms: Option<u64>,
    pub conflict_policy: ConflictPolicy,
    pub layout: RecordLayout,
    pub oracle: OracleConfig,
}

impl StoreConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| FrontError::io(path, e))?;
        let config: StoreConfig =
            serde_yaml::from_str(&data).map_err(|e| FrontError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate().map_err(|message| FrontError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.layout.check()?;
        if let OracleConfig::Command { command } = &self.oracle {
            if command.is_empty() {
                return Err("oracle.command must name a program".to_string());
            }
        }
        Ok(())
    }

    pub fn lock_path_for(&self, front_path: &Path) -> PathBuf {
        match &self.lock_file {
            Some(p) => p.clone(),
            None => {
                let mut name = front_path.as_os_str().to_owned();
                name.push(".lock");
                PathBuf::from(name)
            }
        }
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}
