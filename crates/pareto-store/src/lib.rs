//! Shared, file-backed Pareto front that many processes update concurrently.
//!
//! Each record carries a vector of objectives (lower is better). A submission
//! is admitted when nothing on the front dominates it, and it evicts every
//! member it dominates. Writers coordinate through an advisory lock on a
//! sidecar file plus an optimistic compare step, see [`store`].

pub mod config;
pub mod error;
pub mod lock;
pub mod merge;
pub mod oracle;
pub mod record;
pub mod store;

pub use config::{ConflictPolicy, OracleConfig, StoreConfig};
pub use error::{FrontError, OracleError, Result};
pub use lock::{FrontLock, LockMode};
pub use merge::{audit, merge, MergeOutcome, Verdict, Violation};
pub use oracle::{dominates, CommandOracle, DominanceOracle, ParetoOracle};
pub use record::{Candidate, ObjectiveVector, RecordLayout};
pub use store::{
    front_digest, serialize_front, AuditReport, FrontSnapshot, ParetoFrontStore, SubmitReport,
    SubmitStatus,
};
