//! Pareto dominance under minimization.

use crate::error::OracleError;
use crate::record::ObjectiveVector;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Decides whether one objective vector dominates another.
///
/// Implementations must behave as a pure function: the same inputs always give
/// the same verdict, and any failure to reach a verdict is an error rather
/// than a guess.
pub trait DominanceOracle {
    fn dominates(&self, a: &ObjectiveVector, b: &ObjectiveVector) -> Result<bool, OracleError>;
}

impl<T: DominanceOracle + ?Sized> DominanceOracle for &T {
    fn dominates(&self, a: &ObjectiveVector, b: &ObjectiveVector) -> Result<bool, OracleError> {
        (**self).dominates(a, b)
    }
}

fn check_comparable(a: &ObjectiveVector, b: &ObjectiveVector) -> Result<(), OracleError> {
    if a.len() != b.len() {
        return Err(OracleError::ArityMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(OracleError::Empty);
    }
    for v in [a, b] {
        if let Some((axis, value)) = v
            .as_slice()
            .iter()
            .enumerate()
            .find(|(_, x)| !x.is_finite())
        {
            return Err(OracleError::NonFinite {
                axis,
                value: *value,
            });
        }
    }
    Ok(())
}

/// `a` dominates `b` iff it is no worse on every axis and better on one.
pub fn dominates(a: &ObjectiveVector, b: &ObjectiveVector) -> Result<bool, OracleError> {
    check_comparable(a, b)?;
    let mut strictly_better = false;
    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        if x > y {
            return Ok(false);
        }
        if x < y {
            strictly_better = true;
        }
    }
    Ok(strictly_better)
}

/// In-process comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParetoOracle;

impl DominanceOracle for ParetoOracle {
    fn dominates(&self, a: &ObjectiveVector, b: &ObjectiveVector) -> Result<bool, OracleError> {
        dominates(a, b)
    }
}

/// Out-of-process comparator, spawned once per comparison.
///
/// Invoked as `<command..> -t less -a dominates <a>` with `<b>` on stdin, both
/// comma separated. Exit 0 means `a` dominates `b`, exit 1 means it does not.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    command: Vec<String>,
}

impl CommandOracle {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn program(&self) -> String {
        self.command.first().cloned().unwrap_or_default()
    }
}

impl DominanceOracle for CommandOracle {
    fn dominates(&self, a: &ObjectiveVector, b: &ObjectiveVector) -> Result<bool, OracleError> {
        check_comparable(a, b)?;
        let program = self.program();
        let spawn_err = |source| OracleError::Spawn {
            program: program.clone(),
            source,
        };
        let (first, rest) = self.command.split_first().ok_or_else(|| {
            spawn_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty comparator command",
            ))
        })?;

        let mut child = Command::new(first)
            .args(rest)
            .args(["-t", "less", "-a", "dominates"])
            .arg(a.to_csv())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            // A comparator may answer without draining stdin.
            match writeln!(stdin, "{}", b.to_csv()) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(spawn_err(e)),
                _ => {}
            }
        }
        let output = child.wait_with_output().map_err(spawn_err)?;
        debug!(program = %program, a = %a, b = %b, status = ?output.status, "comparator finished");

        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            other => Err(OracleError::NoVerdict {
                program,
                status: other
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}
