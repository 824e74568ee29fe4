//! Candidate records and the delimited line format they are stored in.
//!
//! A record looks like `generation;size;error;solution;phenotype;genome;...`.
//! Only the objective slots are interpreted; every other field is carried
//! verbatim and the original line is written back unchanged.

use crate::error::{FrontError, Result};
use serde::Deserialize;
use std::fmt;

/// Which fields of a record hold the objectives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordLayout {
    pub delimiter: char,
    /// First objective slot (inclusive).
    pub objective_start: usize,
    /// End of the objective slots (exclusive). The identity lives here.
    pub objective_end: usize,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            delimiter: ';',
            objective_start: 1,
            objective_end: 3,
        }
    }
}

impl RecordLayout {
    pub fn arity(&self) -> usize {
        self.objective_end.saturating_sub(self.objective_start)
    }

    pub fn identity_slot(&self) -> usize {
        self.objective_end
    }

    pub fn check(&self) -> std::result::Result<(), String> {
        if self.arity() == 0 {
            return Err(format!(
                "objective slots [{}, {}) are empty",
                self.objective_start, self.objective_end
            ));
        }
        if self.delimiter == '\n' || self.delimiter == '\r' {
            return Err("delimiter cannot be a line terminator".to_string());
        }
        Ok(())
    }
}

/// Objective scores, one per axis. Lower is better everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveVector(Vec<f64>);

impl ObjectiveVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the comma separated form used on the comparator boundary.
    pub fn parse_csv(text: &str) -> Result<Self> {
        let mut values = Vec::new();
        for (axis, part) in text.trim().split(',').enumerate() {
            let value = parse_objective(part).map_err(|reason| {
                FrontError::invalid_record(text, format!("axis {}: {}", axis, reason))
            })?;
            values.push(value);
        }
        Ok(Self(values))
    }

    pub fn to_csv(&self) -> String {
        self.0
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ObjectiveVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_csv())
    }
}

fn parse_objective(field: &str) -> std::result::Result<f64, String> {
    let trimmed = field.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| format!("`{}` is not a number", trimmed))?;
    if !value.is_finite() {
        return Err(format!("`{}` is not finite", trimmed));
    }
    Ok(value)
}

/// One evaluated solution, as submitted or as stored in the front file.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    raw: String,
    objectives: ObjectiveVector,
    identity: Option<String>,
    payload_offset: Option<usize>,
}

impl Candidate {
    /// Validates `raw` against `layout`.
    pub fn parse(raw: &str, layout: &RecordLayout) -> Result<Self> {
        // One record is one line of the front file.
        if raw.contains(['\n', '\r']) {
            return Err(FrontError::invalid_record(raw, "contains a line terminator"));
        }
        let fields: Vec<&str> = raw.split(layout.delimiter).collect();
        if fields.len() < 2 {
            return Err(FrontError::invalid_record(
                raw,
                "needs at least two delimited fields",
            ));
        }
        if fields.len() < layout.objective_end {
            return Err(FrontError::invalid_record(
                raw,
                format!(
                    "has {} fields, objective slots need {}",
                    fields.len(),
                    layout.objective_end
                ),
            ));
        }

        let mut values = Vec::with_capacity(layout.arity());
        for slot in layout.objective_start..layout.objective_end {
            let value = parse_objective(fields[slot]).map_err(|reason| {
                FrontError::invalid_record(raw, format!("slot {}: {}", slot, reason))
            })?;
            values.push(value);
        }

        let identity = fields.get(layout.identity_slot()).map(|s| s.to_string());
        let payload_offset = if fields.len() > layout.identity_slot() + 1 {
            let skipped: usize = fields[..=layout.identity_slot()]
                .iter()
                .map(|f| f.len() + layout.delimiter.len_utf8())
                .sum();
            Some(skipped)
        } else {
            None
        };

        Ok(Self {
            raw: raw.to_string(),
            objectives: ObjectiveVector(values),
            identity,
            payload_offset,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn objectives(&self) -> &ObjectiveVector {
        &self.objectives
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Everything after the identity field, untouched.
    pub fn payload(&self) -> Option<&str> {
        self.payload_offset.map(|offset| &self.raw[offset..])
    }

    /// True when `other` would be a vacuous duplicate of `self` in a front.
    pub fn same_entry(&self, other: &Candidate, track_identity: bool) -> bool {
        if self.objectives != other.objectives {
            return false;
        }
        !track_identity || self.identity == other.identity
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
