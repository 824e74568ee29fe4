//! Single-candidate merge into a non-dominated front.

use crate::error::Result;
use crate::oracle::DominanceOracle;
use crate::record::Candidate;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Already represented by a member with the same objectives.
    Duplicate,
    Dominated,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Duplicate => "duplicate",
            Verdict::Dominated => "dominated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub verdict: Verdict,
    pub front: Vec<Candidate>,
    pub evicted: Vec<Candidate>,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.verdict == Verdict::Accepted
    }

    fn unchanged(verdict: Verdict, front: &[Candidate]) -> Self {
        Self {
            verdict,
            front: front.to_vec(),
            evicted: Vec::new(),
        }
    }
}

/// Merges `candidate` into `front`, which must already be an antichain.
///
/// Survivors keep their relative order and an accepted candidate goes last.
/// Any oracle failure aborts the merge.
pub fn merge<O: DominanceOracle + ?Sized>(
    front: &[Candidate],
    candidate: &Candidate,
    track_identity: bool,
    oracle: &O,
) -> Result<MergeOutcome> {
    if front.is_empty() {
        info!(member = %candidate.objectives(), "new pareto front member");
        return Ok(MergeOutcome {
            verdict: Verdict::Accepted,
            front: vec![candidate.clone()],
            evicted: Vec::new(),
        });
    }

    if front
        .iter()
        .any(|p| p.same_entry(candidate, track_identity))
    {
        return Ok(MergeOutcome::unchanged(Verdict::Duplicate, front));
    }

    for p in front {
        if oracle.dominates(p.objectives(), candidate.objectives())? {
            return Ok(MergeOutcome::unchanged(Verdict::Dominated, front));
        }
    }

    info!(member = %candidate.objectives(), "new pareto front member");
    let mut survivors = Vec::with_capacity(front.len() + 1);
    let mut evicted = Vec::new();
    for p in front {
        if oracle.dominates(candidate.objectives(), p.objectives())? {
            info!(
                member = %p.objectives(),
                by = %candidate.objectives(),
                "member left the pareto front"
            );
            evicted.push(p.clone());
        } else {
            survivors.push(p.clone());
        }
    }
    survivors.push(candidate.clone());

    Ok(MergeOutcome {
        verdict: Verdict::Accepted,
        front: survivors,
        evicted,
    })
}

/// A pair of members that breaks the antichain or duplicate rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Dominates { winner: usize, loser: usize },
    Duplicate { first: usize, second: usize },
}

/// Lists every rule violation in a stored front. Used by audits.
pub fn audit<O: DominanceOracle + ?Sized>(
    front: &[Candidate],
    track_identity: bool,
    oracle: &O,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for (i, a) in front.iter().enumerate() {
        for (j, b) in front.iter().enumerate().skip(i + 1) {
            if a.same_entry(b, track_identity) {
                violations.push(Violation::Duplicate {
                    first: i,
                    second: j,
                });
            } else if oracle.dominates(a.objectives(), b.objectives())? {
                violations.push(Violation::Dominates {
                    winner: i,
                    loser: j,
                });
            } else if oracle.dominates(b.objectives(), a.objectives())? {
                violations.push(Violation::Dominates {
                    winner: j,
                    loser: i,
                });
            }
        }
    }
    Ok(violations)
}
