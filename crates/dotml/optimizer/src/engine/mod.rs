// DotML
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The pass engine: apply one pattern-plus-rewrite to a program.
//!
//! A `run` moves through `Scanning -> MatchesCollected -> Rewriting ->
//! Validating` per sweep, finishing as `Converged`, `NextSweep`, or
//! `Failed`. Matching and rewriting are strictly single-threaded and
//! synchronous per program instance; determinism of the scan/rewrite order
//! is part of the contract.

mod matcher;

use crate::pattern::{MalformedPattern, PatternDescriptor};
use dotml_core::program::{BlockId, Program, ProgramError};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace};

/// Position of a concrete operator: its block and its index in that block's
/// sequence. Positions are only meaningful until the next structural
/// mutation; queued matches are re-validated before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpRef {
    pub block: BlockId,
    pub index: usize,
}

/// A concrete binding of pattern roles to operators and variable roles to
/// variable names. Transient: produced during a sweep, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    pub ops: BTreeMap<String, OpRef>,
    pub vars: BTreeMap<String, String>,
}

impl Match {
    pub fn op(&self, role: &str) -> Option<OpRef> {
        self.ops.get(role).copied()
    }

    pub fn var(&self, role: &str) -> Option<&str> {
        self.vars.get(role).map(String::as_str)
    }
}

/// How many sweeps a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationPolicy {
    /// Exactly one scan-and-rewrite cycle.
    SingleSweep,
    /// Sweep until a sweep finds zero matches, or fail after `max_sweeps`.
    FixedPoint { max_sweeps: usize },
}

/// Errors fatal to one `run` invocation. The engine never rolls back: on
/// failure the program is handed back as mutated. Callers needing atomicity
/// snapshot via the codec before running.
#[derive(Error, Debug)]
pub enum PassError {
    #[error("malformed pattern: {0}")]
    MalformedPattern(#[from] MalformedPattern),

    #[error("pass did not converge within {max_sweeps} sweeps")]
    PassDidNotConverge { max_sweeps: usize },

    /// A rewrite left the program structurally inconsistent; caught by the
    /// post-sweep validation walk and never retried.
    #[error("post-rewrite invariant violation: {0}")]
    PostRewriteInvariantViolation(ProgramError),

    #[error("rewrite callback failed: {0}")]
    RewriteFailed(ProgramError),
}

/// Outcome bookkeeping for one `run`, including the applied-match trace in
/// application order, identical across runs on structurally identical
/// inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub sweeps: usize,
    pub matches_found: usize,
    pub matches_applied: usize,
    /// Matches discarded because an earlier rewrite in the same sweep
    /// invalidated them.
    pub matches_skipped: usize,
    pub trace: Vec<Match>,
}

/// Apply one pass to `program`.
///
/// Per sweep: collect all non-overlapping matches in scan order, then apply
/// rewrites in discovery order, re-validating each queued match immediately
/// before its rewrite and skipping any the preceding rewrites invalidated.
/// After every sweep that applied at least one rewrite the whole program is
/// re-validated; a dangling reference is a caller bug surfaced as
/// [`PassError::PostRewriteInvariantViolation`].
///
/// On error the program keeps whatever mutations were applied before the
/// failure; snapshot with `dotml_core::encode` first if atomicity matters.
pub fn run<F>(
    program: &mut Program,
    pattern: &PatternDescriptor,
    mut rewrite: F,
    policy: IterationPolicy,
) -> Result<PassReport, PassError>
where
    F: FnMut(&mut Program, &Match) -> Result<(), ProgramError>,
{
    pattern.validate()?;
    let plan = matcher::plan_roles(pattern);
    let max_sweeps = match policy {
        IterationPolicy::SingleSweep => 1,
        IterationPolicy::FixedPoint { max_sweeps } => max_sweeps,
    };

    let mut report = PassReport::default();
    loop {
        // Scanning.
        let matches = matcher::find_matches(program, pattern, &plan);
        report.sweeps += 1;
        report.matches_found += matches.len();
        debug!(
            sweep = report.sweeps,
            matches = matches.len(),
            "sweep scan complete"
        );
        if matches.is_empty() {
            // Converged.
            return Ok(report);
        }

        // Rewriting.
        let mut applied_this_sweep = 0usize;
        for m in matches {
            if !matcher::still_valid(program, pattern, &m) {
                report.matches_skipped += 1;
                trace!(?m, "queued match invalidated by earlier rewrite; skipped");
                continue;
            }
            rewrite(program, &m).map_err(PassError::RewriteFailed)?;
            trace!(?m, "rewrite applied");
            applied_this_sweep += 1;
            report.matches_applied += 1;
            report.trace.push(m);
        }

        // Validating.
        if applied_this_sweep > 0 {
            program
                .validate()
                .map_err(PassError::PostRewriteInvariantViolation)?;
        }

        match policy {
            IterationPolicy::SingleSweep => return Ok(report),
            IterationPolicy::FixedPoint { .. } => {
                if report.sweeps >= max_sweeps {
                    return Err(PassError::PassDidNotConverge { max_sweeps });
                }
                // NextSweep.
            }
        }
    }
}
