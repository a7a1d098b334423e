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

//! Pass interface and the sequential pipeline driving an ordered list of
//! passes through the engine.

mod fusion;

pub use fusion::FuseActivation;

use crate::engine::{self, IterationPolicy, Match, PassError, PassReport};
use crate::pattern::PatternDescriptor;
use dotml_core::program::{Program, ProgramError};
use tracing::debug;

/// One optimization pass: a pattern, a rewrite, and an iteration policy.
pub trait Pass {
    /// Unique name of the pass.
    fn name(&self) -> &str;
    /// Short description of the pass.
    fn description(&self) -> &str;
    /// The subgraph shape this pass rewrites.
    fn pattern(&self) -> PatternDescriptor;
    /// Sweep policy; single sweep unless the pass says otherwise.
    fn policy(&self) -> IterationPolicy {
        IterationPolicy::SingleSweep
    }
    /// Replace one matched subgraph. Must leave the program internally
    /// consistent on return.
    fn rewrite(&mut self, program: &mut Program, m: &Match) -> Result<(), ProgramError>;
}

/// Sequential pipeline running registered passes in order.
pub struct PassPipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Register a pass at the end of the pipeline.
    pub fn add_pass<P>(&mut self, pass: P)
    where
        P: Pass + 'static,
    {
        self.passes.push(Box::new(pass));
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Run every pass in registration order, returning one report per pass.
    /// A failing pass aborts the pipeline; the program keeps the mutations
    /// applied so far.
    pub fn run(&mut self, program: &mut Program) -> Result<Vec<(String, PassReport)>, PassError> {
        let mut reports = Vec::with_capacity(self.passes.len());
        for pass in &mut self.passes {
            let pattern = pass.pattern();
            let policy = pass.policy();
            let name = pass.name().to_string();
            debug!(pass = %name, "running pass");
            let report = engine::run(program, &pattern, |p, m| pass.rewrite(p, m), policy)?;
            debug!(
                pass = %name,
                sweeps = report.sweeps,
                applied = report.matches_applied,
                "pass finished"
            );
            reports.push((name, report));
        }
        Ok(reports)
    }
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::new()
    }
}
