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

//! Graph optimization for DotML programs: declarative subgraph patterns,
//! the deterministic match-and-rewrite engine, and the stock passes built
//! on top of it.
//!
//! A pass is a [`pattern::PatternDescriptor`] plus a rewrite callback plus
//! an [`engine::IterationPolicy`]; [`engine::run`] applies one pass to a
//! program, and [`passes::PassPipeline`] drives an ordered list of them.

pub mod engine;
pub mod passes;
pub mod pattern;

pub use engine::{IterationPolicy, Match, OpRef, PassError, PassReport, run};
pub use passes::{Pass, PassPipeline};
pub use pattern::{MalformedPattern, OpPredicate, PatternDescriptor, PatternEdge};
