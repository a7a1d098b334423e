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

//! Producer/activation fusion: collapse an elementwise operator feeding an
//! activation into a single fused operator, e.g. `add` + `relu` into
//! `add_relu`.

use crate::engine::{IterationPolicy, Match};
use crate::passes::Pass;
use crate::pattern::{OpPredicate, PatternDescriptor, PatternEdge};
use dotml_core::program::{Operator, Program, ProgramError};

const PRODUCER_ROLE: &str = "producer";
const ACTIVATION_ROLE: &str = "activation";
const MID_VAR_ROLE: &str = "mid";

/// Fuse an elementwise producer with the activation consuming its output.
/// The fused operator keeps the producer's inputs, the activation's
/// outputs, and the attributes of both (the activation's winning on a key
/// clash). The intermediate variable is dropped when nothing else
/// references it.
pub struct FuseActivation {
    producers: Vec<String>,
    activations: Vec<String>,
}

impl FuseActivation {
    pub fn new() -> Self {
        Self {
            producers: ["add", "sub", "mul", "matmul"]
                .map(String::from)
                .to_vec(),
            activations: ["relu", "sigmoid", "tanh"].map(String::from).to_vec(),
        }
    }

    pub fn with_producers<I, S>(mut self, producers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.producers = producers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_activations<I, S>(mut self, activations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activations = activations.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for FuseActivation {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for FuseActivation {
    fn name(&self) -> &str {
        "fuse_activation"
    }

    fn description(&self) -> &str {
        "fuse an elementwise producer with its consuming activation"
    }

    fn pattern(&self) -> PatternDescriptor {
        PatternDescriptor::new(PRODUCER_ROLE)
            .with_node(
                PRODUCER_ROLE,
                OpPredicate::one_of_types(self.producers.iter().cloned()),
            )
            .with_node(
                ACTIVATION_ROLE,
                OpPredicate::one_of_types(self.activations.iter().cloned()),
            )
            .with_edge(
                PatternEdge::new(PRODUCER_ROLE, "Out", ACTIVATION_ROLE, "X")
                    .bind_var(MID_VAR_ROLE)
                    .same_block(),
            )
    }

    fn policy(&self) -> IterationPolicy {
        // Applying a fusion shifts the positions of later matches in the
        // block, which are then skipped for that sweep; sweeping to a fixed
        // point picks them up again.
        IterationPolicy::FixedPoint { max_sweeps: 256 }
    }

    fn rewrite(&mut self, program: &mut Program, m: &Match) -> Result<(), ProgramError> {
        let (Some(producer_ref), Some(activation_ref)) =
            (m.op(PRODUCER_ROLE), m.op(ACTIVATION_ROLE))
        else {
            return Ok(());
        };
        // The pattern's same-block edge keeps both operators in one scope.
        let block = producer_ref.block;

        let hi = producer_ref.index.max(activation_ref.index);
        let lo = producer_ref.index.min(activation_ref.index);
        let second = program.remove_operator(block, hi)?;
        let first = program.remove_operator(block, lo)?;
        let (producer, activation) = if producer_ref.index == lo {
            (first, second)
        } else {
            (second, first)
        };

        let mut fused = Operator {
            op_type: format!("{}_{}", producer.op_type, activation.op_type),
            inputs: producer.inputs,
            outputs: activation.outputs,
            attrs: producer.attrs,
        };
        fused.attrs.extend(activation.attrs);
        program.insert_operator(block, lo, fused)?;

        // The intermediate is dead once no surviving operator names it.
        if let Some(mid) = m.var(MID_VAR_ROLE) {
            let owner = program.resolve(block, mid).map(|(owner, _)| owner);
            if let Some(owner) = owner {
                let still_used = program
                    .preorder()
                    .into_iter()
                    .filter_map(|id| program.block(id).ok())
                    .flat_map(|b| b.operators())
                    .any(|op| op.referenced_vars().any(|name| name == mid));
                if !still_used {
                    program.remove_variable(owner, mid)?;
                }
            }
        }
        Ok(())
    }
}
