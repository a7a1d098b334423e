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

//! Declarative subgraph patterns: roles, predicates, and edges.

pub mod codec;

use dotml_core::program::{AttrValue, Operator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// A pure predicate over an operator's public fields. Predicates are a
/// closed, serializable vocabulary rather than closures, so descriptors can
/// be shipped data-driven over the pattern-rewrite schema. Evaluation order
/// is unspecified and a predicate may be re-evaluated after partial
/// rewrites within one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpPredicate {
    /// Matches every operator.
    Any,
    /// Matches operators with exactly this type tag.
    OpType(String),
    /// Matches operators carrying the attribute key, whatever its value.
    HasAttr(String),
    /// Matches operators whose attribute equals the given value.
    AttrEquals { key: String, value: AttrValue },
    AllOf(Vec<OpPredicate>),
    AnyOf(Vec<OpPredicate>),
}

impl OpPredicate {
    pub fn op_type(op_type: impl Into<String>) -> Self {
        OpPredicate::OpType(op_type.into())
    }

    /// Matches any of the given operator types.
    pub fn one_of_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OpPredicate::AnyOf(types.into_iter().map(|t| OpPredicate::OpType(t.into())).collect())
    }

    pub fn matches(&self, op: &Operator) -> bool {
        match self {
            OpPredicate::Any => true,
            OpPredicate::OpType(op_type) => op.op_type == *op_type,
            OpPredicate::HasAttr(key) => op.attrs.contains_key(key),
            OpPredicate::AttrEquals { key, value } => op.attr(key) == Some(value),
            OpPredicate::AllOf(preds) => preds.iter().all(|p| p.matches(op)),
            OpPredicate::AnyOf(preds) => preds.iter().any(|p| p.matches(op)),
        }
    }
}

/// A producer-to-consumer data dependency between two roles: some variable
/// produced in the producer's `out_slot` must be consumed in the consumer's
/// `in_slot`. The connecting variable may be bound into the match under a
/// variable role, and the edge may additionally require both operators to
/// sit in the same block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEdge {
    pub producer: String,
    pub out_slot: String,
    pub consumer: String,
    pub in_slot: String,
    pub var_role: Option<String>,
    pub same_block: bool,
}

impl PatternEdge {
    pub fn new(
        producer: impl Into<String>,
        out_slot: impl Into<String>,
        consumer: impl Into<String>,
        in_slot: impl Into<String>,
    ) -> Self {
        Self {
            producer: producer.into(),
            out_slot: out_slot.into(),
            consumer: consumer.into(),
            in_slot: in_slot.into(),
            var_role: None,
            same_block: false,
        }
    }

    /// Bind the connecting variable under the given role in each match.
    pub fn bind_var(mut self, var_role: impl Into<String>) -> Self {
        self.var_role = Some(var_role.into());
        self
    }

    /// Require the producer and consumer to live in the same block.
    pub fn same_block(mut self) -> Self {
        self.same_block = true;
        self
    }
}

/// The pattern itself is malformed; raised by validation before any
/// matching begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedPattern {
    #[error("pattern declares no roles")]
    NoRoles,

    #[error("anchor role '{0}' is not declared")]
    UndeclaredAnchor(String),

    #[error("edge references undeclared role '{0}'")]
    UndeclaredRole(String),

    #[error("role '{0}' is not connected to the anchor")]
    Unreachable(String),

    #[error("pattern edges form a cycle")]
    Cyclic,
}

/// A declarative subgraph shape: role declarations with predicates, edges
/// between roles, and the anchor role matching begins from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDescriptor {
    anchor: String,
    nodes: BTreeMap<String, OpPredicate>,
    edges: Vec<PatternEdge>,
}

impl PatternDescriptor {
    /// Start a descriptor anchored at the given role. The anchor must be
    /// declared as a node before validation.
    pub fn new(anchor: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Declare a role. Re-declaring a role replaces its predicate.
    pub fn with_node(mut self, role: impl Into<String>, predicate: OpPredicate) -> Self {
        self.nodes.insert(role.into(), predicate);
        self
    }

    /// Declare an edge.
    pub fn with_edge(mut self, edge: PatternEdge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    pub fn predicate(&self, role: &str) -> Option<&OpPredicate> {
        self.nodes.get(role)
    }

    /// Declared roles in name order.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn role_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> &[PatternEdge] {
        &self.edges
    }

    /// Check the descriptor is well formed: all edge endpoints and the
    /// anchor declared, every role reachable from the anchor (edges treated
    /// as undirected for reachability), and no directed cycle.
    pub fn validate(&self) -> Result<(), MalformedPattern> {
        if self.nodes.is_empty() {
            return Err(MalformedPattern::NoRoles);
        }
        if !self.nodes.contains_key(&self.anchor) {
            return Err(MalformedPattern::UndeclaredAnchor(self.anchor.clone()));
        }
        for edge in &self.edges {
            for role in [&edge.producer, &edge.consumer] {
                if !self.nodes.contains_key(role) {
                    return Err(MalformedPattern::UndeclaredRole(role.clone()));
                }
            }
        }

        // Reachability from the anchor.
        let mut reached: BTreeSet<&str> = BTreeSet::new();
        reached.insert(&self.anchor);
        let mut grew = true;
        while grew {
            grew = false;
            for edge in &self.edges {
                let p = reached.contains(edge.producer.as_str());
                let c = reached.contains(edge.consumer.as_str());
                if p != c {
                    reached.insert(if p { &edge.consumer } else { &edge.producer });
                    grew = true;
                }
            }
        }
        for role in self.nodes.keys() {
            if !reached.contains(role.as_str()) {
                return Err(MalformedPattern::Unreachable(role.clone()));
            }
        }

        // Directed acyclicity by repeated removal of sink-free roles.
        let mut in_degree: BTreeMap<&str, usize> =
            self.nodes.keys().map(|r| (r.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(d) = in_degree.get_mut(edge.consumer.as_str()) {
                *d += 1;
            }
        }
        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(r, _)| *r)
            .collect();
        let mut removed = 0;
        while let Some(role) = queue.pop() {
            removed += 1;
            for edge in &self.edges {
                if edge.producer == role {
                    if let Some(d) = in_degree.get_mut(edge.consumer.as_str()) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push(&edge.consumer);
                        }
                    }
                }
            }
        }
        if removed != self.nodes.len() {
            return Err(MalformedPattern::Cyclic);
        }
        Ok(())
    }
}
