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

//! Deterministic subgraph matching: anchor scan plus explicit iterative
//! backtracking over pattern edges.
//!
//! Determinism contract: operators are scanned in block pre-order then
//! sequence order, candidates for every role are enumerated in that same
//! order, and the first complete consistent binding per anchor wins. Two
//! runs over structurally identical programs therefore produce identical
//! match sequences.

use crate::engine::{Match, OpRef};
use crate::pattern::{PatternDescriptor, PatternEdge};
use dotml_core::program::{Operator, Program};
use std::collections::HashSet;

/// Role binding order and, per role, the pattern edges that become fully
/// bound once that role is bound.
pub(crate) struct RolePlan {
    pub order: Vec<PlannedRole>,
}

pub(crate) struct PlannedRole {
    pub role: String,
    /// Indices into the pattern's edge list checkable at this depth.
    pub constraints: Vec<usize>,
}

/// Order roles breadth-first from the anchor along edges in declaration
/// order. Assumes a validated (connected, acyclic) pattern.
pub(crate) fn plan_roles(pattern: &PatternDescriptor) -> RolePlan {
    let mut order: Vec<String> = vec![pattern.anchor().to_string()];
    let mut grew = true;
    while grew {
        grew = false;
        for edge in pattern.edges() {
            let p = order.iter().any(|r| r == &edge.producer);
            let c = order.iter().any(|r| r == &edge.consumer);
            if p != c {
                order.push(if p {
                    edge.consumer.clone()
                } else {
                    edge.producer.clone()
                });
                grew = true;
            }
        }
    }

    let position = |role: &str| order.iter().position(|r| r == role);
    let order = order
        .iter()
        .enumerate()
        .map(|(depth, role)| {
            let constraints = pattern
                .edges()
                .iter()
                .enumerate()
                .filter(|(_, edge)| {
                    let p = position(&edge.producer).unwrap_or(usize::MAX);
                    let c = position(&edge.consumer).unwrap_or(usize::MAX);
                    p.max(c) == depth
                })
                .map(|(idx, _)| idx)
                .collect();
            PlannedRole {
                role: role.clone(),
                constraints,
            }
        })
        .collect();
    RolePlan { order }
}

/// Every operator position in deterministic scan order.
pub(crate) fn scan_order(program: &Program) -> Vec<OpRef> {
    let mut order = Vec::new();
    for block in program.preorder() {
        if let Ok(b) = program.block(block) {
            for index in 0..b.operator_count() {
                order.push(OpRef { block, index });
            }
        }
    }
    order
}

fn op<'a>(program: &'a Program, r: OpRef) -> Option<&'a Operator> {
    program.block(r.block).ok()?.operator(r.index)
}

/// The variable connecting producer to consumer over this edge, if any:
/// the first name (in producer slot order) present in both slots.
pub(crate) fn edge_binding(
    program: &Program,
    edge: &PatternEdge,
    producer: OpRef,
    consumer: OpRef,
) -> Option<String> {
    if edge.same_block && producer.block != consumer.block {
        return None;
    }
    let outs = op(program, producer)?.output(&edge.out_slot)?;
    let ins = op(program, consumer)?.input(&edge.in_slot)?;
    outs.iter().find(|name| ins.contains(name)).cloned()
}

/// One full scan: every anchor position tried in order, each accepted
/// match claiming its operators so no operator is bound into two matches
/// within the sweep.
pub(crate) fn find_matches(
    program: &Program,
    pattern: &PatternDescriptor,
    plan: &RolePlan,
) -> Vec<Match> {
    let scan = scan_order(program);
    let mut claimed: HashSet<OpRef> = HashSet::new();
    let mut matches = Vec::new();
    for anchor in &scan {
        if claimed.contains(anchor) {
            continue;
        }
        let Some(operator) = op(program, *anchor) else {
            continue;
        };
        let Some(anchor_pred) = pattern.predicate(&plan.order[0].role) else {
            break;
        };
        if !anchor_pred.matches(operator) {
            continue;
        }
        if let Some(found) = try_bind(program, &scan, pattern, plan, *anchor, &claimed) {
            claimed.extend(found.ops.values().copied());
            matches.push(found);
        }
    }
    matches
}

/// Grow a binding from a fixed anchor with an explicit candidate-cursor
/// stack (no recursion; pattern depth never touches the call stack).
fn try_bind(
    program: &Program,
    scan: &[OpRef],
    pattern: &PatternDescriptor,
    plan: &RolePlan,
    anchor: OpRef,
    claimed: &HashSet<OpRef>,
) -> Option<Match> {
    let total = plan.order.len();
    let mut bindings: Vec<OpRef> = Vec::with_capacity(total);
    bindings.push(anchor);
    if total == 1 {
        return finalize(program, pattern, plan, &bindings);
    }

    let mut cursors = vec![0usize; total];
    let mut depth = 1usize;
    cursors[depth] = 0;
    loop {
        // Next candidate for the role at `depth`, in scan order.
        let planned = &plan.order[depth];
        let predicate = pattern.predicate(&planned.role)?;
        let mut pos = cursors[depth];
        let mut found: Option<OpRef> = None;
        while pos < scan.len() {
            let cand = scan[pos];
            pos += 1;
            if claimed.contains(&cand) || bindings.contains(&cand) {
                continue;
            }
            let Some(operator) = op(program, cand) else {
                continue;
            };
            if !predicate.matches(operator) {
                continue;
            }
            let satisfied = planned.constraints.iter().all(|&edge_idx| {
                constraint_holds(program, pattern, plan, &bindings, cand, depth, edge_idx)
            });
            if satisfied {
                found = Some(cand);
                break;
            }
        }
        cursors[depth] = pos;

        match found {
            Some(cand) => {
                bindings.push(cand);
                depth += 1;
                if depth == total {
                    if let Some(complete) = finalize(program, pattern, plan, &bindings) {
                        return Some(complete);
                    }
                    // Variable-role conflict: drop the deepest binding and
                    // keep searching from its cursor.
                    bindings.pop();
                    depth -= 1;
                } else {
                    cursors[depth] = 0;
                }
            }
            None => {
                if depth == 1 {
                    return None;
                }
                bindings.pop();
                depth -= 1;
            }
        }
    }
}

fn constraint_holds(
    program: &Program,
    pattern: &PatternDescriptor,
    plan: &RolePlan,
    bindings: &[OpRef],
    candidate: OpRef,
    depth: usize,
    edge_idx: usize,
) -> bool {
    let edge = &pattern.edges()[edge_idx];
    let resolve = |role: &str| -> Option<OpRef> {
        let pos = plan.order.iter().position(|p| p.role == role)?;
        if pos == depth {
            Some(candidate)
        } else {
            bindings.get(pos).copied()
        }
    };
    let (Some(producer), Some(consumer)) = (resolve(&edge.producer), resolve(&edge.consumer))
    else {
        return false;
    };
    edge_binding(program, edge, producer, consumer).is_some()
}

/// Assemble the match and bind variable roles, rejecting bindings where two
/// edges disagree on a shared variable role.
fn finalize(
    program: &Program,
    pattern: &PatternDescriptor,
    plan: &RolePlan,
    bindings: &[OpRef],
) -> Option<Match> {
    let mut m = Match::default();
    for (planned, opref) in plan.order.iter().zip(bindings) {
        m.ops.insert(planned.role.clone(), *opref);
    }
    for edge in pattern.edges() {
        let producer = *m.ops.get(&edge.producer)?;
        let consumer = *m.ops.get(&edge.consumer)?;
        let name = edge_binding(program, edge, producer, consumer)?;
        if let Some(var_role) = &edge.var_role {
            match m.vars.get(var_role) {
                Some(existing) if *existing != name => return None,
                _ => {
                    m.vars.insert(var_role.clone(), name);
                }
            }
        }
    }
    Some(m)
}

/// Re-check a queued match immediately before its rewrite: every bound
/// operator must still exist at its position, still satisfy its role
/// predicate, and every edge (and variable-role binding) must still hold.
pub(crate) fn still_valid(program: &Program, pattern: &PatternDescriptor, m: &Match) -> bool {
    for (role, opref) in &m.ops {
        let Some(operator) = op(program, *opref) else {
            return false;
        };
        let Some(predicate) = pattern.predicate(role) else {
            return false;
        };
        if !predicate.matches(operator) {
            return false;
        }
    }
    for edge in pattern.edges() {
        let (Some(producer), Some(consumer)) =
            (m.ops.get(&edge.producer), m.ops.get(&edge.consumer))
        else {
            return false;
        };
        let Some(name) = edge_binding(program, edge, *producer, *consumer) else {
            return false;
        };
        if let Some(var_role) = &edge.var_role {
            if m.vars.get(var_role) != Some(&name) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::OpPredicate;
    use dotml_core::program::{Operator, Variable};

    fn chain_program(ops: &[(&str, &str, &str)]) -> Program {
        let mut program = Program::new();
        let root = program.root();
        for (_, input, output) in ops {
            for name in [input, output] {
                if !program.block(root).unwrap().declares(name) {
                    program.declare_variable(root, Variable::dense(*name)).unwrap();
                }
            }
        }
        for (op_type, input, output) in ops {
            program
                .add_operator(
                    root,
                    Operator::new(*op_type)
                        .with_input("X", [*input])
                        .with_output("Out", [*output]),
                )
                .unwrap();
        }
        program
    }

    fn pair_pattern() -> PatternDescriptor {
        PatternDescriptor::new("first")
            .with_node("first", OpPredicate::op_type("add"))
            .with_node("second", OpPredicate::op_type("relu"))
            .with_edge(PatternEdge::new("first", "Out", "second", "X").bind_var("mid"))
    }

    #[test]
    fn test_plan_starts_at_anchor() {
        let plan = plan_roles(&pair_pattern());
        assert_eq!(plan.order[0].role, "first");
        assert_eq!(plan.order[1].role, "second");
        assert!(plan.order[0].constraints.is_empty());
        assert_eq!(plan.order[1].constraints, vec![0]);
    }

    #[test]
    fn test_single_match_with_var_binding() {
        let program = chain_program(&[("add", "x", "z"), ("relu", "z", "w")]);
        let pattern = pair_pattern();
        let matches = find_matches(&program, &pattern, &plan_roles(&pattern));

        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.ops["first"].index, 0);
        assert_eq!(m.ops["second"].index, 1);
        assert_eq!(m.vars["mid"], "z");
    }

    #[test]
    fn test_no_match_without_shared_variable() {
        // relu consumes a different variable than add produces.
        let program = chain_program(&[("add", "x", "z"), ("relu", "x", "w")]);
        let pattern = pair_pattern();
        assert!(find_matches(&program, &pattern, &plan_roles(&pattern)).is_empty());
    }

    #[test]
    fn test_claimed_operator_not_rebound() {
        // add -> relu -> add -> relu: two disjoint matches, the middle
        // pairing is excluded by the claim set.
        let program = chain_program(&[
            ("add", "a", "b"),
            ("relu", "b", "c"),
            ("add", "c", "d"),
            ("relu", "d", "e"),
        ]);
        let pattern = pair_pattern();
        let matches = find_matches(&program, &pattern, &plan_roles(&pattern));

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].ops["first"].index, 0);
        assert_eq!(matches[0].ops["second"].index, 1);
        assert_eq!(matches[1].ops["first"].index, 2);
        assert_eq!(matches[1].ops["second"].index, 3);
    }

    #[test]
    fn test_backtracking_past_poor_candidate() {
        // The first relu in scan order does not consume the add's output;
        // the matcher must back off and take the second.
        let program = chain_program(&[
            ("add", "x", "z"),
            ("relu", "x", "y"),
            ("relu", "z", "w"),
        ]);
        let pattern = pair_pattern();
        let matches = find_matches(&program, &pattern, &plan_roles(&pattern));

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].ops["second"].index, 2);
    }

    #[test]
    fn test_match_reaches_into_child_block() {
        let mut program = chain_program(&[("add", "x", "z")]);
        let root = program.root();
        let child = program.create_block(root).unwrap();
        program.declare_variable(child, Variable::dense("w")).unwrap();
        program
            .add_operator(
                child,
                Operator::new("relu").with_input("X", ["z"]).with_output("Out", ["w"]),
            )
            .unwrap();

        let pattern = pair_pattern();
        let matches = find_matches(&program, &pattern, &plan_roles(&pattern));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].ops["second"].block, child);

        let confined = PatternDescriptor::new("first")
            .with_node("first", OpPredicate::op_type("add"))
            .with_node("second", OpPredicate::op_type("relu"))
            .with_edge(PatternEdge::new("first", "Out", "second", "X").same_block());
        assert!(find_matches(&program, &confined, &plan_roles(&confined)).is_empty());
    }

    #[test]
    fn test_still_valid_detects_removal() {
        let mut program = chain_program(&[("add", "x", "z"), ("relu", "z", "w")]);
        let pattern = pair_pattern();
        let matches = find_matches(&program, &pattern, &plan_roles(&pattern));
        let m = matches.into_iter().next().unwrap();
        assert!(still_valid(&program, &pattern, &m));

        program.remove_operator(program.root(), 0).unwrap();
        assert!(!still_valid(&program, &pattern, &m));
    }
}
