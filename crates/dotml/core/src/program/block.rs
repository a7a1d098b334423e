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

//! Blocks: ordered operator sequences plus local variable declarations.

use crate::program::{Operator, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a block within its owning program's arena. Block 0 is
/// always the root scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// The root block of every program.
    pub const ROOT: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A lexical scope: an ordered operator sequence (program order is the
/// executable order, not inferred from data dependencies) and the variables
/// declared directly in this scope. Child blocks may shadow ancestor names.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) parent: Option<BlockId>,
    pub(crate) ops: Vec<Operator>,
    pub(crate) vars: BTreeMap<String, Variable>,
}

impl Block {
    pub(crate) fn new(id: BlockId, parent: Option<BlockId>) -> Self {
        Self {
            id,
            parent,
            ops: Vec::new(),
            vars: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    /// Operators in program order. The iterator is restartable: independent
    /// traversals do not interfere.
    pub fn operators(&self) -> std::slice::Iter<'_, Operator> {
        self.ops.iter()
    }

    pub fn operator(&self, index: usize) -> Option<&Operator> {
        self.ops.get(index)
    }

    pub fn operator_count(&self) -> usize {
        self.ops.len()
    }

    /// Variables declared directly in this block, in name order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }

    /// A variable declared directly in this block, ignoring ancestors.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_accessors() {
        let mut block = Block::new(BlockId(3), Some(BlockId::ROOT));
        block.vars.insert("x".into(), Variable::dense("x"));
        block.ops.push(Operator::new("relu"));

        assert_eq!(block.id(), BlockId(3));
        assert_eq!(block.parent(), Some(BlockId::ROOT));
        assert!(block.declares("x"));
        assert!(!block.declares("y"));
        assert_eq!(block.operator_count(), 1);
        assert_eq!(block.operator(0).map(|op| op.op_type.as_str()), Some("relu"));
        assert_eq!(block.operator(1), None);
    }

    #[test]
    fn test_operator_iteration_restartable() {
        let mut block = Block::new(BlockId::ROOT, None);
        block.ops.push(Operator::new("a"));
        block.ops.push(Operator::new("b"));

        let first: Vec<&str> = block.operators().map(|op| op.op_type.as_str()).collect();
        let second: Vec<&str> = block.operators().map(|op| op.op_type.as_str()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["a", "b"]);
    }
}
