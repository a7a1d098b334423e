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

//! The program arena: block ownership, mutation API, scope resolution.

use crate::program::{Block, BlockId, Operator, ProgramError, Variable};

/// A complete IR program: a tree of blocks stored in an arena, block 0 being
/// the root scope. Blocks record their parent id; a parent always has a
/// smaller id than its children, since blocks can only be created under an
/// existing parent.
///
/// All mutation is local to the instance; there is no process-wide registry
/// of programs. A program is single-threaded per instance; independent
/// instances can be processed concurrently without shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) blocks: Vec<Block>,
}

impl Program {
    /// A program with a single empty root block.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::new(BlockId::ROOT, None)],
        }
    }

    pub(crate) fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn root(&self) -> BlockId {
        BlockId::ROOT
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> Result<&Block, ProgramError> {
        self.blocks
            .get(id.index())
            .ok_or(ProgramError::InvalidScope(id))
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, ProgramError> {
        self.blocks
            .get_mut(id.index())
            .ok_or(ProgramError::InvalidScope(id))
    }

    /// Create an empty block under `parent`.
    pub fn create_block(&mut self, parent: BlockId) -> Result<BlockId, ProgramError> {
        if parent.index() >= self.blocks.len() {
            return Err(ProgramError::InvalidScope(parent));
        }
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id, Some(parent)));
        Ok(id)
    }

    /// Declare a variable directly in `block`. Shadowing an ancestor's name
    /// is allowed; redeclaring within the same block is not.
    pub fn declare_variable(
        &mut self,
        block: BlockId,
        variable: Variable,
    ) -> Result<(), ProgramError> {
        let target = self.block_mut(block)?;
        if target.vars.contains_key(&variable.name) {
            return Err(ProgramError::DuplicateName {
                block,
                name: variable.name,
            });
        }
        target.vars.insert(variable.name.clone(), variable);
        Ok(())
    }

    /// Append an operator to `block`. Every variable the operator references
    /// must resolve through the scope chain, and every block attribute must
    /// point at a block of this program; otherwise nothing is mutated.
    pub fn add_operator(&mut self, block: BlockId, op: Operator) -> Result<(), ProgramError> {
        self.check_operator(block, &op)?;
        self.block_mut(block)?.ops.push(op);
        Ok(())
    }

    /// Insert an operator at `index` in `block`'s sequence, with the same
    /// validation as [`Program::add_operator`].
    pub fn insert_operator(
        &mut self,
        block: BlockId,
        index: usize,
        op: Operator,
    ) -> Result<(), ProgramError> {
        self.check_operator(block, &op)?;
        let target = self.block_mut(block)?;
        if index > target.ops.len() {
            return Err(ProgramError::OperatorIndexOutOfRange {
                block,
                index,
                len: target.ops.len(),
            });
        }
        target.ops.insert(index, op);
        Ok(())
    }

    /// Remove the operator at `index` in `block`. Dangling references this
    /// removal may leave behind are not checked here; the pass engine's
    /// post-sweep walk owns that.
    pub fn remove_operator(
        &mut self,
        block: BlockId,
        index: usize,
    ) -> Result<Operator, ProgramError> {
        let target = self.block_mut(block)?;
        if index >= target.ops.len() {
            return Err(ProgramError::OperatorIndexOutOfRange {
                block,
                index,
                len: target.ops.len(),
            });
        }
        Ok(target.ops.remove(index))
    }

    /// Remove a variable declared directly in `block`. As with operator
    /// removal, surviving references are the caller's responsibility.
    pub fn remove_variable(
        &mut self,
        block: BlockId,
        name: &str,
    ) -> Result<Variable, ProgramError> {
        let target = self.block_mut(block)?;
        target
            .vars
            .remove(name)
            .ok_or_else(|| ProgramError::UndeclaredVariable {
                block,
                name: name.to_string(),
            })
    }

    /// Resolve `name` through the scope chain starting at `block`, innermost
    /// declaration first. Names are re-resolved on every call; resolutions
    /// are never cached across mutations.
    pub fn resolve(&self, block: BlockId, name: &str) -> Option<(BlockId, &Variable)> {
        let mut current = self.blocks.get(block.index())?;
        loop {
            if let Some(var) = current.vars.get(name) {
                return Some((current.id, var));
            }
            current = self.blocks.get(current.parent?.index())?;
        }
    }

    /// Block ids in pre-order: each block before its children, children in
    /// creation order. This is the deterministic scan order of the pass
    /// engine.
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut children: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            if let Some(parent) = block.parent {
                children[parent.index()].push(block.id);
            }
        }
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![BlockId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            for child in children[id.index()].iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    /// Verify every operator reference in the whole program resolves in
    /// scope and every block attribute points at a real block. This is the
    /// re-check consumers run after `decode` and the pass engine runs after
    /// a sweep.
    pub fn validate(&self) -> Result<(), ProgramError> {
        for block in &self.blocks {
            for op in &block.ops {
                self.check_operator(block.id, op)?;
            }
        }
        Ok(())
    }

    fn check_operator(&self, block: BlockId, op: &Operator) -> Result<(), ProgramError> {
        // Existence of the block itself first.
        self.block(block)?;
        for name in op.referenced_vars() {
            if self.resolve(block, name).is_none() {
                return Err(ProgramError::UnresolvedReference {
                    block,
                    op_type: op.op_type.clone(),
                    name: name.to_string(),
                });
            }
        }
        for value in op.attrs.values() {
            for id in value.block_refs() {
                if id.index() >= self.blocks.len() {
                    return Err(ProgramError::InvalidScope(*id));
                }
            }
        }
        Ok(())
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{AttrValue, VarKind};

    fn add_op(x: &str, y: &str, out: &str) -> Operator {
        Operator::new("add")
            .with_input("X", [x])
            .with_input("Y", [y])
            .with_output("Out", [out])
    }

    #[test]
    fn test_create_block_rejects_foreign_parent() {
        let mut program = Program::new();
        let err = program.create_block(BlockId(9)).unwrap_err();
        assert_eq!(err, ProgramError::InvalidScope(BlockId(9)));
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut program = Program::new();
        let root = program.root();
        program.declare_variable(root, Variable::dense("x")).unwrap();
        let err = program
            .declare_variable(root, Variable::dense("x"))
            .unwrap_err();
        assert_eq!(
            err,
            ProgramError::DuplicateName {
                block: root,
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn test_child_block_shadows_parent_declaration() {
        let mut program = Program::new();
        let root = program.root();
        program
            .declare_variable(root, Variable::dense("x").persistable(true))
            .unwrap();

        let child = program.create_block(root).unwrap();
        program
            .declare_variable(child, Variable::new("x", VarKind::Scalar))
            .unwrap();

        // Operators in the child resolve to the child's declaration.
        let (owner, var) = program.resolve(child, "x").unwrap();
        assert_eq!(owner, child);
        assert_eq!(var.kind, VarKind::Scalar);

        // The root still sees its own.
        let (owner, var) = program.resolve(root, "x").unwrap();
        assert_eq!(owner, root);
        assert_eq!(var.kind, VarKind::DenseTensor);
    }

    #[test]
    fn test_add_operator_checks_scope_chain() {
        let mut program = Program::new();
        let root = program.root();
        program.declare_variable(root, Variable::dense("x")).unwrap();
        program.declare_variable(root, Variable::dense("y")).unwrap();

        // "z" is undeclared: the append must be rejected without mutating.
        let err = program.add_operator(root, add_op("x", "y", "z")).unwrap_err();
        assert_eq!(
            err,
            ProgramError::UnresolvedReference {
                block: root,
                op_type: "add".to_string(),
                name: "z".to_string()
            }
        );
        assert_eq!(program.block(root).unwrap().operator_count(), 0);

        program.declare_variable(root, Variable::dense("z")).unwrap();
        program.add_operator(root, add_op("x", "y", "z")).unwrap();
        assert_eq!(program.block(root).unwrap().operator_count(), 1);
    }

    #[test]
    fn test_operator_in_child_sees_ancestor_variables() {
        let mut program = Program::new();
        let root = program.root();
        program.declare_variable(root, Variable::dense("x")).unwrap();
        program.declare_variable(root, Variable::dense("y")).unwrap();

        let child = program.create_block(root).unwrap();
        program.declare_variable(child, Variable::dense("z")).unwrap();
        program.add_operator(child, add_op("x", "y", "z")).unwrap();
        assert!(program.validate().is_ok());
    }

    #[test]
    fn test_remove_operator_bounds() {
        let mut program = Program::new();
        let root = program.root();
        let err = program.remove_operator(root, 0).unwrap_err();
        assert_eq!(
            err,
            ProgramError::OperatorIndexOutOfRange {
                block: root,
                index: 0,
                len: 0
            }
        );
    }

    #[test]
    fn test_remove_operator_does_not_validate_danglers() {
        let mut program = Program::new();
        let root = program.root();
        program.declare_variable(root, Variable::dense("x")).unwrap();
        program.declare_variable(root, Variable::dense("y")).unwrap();
        program.declare_variable(root, Variable::dense("z")).unwrap();
        program.add_operator(root, add_op("x", "y", "z")).unwrap();

        // Removing "z" leaves the add operator dangling; the removal itself
        // succeeds and the full walk reports the damage.
        program.remove_variable(root, "z").unwrap();
        let err = program.validate().unwrap_err();
        assert!(matches!(err, ProgramError::UnresolvedReference { ref name, .. } if name == "z"));
    }

    #[test]
    fn test_block_attr_must_reference_real_block() {
        let mut program = Program::new();
        let root = program.root();
        let cond = Operator::new("while").with_attr("body", AttrValue::Block(BlockId(5)));
        let err = program.add_operator(root, cond).unwrap_err();
        assert_eq!(err, ProgramError::InvalidScope(BlockId(5)));
    }

    #[test]
    fn test_preorder_parent_before_children() {
        let mut program = Program::new();
        let root = program.root();
        let a = program.create_block(root).unwrap();
        let b = program.create_block(root).unwrap();
        let a1 = program.create_block(a).unwrap();

        assert_eq!(program.preorder(), vec![root, a, a1, b]);
    }
}
