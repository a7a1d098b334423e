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

//! Wire-level model of a program and its mapping to the in-memory arena.
//!
//! On the wire, blocks are a flat list in arena order, parents are indices,
//! and operator variable references are `(block index, variable index)`
//! pairs into the per-block declaration lists. In memory references are
//! names; the mapping between the two forms lives here.

use crate::codec::MalformedInput;
use crate::program::{AttrValue, Block, BlockId, Operator, Program, ProgramError, Slot, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireProgram {
    pub blocks: Vec<WireBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireBlock {
    pub parent: Option<u32>,
    /// Declarations in name order; a variable's position here is its wire
    /// index.
    pub vars: Vec<Variable>,
    pub ops: Vec<WireOperator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireOperator {
    pub op_type: String,
    pub inputs: Vec<WireSlot>,
    pub outputs: Vec<WireSlot>,
    pub attrs: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireSlot {
    pub name: String,
    pub vars: Vec<VarRef>,
}

/// Indexed reference to a declaration: `var`-th variable of the `block`-th
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct VarRef {
    pub block: u32,
    pub var: u32,
}

/// Lower a program to its wire form. Fails if an operator reference does
/// not resolve, since an unresolvable name has no index to encode.
pub(crate) fn to_wire(program: &Program) -> Result<WireProgram, ProgramError> {
    let mut blocks = Vec::with_capacity(program.block_count());
    for block in &program.blocks {
        let ops = block
            .operators()
            .map(|op| lower_operator(program, block, op))
            .collect::<Result<Vec<_>, _>>()?;
        blocks.push(WireBlock {
            parent: block.parent().map(|p| p.index() as u32),
            vars: block.variables().cloned().collect(),
            ops,
        });
    }
    Ok(WireProgram { blocks })
}

fn lower_operator(
    program: &Program,
    block: &Block,
    op: &Operator,
) -> Result<WireOperator, ProgramError> {
    let lower_slots = |slots: &[Slot]| -> Result<Vec<WireSlot>, ProgramError> {
        slots
            .iter()
            .map(|slot| {
                let vars = slot
                    .vars
                    .iter()
                    .map(|name| lower_ref(program, block, op, name))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(WireSlot {
                    name: slot.name.clone(),
                    vars,
                })
            })
            .collect()
    };
    Ok(WireOperator {
        op_type: op.op_type.clone(),
        inputs: lower_slots(&op.inputs)?,
        outputs: lower_slots(&op.outputs)?,
        attrs: op.attrs.clone(),
    })
}

fn lower_ref(
    program: &Program,
    block: &Block,
    op: &Operator,
    name: &str,
) -> Result<VarRef, ProgramError> {
    let (owner, _) = program.resolve(block.id(), name).ok_or_else(|| {
        ProgramError::UnresolvedReference {
            block: block.id(),
            op_type: op.op_type.clone(),
            name: name.to_string(),
        }
    })?;
    let owner_block = program.block(owner)?;
    // Declarations iterate in name order; the position is the wire index.
    let var = owner_block
        .variables()
        .position(|v| v.name == name)
        .ok_or_else(|| ProgramError::UndeclaredVariable {
            block: owner,
            name: name.to_string(),
        })?;
    Ok(VarRef {
        block: owner.index() as u32,
        var: var as u32,
    })
}

/// Rebuild a program from its wire form, validating every index. The
/// program value is only constructed once the whole wire tree has passed;
/// no partial program is ever observable. Scope visibility of references is
/// deliberately not checked here; consumers re-check with
/// [`Program::validate`].
pub(crate) fn from_wire(wire: WireProgram) -> Result<Program, MalformedInput> {
    if wire.blocks.is_empty() {
        return Err(MalformedInput::EmptyProgram);
    }
    let total = wire.blocks.len();

    // Parent indices must form a tree rooted at block 0.
    for (idx, block) in wire.blocks.iter().enumerate() {
        match (idx, block.parent) {
            (0, None) => {}
            (0, Some(_)) => return Err(MalformedInput::InvalidParent { block: 0 }),
            (_, None) => return Err(MalformedInput::MissingParent { block: idx as u32 }),
            (_, Some(parent)) if (parent as usize) < idx => {}
            (_, Some(_)) => return Err(MalformedInput::InvalidParent { block: idx as u32 }),
        }
    }

    // Per-block name tables, rejecting duplicate declarations.
    let mut names: Vec<Vec<&str>> = Vec::with_capacity(total);
    for (idx, block) in wire.blocks.iter().enumerate() {
        let mut table: Vec<&str> = Vec::with_capacity(block.vars.len());
        for var in &block.vars {
            if table.contains(&var.name.as_str()) {
                return Err(MalformedInput::DuplicateVariable {
                    block: idx as u32,
                    name: var.name.clone(),
                });
            }
            table.push(&var.name);
        }
        names.push(table);
    }

    let mut blocks = Vec::with_capacity(total);
    for (idx, wire_block) in wire.blocks.iter().enumerate() {
        let mut block = Block::new(
            BlockId(idx as u32),
            wire_block.parent.map(BlockId),
        );
        for var in &wire_block.vars {
            block.vars.insert(var.name.clone(), var.clone());
        }
        for wire_op in &wire_block.ops {
            block.ops.push(raise_operator(wire_op, &names, total)?);
        }
        blocks.push(block);
    }
    Ok(Program::from_blocks(blocks))
}

fn raise_operator(
    wire_op: &WireOperator,
    names: &[Vec<&str>],
    total: usize,
) -> Result<Operator, MalformedInput> {
    let raise_slots = |slots: &[WireSlot]| -> Result<Vec<Slot>, MalformedInput> {
        slots
            .iter()
            .map(|slot| {
                let vars = slot
                    .vars
                    .iter()
                    .map(|vr| raise_ref(*vr, names))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Slot {
                    name: slot.name.clone(),
                    vars,
                })
            })
            .collect()
    };
    for value in wire_op.attrs.values() {
        for id in value.block_refs() {
            if id.index() >= total {
                return Err(MalformedInput::BlockIndexOutOfRange {
                    index: id.index() as u32,
                    blocks: total,
                });
            }
        }
    }
    Ok(Operator {
        op_type: wire_op.op_type.clone(),
        inputs: raise_slots(&wire_op.inputs)?,
        outputs: raise_slots(&wire_op.outputs)?,
        attrs: wire_op.attrs.clone(),
    })
}

fn raise_ref(vr: VarRef, names: &[Vec<&str>]) -> Result<String, MalformedInput> {
    let table = names
        .get(vr.block as usize)
        .ok_or(MalformedInput::BlockIndexOutOfRange {
            index: vr.block,
            blocks: names.len(),
        })?;
    let name = table
        .get(vr.var as usize)
        .ok_or(MalformedInput::VariableIndexOutOfRange {
            block: vr.block,
            index: vr.var,
            len: table.len(),
        })?;
    Ok((*name).to_string())
}
