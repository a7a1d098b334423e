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

//! DotML IR core: the block-scoped program model used by the training
//! framework, together with its binary wire codec.
//!
//! A [`program::Program`] is a tree of blocks; each block holds an ordered
//! operator sequence and its own variable declarations. Operators reference
//! variables by name, resolved through the lexical scope chain. The
//! [`codec`] module maps a program to and from its versioned wire form so
//! the same IR can be produced by one process and consumed by another.

pub mod codec;
pub mod program;

pub use codec::{CodecError, MalformedInput, decode, encode};
pub use program::{
    AttrValue, Block, BlockId, DataType, Operator, Program, ProgramError, Slot, TensorDesc,
    VarKind, Variable,
};
