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

//! Structural errors raised by program-model mutation and validation.

use crate::program::BlockId;
use thiserror::Error;

/// Errors raised at mutation time by the program model. None of these are
/// left latent: the operation that triggered the error does not commit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("block {0} does not belong to this program")]
    InvalidScope(BlockId),

    #[error("variable '{name}' is already declared in block {block}")]
    DuplicateName { block: BlockId, name: String },

    #[error("operator '{op_type}' in block {block} references '{name}', which is not visible in scope")]
    UnresolvedReference {
        block: BlockId,
        op_type: String,
        name: String,
    },

    #[error("operator index {index} is out of range for block {block} ({len} operators)")]
    OperatorIndexOutOfRange {
        block: BlockId,
        index: usize,
        len: usize,
    },

    #[error("variable '{name}' is not declared directly in block {block}")]
    UndeclaredVariable { block: BlockId, name: String },
}
