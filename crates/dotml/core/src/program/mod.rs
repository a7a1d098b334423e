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

//! In-memory program model: blocks, operators, variables, attributes.

mod attribute;
mod block;
mod errors;
mod operator;
#[allow(clippy::module_inception)]
mod program;
mod variable;

pub use attribute::AttrValue;
pub use block::{Block, BlockId};
pub use errors::ProgramError;
pub use operator::{Operator, Slot};
pub use program::Program;
pub use variable::{DataType, TensorDesc, VarKind, Variable};
