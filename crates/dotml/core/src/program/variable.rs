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

//! Variable declarations: named, typed data slots owned by a block.

use serde::{Deserialize, Serialize};

/// Kind of data a variable holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    DenseTensor,
    SparseTensor,
    Scalar,
    TensorArray,
}

/// Element type of a tensor or scalar variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    F32,
    F64,
    I32,
    I64,
    U8,
    Bool,
}

/// Shape and element-type descriptor. Dimensions may be unknown pending
/// shape inference; `None` marks an unspecified dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDesc {
    pub dtype: DataType,
    pub dims: Vec<Option<i64>>,
}

impl TensorDesc {
    /// Descriptor with every dimension known.
    pub fn new(dtype: DataType, dims: impl IntoIterator<Item = i64>) -> Self {
        Self {
            dtype,
            dims: dims.into_iter().map(Some).collect(),
        }
    }

    /// Descriptor with possibly-unknown dimensions.
    pub fn partial(dtype: DataType, dims: impl IntoIterator<Item = Option<i64>>) -> Self {
        Self {
            dtype,
            dims: dims.into_iter().collect(),
        }
    }

    /// True when every dimension is known.
    pub fn is_fully_specified(&self) -> bool {
        self.dims.iter().all(Option::is_some)
    }
}

/// A named data slot declared in exactly one block. Operators reference
/// variables by name only; they never own them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub desc: Option<TensorDesc>,
    /// Parameters survive across training steps; intermediates do not.
    pub persistable: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            desc: None,
            persistable: false,
        }
    }

    /// Shorthand for the common dense-tensor case.
    pub fn dense(name: impl Into<String>) -> Self {
        Self::new(name, VarKind::DenseTensor)
    }

    pub fn with_desc(mut self, desc: TensorDesc) -> Self {
        self.desc = Some(desc);
        self
    }

    pub fn persistable(mut self, persistable: bool) -> Self {
        self.persistable = persistable;
        self
    }
}
