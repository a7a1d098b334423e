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

//! Operator nodes: symbolic invocations of named operations.

use crate::program::AttrValue;
use std::collections::BTreeMap;

/// A named I/O slot holding an ordered list of variable names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub vars: Vec<String>,
}

impl Slot {
    pub fn new(name: impl Into<String>, vars: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            vars: vars.into_iter().map(Into::into).collect(),
        }
    }
}

/// A symbolic operator invocation: a type tag, ordered input and output
/// slots, and typed attributes. Variable references are names resolved
/// through the enclosing block's scope chain; operators never own variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub op_type: String,
    pub inputs: Vec<Slot>,
    pub outputs: Vec<Slot>,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Operator {
    /// Create an operator with no slots or attributes.
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    /// Append an input slot.
    pub fn with_input(
        mut self,
        slot: impl Into<String>,
        vars: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.inputs.push(Slot::new(slot, vars));
        self
    }

    /// Append an output slot.
    pub fn with_output(
        mut self,
        slot: impl Into<String>,
        vars: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.outputs.push(Slot::new(slot, vars));
        self
    }

    /// Set an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Variable names bound to the named input slot.
    pub fn input(&self, slot: &str) -> Option<&[String]> {
        self.inputs
            .iter()
            .find(|s| s.name == slot)
            .map(|s| s.vars.as_slice())
    }

    /// Variable names bound to the named output slot.
    pub fn output(&self, slot: &str) -> Option<&[String]> {
        self.outputs
            .iter()
            .find(|s| s.name == slot)
            .map(|s| s.vars.as_slice())
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Every variable name this operator references, inputs before outputs,
    /// slot order preserved.
    pub fn referenced_vars(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .flat_map(|slot| slot.vars.iter().map(String::as_str))
    }

    /// True if any output slot binds the given variable name.
    pub fn produces(&self, name: &str) -> bool {
        self.outputs.iter().any(|s| s.vars.iter().any(|v| v == name))
    }

    /// True if any input slot binds the given variable name.
    pub fn consumes(&self, name: &str) -> bool {
        self.inputs.iter().any(|s| s.vars.iter().any(|v| v == name))
    }
}
