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

//! Binary wire codec for programs.
//!
//! The wire form is a fixed 8-byte header (magic, major/minor format
//! version, reserved byte) followed by a bincode body. `decode(encode(p))`
//! is structurally equal to `p` for every valid program. Decoding is purely
//! structural: indices are range-checked, scope visibility is not; callers
//! re-check with [`Program::validate`] after loading.
//!
//! Both functions are pure and re-entrant; distinct buffers can be encoded
//! or decoded concurrently.

pub(crate) mod wire;

use crate::program::{Program, ProgramError};
use thiserror::Error;
use tracing::debug;

/// Magic bytes opening every serialized program.
pub const PROGRAM_MAGIC: [u8; 5] = *b"DOTML";
/// Format major version; a mismatch is unreadable.
pub const FORMAT_MAJOR: u8 = 1;
/// Format minor version; additions within a major stay readable because
/// decoding ignores bytes past the body it understands.
pub const FORMAT_MINOR: u8 = 0;

/// The wire format violates the schema. Every variant identifies the exact
/// offense so a bad producer can be diagnosed from the error alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedInput {
    #[error("input too short: {actual} bytes, header needs {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad magic number")]
    BadMagic,

    #[error("unsupported format major version {found} (supported: {supported})")]
    UnsupportedVersion { found: u8, supported: u8 },

    #[error("undecodable body: {0}")]
    Body(String),

    #[error("program has no blocks")]
    EmptyProgram,

    #[error("block {block} has an invalid parent index")]
    InvalidParent { block: u32 },

    #[error("non-root block {block} has no parent")]
    MissingParent { block: u32 },

    #[error("block {block} declares variable '{name}' twice")]
    DuplicateVariable { block: u32, name: String },

    #[error("block index {index} out of range ({blocks} blocks)")]
    BlockIndexOutOfRange { index: u32, blocks: usize },

    #[error("variable index {index} out of range for block {block} ({len} variables)")]
    VariableIndexOutOfRange { block: u32, index: u32, len: usize },
}

/// Codec failures: malformed bytes on the way in, or a structurally broken
/// program on the way out.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed input: {0}")]
    MalformedInput(#[from] MalformedInput),

    #[error("program cannot be encoded: {0}")]
    Unencodable(#[from] ProgramError),

    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Fixed-size header preceding every wire body. The same layout serves the
/// program schema and the pattern-rewrite schema; each carries its own magic
/// and version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub magic: [u8; 5],
    pub major: u8,
    pub minor: u8,
    pub reserved: u8,
}

impl FormatHeader {
    /// Serialized header size in bytes.
    pub const SIZE: usize = 8;

    pub fn new(magic: [u8; 5], major: u8, minor: u8) -> Self {
        Self {
            magic,
            major,
            minor,
            reserved: 0,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..5].copy_from_slice(&self.magic);
        bytes[5] = self.major;
        bytes[6] = self.minor;
        bytes[7] = self.reserved;
        bytes
    }

    /// Parse and check the magic; version acceptance is the caller's call.
    pub fn from_bytes(bytes: &[u8], expected_magic: [u8; 5]) -> Result<Self, MalformedInput> {
        if bytes.len() < Self::SIZE {
            return Err(MalformedInput::Truncated {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0..5] != expected_magic {
            return Err(MalformedInput::BadMagic);
        }
        let mut magic = [0u8; 5];
        magic.copy_from_slice(&bytes[0..5]);
        Ok(Self {
            magic,
            major: bytes[5],
            minor: bytes[6],
            reserved: bytes[7],
        })
    }
}

/// Serialize a program into its versioned wire form.
pub fn encode(program: &Program) -> Result<Vec<u8>, CodecError> {
    let wire = wire::to_wire(program)?;
    let mut bytes = FormatHeader::new(PROGRAM_MAGIC, FORMAT_MAJOR, FORMAT_MINOR)
        .to_bytes()
        .to_vec();
    let body = bincode::serde::encode_to_vec(&wire, bincode::config::standard())
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    bytes.extend_from_slice(&body);
    debug!(blocks = program.block_count(), bytes = bytes.len(), "encoded program");
    Ok(bytes)
}

/// Deserialize a program from wire bytes. Returns a fully-built program or
/// an error; never a partial one. Bytes past the decoded body are ignored,
/// which is what keeps minor-version additions readable.
pub fn decode(bytes: &[u8]) -> Result<Program, CodecError> {
    let header = FormatHeader::from_bytes(bytes, PROGRAM_MAGIC)?;
    if header.major != FORMAT_MAJOR {
        return Err(MalformedInput::UnsupportedVersion {
            found: header.major,
            supported: FORMAT_MAJOR,
        }
        .into());
    }
    let (wire, _consumed): (wire::WireProgram, usize) =
        bincode::serde::decode_from_slice(&bytes[FormatHeader::SIZE..], bincode::config::standard())
            .map_err(|e| MalformedInput::Body(e.to_string()))?;
    let program = wire::from_wire(wire)?;
    debug!(blocks = program.block_count(), "decoded program");
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::wire::{VarRef, WireBlock, WireOperator, WireProgram, WireSlot};
    use super::*;
    use crate::program::{AttrValue, DataType, Operator, TensorDesc, VarKind, Variable};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn sample_program() -> Program {
        let mut program = Program::new();
        let root = program.root();
        program
            .declare_variable(
                root,
                Variable::dense("data").with_desc(TensorDesc::new(DataType::F32, [32, 128])),
            )
            .unwrap();
        program
            .declare_variable(
                root,
                Variable::dense("w0")
                    .with_desc(TensorDesc::partial(DataType::F32, [Some(128), None]))
                    .persistable(true),
            )
            .unwrap();
        program
            .declare_variable(root, Variable::dense("hidden"))
            .unwrap();
        program
            .add_operator(
                root,
                Operator::new("matmul")
                    .with_input("X", ["data"])
                    .with_input("Y", ["w0"])
                    .with_output("Out", ["hidden"])
                    .with_attr("transpose_y", false)
                    .with_attr("alpha", AttrValue::Float(1.0)),
            )
            .unwrap();

        let body = program.create_block(root).unwrap();
        program
            .declare_variable(body, Variable::new("i", VarKind::Scalar))
            .unwrap();
        // Shadows the root's "hidden".
        program
            .declare_variable(body, Variable::dense("hidden"))
            .unwrap();
        program
            .add_operator(
                body,
                Operator::new("relu")
                    .with_input("X", ["hidden"])
                    .with_output("Out", ["hidden"]),
            )
            .unwrap();
        program
            .add_operator(
                root,
                Operator::new("while")
                    .with_input("Cond", ["hidden"])
                    .with_attr("body", AttrValue::Block(body))
                    .with_attr("steps", AttrValue::Ints(vec![1, 2, 3])),
            )
            .unwrap();
        program
    }

    /// Wrap a hand-built wire body in a valid header.
    fn to_bytes(wire: &WireProgram) -> Vec<u8> {
        let mut bytes = FormatHeader::new(PROGRAM_MAGIC, FORMAT_MAJOR, FORMAT_MINOR)
            .to_bytes()
            .to_vec();
        bytes.extend(bincode::serde::encode_to_vec(wire, bincode::config::standard()).unwrap());
        bytes
    }

    fn wire_op(op_type: &str, inputs: Vec<WireSlot>, outputs: Vec<WireSlot>) -> WireOperator {
        WireOperator {
            op_type: op_type.to_string(),
            inputs,
            outputs,
            attrs: BTreeMap::new(),
        }
    }

    #[test]
    fn test_roundtrip_preserves_structure() {
        let program = sample_program();
        let bytes = encode(&program).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, program);
        assert!(decoded.validate().is_ok());
    }

    #[test]
    fn test_roundtrip_empty_program() {
        let program = Program::new();
        let decoded = decode(&encode(&program).unwrap()).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = encode(&Program::new()).unwrap();
        bytes[0] = b'X';
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::BadMagic)
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        let err = decode(&[b'D', b'O']).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_major_version_bump() {
        let mut bytes = encode(&Program::new()).unwrap();
        bytes[5] = FORMAT_MAJOR + 1;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_decode_accepts_minor_version_bump_and_trailing_bytes() {
        let mut bytes = encode(&sample_program()).unwrap();
        bytes[6] = FORMAT_MINOR + 1;
        // A future minor revision may append fields we do not know about.
        bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, sample_program());
    }

    #[test]
    fn test_decode_rejects_garbage_body() {
        let mut bytes = FormatHeader::new(PROGRAM_MAGIC, FORMAT_MAJOR, FORMAT_MINOR)
            .to_bytes()
            .to_vec();
        bytes.extend_from_slice(&[0xFF; 4]);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::Body(_))
        ));
    }

    #[test]
    fn test_decode_rejects_variable_index_out_of_range() {
        // Five declarations, a reference to index 7.
        let wire = WireProgram {
            blocks: vec![WireBlock {
                parent: None,
                vars: ["a", "b", "c", "d", "e"]
                    .into_iter()
                    .map(Variable::dense)
                    .collect(),
                ops: vec![wire_op(
                    "relu",
                    vec![WireSlot {
                        name: "X".to_string(),
                        vars: vec![VarRef { block: 0, var: 7 }],
                    }],
                    vec![],
                )],
            }],
        };
        let err = decode(&to_bytes(&wire)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::VariableIndexOutOfRange {
                block: 0,
                index: 7,
                len: 5
            })
        ));
    }

    #[test]
    fn test_decode_rejects_block_index_out_of_range() {
        let wire = WireProgram {
            blocks: vec![WireBlock {
                parent: None,
                vars: vec![Variable::dense("a")],
                ops: vec![wire_op(
                    "relu",
                    vec![WireSlot {
                        name: "X".to_string(),
                        vars: vec![VarRef { block: 3, var: 0 }],
                    }],
                    vec![],
                )],
            }],
        };
        let err = decode(&to_bytes(&wire)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::BlockIndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_forward_parent() {
        // Block 1's parent points at block 2: not a tree in arena order.
        let empty = |parent| WireBlock {
            parent,
            vars: vec![],
            ops: vec![],
        };
        let wire = WireProgram {
            blocks: vec![empty(None), empty(Some(2)), empty(Some(0))],
        };
        let err = decode(&to_bytes(&wire)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::InvalidParent { block: 1 })
        ));
    }

    #[test]
    fn test_decode_rejects_second_root() {
        let empty = |parent| WireBlock {
            parent,
            vars: vec![],
            ops: vec![],
        };
        let wire = WireProgram {
            blocks: vec![empty(None), empty(None)],
        };
        let err = decode(&to_bytes(&wire)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::MissingParent { block: 1 })
        ));
    }

    #[test]
    fn test_decode_rejects_duplicate_declaration() {
        let wire = WireProgram {
            blocks: vec![WireBlock {
                parent: None,
                vars: vec![Variable::dense("x"), Variable::dense("x")],
                ops: vec![],
            }],
        };
        let err = decode(&to_bytes(&wire)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedInput(MalformedInput::DuplicateVariable { block: 0, .. })
        ));
    }

    #[test]
    fn test_encode_rejects_dangling_reference() {
        let mut program = sample_program();
        program.remove_variable(program.root(), "w0").unwrap();
        let err = encode(&program).unwrap_err();
        assert!(matches!(err, CodecError::Unencodable(_)));
    }

    /// Small valid programs built through the public mutation API.
    fn arb_program() -> impl Strategy<Value = Program> {
        let pool = ["a", "b", "c", "d", "e"];
        (
            proptest::sample::subsequence(pool.to_vec(), 1..=pool.len()),
            proptest::collection::vec((0usize..8, 0usize..8, any::<bool>()), 0..4),
            any::<bool>(),
        )
            .prop_map(|(names, op_picks, with_child)| {
                let mut program = Program::new();
                let root = program.root();
                for name in &names {
                    program
                        .declare_variable(root, Variable::dense(*name).persistable(name == &"a"))
                        .unwrap();
                }
                for (i, (x, y, flag)) in op_picks.iter().enumerate() {
                    let input = names[x % names.len()];
                    let output = names[y % names.len()];
                    program
                        .add_operator(
                            root,
                            Operator::new(format!("op{i}"))
                                .with_input("X", [input])
                                .with_output("Out", [output])
                                .with_attr("inplace", *flag),
                        )
                        .unwrap();
                }
                if with_child {
                    let child = program.create_block(root).unwrap();
                    program
                        .declare_variable(child, Variable::new("t", VarKind::TensorArray))
                        .unwrap();
                    program
                        .add_operator(
                            child,
                            Operator::new("copy")
                                .with_input("X", [names[0]])
                                .with_output("Out", ["t"]),
                        )
                        .unwrap();
                }
                program
            })
    }

    proptest! {
        #[test]
        fn prop_roundtrip_is_lossless(program in arb_program()) {
            let bytes = encode(&program).unwrap();
            let decoded = decode(&bytes).unwrap();
            prop_assert_eq!(decoded, program);
        }
    }
}
