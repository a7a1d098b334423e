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

//! Wire codec for pattern descriptors, letting passes be shipped
//! data-driven rather than only in code. Separate magic and version pair
//! from the program schema, same header layout and discipline.

use crate::pattern::{MalformedPattern, PatternDescriptor};
use dotml_core::codec::{FormatHeader, MalformedInput};
use thiserror::Error;

/// Magic bytes opening every serialized pattern descriptor.
pub const PATTERN_MAGIC: [u8; 5] = *b"DMLPT";
pub const PATTERN_MAJOR: u8 = 1;
pub const PATTERN_MINOR: u8 = 0;

#[derive(Error, Debug)]
pub enum PatternCodecError {
    #[error("malformed input: {0}")]
    MalformedInput(#[from] MalformedInput),

    /// The bytes decoded but describe a pattern that fails validation.
    #[error("decoded pattern is malformed: {0}")]
    MalformedPattern(#[from] MalformedPattern),

    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Serialize a descriptor. The descriptor is validated first; persisting a
/// malformed pattern is never useful.
pub fn encode(pattern: &PatternDescriptor) -> Result<Vec<u8>, PatternCodecError> {
    pattern.validate()?;
    let mut bytes = FormatHeader::new(PATTERN_MAGIC, PATTERN_MAJOR, PATTERN_MINOR)
        .to_bytes()
        .to_vec();
    let body = bincode::serde::encode_to_vec(pattern, bincode::config::standard())
        .map_err(|e| PatternCodecError::Encode(e.to_string()))?;
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Deserialize and validate a descriptor. Trailing bytes are ignored, as
/// with the program codec.
pub fn decode(bytes: &[u8]) -> Result<PatternDescriptor, PatternCodecError> {
    let header = FormatHeader::from_bytes(bytes, PATTERN_MAGIC)?;
    if header.major != PATTERN_MAJOR {
        return Err(MalformedInput::UnsupportedVersion {
            found: header.major,
            supported: PATTERN_MAJOR,
        }
        .into());
    }
    let (pattern, _consumed): (PatternDescriptor, usize) =
        bincode::serde::decode_from_slice(&bytes[FormatHeader::SIZE..], bincode::config::standard())
            .map_err(|e| MalformedInput::Body(e.to_string()))?;
    pattern.validate()?;
    Ok(pattern)
}
