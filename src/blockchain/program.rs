//! Tree-structured puzzles and solutions.
//!
//! A [`Program`] is either an atom (a byte string) or a pair of programs.
//! Lists are right-nested pairs terminated by nil, the empty atom. Puzzles
//! are committed to on chain by their tree hash, so two programs with the
//! same tree hash are interchangeable everywhere in this crate.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{decode_int, encode_int, sha256, Bytes32};

const PAIR_MARKER: u8 = 0xff;
const NIL_MARKER: u8 = 0x80;

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Program {
    Atom(Vec<u8>),
    Pair(Box<Program>, Box<Program>),
}

/// Serialized program could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramParseError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),
    #[error("invalid atom size prefix 0x{0:02x}")]
    InvalidSizePrefix(u8),
    #[error("{0} trailing bytes after program")]
    TrailingBytes(usize),
}

impl Program {
    pub fn nil() -> Self {
        Program::Atom(Vec::new())
    }

    pub fn atom(bytes: impl Into<Vec<u8>>) -> Self {
        Program::Atom(bytes.into())
    }

    pub fn pair(first: Program, rest: Program) -> Self {
        Program::Pair(Box::new(first), Box::new(rest))
    }

    /// Builds a nil-terminated list
    pub fn list(items: Vec<Program>) -> Self {
        items
            .into_iter()
            .rev()
            .fold(Program::nil(), |rest, item| Program::pair(item, rest))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Program::Atom(bytes) if bytes.is_empty())
    }

    pub fn as_atom(&self) -> Option<&[u8]> {
        match self {
            Program::Atom(bytes) => Some(bytes),
            Program::Pair(..) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_atom().and_then(decode_int)
    }

    pub fn as_bytes32(&self) -> Option<Bytes32> {
        self.as_atom().and_then(Bytes32::from_slice)
    }

    pub fn first(&self) -> Option<&Program> {
        match self {
            Program::Pair(first, _) => Some(first),
            Program::Atom(_) => None,
        }
    }

    pub fn rest(&self) -> Option<&Program> {
        match self {
            Program::Pair(_, rest) => Some(rest),
            Program::Atom(_) => None,
        }
    }

    /// The `index`th element of a list
    pub fn nth(&self, index: usize) -> Option<&Program> {
        let mut cursor = self;
        for _ in 0..index {
            cursor = cursor.rest()?;
        }
        cursor.first()
    }

    /// Elements of a proper (nil-terminated) list
    pub fn to_list(&self) -> Option<Vec<&Program>> {
        let mut items = Vec::new();
        let mut cursor = self;
        loop {
            match cursor {
                Program::Pair(first, rest) => {
                    items.push(first.as_ref());
                    cursor = rest;
                }
                Program::Atom(bytes) if bytes.is_empty() => return Some(items),
                Program::Atom(_) => return None,
            }
        }
    }

    /// Atoms hash as `sha256(1 || atom)`, pairs as `sha256(2 || left || right)`
    pub fn tree_hash(&self) -> Bytes32 {
        match self {
            Program::Atom(bytes) => sha256(&[&[1u8][..], bytes.as_slice()]),
            Program::Pair(first, rest) => {
                let left = first.tree_hash();
                let right = rest.tree_hash();
                sha256(&[&[2u8][..], left.as_ref(), right.as_ref()])
            }
        }
    }

    /// Canonical serialization: `0xff` prefixes a pair, atoms carry a
    /// length prefix unless they are a single byte below `0x80`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Program::Pair(first, rest) => {
                out.push(PAIR_MARKER);
                first.write_to(out);
                rest.write_to(out);
            }
            Program::Atom(bytes) => {
                if bytes.is_empty() {
                    out.push(NIL_MARKER);
                    return;
                }
                if bytes.len() == 1 && bytes[0] < 0x80 {
                    out.push(bytes[0]);
                    return;
                }
                let len = bytes.len();
                if len < 0x40 {
                    out.push(0x80 | len as u8);
                } else if len < 0x2000 {
                    out.push(0xc0 | (len >> 8) as u8);
                    out.push(len as u8);
                } else if len < 0x10_0000 {
                    out.push(0xe0 | (len >> 16) as u8);
                    out.push((len >> 8) as u8);
                    out.push(len as u8);
                } else {
                    out.push(0xf0 | (len >> 24) as u8);
                    out.push((len >> 16) as u8);
                    out.push((len >> 8) as u8);
                    out.push(len as u8);
                }
                out.extend_from_slice(bytes);
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProgramParseError> {
        let (program, used) = Self::parse(bytes, 0)?;
        if used != bytes.len() {
            return Err(ProgramParseError::TrailingBytes(bytes.len() - used));
        }
        Ok(program)
    }

    fn parse(bytes: &[u8], offset: usize) -> Result<(Self, usize), ProgramParseError> {
        let marker = *bytes
            .get(offset)
            .ok_or(ProgramParseError::UnexpectedEnd(offset))?;
        if marker == PAIR_MARKER {
            let (first, after_first) = Self::parse(bytes, offset + 1)?;
            let (rest, after_rest) = Self::parse(bytes, after_first)?;
            return Ok((Program::pair(first, rest), after_rest));
        }
        if marker < 0x80 {
            return Ok((Program::Atom(vec![marker]), offset + 1));
        }

        let (prefix_len, high_bits) = match marker {
            0x80..=0xbf => (1, usize::from(marker & 0x3f)),
            0xc0..=0xdf => (2, usize::from(marker & 0x1f)),
            0xe0..=0xef => (3, usize::from(marker & 0x0f)),
            0xf0..=0xf7 => (4, usize::from(marker & 0x07)),
            _ => return Err(ProgramParseError::InvalidSizePrefix(marker)),
        };
        let mut len = high_bits;
        for i in 1..prefix_len {
            let byte = *bytes
                .get(offset + i)
                .ok_or(ProgramParseError::UnexpectedEnd(offset + i))?;
            len = (len << 8) | usize::from(byte);
        }
        let start = offset + prefix_len;
        let end = start + len;
        if end > bytes.len() {
            return Err(ProgramParseError::UnexpectedEnd(bytes.len()));
        }
        Ok((Program::Atom(bytes[start..end].to_vec()), end))
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::nil()
    }
}

impl From<u64> for Program {
    fn from(value: u64) -> Self {
        Program::Atom(encode_int(value))
    }
}

impl From<Bytes32> for Program {
    fn from(value: Bytes32) -> Self {
        Program::Atom(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Program {
    fn from(value: &[u8]) -> Self {
        Program::Atom(value.to_vec())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Program({})", hex::encode(self.to_bytes()))
    }
}

impl Serialize for Program {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for Program {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Program::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
