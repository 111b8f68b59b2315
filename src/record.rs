//! Record codec: one fixed-width header followed by the payload.
//!
//! # Layout
//! ```text
//! offset  size  field
//!      0     1  state        0xB0 = active, 0xA0 = deleted, anything else = sentinel
//!      1   255  name         ASCII, zero-padded, at most 254 bytes used;
//!                            the whole field, padding included, must be ASCII
//!    256     4  name_hash    u32 LE, DJB2 of the name bytes
//!    260     4  content_size u32 LE
//!    264     N  content      exactly content_size bytes
//! ```
//! Records are packed back to back from offset 0.  There is no end marker
//! besides the first state byte outside the valid set.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::error::{FsError, NameError, Result};
use crate::hash::name_hash;

pub const STATE_ACTIVE:  u8 = 0xB0;
pub const STATE_DELETED: u8 = 0xA0;
/// Written by commit right after the last record.
pub const SENTINEL:      u8 = 0x00;

pub const NAME_FIELD_SIZE: usize = 255;
/// One byte of the name field is always left for the terminating NUL.
pub const MAX_NAME_LEN:    usize = NAME_FIELD_SIZE - 1;
pub const HEADER_SIZE:     usize = 1 + NAME_FIELD_SIZE + 4 + 4;

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Active,
    Deleted,
}

impl RecordState {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            STATE_ACTIVE  => Some(RecordState::Active),
            STATE_DELETED => Some(RecordState::Deleted),
            _             => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            RecordState::Active  => STATE_ACTIVE,
            RecordState::Deleted => STATE_DELETED,
        }
    }
}

// ── Decode errors ─────────────────────────────────────────────────────────────

/// Why a header could not be turned into a [`Record`].
///
/// The scanner stops at any of these, but keeps the variant so a clean end
/// of data can be told apart from corruption in diagnostics.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// State byte outside {active, deleted}: the regular end of data.
    #[error("sentinel state byte {0:#04x}")]
    Sentinel(u8),
    /// No byte left to read a state from.
    #[error("end of device")]
    EndOfDevice,
    #[error("header truncated")]
    TruncatedHeader,
    #[error("name field is not ASCII")]
    NameNotAscii,
    #[error("name field has no terminating NUL")]
    NameUnterminated,
    #[error("content truncated: {declared} bytes declared, {available} available")]
    TruncatedContent { declared: u32, available: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// True for malformed bytes where a header was expected, as opposed to
    /// a sentinel or the physical end of the device.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            DecodeError::TruncatedHeader
                | DecodeError::NameNotAscii
                | DecodeError::NameUnterminated
                | DecodeError::TruncatedContent { .. }
        )
    }
}

fn header_eof(e: io::Error) -> DecodeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DecodeError::TruncatedHeader
    } else {
        DecodeError::Io(e)
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// One stored blob.  `content_size` is not stored separately; it is always
/// `content.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub state:     RecordState,
    pub name:      String,
    pub name_hash: u32,
    pub content:   Vec<u8>,
}

impl Record {
    /// A fresh active record with a correct name hash.
    pub fn new(name: &str, content: Vec<u8>) -> Result<Self> {
        validate_name(name, false)?;
        check_content_len(name, content.len())?;
        Ok(Self {
            state:     RecordState::Active,
            name:      name.to_owned(),
            name_hash: name_hash(name),
            content,
        })
    }

    pub fn content_size(&self) -> u32 {
        self.content.len() as u32
    }

    /// Header plus payload, in bytes.
    pub fn encoded_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.content.len() as u64
    }

    pub fn is_active(&self) -> bool {
        self.state == RecordState::Active
    }

    /// Hash recomputed from the current name.
    pub fn computed_hash(&self) -> u32 {
        name_hash(&self.name)
    }

    pub fn hash_matches(&self) -> bool {
        self.name_hash == self.computed_hash()
    }

    /// Full value tuple used for duplicate detection.
    pub fn identity(&self) -> (RecordState, &str, u32, u32, &[u8]) {
        (self.state, self.name.as_str(), self.name_hash, self.content_size(), self.content.as_slice())
    }

    // ── Encoding ─────────────────────────────────────────────────────────────

    /// Whether this record can be encoded at all.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name, true)?;
        check_content_len(&self.name, self.content.len())
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        self.validate()?;

        let mut name_field = [0u8; NAME_FIELD_SIZE];
        name_field[..self.name.len()].copy_from_slice(self.name.as_bytes());

        writer.write_u8(self.state.to_byte())?;
        writer.write_all(&name_field)?;
        writer.write_u32::<LittleEndian>(self.name_hash)?;
        writer.write_u32::<LittleEndian>(self.content_size())?;
        writer.write_all(&self.content)?;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        self.write(&mut buf)?;
        Ok(buf)
    }

    // ── Decoding ─────────────────────────────────────────────────────────────

    /// Decode one record at the reader's current position.
    ///
    /// The state byte is read first; if it is not a valid state nothing
    /// else is consumed.  The payload is read through `take`, so a garbage
    /// `content_size` never allocates more than the device actually holds.
    pub fn decode<R: Read>(mut reader: R) -> std::result::Result<Self, DecodeError> {
        let state_byte = match reader.read_u8() {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(DecodeError::EndOfDevice)
            }
            Err(e) => return Err(DecodeError::Io(e)),
        };
        let state = RecordState::from_byte(state_byte)
            .ok_or(DecodeError::Sentinel(state_byte))?;

        let mut name_field = [0u8; NAME_FIELD_SIZE];
        reader.read_exact(&mut name_field).map_err(header_eof)?;
        let name_hash    = reader.read_u32::<LittleEndian>().map_err(header_eof)?;
        let content_size = reader.read_u32::<LittleEndian>().map_err(header_eof)?;

        let name = decode_name(&name_field)?;

        let mut content = Vec::new();
        let got = reader.by_ref().take(content_size as u64).read_to_end(&mut content)?;
        if got < content_size as usize {
            return Err(DecodeError::TruncatedContent {
                declared:  content_size,
                available: got as u64,
            });
        }

        Ok(Self { state, name, name_hash, content })
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<file flags={:#x} name='{}' size={}>",
            self.state.to_byte(),
            self.name,
            self.content.len()
        )
    }
}

// ── Name field ────────────────────────────────────────────────────────────────

/// The name is everything before the first NUL, but the padding after it
/// must be ASCII too: a field that is not text as a whole is corrupt.
fn decode_name(field: &[u8; NAME_FIELD_SIZE]) -> std::result::Result<String, DecodeError> {
    if !field.is_ascii() {
        return Err(DecodeError::NameNotAscii);
    }
    let len = field
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::NameUnterminated)?;
    let bytes = &field[..len];
    // ASCII is always valid UTF-8.
    Ok(bytes.iter().map(|&b| b as char).collect())
}

/// Check that `name` fits the on-disk name field.
///
/// Empty names decode and re-encode fine, so commit passes `allow_empty`;
/// creating a record under an empty name does not.
pub fn validate_name(name: &str, allow_empty: bool) -> Result<()> {
    let reason = if name.is_empty() && !allow_empty {
        Some(NameError::Empty)
    } else if !name.is_ascii() {
        Some(NameError::NotAscii)
    } else if name.len() > MAX_NAME_LEN {
        Some(NameError::TooLong)
    } else if name.bytes().any(|b| b == 0) {
        Some(NameError::ContainsNul)
    } else {
        None
    };
    match reason {
        Some(reason) => Err(FsError::InvalidName { name: name.to_owned(), reason }),
        None         => Ok(()),
    }
}

fn check_content_len(name: &str, len: usize) -> Result<()> {
    if len > u32::MAX as usize {
        return Err(FsError::ContentTooLarge { name: name.to_owned(), len });
    }
    Ok(())
}
