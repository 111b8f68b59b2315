use std::io;
use thiserror::Error;

use crate::record::MAX_NAME_LEN;

/// Failures of the image operations.  Each one aborts the current command
/// only; the image is left as it was unless a commit already started.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("'{0}' already exists (use --force to overwrite)")]
    AlreadyExists(String),
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("'{name}' is ambiguous: {count} active records share this name")]
    Ambiguous { name: String, count: usize },
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: NameError },
    #[error("content of '{name}' is {len} bytes, larger than a record can hold")]
    ContentTooLarge { name: String, len: usize },
    #[error("aborted by operator")]
    Aborted,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    #[error("empty")]
    Empty,
    #[error("longer than {} bytes", MAX_NAME_LEN)]
    TooLong,
    #[error("not ASCII")]
    NotAscii,
    #[error("contains a NUL byte")]
    ContainsNul,
}

pub type Result<T> = std::result::Result<T, FsError>;
