use std::{
    io,
    path::PathBuf,
};
use thiserror::Error;

/// Why an SNMP datagram could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("expected tag {expected:#04x}, found {actual:#04x}")]
    UnexpectedTag { expected: u8, actual: u8 },
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("unsupported length encoding {0:#04x}")]
    UnsupportedLength(u8),
    #[error("integer of {0} bytes")]
    BadInteger(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed PDU at offset {offset}: {reason}")]
    MalformedPdu { offset: usize, reason: Malformed },
}

impl DecodeError {
    pub fn at(offset: usize, reason: Malformed) -> Self {
        DecodeError::MalformedPdu { offset, reason }
    }
}

/// A job log could not be written or read.
#[derive(Debug, Error)]
#[error("failed to {op} {}: {source}", path.display())]
pub struct StorageError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl StorageError {
    pub fn new(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("no print job named {0:?}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
