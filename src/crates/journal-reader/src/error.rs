use crate::file::ObjectType;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("invalid magic number")]
    InvalidMagicNumber,

    #[error("invalid header size {0}")]
    InvalidHeaderSize(u64),

    #[error("unsupported incompatible flags {0:#010x}")]
    UnsupportedIncompatibleFlags(u32),

    #[error("invalid object type {0}")]
    InvalidObjectType(u8),

    #[error("invalid object size {0}")]
    InvalidObjectSize(u64),

    #[error("invalid object location {0:#x}")]
    InvalidObjectLocation(u64),

    #[error("unexpected object type: expected {expected:?}, found {found:?}")]
    UnexpectedObjectType {
        expected: ObjectType,
        found: ObjectType,
    },

    #[error("malformed {object_type:?} object of size {size}")]
    MalformedObject { object_type: ObjectType, size: u64 },

    #[error("entry array chain does not move forward at offset {0:#x}")]
    InvalidEntryArrayChain(u64),

    #[error("truncated input")]
    TruncatedInput,

    #[error("compressed payload in data object at {0:#x}")]
    CompressedPayload(u64),

    #[error("unknown compression method")]
    UnknownCompressionMethod,

    #[error("decompressor error")]
    DecompressorError,

    #[error("data object at {offset:#x} has hash {found:#018x}, expected {expected:#018x}")]
    HashMismatch {
        offset: u64,
        expected: u64,
        found: u64,
    },

    #[error("payload of data object at {offset:#x} does not hash to {stored:#018x}")]
    PayloadHashMismatch { offset: u64, stored: u64 },

    #[error("traversal aborted by an earlier error")]
    TraversalAborted,

    #[error("i/o error during object operation: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of a [`JournalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes do not describe a well-formed journal.
    Format,
    /// A data object failed its hash check.
    Integrity,
    /// The byte source itself failed.
    Io,
}

impl JournalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JournalError::HashMismatch { .. } | JournalError::PayloadHashMismatch { .. } => {
                ErrorKind::Integrity
            }
            JournalError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }
}

static_assertions::const_assert!(std::mem::size_of::<JournalError>() <= 32);

impl<T: zerocopy::KnownLayout> From<zerocopy::SizeError<&[u8], T>> for JournalError {
    fn from(_: zerocopy::SizeError<&[u8], T>) -> Self {
        JournalError::TruncatedInput
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
