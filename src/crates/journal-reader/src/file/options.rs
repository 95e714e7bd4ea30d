use crate::error::Result;
use crate::file::object::{HEADER_SIZE_MIN, ObjectHeader};
use crate::file::reader::JournalReader;
use std::io::{Read, Seek};

/// What to do with a data object whose payload is stored compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionPolicy {
    /// Decompress XZ, LZ4 and ZSTD payloads before matching them.
    #[default]
    Decompress,
    /// Fail with [`JournalError::CompressedPayload`](crate::JournalError::CompressedPayload).
    Reject,
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    buffer_capacity: usize,
    max_header_size: u64,
    max_object_size: u64,
    compression: CompressionPolicy,
    verify_payload_hash: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 8 * 1024,
            max_header_size: 2048,
            max_object_size: 64 * 1024 * 1024,
            compression: CompressionPolicy::Decompress,
            verify_payload_hash: false,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the read buffer placed in front of the byte source.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Buffer capacity must be non-zero");
        self.buffer_capacity = capacity;
        self
    }

    /// Largest `header_size` a file may declare.
    pub fn with_max_header_size(mut self, size: u64) -> Self {
        assert!(
            size >= HEADER_SIZE_MIN,
            "Maximum header size must admit the smallest valid header"
        );
        self.max_header_size = size;
        self
    }

    /// Largest object size accepted before allocating its buffer. Also caps
    /// the size of a decompressed payload.
    pub fn with_max_object_size(mut self, size: u64) -> Self {
        assert!(
            size >= ObjectHeader::SIZE as u64,
            "Maximum object size must admit an object header"
        );
        self.max_object_size = size;
        self
    }

    pub fn with_compression_policy(mut self, policy: CompressionPolicy) -> Self {
        self.compression = policy;
        self
    }

    /// Recompute every matched payload's hash and compare it with the hash
    /// stored in its data object.
    pub fn with_payload_hash_verification(mut self, enabled: bool) -> Self {
        self.verify_payload_hash = enabled;
        self
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn max_header_size(&self) -> u64 {
        self.max_header_size
    }

    pub fn max_object_size(&self) -> u64 {
        self.max_object_size
    }

    pub fn compression_policy(&self) -> CompressionPolicy {
        self.compression
    }

    pub fn verify_payload_hash(&self) -> bool {
        self.verify_payload_hash
    }

    pub fn open<R: Read + Seek>(self, source: R) -> Result<JournalReader<R>> {
        JournalReader::with_options(source, self)
    }
}
