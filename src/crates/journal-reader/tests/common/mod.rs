//! Builds journal files byte by byte for the integration tests.

#![allow(dead_code)]

use journal_reader::file::hash::PayloadHasher;
use journal_reader::file::{
    DataObjectHeader, EntryArrayObjectHeader, EntryItem, EntryObjectHeader, HeaderIncompatibleFlags,
    JOURNAL_SIGNATURE, JournalHeader, OBJECT_ALIGNMENT, ObjectFlags, ObjectHeader, ObjectType,
};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromZeros, IntoBytes};

pub const FILE_ID: [u8; 16] = *b"journal-file-id!";

/// `MESSAGE=` followed by `"xz compressed "` twenty times, as an XZ stream
/// with a CRC64 check.
pub const XZ_MESSAGE: [u8; 96] = [
    0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, 0x00, 0x04, 0xe6, 0xd6, 0xb4, 0x46,
    0x02, 0x00, 0x21, 0x01, 0x16, 0x00, 0x00, 0x00, 0x74, 0x2f, 0xe5, 0xa3,
    0xe0, 0x01, 0x1f, 0x00, 0x1d, 0x5d, 0x00, 0x26, 0x91, 0x46, 0xc0, 0xd1,
    0x94, 0x57, 0xe4, 0x95, 0xc7, 0xd8, 0xc8, 0xdc, 0x09, 0xb1, 0x9f, 0x99,
    0x95, 0xaf, 0x53, 0x22, 0x2e, 0x3c, 0x1b, 0xde, 0x76, 0x02, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x07, 0x55, 0x7d, 0x0a, 0x0d, 0x16, 0x9a, 0x44,
    0x00, 0x01, 0x39, 0xa0, 0x02, 0x00, 0x00, 0x00, 0xa5, 0xd5, 0x0e, 0x3a,
    0xb1, 0xc4, 0x67, 0xfb, 0x02, 0x00, 0x00, 0x00, 0x00, 0x04, 0x59, 0x5a,
];

#[derive(Debug, Clone, Copy)]
pub enum Compression {
    Lz4,
    Zstd,
}

pub struct JournalBuilder {
    bytes: Vec<u8>,
    header_size: u64,
    keyed_hash: bool,
    n_objects: u64,
    n_entries: u64,
    entry_array_offset: u64,
    tail_object_offset: u64,
}

impl JournalBuilder {
    pub fn new() -> Self {
        Self::with_header_size(JournalHeader::SIZE as u64)
    }

    /// Declares a header of `header_size` bytes; anything past the known
    /// layout is filled with junk that a reader must skip.
    pub fn with_header_size(header_size: u64) -> Self {
        let mut bytes = vec![0u8; JournalHeader::SIZE.min(header_size as usize)];
        bytes.resize(header_size as usize, 0xa5);
        let aligned = (bytes.len() as u64).next_multiple_of(OBJECT_ALIGNMENT);
        bytes.resize(aligned as usize, 0);

        Self {
            bytes,
            header_size,
            keyed_hash: false,
            n_objects: 0,
            n_entries: 0,
            entry_array_offset: 0,
            tail_object_offset: 0,
        }
    }

    pub fn keyed_hash(mut self) -> Self {
        self.keyed_hash = true;
        self
    }

    pub fn hasher(&self) -> PayloadHasher {
        if self.keyed_hash {
            PayloadHasher::Keyed(FILE_ID)
        } else {
            PayloadHasher::Jenkins
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn append(&mut self, object: &[u8]) -> u64 {
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(object);
        let aligned = self.len().next_multiple_of(OBJECT_ALIGNMENT);
        self.bytes.resize(aligned as usize, 0);

        self.n_objects += 1;
        self.tail_object_offset = offset;
        offset
    }

    fn object_header(object_type: ObjectType, size: usize) -> ObjectHeader {
        let mut header = ObjectHeader::new_zeroed();
        header.type_ = object_type as u8;
        header.size = U64::new(size as u64);
        header
    }

    /// Appends a data object and returns the entry item referencing it.
    pub fn add_data(&mut self, payload: &[u8]) -> EntryItem {
        let hash = self.hasher().hash(payload);
        self.add_raw_data(payload, hash, 0)
    }

    /// Appends a data object whose payload is stored compressed. The hash
    /// covers the uncompressed payload.
    pub fn add_compressed_data(&mut self, payload: &[u8], compression: Compression) -> EntryItem {
        let hash = self.hasher().hash(payload);
        let (stored, flags) = match compression {
            Compression::Lz4 => {
                let mut stored = (payload.len() as u64).to_le_bytes().to_vec();
                stored.extend_from_slice(&lz4_flex::block::compress(payload));
                (stored, ObjectFlags::CompressedLz4 as u8)
            }
            Compression::Zstd => {
                let stored = ruzstd::encoding::compress_to_vec(
                    payload,
                    ruzstd::encoding::CompressionLevel::Fastest,
                );
                (stored, ObjectFlags::CompressedZstd as u8)
            }
        };
        self.add_raw_data(&stored, hash, flags)
    }

    /// Appends a data object with an arbitrary stored hash and flags.
    pub fn add_raw_data(&mut self, stored: &[u8], hash: u64, flags: u8) -> EntryItem {
        let mut header = DataObjectHeader::new_zeroed();
        header.object_header = Self::object_header(
            ObjectType::Data,
            std::mem::size_of::<DataObjectHeader>() + stored.len(),
        );
        header.object_header.flags = flags;
        header.hash = U64::new(hash);

        let mut object = header.as_bytes().to_vec();
        object.extend_from_slice(stored);
        let offset = self.append(&object);

        EntryItem::new(offset, hash)
    }

    pub fn add_entry(&mut self, seqnum: u64, realtime: u64, items: &[EntryItem]) -> u64 {
        let mut header = EntryObjectHeader::new_zeroed();
        header.object_header = Self::object_header(
            ObjectType::Entry,
            std::mem::size_of::<EntryObjectHeader>() + items.len() * 16,
        );
        header.seqnum = U64::new(seqnum);
        header.realtime = U64::new(realtime);
        header.monotonic = U64::new(seqnum * 1000);
        header.boot_id = [0x42; 16];
        header.xor_hash = U64::new(items.iter().fold(0, |acc, item| acc ^ item.hash()));

        let mut object = header.as_bytes().to_vec();
        for item in items {
            object.extend_from_slice(item.as_bytes());
        }

        self.n_entries += 1;
        self.append(&object)
    }

    /// Appends an entry array with room for `capacity` offsets. The chain
    /// pointer starts out as 0; see [`JournalBuilder::link`].
    pub fn add_entry_array(&mut self, entries: &[u64], capacity: usize) -> u64 {
        assert!(entries.len() <= capacity);

        let mut header = EntryArrayObjectHeader::new_zeroed();
        header.object_header = Self::object_header(
            ObjectType::EntryArray,
            std::mem::size_of::<EntryArrayObjectHeader>() + capacity * 8,
        );

        let mut object = header.as_bytes().to_vec();
        for slot in 0..capacity {
            let value = entries.get(slot).copied().unwrap_or(0);
            object.extend_from_slice(&value.to_le_bytes());
        }

        let offset = self.append(&object);
        if self.entry_array_offset == 0 {
            self.entry_array_offset = offset;
        }
        offset
    }

    /// Points the entry array at `array` to the one at `next`.
    pub fn link(&mut self, array: u64, next: u64) {
        let field = array as usize + std::mem::size_of::<ObjectHeader>();
        self.patch_u64(field, next);
    }

    /// Lays out `chunks` as a chain of entry arrays and returns their
    /// offsets.
    pub fn add_entry_array_chain(&mut self, chunks: &[&[u64]]) -> Vec<u64> {
        let offsets: Vec<u64> = chunks
            .iter()
            .map(|chunk| self.add_entry_array(chunk, chunk.len()))
            .collect();
        for pair in offsets.windows(2) {
            self.link(pair[0], pair[1]);
        }
        offsets
    }

    pub fn set_entry_array_offset(&mut self, offset: u64) {
        self.entry_array_offset = offset;
    }

    pub fn patch_u64(&mut self, at: usize, value: u64) {
        self.bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_byte(&mut self, at: usize, value: u8) {
        self.bytes[at] = value;
    }

    pub fn finish(mut self) -> Vec<u8> {
        let mut header = JournalHeader::new_zeroed();
        header.signature = JOURNAL_SIGNATURE;
        header.state = 0;
        header.file_id = FILE_ID;
        header.machine_id = [0x11; 16];
        header.tail_entry_boot_id = [0x42; 16];
        header.seqnum_id = [0x22; 16];
        header.header_size = U64::new(self.header_size);
        header.arena_size = U64::new(self.len() - self.header_size);
        header.tail_object_offset = U64::new(self.tail_object_offset);
        header.n_objects = U64::new(self.n_objects);
        header.n_entries = U64::new(self.n_entries);
        header.entry_array_offset = U64::new(self.entry_array_offset);
        if self.keyed_hash {
            header.incompatible_flags = U32::new(HeaderIncompatibleFlags::KeyedHash as u32);
        }

        let known = JournalHeader::SIZE.min(self.header_size as usize);
        self.bytes[..known].copy_from_slice(&header.as_bytes()[..known]);
        self.bytes
    }
}

/// A journal with one entry array holding `messages.len()` entries, each
/// with a `PRIORITY=6` item followed by a `MESSAGE=` item.
pub fn journal_with_messages(messages: &[&str]) -> Vec<u8> {
    let mut builder = JournalBuilder::new();
    let priority = builder.add_data(b"PRIORITY=6");

    let entries: Vec<u64> = messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let message = builder.add_data(format!("MESSAGE={message}").as_bytes());
            builder.add_entry(i as u64 + 1, 1_700_000_000_000_000 + i as u64, &[priority, message])
        })
        .collect();

    builder.add_entry_array(&entries, entries.len());
    builder.finish()
}
