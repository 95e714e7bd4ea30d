use crate::error::{JournalError, Result};
use std::collections::VecDeque;
use std::num::NonZeroU64;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const JOURNAL_SIGNATURE: [u8; 8] = *b"LPKSHHRH";

/// Bytes up to and including `header_size`; enough to validate the rest.
pub const HEADER_PREFIX_SIZE: usize = 96;

/// Smallest header systemd ever wrote (everything before `n_data`).
pub const HEADER_SIZE_MIN: u64 = 208;

/// Offsets and sizes of objects are padded to this alignment.
pub const OBJECT_ALIGNMENT: u64 = 8;

// SHA-256 HMAC is 32 bytes (256 bits)
pub const TAG_LENGTH: usize = 256 / 8;

fn nonzero(value: U64) -> Option<NonZeroU64> {
    NonZeroU64::new(value.get())
}

pub enum HeaderIncompatibleFlags {
    CompressedXz = 1 << 0,
    CompressedLz4 = 1 << 1,
    KeyedHash = 1 << 2,
    CompressedZstd = 1 << 3,
    Compact = 1 << 4,
}

impl HeaderIncompatibleFlags {
    /// Flags this reader knows how to honor. Compact files use 32-bit
    /// offsets and hash-less entry items, which is a different layout.
    pub const SUPPORTED: u32 = HeaderIncompatibleFlags::CompressedXz as u32
        | HeaderIncompatibleFlags::CompressedLz4 as u32
        | HeaderIncompatibleFlags::KeyedHash as u32
        | HeaderIncompatibleFlags::CompressedZstd as u32;
}

pub enum HeaderCompatibleFlags {
    Sealed = 1 << 0,
    TailEntryBootId = 1 << 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    Offline = 0,
    Online = 1,
    Archived = 2,
}

impl TryFrom<u8> for JournalState {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(JournalState::Offline),
            1 => Ok(JournalState::Online),
            2 => Ok(JournalState::Archived),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for JournalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JournalState::Offline => write!(f, "OFFLINE"),
            JournalState::Online => write!(f, "ONLINE"),
            JournalState::Archived => write!(f, "ARCHIVED"),
        }
    }
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct JournalHeader {
    pub signature: [u8; 8],           // "LPKSHHRH"
    pub compatible_flags: U32,        // Compatible extension flags
    pub incompatible_flags: U32,      // Incompatible extension flags
    pub state: u8,                    // File state (offline=0, online=1, archived=2)
    pub reserved: [u8; 7],            // Reserved space
    pub file_id: [u8; 16],            // Unique ID for this file
    pub machine_id: [u8; 16],         // Machine ID this belongs to
    pub tail_entry_boot_id: [u8; 16], // Boot ID of the last entry
    pub seqnum_id: [u8; 16],          // Sequence number ID
    pub header_size: U64,             // Size of the header
    pub arena_size: U64,              // Size of the data arena
    pub data_hash_table_offset: U64,  // Offset of the data hash table
    pub data_hash_table_size: U64,    // Size of the data hash table
    pub field_hash_table_offset: U64, // Offset of the field hash table
    pub field_hash_table_size: U64,   // Size of the field hash table
    pub tail_object_offset: U64,      // Offset of the last object
    pub n_objects: U64,               // Number of objects
    pub n_entries: U64,               // Number of entries
    pub tail_entry_seqnum: U64,       // Sequence number of the last entry
    pub head_entry_seqnum: U64,       // Sequence number of the first entry
    pub entry_array_offset: U64,      // Offset of the first entry array
    pub head_entry_realtime: U64,     // Realtime timestamp of the first entry
    pub tail_entry_realtime: U64,     // Realtime timestamp of the last entry
    pub tail_entry_monotonic: U64,    // Monotonic timestamp of the last entry
    // Added in 187
    pub n_data: U64,
    pub n_fields: U64,
    // Added in 189
    pub n_tags: U64,
    pub n_entry_arrays: U64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<JournalHeader>(), 240);

impl JournalHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Decodes a header from the first `data.len()` bytes of the file.
    ///
    /// Fields past the end of `data` read as zero, which is how files
    /// written by older systemd versions look. Bytes past the known
    /// layout are ignored.
    pub fn from_prefix_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_PREFIX_SIZE {
            return Err(JournalError::TruncatedInput);
        }

        let mut raw = [0u8; Self::SIZE];
        let n = data.len().min(Self::SIZE);
        raw[..n].copy_from_slice(&data[..n]);

        Ok(Self::read_from_bytes(&raw)?)
    }

    pub fn validate_signature(&self) -> Result<()> {
        if self.signature != JOURNAL_SIGNATURE {
            return Err(JournalError::InvalidMagicNumber);
        }
        Ok(())
    }

    /// Checks the declared header size and returns it.
    pub fn validate_size(&self, max_header_size: u64) -> Result<u64> {
        let header_size = self.header_size.get();
        if !(HEADER_SIZE_MIN..=max_header_size).contains(&header_size) {
            return Err(JournalError::InvalidHeaderSize(header_size));
        }
        Ok(header_size)
    }

    pub fn validate_flags(&self) -> Result<()> {
        let unsupported = self.incompatible_flags.get() & !HeaderIncompatibleFlags::SUPPORTED;
        if unsupported != 0 {
            return Err(JournalError::UnsupportedIncompatibleFlags(unsupported));
        }
        Ok(())
    }

    pub fn has_incompatible_flag(&self, flag: HeaderIncompatibleFlags) -> bool {
        (self.incompatible_flags.get() & flag as u32) != 0
    }

    pub fn has_compatible_flag(&self, flag: HeaderCompatibleFlags) -> bool {
        (self.compatible_flags.get() & flag as u32) != 0
    }

    pub fn state(&self) -> std::result::Result<JournalState, u8> {
        JournalState::try_from(self.state)
    }

    /// Head of the entry array chain, `None` for a journal without entries.
    pub fn entry_array_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.entry_array_offset)
    }
}

pub enum ObjectFlags {
    CompressedXz = 1 << 0,
    CompressedLz4 = 1 << 1,
    CompressedZstd = 1 << 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Unused = 0,
    Data = 1,
    Field = 2,
    Entry = 3,
    DataHashTable = 4,
    FieldHashTable = 5,
    EntryArray = 6,
    Tag = 7,
}

impl TryFrom<u8> for ObjectType {
    type Error = JournalError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ObjectType::Unused),
            1 => Ok(ObjectType::Data),
            2 => Ok(ObjectType::Field),
            3 => Ok(ObjectType::Entry),
            4 => Ok(ObjectType::DataHashTable),
            5 => Ok(ObjectType::FieldHashTable),
            6 => Ok(ObjectType::EntryArray),
            7 => Ok(ObjectType::Tag),
            _ => Err(JournalError::InvalidObjectType(value)),
        }
    }
}

#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ObjectHeader {
    pub type_: u8,
    pub flags: u8,
    pub reserved: [u8; 6],
    pub size: U64,
}

impl ObjectHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn object_type(&self) -> Result<ObjectType> {
        ObjectType::try_from(self.type_)
    }

    pub fn size(&self) -> u64 {
        self.size.get()
    }

    /// Checks the declared size against `[16, max_object_size]` and the
    /// platform's addressable length. Returns the number of bytes that
    /// follow the header.
    pub fn validate_size(&self, max_object_size: u64) -> Result<u64> {
        let size = self.size();
        if size < Self::SIZE as u64 || size > max_object_size || size >= isize::MAX as u64 {
            return Err(JournalError::InvalidObjectSize(size));
        }
        Ok(size - Self::SIZE as u64)
    }

    pub fn xz_compressed(&self) -> bool {
        (self.flags & ObjectFlags::CompressedXz as u8) != 0
    }

    pub fn lz4_compressed(&self) -> bool {
        (self.flags & ObjectFlags::CompressedLz4 as u8) != 0
    }

    pub fn zstd_compressed(&self) -> bool {
        (self.flags & ObjectFlags::CompressedZstd as u8) != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.zstd_compressed() | self.lz4_compressed() | self.xz_compressed()
    }
}

#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DataObjectHeader {
    pub object_header: ObjectHeader,
    pub hash: U64,
    pub next_hash_offset: U64,
    pub next_field_offset: U64,
    pub entry_offset: U64,
    pub entry_array_offset: U64,
    pub n_entries: U64,
}

#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FieldObjectHeader {
    pub object_header: ObjectHeader,
    pub hash: U64,
    pub next_hash_offset: U64,
    pub head_data_offset: U64,
}

#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct EntryObjectHeader {
    pub object_header: ObjectHeader,
    pub seqnum: U64,
    pub realtime: U64,
    pub monotonic: U64,
    pub boot_id: [u8; 16],
    pub xor_hash: U64,
}

#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct EntryArrayObjectHeader {
    pub object_header: ObjectHeader,
    pub next_entry_array_offset: U64,
}

#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct TagObjectHeader {
    pub object_header: ObjectHeader,
    pub seqnum: U64,
    pub epoch: U64,
    pub tag: [u8; TAG_LENGTH], // SHA-256 HMAC
}

/// A reference from an entry to one of its data objects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct EntryItem {
    pub object_offset: U64,
    pub hash: U64,
}

impl EntryItem {
    pub fn new(object_offset: u64, hash: u64) -> Self {
        Self {
            object_offset: U64::new(object_offset),
            hash: U64::new(hash),
        }
    }

    pub fn object_offset(&self) -> u64 {
        self.object_offset.get()
    }

    pub fn hash(&self) -> u64 {
        self.hash.get()
    }
}

#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct HashItem {
    pub head_hash_offset: U64,
    pub tail_hash_offset: U64,
}

impl HashItem {
    pub fn head_hash_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.head_hash_offset)
    }

    pub fn tail_hash_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.tail_hash_offset)
    }
}

/// Splits a complete object into its fixed-size header `H` and the bytes
/// that trail it.
///
/// `data` may be longer than the object; only the first `size` bytes are
/// looked at.
fn split_object<H>(data: &[u8], object_type: ObjectType) -> Result<(H, &[u8])>
where
    H: FromBytes + KnownLayout + Immutable,
{
    let (object_header, _) = ObjectHeader::read_from_prefix(data)?;

    let found = object_header.object_type()?;
    if found != object_type {
        return Err(JournalError::UnexpectedObjectType {
            expected: object_type,
            found,
        });
    }

    let size = object_header.size();
    if size < ObjectHeader::SIZE as u64 {
        return Err(JournalError::InvalidObjectSize(size));
    }
    let len = usize::try_from(size).map_err(|_| JournalError::InvalidObjectSize(size))?;
    let data = data.get(..len).ok_or(JournalError::TruncatedInput)?;

    if len < std::mem::size_of::<H>() {
        return Err(JournalError::MalformedObject { object_type, size });
    }

    Ok(H::read_from_prefix(data)?)
}

/// Reinterprets a trailing array, rejecting lengths that are not a
/// multiple of the element size.
fn trailing_items<T>(trailing: &[u8], object_type: ObjectType, size: u64) -> Result<&[T]>
where
    T: FromBytes + KnownLayout + Immutable + Unaligned,
{
    <[T]>::ref_from_bytes(trailing).map_err(|_| JournalError::MalformedObject { object_type, size })
}

/// Trait to standardize decoding of journal objects from byte slices
pub trait JournalObject: Sized {
    const OBJECT_TYPE: ObjectType;

    /// Decode an object from its complete on-disk bytes, object header
    /// included.
    fn from_data(data: &[u8]) -> Result<Self>;
}

#[derive(Debug, Clone)]
pub struct DataObject {
    pub header: DataObjectHeader,
    pub payload: Vec<u8>,
}

impl JournalObject for DataObject {
    const OBJECT_TYPE: ObjectType = ObjectType::Data;

    fn from_data(data: &[u8]) -> Result<Self> {
        let (header, payload) = split_object::<DataObjectHeader>(data, Self::OBJECT_TYPE)?;
        Ok(DataObject {
            header,
            payload: payload.to_vec(),
        })
    }
}

impl DataObject {
    pub fn hash(&self) -> u64 {
        self.header.hash.get()
    }

    pub fn raw_payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn next_hash_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.header.next_hash_offset)
    }

    pub fn next_field_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.header.next_field_offset)
    }

    pub fn entry_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.header.entry_offset)
    }

    pub fn entry_array_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.header.entry_array_offset)
    }

    pub fn n_entries(&self) -> u64 {
        self.header.n_entries.get()
    }

    pub fn is_compressed(&self) -> bool {
        self.header.object_header.is_compressed()
    }

    pub fn xz_compressed(&self) -> bool {
        self.header.object_header.xz_compressed()
    }

    pub fn lz4_compressed(&self) -> bool {
        self.header.object_header.lz4_compressed()
    }

    pub fn zstd_compressed(&self) -> bool {
        self.header.object_header.zstd_compressed()
    }

    /// Decompress the payload into `buf`, producing at most `limit` bytes.
    /// Returns the number of decompressed bytes.
    pub fn decompress(&self, buf: &mut Vec<u8>, limit: usize) -> Result<usize> {
        use std::io::Read;

        debug_assert!(self.is_compressed());

        buf.clear();
        let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);

        if self.zstd_compressed() {
            use ruzstd::decoding::StreamingDecoder;

            let payload = self.raw_payload();
            let decoder =
                StreamingDecoder::new(payload).map_err(|_| JournalError::DecompressorError)?;

            decoder
                .take(cap)
                .read_to_end(buf)
                .map_err(|_| JournalError::DecompressorError)?;
        } else if self.lz4_compressed() {
            let payload = self.raw_payload();

            // First 8 bytes are the uncompressed size (little-endian u64)
            let (size_prefix, compressed_data) = U64::read_from_prefix(payload)
                .map_err(|_| JournalError::DecompressorError)?;
            let uncompressed_size = usize::try_from(size_prefix.get())
                .ok()
                .filter(|n| *n <= limit)
                .ok_or(JournalError::DecompressorError)?;

            buf.resize(uncompressed_size, 0);
            let n = lz4_flex::block::decompress_into(compressed_data, buf)
                .map_err(|_| JournalError::DecompressorError)?;
            buf.truncate(n);
        } else if self.xz_compressed() {
            use lzma_rust2::XzReader;

            let payload = self.raw_payload();
            let decoder = XzReader::new(payload, false);

            decoder
                .take(cap)
                .read_to_end(buf)
                .map_err(|_| JournalError::DecompressorError)?;
        } else {
            return Err(JournalError::UnknownCompressionMethod);
        }

        if buf.len() > limit {
            return Err(JournalError::DecompressorError);
        }
        Ok(buf.len())
    }
}

#[derive(Debug, Clone)]
pub struct FieldObject {
    pub header: FieldObjectHeader,
    pub payload: Vec<u8>,
}

impl JournalObject for FieldObject {
    const OBJECT_TYPE: ObjectType = ObjectType::Field;

    fn from_data(data: &[u8]) -> Result<Self> {
        let (header, payload) = split_object::<FieldObjectHeader>(data, Self::OBJECT_TYPE)?;
        Ok(FieldObject {
            header,
            payload: payload.to_vec(),
        })
    }
}

impl FieldObject {
    pub fn hash(&self) -> u64 {
        self.header.hash.get()
    }

    pub fn head_data_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.header.head_data_offset)
    }
}

#[derive(Debug, Clone)]
pub struct EntryObject {
    pub header: EntryObjectHeader,
    pub items: Vec<EntryItem>,
}

impl JournalObject for EntryObject {
    const OBJECT_TYPE: ObjectType = ObjectType::Entry;

    fn from_data(data: &[u8]) -> Result<Self> {
        let (header, trailing) = split_object::<EntryObjectHeader>(data, Self::OBJECT_TYPE)?;
        let items = trailing_items::<EntryItem>(
            trailing,
            Self::OBJECT_TYPE,
            header.object_header.size(),
        )?;

        Ok(EntryObject {
            header,
            items: items.to_vec(),
        })
    }
}

impl EntryObject {
    pub fn seqnum(&self) -> u64 {
        self.header.seqnum.get()
    }

    /// Wallclock time in microseconds since the epoch.
    pub fn realtime(&self) -> u64 {
        self.header.realtime.get()
    }

    pub fn monotonic(&self) -> u64 {
        self.header.monotonic.get()
    }

    pub fn boot_id(&self) -> [u8; 16] {
        self.header.boot_id
    }

    pub fn xor_hash(&self) -> u64 {
        self.header.xor_hash.get()
    }

    pub fn items(&self) -> &[EntryItem] {
        &self.items
    }
}

/// One link of the entry array chain.
///
/// The item list is consumed from the front as entries are handed out;
/// popped items cannot be restored.
#[derive(Debug, Clone)]
pub struct EntryArrayObject {
    pub header: EntryArrayObjectHeader,
    items: VecDeque<NonZeroU64>,
}

impl JournalObject for EntryArrayObject {
    const OBJECT_TYPE: ObjectType = ObjectType::EntryArray;

    fn from_data(data: &[u8]) -> Result<Self> {
        let (header, trailing) = split_object::<EntryArrayObjectHeader>(data, Self::OBJECT_TYPE)?;
        let slots =
            trailing_items::<U64>(trailing, Self::OBJECT_TYPE, header.object_header.size())?;

        // Arrays are preallocated; a zero slot marks the unused tail.
        let items = slots.iter().map_while(|slot| nonzero(*slot)).collect();

        Ok(EntryArrayObject { header, items })
    }
}

impl EntryArrayObject {
    pub fn next_entry_array_offset(&self) -> Option<NonZeroU64> {
        nonzero(self.header.next_entry_array_offset)
    }

    /// Number of item slots the object was allocated with.
    pub fn capacity(&self) -> usize {
        let size = self.header.object_header.size() as usize;
        (size - std::mem::size_of::<EntryArrayObjectHeader>()) / std::mem::size_of::<U64>()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = NonZeroU64> + '_ {
        self.items.iter().copied()
    }

    /// Removes and returns the next entry offset in on-disk order.
    pub fn pop_front(&mut self) -> Option<NonZeroU64> {
        self.items.pop_front()
    }
}

#[derive(Debug, Clone)]
pub struct HashTableObject {
    pub header: ObjectHeader,
    pub items: Vec<HashItem>,
}

impl HashTableObject {
    /// Decodes a data or field hash table, as told by `object_type`.
    pub fn from_data(data: &[u8], object_type: ObjectType) -> Result<Self> {
        debug_assert!(matches!(
            object_type,
            ObjectType::DataHashTable | ObjectType::FieldHashTable
        ));

        let (header, trailing) = split_object::<ObjectHeader>(data, object_type)?;
        let items = trailing_items::<HashItem>(trailing, object_type, header.size())?;

        Ok(HashTableObject {
            header,
            items: items.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TagObject {
    pub header: TagObjectHeader,
}

impl JournalObject for TagObject {
    const OBJECT_TYPE: ObjectType = ObjectType::Tag;

    fn from_data(data: &[u8]) -> Result<Self> {
        let (header, trailing) = split_object::<TagObjectHeader>(data, Self::OBJECT_TYPE)?;
        if !trailing.is_empty() {
            return Err(JournalError::MalformedObject {
                object_type: Self::OBJECT_TYPE,
                size: header.object_header.size(),
            });
        }
        Ok(TagObject { header })
    }
}

impl TagObject {
    // Helper function to format tag as hex string
    pub fn tag_as_hex(&self) -> String {
        self.header
            .tag
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// Any object, decoded according to its type tag.
#[derive(Debug, Clone)]
pub enum Object {
    Unused(ObjectHeader),
    Data(DataObject),
    Field(FieldObject),
    Entry(EntryObject),
    DataHashTable(HashTableObject),
    FieldHashTable(HashTableObject),
    EntryArray(EntryArrayObject),
    Tag(TagObject),
}

impl Object {
    pub fn from_data(data: &[u8]) -> Result<Self> {
        let (object_header, _) = ObjectHeader::read_from_prefix(data)?;

        Ok(match object_header.object_type()? {
            ObjectType::Unused => Object::Unused(object_header),
            ObjectType::Data => Object::Data(DataObject::from_data(data)?),
            ObjectType::Field => Object::Field(FieldObject::from_data(data)?),
            ObjectType::Entry => Object::Entry(EntryObject::from_data(data)?),
            ObjectType::DataHashTable => Object::DataHashTable(HashTableObject::from_data(
                data,
                ObjectType::DataHashTable,
            )?),
            ObjectType::FieldHashTable => Object::FieldHashTable(HashTableObject::from_data(
                data,
                ObjectType::FieldHashTable,
            )?),
            ObjectType::EntryArray => Object::EntryArray(EntryArrayObject::from_data(data)?),
            ObjectType::Tag => Object::Tag(TagObject::from_data(data)?),
        })
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Unused(_) => ObjectType::Unused,
            Object::Data(_) => ObjectType::Data,
            Object::Field(_) => ObjectType::Field,
            Object::Entry(_) => ObjectType::Entry,
            Object::DataHashTable(_) => ObjectType::DataHashTable,
            Object::FieldHashTable(_) => ObjectType::FieldHashTable,
            Object::EntryArray(_) => ObjectType::EntryArray,
            Object::Tag(_) => ObjectType::Tag,
        }
    }
}
