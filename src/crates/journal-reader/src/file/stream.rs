//! Positioned reads of single objects from a seekable byte source.
//!
//! Every read starts with the 16-byte object header. Its size field is
//! validated before the rest of the object is read, so the buffer that
//! holds an object is never larger than the configured ceiling.

use crate::error::{JournalError, Result};
use crate::file::object::{
    HEADER_PREFIX_SIZE, JournalHeader, JournalObject, OBJECT_ALIGNMENT, Object, ObjectHeader,
};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::num::NonZeroU64;
use zerocopy::{FromBytes, IntoBytes};

pub struct ObjectReader<R> {
    source: BufReader<R>,
    max_object_size: u64,
    // Objects live after the file header; set once the header is read.
    arena_start: u64,
}

impl<R> std::fmt::Debug for ObjectReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("max_object_size", &self.max_object_size)
            .field("arena_start", &self.arena_start)
            .finish()
    }
}

impl<R: Read + Seek> ObjectReader<R> {
    pub fn new(source: R, buffer_capacity: usize, max_object_size: u64) -> Self {
        Self {
            source: BufReader::with_capacity(buffer_capacity, source),
            max_object_size,
            arena_start: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    pub fn max_object_size(&self) -> u64 {
        self.max_object_size
    }

    /// Moves the cursor to an absolute offset.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.source.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Moves the cursor to the object stored at `offset`.
    pub fn seek_object(&mut self, offset: NonZeroU64) -> Result<()> {
        let offset = offset.get();
        if offset % OBJECT_ALIGNMENT != 0 || offset < self.arena_start {
            return Err(JournalError::InvalidObjectLocation(offset));
        }
        self.seek(offset)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => JournalError::TruncatedInput,
            _ => JournalError::Io(err),
        })
    }

    /// Reads and validates the file header at offset 0.
    ///
    /// Header bytes beyond the layout this crate knows about are skipped,
    /// leaving the cursor at the end of the declared header.
    pub fn read_journal_header(&mut self, max_header_size: u64) -> Result<JournalHeader> {
        self.seek(0)?;

        let mut raw = [0u8; JournalHeader::SIZE];
        self.read_exact(&mut raw[..HEADER_PREFIX_SIZE])?;

        let prefix = JournalHeader::from_prefix_bytes(&raw[..HEADER_PREFIX_SIZE])?;
        prefix.validate_signature()?;
        let header_size = prefix.validate_size(max_header_size)?;

        let known = header_size.min(JournalHeader::SIZE as u64) as usize;
        self.read_exact(&mut raw[HEADER_PREFIX_SIZE..known])?;

        let trailing = header_size - known as u64;
        if trailing > 0 {
            let trailing =
                i64::try_from(trailing).map_err(|_| JournalError::InvalidHeaderSize(header_size))?;
            self.source.seek_relative(trailing)?;
        }

        let header = JournalHeader::from_prefix_bytes(&raw[..known])?;
        header.validate_flags()?;

        self.arena_start = header_size;
        Ok(header)
    }

    /// Reads the object header at the cursor. Returns the header and the
    /// number of object bytes that follow it.
    pub fn read_object_header(&mut self) -> Result<(ObjectHeader, u64)> {
        let mut raw = [0u8; ObjectHeader::SIZE];
        self.read_exact(&mut raw)?;

        let header = ObjectHeader::read_from_bytes(&raw)?;
        header.object_type()?;
        let remaining = header.validate_size(self.max_object_size)?;

        Ok((header, remaining))
    }

    /// Reads the rest of the object whose header was just read and returns
    /// its complete bytes.
    fn read_object_bytes(&mut self, header: &ObjectHeader) -> Result<Vec<u8>> {
        header.validate_size(self.max_object_size)?;

        let mut data = vec![0u8; header.size() as usize];
        data[..ObjectHeader::SIZE].copy_from_slice(header.as_bytes());
        self.read_exact(&mut data[ObjectHeader::SIZE..])?;

        Ok(data)
    }

    /// Decodes the body of a `T` whose header was just read.
    pub fn read_body<T: JournalObject>(&mut self, header: &ObjectHeader) -> Result<T> {
        let found = header.object_type()?;
        if found != T::OBJECT_TYPE {
            return Err(JournalError::UnexpectedObjectType {
                expected: T::OBJECT_TYPE,
                found,
            });
        }

        let data = self.read_object_bytes(header)?;
        T::from_data(&data)
    }

    /// Decodes the body of whatever object `header` describes.
    pub fn read_object(&mut self, header: &ObjectHeader) -> Result<Object> {
        let data = self.read_object_bytes(header)?;
        Object::from_data(&data)
    }

    pub fn read_object_at(&mut self, offset: NonZeroU64) -> Result<Object> {
        self.seek_object(offset)?;
        let (header, _) = self.read_object_header()?;
        self.read_object(&header)
    }

    /// Reads the object at `offset`, which must be a `T`.
    pub fn object_at<T: JournalObject>(&mut self, offset: NonZeroU64) -> Result<T> {
        self.seek_object(offset)?;
        let (header, _) = self.read_object_header()?;
        self.read_body(&header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::object::{DataObject, EntryObject, ObjectType};
    use std::io::Cursor;
    use zerocopy::FromZeros;
    use zerocopy::little_endian::U64;

    const DATA_OFFSET: u64 = 256;

    fn object_header(object_type: ObjectType, size: u64) -> ObjectHeader {
        let mut header = ObjectHeader::new_zeroed();
        header.type_ = object_type as u8;
        header.size = U64::new(size);
        header
    }

    fn source_with(object: &[u8]) -> Cursor<Vec<u8>> {
        let mut bytes = vec![0u8; DATA_OFFSET as usize];
        bytes.extend_from_slice(object);
        Cursor::new(bytes)
    }

    fn data_bytes(payload: &[u8]) -> Vec<u8> {
        let mut bytes = object_header(ObjectType::Data, 64 + payload.len() as u64)
            .as_bytes()
            .to_vec();
        bytes.resize(64, 0);
        bytes[16..24].copy_from_slice(&0xabcdu64.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn offset(value: u64) -> NonZeroU64 {
        NonZeroU64::new(value).unwrap()
    }

    #[test]
    fn test_object_at() {
        let mut reader = ObjectReader::new(source_with(&data_bytes(b"A=1")), 64, 1 << 20);
        let data: DataObject = reader.object_at(offset(DATA_OFFSET)).unwrap();
        assert_eq!(data.hash(), 0xabcd);
        assert_eq!(data.raw_payload(), b"A=1");
    }

    #[test]
    fn test_object_at_wrong_type() {
        let mut reader = ObjectReader::new(source_with(&data_bytes(b"A=1")), 64, 1 << 20);
        let err = reader
            .object_at::<EntryObject>(offset(DATA_OFFSET))
            .unwrap_err();
        assert!(matches!(
            err,
            JournalError::UnexpectedObjectType {
                expected: ObjectType::Entry,
                found: ObjectType::Data
            }
        ));
    }

    #[test]
    fn test_read_object_dispatch() {
        let mut reader = ObjectReader::new(source_with(&data_bytes(b"B=2")), 64, 1 << 20);
        let object = reader.read_object_at(offset(DATA_OFFSET)).unwrap();
        assert_eq!(object.object_type(), ObjectType::Data);
    }

    #[test]
    fn test_undersized_object_stops_after_header() {
        let mut bytes = object_header(ObjectType::Data, 8).as_bytes().to_vec();
        bytes.extend_from_slice(&[0xee; 64]);

        let mut reader = ObjectReader::new(source_with(&bytes), 64, 1 << 20);
        reader.seek_object(offset(DATA_OFFSET)).unwrap();
        assert!(matches!(
            reader.read_object_header(),
            Err(JournalError::InvalidObjectSize(8))
        ));

        let mut source = reader.into_inner();
        // BufReader may have prefetched, but the object body was never decoded
        assert!(source.stream_position().unwrap() >= DATA_OFFSET + 16);
    }

    #[test]
    fn test_oversized_object_rejected() {
        let bytes = object_header(ObjectType::Data, 1 << 40).as_bytes().to_vec();
        let mut reader = ObjectReader::new(source_with(&bytes), 64, 1 << 20);
        assert!(matches!(
            reader.object_at::<DataObject>(offset(DATA_OFFSET)),
            Err(JournalError::InvalidObjectSize(size)) if size == 1 << 40
        ));
    }

    #[test]
    fn test_truncated_object() {
        let bytes = data_bytes(b"MESSAGE=cut short");
        let mut reader = ObjectReader::new(source_with(&bytes[..70]), 64, 1 << 20);
        assert!(matches!(
            reader.object_at::<DataObject>(offset(DATA_OFFSET)),
            Err(JournalError::TruncatedInput)
        ));
    }

    #[test]
    fn test_misaligned_offset() {
        let mut reader = ObjectReader::new(source_with(&data_bytes(b"A=1")), 64, 1 << 20);
        assert!(matches!(
            reader.object_at::<DataObject>(offset(DATA_OFFSET + 4)),
            Err(JournalError::InvalidObjectLocation(260))
        ));
    }

    #[test]
    fn test_invalid_type_tag() {
        let mut bytes = data_bytes(b"A=1");
        bytes[0] = 0x4c;
        let mut reader = ObjectReader::new(source_with(&bytes), 64, 1 << 20);
        reader.seek_object(offset(DATA_OFFSET)).unwrap();
        assert!(matches!(
            reader.read_object_header(),
            Err(JournalError::InvalidObjectType(0x4c))
        ));
    }
}
