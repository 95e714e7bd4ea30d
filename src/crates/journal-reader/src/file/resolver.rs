use crate::error::{JournalError, Result};
use crate::file::hash::PayloadHasher;
use crate::file::object::{DataObject, EntryItem, JournalHeader, ObjectType};
use crate::file::options::{CompressionPolicy, ReaderOptions};
use crate::file::stream::ObjectReader;
use std::borrow::Cow;
use std::io::{Read, Seek};
use std::num::NonZeroU64;
use tracing::debug;

/// Looks up field values among the data objects referenced by an entry.
///
/// Holds configuration only: every lookup seeks to and decodes each
/// referenced object afresh.
#[derive(Debug, Clone)]
pub struct FieldResolver {
    compression: CompressionPolicy,
    payload_hasher: Option<PayloadHasher>,
    max_payload_size: usize,
}

impl FieldResolver {
    pub fn new(header: &JournalHeader, options: &ReaderOptions) -> Self {
        let payload_hasher = options
            .verify_payload_hash()
            .then(|| PayloadHasher::for_header(header));

        Self {
            compression: options.compression_policy(),
            payload_hasher,
            max_payload_size: usize::try_from(options.max_object_size()).unwrap_or(usize::MAX),
        }
    }

    /// Scans `items` in the order given and returns the bytes that follow
    /// `prefix` in the first matching data object's payload.
    ///
    /// References to objects that are not data objects are skipped. A data
    /// object whose stored hash differs from the item's hash fails the
    /// lookup with [`JournalError::HashMismatch`].
    pub fn first_matching_field<R: Read + Seek>(
        &self,
        objects: &mut ObjectReader<R>,
        prefix: &[u8],
        items: &[EntryItem],
    ) -> Result<Option<Vec<u8>>> {
        for item in items {
            let offset = NonZeroU64::new(item.object_offset())
                .ok_or(JournalError::InvalidObjectLocation(0))?;

            objects.seek_object(offset)?;
            let (header, _) = objects.read_object_header()?;
            if header.object_type()? != ObjectType::Data {
                debug!(
                    offset = offset.get(),
                    type_ = header.type_,
                    "skipping entry item that is not a data object"
                );
                continue;
            }

            let data: DataObject = objects.read_body(&header)?;
            if data.hash() != item.hash() {
                return Err(JournalError::HashMismatch {
                    offset: offset.get(),
                    expected: item.hash(),
                    found: data.hash(),
                });
            }

            let payload = self.payload(offset, &data)?;

            if let Some(hasher) = &self.payload_hasher {
                if hasher.hash(&payload) != data.hash() {
                    return Err(JournalError::PayloadHashMismatch {
                        offset: offset.get(),
                        stored: data.hash(),
                    });
                }
            }

            if let Some(value) = payload.strip_prefix(prefix) {
                return Ok(Some(value.to_vec()));
            }
        }

        Ok(None)
    }

    fn payload<'a>(&self, offset: NonZeroU64, data: &'a DataObject) -> Result<Cow<'a, [u8]>> {
        if !data.is_compressed() {
            return Ok(Cow::Borrowed(data.raw_payload()));
        }

        match self.compression {
            CompressionPolicy::Reject => Err(JournalError::CompressedPayload(offset.get())),
            CompressionPolicy::Decompress => {
                let mut buf = Vec::new();
                data.decompress(&mut buf, self.max_payload_size)?;
                Ok(Cow::Owned(buf))
            }
        }
    }
}
