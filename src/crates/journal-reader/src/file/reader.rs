use crate::error::{JournalError, Result};
use crate::file::object::{EntryArrayObject, EntryItem, EntryObject, JournalHeader, Object};
use crate::file::options::ReaderOptions;
use crate::file::resolver::FieldResolver;
use crate::file::stream::ObjectReader;
use std::io::{Read, Seek};
use std::num::NonZeroU64;
use tracing::{debug, trace, warn};

#[derive(Debug)]
enum TraversalState {
    /// No entry array is loaded; the next one lives at `next_array`.
    HeaderRead { next_array: Option<NonZeroU64> },
    /// Entries are handed out from the front of the array at `offset`.
    PositionedAtArray {
        offset: NonZeroU64,
        array: EntryArrayObject,
    },
    /// The chain has been walked to its end.
    Exhausted,
    /// An earlier call failed; the rest of the chain is not trusted.
    Aborted,
}

///
/// A forward-only reader for a single systemd journal file.
///
/// The reader owns the byte source and its cursor. Entries are produced by
/// walking the entry array chain that starts at the header's
/// `entry_array_offset`, in on-disk order, one call at a time. Field lookups
/// through [`JournalReader::first_matching_field`] reposition the same
/// cursor; `next_entry` always seeks before reading, so the two can be
/// interleaved freely.
///
/// Independent traversals of one file need independent readers, each with
/// its own handle.
pub struct JournalReader<R> {
    objects: ObjectReader<R>,
    header: JournalHeader,
    resolver: FieldResolver,
    state: TraversalState,
    entries_read: u64,
}

impl<R> std::fmt::Debug for JournalReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReader")
            .field("objects", &self.objects)
            .field("state", &self.state)
            .field("entries_read", &self.entries_read)
            .finish()
    }
}

impl<R: Read + Seek> JournalReader<R> {
    /// Opens a journal with the default [`ReaderOptions`].
    pub fn open(source: R) -> Result<Self> {
        Self::with_options(source, ReaderOptions::default())
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn with_options(source: R, options: ReaderOptions) -> Result<Self> {
        let mut objects = ObjectReader::new(
            source,
            options.buffer_capacity(),
            options.max_object_size(),
        );
        let header = objects.read_journal_header(options.max_header_size())?;

        let header_size = header.header_size.get();
        debug!(
            header_size,
            trailing = header_size.saturating_sub(JournalHeader::SIZE as u64),
            objects = header.n_objects.get(),
            entries = header.n_entries.get(),
            "opened journal"
        );

        let resolver = FieldResolver::new(&header, &options);
        let state = TraversalState::HeaderRead {
            next_array: header.entry_array_offset(),
        };

        Ok(Self {
            objects,
            header,
            resolver,
            state,
            entries_read: 0,
        })
    }

    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    /// Number of entries returned so far.
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, TraversalState::Exhausted)
    }

    pub fn into_inner(self) -> R {
        self.objects.into_inner()
    }

    /// Returns the next entry in on-disk order, or `None` once the entry
    /// array chain is exhausted. Every call after that returns `None` too.
    ///
    /// Any failure is final: later calls return
    /// [`JournalError::TraversalAborted`].
    pub fn next_entry(&mut self) -> Result<Option<EntryObject>> {
        let result = self.advance();
        if result.is_err() {
            self.state = TraversalState::Aborted;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<EntryObject>> {
        loop {
            match &mut self.state {
                TraversalState::Exhausted => return Ok(None),
                TraversalState::Aborted => return Err(JournalError::TraversalAborted),
                TraversalState::HeaderRead { next_array } => {
                    let Some(offset) = *next_array else {
                        self.finish();
                        return Ok(None);
                    };

                    trace!(offset = offset.get(), "loading entry array");
                    let array = self.objects.object_at::<EntryArrayObject>(offset)?;
                    self.state = TraversalState::PositionedAtArray { offset, array };
                }
                TraversalState::PositionedAtArray { offset, array } => {
                    if let Some(entry_offset) = array.pop_front() {
                        let entry = self.objects.object_at::<EntryObject>(entry_offset)?;
                        self.entries_read += 1;
                        return Ok(Some(entry));
                    }

                    let next_array = array.next_entry_array_offset();
                    if let Some(next) = next_array {
                        if next <= *offset {
                            return Err(JournalError::InvalidEntryArrayChain(next.get()));
                        }
                    }
                    self.state = TraversalState::HeaderRead { next_array };
                }
            }
        }
    }

    fn finish(&mut self) {
        let expected = self.header.n_entries.get();
        if self.entries_read != expected {
            warn!(
                read = self.entries_read,
                expected, "entry count differs from journal header"
            );
        }
        self.state = TraversalState::Exhausted;
    }

    /// Returns the value of the first data object among `items` whose
    /// payload starts with `prefix`, with the prefix stripped.
    pub fn first_matching_field(
        &mut self,
        prefix: &[u8],
        items: &[EntryItem],
    ) -> Result<Option<Vec<u8>>> {
        self.resolver
            .first_matching_field(&mut self.objects, prefix, items)
    }

    /// Decodes whatever object is stored at `offset`.
    pub fn object_at(&mut self, offset: NonZeroU64) -> Result<Object> {
        self.objects.read_object_at(offset)
    }

    /// Iterates over the remaining entries.
    ///
    /// The iterator is single pass: entries it yields are consumed from the
    /// reader and cannot be revisited, and it does not restart from the
    /// head of the chain.
    pub fn entries(&mut self) -> Entries<'_, R> {
        Entries {
            reader: self,
            done: false,
        }
    }
}

/// Forward-only iterator over the entries of a [`JournalReader`].
///
/// Stops for good after the end of the chain or the first error.
pub struct Entries<'a, R> {
    reader: &'a mut JournalReader<R>,
    done: bool,
}

impl<R: Read + Seek> Entries<'_, R> {
    /// See [`JournalReader::first_matching_field`].
    pub fn first_matching_field(
        &mut self,
        prefix: &[u8],
        items: &[EntryItem],
    ) -> Result<Option<Vec<u8>>> {
        self.reader.first_matching_field(prefix, items)
    }
}

impl<R: Read + Seek> Iterator for Entries<'_, R> {
    type Item = Result<EntryObject>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: Read + Seek> std::iter::FusedIterator for Entries<'_, R> {}
