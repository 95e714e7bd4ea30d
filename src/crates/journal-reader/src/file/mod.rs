// Modules - keep some public for advanced usage
pub mod hash;
mod object;
pub mod options;
pub mod reader;
pub mod resolver;
pub mod stream;

// Core functionality
pub use options::{CompressionPolicy, ReaderOptions};
pub use reader::{Entries, JournalReader};
pub use resolver::FieldResolver;
pub use stream::ObjectReader;

// Decoded objects and their on-disk layouts
pub use object::{
    DataObject, DataObjectHeader, EntryArrayObject, EntryArrayObjectHeader, EntryItem,
    EntryObject, EntryObjectHeader, FieldObject, FieldObjectHeader, HashItem, HashTableObject,
    JournalHeader, JournalObject, Object, ObjectHeader, ObjectType, TagObject, TagObjectHeader,
};

// Flags, states and format constants
pub use object::{
    HEADER_PREFIX_SIZE, HEADER_SIZE_MIN, HeaderCompatibleFlags, HeaderIncompatibleFlags,
    JOURNAL_SIGNATURE, JournalState, OBJECT_ALIGNMENT, ObjectFlags, TAG_LENGTH,
};

pub use crate::file::hash::PayloadHasher;
