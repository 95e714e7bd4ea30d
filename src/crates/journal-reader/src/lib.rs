//! Decoder for systemd journal files.
//!
//! This crate reads a journal from any `Read + Seek` byte source. It walks
//! the entry array chain forward, one entry at a time, and resolves an
//! entry's fields by following the offsets stored in its items.
//!
//! ```no_run
//! # fn example() -> journal_reader::Result<()> {
//! let file = std::fs::File::open("system.journal")?;
//! let mut reader = journal_reader::JournalReader::open(file)?;
//!
//! while let Some(entry) = reader.next_entry()? {
//!     if let Some(message) = reader.first_matching_field(b"MESSAGE=", entry.items())? {
//!         println!("{} {}", entry.realtime(), String::from_utf8_lossy(&message));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Core error types used throughout the crate
pub mod error;

// Journal file format decoding
pub mod file;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, JournalError, Result};

pub use file::{
    CompressionPolicy, DataObject, EntryItem, EntryObject, JournalHeader, JournalReader,
    ReaderOptions,
};
