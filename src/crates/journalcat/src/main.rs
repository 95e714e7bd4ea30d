mod output;

use anyhow::{Context, Result, bail};
use clap::Parser;
use journal_reader::file::{HeaderCompatibleFlags, HeaderIncompatibleFlags, JournalHeader};
use journal_reader::{JournalReader, ReaderOptions};
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, Write};
use std::num::NonZeroU64;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Parser)]
#[command(name = "journalcat", about = "Print one field of every entry in a journal file")]
struct Cli {
    /// Journal file to read
    file: PathBuf,

    /// Field to print for each entry
    #[arg(short, long, default_value = "MESSAGE")]
    field: String,

    /// Show at most N entries
    #[arg(short = 'n', long)]
    lines: Option<usize>,

    /// Timestamps in UTC
    #[arg(long)]
    utc: bool,

    /// Recompute payload hashes while resolving fields
    #[arg(long)]
    verify: bool,

    /// Show journal file header info
    #[arg(long)]
    header: bool,

    /// Dump the object stored at OFFSET
    #[arg(long, value_name = "OFFSET")]
    object: Option<u64>,
}

/// Logs go to stderr; RUST_LOG overrides the default filter.
fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn cmd_header(hdr: &JournalHeader) -> Result<()> {
    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());

    writeln!(
        w,
        "File ID:          {}",
        uuid::Uuid::from_bytes(hdr.file_id).as_hyphenated()
    )?;
    writeln!(
        w,
        "Machine ID:       {}",
        uuid::Uuid::from_bytes(hdr.machine_id).as_hyphenated()
    )?;
    writeln!(
        w,
        "Boot ID (tail):   {}",
        uuid::Uuid::from_bytes(hdr.tail_entry_boot_id).as_hyphenated()
    )?;
    writeln!(
        w,
        "Seqnum ID:        {}",
        uuid::Uuid::from_bytes(hdr.seqnum_id).as_hyphenated()
    )?;
    match hdr.state() {
        Ok(state) => writeln!(w, "State:            {state}")?,
        Err(raw) => writeln!(w, "State:            unknown ({raw})")?,
    }

    writeln!(
        w,
        "Compatible flags: {:#010x}{}{}",
        hdr.compatible_flags.get(),
        flag_name(hdr.has_compatible_flag(HeaderCompatibleFlags::Sealed), "SEALED"),
        flag_name(
            hdr.has_compatible_flag(HeaderCompatibleFlags::TailEntryBootId),
            "TAIL_ENTRY_BOOT_ID"
        ),
    )?;
    writeln!(
        w,
        "Incompatible flags: {:#010x}{}{}{}{}",
        hdr.incompatible_flags.get(),
        flag_name(
            hdr.has_incompatible_flag(HeaderIncompatibleFlags::CompressedXz),
            "COMPRESSED-XZ"
        ),
        flag_name(
            hdr.has_incompatible_flag(HeaderIncompatibleFlags::CompressedLz4),
            "COMPRESSED-LZ4"
        ),
        flag_name(
            hdr.has_incompatible_flag(HeaderIncompatibleFlags::CompressedZstd),
            "COMPRESSED-ZSTD"
        ),
        flag_name(
            hdr.has_incompatible_flag(HeaderIncompatibleFlags::KeyedHash),
            "KEYED-HASH"
        ),
    )?;

    writeln!(w, "Header size:      {}", hdr.header_size.get())?;
    writeln!(w, "Arena size:       {}", hdr.arena_size.get())?;
    writeln!(w, "Objects:          {}", hdr.n_objects.get())?;
    writeln!(w, "Entries:          {}", hdr.n_entries.get())?;
    writeln!(w, "Entry array:      {}", hdr.entry_array_offset.get())?;

    writeln!(w, "Head seqnum:      {}", hdr.head_entry_seqnum.get())?;
    writeln!(w, "Tail seqnum:      {}", hdr.tail_entry_seqnum.get())?;
    writeln!(w, "Head realtime:    {}", hdr.head_entry_realtime.get())?;
    writeln!(w, "Tail realtime:    {}", hdr.tail_entry_realtime.get())?;
    writeln!(w, "Tail monotonic:   {}", hdr.tail_entry_monotonic.get())?;

    w.flush()?;
    Ok(())
}

fn flag_name(set: bool, name: &str) -> String {
    if set { format!(" {name}") } else { String::new() }
}

fn cmd_object(reader: &mut JournalReader<File>, offset: u64) -> Result<()> {
    let offset = NonZeroU64::new(offset).context("object offset must be non-zero")?;
    let object = reader
        .object_at(offset)
        .with_context(|| format!("cannot read object at offset {offset}"))?;

    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());
    writeln!(w, "{object:#?}")?;
    w.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    init_tracing("warn");

    let cli = Cli::parse();

    if cli.field.is_empty() || cli.field.contains('=') {
        bail!("invalid field name: {:?}", cli.field);
    }

    let file = File::open(&cli.file)
        .with_context(|| format!("cannot open journal file: {}", cli.file.display()))?;
    let mut reader = ReaderOptions::new()
        .with_payload_hash_verification(cli.verify)
        .open(file)
        .with_context(|| format!("cannot read journal header: {}", cli.file.display()))?;

    if cli.header {
        return cmd_header(reader.header());
    }
    if let Some(offset) = cli.object {
        return cmd_object(&mut reader, offset);
    }

    debug!(
        path = %cli.file.display(),
        entries = reader.header().n_entries.get(),
        field = %cli.field,
        "reading journal"
    );

    let prefix = format!("{}=", cli.field);
    let limit = cli.lines.unwrap_or(usize::MAX);

    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());
    let count = cmd_entries(&mut reader, prefix.as_bytes(), limit, cli.utc, &mut w)?;
    if count == limit {
        debug!(limit, "line limit reached");
    }

    w.flush()?;
    Ok(())
}

/// Prints `prefix` values of up to `limit` entries and returns how many
/// lines were written.
fn cmd_entries<R: Read + Seek>(
    reader: &mut JournalReader<R>,
    prefix: &[u8],
    limit: usize,
    utc: bool,
    w: &mut impl Write,
) -> Result<usize> {
    let mut count = 0usize;

    while count < limit {
        let Some(entry) = reader
            .next_entry()
            .context("cannot read next journal entry")?
        else {
            break;
        };

        let value = reader
            .first_matching_field(prefix, entry.items())
            .with_context(|| format!("cannot resolve fields of entry {}", entry.seqnum()))?;

        if let Some(value) = value {
            output::write_line(w, entry.realtime(), &value, utc)?;
            count += 1;
        }
    }

    Ok(count)
}
