//! Streaming reader for gzip-compressed tar archives.
//!
//! # Invariants
//! - The stream is read sequentially, exactly once; no seeks.
//! - Only the current header block and small metadata records (GNU long
//!   names, PAX headers) are buffered. Entry payloads are read straight from
//!   the decoder through [`ArchiveEntry`].
//! - Before the next header is read, any unread remainder of the previous
//!   entry and its block padding are skipped, so callers may stop reading an
//!   entry early.
//! - Once the reader reports a [`StreamCorruptError`] it stays poisoned.
//!
//! # Algorithm
//! - Read 512-byte header blocks; two zero blocks (or EOF at a header
//!   boundary) end the archive.
//! - GNU long-name (`L`) and PAX `path=` records rename the next entry only.
//! - Yield regular files; skip directories, links, devices and anything else.

mod header;

use std::io::{self, Read};

use flate2::read::MultiGzDecoder;
use tracing::trace;

use crate::error::StreamCorruptError;
use header::{EntryKind, HeaderBlock, TAR_BLOCK_LEN};

pub use header::TAR_BLOCK_LEN as BLOCK_LEN;

/// Upper bound for a single GNU long-name or PAX record.
const MAX_METADATA_RECORD: u64 = 1024 * 1024;
const DISCARD_LEN: usize = 8 * 1024;

#[derive(Debug)]
enum ReaderState {
    Streaming,
    Finished,
    Corrupt(StreamCorruptError),
}

/// Forward-only sequence of the regular-file entries of one archive.
///
/// This is a lending iterator: each [`ArchiveEntry`] borrows the reader, so
/// only one entry is live at a time.
pub struct ArchiveStreamReader<R> {
    input: R,
    header: HeaderBlock,
    block_index: u64,
    state: ReaderState,

    // Unread payload of the current entry, then its padding.
    remaining: u64,
    padding: u64,
    entry_size: u64,
    entry_name: String,

    // Per-file overrides (apply to next real entry only).
    gnu_longname: Option<Vec<u8>>,
    pax_path: Option<Vec<u8>>,

    entries_seen: u64,
    discard: Box<[u8; DISCARD_LEN]>,
}

impl<R> std::fmt::Debug for ArchiveStreamReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStreamReader")
            .field("state", &self.state)
            .field("block_index", &self.block_index)
            .field("entries_seen", &self.entries_seen)
            .finish_non_exhaustive()
    }
}

impl<R: Read> ArchiveStreamReader<MultiGzDecoder<R>> {
    /// Reader over a gzip-compressed tar stream. Concatenated gzip members
    /// are treated as one stream.
    pub fn gzip(input: R) -> Self {
        Self::new(MultiGzDecoder::new(input))
    }
}

impl<R: Read> ArchiveStreamReader<R> {
    /// Reader over an already-decompressed tar stream.
    pub fn new(input: R) -> Self {
        Self {
            input,
            header: [0; TAR_BLOCK_LEN],
            block_index: 0,
            state: ReaderState::Streaming,
            remaining: 0,
            padding: 0,
            entry_size: 0,
            entry_name: String::new(),
            gnu_longname: None,
            pax_path: None,
            entries_seen: 0,
            discard: Box::new([0; DISCARD_LEN]),
        }
    }

    /// Regular-file entries yielded so far.
    pub fn entries_seen(&self) -> u64 {
        self.entries_seen
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, ReaderState::Finished)
    }

    /// Advances to the next regular-file entry.
    ///
    /// Returns `Ok(None)` once the archive has ended, and keeps doing so.
    pub fn next_entry(
        &mut self,
    ) -> Result<Option<ArchiveEntry<'_, R>>, StreamCorruptError> {
        match &self.state {
            ReaderState::Finished => return Ok(None),
            ReaderState::Corrupt(err) => return Err(err.clone()),
            ReaderState::Streaming => {}
        }

        match self.advance() {
            Ok(true) => Ok(Some(ArchiveEntry { reader: self })),
            Ok(false) => {
                self.state = ReaderState::Finished;
                Ok(None)
            }
            Err(err) => {
                self.state = ReaderState::Corrupt(err.clone());
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> Result<bool, StreamCorruptError> {
        self.skip_current()?;

        let mut zero_blocks = 0u8;
        loop {
            if !self.read_header()? {
                return Ok(false);
            }
            let header_block = self.block_index;
            self.block_index += 1;

            if header::is_zero_block(&self.header) {
                zero_blocks += 1;
                if zero_blocks >= 2 {
                    return Ok(false);
                }
                continue;
            }
            zero_blocks = 0;

            if !header::checksum_matches(&self.header) {
                return Err(StreamCorruptError::InvalidHeader {
                    block: header_block,
                    reason: "checksum mismatch",
                });
            }
            let size = header::entry_size(&self.header).ok_or(
                StreamCorruptError::InvalidHeader {
                    block: header_block,
                    reason: "unparsable size field",
                },
            )?;
            let padding = header::block_padding(size);
            let span = size.checked_add(padding).ok_or(
                StreamCorruptError::InvalidHeader {
                    block: header_block,
                    reason: "size field out of range",
                },
            )?;
            let typeflag = header::typeflag(&self.header);
            // `block_index` always points at the next header block.
            self.block_index =
                self.block_index.saturating_add(span / TAR_BLOCK_LEN as u64);

            match EntryKind::from_typeflag(typeflag) {
                EntryKind::GnuLongName => {
                    let mut name =
                        self.read_metadata(size, padding, header_block)?;
                    header::trim_record_terminators(&mut name);
                    self.gnu_longname = Some(name);
                }
                EntryKind::PaxLocal => {
                    let records =
                        self.read_metadata(size, padding, header_block)?;
                    self.pax_path = header::pax_path(&records);
                }
                EntryKind::PaxGlobal => {
                    // Global records are consumed and ignored.
                    self.read_metadata(size, padding, header_block)?;
                }
                EntryKind::Regular => {
                    let name = self.resolve_name();
                    self.entry_name = String::from_utf8_lossy(&name).into_owned();
                    self.entry_size = size;
                    self.remaining = size;
                    self.padding = padding;
                    self.entries_seen += 1;
                    return Ok(true);
                }
                EntryKind::Other(flag) => {
                    let name = self.resolve_name();
                    trace!(
                        target: "ingest::archive",
                        entry = %String::from_utf8_lossy(&name),
                        typeflag = %char::from(flag),
                        "skipping non-regular archive entry"
                    );
                    self.remaining = size;
                    self.padding = padding;
                    self.skip_current()?;
                }
            }
        }
    }

    fn resolve_name(&mut self) -> Vec<u8> {
        let from_header = header::header_name(&self.header);
        let pax = self.pax_path.take();
        let gnu = self.gnu_longname.take();
        pax.or(gnu).unwrap_or(from_header)
    }

    /// Reads one header block. `Ok(false)` means clean EOF at a boundary.
    fn read_header(&mut self) -> Result<bool, StreamCorruptError> {
        let mut filled = 0;
        while filled < TAR_BLOCK_LEN {
            match self.input.read(&mut self.header[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(StreamCorruptError::Truncated("header")),
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    return Err(StreamCorruptError::from_io(&err, "header"));
                }
            }
        }
        Ok(true)
    }

    fn read_metadata(
        &mut self,
        size: u64,
        padding: u64,
        block: u64,
    ) -> Result<Vec<u8>, StreamCorruptError> {
        if size > MAX_METADATA_RECORD {
            return Err(StreamCorruptError::InvalidHeader {
                block,
                reason: "metadata record too large",
            });
        }

        let mut record = Vec::with_capacity(size as usize);
        (&mut self.input)
            .take(size)
            .read_to_end(&mut record)
            .map_err(|err| StreamCorruptError::from_io(&err, "metadata"))?;
        if (record.len() as u64) < size {
            return Err(StreamCorruptError::Truncated("metadata"));
        }

        self.remaining = 0;
        self.padding = padding;
        self.skip_current()?;
        Ok(record)
    }

    /// Discards whatever is left of the current entry plus its padding.
    fn skip_current(&mut self) -> Result<(), StreamCorruptError> {
        let mut left = self.remaining.saturating_add(self.padding);
        while left > 0 {
            let step = left.min(DISCARD_LEN as u64) as usize;
            match self.input.read(&mut self.discard[..step]) {
                Ok(0) => return Err(StreamCorruptError::Truncated("entry")),
                Ok(n) => left -= n as u64,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    return Err(StreamCorruptError::from_io(&err, "entry"));
                }
            }
        }

        self.remaining = 0;
        self.padding = 0;
        Ok(())
    }
}

/// One regular-file entry. Reading yields exactly the entry's payload.
pub struct ArchiveEntry<'a, R> {
    reader: &'a mut ArchiveStreamReader<R>,
}

impl<R> std::fmt::Debug for ArchiveEntry<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("name", &self.reader.entry_name)
            .field("size", &self.reader.entry_size)
            .field("remaining", &self.reader.remaining)
            .finish()
    }
}

impl<R> ArchiveEntry<'_, R> {
    /// Entry path inside the archive (lossy UTF-8).
    pub fn name(&self) -> &str {
        &self.reader.entry_name
    }

    pub fn size(&self) -> u64 {
        self.reader.entry_size
    }
}

impl<R: Read> Read for ArchiveEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.reader.remaining;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.reader.input.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive entry truncated",
            ));
        }
        self.reader.remaining -= n as u64;
        Ok(n)
    }
}
