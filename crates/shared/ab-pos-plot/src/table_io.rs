//! Buffered sequential reading and writing of table regions


use crate::codec::{CodecError, Entry, EntryLayout};
use crate::storage::PlotFile;
use crate::types::Position;
use std::io;
use thiserror::Error;

/// Approximate size of I/O operations issued by readers and writers
pub(crate) const IO_BUFFER_SIZE: usize = 1024 * 1024;

/// Statistics of a written table
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct TableStats {
    /// Bytes of entries, excluding the end-of-table sentinel
    pub bytes: u64,
    /// Number of entries
    pub entries: u64,
}

/// Errors happening when reading a table
#[derive(Debug, Error)]
pub enum TableReadError {
    /// I/O error
    #[error("Failed to read table at offset {offset}: {error}")]
    Io {
        /// Offset of the read
        offset: u64,
        /// Low-level error
        #[source]
        error: io::Error,
    },
    /// Entry can't be decoded
    #[error("Invalid entry at offset {offset}: {error}")]
    Codec {
        /// Offset of the entry
        offset: u64,
        /// Low-level error
        #[source]
        error: CodecError,
    },
    /// File ends in the middle of an entry
    #[error("Truncated entry at offset {offset}, only {available} bytes available")]
    TruncatedEntry {
        /// Offset of the entry
        offset: u64,
        /// Bytes available until the end of the file
        available: u64,
    },
}

/// Errors happening when writing a table
#[derive(Debug, Error)]
pub enum TableWriteError {
    /// I/O error
    #[error("Failed to write table at offset {offset}: {error}")]
    Io {
        /// Offset of the write
        offset: u64,
        /// Low-level error
        #[source]
        error: io::Error,
    },
    /// Entry can't be encoded
    #[error("Invalid entry at offset {offset}: {error}")]
    Codec {
        /// Offset of the entry
        offset: u64,
        /// Low-level error
        #[source]
        error: CodecError,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ReaderState {
    Reading,
    Sentinel,
    EndOfFile,
}

/// Reads entries of a table sequentially, assigning positions in read order.
///
/// Reading stops at the end-of-table sentinel or at the end of the file, whichever comes first.
#[derive(Debug)]
pub struct TableReader<'a, F>
where
    F: ?Sized,
{
    file: &'a F,
    layout: EntryLayout,
    file_size: u64,
    /// Offset of the next byte to be loaded into the buffer
    file_offset: u64,
    buffer: Vec<u8>,
    buffer_offset: usize,
    next_position: Position,
    state: ReaderState,
}

impl<'a, F> TableReader<'a, F>
where
    F: PlotFile + ?Sized,
{
    /// Create a new reader of a table starting at `start`
    pub fn new(file: &'a F, layout: EntryLayout, start: u64) -> Result<Self, TableReadError> {
        let file_size = file.size().map_err(|error| TableReadError::Io {
            offset: start,
            error,
        })?;

        Ok(Self {
            file,
            layout,
            file_size,
            file_offset: start,
            buffer: Vec::new(),
            buffer_offset: 0,
            next_position: Position::ZERO,
            state: ReaderState::Reading,
        })
    }

    /// Layout of entries
    #[inline]
    pub fn layout(&self) -> &EntryLayout {
        &self.layout
    }

    /// Whether reading stopped at the end-of-table sentinel (as opposed to the end of the file)
    #[inline]
    pub fn reached_sentinel(&self) -> bool {
        self.state == ReaderState::Sentinel
    }

    /// Bytes of entries read so far, excluding the sentinel
    #[inline]
    pub fn bytes_read(&self) -> u64 {
        self.next_position.as_u64() * self.layout.entry_len() as u64
    }

    /// Read the next entry, `None` once the sentinel or the end of the file was reached
    pub fn next_entry(&mut self) -> Result<Option<(Position, Entry)>, TableReadError> {
        if self.state != ReaderState::Reading {
            return Ok(None);
        }

        let entry_len = self.layout.entry_len();
        if self.buffer_offset == self.buffer.len() && !self.refill()? {
            self.state = ReaderState::EndOfFile;
            return Ok(None);
        }

        let offset = self.file_offset - (self.buffer.len() - self.buffer_offset) as u64;
        let bytes = &self.buffer[self.buffer_offset..][..entry_len];
        self.buffer_offset += entry_len;

        if self.layout.is_sentinel(bytes) {
            self.state = ReaderState::Sentinel;
            return Ok(None);
        }

        let entry = self
            .layout
            .decode(bytes)
            .map_err(|error| TableReadError::Codec { offset, error })?;
        let position = self.next_position;
        self.next_position = position.next();

        Ok(Some((position, entry)))
    }

    /// Load the next chunk of whole entries, returns `false` at the end of the file
    fn refill(&mut self) -> Result<bool, TableReadError> {
        let entry_len = self.layout.entry_len();
        let remaining = self.file_size.saturating_sub(self.file_offset);
        if remaining == 0 {
            return Ok(false);
        }
        if remaining < entry_len as u64 {
            return Err(TableReadError::TruncatedEntry {
                offset: self.file_offset,
                available: remaining,
            });
        }

        let max_chunk = (IO_BUFFER_SIZE / entry_len).max(1) * entry_len;
        let chunk = remaining.min(max_chunk as u64) as usize / entry_len * entry_len;
        self.buffer.resize(chunk, 0);
        self.file
            .read_exact_at(&mut self.buffer, self.file_offset)
            .map_err(|error| TableReadError::Io {
                offset: self.file_offset,
                error,
            })?;
        self.file_offset += chunk as u64;
        self.buffer_offset = 0;

        Ok(true)
    }
}

/// Writes entries of a table sequentially, followed by the end-of-table sentinel on
/// [`TableWriter::finish()`]
#[derive(Debug)]
pub struct TableWriter<'a, F>
where
    F: ?Sized,
{
    file: &'a F,
    layout: EntryLayout,
    start: u64,
    buffer: Vec<u8>,
    /// Bytes that already reached the file
    flushed: u64,
    entries: u64,
}

impl<'a, F> TableWriter<'a, F>
where
    F: PlotFile + ?Sized,
{
    /// Create a new writer of a table starting at `start`
    pub fn new(file: &'a F, layout: EntryLayout, start: u64) -> Self {
        Self {
            file,
            layout,
            start,
            buffer: Vec::with_capacity(IO_BUFFER_SIZE + layout.entry_len()),
            flushed: 0,
            entries: 0,
        }
    }

    /// Bytes of entries that were written into the file so far
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.flushed
    }

    /// Number of entries accepted so far
    #[inline]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Append an entry
    pub fn write(&mut self, entry: &Entry) -> Result<(), TableWriteError> {
        let buffer_len = self.buffer.len();
        self.buffer.resize(buffer_len + self.layout.entry_len(), 0);

        if let Err(error) = self.layout.encode(entry, &mut self.buffer[buffer_len..]) {
            self.buffer.truncate(buffer_len);
            return Err(TableWriteError::Codec {
                offset: self.start + self.flushed + buffer_len as u64,
                error,
            });
        }
        self.entries += 1;

        if self.buffer.len() >= IO_BUFFER_SIZE {
            self.flush()?;
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), TableWriteError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let offset = self.start + self.flushed;
        self.file
            .write_all_at(&self.buffer, offset)
            .map_err(|error| TableWriteError::Io { offset, error })?;
        self.flushed += self.buffer.len() as u64;
        self.buffer.clear();

        Ok(())
    }

    /// Flush remaining entries and write the end-of-table sentinel
    pub fn finish(mut self) -> Result<TableStats, TableWriteError> {
        self.flush()?;

        let offset = self.start + self.flushed;
        let mut sentinel = vec![0; self.layout.entry_len()];
        self.layout
            .write_sentinel(&mut sentinel)
            .map_err(|error| TableWriteError::Codec { offset, error })?;
        self.file
            .write_all_at(&sentinel, offset)
            .map_err(|error| TableWriteError::Io { offset, error })?;

        Ok(TableStats {
            bytes: self.flushed,
            entries: self.entries,
        })
    }
}
