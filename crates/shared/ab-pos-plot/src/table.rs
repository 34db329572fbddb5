//! Construction of tables 2 to 7 out of their sorted parent table.
//!
//! The parent table is streamed in `y` order and split into buckets by [`bucket_id()`]. Whenever
//! two adjacent buckets are complete, they are handed to [`FindMatches`] and every match produces
//! one entry of the new table.

#[cfg(test)]
mod tests;

use crate::at::AtError;
use crate::codec::{CodecError, Entry, EntryLayout};
use crate::constants::NUM_TABLES;
use crate::fx::FxCalculator;
use crate::matching::{BucketEntry, FindMatches, Match};
use crate::params::bucket_id;
use crate::storage::PlotFile;
use crate::table_io::{TableReadError, TableReader, TableStats, TableWriteError, TableWriter};
use core::mem;
use thiserror::Error;

/// Errors of the bucket window
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum BucketError {
    /// Entry belongs to a bucket that was already processed
    #[error("Parent table is not sorted: bucket {bucket_id} after bucket {current_bucket_id}")]
    Unsorted {
        /// Bucket of the offending entry
        bucket_id: u64,
        /// Current left bucket
        current_bucket_id: u64,
    },
    /// Bucket has more entries than allowed
    #[error("Bucket {bucket_id} exceeds {max_bucket_size} entries")]
    BucketTooLarge {
        /// Bucket that is too large
        bucket_id: u64,
        /// Configured limit
        max_bucket_size: usize,
    },
}

/// Errors happening when building a table
#[derive(Debug, Error)]
pub enum TableError {
    /// Invalid table parameters
    #[error("Invalid table layout: {0}")]
    Layout(#[source] CodecError),
    /// Failed to read parent table
    #[error("Read error: {0}")]
    Read(#[from] TableReadError),
    /// Failed to write the table
    #[error("Write error: {0}")]
    Write(#[from] TableWriteError),
    /// Parent table has invalid bucket structure
    #[error("Bucket error: {0}")]
    Bucket(#[from] BucketError),
    /// Hashing failed
    #[error("Hash error: {0}")]
    Hash(#[from] AtError),
}

/// Failed table construction, no rollback happens
#[derive(Debug, Error)]
#[error("Table construction failed after {bytes_written} bytes were written: {error}")]
pub struct TableBuildError {
    /// Bytes of entries that reached the file before the failure
    pub bytes_written: u64,
    /// Cause of the failure
    #[source]
    pub error: TableError,
}

/// Two adjacent complete buckets ready for matching
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BucketPair {
    /// Bucket with the smaller id
    pub left: Vec<BucketEntry>,
    /// Bucket with id one larger than the left bucket
    pub right: Vec<BucketEntry>,
}

/// Window of two adjacent buckets over a stream of entries sorted by `y`.
///
/// The window holds the left bucket (with id [`Self::bucket_id()`]) and the right bucket (with the
/// next id). An entry outside of both completes the window: the pair is emitted if both buckets
/// are non-empty, after which the window either slides by one bucket or restarts at the bucket of
/// the new entry. The last pair is emitted by [`Self::flush()`].
#[derive(Debug, Clone)]
pub struct BucketWindow {
    bucket_id: u64,
    left: Vec<BucketEntry>,
    right: Vec<BucketEntry>,
    max_bucket_size: usize,
}

impl BucketWindow {
    /// Create an empty window starting at bucket 0
    pub fn new(max_bucket_size: usize) -> Self {
        Self {
            bucket_id: 0,
            left: Vec::new(),
            right: Vec::new(),
            max_bucket_size,
        }
    }

    /// Id of the left bucket
    #[inline]
    pub fn bucket_id(&self) -> u64 {
        self.bucket_id
    }

    /// Add the next entry, returns a pair of buckets if the entry completed one
    pub fn push(&mut self, entry: BucketEntry) -> Result<Option<BucketPair>, BucketError> {
        let entry_bucket_id = bucket_id(entry.y);

        // A left bucket entry after right bucket entries is just as out of order
        if entry_bucket_id < self.bucket_id
            || (entry_bucket_id == self.bucket_id && !self.right.is_empty())
        {
            return Err(BucketError::Unsorted {
                bucket_id: entry_bucket_id,
                current_bucket_id: self.bucket_id,
            });
        }

        let mut completed = None;
        if entry_bucket_id > self.bucket_id + 1 {
            if !self.left.is_empty() && !self.right.is_empty() {
                completed = Some(BucketPair {
                    left: mem::take(&mut self.left),
                    right: self.right.clone(),
                });
            }

            if entry_bucket_id == self.bucket_id + 2 {
                self.left = mem::take(&mut self.right);
                self.bucket_id += 1;
            } else {
                self.left.clear();
                self.right.clear();
                self.bucket_id = entry_bucket_id;
            }
        }

        // The entry now belongs to either the left or the right bucket of the updated window
        let bucket = if entry_bucket_id == self.bucket_id {
            &mut self.left
        } else {
            &mut self.right
        };
        if bucket.len() == self.max_bucket_size {
            return Err(BucketError::BucketTooLarge {
                bucket_id: entry_bucket_id,
                max_bucket_size: self.max_bucket_size,
            });
        }
        bucket.push(entry);

        Ok(completed)
    }

    /// Finish the stream, returns the last pair of buckets if both are non-empty
    pub fn flush(self) -> Option<BucketPair> {
        (!self.left.is_empty() && !self.right.is_empty()).then_some(BucketPair {
            left: self.left,
            right: self.right,
        })
    }
}

/// Writer of new entries produced by bucket pairs
struct PairProcessor<'a, F, M>
where
    F: ?Sized,
{
    writer: TableWriter<'a, F>,
    fx: &'a FxCalculator,
    matcher: &'a mut M,
    table_number: u8,
    matches: Vec<Match>,
}

impl<F, M> PairProcessor<'_, F, M>
where
    F: PlotFile + ?Sized,
    M: FindMatches,
{
    fn process(&mut self, pair: &BucketPair) -> Result<(), TableError> {
        self.matches.clear();
        self.matcher.find_matches(&pair.left, &pair.right, &mut self.matches);

        for m in &self.matches {
            let left = pair.left[m.left];
            let right = pair.right[m.right];
            let (y, metadata) = self.fx.compute(
                self.table_number,
                left.y,
                left.metadata,
                right.metadata,
            )?;

            self.writer.write(&Entry::Other {
                y,
                positions: [left.position, right.position],
                metadata,
            })?;
        }

        Ok(())
    }
}

/// Build table `table_number` (`2..=7`) at `current_start` out of its sorted parent table at
/// `previous_start`, followed by the end-of-table sentinel.
///
/// The parent table is read until its sentinel (or the end of the file). The new table must not
/// overlap with the parent table.
pub fn build_table<F, M>(
    file: &F,
    fx: &FxCalculator,
    matcher: &mut M,
    table_number: u8,
    previous_start: u64,
    current_start: u64,
    max_bucket_size: usize,
) -> Result<TableStats, TableBuildError>
where
    F: PlotFile + ?Sized,
    M: FindMatches,
{
    let layout_error = |error| TableBuildError {
        bytes_written: 0,
        error: TableError::Layout(error),
    };
    if !(2..=NUM_TABLES).contains(&table_number) {
        return Err(layout_error(CodecError::UnsupportedTable { table_number }));
    }
    let previous_layout = EntryLayout::new(fx.k(), table_number - 1).map_err(layout_error)?;
    let layout = EntryLayout::new(fx.k(), table_number).map_err(layout_error)?;

    let mut processor = PairProcessor {
        writer: TableWriter::new(file, layout, current_start),
        fx,
        matcher,
        table_number,
        matches: Vec::new(),
    };

    if let Err(error) = match_buckets(
        file,
        previous_layout,
        previous_start,
        max_bucket_size,
        &mut processor,
    ) {
        return Err(TableBuildError {
            bytes_written: processor.writer.bytes_written(),
            error,
        });
    }

    let bytes_written = processor.writer.bytes_written();
    processor.writer.finish().map_err(|error| TableBuildError {
        bytes_written,
        error: TableError::Write(error),
    })
}

fn match_buckets<F, M>(
    file: &F,
    previous_layout: EntryLayout,
    previous_start: u64,
    max_bucket_size: usize,
    processor: &mut PairProcessor<'_, F, M>,
) -> Result<(), TableError>
where
    F: PlotFile + ?Sized,
    M: FindMatches,
{
    let mut reader = TableReader::new(file, previous_layout, previous_start)?;
    let mut window = BucketWindow::new(max_bucket_size);

    while let Some((position, entry)) = reader.next_entry()? {
        let bucket_entry = BucketEntry {
            position,
            y: entry.y(),
            metadata: entry.metadata(),
        };
        if let Some(pair) = window.push(bucket_entry)? {
            processor.process(&pair)?;
        }
    }

    // Last pair of buckets is not followed by any entry that would complete it
    if let Some(pair) = window.flush() {
        processor.process(&pair)?;
    }

    Ok(())
}
