//! Sorting of table regions by raw entry bytes.
//!
//! Regions that fit into the memory budget are sorted in memory, larger regions are split into
//! sorted runs stored in the spare file, which are then merged back into the region.


use crate::storage::PlotFile;
use crate::table_io::IO_BUFFER_SIZE;
use core::cmp::Reverse;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::BinaryHeap;
use std::io;
use thiserror::Error;
use tracing::debug;

/// Errors happening when sorting a region
#[derive(Debug, Error)]
pub enum SortError {
    /// Region doesn't fit into memory and no spare file was provided
    #[error(
        "Region of {len} bytes exceeds memory budget of {memory_budget} bytes, spare file is \
        required"
    )]
    MissingSpareFile {
        /// Region length
        len: u64,
        /// Memory budget
        memory_budget: u64,
    },
    /// Memory budget can't hold even two entries
    #[error("Memory budget of {memory_budget} bytes is too small for {entry_len} bytes entries")]
    BudgetTooSmall {
        /// Memory budget
        memory_budget: u64,
        /// Entry length
        entry_len: usize,
    },
    /// Region is not a whole number of entries
    #[error("Region of {len} bytes is not a multiple of entry length {entry_len}")]
    RegionNotAligned {
        /// Region length
        len: u64,
        /// Entry length
        entry_len: usize,
    },
    /// I/O error
    #[error("Sort I/O error during {operation} at offset {offset}: {error}")]
    Io {
        /// Operation that failed
        operation: &'static str,
        /// Offset of the operation
        offset: u64,
        /// Low-level error
        #[source]
        error: io::Error,
    },
}

/// How a region was sorted
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SortStrategy {
    /// Whole region was sorted in memory
    InMemory,
    /// Region was split into sorted runs in the spare file and merged back
    External {
        /// Number of sorted runs
        runs: usize,
    },
}

/// Memory used per entry on top of the entry itself when sorting in memory
pub const INDEX_LEN: usize = size_of::<u32>();

/// Memory needed to sort a region of `len` bytes with entries of `entry_len` bytes in memory
#[inline]
pub fn sort_memory(len: u64, entry_len: usize) -> u64 {
    let num_entries = len / entry_len.max(1) as u64;
    len + num_entries * INDEX_LEN as u64
}

/// Whether a region of `len` bytes with entries of `entry_len` bytes can be sorted in memory with
/// `memory_budget`
#[inline]
pub fn fits_in_memory(len: u64, entry_len: usize, memory_budget: u64) -> bool {
    let num_entries = len / entry_len.max(1) as u64;
    num_entries <= u64::from(u32::MAX) && sort_memory(len, entry_len) <= memory_budget
}

fn read_at<F>(
    file: &F,
    buffer: &mut [u8],
    offset: u64,
    operation: &'static str,
) -> Result<(), SortError>
where
    F: PlotFile + ?Sized,
{
    file.read_exact_at(buffer, offset)
        .map_err(|error| SortError::Io {
            operation,
            offset,
            error,
        })
}

fn write_at<F>(
    file: &F,
    buffer: &[u8],
    offset: u64,
    operation: &'static str,
) -> Result<(), SortError>
where
    F: PlotFile + ?Sized,
{
    file.write_all_at(buffer, offset)
        .map_err(|error| SortError::Io {
            operation,
            offset,
            error,
        })
}

/// Sort entries of `entry_len` bytes in `buffer` lexicographically.
///
/// Only an index of [`INDEX_LEN`] bytes per entry and a single entry are allocated, entries are
/// then permuted in place.
fn sort_entries(buffer: &mut [u8], entry_len: usize) {
    let num_entries = buffer.len() / entry_len;
    debug_assert!(num_entries <= u32::MAX as usize);

    let mut order = (0..num_entries as u32).collect::<Vec<_>>();
    {
        let entry = |index: u32| &buffer[index as usize * entry_len..][..entry_len];
        #[cfg(feature = "parallel")]
        order.par_sort_unstable_by(|&a, &b| entry(a).cmp(entry(b)));
        #[cfg(not(feature = "parallel"))]
        order.sort_unstable_by(|&a, &b| entry(a).cmp(entry(b)));
    }

    // `order[position]` is the index of the entry that belongs at `position`, positions that are
    // already in place point at themselves
    let mut temp = vec![0; entry_len];
    for cycle_start in 0..num_entries {
        if order[cycle_start] as usize == cycle_start {
            continue;
        }

        temp.copy_from_slice(&buffer[cycle_start * entry_len..][..entry_len]);
        let mut position = cycle_start;
        loop {
            let source = order[position] as usize;
            order[position] = position as u32;
            if source == cycle_start {
                buffer[position * entry_len..][..entry_len].copy_from_slice(&temp);
                break;
            }
            buffer.copy_within(
                source * entry_len..(source + 1) * entry_len,
                position * entry_len,
            );
            position = source;
        }
    }
}

/// Sort `len` bytes of entries of `entry_len` bytes starting at `start` of `file` in place.
///
/// `spare` is only used (and is required) when the region doesn't fit into `memory_budget` (see
/// [`fits_in_memory()`]), in which case it is truncated to zero length once sorting is done.
pub fn sort_on_disk<F, S>(
    file: &F,
    spare: Option<&S>,
    start: u64,
    len: u64,
    memory_budget: u64,
    entry_len: usize,
) -> Result<SortStrategy, SortError>
where
    F: PlotFile + ?Sized,
    S: PlotFile + ?Sized,
{
    if entry_len == 0 || !len.is_multiple_of(entry_len as u64) {
        return Err(SortError::RegionNotAligned { len, entry_len });
    }
    let num_entries = len / entry_len as u64;
    if num_entries <= 1 {
        return Ok(SortStrategy::InMemory);
    }

    if fits_in_memory(len, entry_len, memory_budget) {
        let mut buffer = vec![0; len as usize];
        read_at(file, &mut buffer, start, "in-memory read")?;
        sort_entries(&mut buffer, entry_len);
        write_at(file, &buffer, start, "in-memory write")?;

        debug!(%start, %len, "Sorted region in memory");

        return Ok(SortStrategy::InMemory);
    }

    let Some(spare) = spare else {
        return Err(SortError::MissingSpareFile { len, memory_budget });
    };
    let entries_per_run =
        (memory_budget / (entry_len + INDEX_LEN) as u64).min(u64::from(u32::MAX));
    if entries_per_run < 2 {
        return Err(SortError::BudgetTooSmall {
            memory_budget,
            entry_len,
        });
    }

    let run_len = entries_per_run * entry_len as u64;
    let runs = write_sorted_runs(file, spare, start, len, run_len, entry_len)?;
    debug!(%start, %len, runs = runs.len(), "Wrote sorted runs to spare file");

    merge_runs(file, spare, start, &runs, memory_budget, entry_len)?;
    spare.set_len(0).map_err(|error| SortError::Io {
        operation: "spare truncate",
        offset: 0,
        error,
    })?;

    debug!(%start, %len, runs = runs.len(), "Merged sorted runs");

    Ok(SortStrategy::External { runs: runs.len() })
}

/// Sorted run in the spare file
#[derive(Debug, Copy, Clone)]
struct Run {
    offset: u64,
    len: u64,
}

fn write_sorted_runs<F, S>(
    file: &F,
    spare: &S,
    start: u64,
    len: u64,
    run_len: u64,
    entry_len: usize,
) -> Result<Vec<Run>, SortError>
where
    F: PlotFile + ?Sized,
    S: PlotFile + ?Sized,
{
    let mut runs = Vec::with_capacity(len.div_ceil(run_len) as usize);
    let mut buffer = Vec::new();
    let mut offset = 0;

    while offset < len {
        let this_run_len = run_len.min(len - offset);
        buffer.resize(this_run_len as usize, 0);
        read_at(file, &mut buffer, start + offset, "run read")?;
        sort_entries(&mut buffer, entry_len);
        write_at(spare, &buffer, offset, "run write")?;

        runs.push(Run {
            offset,
            len: this_run_len,
        });
        offset += this_run_len;
    }

    Ok(runs)
}

/// Buffered sequential reader of a single run
#[derive(Debug)]
struct RunCursor {
    run: Run,
    /// Bytes of the run already loaded into the buffer
    loaded: u64,
    buffer: Vec<u8>,
    buffer_offset: usize,
}

impl RunCursor {
    fn next_entry<S>(
        &mut self,
        spare: &S,
        chunk_len: u64,
        entry_len: usize,
    ) -> Result<Option<Vec<u8>>, SortError>
    where
        S: PlotFile + ?Sized,
    {
        if self.buffer_offset == self.buffer.len() {
            if self.loaded == self.run.len {
                return Ok(None);
            }

            let this_chunk_len = chunk_len.min(self.run.len - self.loaded);
            self.buffer.resize(this_chunk_len as usize, 0);
            let offset = self.run.offset + self.loaded;
            read_at(spare, &mut self.buffer, offset, "merge read")?;
            self.loaded += this_chunk_len;
            self.buffer_offset = 0;
        }

        let entry = self.buffer[self.buffer_offset..][..entry_len].to_vec();
        self.buffer_offset += entry_len;

        Ok(Some(entry))
    }
}

fn merge_runs<F, S>(
    file: &F,
    spare: &S,
    start: u64,
    runs: &[Run],
    memory_budget: u64,
    entry_len: usize,
) -> Result<(), SortError>
where
    F: PlotFile + ?Sized,
    S: PlotFile + ?Sized,
{
    // Split the budget between run buffers and the output buffer, at least one entry each
    let chunk_entries = (memory_budget / (runs.len() as u64 + 1) / entry_len as u64).max(1);
    let chunk_len = chunk_entries * entry_len as u64;
    let output_capacity = (chunk_len as usize).min(IO_BUFFER_SIZE.max(entry_len));

    let mut cursors = runs
        .iter()
        .map(|&run| RunCursor {
            run,
            loaded: 0,
            buffer: Vec::new(),
            buffer_offset: 0,
        })
        .collect::<Vec<_>>();

    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for (index, cursor) in cursors.iter_mut().enumerate() {
        if let Some(entry) = cursor.next_entry(spare, chunk_len, entry_len)? {
            heap.push(Reverse((entry, index)));
        }
    }

    let mut output = Vec::with_capacity(output_capacity);
    let mut output_offset = start;
    while let Some(Reverse((entry, index))) = heap.pop() {
        output.extend_from_slice(&entry);
        if output.len() >= output_capacity {
            write_at(file, &output, output_offset, "merge write")?;
            output_offset += output.len() as u64;
            output.clear();
        }

        if let Some(entry) = cursors[index].next_entry(spare, chunk_len, entry_len)? {
            heap.push(Reverse((entry, index)));
        }
    }

    if !output.is_empty() {
        write_at(file, &output, output_offset, "merge write")?;
    }

    Ok(())
}
