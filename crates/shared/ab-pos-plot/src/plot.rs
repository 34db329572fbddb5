//! Plot creation: header, first table and forward propagation through tables 2 to 7.
//!
//! Tables are laid out back to back after the header, every table is followed by its end-of-table
//! sentinel and sorted by `y` before the next table is derived from it.


use crate::codec::{CodecError, EntryLayout};
use crate::constants::{MAX_K, MIN_K, NUM_TABLES};
use crate::f1::{F1, F1Error, write_first_table};
use crate::fx::FxCalculator;
use crate::header::{HeaderError, write_header};
use crate::matching::ChiaMatcher;
use crate::sort::{SortError, SortStrategy, fits_in_memory, sort_on_disk};
use crate::storage::{FileSystem, PlotFile};
use crate::table::{TableBuildError, build_table};
use crate::table_io::TableStats;
use bytesize::ByteSize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Invalid plot configuration
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// `k` is outside of supported range
    #[error("Unsupported k={k}, must be within {MIN_K}..={MAX_K}")]
    UnsupportedK {
        /// Size parameter
        k: u8,
    },
    /// Memo doesn't fit into the header
    #[error("Memo of {len} bytes is too large, at most {} bytes are supported", u16::MAX)]
    MemoTooLarge {
        /// Memo length
        len: usize,
    },
    /// Memory budget is zero
    #[error("Available memory must not be zero")]
    ZeroAvailableMemory,
    /// Max bucket size is zero
    #[error("Max bucket size must not be zero")]
    ZeroMaxBucketSize,
}

/// Plot configuration
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlotConfig {
    /// Size parameter, plot has `2^k` entries in the first table
    pub k: u8,
    /// Unique plot id, key of all hashes
    pub plot_id: [u8; 32],
    /// Arbitrary memo stored in the header
    pub memo: Vec<u8>,
    /// Memory budget for sorting, larger tables are sorted externally using the spare file
    pub available_memory: u64,
    /// Max number of entries in a single bucket
    pub max_bucket_size: usize,
}

impl PlotConfig {
    /// Default memory budget for sorting
    pub const DEFAULT_AVAILABLE_MEMORY: u64 = 1024 * 1024 * 1024;
    /// Default max number of entries in a single bucket
    pub const DEFAULT_MAX_BUCKET_SIZE: usize = 16 * 1024;

    /// Create a new config with empty memo and default limits
    pub fn new(k: u8, plot_id: [u8; 32]) -> Self {
        Self {
            k,
            plot_id,
            memo: Vec::new(),
            available_memory: Self::DEFAULT_AVAILABLE_MEMORY,
            max_bucket_size: Self::DEFAULT_MAX_BUCKET_SIZE,
        }
    }

    /// Check that the config describes a plot that can be created
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_K..=MAX_K).contains(&self.k) {
            return Err(ConfigError::UnsupportedK { k: self.k });
        }
        if self.memo.len() > usize::from(u16::MAX) {
            return Err(ConfigError::MemoTooLarge {
                len: self.memo.len(),
            });
        }
        if self.available_memory == 0 {
            return Err(ConfigError::ZeroAvailableMemory);
        }
        if self.max_bucket_size == 0 {
            return Err(ConfigError::ZeroMaxBucketSize);
        }

        Ok(())
    }
}

/// Errors happening during plot creation
#[derive(Debug, Error)]
pub enum PlotError {
    /// Invalid config
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),
    /// Failed to create plot or spare file
    #[error("Failed to create {}: {error}", path.display())]
    Create {
        /// File path
        path: PathBuf,
        /// Low-level error
        #[source]
        error: io::Error,
    },
    /// Failed to write header
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
    /// First table hash can't be created
    #[error("F1 error: {0}")]
    F1(#[from] F1Error),
    /// Entry layout can't be created
    #[error("Layout error: {0}")]
    Layout(#[from] CodecError),
    /// Failed to build a table
    #[error("Failed to build table {table_number}: {error}")]
    Table {
        /// Table number
        table_number: u8,
        /// Low-level error
        #[source]
        error: TableBuildError,
    },
    /// Table size is not a whole number of entries
    #[error(
        "Table {table_number} has {bytes} bytes, which is not a multiple of entry length \
        {entry_len}"
    )]
    EntryLengthMismatch {
        /// Table number
        table_number: u8,
        /// Table size
        bytes: u64,
        /// Entry length
        entry_len: usize,
    },
    /// Failed to sort a table
    #[error("Failed to sort table {table_number}: {error}")]
    Sort {
        /// Table number
        table_number: u8,
        /// Low-level error
        #[source]
        error: SortError,
    },
    /// Failed to flush plot to disk
    #[error("Failed to sync plot: {0}")]
    Sync(#[source] io::Error),
    /// Failed to remove the spare file
    #[error("Failed to remove spare file {}: {error}", path.display())]
    RemoveSpareFile {
        /// File path
        path: PathBuf,
        /// Low-level error
        #[source]
        error: io::Error,
    },
}

/// Location and size of a table within the plot
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TableInfo {
    /// Table number
    pub table_number: u8,
    /// Offset of the first entry
    pub start: u64,
    /// Bytes of entries, excluding the end-of-table sentinel
    pub bytes: u64,
    /// Number of entries
    pub entries: u64,
    /// Length of a single entry
    pub entry_len: usize,
}

impl TableInfo {
    /// Offset right after the end-of-table sentinel
    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.bytes + self.entry_len as u64
    }
}

/// Summary of a created plot
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlotSummary {
    /// Header length
    pub header_len: u64,
    /// All tables in order
    pub tables: Vec<TableInfo>,
}

impl PlotSummary {
    /// Size of the plot file
    pub fn plot_size(&self) -> u64 {
        self.tables.last().map_or(self.header_len, |table| table.end())
    }
}

/// Path of the spare file next to the plot
pub fn spare_path(path: &Path) -> PathBuf {
    let mut spare_path = OsString::from(path.as_os_str());
    spare_path.push(".spare");
    PathBuf::from(spare_path)
}

/// Plot file with the lazily created spare file
struct PlotFiles<'a, FS>
where
    FS: FileSystem,
{
    fs: &'a FS,
    plot: FS::File,
    spare_path: PathBuf,
    spare: Option<FS::File>,
    available_memory: u64,
}

impl<FS> PlotFiles<'_, FS>
where
    FS: FileSystem,
{
    fn sort_table(&mut self, table: &TableInfo) -> Result<SortStrategy, PlotError> {
        if !fits_in_memory(table.bytes, table.entry_len, self.available_memory)
            && self.spare.is_none()
        {
            debug!(path = %self.spare_path.display(), "Creating spare file");

            let spare = self
                .fs
                .create(&self.spare_path)
                .map_err(|error| PlotError::Create {
                    path: self.spare_path.clone(),
                    error,
                })?;
            self.spare = Some(spare);
        }

        sort_on_disk(
            &self.plot,
            self.spare.as_ref(),
            table.start,
            table.bytes,
            self.available_memory,
            table.entry_len,
        )
        .map_err(|error| PlotError::Sort {
            table_number: table.table_number,
            error,
        })
    }

    fn remove_spare(&mut self) -> Result<(), PlotError> {
        if let Some(spare) = self.spare.take() {
            drop(spare);
            self.fs
                .remove_file(&self.spare_path)
                .map_err(|error| PlotError::RemoveSpareFile {
                    path: self.spare_path.clone(),
                    error,
                })?;

            debug!(path = %self.spare_path.display(), "Removed spare file");
        }

        Ok(())
    }
}

impl<FS> Drop for PlotFiles<'_, FS>
where
    FS: FileSystem,
{
    fn drop(&mut self) {
        // Only reached with the spare file still present if plot creation failed
        if let Some(spare) = self.spare.take() {
            drop(spare);
            if let Err(error) = self.fs.remove_file(&self.spare_path) {
                warn!(
                    path = %self.spare_path.display(),
                    %error,
                    "Failed to remove spare file"
                );
            }
        }
    }
}

fn table_info(
    table_number: u8,
    start: u64,
    stats: TableStats,
    layout: &EntryLayout,
) -> Result<TableInfo, PlotError> {
    let entry_len = layout.entry_len();
    if !stats.bytes.is_multiple_of(entry_len as u64)
        || stats.bytes / entry_len as u64 != stats.entries
    {
        return Err(PlotError::EntryLengthMismatch {
            table_number,
            bytes: stats.bytes,
            entry_len,
        });
    }

    Ok(TableInfo {
        table_number,
        start,
        bytes: stats.bytes,
        entries: stats.entries,
        entry_len,
    })
}

/// Create a plot at `path`, overwriting any existing file.
///
/// Every table is written and sorted before the next one is derived from it. The spare file (see
/// [`spare_path()`]) only exists while the plot is being created and only if some table didn't fit
/// into [`PlotConfig::available_memory`]. It is removed on failure too, the partially written plot
/// is left in place.
pub fn create_plot<FS>(
    fs: &FS,
    path: &Path,
    config: &PlotConfig,
) -> Result<PlotSummary, PlotError>
where
    FS: FileSystem,
{
    config.validate()?;
    let PlotConfig {
        k,
        plot_id,
        memo,
        available_memory,
        max_bucket_size,
    } = config;
    let k = *k;

    let f1 = F1::new(k, *plot_id)?;
    let plot = fs.create(path).map_err(|error| PlotError::Create {
        path: path.to_path_buf(),
        error,
    })?;
    let mut files = PlotFiles {
        fs,
        plot,
        spare_path: spare_path(path),
        spare: None,
        available_memory: *available_memory,
    };

    let header_len = write_header(&files.plot, k, memo, plot_id)?;
    info!(
        path = %path.display(),
        %k,
        memo_len = memo.len(),
        "Creating plot"
    );

    let mut tables = Vec::with_capacity(usize::from(NUM_TABLES));

    let started = Instant::now();
    let stats = write_first_table(&files.plot, &f1, header_len).map_err(|error| {
        PlotError::Table {
            table_number: 1,
            error,
        }
    })?;
    let table = table_info(1, header_len, stats, &EntryLayout::new(k, 1)?)?;
    let strategy = files.sort_table(&table)?;
    log_table(&table, strategy, started);
    tables.push(table);

    let fx = FxCalculator::new(k, plot_id);
    let mut matcher = ChiaMatcher::default();
    for table_number in 2..=NUM_TABLES {
        let previous = tables[tables.len() - 1];
        let start = previous.end();

        let started = Instant::now();
        let stats = build_table(
            &files.plot,
            &fx,
            &mut matcher,
            table_number,
            previous.start,
            start,
            *max_bucket_size,
        )
        .map_err(|error| PlotError::Table {
            table_number,
            error,
        })?;
        let table = table_info(table_number, start, stats, &EntryLayout::new(k, table_number)?)?;
        let strategy = files.sort_table(&table)?;
        log_table(&table, strategy, started);
        tables.push(table);
    }

    files.remove_spare()?;
    files.plot.sync_data().map_err(PlotError::Sync)?;

    let summary = PlotSummary { header_len, tables };
    info!(
        path = %path.display(),
        size = %ByteSize::b(summary.plot_size()).display().iec(),
        "Plot created"
    );

    Ok(summary)
}

fn log_table(table: &TableInfo, strategy: SortStrategy, started: Instant) {
    info!(
        table_number = table.table_number,
        entries = table.entries,
        size = %ByteSize::b(table.bytes).display().iec(),
        ?strategy,
        elapsed = ?started.elapsed(),
        "Table created"
    );
}
