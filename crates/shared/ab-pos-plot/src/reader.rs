//! Reading of created plots


use crate::codec::{CodecError, EntryLayout};
use crate::constants::NUM_TABLES;
use crate::header::{HeaderError, PlotHeader, read_header};
use crate::plot::TableInfo;
use crate::storage::PlotFile;
use crate::table_io::{TableReadError, TableReader};
use thiserror::Error;

/// Errors happening when opening or reading a plot
#[derive(Debug, Error)]
pub enum PlotReaderError {
    /// Invalid header
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
    /// Entry layout can't be created
    #[error("Layout error: {0}")]
    Layout(#[from] CodecError),
    /// Failed to read a table
    #[error("Failed to read table {table_number}: {error}")]
    Read {
        /// Table number
        table_number: u8,
        /// Low-level error
        #[source]
        error: TableReadError,
    },
    /// Table ends without the end-of-table sentinel, plot is incomplete
    #[error("Table {table_number} has no end-of-table sentinel")]
    MissingSentinel {
        /// Table number
        table_number: u8,
    },
    /// Table number outside of `1..=7`
    #[error("Unknown table {table_number}")]
    UnknownTable {
        /// Table number
        table_number: u8,
    },
}

/// Reader of a complete plot
#[derive(Debug)]
pub struct PlotReader<F> {
    file: F,
    header: PlotHeader,
    tables: Vec<TableInfo>,
}

impl<F> PlotReader<F>
where
    F: PlotFile,
{
    /// Open a plot, validating its header and locating all tables.
    ///
    /// Locating tables requires scanning all of them once.
    pub fn open(file: F) -> Result<Self, PlotReaderError> {
        let header = read_header(&file)?;

        let mut tables = Vec::<TableInfo>::with_capacity(usize::from(NUM_TABLES));
        for table_number in 1..=NUM_TABLES {
            let start = tables.last().map_or(header.encoded_len(), |table| table.end());
            let layout = EntryLayout::new(header.k, table_number)?;

            let read_error = |error| PlotReaderError::Read {
                table_number,
                error,
            };
            let mut reader = TableReader::new(&file, layout, start).map_err(read_error)?;
            let mut entries = 0;
            while reader.next_entry().map_err(read_error)?.is_some() {
                entries += 1;
            }
            if !reader.reached_sentinel() {
                return Err(PlotReaderError::MissingSentinel { table_number });
            }

            tables.push(TableInfo {
                table_number,
                start,
                bytes: reader.bytes_read(),
                entries,
                entry_len: layout.entry_len(),
            });
        }

        Ok(Self {
            file,
            header,
            tables,
        })
    }

    /// Plot header
    #[inline]
    pub fn header(&self) -> &PlotHeader {
        &self.header
    }

    /// All tables in order
    #[inline]
    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    /// Reader of entries of table `table_number`
    pub fn table_reader(&self, table_number: u8) -> Result<TableReader<'_, F>, PlotReaderError> {
        let table = self
            .tables
            .get(usize::from(table_number).wrapping_sub(1))
            .ok_or(PlotReaderError::UnknownTable { table_number })?;
        let layout = EntryLayout::new(self.header.k, table_number)?;

        TableReader::new(&self.file, layout, table.start)
            .map_err(|error| PlotReaderError::Read {
                table_number,
                error,
            })
    }

    /// Get the underlying file back
    pub fn into_inner(self) -> F {
        self.file
    }
}
