//! Disk-based proof of space plotting.
//!
//! A plot consists of a header followed by seven tables. The first table holds `y = F1(x)` for
//! every `x` in `0..2^k`, every following table is derived from the previous one by matching
//! entries of adjacent buckets and hashing their metadata with a keyed block cipher (see
//! [`at::at()`]). Each table is sorted by `y` before the next one is derived from it.
//!
//! [`plot::create_plot()`] runs the whole pipeline, [`reader::PlotReader`] reads created plots.
#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

pub mod at;
pub mod codec;
pub mod constants;
pub mod f1;
pub mod fx;
pub mod header;
pub mod matching;
pub mod params;
pub mod plot;
pub mod reader;
pub mod sort;
pub mod storage;
pub mod table;
pub mod table_io;
pub mod types;

pub use crate::plot::{PlotConfig, PlotError, PlotSummary, create_plot};
pub use crate::reader::{PlotReader, PlotReaderError};
pub use crate::storage::{FileSystem, MemoryFileSystem, OsFileSystem, PlotFile};
