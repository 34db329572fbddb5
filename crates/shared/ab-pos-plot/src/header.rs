//! Plot header.
//!
//! Layout:
//! * 19 bytes: `"Proof of Space Plot"` (ASCII)
//! * 32 bytes: unique plot id
//! * 1 byte: `k`
//! * 2 bytes: memo length (little-endian)
//! * memo bytes


use crate::constants::{MAX_K, MIN_K};
use crate::storage::PlotFile;
use std::io;
use thiserror::Error;

/// Magic bytes every plot starts with
pub const PLOT_MAGIC: &[u8; 19] = b"Proof of Space Plot";
/// Header size without the memo
pub const HEADER_FIXED_LEN: usize = PLOT_MAGIC.len() + 32 + 1 + size_of::<u16>();

/// Errors happening when writing or reading the header
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Memo doesn't fit into 2 bytes length prefix
    #[error("Memo of {len} bytes is too large, at most {} bytes are supported", u16::MAX)]
    MemoTooLarge {
        /// Memo length
        len: usize,
    },
    /// I/O error
    #[error("Header I/O error after {bytes_written} bytes were written: {error}")]
    Io {
        /// Bytes successfully written before the failure
        bytes_written: u64,
        /// Low-level error
        #[source]
        error: io::Error,
    },
    /// Failed to read the header
    #[error("Failed to read header: {0}")]
    Read(#[source] io::Error),
    /// File doesn't start with [`PLOT_MAGIC`]
    #[error("Not a plot file, magic bytes mismatch")]
    InvalidMagic,
    /// File is shorter than the header
    #[error("Truncated header: expected {expected} bytes, file has {actual}")]
    Truncated {
        /// Expected header length
        expected: u64,
        /// File length
        actual: u64,
    },
    /// `k` is outside of supported range
    #[error("Unsupported k={k}, must be within {MIN_K}..={MAX_K}")]
    UnsupportedK {
        /// Size parameter
        k: u8,
    },
}

/// Parsed plot header
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlotHeader {
    /// Unique plot id
    pub plot_id: [u8; 32],
    /// Size parameter
    pub k: u8,
    /// Arbitrary memo
    pub memo: Vec<u8>,
}

impl PlotHeader {
    /// Length of the encoded header
    #[inline]
    pub fn encoded_len(&self) -> u64 {
        (HEADER_FIXED_LEN + self.memo.len()) as u64
    }
}

/// Write the header at the beginning of `file`, returns header length.
///
/// On failure [`HeaderError::Io`] carries the exact number of bytes written before the failure,
/// including a partially written field.
pub fn write_header<F>(
    file: &F,
    k: u8,
    memo: &[u8],
    plot_id: &[u8; 32],
) -> Result<u64, HeaderError>
where
    F: PlotFile + ?Sized,
{
    let memo_len = u16::try_from(memo.len())
        .map_err(|_error| HeaderError::MemoTooLarge { len: memo.len() })?;

    let mut header = Vec::with_capacity(HEADER_FIXED_LEN + memo.len());
    header.extend_from_slice(PLOT_MAGIC);
    header.extend_from_slice(plot_id);
    header.push(k);
    header.extend_from_slice(&memo_len.to_le_bytes());
    header.extend_from_slice(memo);

    let mut bytes_written = 0;
    while bytes_written < header.len() {
        let offset = bytes_written as u64;
        match file.write_at(&header[bytes_written..], offset) {
            Ok(0) => {
                return Err(HeaderError::Io {
                    bytes_written: offset,
                    error: io::Error::from(io::ErrorKind::WriteZero),
                });
            }
            Ok(n) => {
                bytes_written += n;
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                // Try again
            }
            Err(error) => {
                return Err(HeaderError::Io {
                    bytes_written: offset,
                    error,
                });
            }
        }
    }

    Ok(bytes_written as u64)
}

/// Read and validate the header at the beginning of `file`
pub fn read_header<F>(file: &F) -> Result<PlotHeader, HeaderError>
where
    F: PlotFile + ?Sized,
{
    let file_size = file.size().map_err(HeaderError::Read)?;
    if file_size < HEADER_FIXED_LEN as u64 {
        return Err(HeaderError::Truncated {
            expected: HEADER_FIXED_LEN as u64,
            actual: file_size,
        });
    }

    let mut fixed = [0; HEADER_FIXED_LEN];
    file.read_exact_at(&mut fixed, 0).map_err(HeaderError::Read)?;

    let (magic, fixed) = fixed.split_at(PLOT_MAGIC.len());
    if magic != PLOT_MAGIC {
        return Err(HeaderError::InvalidMagic);
    }
    let (plot_id, fixed) = fixed.split_at(32);
    let k = fixed[0];
    if !(MIN_K..=MAX_K).contains(&k) {
        return Err(HeaderError::UnsupportedK { k });
    }
    let memo_len = u16::from_le_bytes([fixed[1], fixed[2]]);

    let expected = (HEADER_FIXED_LEN + usize::from(memo_len)) as u64;
    if file_size < expected {
        return Err(HeaderError::Truncated {
            expected,
            actual: file_size,
        });
    }
    let mut memo = vec![0; usize::from(memo_len)];
    file.read_exact_at(&mut memo, HEADER_FIXED_LEN as u64)
        .map_err(HeaderError::Read)?;

    let mut header_plot_id = [0; 32];
    header_plot_id.copy_from_slice(plot_id);

    Ok(PlotHeader {
        plot_id: header_plot_id,
        k,
        memo,
    })
}
