//! First table: `y = F1(x)` for every `x` in `0..2^k`.
//!
//! `F1(x)` takes `k` bits of ChaCha8 keystream (keyed with the plot id, zero nonce) at bit offset
//! `x * k` and extends them with the `PARAM_EXT` most significant bits of `x`.


use crate::codec::{Entry, EntryLayout};
use crate::constants::{MAX_K, MIN_K, PARAM_EXT};
use crate::storage::PlotFile;
use crate::table::{TableBuildError, TableError};
use crate::table_io::{TableStats, TableWriter};
use crate::types::{X, Y};
use chacha20::ChaCha8;
use chacha20::cipher::{Iv, KeyIvInit, StreamCipher, StreamCipherSeek};
use thiserror::Error;

/// ChaCha8 keystream length is limited by its 32-bit block counter
const KEYSTREAM_LEN_BYTES: u64 = 64 << 32;
/// Bytes read for every `x`, enough to cover `k` bits at any bit offset within a byte
const WINDOW_BYTES: usize = size_of::<u64>();
const BYTE_BITS: u64 = u8::BITS as u64;
/// Number of entries generated at once when writing the first table
const BATCH_SIZE: usize = 1 << 14;

/// Errors happening when creating [`F1`]
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum F1Error {
    /// `k` is outside of supported range
    #[error("Unsupported k={k}, must be within {MIN_K}..={MAX_K}")]
    UnsupportedK {
        /// Size parameter
        k: u8,
    },
    /// Keystream is not long enough to cover all `x` values
    #[error("ChaCha8 keystream is too short for k={k}")]
    KeystreamTooShort {
        /// Size parameter
        k: u8,
    },
}

/// First table hash keyed with the plot id
#[derive(Debug, Clone)]
pub struct F1 {
    k: u8,
    seed: [u8; 32],
}

impl F1 {
    /// Create a new instance
    pub fn new(k: u8, seed: [u8; 32]) -> Result<Self, F1Error> {
        if !(MIN_K..=MAX_K).contains(&k) {
            return Err(F1Error::UnsupportedK { k });
        }

        let required_bytes = (u64::from(k) << k).div_ceil(BYTE_BITS) + WINDOW_BYTES as u64;
        if required_bytes > KEYSTREAM_LEN_BYTES {
            return Err(F1Error::KeystreamTooShort { k });
        }

        Ok(Self { k, seed })
    }

    /// Size parameter
    #[inline(always)]
    pub fn k(&self) -> u8 {
        self.k
    }

    /// Number of entries in the first table
    #[inline(always)]
    pub fn num_entries(&self) -> u64 {
        1 << self.k
    }

    fn cipher_at(&self, byte_offset: u64) -> ChaCha8 {
        let mut cipher = ChaCha8::new(&self.seed.into(), &Iv::<ChaCha8>::default());
        cipher.seek(byte_offset);
        cipher
    }

    /// Compute `y` for a single `x`, which must be in `0..2^k`.
    ///
    /// Prefer [`Self::compute_batch()`] for consecutive values.
    pub fn compute(&self, x: X) -> Y {
        debug_assert!(x.as_u64() < self.num_entries());

        let skip_bits = u64::from(self.k) * x.as_u64();
        let mut window = [0; WINDOW_BYTES];
        self.cipher_at(skip_bits / BYTE_BITS).apply_keystream(&mut window);

        self.extract(x, u64::from_be_bytes(window), (skip_bits % BYTE_BITS) as u32)
    }

    /// Compute `y` for consecutive `x` values starting at `first_x`, one for each element of
    /// `ys`.
    ///
    /// All `x` values must be in `0..2^k`.
    pub fn compute_batch(&self, first_x: X, ys: &mut [Y]) {
        debug_assert!(first_x.as_u64() + ys.len() as u64 <= self.num_entries());

        let k = u64::from(self.k);
        let first_bit = k * first_x.as_u64();
        let bit_offset = first_bit % BYTE_BITS;

        let keystream_len = (bit_offset + k * ys.len() as u64).div_ceil(BYTE_BITS) as usize;
        let mut keystream = vec![0; keystream_len + WINDOW_BYTES];
        self.cipher_at(first_bit / BYTE_BITS).apply_keystream(&mut keystream);

        for (index, y) in ys.iter_mut().enumerate() {
            let bit = bit_offset + index as u64 * k;
            let byte = (bit / BYTE_BITS) as usize;
            let mut window = [0; WINDOW_BYTES];
            window.copy_from_slice(&keystream[byte..][..WINDOW_BYTES]);

            *y = self.extract(
                X::from(first_x.as_u64() + index as u64),
                u64::from_be_bytes(window),
                (bit % BYTE_BITS) as u32,
            );
        }
    }

    /// `window` holds keystream bytes starting with the byte that contains the first bit of
    /// partial `y`, `bit_offset` is the offset of that bit within the first byte
    #[inline(always)]
    fn extract(&self, x: X, window: u64, bit_offset: u32) -> Y {
        let k = u32::from(self.k);
        let partial_y = (window << bit_offset) >> (u64::BITS - k);

        // Extract `PARAM_EXT` most significant bits from `x`
        let ext = x.as_u64() >> (k - u32::from(PARAM_EXT));

        // [`k` bits from keystream][`PARAM_EXT` bits from `x`]
        Y::from((partial_y << PARAM_EXT) | ext)
    }
}

/// Write all `2^k` entries of the first table in increasing `x` order at `start`, followed by the
/// end-of-table sentinel.
pub fn write_first_table<F>(
    file: &F,
    f1: &F1,
    start: u64,
) -> Result<TableStats, TableBuildError>
where
    F: PlotFile + ?Sized,
{
    let layout = EntryLayout::new(f1.k(), 1).map_err(|error| TableBuildError {
        bytes_written: 0,
        error: TableError::Layout(error),
    })?;
    let mut writer = TableWriter::new(file, layout, start);

    let mut ys = vec![Y::default(); BATCH_SIZE];
    let mut first_x = 0;
    while first_x < f1.num_entries() {
        let batch_size = (f1.num_entries() - first_x).min(BATCH_SIZE as u64) as usize;
        let ys = &mut ys[..batch_size];
        f1.compute_batch(X::from(first_x), ys);

        for (&y, x) in ys.iter().zip(first_x..) {
            writer
                .write(&Entry::First { y, x: X::from(x) })
                .map_err(|error| TableBuildError {
                    bytes_written: writer.bytes_written(),
                    error: TableError::Write(error),
                })?;
        }

        first_x += batch_size as u64;
    }

    let bytes_written = writer.bytes_written();
    writer.finish().map_err(|error| TableBuildError {
        bytes_written,
        error: TableError::Write(error),
    })
}
