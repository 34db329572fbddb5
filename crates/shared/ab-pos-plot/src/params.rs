//! Parameter lookups shared by hashing, encoding and matching


use crate::constants::{NUM_TABLES, PARAM_BC, PARAM_EXT};
use crate::types::Y;

/// Compute the size of `y` in bits
#[inline(always)]
pub const fn y_size_bits(k: u8) -> usize {
    k as usize + PARAM_EXT as usize
}

/// Number of `k`-bit units of metadata stored next to entries of table `table_number`.
///
/// Returns `None` for table numbers outside of `1..=7`.
#[inline]
pub const fn metadata_multiplier(table_number: u8) -> Option<usize> {
    Some(match table_number {
        1 => 1,
        2 => 2,
        3 | 4 => 4,
        5 => 3,
        6 => 2,
        7 => 0,
        _ => {
            return None;
        }
    })
}

/// Metadata size in bits, zero for unknown tables
#[inline]
pub const fn metadata_size_bits(k: u8, table_number: u8) -> usize {
    match metadata_multiplier(table_number) {
        Some(multiplier) => k as usize * multiplier,
        None => 0,
    }
}

/// Collation size used when computing entries of table `table_number`, which is the metadata
/// multiplier of its parent table.
///
/// Returns `None` for table numbers outside of `2..=7`.
#[inline]
pub const fn collation_size(table_number: u8) -> Option<usize> {
    if table_number < 2 || table_number > NUM_TABLES {
        return None;
    }
    metadata_multiplier(table_number - 1)
}

/// Bucket that `y` belongs to
#[inline(always)]
pub const fn bucket_id(y: Y) -> u64 {
    y.as_u64() / PARAM_BC as u64
}
