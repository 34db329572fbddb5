//! `y` and metadata of entries of tables 2 to 7


use crate::at::{AtError, BlockCipher, at};
use crate::constants::NUM_TABLES;
use crate::params::metadata_size_bits;
use crate::types::{Metadata, Y};

/// Collate metadata of a matched pair into metadata of the resulting entry of table
/// `table_number`.
///
/// Tables 2 and 3 concatenate parent metadata, tables 4 to 6 keep the most significant bits of
/// `left ^ right` and table 7 has no metadata at all. Returns `None` for table numbers outside of
/// `2..=7`.
pub fn collate(k: u8, table_number: u8, left: Metadata, right: Metadata) -> Option<Metadata> {
    if !(2..=NUM_TABLES).contains(&table_number) {
        return None;
    }

    let parent_bits = metadata_size_bits(k, table_number - 1) as u32;
    let metadata_bits = metadata_size_bits(k, table_number) as u32;
    let left = left.truncate(parent_bits);
    let right = right.truncate(parent_bits);

    Some(match table_number {
        2 | 3 => (left << parent_bits) | right,
        7 => Metadata::ZERO,
        _ => (left ^ right) >> (parent_bits - metadata_bits),
    })
}

/// Computes `y` and metadata of tables 2 to 7 from matched pairs of the parent table
#[derive(Debug, Clone)]
pub struct FxCalculator {
    k: u8,
    cipher: BlockCipher,
}

impl FxCalculator {
    /// Create a new instance keyed with the plot id
    pub fn new(k: u8, plot_id: &[u8; 32]) -> Self {
        Self {
            k,
            cipher: BlockCipher::new(plot_id),
        }
    }

    /// Size parameter
    #[inline(always)]
    pub fn k(&self) -> u8 {
        self.k
    }

    /// Compute `y` and metadata of a new entry of table `table_number` out of the left entry's `y`
    /// and metadata of both matched entries
    pub fn compute(
        &self,
        table_number: u8,
        left_y: Y,
        left_metadata: Metadata,
        right_metadata: Metadata,
    ) -> Result<(Y, Metadata), AtError> {
        let hash = at(&self.cipher, self.k, table_number, left_metadata, right_metadata)?;
        let y = Y::from(hash.as_u64() ^ left_y.as_u64());
        let metadata = collate(self.k, table_number, left_metadata, right_metadata)
            .ok_or(AtError::UnsupportedTable { table_number })?;

        Ok((y, metadata))
    }
}
