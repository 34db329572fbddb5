//! Keyed block-cipher hash (`At`) used to derive `y` of tables 2 to 7.
//!
//! Two metadata values of `k * collation_size(table_number)` bits each are compressed into a
//! single `k + PARAM_EXT` bits value with a fixed number of AES-256 invocations, the number of
//! which depends on the combined width of inputs.

#[cfg(test)]
mod tests;

use crate::params::{collation_size, y_size_bits};
use crate::types::{Metadata, Y};
use aes::Aes256;
use aes::cipher::{BlockEncrypt, KeyInit};
use core::fmt;
use thiserror::Error;

/// Errors happening when computing [`at()`]
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum AtError {
    /// Table number has no collation size
    #[error("Unsupported table number {table_number}")]
    UnsupportedTable {
        /// Table number
        table_number: u8,
    },
    /// Combined size of inputs is larger than any supported variant
    #[error("Unsupported collation size: {size} bits (k={k}, table {table_number})")]
    UnsupportedCollationSize {
        /// Combined size of both inputs in bits
        size: usize,
        /// Size parameter
        k: u8,
        /// Table number
        table_number: u8,
    },
    /// Output doesn't fit into `y`
    #[error("Unsupported k={k}, output of {y_bits} bits doesn't fit into y")]
    UnsupportedK {
        /// Size parameter
        k: u8,
        /// Size of the output in bits
        y_bits: usize,
    },
}

/// Construction used for a particular combined input size
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AtVariant {
    /// Up to 128 bits: `E(x || y)`
    SingleBlock,
    /// 129 to 256 bits: `E(E(x) ^ y)`
    TwoBlocks,
    /// 257 to 384 bits: `E(E(x_low || y_low) ^ E(y_high) ^ E(x_high))`
    ThreeBlocks,
    /// 385 to 512 bits: `E(E(E(x_high) ^ x_low) ^ E(y_high) ^ y_low)`
    FourBlocks,
}

impl AtVariant {
    /// Select variant for combined input size in bits, `None` if it is larger than 512 bits
    #[inline]
    pub const fn from_size(size: usize) -> Option<Self> {
        Some(match size {
            0..=128 => Self::SingleBlock,
            129..=256 => Self::TwoBlocks,
            257..=384 => Self::ThreeBlocks,
            385..=512 => Self::FourBlocks,
            _ => {
                return None;
            }
        })
    }
}

/// AES-256 keyed once per plot
#[derive(Clone)]
pub struct BlockCipher {
    cipher: Aes256,
}

impl fmt::Debug for BlockCipher {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCipher").finish_non_exhaustive()
    }
}

impl BlockCipher {
    /// Create a new instance keyed with 32 bytes key (plot id)
    #[inline]
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256::new(&(*key).into()),
        }
    }

    /// Encrypt a single block, interpreting it as big-endian integer
    #[inline(always)]
    pub fn encrypt(&self, input: u128) -> u128 {
        let mut block = aes::Block::from(input.to_be_bytes());
        self.cipher.encrypt_block(&mut block);

        let mut output = [0; size_of::<u128>()];
        output.copy_from_slice(&block);
        u128::from_be_bytes(output)
    }
}

/// Interpret a value that is known to fit into a single block as such
#[inline(always)]
fn block(value: Metadata) -> u128 {
    debug_assert!(value.bits() <= u128::BITS);
    value.to_u128().unwrap_or_default()
}

/// Compute `At(x, y)` for a table number, returning the most significant `k + PARAM_EXT` bits of
/// the final cipher output.
///
/// `x` and `y` are truncated to `k * collation_size(table_number)` bits each.
pub fn at(
    cipher: &BlockCipher,
    k: u8,
    table_number: u8,
    x: Metadata,
    y: Metadata,
) -> Result<Y, AtError> {
    let collation_size =
        collation_size(table_number).ok_or(AtError::UnsupportedTable { table_number })?;
    let operand_bits = usize::from(k) * collation_size;
    let size = operand_bits * 2;
    let variant = AtVariant::from_size(size).ok_or(AtError::UnsupportedCollationSize {
        size,
        k,
        table_number,
    })?;
    let y_bits = y_size_bits(k);
    if y_bits > u64::BITS as usize {
        return Err(AtError::UnsupportedK { k, y_bits });
    }

    let operand_bits = operand_bits as u32;
    let x = x.truncate(operand_bits);
    let y = y.truncate(operand_bits);

    let output = match variant {
        AtVariant::SingleBlock => cipher.encrypt(block((x << operand_bits) | y)),
        AtVariant::TwoBlocks => {
            let encrypted_x = cipher.encrypt(block(x));
            cipher.encrypt(encrypted_x ^ block(y))
        }
        AtVariant::ThreeBlocks => {
            // High parts are exactly 128 bits, low parts are at most 64 bits each
            let low_bits = operand_bits - u128::BITS;
            let (x_high, x_low) = x.split(low_bits);
            let (y_high, y_low) = y.split(low_bits);

            let encrypted_lows = cipher.encrypt(block((x_low << low_bits) | y_low));
            let encrypted_y_high = cipher.encrypt(block(y_high));
            let encrypted_x_high = cipher.encrypt(block(x_high));

            cipher.encrypt(encrypted_lows ^ encrypted_y_high ^ encrypted_x_high)
        }
        AtVariant::FourBlocks => {
            // High parts are exactly 128 bits, low parts are 65 to 128 bits
            let low_bits = operand_bits - u128::BITS;
            let (x_high, x_low) = x.split(low_bits);
            let (y_high, y_low) = y.split(low_bits);

            let mixed_x = cipher.encrypt(cipher.encrypt(block(x_high)) ^ block(x_low));
            let encrypted_y_high = cipher.encrypt(block(y_high));

            cipher.encrypt(mixed_x ^ encrypted_y_high ^ block(y_low))
        }
    };

    Ok(Y::from((output >> (u128::BITS as usize - y_bits)) as u64))
}
