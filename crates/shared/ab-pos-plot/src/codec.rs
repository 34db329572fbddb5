//! Fixed-width entry encoding.
//!
//! Every field is big-endian and byte aligned, `y` goes first so that sorting raw entries
//! lexicographically sorts them by `y`. The `y` field always has at least one spare high bit, which
//! makes the all-`0xff` end-of-table sentinel impossible to confuse with a valid entry.


use crate::constants::NUM_TABLES;
use crate::params::{metadata_size_bits, y_size_bits};
use crate::types::{Metadata, Position, X, Y};
use thiserror::Error;

/// Byte the end-of-table sentinel consists of
pub const SENTINEL_BYTE: u8 = 0xff;

/// Errors happening when encoding or decoding entries
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum CodecError {
    /// Table number outside of `1..=7`
    #[error("Unsupported table number {table_number}")]
    UnsupportedTable {
        /// Table number
        table_number: u8,
    },
    /// Entry kind doesn't match the table
    #[error("Wrong entry kind for table {table_number}")]
    WrongEntryKind {
        /// Table number
        table_number: u8,
    },
    /// Buffer length doesn't match entry length
    #[error("Expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Entry length
        expected: usize,
        /// Provided buffer length
        actual: usize,
    },
    /// `y` doesn't fit into `k + PARAM_EXT` bits
    #[error("Invalid y {y}, must fit into {bits} bits")]
    InvalidY {
        /// Offending value
        y: u64,
        /// Number of bits available
        bits: usize,
    },
    /// `x` doesn't fit into `k` bits
    #[error("Invalid x {x}, must fit into {bits} bits")]
    InvalidX {
        /// Offending value
        x: u64,
        /// Number of bits available
        bits: usize,
    },
    /// Position doesn't fit into `k + 1` bits
    #[error("Position {position} overflows {bits} bits")]
    PositionOverflow {
        /// Offending value
        position: u64,
        /// Number of bits available
        bits: usize,
    },
    /// Metadata doesn't fit into metadata size of the table
    #[error("Metadata of {metadata_bits} bits overflows {bits} bits")]
    MetadataOverflow {
        /// Size of the offending value in bits
        metadata_bits: u32,
        /// Number of bits available
        bits: usize,
    },
}

/// Decoded entry of a table
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum Entry {
    /// Entry of the first table
    First {
        /// `y` of the entry
        y: Y,
        /// `x` the entry was derived from
        x: X,
    },
    /// Entry of tables 2 to 7
    Other {
        /// `y` of the entry
        y: Y,
        /// Back-pointers: left and right positions in the parent table
        positions: [Position; 2],
        /// Collated metadata, always zero in the last table
        metadata: Metadata,
    },
}

impl Entry {
    /// `y` of the entry
    #[inline]
    pub fn y(&self) -> Y {
        match self {
            Self::First { y, .. } | Self::Other { y, .. } => *y,
        }
    }

    /// Metadata of the entry, `x` in case of the first table
    #[inline]
    pub fn metadata(&self) -> Metadata {
        match self {
            Self::First { x, .. } => Metadata::from(*x),
            Self::Other { metadata, .. } => *metadata,
        }
    }
}

/// Byte layout of entries of a particular table
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EntryLayout {
    k: u8,
    table_number: u8,
    y_bytes: usize,
    x_bytes: usize,
    position_bytes: usize,
    metadata_bytes: usize,
}

#[inline(always)]
fn write_be(output: &mut [u8], value: u64) {
    output.copy_from_slice(&value.to_be_bytes()[size_of::<u64>() - output.len()..]);
}

#[inline(always)]
fn read_be(input: &[u8]) -> u64 {
    let mut bytes = [0; size_of::<u64>()];
    bytes[size_of::<u64>() - input.len()..].copy_from_slice(input);
    u64::from_be_bytes(bytes)
}

impl EntryLayout {
    /// Create layout for table `table_number` (`1..=7`)
    pub fn new(k: u8, table_number: u8) -> Result<Self, CodecError> {
        if !(1..=NUM_TABLES).contains(&table_number) {
            return Err(CodecError::UnsupportedTable { table_number });
        }

        let y_bytes = (y_size_bits(k) + 1).div_ceil(u8::BITS as usize);
        let (x_bytes, position_bytes, metadata_bytes) = if table_number == 1 {
            (usize::from(k).div_ceil(u8::BITS as usize), 0, 0)
        } else {
            (
                0,
                (usize::from(k) + 1).div_ceil(u8::BITS as usize),
                metadata_size_bits(k, table_number).div_ceil(u8::BITS as usize),
            )
        };

        Ok(Self {
            k,
            table_number,
            y_bytes,
            x_bytes,
            position_bytes,
            metadata_bytes,
        })
    }

    /// Size parameter
    #[inline(always)]
    pub fn k(&self) -> u8 {
        self.k
    }

    /// Table number
    #[inline(always)]
    pub fn table_number(&self) -> u8 {
        self.table_number
    }

    /// Length of a single encoded entry in bytes
    #[inline(always)]
    pub fn entry_len(&self) -> usize {
        self.y_bytes + self.x_bytes + 2 * self.position_bytes + self.metadata_bytes
    }

    /// Whether `bytes` is the end-of-table sentinel
    #[inline]
    pub fn is_sentinel(&self, bytes: &[u8]) -> bool {
        bytes.len() == self.entry_len() && bytes.iter().all(|&byte| byte == SENTINEL_BYTE)
    }

    /// Fill `output` with the end-of-table sentinel
    #[inline]
    pub fn write_sentinel(&self, output: &mut [u8]) -> Result<(), CodecError> {
        self.check_len(output.len())?;
        output.fill(SENTINEL_BYTE);
        Ok(())
    }

    fn check_len(&self, actual: usize) -> Result<(), CodecError> {
        let expected = self.entry_len();
        if actual == expected {
            Ok(())
        } else {
            Err(CodecError::WrongLength { expected, actual })
        }
    }

    fn check_y(&self, y: Y) -> Result<(), CodecError> {
        let bits = y_size_bits(self.k);
        if y.as_u64() >> bits == 0 {
            Ok(())
        } else {
            Err(CodecError::InvalidY { y: y.as_u64(), bits })
        }
    }

    /// Encode `entry` into `output`, which must be exactly [`Self::entry_len()`] bytes
    pub fn encode(&self, entry: &Entry, output: &mut [u8]) -> Result<(), CodecError> {
        self.check_len(output.len())?;
        self.check_y(entry.y())?;

        let (y_output, output) = output.split_at_mut(self.y_bytes);
        write_be(y_output, entry.y().as_u64());

        match (self.table_number, entry) {
            (1, Entry::First { x, .. }) => {
                let bits = usize::from(self.k);
                if x.as_u64() >> bits != 0 {
                    return Err(CodecError::InvalidX {
                        x: x.as_u64(),
                        bits,
                    });
                }
                write_be(output, x.as_u64());
            }
            (
                2..=NUM_TABLES,
                Entry::Other {
                    positions,
                    metadata,
                    ..
                },
            ) => {
                let bits = usize::from(self.k) + 1;
                let (positions_output, metadata_output) =
                    output.split_at_mut(2 * self.position_bytes);
                for (position, output) in positions
                    .iter()
                    .zip(positions_output.chunks_exact_mut(self.position_bytes))
                {
                    if position.as_u64() >> bits != 0 {
                        return Err(CodecError::PositionOverflow {
                            position: position.as_u64(),
                            bits,
                        });
                    }
                    write_be(output, position.as_u64());
                }

                let bits = metadata_size_bits(self.k, self.table_number);
                // Last table carries no metadata, whatever was computed is dropped
                if bits > 0 {
                    if metadata.bits() as usize > bits {
                        return Err(CodecError::MetadataOverflow {
                            metadata_bits: metadata.bits(),
                            bits,
                        });
                    }
                    metadata_output.copy_from_slice(
                        &metadata.to_be_bytes()[Metadata::SIZE - self.metadata_bytes..],
                    );
                }
            }
            _ => {
                return Err(CodecError::WrongEntryKind {
                    table_number: self.table_number,
                });
            }
        }

        Ok(())
    }

    /// Decode an entry from `input`, which must be exactly [`Self::entry_len()`] bytes and must not
    /// be the sentinel
    pub fn decode(&self, input: &[u8]) -> Result<Entry, CodecError> {
        self.check_len(input.len())?;

        let (y_input, input) = input.split_at(self.y_bytes);
        let y = Y::from(read_be(y_input));
        self.check_y(y)?;

        if self.table_number == 1 {
            return Ok(Entry::First {
                y,
                x: X::from(read_be(input)),
            });
        }

        let (positions_input, metadata_input) = input.split_at(2 * self.position_bytes);
        let (left_position, right_position) = positions_input.split_at(self.position_bytes);
        let mut metadata = [0; Metadata::SIZE];
        metadata[Metadata::SIZE - self.metadata_bytes..].copy_from_slice(metadata_input);

        Ok(Entry::Other {
            y,
            positions: [
                Position::from(read_be(left_position)),
                Position::from(read_be(right_position)),
            ],
            metadata: Metadata::from_be_bytes(metadata),
        })
    }
}
