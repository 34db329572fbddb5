//! Value types of table entries


use core::ops::{BitAnd, BitOr, BitXor, BitXorAssign, Shl, Shr};
use derive_more::{Display, From, Into};

/// Stores data in lower bits
#[derive(Debug, Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Display, From, Into)]
#[repr(C)]
pub struct X(u64);

impl X {
    /// Value as `u64`
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Stores data in lower bits
#[derive(Debug, Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Display, From, Into)]
#[repr(C)]
pub struct Y(u64);

impl Y {
    /// Value as `u64`
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Position of an entry in a table, assigned in read order
#[derive(Debug, Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Display, From, Into)]
#[repr(C)]
pub struct Position(u64);

impl Position {
    /// First position in a table
    pub const ZERO: Self = Self(0);
    /// One position further
    pub const ONE: Self = Self(1);

    /// Value as `u64`
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Next position
    #[inline(always)]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Metadata of an entry, up to 256 bits stored in lower bits.
///
/// Kept as two 128-bit halves, which is also how the keyed hash consumes wide values.
#[derive(Debug, Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Metadata {
    high: u128,
    low: u128,
}

impl From<u128> for Metadata {
    #[inline(always)]
    fn from(low: u128) -> Self {
        Self { high: 0, low }
    }
}

impl From<u64> for Metadata {
    #[inline(always)]
    fn from(value: u64) -> Self {
        Self::from(u128::from(value))
    }
}

impl From<X> for Metadata {
    #[inline(always)]
    fn from(x: X) -> Self {
        Self::from(x.0)
    }
}

impl BitXor for Metadata {
    type Output = Self;

    #[inline(always)]
    fn bitxor(self, other: Self) -> Self {
        Self {
            high: self.high ^ other.high,
            low: self.low ^ other.low,
        }
    }
}

impl BitXorAssign for Metadata {
    #[inline(always)]
    fn bitxor_assign(&mut self, rhs: Self) {
        *self = *self ^ rhs;
    }
}

impl BitOr for Metadata {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, other: Self) -> Self {
        Self {
            high: self.high | other.high,
            low: self.low | other.low,
        }
    }
}

impl BitAnd for Metadata {
    type Output = Self;

    #[inline(always)]
    fn bitand(self, other: Self) -> Self {
        Self {
            high: self.high & other.high,
            low: self.low & other.low,
        }
    }
}

impl Shl<u32> for Metadata {
    type Output = Self;

    /// Shifts beyond 256 bits produce zero
    #[inline]
    fn shl(self, rhs: u32) -> Self {
        match rhs {
            0 => self,
            1..128 => Self {
                high: (self.high << rhs) | (self.low >> (u128::BITS - rhs)),
                low: self.low << rhs,
            },
            128..256 => Self {
                high: self.low << (rhs - u128::BITS),
                low: 0,
            },
            _ => Self::ZERO,
        }
    }
}

impl Shr<u32> for Metadata {
    type Output = Self;

    /// Shifts beyond 256 bits produce zero
    #[inline]
    fn shr(self, rhs: u32) -> Self {
        match rhs {
            0 => self,
            1..128 => Self {
                high: self.high >> rhs,
                low: (self.low >> rhs) | (self.high << (u128::BITS - rhs)),
            },
            128..256 => Self {
                high: 0,
                low: self.high >> (rhs - u128::BITS),
            },
            _ => Self::ZERO,
        }
    }
}

impl Metadata {
    /// Size of the big-endian byte representation
    pub const SIZE: usize = 32;
    /// Number of bits available
    pub const BITS: u32 = 256;
    /// Zero value
    pub const ZERO: Self = Self { high: 0, low: 0 };

    /// Value with `bits` lower bits set
    #[inline]
    pub fn mask(bits: u32) -> Self {
        if bits >= Self::BITS {
            return Self {
                high: u128::MAX,
                low: u128::MAX,
            };
        }
        if bits == 0 {
            return Self::ZERO;
        }
        // `bits` ones shifted into place: `(1 << bits) - 1` without overflowing
        Self {
            high: u128::MAX,
            low: u128::MAX,
        } >> (Self::BITS - bits)
    }

    /// Keep only `bits` lower bits
    #[inline]
    pub fn truncate(self, bits: u32) -> Self {
        self & Self::mask(bits)
    }

    /// Split into `(high, low)` where `low` holds `low_bits` lower bits and `high` the rest
    #[inline]
    pub fn split(self, low_bits: u32) -> (Self, Self) {
        (self >> low_bits, self.truncate(low_bits))
    }

    /// Number of significant bits
    #[inline]
    pub fn bits(self) -> u32 {
        if self.high != 0 {
            Self::BITS - self.high.leading_zeros()
        } else {
            u128::BITS - self.low.leading_zeros()
        }
    }

    /// Returns the value if it fits into `u128`
    #[inline]
    pub fn to_u128(self) -> Option<u128> {
        (self.high == 0).then_some(self.low)
    }

    /// Big-endian representation
    #[inline]
    pub fn to_be_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        let (high, low) = bytes.split_at_mut(Self::SIZE / 2);
        high.copy_from_slice(&self.high.to_be_bytes());
        low.copy_from_slice(&self.low.to_be_bytes());
        bytes
    }

    /// Create from big-endian representation
    #[inline]
    pub fn from_be_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let (high, low) = bytes.split_at(Self::SIZE / 2);
        Self {
            high: u128::from_be_bytes(high.try_into().expect("Exactly 16 bytes; qed")),
            low: u128::from_be_bytes(low.try_into().expect("Exactly 16 bytes; qed")),
        }
    }
}
