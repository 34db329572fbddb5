//! Plotting constants

/// PRNG extension parameter to avoid collisions
pub const PARAM_EXT: u8 = 5;
/// Number of match targets for every left entry
pub const PARAM_M: u16 = 1 << PARAM_EXT;
/// Parameter `B` of the matching function
pub const PARAM_B: u16 = 119;
/// Parameter `C` of the matching function
pub const PARAM_C: u16 = 127;
/// Bucket size in terms of `y` values
pub const PARAM_BC: u16 = PARAM_B * PARAM_C;

/// Number of tables in a plot
pub const NUM_TABLES: u8 = 7;

/// Smallest supported `k`, `x` must have at least [`PARAM_EXT`] bits to extend `y` with
pub const MIN_K: u8 = 6;
/// Largest supported `k`.
///
/// Metadata of tables 3 and 4 is `4 * k` bits and has to fit into
/// [`Metadata`](crate::types::Metadata), while `y` must fit into `u64`.
pub const MAX_K: u8 = 50;

const _: () = {
    assert!(MIN_K > PARAM_EXT);
    assert!(4 * MAX_K as usize <= 256);
    assert!((MAX_K as usize + PARAM_EXT as usize) < (u64::BITS as usize));
};
