//! Selection of matching pairs between two adjacent buckets

#[cfg(test)]
mod tests;

use crate::constants::{PARAM_B, PARAM_BC, PARAM_C, PARAM_M};
use crate::params::bucket_id;
use crate::types::{Metadata, Position, Y};
use core::array;

/// Entry of a bucket as seen by the table builder
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct BucketEntry {
    /// Position in the parent table
    pub position: Position,
    /// `y` of the entry
    pub y: Y,
    /// Metadata of the entry (`x` for the first table)
    pub metadata: Metadata,
}

/// Matching pair, offsets into the left and right bucket respectively
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Match {
    /// Offset within the left bucket
    pub left: usize,
    /// Offset within the right bucket
    pub right: usize,
}

/// Match-selection rule applied to a pair of adjacent buckets.
///
/// Implementations must be deterministic, must produce matches in a stable order and must not
/// produce duplicates.
pub trait FindMatches {
    /// Append matches between `left` and `right` buckets to `matches`.
    ///
    /// The right bucket is expected to have bucket id one larger than the left bucket, entries of
    /// both are sorted by `y`.
    fn find_matches(
        &mut self,
        left: &[BucketEntry],
        right: &[BucketEntry],
        matches: &mut Vec<Match>,
    );
}

/// Mapping from `parity` to `r` to `m`, flattened as `parity * PARAM_BC + r`
type LeftTargets = Vec<[u16; PARAM_M as usize]>;

fn calculate_left_targets() -> LeftTargets {
    let mut left_targets = Vec::with_capacity(2 * usize::from(PARAM_BC));

    for parity in 0..=1 {
        for r in 0..PARAM_BC {
            let c = r / PARAM_C;

            let mut arr = array::from_fn(|m| {
                let m = m as u16;
                ((c + m) % PARAM_B) * PARAM_C
                    + (((2 * m + parity) * (2 * m + parity) + r) % PARAM_C)
            });
            arr.sort_unstable();
            left_targets.push(arr);
        }
    }

    left_targets
}

fn calculate_left_target_on_demand(parity: u32, r: u32, m: u32) -> u32 {
    let param_b = u32::from(PARAM_B);
    let param_c = u32::from(PARAM_C);

    ((r / param_c + m) % param_b) * param_c + (((2 * m + parity) * (2 * m + parity) + r) % param_c)
}

/// Start offset and count of entries with the same `r` in the right bucket
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
struct RmapItem {
    start: u32,
    count: u32,
}

/// Chia-style matcher: `left.y` and `right.y` in adjacent buckets match if the remainder of
/// `right.y` is one of `PARAM_M` targets derived from the remainder of `left.y` and the parity of
/// the left bucket id.
#[derive(Debug, Clone)]
pub struct ChiaMatcher {
    left_targets: LeftTargets,
    rmap: Vec<RmapItem>,
}

impl Default for ChiaMatcher {
    fn default() -> Self {
        Self {
            left_targets: calculate_left_targets(),
            rmap: vec![RmapItem::default(); usize::from(PARAM_BC)],
        }
    }
}

impl FindMatches for ChiaMatcher {
    fn find_matches(
        &mut self,
        left: &[BucketEntry],
        right: &[BucketEntry],
        matches: &mut Vec<Match>,
    ) {
        let (Some(first_left), Some(first_right)) = (left.first(), right.first()) else {
            return;
        };
        let left_bucket_id = bucket_id(first_left.y);
        if bucket_id(first_right.y) != left_bucket_id + 1 {
            return;
        }

        let right_base = (left_bucket_id + 1) * u64::from(PARAM_BC);
        for (offset, entry) in right.iter().enumerate() {
            let r = (entry.y.as_u64() - right_base) as usize;
            // The same `y` and as a result `r` can appear in the bucket multiple times, in which
            // case they'll all occupy consecutive slots and all we need to store is just the first
            // offset and number of elements
            let rmap_item = &mut self.rmap[r];
            if rmap_item.count == 0 {
                rmap_item.start = offset as u32;
            }
            rmap_item.count += 1;
        }

        let left_base = left_bucket_id * u64::from(PARAM_BC);
        let parity = (left_bucket_id % 2) as usize;
        let left_targets_parity = &self.left_targets[parity * usize::from(PARAM_BC)..];

        for (left_offset, entry) in left.iter().enumerate() {
            let r = (entry.y.as_u64() - left_base) as usize;

            for &target in &left_targets_parity[r] {
                let rmap_item = self.rmap[usize::from(target)];

                for right_offset in rmap_item.start..rmap_item.start + rmap_item.count {
                    matches.push(Match {
                        left: left_offset,
                        right: right_offset as usize,
                    });
                }
            }
        }

        // Reset only what was touched
        for entry in right {
            self.rmap[(entry.y.as_u64() - right_base) as usize] = RmapItem::default();
        }
    }
}

/// Simplified version of [`ChiaMatcher`] for verification purposes
pub fn has_match(left_y: Y, right_y: Y) -> bool {
    let left_bucket_id = bucket_id(left_y);
    if bucket_id(right_y) != left_bucket_id + 1 {
        return false;
    }

    let param_bc = u64::from(PARAM_BC);
    let right_r = (right_y.as_u64() % param_bc) as u32;
    let parity = (left_bucket_id % 2) as u32;
    let left_r = (left_y.as_u64() % param_bc) as u32;

    let r_targets = array::from_fn::<_, { PARAM_M as usize }, _>(|i| {
        calculate_left_target_on_demand(parity, left_r, i as u32)
    });

    r_targets.contains(&right_r)
}
