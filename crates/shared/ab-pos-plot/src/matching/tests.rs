use crate::constants::PARAM_BC;
use crate::matching::{BucketEntry, ChiaMatcher, FindMatches, Match, has_match};
use crate::types::{Metadata, Position, Y};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

fn random_bucket(rng: &mut ChaCha8Rng, bucket_id: u64, len: usize) -> Vec<BucketEntry> {
    let mut ys = (0..len)
        .map(|_| bucket_id * u64::from(PARAM_BC) + rng.next_u64() % u64::from(PARAM_BC))
        .collect::<Vec<_>>();
    ys.sort_unstable();

    ys.into_iter()
        .zip(0..)
        .map(|(y, position)| BucketEntry {
            position: Position::from(position),
            y: Y::from(y),
            metadata: Metadata::ZERO,
        })
        .collect()
}

fn brute_force(left: &[BucketEntry], right: &[BucketEntry]) -> Vec<Match> {
    let mut matches = Vec::new();
    for (left_offset, left_entry) in left.iter().enumerate() {
        for (right_offset, right_entry) in right.iter().enumerate() {
            if has_match(left_entry.y, right_entry.y) {
                matches.push(Match {
                    left: left_offset,
                    right: right_offset,
                });
            }
        }
    }
    matches
}

#[test]
fn same_matches_as_brute_force() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let mut matcher = ChiaMatcher::default();
    let mut total_matches = 0;

    // Both parities of the left bucket id
    for left_bucket_id in [0, 1, 10, 11, 1000] {
        let left = random_bucket(&mut rng, left_bucket_id, 400);
        let right = random_bucket(&mut rng, left_bucket_id + 1, 400);

        let mut matches = Vec::new();
        matcher.find_matches(&left, &right, &mut matches);

        let mut expected = brute_force(&left, &right);
        let mut sorted_matches = matches.clone();
        sorted_matches.sort_unstable_by_key(|m| (m.left, m.right));
        expected.sort_unstable_by_key(|m| (m.left, m.right));
        assert_eq!(sorted_matches, expected, "left bucket {left_bucket_id}");

        // Deterministic and order-stable
        let mut matches_again = Vec::new();
        matcher.find_matches(&left, &right, &mut matches_again);
        assert_eq!(matches, matches_again);

        total_matches += matches.len();
    }

    assert!(total_matches > 0);
}

#[test]
fn duplicate_right_ys() {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let mut matcher = ChiaMatcher::default();
    let left = random_bucket(&mut rng, 4, 200);
    let mut right = random_bucket(&mut rng, 5, 200);
    // Duplicate every entry, keeping the bucket sorted
    right = right.into_iter().flat_map(|entry| [entry, entry]).collect();

    let mut matches = Vec::new();
    matcher.find_matches(&left, &right, &mut matches);
    let mut expected = brute_force(&left, &right);

    matches.sort_unstable_by_key(|m| (m.left, m.right));
    expected.sort_unstable_by_key(|m| (m.left, m.right));
    assert_eq!(matches, expected);
}

#[test]
fn no_matches_for_empty_or_distant_buckets() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut matcher = ChiaMatcher::default();
    let left = random_bucket(&mut rng, 6, 100);
    let right = random_bucket(&mut rng, 7, 100);
    let distant = random_bucket(&mut rng, 8, 100);

    let mut matches = Vec::new();
    matcher.find_matches(&left, &[], &mut matches);
    matcher.find_matches(&[], &right, &mut matches);
    matcher.find_matches(&left, &distant, &mut matches);
    assert!(matches.is_empty());

    for (left_entry, distant_entry) in left.iter().zip(&distant) {
        assert!(!has_match(left_entry.y, distant_entry.y));
        assert!(!has_match(distant_entry.y, left_entry.y));
    }
}
