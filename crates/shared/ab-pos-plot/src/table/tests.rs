use crate::codec::{Entry, EntryLayout};
use crate::constants::PARAM_BC;
use crate::f1::{F1, write_first_table};
use crate::fx::FxCalculator;
use crate::matching::{BucketEntry, ChiaMatcher, has_match};
use crate::params::bucket_id;
use crate::sort::sort_on_disk;
use crate::storage::{FileSystem, MemoryFile, MemoryFileSystem};
use crate::table::{BucketError, BucketPair, BucketWindow, TableError, build_table};
use crate::table_io::{TableReader, TableWriter};
use crate::types::{Metadata, Position, X, Y};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::collections::BTreeSet;
use std::path::Path;

const BC: u64 = PARAM_BC as u64;

fn bucket_entry(position: u64, y: u64) -> BucketEntry {
    BucketEntry {
        position: Position::from(position),
        y: Y::from(y),
        metadata: Metadata::from(position),
    }
}

/// Entries with the given bucket ids, `r` grows within each bucket
fn entries_in_buckets(bucket_ids: &[u64]) -> Vec<BucketEntry> {
    bucket_ids
        .iter()
        .enumerate()
        .map(|(position, &id)| bucket_entry(position as u64, id * BC + position as u64))
        .collect()
}

fn push_all(window: &mut BucketWindow, entries: &[BucketEntry]) -> Vec<BucketPair> {
    entries
        .iter()
        .filter_map(|&entry| window.push(entry).unwrap())
        .collect()
}

#[test]
fn last_pair_is_flushed() {
    let entries = entries_in_buckets(&[0, 0, 0, 1, 1]);
    let mut window = BucketWindow::new(100);

    assert!(push_all(&mut window, &entries).is_empty());
    assert_eq!(
        window.flush(),
        Some(BucketPair {
            left: entries[..3].to_vec(),
            right: entries[3..].to_vec(),
        })
    );
}

#[test]
fn window_slides_and_restarts() {
    let entries = entries_in_buckets(&[3, 4, 4, 5, 9, 10, 10]);
    let mut window = BucketWindow::new(100);

    let pairs = push_all(&mut window, &entries);
    assert_eq!(
        pairs,
        [
            BucketPair {
                left: entries[..1].to_vec(),
                right: entries[1..3].to_vec(),
            },
            BucketPair {
                left: entries[1..3].to_vec(),
                right: entries[3..4].to_vec(),
            },
        ]
    );
    assert_eq!(window.bucket_id(), 9);
    assert_eq!(
        window.flush(),
        Some(BucketPair {
            left: entries[4..5].to_vec(),
            right: entries[5..].to_vec(),
        })
    );
}

#[test]
fn empty_buckets_produce_no_pairs() {
    // Right bucket of 0 is empty, then left bucket of 2 is empty
    let entries = entries_in_buckets(&[0, 0, 2, 2, 4]);
    let mut window = BucketWindow::new(100);
    assert!(push_all(&mut window, &entries).is_empty());
    assert_eq!(window.flush(), None);

    // Only the right bucket of the initial window
    let mut window = BucketWindow::new(100);
    assert!(push_all(&mut window, &entries_in_buckets(&[1, 1])).is_empty());
    assert_eq!(window.flush(), None);

    assert_eq!(BucketWindow::new(100).flush(), None);
}

#[test]
fn pairs_are_exactly_adjacent_non_empty_buckets() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for _ in 0..100 {
        let mut bucket_ids = Vec::new();
        let mut id = 0;
        for _ in 0..200 {
            // Steps of 0 to 3 buckets
            id += u64::from(rng.next_u32() % 8).saturating_sub(4);
            bucket_ids.push(id);
        }
        let entries = entries_in_buckets(&bucket_ids);

        let mut window = BucketWindow::new(1000);
        let mut pairs = push_all(&mut window, &entries);
        pairs.extend(window.flush());

        let present = bucket_ids.iter().copied().collect::<BTreeSet<_>>();
        let expected = present
            .iter()
            .copied()
            .filter(|id| present.contains(&(id + 1)))
            .collect::<Vec<_>>();

        let actual = pairs
            .iter()
            .map(|pair| {
                let left_id = bucket_id(pair.left[0].y);
                for entry in &pair.left {
                    assert_eq!(bucket_id(entry.y), left_id);
                }
                for entry in &pair.right {
                    assert_eq!(bucket_id(entry.y), left_id + 1);
                }
                assert_eq!(
                    pair.left.len() + pair.right.len(),
                    bucket_ids
                        .iter()
                        .filter(|&&id| id == left_id || id == left_id + 1)
                        .count()
                );
                left_id
            })
            .collect::<Vec<_>>();

        assert_eq!(actual, expected);
    }
}

#[test]
fn invalid_streams() {
    let mut window = BucketWindow::new(100);
    push_all(&mut window, &entries_in_buckets(&[5, 6]));
    assert_eq!(
        window.push(bucket_entry(2, 4 * BC)),
        Err(BucketError::Unsorted {
            bucket_id: 4,
            current_bucket_id: 5
        })
    );
    assert_eq!(
        window.push(bucket_entry(2, 5 * BC)),
        Err(BucketError::Unsorted {
            bucket_id: 5,
            current_bucket_id: 5
        })
    );

    let mut window = BucketWindow::new(2);
    push_all(&mut window, &entries_in_buckets(&[0, 0, 1, 1]));
    assert_eq!(
        window.push(bucket_entry(4, BC + 10)),
        Err(BucketError::BucketTooLarge {
            bucket_id: 1,
            max_bucket_size: 2
        })
    );
}

fn memory_file() -> MemoryFile {
    MemoryFileSystem::default().create(Path::new("plot")).unwrap()
}

/// Write first table entries sorted by `y`, returns the start of the next table
fn write_parent_table(file: &MemoryFile, k: u8, ys: &[u64]) -> u64 {
    let layout = EntryLayout::new(k, 1).unwrap();
    let mut writer = TableWriter::new(file, layout, 0);
    for (x, &y) in ys.iter().enumerate() {
        writer
            .write(&Entry::First {
                y: Y::from(y),
                x: X::from(x as u64),
            })
            .unwrap();
    }
    let stats = writer.finish().unwrap();
    stats.bytes + layout.entry_len() as u64
}

fn read_table(file: &MemoryFile, k: u8, table_number: u8, start: u64) -> Vec<Entry> {
    let layout = EntryLayout::new(k, table_number).unwrap();
    let mut reader = TableReader::new(file, layout, start).unwrap();
    let mut entries = Vec::new();
    while let Some((_position, entry)) = reader.next_entry().unwrap() {
        entries.push(entry);
    }
    assert!(reader.reached_sentinel());
    entries
}

/// All matches of a sorted parent table, found pair by pair
fn brute_force_table(fx: &FxCalculator, table_number: u8, parent: &[Entry]) -> BTreeSet<Entry> {
    let mut entries = BTreeSet::new();
    for (left_position, left) in parent.iter().enumerate() {
        for (right_position, right) in parent.iter().enumerate() {
            if !has_match(left.y(), right.y()) {
                continue;
            }
            let (y, metadata) = fx
                .compute(table_number, left.y(), left.metadata(), right.metadata())
                .unwrap();
            entries.insert(Entry::Other {
                y,
                positions: [
                    Position::from(left_position as u64),
                    Position::from(right_position as u64),
                ],
                metadata,
            });
        }
    }
    entries
}

#[test]
fn matches_final_bucket_pair() {
    let k = 10;
    let fx = FxCalculator::new(k, &[1; 32]);
    let right_r = (0..BC)
        .find(|&r| {
            has_match(Y::from(7), Y::from(BC + r)) && !has_match(Y::from(3), Y::from(BC + r))
        })
        .unwrap();

    // Nothing after the second bucket
    let ys = [3, 7, BC + right_r];
    let file = memory_file();
    let start = write_parent_table(&file, k, &ys);

    let stats = build_table(&file, &fx, &mut ChiaMatcher::default(), 2, 0, start, 100).unwrap();
    assert_eq!(stats.entries, 1);

    let (y, metadata) = fx
        .compute(2, Y::from(7), Metadata::from(1_u64), Metadata::from(2_u64))
        .unwrap();
    assert_eq!(
        read_table(&file, k, 2, start),
        [Entry::Other {
            y,
            positions: [Position::from(1), Position::from(2)],
            metadata,
        }]
    );
}

#[test]
fn gap_between_buckets_produces_nothing() {
    let k = 10;
    let fx = FxCalculator::new(k, &[1; 32]);

    // Buckets 0 and 2 only
    let ys = [3, 7, 2 * BC, 2 * BC + 5];
    let file = memory_file();
    let start = write_parent_table(&file, k, &ys);

    let stats = build_table(&file, &fx, &mut ChiaMatcher::default(), 2, 0, start, 100).unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.bytes, 0);
    assert!(read_table(&file, k, 2, start).is_empty());
}

#[test]
fn second_table_equals_brute_force() {
    let k = 12;
    let plot_id = [5; 32];
    let file = memory_file();

    let f1 = F1::new(k, plot_id).unwrap();
    let stats = write_first_table(&file, &f1, 0).unwrap();
    let entry_len = EntryLayout::new(k, 1).unwrap().entry_len();
    sort_on_disk::<_, MemoryFile>(&file, None, 0, stats.bytes, stats.bytes, entry_len).unwrap();
    let parent = read_table(&file, k, 1, 0);

    let fx = FxCalculator::new(k, &plot_id);
    let start = stats.bytes + entry_len as u64;
    let table_stats =
        build_table(&file, &fx, &mut ChiaMatcher::default(), 2, 0, start, 10_000).unwrap();

    let entries = read_table(&file, k, 2, start);
    assert!(!entries.is_empty());
    assert_eq!(table_stats.entries, entries.len() as u64);
    assert_eq!(
        entries.iter().copied().collect::<BTreeSet<_>>(),
        brute_force_table(&fx, 2, &parent)
    );
}

#[test]
fn build_failures() {
    let k = 10;
    let fx = FxCalculator::new(k, &[1; 32]);
    let file = memory_file();
    let start = write_parent_table(&file, k, &[BC, 3, 4]);

    let error = build_table(&file, &fx, &mut ChiaMatcher::default(), 2, 0, start, 100)
        .unwrap_err();
    assert_eq!(error.bytes_written, 0);
    assert!(matches!(
        error.error,
        TableError::Bucket(BucketError::Unsorted { .. })
    ));

    for table_number in [1, 8] {
        let error =
            build_table(&file, &fx, &mut ChiaMatcher::default(), table_number, 0, start, 100)
                .unwrap_err();
        assert!(matches!(error.error, TableError::Layout(_)));
    }
}
