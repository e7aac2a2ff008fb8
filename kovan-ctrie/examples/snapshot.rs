//! Example demonstrating snapshots of a lock-free trie under concurrent writes
//!
//! Writers keep updating the map while the main thread takes read-only
//! snapshots; every snapshot stays internally consistent.

use kovan_ctrie::TrieMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() {
    println!("=== Lock-Free Trie Snapshot Demo ===\n");

    let map = Arc::new(TrieMap::new());
    for key in 0..10_000u64 {
        map.insert(key, 0u64);
    }
    println!("Seeded {} entries\n", map.len());

    // 4 writers, each bumping every key in its quarter 50 times
    let start = Instant::now();
    let mut handles = Vec::new();
    for thread_id in 0..4u64 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for round in 1..=50u64 {
                for key in thread_id * 2_500..(thread_id + 1) * 2_500 {
                    map.insert(key, round);
                }
            }
        }));
    }

    // Snapshot while they write
    let mut taken = 0;
    while handles.iter().any(|h| !h.is_finished()) {
        let frozen = map.read_only_snapshot();
        let (count, sum) = frozen.iter().fold((0usize, 0u64), |(n, s), (_, v)| (n + 1, s + v));
        assert_eq!(count, 10_000);
        taken += 1;
        if taken % 10 == 1 {
            println!("snapshot #{taken}: {count} entries, value sum {sum}");
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }
    println!(
        "\nWriters finished in {:?}; took {} consistent snapshots meanwhile",
        start.elapsed(),
        taken
    );

    // Writable snapshots diverge from the source
    let fork = map.snapshot();
    fork.clear();
    fork.insert(u64::MAX, 1);
    println!("Source map: {} entries, fork: {} entries", map.len(), fork.len());
    println!("Fork structure:\n{}", fork.debug_tree());

    println!("=== Demo Complete ===");
}
