use std::collections::HashSet;

use internpool::hashers::{blake3_32, compare_bytes, djb2, fnv1a_32};
use internpool::{InternError, InternPool, Interned, PoolOptions, Synchronized, Unsynchronized};
use pretty_assertions::assert_eq;
use rayon::prelude::*;

fn small_pool() -> InternPool<Unsynchronized> {
    InternPool::with_options(
        PoolOptions {
            table_size: 3,
            chunk_capacity: 16,
            ..PoolOptions::default()
        },
        djb2,
        compare_bytes,
    )
}

#[test]
fn test_interning_by_address() {
    let pool = InternPool::new(fnv1a_32, compare_bytes);
    let owned = String::from("red fish");

    let a = pool.intern(b"red fish").unwrap();
    let b = pool.intern(owned.as_bytes()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_ne!(a.as_ptr(), owned.as_ptr());

    let c = pool.intern(b"blue fish").unwrap();
    assert_ne!(a, c);
}

#[test]
fn test_addresses_survive_growth() {
    let pool = small_pool();
    let first = pool.intern(b"one fish").unwrap();
    let first_ptr = first.as_ptr();

    let values: Vec<String> = (0..5000).map(|i| format!("value {}", i)).collect();
    let interned: Vec<Interned<'_>> = values
        .iter()
        .map(|value| pool.intern(value.as_bytes()).unwrap())
        .collect();

    let stats = pool.stats();
    assert_eq!(stats.values, 5001);
    assert!(stats.table_size > 5001);
    assert!(stats.arena.chunks > 1);

    assert_eq!(first.as_ptr(), first_ptr);
    assert_eq!(&*first, b"one fish");
    for (value, copy) in values.iter().zip(&interned) {
        assert_eq!(copy.as_bytes(), value.as_bytes());
        assert_eq!(*copy, pool.intern(value.as_bytes()).unwrap());
    }
    assert_eq!(pool.len(), 5001);
}

#[test]
fn test_snapshot_in_first_seen_order() {
    let pool = small_pool();
    for word in &["one", "fish", "two", "fish", "red", "fish", "blue", "fish"] {
        pool.intern(word.as_bytes()).unwrap();
    }

    let snapshot: Vec<&[u8]> = pool.snapshot().iter().map(|value| value.as_bytes()).collect();
    let expected: [&[u8]; 5] = [b"one", b"fish", b"two", b"red", b"blue"];
    assert_eq!(snapshot, expected.to_vec());
}

#[test]
fn test_large_value_gets_its_own_chunk() {
    let pool: InternPool = InternPool::default();
    pool.intern(b"before").unwrap();

    let big = vec![b'x'; 100_000];
    let stored = pool.intern(&big).unwrap();
    let after = pool.intern(b"after").unwrap();

    assert_eq!(stored.len(), big.len());
    assert_eq!(&*stored, &big[..]);
    assert_eq!(&*after, b"after");

    let arena = pool.stats().arena;
    assert_eq!(arena.chunks, 2);
    assert_eq!(arena.largest_chunk, 1 << 21);
}

#[test]
fn test_any_hash_function() {
    for &hash in &[fnv1a_32 as fn(&[u8]) -> u32, djb2, blake3_32] {
        let pool = InternPool::new(hash, compare_bytes);
        let cat = pool.intern(b"cat").unwrap();
        assert_eq!(cat, pool.intern(b"cat").unwrap());
        assert_eq!(pool.get(b"hat"), None);
    }
}

#[test]
fn test_memory_limit_is_reported() {
    let pool = InternPool::<Unsynchronized>::with_options(
        PoolOptions {
            memory_limit: Some(64 * 1024),
            ..PoolOptions::default()
        },
        fnv1a_32,
        compare_bytes,
    );

    let err = pool.intern(&vec![0u8; 64 * 1024]).unwrap_err();
    assert!(matches!(err, InternError::ChunkAllocation { .. }));
    assert_eq!(
        err.to_string(),
        "failed to allocate an arena chunk of 1048576 bytes"
    );
    assert!(pool.is_empty());
}

#[test]
fn test_concurrent_interning_of_one_value() {
    let pool = InternPool::threadsafe(fnv1a_32, compare_bytes);
    assert!(pool.is_threadsafe());

    let copies: Vec<Interned<'_>> = (0..64)
        .into_par_iter()
        .map(|_| pool.intern(b"same").unwrap())
        .collect();

    assert!(pool.contains(b"same"));
    assert_eq!(pool.len(), 1);

    // Racing callers may have got a superseded copy, but every copy stays
    // readable and later calls agree on one canonical copy.
    for copy in &copies {
        assert_eq!(copy.as_bytes(), b"same");
    }
    let canonical = pool.get(b"same").unwrap();
    assert_eq!(pool.intern(b"same").unwrap(), canonical);
    assert!(copies.contains(&canonical));
}

#[test]
fn test_concurrent_interning_of_many_values() {
    let pool = InternPool::<Synchronized>::with_options(
        PoolOptions {
            recheck_before_append: true,
            ..PoolOptions::default()
        },
        fnv1a_32,
        compare_bytes,
    );

    let addresses: Vec<(u32, usize)> = (0..4000u32)
        .into_par_iter()
        .map(|i| {
            let key = i % 500;
            let value = pool.intern(format!("word {}", key).as_bytes()).unwrap();
            (key, value.as_ptr() as usize)
        })
        .collect();

    assert_eq!(pool.len(), 500);

    // Every caller got the canonical copy back.
    let distinct: HashSet<(u32, usize)> = addresses.into_iter().collect();
    assert_eq!(distinct.len(), 500);
    for (key, address) in distinct {
        let canonical = pool.get(format!("word {}", key).as_bytes()).unwrap();
        assert_eq!(canonical.as_ptr() as usize, address);
    }
}
