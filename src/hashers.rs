//! Ready-made hash and compare functions for byte values.
//!
//! Any hash works with any compare here, since every compare below treats two
//! values as equal only when their bytes are identical.

use std::cmp::Ordering;

const FNV_32_PRIME: u32 = 0x0100_0193;
const FNV_1A_32_OFFSET: u32 = 0x811C_9DC5;

/// 32-bit FNV-1a.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hval = FNV_1A_32_OFFSET;
    for &byte in bytes {
        hval ^= u32::from(byte);
        hval = hval.wrapping_mul(FNV_32_PRIME);
    }
    hval
}

/// Bernstein's djb2: `hash * 33 + byte`, seeded with 5381.
pub fn djb2(bytes: &[u8]) -> u32 {
    bytes.iter().fold(5381u32, |hash, &byte| {
        (hash << 5).wrapping_add(hash).wrapping_add(u32::from(byte))
    })
}

/// The first four bytes of the BLAKE3 digest, little endian.
pub fn blake3_32(bytes: &[u8]) -> u32 {
    let digest = blake3::hash(bytes);
    let head = digest.as_bytes();
    u32::from_le_bytes([head[0], head[1], head[2], head[3]])
}

/// Lexicographic three-way compare: negative, zero or positive.
pub fn compare_bytes(a: &[u8], b: &[u8]) -> i32 {
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}
