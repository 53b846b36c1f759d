//! Value interning: one canonical, stably addressed copy per distinct byte
//! value, so equal values can be compared by address.
//!
//! ```
//! use internpool::InternPool;
//! use internpool::hashers::{compare_bytes, fnv1a_32};
//!
//! let pool = InternPool::new(fnv1a_32, compare_bytes);
//! let a = pool.intern(b"hello").unwrap();
//! let b = pool.intern(b"hello").unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.as_ptr(), b.as_ptr());
//! ```
//!
//! [`InternPool`] is built from two parts that are usable on their own: the
//! open-addressing [`HashSet`](hash_set::HashSet) that deduplicates, and the
//! chunked [`Arena`](arena::Arena) that keeps every copy at a fixed address.

pub mod arena;
mod error;
mod growth;
pub mod hash_set;
pub mod hashers;
mod interner;
mod lock;
mod stats;

pub use error::InternError;
pub use growth::{checked_nearest_pow2_gte, nearest_pow2_gte};
pub use interner::{ByteCompareFn, ByteHashFn, InternPool, Interned, PoolOptions};
pub use lock::{Synchronization, Synchronized, Unsynchronized};
pub use stats::{ArenaStats, PoolStats};
