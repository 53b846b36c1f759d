use std::cell::UnsafeCell;
use std::cmp;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::slice;

use parking_lot::lock_api::RawRwLock;

use crate::arena::{Arena, DEFAULT_CHUNK_CAPACITY};
use crate::error::InternError;
use crate::hash_set::{HashSet, KeyOps, DEFAULT_TABLE_SIZE};
use crate::hashers::{compare_bytes, fnv1a_32};
use crate::lock::{ExclusiveGuard, SharedGuard, Synchronization, Synchronized, Unsynchronized};
use crate::stats::PoolStats;

/// Hash function over a value's bytes. Must be pure and deterministic.
pub type ByteHashFn = fn(&[u8]) -> u32;

/// Comparator over two values' bytes, zero meaning equal. Values that compare
/// equal must hash equal under the [`ByteHashFn`] they are paired with.
pub type ByteCompareFn = fn(&[u8], &[u8]) -> i32;

/// Adapts the byte functions to the pointer-and-size entries kept in the set.
#[derive(Clone, Copy)]
struct ByteOps {
    hash: ByteHashFn,
    compare: ByteCompareFn,
}

/// # Safety
///
/// `ptr` must be valid for reads of `size` bytes for `'a`.
#[inline]
unsafe fn bytes_at<'a>(ptr: NonNull<u8>, size: u32) -> &'a [u8] {
    slice::from_raw_parts(ptr.as_ptr(), size as usize)
}

// SAFETY (both methods): the set only ever holds pointers into the pool's
// arena, and is only ever probed with a pointer to the caller's slice for the
// duration of the call. Both are valid for `size` bytes whenever the set
// calls back into these.
impl KeyOps<NonNull<u8>> for ByteOps {
    #[inline]
    fn hash(&self, value: &NonNull<u8>, size: u32) -> u32 {
        (self.hash)(unsafe { bytes_at(*value, size) })
    }

    #[inline]
    fn compare(&self, a: &NonNull<u8>, a_size: u32, b: &NonNull<u8>, b_size: u32) -> i32 {
        let (a, b) = unsafe { (bytes_at(*a, a_size), bytes_at(*b, b_size)) };
        (self.compare)(a, b)
    }
}

/// Construction-time settings of an [`InternPool`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolOptions {
    /// Initial hash table size, at least 1.
    pub table_size: u32,
    /// Smallest chunk the arena allocates, in bytes.
    pub chunk_capacity: u32,
    /// Upper bound on the arena's total chunk memory.
    pub memory_limit: Option<usize>,
    /// Look the value up again under the exclusive lock before copying it.
    ///
    /// Off by default: two threads missing on the same value at once then
    /// both copy it, and the later copy becomes the canonical one. Turning this
    /// on makes every caller get the canonical copy at the cost of a second
    /// probe on every miss.
    pub recheck_before_append: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            table_size: DEFAULT_TABLE_SIZE,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            memory_limit: None,
            recheck_before_append: false,
        }
    }
}

/// A stable reference to an interned value.
///
/// Two `Interned` are equal when they are the same copy, not when their bytes
/// match. The bytes stay put for as long as the pool they came from lives.
#[derive(Clone, Copy)]
pub struct Interned<'a> {
    bytes: &'a [u8],
}

impl<'a> Interned<'a> {
    /// # Safety
    ///
    /// `ptr` must point at `size` bytes of arena storage of a pool that is
    /// borrowed for `'a`.
    unsafe fn from_raw(ptr: NonNull<u8>, size: u32) -> Self {
        Interned {
            bytes: bytes_at(ptr, size),
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }
}

impl<'a> PartialEq for Interned<'a> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.bytes.as_ptr(), other.bytes.as_ptr()) && self.bytes.len() == other.bytes.len()
    }
}

impl<'a> Eq for Interned<'a> {}

impl<'a> Hash for Interned<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.bytes.as_ptr() as usize).hash(state);
        self.bytes.len().hash(state);
    }
}

impl<'a> Deref for Interned<'a> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl<'a> AsRef<[u8]> for Interned<'a> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

impl<'a> fmt::Debug for Interned<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Interned")
            .field(&String::from_utf8_lossy(self.bytes))
            .field(&self.bytes.as_ptr())
            .finish()
    }
}

struct PoolState {
    arena: Arena,
    strings: HashSet<NonNull<u8>, ByteOps>,
}

/// Deduplicating byte storage: equal values intern to the same [`Interned`].
///
/// Values are only ever added. The pool is either single-threaded
/// ([`Unsynchronized`], the default) or guarded by a reader/writer lock
/// ([`Synchronized`]); the mode is part of the type.
///
/// In the guarded mode, lookups run under the shared lock and misses copy the
/// value under the exclusive lock without looking again, unless
/// [`PoolOptions::recheck_before_append`] is set. Two threads interning the same
/// new value at once may therefore each get their own copy back. Both copies
/// stay readable, and every lookup after the last of those calls returns the
/// later one.
pub struct InternPool<S: Synchronization = Unsynchronized> {
    sync: S,
    state: UnsafeCell<PoolState>,
    recheck_before_append: bool,
}

// SAFETY: the state owns its arena and table outright. The raw pointers in the
// table point into the arena that travels with it.
unsafe impl<S: Synchronization + Send> Send for InternPool<S> {}

// SAFETY: every access to the state from `&self` happens under the lock:
// shared for reads, exclusive for writes. Bytes handed out through `Interned`
// are never written again.
unsafe impl<R: RawRwLock + Send + Sync> Sync for InternPool<Synchronized<R>> {}

impl InternPool<Unsynchronized> {
    /// Creates a single-threaded pool.
    pub fn new(hash: ByteHashFn, compare: ByteCompareFn) -> Self {
        Self::with_options(PoolOptions::default(), hash, compare)
    }
}

impl InternPool<Synchronized> {
    /// Creates a pool that may be shared between threads, guarded by parking_lot.
    pub fn threadsafe(hash: ByteHashFn, compare: ByteCompareFn) -> Self {
        Self::with_options(PoolOptions::default(), hash, compare)
    }
}

impl Default for InternPool<Unsynchronized> {
    fn default() -> Self {
        Self::new(fnv1a_32, compare_bytes)
    }
}

impl<S: Synchronization> InternPool<S> {
    pub fn with_options(options: PoolOptions, hash: ByteHashFn, compare: ByteCompareFn) -> Self {
        let ops = ByteOps { hash, compare };

        InternPool {
            sync: S::new(),
            state: UnsafeCell::new(PoolState {
                arena: Arena::with_limit(options.chunk_capacity, options.memory_limit),
                strings: HashSet::with_ops(cmp::max(options.table_size, 1), ops),
            }),
            recheck_before_append: options.recheck_before_append,
        }
    }

    /// Returns the canonical copy of `value`, copying it into the pool first if
    /// no equal value is there yet.
    ///
    /// # Panics
    ///
    /// A single-threaded pool panics when its hash or compare function interns
    /// into the same pool. A thread-safe pool deadlocks instead.
    pub fn intern(&self, value: &[u8]) -> Result<Interned<'_>, InternError> {
        let size = u32::try_from(value.len())
            .map_err(|_| InternError::ValueTooLarge { len: value.len() })?;
        let key = NonNull::from(value).cast::<u8>();

        if let Some(found) = self.lookup(&key, size) {
            return Ok(found);
        }

        let _exclusive = ExclusiveGuard::acquire(&self.sync);
        // SAFETY: the exclusive lock is held until the end of this function,
        // and no reference into the state outlives a single method call.
        let state = unsafe { &mut *self.state.get() };

        if self.recheck_before_append {
            if let Some((stored, stored_size)) = state.strings.find_entry(&key, size) {
                log::trace!("value of {} bytes was interned concurrently, reusing it", size);
                // SAFETY: entries of the set point into the arena.
                return Ok(unsafe { Interned::from_raw(*stored, stored_size) });
            }
        }

        let stored = state.arena.append(value)?;
        if !state.strings.insert(stored, size) {
            log::trace!("value of {} bytes was interned concurrently, replacing it", size);
        }

        // SAFETY: `stored` was just written to the arena.
        Ok(unsafe { Interned::from_raw(stored, size) })
    }

    /// Returns the canonical copy of `value` without adding it.
    pub fn get(&self, value: &[u8]) -> Option<Interned<'_>> {
        let size = u32::try_from(value.len()).ok()?;
        self.lookup(&NonNull::from(value).cast::<u8>(), size)
    }

    pub fn contains(&self, value: &[u8]) -> bool {
        self.get(value).is_some()
    }

    /// Number of distinct values interned.
    pub fn len(&self) -> usize {
        self.read(|state| state.strings.size() as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All canonical copies, in the order they were first interned.
    pub fn snapshot(&self) -> Vec<Interned<'_>> {
        self.read(|state| {
            state
                .strings
                .iter()
                // SAFETY: entries of the set point into the arena.
                .map(|(stored, size)| unsafe { Interned::from_raw(*stored, size) })
                .collect()
        })
    }

    pub fn stats(&self) -> PoolStats {
        self.read(|state| PoolStats {
            values: state.strings.size(),
            table_size: state.strings.table_size(),
            threadsafe: S::THREADSAFE,
            arena: state.arena.stats(),
        })
    }

    pub fn is_threadsafe(&self) -> bool {
        S::THREADSAFE
    }

    fn lookup(&self, key: &NonNull<u8>, size: u32) -> Option<Interned<'_>> {
        self.read(|state| {
            let (stored, stored_size) = state.strings.find_entry(key, size)?;
            // SAFETY: entries of the set point into the arena.
            Some(unsafe { Interned::from_raw(*stored, stored_size) })
        })
    }

    fn read<T>(&self, f: impl FnOnce(&PoolState) -> T) -> T {
        let _shared = SharedGuard::acquire(&self.sync);
        // SAFETY: writers hold the exclusive lock, which excludes us.
        f(unsafe { &*self.state.get() })
    }
}

impl<S: Synchronization> fmt::Debug for InternPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("InternPool")
            .field("values", &stats.values)
            .field("threadsafe", &stats.threadsafe)
            .field("arena", &stats.arena)
            .finish()
    }
}

impl<S: Synchronization> Drop for InternPool<S> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let arena = state.arena.stats();
        log::debug!(
            "releasing intern pool: {} values, {} chunks, {} bytes reserved",
            state.strings.size(),
            arena.chunks,
            arena.reserved
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hashers::djb2;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_intern_returns_same_copy() {
        let pool: InternPool = InternPool::default();
        let cat = pool.intern(b"cat").unwrap();

        assert_eq!(&*cat, b"cat");
        assert_eq!(cat, pool.intern(b"cat").unwrap());
        assert_eq!(cat, pool.intern(cat.as_bytes()).unwrap());
        assert_ne!(cat.as_ptr(), b"cat".as_ptr());
    }

    #[test]
    fn test_cat_in_the_hat() {
        let pool = InternPool::new(fnv1a_32, compare_bytes);
        let words: [&[u8]; 4] = [b"cat", b"in", b"the", b"hat"];
        let interned: Vec<_> = words.iter().map(|w| pool.intern(w).unwrap()).collect();

        assert_eq!(pool.len(), 4);
        for (word, first) in words.iter().zip(&interned) {
            assert!(pool.contains(word));
            assert_eq!(*first, pool.intern(word).unwrap());
        }
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.snapshot(), interned);
    }

    #[test]
    fn test_distinct_values_are_distinct() {
        let pool: InternPool = InternPool::default();
        let a = pool.intern(b"a").unwrap();
        let b = pool.intern(b"b").unwrap();
        let empty = pool.intern(b"").unwrap();

        assert_ne!(a, b);
        assert_ne!(a, empty);
        assert_eq!(empty, pool.intern(b"").unwrap());
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_get_does_not_insert() {
        let pool: InternPool = InternPool::default();
        assert_eq!(pool.get(b"cat"), None);
        assert!(pool.is_empty());

        let cat = pool.intern(b"cat").unwrap();
        assert_eq!(pool.get(b"cat"), Some(cat));
        assert_eq!(pool.stats().arena.used, 3);
    }

    #[test]
    fn test_custom_options() {
        let pool = InternPool::<Unsynchronized>::with_options(
            PoolOptions {
                table_size: 7,
                chunk_capacity: 64,
                ..PoolOptions::default()
            },
            djb2,
            compare_bytes,
        );

        for i in 0..100u32 {
            pool.intern(&i.to_be_bytes()).unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.values, 100);
        assert!(stats.table_size > 7);
        assert!(stats.arena.chunks > 1);
        assert!(!stats.threadsafe);
    }

    #[test]
    fn test_recheck_reuses_existing_copy() {
        let pool = InternPool::<Synchronized>::with_options(
            PoolOptions {
                recheck_before_append: true,
                ..PoolOptions::default()
            },
            fnv1a_32,
            compare_bytes,
        );

        let first = pool.intern(b"same").unwrap();
        assert_eq!(first, pool.intern(b"same").unwrap());
        assert_eq!(pool.stats().arena.used, 4);
    }

    #[test]
    fn test_memory_limit() {
        let pool = InternPool::<Unsynchronized>::with_options(
            PoolOptions {
                memory_limit: Some(1 << 20),
                ..PoolOptions::default()
            },
            fnv1a_32,
            compare_bytes,
        );

        let err = pool.intern(&vec![1u8; 1 << 20]).unwrap_err();
        assert_eq!(err, InternError::ChunkAllocation { capacity: 1 << 24 });
        assert!(pool.is_empty());

        let cat = pool.intern(b"cat").unwrap();
        assert_eq!(&*cat, b"cat");
        assert_eq!(pool.len(), 1);
    }

    thread_local! {
        static NESTED: InternPool = InternPool::new(nested_hash, compare_bytes);
    }

    /// Interns the rest of any value starting with `!` into `NESTED`.
    fn nested_hash(bytes: &[u8]) -> u32 {
        if let Some((&b'!', rest)) = bytes.split_first() {
            NESTED.with(|pool| {
                let _ = pool.intern(rest);
            });
        }
        fnv1a_32(bytes)
    }

    #[test]
    #[should_panic(expected = "intern pool re-entered")]
    fn test_reentry_while_inserting_panics() {
        NESTED.with(|pool| {
            let _ = pool.intern(b"!outer");
        });
    }

    #[test]
    #[should_panic(expected = "intern pool re-entered")]
    fn test_reentry_while_looking_up_panics() {
        NESTED.with(|pool| {
            pool.intern(b"cat").unwrap();
            let _ = pool.intern(b"!outer");
        });
    }

    #[test]
    fn test_debug() {
        let pool: InternPool = InternPool::default();
        let cat = pool.intern(b"cat").unwrap();
        assert!(format!("{:?}", cat).starts_with("Interned(\"cat\""));
        assert!(format!("{:?}", pool).starts_with("InternPool { values: 1"));
    }
}
