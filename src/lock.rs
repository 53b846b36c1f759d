use std::cell::Cell;

use parking_lot::lock_api::RawRwLock;

/// The reader/writer capability an [`InternPool`](crate::InternPool) is guarded by.
///
/// The mode is picked when the pool is built and never changes afterwards.
pub trait Synchronization {
    /// Whether pools in this mode may be shared between threads.
    const THREADSAFE: bool;

    fn new() -> Self;

    fn acquire_shared(&self);

    /// # Safety
    ///
    /// The caller must currently hold a shared acquisition made through `self`.
    unsafe fn release_shared(&self);

    fn acquire_exclusive(&self);

    /// # Safety
    ///
    /// The caller must currently hold the exclusive acquisition made through `self`.
    unsafe fn release_exclusive(&self);
}

/// Single-threaded mode.
///
/// Acquisitions only count borrows, the way `RefCell` does. Re-entering the
/// pool from its own hash or compare function while it is being modified
/// panics instead of aliasing the state. The `Cell` also keeps a pool in this
/// mode from being `Sync`.
#[derive(Debug, Default)]
pub struct Unsynchronized {
    /// Live shared acquisitions, or -1 while held exclusively.
    borrows: Cell<isize>,
}

impl Synchronization for Unsynchronized {
    const THREADSAFE: bool = false;

    fn new() -> Self {
        Unsynchronized::default()
    }

    #[inline]
    fn acquire_shared(&self) {
        let borrows = self.borrows.get();
        if borrows < 0 {
            panic!("intern pool re-entered while it is being modified");
        }
        self.borrows.set(borrows + 1);
    }

    #[inline]
    unsafe fn release_shared(&self) {
        self.borrows.set(self.borrows.get() - 1);
    }

    #[inline]
    fn acquire_exclusive(&self) {
        if self.borrows.get() != 0 {
            panic!("intern pool re-entered while it is being read or modified");
        }
        self.borrows.set(-1);
    }

    #[inline]
    unsafe fn release_exclusive(&self) {
        self.borrows.set(0);
    }
}

/// Thread-safe mode backed by any raw reader/writer lock, parking_lot's by default.
pub struct Synchronized<R: RawRwLock = parking_lot::RawRwLock> {
    raw: R,
}

impl<R: RawRwLock> Synchronization for Synchronized<R> {
    const THREADSAFE: bool = true;

    fn new() -> Self {
        Synchronized { raw: R::INIT }
    }

    #[inline]
    fn acquire_shared(&self) {
        self.raw.lock_shared();
    }

    #[inline]
    unsafe fn release_shared(&self) {
        self.raw.unlock_shared();
    }

    #[inline]
    fn acquire_exclusive(&self) {
        self.raw.lock_exclusive();
    }

    #[inline]
    unsafe fn release_exclusive(&self) {
        self.raw.unlock_exclusive();
    }
}

/// Holds a shared acquisition until dropped.
pub(crate) struct SharedGuard<'a, S: Synchronization>(&'a S);

impl<'a, S: Synchronization> SharedGuard<'a, S> {
    pub(crate) fn acquire(sync: &'a S) -> Self {
        sync.acquire_shared();
        SharedGuard(sync)
    }
}

impl<'a, S: Synchronization> Drop for SharedGuard<'a, S> {
    fn drop(&mut self) {
        // SAFETY: the guard only exists after a successful acquire_shared.
        unsafe { self.0.release_shared() }
    }
}

/// Holds the exclusive acquisition until dropped.
pub(crate) struct ExclusiveGuard<'a, S: Synchronization>(&'a S);

impl<'a, S: Synchronization> ExclusiveGuard<'a, S> {
    pub(crate) fn acquire(sync: &'a S) -> Self {
        sync.acquire_exclusive();
        ExclusiveGuard(sync)
    }
}

impl<'a, S: Synchronization> Drop for ExclusiveGuard<'a, S> {
    fn drop(&mut self) {
        // SAFETY: the guard only exists after a successful acquire_exclusive.
        unsafe { self.0.release_exclusive() }
    }
}
