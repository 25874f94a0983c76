//! Two-mode blocking lock: many concurrent weak holders, or one hard
//! holder that excludes them all.
//!
//! State is a single signed count: `0` free, `n >= 1` that many weak
//! holders, `-1` one hard holder. Weak acquisition is reentrant from the
//! same thread (it only counts holders). Release wakes every waiter.
//!
//! There is no fairness guarantee: a steady stream of weak acquisitions
//! can starve a pending hard acquisition indefinitely. There is no
//! timeout and no cancellation; callers block until the lock is released.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex};

pub struct WeakHardLock<T> {
    count: Mutex<i64>,
    released: Condvar,
    data: UnsafeCell<T>,
}

// Weak guards hand out &T to several threads, hard guards a single &mut T,
// so the usual RwLock bounds apply.
unsafe impl<T: Send> Send for WeakHardLock<T> {}
unsafe impl<T: Send + Sync> Sync for WeakHardLock<T> {}

impl<T> WeakHardLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            count: Mutex::new(0),
            released: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire in weak (shared) mode. Blocks while a hard holder is active.
    pub fn weak(&self) -> WeakGuard<'_, T> {
        let mut count = self.count.lock();
        while *count < 0 {
            self.released.wait(&mut count);
        }
        *count += 1;
        WeakGuard { lock: self }
    }

    /// Acquire in hard (exclusive) mode. Blocks until no holder remains.
    pub fn hard(&self) -> HardGuard<'_, T> {
        let mut count = self.count.lock();
        while *count != 0 {
            self.released.wait(&mut count);
        }
        *count = -1;
        HardGuard { lock: self }
    }

    /// Exclusive access without locking; `&mut self` proves no holders.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

pub struct WeakGuard<'a, T> {
    lock: &'a WeakHardLock<T>,
}

impl<T> Deref for WeakGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Holding a weak guard keeps the count >= 1; no hard holder exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for WeakGuard<'_, T> {
    fn drop(&mut self) {
        let mut count = self.lock.count.lock();
        *count -= 1;
        drop(count);
        self.lock.released.notify_all();
    }
}

pub struct HardGuard<'a, T> {
    lock: &'a WeakHardLock<T>,
}

impl<T> Deref for HardGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for HardGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // The hard holder is the only holder while the count is -1.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for HardGuard<'_, T> {
    fn drop(&mut self) {
        let mut count = self.lock.count.lock();
        *count = 0;
        drop(count);
        self.lock.released.notify_all();
    }
}

// ============================================================================
// Tests
// ============================================================================
