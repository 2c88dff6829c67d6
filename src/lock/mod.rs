//! Mutual-exclusion primitives.
//!
//! [`SpinLock`] is a test-and-set lock and [`TicketLock`] a fetch-and-increment
//! ticket lock; both are packaged behind the [`RawLock`] interface so
//! lock-based containers can be written once and instantiated with either.
//! [`Peterson`] is a two-thread lock kept around for its sequentially
//! consistent fence.

mod peterson;
mod spinlock;
mod ticketlock;

pub use peterson::Peterson;
pub use spinlock::SpinLock;
pub use ticketlock::TicketLock;

use core::cell::UnsafeCell;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

/// Raw lock interface.
///
/// # Safety
///
/// Implementations must guarantee mutual exclusion between a `lock()` and the
/// `unlock()` it is paired with.
pub unsafe trait RawLock: Default + Send + Sync {
    /// Token handed from `lock()` to the matching `unlock()`.
    type Token;

    /// Acquires the raw lock.
    fn lock(&self) -> Self::Token;

    /// Releases the raw lock.
    ///
    /// # Safety
    ///
    /// `token` must come from the `lock()` call this release is paired with.
    unsafe fn unlock(&self, token: Self::Token);
}

/// Raw locks that also support a non-blocking acquisition attempt.
///
/// # Safety
///
/// Same contract as [`RawLock`]; a successful `try_lock()` counts as a
/// `lock()`.
pub unsafe trait RawTryLock: RawLock {
    /// Tries to acquire the raw lock without blocking.
    fn try_lock(&self) -> Result<Self::Token, ()>;
}

/// Data protected by a raw lock.
#[derive(Debug)]
pub struct Lock<L: RawLock, T> {
    lock: L,
    data: UnsafeCell<T>,
}

unsafe impl<L: RawLock, T: Send> Send for Lock<L, T> {}
unsafe impl<L: RawLock, T: Send> Sync for Lock<L, T> {}

impl<L: RawLock, T: Default> Default for Lock<L, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<L: RawLock, T> Lock<L, T> {
    /// Creates a new lock protecting `data`.
    pub fn new(data: T) -> Self {
        Self {
            lock: L::default(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock and grants access to the inner value.
    pub fn lock(&self) -> LockGuard<'_, L, T> {
        let token = self.lock.lock();
        LockGuard {
            lock: self,
            token: ManuallyDrop::new(token),
        }
    }
}

impl<L: RawTryLock, T> Lock<L, T> {
    /// Tries to acquire the lock without blocking.
    pub fn try_lock(&self) -> Result<LockGuard<'_, L, T>, ()> {
        self.lock.try_lock().map(|token| LockGuard {
            lock: self,
            token: ManuallyDrop::new(token),
        })
    }
}

/// A guard that holds the lock and dereferences the inner value.
#[derive(Debug)]
pub struct LockGuard<'s, L: RawLock, T> {
    lock: &'s Lock<L, T>,
    token: ManuallyDrop<L::Token>,
}

impl<L: RawLock, T> Drop for LockGuard<'_, L, T> {
    fn drop(&mut self) {
        // SAFETY: `token` came from the `lock()` that created this guard, and
        // the guard is being dropped so it is not used again.
        let token = unsafe { ManuallyDrop::take(&mut self.token) };
        unsafe { self.lock.lock.unlock(token) };
    }
}

impl<L: RawLock, T> Deref for LockGuard<'_, L, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists, so the lock is held and access is unique.
        unsafe { &*self.lock.data.get() }
    }
}

impl<L: RawLock, T> DerefMut for LockGuard<'_, L, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists, so the lock is held and access is unique.
        unsafe { &mut *self.lock.data.get() }
    }
}
