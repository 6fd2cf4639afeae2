//! A spinning mutual exclusion lock.
//!
//! See the [`Spinlock`] type for details.
use crate::{
    loom::atomic::{AtomicBool, Ordering::*},
    util::Backoff,
};

/// A test-and-test-and-set spinlock.
///
/// While the lock is contended, waiters spin on a plain load with an
/// exponential [`Backoff`], and only retry the compare-and-swap once the lock
/// has been observed unlocked.
///
/// This is a *raw* lock: it does not own the data it protects. Most code will
/// want [`Mutex`](crate::Mutex), which pairs a `Spinlock` with the protected
/// value and unlocks through an RAII guard.
#[derive(Debug)]
pub struct Spinlock {
    locked: AtomicBool,
}

// === impl Spinlock ===

impl Spinlock {
    loom_const_fn! {
        /// Returns a new `Spinlock`, in the unlocked state.
        #[must_use]
        pub fn new() -> Self {
            Self { locked: AtomicBool::new(false) }
        }
    }

    /// Acquires the lock, spinning until it is available.
    #[cfg_attr(test, track_caller)]
    pub fn lock(&self) {
        let mut boff = Backoff::default();
        while test_dbg!(self
            .locked
            .compare_exchange(false, true, Acquire, Acquire)
            .is_err())
        {
            while test_dbg!(self.is_locked()) {
                boff.spin();
            }
        }
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// Returns `true` if the lock was acquired.
    #[cfg_attr(test, track_caller)]
    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> bool {
        test_dbg!(self
            .locked
            .compare_exchange(false, true, Acquire, Acquire)
            .is_ok())
    }

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The caller must currently hold the lock, acquired through
    /// [`lock`](Self::lock) or a successful [`try_lock`](Self::try_lock).
    #[cfg_attr(test, track_caller)]
    #[inline]
    pub unsafe fn unlock(&self) {
        test_dbg!(self.locked.store(false, Release));
    }

    /// Returns `true` if the lock is currently held by anyone.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loom::{self, sync::Arc, thread};

    #[test]
    fn try_lock_excludes() {
        loom::model(|| {
            let lock = Spinlock::new();
            assert!(lock.try_lock());
            assert!(lock.is_locked());
            assert!(!lock.try_lock());
            unsafe { lock.unlock() };
            assert!(!lock.is_locked());
            assert!(lock.try_lock());
        });
    }

    #[test]
    fn contended() {
        loom::model(|| {
            let lock = Arc::new(Spinlock::new());
            let lock2 = lock.clone();

            let t1 = thread::spawn(move || {
                lock2.lock();
                unsafe { lock2.unlock() };
            });

            lock.lock();
            unsafe { lock.unlock() };
            t1.join().unwrap();
            assert!(!lock.is_locked());
        });
    }
}
