//! A depth-sharded collection of locked doubly-linked lists.
//!
//! See the [`HashedList`] type for details.
use crate::{
    dlist::{DlList, Links},
    loom::atomic::{AtomicUsize, Ordering::*},
    util::{atomic_max, atomic_min},
    Depth, Linked, Ready,
};
use core::fmt;
use rhizome_sync::Mutex;

/// The default number of buckets in a [`HashedList`].
pub const DEFAULT_BUCKETS: usize = 2048;

/// An array of lock-guarded [`DlList`] buckets, indexed by an element's
/// [`Depth`] modulo `SIZE`.
///
/// Elements deeper in a task tree land in different buckets, so workers
/// pulling work from different parts of the tree rarely contend on the same
/// lock. Removal is driven by [`Ready::is_ready`]:
///
/// - [`HashedList::get_ready`] first probes the two buckets nearest to a
///   depth hint (the hint itself and one level deeper), then falls back to a
///   scan.
/// - [`HashedList::get_ready_any`] scans every bucket between the lowest and
///   highest bucket that may be occupied.
///
/// Each bucket keeps an atomic element count, so empty buckets are skipped
/// without taking their lock. The occupancy bounds widen on every insert and
/// are narrowed after scans, under a separate occupancy lock. Narrowing
/// re-checks the buckets it dropped, so a bound that raced with an insert is
/// pulled back out again and a non-empty bucket is never excluded for good.
pub struct HashedList<T: Linked<Links<T>>, const SIZE: usize = DEFAULT_BUCKETS> {
    buckets: [Bucket<T>; SIZE],
    min_occ: AtomicUsize,
    max_occ: AtomicUsize,
    len: AtomicUsize,
    occupancy: Mutex<()>,
}

struct Bucket<T: Linked<Links<T>>> {
    list: Mutex<DlList<T>>,
    len: AtomicUsize,
}

// === impl HashedList ===

impl<T: Linked<Links<T>>, const SIZE: usize> HashedList<T, SIZE> {
    /// Returns a new, empty `HashedList`.
    ///
    /// # Panics
    ///
    /// If `SIZE` is zero.
    #[must_use]
    pub fn new() -> Self {
        assert!(SIZE > 0, "a HashedList must have at least one bucket");
        Self {
            buckets: core::array::from_fn(|_| Bucket::new()),
            min_occ: AtomicUsize::new(0),
            max_occ: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            occupancy: Mutex::new(()),
        }
    }

    /// Returns the bucket index for `depth`.
    #[inline]
    #[must_use]
    pub const fn hash(depth: usize) -> usize {
        depth % SIZE
    }

    /// Returns the number of elements in the collection.
    ///
    /// Concurrent inserts count from the moment they start, so this may
    /// briefly overstate the number of elements a removal can find.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Acquire)
    }

    /// Returns `true` if the collection was empty when observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current `(min, max)` occupancy bounds.
    ///
    /// Every non-empty bucket lies within these bounds, except for buckets
    /// whose insert is still in progress.
    #[must_use]
    pub fn bounds(&self) -> (usize, usize) {
        (self.min_occ.load(SeqCst), self.max_occ.load(SeqCst))
    }

    /// Inserts `item` into the bucket for its depth.
    pub fn push(&self, item: T::Handle)
    where
        T: Depth,
    {
        let ptr = T::into_ptr(item);
        let h = Self::hash(unsafe { ptr.as_ref() }.depth());
        self.len.fetch_add(1, SeqCst);

        let bucket = &self.buckets[h];
        {
            let mut list = bucket.list.lock();
            // Safety: `ptr` was produced by `into_ptr` just above.
            list.push_back(unsafe { T::from_ptr(ptr) });
            bucket.len.store(list.len(), SeqCst);
        }

        atomic_min(&self.min_occ, h);
        atomic_max(&self.max_occ, h);
        test_trace!(bucket = h, bounds = ?self.bounds(), "HashedList::push");
    }

    /// Removes a ready element, preferring those near `depth_hint`.
    ///
    /// The buckets for `depth_hint` and `depth_hint + 1` are probed first,
    /// then the remaining occupied buckets are scanned in order. A hint of
    /// `0` means "no hint" and goes straight to the scan.
    pub fn get_ready(&self, depth_hint: usize) -> Option<T::Handle>
    where
        T: Ready,
    {
        if depth_hint == 0 {
            return self.scan(None);
        }

        let h0 = Self::hash(depth_hint);
        let h1 = Self::hash(depth_hint.wrapping_add(1));
        if let Some(item) = self.probe(h0) {
            return Some(item);
        }
        if let Some(item) = self.probe(h1) {
            return Some(item);
        }
        self.scan(Some((h0, h1)))
    }

    /// Removes a ready element from any bucket.
    pub fn get_ready_any(&self) -> Option<T::Handle>
    where
        T: Ready,
    {
        self.scan(None)
    }

    /// Recomputes the occupancy bounds from scratch.
    pub fn reset_bounds(&self) {
        let _occupancy = self.occupancy.lock();
        self.min_occ.store(0, SeqCst);
        self.max_occ.store(SIZE - 1, SeqCst);
        self.shrink_locked();
    }

    fn probe(&self, h: usize) -> Option<T::Handle>
    where
        T: Ready,
    {
        let bucket = &self.buckets[h];
        if bucket.is_empty() {
            return None;
        }

        let item = {
            let mut list = bucket.list.lock();
            let item = list.get_ready()?;
            bucket.len.store(list.len(), SeqCst);
            item
        };
        self.len.fetch_sub(1, SeqCst);
        test_trace!(bucket = h, "HashedList::probe -> hit");
        Some(item)
    }

    fn scan(&self, skip: Option<(usize, usize)>) -> Option<T::Handle>
    where
        T: Ready,
    {
        let (lo, hi) = self.bounds();
        let skipped = |h: usize| matches!(skip, Some((h0, h1)) if h == h0 || h == h1);
        let found = (lo..=hi)
            .filter(|&h| !skipped(h))
            .find_map(|h| self.probe(h));
        self.shrink_bounds();
        found
    }

    /// Narrows the occupancy bounds, unless someone else is already doing so.
    fn shrink_bounds(&self) {
        if let Some(_occupancy) = self.occupancy.try_lock() {
            self.shrink_locked();
        }
    }

    /// Must be called with the occupancy lock held.
    fn shrink_locked(&self) {
        let (lo, hi) = self.bounds();
        let mut new_lo = lo;
        while new_lo < hi && self.buckets[new_lo].is_empty() {
            new_lo += 1;
        }
        let mut new_hi = hi;
        while new_hi > new_lo && self.buckets[new_hi].is_empty() {
            new_hi -= 1;
        }

        // Only inserts move the bounds while the occupancy lock is held, and
        // only outwards, so a failed exchange means an insert widened the
        // bound and it must be left alone. A successful exchange may still
        // have raced with an insert into a bucket we just dropped; those
        // buckets are re-checked after publishing the new bound.
        if new_lo != lo && self.min_occ.compare_exchange(lo, new_lo, SeqCst, SeqCst).is_ok() {
            if let Some(h) = (lo..new_lo).find(|&h| !self.buckets[h].is_empty()) {
                atomic_min(&self.min_occ, h);
            }
        }
        if new_hi != hi && self.max_occ.compare_exchange(hi, new_hi, SeqCst, SeqCst).is_ok() {
            if let Some(h) = (new_hi + 1..=hi).rev().find(|&h| !self.buckets[h].is_empty()) {
                atomic_max(&self.max_occ, h);
            }
        }
        test_trace!(from = ?(lo, hi), to = ?self.bounds(), "HashedList::shrink_bounds");
    }
}

impl<T: Linked<Links<T>>, const SIZE: usize> Default for HashedList<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Linked<Links<T>>, const SIZE: usize> fmt::Debug for HashedList<T, SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.bounds();
        f.debug_struct("HashedList")
            .field("buckets", &SIZE)
            .field("len", &self.len())
            .field("min_occ", &lo)
            .field("max_occ", &hi)
            .finish()
    }
}

// === impl Bucket ===

impl<T: Linked<Links<T>>> Bucket<T> {
    fn new() -> Self {
        Self {
            list: Mutex::new(DlList::new()),
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.len.load(SeqCst) == 0
    }
}

#[cfg(test)]
mod tests;
