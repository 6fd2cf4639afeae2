//! A lock-free list with concurrent insertion and a single remover.
//!
//! See the [`LfList`] type for details.
use crate::{
    loom::atomic::{
        AtomicBool, AtomicPtr,
        Ordering::{self, *},
    },
    Linked, Ready,
};
use core::{
    fmt,
    marker::PhantomPinned,
    ptr::{self, NonNull},
};

/// An intrusive singly-linked list that accepts insertions from any number of
/// threads without locking.
///
/// Insertion ([`LfList::prepend`]) swings the head pointer with a
/// compare-and-swap. Removal of the first element satisfying
/// [`Ready::is_ready`] may run concurrently with insertions, but removals
/// must be serialized: at most one thread may remove at a time. The list
/// offers two ways to uphold that:
///
/// - [`LfList::try_remover`] claims the right to remove and returns a
///   [`Remover`] guard, failing if another remover is outstanding.
/// - [`LfList::get_ready_unchecked`] skips the claim, leaving the
///   single-remover rule to the caller.
pub struct LfList<T: Linked<Links<T>>> {
    head: AtomicPtr<T>,
    has_remover: AtomicBool,
}

/// Links to other nodes in an [`LfList`].
pub struct Links<T> {
    next: AtomicPtr<T>,
    _unpin: PhantomPinned,
}

/// The exclusive right to remove elements from an [`LfList`].
///
/// Returned by [`LfList::try_remover`]; the right is released when the guard
/// is dropped.
pub struct Remover<'list, T: Linked<Links<T>>> {
    list: &'list LfList<T>,
}

// === impl LfList ===

impl<T: Linked<Links<T>>> LfList<T> {
    loom_const_fn! {
        /// Returns a new empty list.
        #[must_use]
        pub fn new() -> Self {
            Self {
                head: AtomicPtr::new(ptr::null_mut()),
                has_remover: AtomicBool::new(false),
            }
        }
    }

    /// Returns `true` if the list was empty when observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Acquire).is_null()
    }

    /// Inserts `item` at the head of the list.
    ///
    /// This may be called concurrently from any number of threads, including
    /// while a removal is in progress.
    pub fn prepend(&self, item: T::Handle) {
        let ptr = T::into_ptr(item);
        let links = unsafe { T::links(ptr).as_ref() };
        let mut head = self.head.load(Acquire);
        loop {
            links.next.store(head, Relaxed);
            match self
                .head
                .compare_exchange_weak(head, ptr.as_ptr(), AcqRel, Acquire)
            {
                Ok(_) => {
                    test_trace!(?ptr, "LfList::prepend");
                    return;
                }
                Err(actual) => head = actual,
            }
        }
    }

    /// Claims the right to remove elements, if nobody else holds it.
    #[must_use]
    pub fn try_remover(&self) -> Option<Remover<'_, T>> {
        self.has_remover
            .compare_exchange(false, true, AcqRel, Acquire)
            .ok()
            .map(|_| Remover { list: self })
    }

    /// Removes the first element for which [`Ready::is_ready`] returns
    /// `true`.
    ///
    /// # Safety
    ///
    /// No other thread may be removing from this list concurrently, whether
    /// through this method or through a [`Remover`].
    pub unsafe fn get_ready_unchecked(&self) -> Option<T::Handle>
    where
        T: Ready,
    {
        let mut prev: Option<NonNull<T>> = None;
        let mut curr = NonNull::new(self.head.load(Acquire));
        while let Some(node) = curr {
            let next = Self::next_of(node, Acquire);
            if node.as_ref().is_ready() {
                self.unlink(prev, node, next);
                Self::links_of(node).next.store(ptr::null_mut(), Relaxed);
                test_trace!(?node, "LfList::get_ready_unchecked -> removed");
                return Some(T::from_ptr(node));
            }
            prev = Some(node);
            curr = NonNull::new(next);
        }
        None
    }

    /// Splices `node` out, given its predecessor as last observed.
    unsafe fn unlink(&self, prev: Option<NonNull<T>>, node: NonNull<T>, next: *mut T) {
        if let Some(prev) = prev {
            // Interior links are only ever written by the remover.
            Self::links_of(prev).next.store(next, Release);
            return;
        }

        if self
            .head
            .compare_exchange(node.as_ptr(), next, AcqRel, Acquire)
            .is_ok()
        {
            return;
        }

        // New nodes were prepended since `node` was the head. Only inserts
        // touch the head, so `node` is still reachable from the new head
        // through those new nodes.
        let mut pred = NonNull::new(self.head.load(Acquire));
        while let Some(p) = pred {
            let p_next = Self::next_of(p, Acquire);
            if p_next == node.as_ptr() {
                Self::links_of(p).next.store(next, Release);
                return;
            }
            pred = NonNull::new(p_next);
        }
        unreachable!("a node being removed must stay reachable from the head");
    }

    #[inline]
    unsafe fn links_of<'a>(ptr: NonNull<T>) -> &'a Links<T> {
        T::links(ptr).as_ref()
    }

    #[inline]
    unsafe fn next_of(ptr: NonNull<T>, order: Ordering) -> *mut T {
        Self::links_of(ptr).next.load(order)
    }
}

impl<T: Linked<Links<T>>> Drop for LfList<T> {
    fn drop(&mut self) {
        let mut curr = NonNull::new(self.head.load(Acquire));
        while let Some(node) = curr {
            unsafe {
                curr = NonNull::new(Self::next_of(node, Acquire));
                drop(T::from_ptr(node));
            }
        }
    }
}

impl<T: Linked<Links<T>>> Default for LfList<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Linked<Links<T>> + Send> Send for LfList<T> {}
unsafe impl<T: Linked<Links<T>> + Send> Sync for LfList<T> {}

impl<T: Linked<Links<T>>> fmt::Debug for LfList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LfList")
            .field("head", &self.head.load(Acquire))
            .field("has_remover", &self.has_remover.load(Acquire))
            .finish()
    }
}

// === impl Remover ===

impl<T: Linked<Links<T>> + Ready> Remover<'_, T> {
    /// Removes the first element for which [`Ready::is_ready`] returns
    /// `true`.
    pub fn get_ready(&self) -> Option<T::Handle> {
        unsafe {
            // Safety: holding a `Remover` guarantees that nobody else is
            // removing from the list.
            self.list.get_ready_unchecked()
        }
    }
}

impl<T: Linked<Links<T>>> Drop for Remover<'_, T> {
    fn drop(&mut self) {
        self.list.has_remover.store(false, Release);
    }
}

impl<T: Linked<Links<T>>> fmt::Debug for Remover<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remover")
            .field("list", &format_args!("{:p}", self.list))
            .finish()
    }
}

// === impl Links ===

impl<T> Links<T> {
    loom_const_fn! {
        /// Returns new, unlinked links.
        #[must_use]
        pub fn new() -> Self {
            Self {
                next: AtomicPtr::new(ptr::null_mut()),
                _unpin: PhantomPinned,
            }
        }
    }
}

impl<T> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("self", &format_args!("{:p}", self))
            .field("next", &self.next.load(Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loom::{self, sync::Arc, thread};
    use std::{boxed::Box, vec::Vec};

    struct Entry {
        links: Links<Entry>,
        val: usize,
        ready: bool,
    }

    unsafe impl Linked<Links<Self>> for Entry {
        type Handle = Box<Entry>;

        fn into_ptr(handle: Box<Entry>) -> NonNull<Entry> {
            NonNull::from(Box::leak(handle))
        }

        unsafe fn from_ptr(ptr: NonNull<Entry>) -> Box<Entry> {
            Box::from_raw(ptr.as_ptr())
        }

        unsafe fn links(target: NonNull<Entry>) -> NonNull<Links<Entry>> {
            NonNull::new_unchecked(ptr::addr_of_mut!((*target.as_ptr()).links))
        }
    }

    impl Ready for Entry {
        fn is_ready(&self) -> bool {
            self.ready
        }
    }

    fn entry(val: usize, ready: bool) -> Box<Entry> {
        Box::new(Entry {
            links: Links::new(),
            val,
            ready,
        })
    }

    #[test]
    fn single_remover_claim() {
        loom::model(|| {
            let list = LfList::<Entry>::new();
            let remover = list.try_remover().expect("first claim must succeed");
            assert!(list.try_remover().is_none());
            drop(remover);
            assert!(list.try_remover().is_some());
        });
    }

    #[test]
    fn get_ready_skips_unready() {
        loom::model(|| {
            let list = LfList::<Entry>::new();
            list.prepend(entry(0, true));
            list.prepend(entry(1, false));
            list.prepend(entry(2, true));
            let remover = list.try_remover().unwrap();
            // prepending makes the list LIFO
            assert_eq!(remover.get_ready().map(|e| e.val), Some(2));
            assert_eq!(remover.get_ready().map(|e| e.val), Some(0));
            assert!(remover.get_ready().is_none());
            assert!(!list.is_empty());
        });
    }

    #[test]
    fn concurrent_prepend_and_remove() {
        const PER_THREAD: usize = 2;
        loom::model(|| {
            let list = Arc::new(LfList::<Entry>::new());
            let producers = (0..2)
                .map(|t| {
                    let list = list.clone();
                    thread::spawn(move || {
                        for i in 0..PER_THREAD {
                            list.prepend(entry(t * PER_THREAD + i, true));
                        }
                    })
                })
                .collect::<Vec<_>>();

            let mut seen = Vec::new();
            {
                let remover = list.try_remover().unwrap();
                if let Some(e) = remover.get_ready() {
                    seen.push(e.val);
                }
            }

            for p in producers {
                p.join().unwrap();
            }

            let remover = list.try_remover().unwrap();
            while let Some(e) = remover.get_ready() {
                seen.push(e.val);
            }
            seen.sort_unstable();
            assert_eq!(seen, (0..2 * PER_THREAD).collect::<Vec<_>>());
            assert!(list.is_empty());
        });
    }

    #[test]
    fn remove_head_while_prepending() {
        loom::model(|| {
            let list = Arc::new(LfList::<Entry>::new());
            list.prepend(entry(0, true));

            let list2 = list.clone();
            let producer = thread::spawn(move || list2.prepend(entry(1, false)));

            let removed = list.try_remover().unwrap().get_ready().map(|e| e.val);
            producer.join().unwrap();
            assert_eq!(removed, Some(0));

            // the unready node survives the splice, whichever way it went
            let remover = list.try_remover().unwrap();
            assert!(remover.get_ready().is_none());
            assert!(!list.is_empty());
        });
    }
}
