//! A circular doubly-linked list with a sentinel element.
//!
//! See the [`HeadList`] type for details.
use crate::{
    dlist::{Link, Links},
    Linked, Ready,
};
use alloc::boxed::Box;
use core::{fmt, ptr::NonNull};

/// A circular intrusive doubly-linked list anchored by a sentinel element.
///
/// The list owns one heap-allocated `T` that never leaves it. Every real
/// element always has both neighbors, so linking and unlinking are
/// branch-free, and [`HeadList::erase`] needs no knowledge of where in the
/// list the element sits.
///
/// Elements use the same [`dlist::Links`](Links) as a
/// [`DlList`](crate::DlList).
pub struct HeadList<T: Linked<Links<T>> + Default> {
    sentinel: NonNull<T>,
}

/// Iterates over the items in a [`HeadList`] by reference.
pub struct Iter<'a, T: Linked<Links<T>> + Default> {
    list: &'a HeadList<T>,
    curr: NonNull<T>,
}

// ==== impl HeadList ====

impl<T: Linked<Links<T>> + Default> HeadList<T> {
    /// Returns a new empty list, allocating its sentinel.
    #[must_use]
    pub fn new() -> Self {
        let sentinel = NonNull::from(Box::leak(Box::new(T::default())));
        unsafe {
            let links = T::links(sentinel).as_mut();
            links.set_next(Some(sentinel));
            links.set_prev(Some(sentinel));
        }
        Self { sentinel }
    }

    /// Returns `true` if the list holds no elements besides its sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let next = unsafe { Self::next_of(self.sentinel) };
        next == self.sentinel
    }

    /// Appends an item to the tail of the list.
    pub fn push_back(&mut self, item: T::Handle) {
        let ptr = T::into_ptr(item);
        assert_ne!(ptr, self.sentinel, "the sentinel cannot be pushed");
        unsafe {
            let last = Self::prev_of(self.sentinel);
            Self::splice(last, ptr, self.sentinel);
        }
    }

    /// Prepends an item to the head of the list.
    pub fn push_front(&mut self, item: T::Handle) {
        let ptr = T::into_ptr(item);
        assert_ne!(ptr, self.sentinel, "the sentinel cannot be pushed");
        unsafe {
            let first = Self::next_of(self.sentinel);
            Self::splice(self.sentinel, ptr, first);
        }
    }

    /// Removes an item from the head of the list.
    pub fn pop_front(&mut self) -> Option<T::Handle> {
        let first = unsafe { Self::next_of(self.sentinel) };
        if first == self.sentinel {
            return None;
        }
        Some(unsafe { self.erase(first) })
    }

    /// Returns a reference to the item at the head of the list, if any.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        let first = unsafe { Self::next_of(self.sentinel) };
        if first == self.sentinel {
            return None;
        }
        Some(unsafe { &*first.as_ptr() })
    }

    /// Unlinks `item` from the list in O(1).
    ///
    /// # Safety
    ///
    /// `item` must currently be an element of this list.
    pub unsafe fn erase(&mut self, item: NonNull<T>) -> T::Handle {
        debug_assert_ne!(item, self.sentinel, "the sentinel cannot be erased");
        let prev = Self::prev_of(item);
        let next = Self::next_of(item);
        T::links(prev).as_mut().set_next(Some(next));
        T::links(next).as_mut().set_prev(Some(prev));
        T::links(item).as_mut().unlink();
        T::from_ptr(item)
    }

    /// Removes the first element for which [`Ready::is_ready`] returns
    /// `true`.
    pub fn get_ready(&mut self) -> Option<T::Handle>
    where
        T: Ready,
    {
        let mut curr = unsafe { Self::next_of(self.sentinel) };
        while curr != self.sentinel {
            if unsafe { curr.as_ref() }.is_ready() {
                return Some(unsafe { self.erase(curr) });
            }
            curr = unsafe { Self::next_of(curr) };
        }
        None
    }

    /// Unlinks every element, dropping the handles.
    pub fn clear(&mut self) {
        while let Some(item) = self.pop_front() {
            drop(item);
        }
    }

    /// Returns an iterator over the items in the list, by reference.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            curr: unsafe { Self::next_of(self.sentinel) },
        }
    }

    /// Asserts that every element's neighbors point back at it.
    pub fn assert_valid(&self) {
        let mut curr = self.sentinel;
        loop {
            let next = unsafe { Self::next_of(curr) };
            let back = unsafe { Self::prev_of(next) };
            assert_eq!(back, curr, "next node's prev link must point back");
            curr = next;
            if curr == self.sentinel {
                break;
            }
        }
    }

    /// Links `item` between `prev` and `next`, which must be adjacent.
    unsafe fn splice(prev: NonNull<T>, item: NonNull<T>, next: NonNull<T>) {
        let links = T::links(item).as_mut();
        links.set_prev(Some(prev));
        links.set_next(Some(next));
        T::links(prev).as_mut().set_next(Some(item));
        T::links(next).as_mut().set_prev(Some(item));
    }

    #[inline]
    unsafe fn next_of(ptr: NonNull<T>) -> NonNull<T> {
        Self::expect_linked(T::links(ptr).as_ref().next())
    }

    #[inline]
    unsafe fn prev_of(ptr: NonNull<T>) -> NonNull<T> {
        Self::expect_linked(T::links(ptr).as_ref().prev())
    }

    #[inline]
    fn expect_linked(link: Link<T>) -> NonNull<T> {
        match link {
            Some(ptr) => ptr,
            None => panic!("a node in a circular list must always have both neighbors"),
        }
    }
}

impl<T: Linked<Links<T>> + Default> Drop for HeadList<T> {
    fn drop(&mut self) {
        self.clear();
        unsafe {
            // Safety: the sentinel was leaked from a `Box` in `new`, and has
            // never been handed out as a `T::Handle`.
            drop(Box::from_raw(self.sentinel.as_ptr()));
        }
    }
}

impl<T: Linked<Links<T>> + Default> Default for HeadList<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Linked<Links<T>> + Default + Send> Send for HeadList<T> {}
unsafe impl<T: Linked<Links<T>> + Default + Sync> Sync for HeadList<T> {}

impl<T: Linked<Links<T>> + Default> fmt::Debug for HeadList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadList")
            .field("sentinel", &self.sentinel)
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

// === impl Iter ====

impl<'a, T: Linked<Links<T>> + Default> Iterator for Iter<'a, T> {
    type Item = &'a T;
    fn next(&mut self) -> Option<Self::Item> {
        if self.curr == self.list.sentinel {
            return None;
        }
        let curr = self.curr;
        unsafe {
            self.curr = HeadList::<T>::next_of(curr);
            Some(&*curr.as_ptr())
        }
    }
}

impl<T: Linked<Links<T>> + Default> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("curr", &self.curr).finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::util::trace_init;
    use core::{cell::Cell, ptr};
    use proptest::{collection::vec, num::usize::ANY};
    use std::{collections::VecDeque, pin::Pin, vec::Vec};

    #[derive(Debug, Default)]
    struct Entry {
        links: Links<Entry>,
        val: i32,
        ready: Cell<bool>,
    }

    unsafe impl Linked<Links<Self>> for Entry {
        type Handle = NonNull<Entry>;

        fn into_ptr(handle: NonNull<Entry>) -> NonNull<Entry> {
            handle
        }

        unsafe fn from_ptr(ptr: NonNull<Entry>) -> NonNull<Entry> {
            ptr
        }

        unsafe fn links(target: NonNull<Entry>) -> NonNull<Links<Entry>> {
            NonNull::new_unchecked(ptr::addr_of_mut!((*target.as_ptr()).links))
        }
    }

    impl Ready for Entry {
        fn is_ready(&self) -> bool {
            self.ready.get()
        }
    }

    fn entry(val: i32) -> Pin<std::boxed::Box<Entry>> {
        std::boxed::Box::pin(Entry {
            links: Links::new(),
            val,
            ready: Cell::new(true),
        })
    }

    fn ptr(e: &Pin<std::boxed::Box<Entry>>) -> NonNull<Entry> {
        NonNull::from(e.as_ref().get_ref())
    }

    fn vals(list: &HeadList<Entry>) -> Vec<i32> {
        list.iter().map(|e| e.val).collect()
    }

    #[test]
    fn new_list_is_empty() {
        let list = HeadList::<Entry>::new();
        assert!(list.is_empty());
        assert!(list.front().is_none());
        list.assert_valid();
    }

    #[test]
    fn push_pop_erase() {
        let _trace = trace_init();
        let entries: Vec<_> = (0..4).map(entry).collect();
        let mut list = HeadList::new();
        for e in &entries {
            list.push_back(ptr(e));
        }
        list.assert_valid();
        assert_eq!(vals(&list), [0, 1, 2, 3]);

        unsafe {
            list.erase(ptr(&entries[2]));
        }
        list.assert_valid();
        assert_eq!(vals(&list), [0, 1, 3]);

        list.push_front(ptr(&entries[2]));
        assert_eq!(vals(&list), [2, 0, 1, 3]);
        assert_eq!(list.front().map(|e| e.val), Some(2));

        let popped = list.pop_front().map(|p| unsafe { p.as_ref().val });
        assert_eq!(popped, Some(2));
        list.clear();
        assert!(list.is_empty());
        list.assert_valid();
    }

    #[test]
    fn get_ready() {
        let _trace = trace_init();
        let entries: Vec<_> = (0..3).map(entry).collect();
        entries[0].ready.set(false);
        let mut list: HeadList<Entry> = HeadList::new();
        for e in &entries {
            list.push_back(ptr(e));
        }
        let first = list.get_ready().map(|p| unsafe { p.as_ref().val });
        assert_eq!(first, Some(1));
        assert_eq!(vals(&list), [0, 2]);
        list.assert_valid();
    }

    proptest::proptest! {
        #[test]
        fn fuzz_head_list(ops in vec(ANY, 0..100usize)) {
            let _trace = trace_init();
            let entries: Vec<_> = (0..ops.len()).map(|i| entry(i as i32)).collect();
            let mut list = HeadList::<Entry>::new();
            let mut reference = VecDeque::new();

            for (i, op) in ops.iter().enumerate() {
                match op % 4 {
                    0 => {
                        reference.push_back(i as i32);
                        list.push_back(ptr(&entries[i]));
                    }
                    1 => {
                        reference.push_front(i as i32);
                        list.push_front(ptr(&entries[i]));
                    }
                    2 => {
                        let expect = reference.pop_front();
                        let actual = list.pop_front().map(|p| unsafe { p.as_ref().val });
                        assert_eq!(expect, actual);
                    }
                    3 => {
                        if reference.is_empty() {
                            assert!(list.is_empty());
                            continue;
                        }
                        let idx = (op / 4) % reference.len();
                        let expect = reference.remove(idx).unwrap();
                        let erased = unsafe { list.erase(ptr(&entries[expect as usize])) };
                        assert_eq!(unsafe { erased.as_ref().val }, expect);
                    }
                    _ => unreachable!(),
                }
                list.assert_valid();
                assert_eq!(list.iter().map(|e| e.val).collect::<VecDeque<_>>(), reference);
            }
            // the list must be dropped before the entries it points into
            drop(list);
        }
    }
}
