//! An intrusive doubly-linked list.
//!
//! See the [`DlList`] type for details.
use crate::{util::FmtOption, Linked, Ready};
use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomPinned,
    mem,
    ptr::{self, NonNull},
};

/// An intrusive doubly-linked list.
///
/// Used as a first-in, first-out queue via [`DlList::push_back`] and
/// [`DlList::pop_front`], with O(1) removal of an arbitrary element through
/// [`DlList::remove`] and predicate-driven removal through
/// [`DlList::get_ready`].
///
/// In order to be part of a `DlList`, a type `T` must implement [`Linked`]
/// for [`dlist::Links<T>`](Links).
pub struct DlList<T: Linked<Links<T>> + ?Sized> {
    head: Link<T>,
    tail: Link<T>,
    len: usize,
}

/// Links to other nodes in a [`DlList`] or a
/// [`HeadList`](crate::head_list::HeadList).
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

/// Iterates over the items in a [`DlList`] by reference.
pub struct Iter<'a, T: Linked<Links<T>> + ?Sized> {
    _list: &'a DlList<T>,
    curr: Link<T>,
}

pub(crate) type Link<T> = Option<NonNull<T>>;

struct LinksInner<T: ?Sized> {
    next: Link<T>,
    prev: Link<T>,
    /// Links must always be `!Unpin`, so that they never receive LLVM
    /// `noalias` annotations.
    _unpin: PhantomPinned,
}

// ==== impl DlList ====

impl<T: Linked<Links<T>> + ?Sized> DlList<T> {
    /// Returns a new empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns `true` if this list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        if self.head.is_none() {
            debug_assert!(
                self.tail.is_none(),
                "inconsistent state: a list had a tail but no head!"
            );
            debug_assert_eq!(self.len, 0, "an empty list must have length 0");
            return true;
        }

        false
    }

    /// Returns the number of elements in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Asserts as many of the list's invariants as possible.
    pub fn assert_valid(&self) {
        let Some(head) = self.head else {
            assert!(
                self.tail.is_none(),
                "if the linked list's head is null, the tail must also be null"
            );
            assert_eq!(self.len, 0, "if the linked list's head is null, its length must be 0");
            return;
        };
        let Some(tail) = self.tail else {
            panic!("if the linked list has a head, it must also have a tail");
        };

        let head_links = unsafe { T::links(head).as_ref() };
        let tail_links = unsafe { T::links(tail).as_ref() };
        assert_eq!(head_links.prev(), None, "head node must not have a prev link");
        assert_eq!(tail_links.next(), None, "tail node must not have a next link");

        let mut curr = Some(head);
        let mut prev = None;
        let mut actual_len = 0;
        while let Some(node) = curr {
            let links = unsafe { T::links(node).as_ref() };
            assert_eq!(links.prev(), prev, "node's prev link must point to its predecessor");
            assert_ne!(links.next(), Some(node), "node's next link cannot be to itself");
            actual_len += 1;
            prev = Some(node);
            curr = links.next();
        }
        assert_eq!(prev, Some(tail), "walking the list must end at its tail");
        assert_eq!(self.len, actual_len, "list length must match its contents");
    }

    /// Inserts an item before the current head.
    pub fn push_front(&mut self, item: T::Handle) {
        let ptr = T::into_ptr(item);
        assert_ne!(self.head, Some(ptr), "cannot push the head node twice");
        // Safety: `ptr` came from `into_ptr`, and `head` is ours.
        unsafe { self.splice(ptr, None, self.head) }
    }

    /// Inserts an item after the current tail.
    pub fn push_back(&mut self, item: T::Handle) {
        let ptr = T::into_ptr(item);
        assert_ne!(self.tail, Some(ptr), "cannot push the tail node twice");
        // Safety: `ptr` came from `into_ptr`, and `tail` is ours.
        unsafe { self.splice(ptr, self.tail, None) }
    }

    /// Removes the head of the list.
    pub fn pop_front(&mut self) -> Option<T::Handle> {
        let head = self.head?;
        // Safety: the head is an element of this list.
        unsafe { self.remove(head) }
    }

    /// Removes the tail of the list.
    pub fn pop_back(&mut self) -> Option<T::Handle> {
        let tail = self.tail?;
        // Safety: the tail is an element of this list.
        unsafe { self.remove(tail) }
    }

    /// Links `ptr` between the adjacent nodes `prev` and `next`, either of
    /// which may be an end of the list.
    unsafe fn splice(&mut self, ptr: NonNull<T>, prev: Link<T>, next: Link<T>) {
        {
            let links = T::links(ptr).as_mut();
            links.set_prev(prev);
            links.set_next(next);
        }
        match prev {
            Some(prev) => {
                T::links(prev).as_mut().set_next(Some(ptr));
            }
            None => self.head = Some(ptr),
        }
        match next {
            Some(next) => {
                T::links(next).as_mut().set_prev(Some(ptr));
            }
            None => self.tail = Some(ptr),
        }
        self.len += 1;
    }

    /// Returns a reference to the item at the head of the list, if any.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.head.map(|head| unsafe { &*head.as_ptr() })
    }

    /// Removes an arbitrary node from the list.
    ///
    /// Returns `None` without touching the list if `item` is not linked into
    /// it: an unlinked node has no neighbors and is neither the head nor the
    /// tail.
    ///
    /// # Safety
    ///
    /// `item` must either be an element of this list or be unlinked. It must
    /// not be an element of any *other* list.
    pub unsafe fn remove(&mut self, item: NonNull<T>) -> Option<T::Handle> {
        let mut links = T::links(item);
        let links = links.as_mut();
        let prev = links.prev();
        let next = links.next();

        if prev.is_none() && self.head != Some(item) {
            debug_assert!(next.is_none(), "an unlinked node must not have a next link");
            return None;
        }

        links.unlink();

        match prev {
            Some(prev) => {
                T::links(prev).as_mut().set_next(next);
            }
            None => {
                debug_assert_ne!(Some(item), next, "node must not be linked to itself");
                self.head = next;
            }
        }

        match next {
            Some(next) => {
                T::links(next).as_mut().set_prev(prev);
            }
            None => {
                debug_assert_ne!(Some(item), prev, "node must not be linked to itself");
                self.tail = prev;
            }
        }

        self.len -= 1;
        Some(T::from_ptr(item))
    }

    /// Removes the first element for which [`Ready::is_ready`] returns
    /// `true`.
    pub fn get_ready(&mut self) -> Option<T::Handle>
    where
        T: Ready,
    {
        let mut curr = self.head;
        while let Some(node) = curr {
            // capture the successor before `node` may be unlinked
            let next = unsafe { T::links(node).as_ref().next() };
            if unsafe { node.as_ref() }.is_ready() {
                return unsafe { self.remove(node) };
            }
            curr = next;
        }
        None
    }

    /// Unlinks every element, dropping the handles.
    ///
    /// Every node is left unlinked, so a later [`DlList::remove`] of a
    /// cleared node is a harmless no-op.
    pub fn clear(&mut self) {
        while let Some(item) = self.pop_front() {
            drop(item);
        }
    }

    /// Returns an iterator over the items in the list, by reference.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            _list: self,
            curr: self.head,
        }
    }
}

impl<T: Linked<Links<T>> + ?Sized> Drop for DlList<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Linked<Links<T>> + ?Sized> Default for DlList<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Linked<Links<T>> + ?Sized> Send for DlList<T> where T: Send {}
unsafe impl<T: Linked<Links<T>> + ?Sized> Sync for DlList<T> where T: Sync {}

impl<T: Linked<Links<T>> + ?Sized> fmt::Debug for DlList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DlList")
            .field("head", &FmtOption::new(&self.head))
            .field("tail", &FmtOption::new(&self.tail))
            .field("len", &self.len)
            .finish()
    }
}

// ==== impl Links ====

impl<T: ?Sized> Links<T> {
    /// Returns new, unlinked links.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                next: None,
                prev: None,
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns `true` if this node has a neighbor in either direction.
    ///
    /// The sole element of a [`DlList`] has no neighbors, so this is not a
    /// membership test for one-element lists.
    pub fn is_linked(&self) -> bool {
        self.next().is_some() || self.prev().is_some()
    }

    #[inline]
    pub(crate) fn unlink(&mut self) {
        self.inner.get_mut().next = None;
        self.inner.get_mut().prev = None;
    }

    #[inline]
    pub(crate) fn next(&self) -> Link<T> {
        unsafe { (*self.inner.get()).next }
    }

    #[inline]
    pub(crate) fn prev(&self) -> Link<T> {
        unsafe { (*self.inner.get()).prev }
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().next, next)
    }

    #[inline]
    pub(crate) fn set_prev(&mut self, prev: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().prev, prev)
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("self", &format_args!("{:p}", self))
            .field("next", &FmtOption::new(&self.next()))
            .field("prev", &FmtOption::new(&self.prev()))
            .finish()
    }
}

impl<T: ?Sized> PartialEq for Links<T> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other) || (self.next() == other.next() && self.prev() == other.prev())
    }
}

unsafe impl<T: Send> Send for Links<T> {}
unsafe impl<T: Sync> Sync for Links<T> {}

// === impl Iter ====

impl<'a, T: Linked<Links<T>> + ?Sized> Iterator for Iter<'a, T> {
    type Item = &'a T;
    fn next(&mut self) -> Option<Self::Item> {
        let curr = self.curr.take()?;
        unsafe {
            self.curr = T::links(curr).as_ref().next();
            Some(&*curr.as_ptr())
        }
    }
}

impl<T: Linked<Links<T>> + ?Sized> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("curr", &FmtOption::new(&self.curr))
            .finish()
    }
}
