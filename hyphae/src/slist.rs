//! An intrusive singly-linked FIFO list.
//!
//! See the [`SlList`] type for details.
use crate::{util::FmtOption, Linked};
use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomPinned,
    mem,
    ptr::NonNull,
};

/// An intrusive singly-linked list with head and tail pointers.
///
/// Elements are appended at the tail and removed from the head, so the list
/// is a first-in, first-out queue. There is no removal from the middle of the
/// list; in exchange, each element only carries a single link.
///
/// Because the list only stores two pointers, the entire contents of one
/// list can be moved into another in O(1) with [`SlList::append`] or
/// [`SlList::take`].
///
/// In order to be part of an `SlList`, a type `T` must implement [`Linked`]
/// for [`slist::Links<T>`](Links).
pub struct SlList<T: Linked<Links<T>> + ?Sized> {
    head: Link<T>,
    tail: Link<T>,
}

/// Links to other nodes in an [`SlList`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

/// Iterates over the items in an [`SlList`] by reference.
pub struct Iter<'a, T: Linked<Links<T>> + ?Sized> {
    _list: &'a SlList<T>,
    curr: Link<T>,
}

type Link<T> = Option<NonNull<T>>;

struct LinksInner<T: ?Sized> {
    next: Link<T>,
    /// Links must always be `!Unpin`, so that they never receive LLVM
    /// `noalias` annotations.
    _unpin: PhantomPinned,
}

// ==== impl SlList ====

impl<T: Linked<Links<T>> + ?Sized> SlList<T> {
    /// Returns a new empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
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
            return true;
        }

        false
    }

    /// Appends an item to the tail of the list.
    pub fn push_back(&mut self, item: T::Handle) {
        let ptr = T::into_ptr(item);
        assert_ne!(self.tail, Some(ptr), "cannot push the tail node twice");
        unsafe {
            T::links(ptr).as_mut().set_next(None);
            match self.tail {
                Some(tail) => {
                    T::links(tail).as_mut().set_next(Some(ptr));
                }
                None => self.head = Some(ptr),
            }
        }
        self.tail = Some(ptr);
    }

    /// Removes an item from the head of the list.
    pub fn pop_front(&mut self) -> Option<T::Handle> {
        let head = self.head?;
        unsafe {
            let next = T::links(head).as_mut().set_next(None);
            self.head = next;
            if next.is_none() {
                self.tail = None;
            }
            Some(T::from_ptr(head))
        }
    }

    /// Returns a reference to the item at the head of the list, if any.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.head.map(|head| unsafe { &*head.as_ptr() })
    }

    /// Moves every element of `other` to the tail of `self`, leaving `other`
    /// empty.
    pub fn append(&mut self, other: &mut Self) {
        let Some(other_head) = other.head.take() else {
            return;
        };
        let other_tail = other.tail.take();
        match self.tail {
            Some(tail) => unsafe {
                T::links(tail).as_mut().set_next(Some(other_head));
            },
            None => self.head = Some(other_head),
        }
        self.tail = other_tail;
    }

    /// Takes the entire contents of this list, leaving it empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::new())
    }

    /// Returns an iterator over the items in the list, by reference.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            _list: self,
            curr: self.head,
        }
    }

    /// Returns the number of items in the list.
    ///
    /// This walks the entire list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Asserts as many of the list's invariants as possible.
    pub fn assert_valid(&self) {
        let Some(head) = self.head else {
            assert!(
                self.tail.is_none(),
                "if the list's head is null, the tail must also be null"
            );
            return;
        };
        let Some(tail) = self.tail else {
            panic!("if the list has a head, it must also have a tail");
        };

        let mut curr = head;
        loop {
            let next = unsafe { T::links(curr).as_ref().next() };
            match next {
                Some(next) => {
                    assert_ne!(next, curr, "node's next link cannot be to itself");
                    assert_ne!(next, head, "list cannot loop back to its head");
                    curr = next;
                }
                None => break,
            }
        }
        assert_eq!(curr, tail, "walking the list must end at its tail");
    }
}

impl<T: Linked<Links<T>> + ?Sized> Drop for SlList<T> {
    fn drop(&mut self) {
        while let Some(item) = self.pop_front() {
            drop(item);
        }
    }
}

impl<T: Linked<Links<T>> + ?Sized> Default for SlList<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Linked<Links<T>> + ?Sized> Send for SlList<T> where T: Send {}
unsafe impl<T: Linked<Links<T>> + ?Sized> Sync for SlList<T> where T: Sync {}

impl<T: Linked<Links<T>> + ?Sized> fmt::Debug for SlList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlList")
            .field("head", &FmtOption::new(&self.head))
            .field("tail", &FmtOption::new(&self.tail))
            .finish()
    }
}

// ==== impl Links ====

impl<T: ?Sized> Links<T> {
    /// Returns new links for a singly-linked list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                next: None,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn next(&self) -> Link<T> {
        unsafe { (*self.inner.get()).next }
    }

    #[inline]
    fn set_next(&mut self, next: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().next, next)
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
            .finish()
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
