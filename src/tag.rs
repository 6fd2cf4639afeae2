//! Dependency tags: the intrusive nodes that record readers and edges.
//!
//! A [`DepTag`] is a single node that moves between two kinds of list over
//! its life:
//!
//! - as a [`Role::Reader`], it is a member of an object's reader set and names
//!   the reading task;
//! - as a [`Role::Edge`], it is a member of a predecessor task's outgoing-edge
//!   list and names the successor that waits on it.
//!
//! When a read-write access arrives at an object with readers, each reader's
//! tag is moved from the reader set onto that reader's own edge list, now
//! naming the new writer. Each role has its own link field, and the role
//! discriminant says which one is live.
use crate::{
    loom::atomic::{AtomicU8, Ordering::*},
    task::Task,
};
use alloc::sync::Arc;
use core::{cell::UnsafeCell, fmt, ptr::NonNull};
use hyphae::{dlist, slist, Linked};

/// An intrusive node recording either a reader of an object or an edge
/// between two tasks.
///
/// Tags are embedded in a task's declared accesses (see
/// [`DepTags`](crate::access::DepTags)) and must not move while they are in a
/// list.
pub struct DepTag {
    reader: dlist::Links<DepTag>,
    edge: slist::Links<DepTag>,
    role: AtomicU8,
    /// Non-owning while [`Role::Reader`], an `Arc<Task>` turned into a raw
    /// pointer while [`Role::Edge`], `None` while [`Role::Idle`]. Only touched
    /// under the lock of the list the tag is in.
    task: UnsafeCell<Option<NonNull<Task>>>,
}

/// Which list, if any, a [`DepTag`] belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    /// In no list.
    Idle = 0,
    /// In an object's reader set, naming the reader.
    Reader = 1,
    /// In a task's outgoing-edge list, naming the successor.
    Edge = 2,
}

// === impl DepTag ===

impl DepTag {
    loom_const_fn! {
        /// Returns a new, idle tag.
        #[must_use]
        pub fn new() -> Self {
            Self {
                reader: dlist::Links::new(),
                edge: slist::Links::new(),
                role: AtomicU8::new(Role::Idle as u8),
                task: UnsafeCell::new(None),
            }
        }
    }

    /// Returns the tag's current role.
    #[must_use]
    pub fn role(&self) -> Role {
        match self.role.load(Acquire) {
            0 => Role::Idle,
            1 => Role::Reader,
            2 => Role::Edge,
            bits => unreachable!("invalid tag role {bits}"),
        }
    }

    /// Returns the task this tag names, if any.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock of the list this tag is in.
    pub(crate) unsafe fn task(&self) -> Option<NonNull<Task>> {
        *self.task.get()
    }

    /// Records `reader` and marks the tag as a reader-set member.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock of the reader set the tag is being
    /// added to.
    pub(crate) unsafe fn become_reader(&self, reader: &Task) {
        self.transition(&[Role::Idle], Role::Reader);
        *self.task.get() = Some(NonNull::from(reader));
    }

    /// Takes a strong reference to `successor` and marks the tag as an edge.
    ///
    /// Idle tags become incoming edges of a new successor; reader tags are
    /// repurposed after being unlinked from their reader set.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock of the edge list the tag is being added
    /// to, and the tag must not be linked into any reader set.
    pub(crate) unsafe fn become_edge(&self, successor: &Arc<Task>) {
        self.transition(&[Role::Idle, Role::Reader], Role::Edge);
        let ptr = Arc::into_raw(successor.clone()) as *mut Task;
        *self.task.get() = Some(NonNull::new_unchecked(ptr));
    }

    /// Returns an idle tag's strong reference to its successor.
    ///
    /// # Safety
    ///
    /// The tag must have just been removed from an edge list that the caller
    /// holds the lock of, or has taken ownership of.
    pub(crate) unsafe fn take_edge(&self) -> Arc<Task> {
        self.transition(&[Role::Edge], Role::Idle);
        match (*self.task.get()).take() {
            Some(ptr) => Arc::from_raw(ptr.as_ptr()),
            None => unreachable!("an edge tag must name its successor"),
        }
    }

    /// Marks a reader tag that has left its reader set as idle.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock of the reader set the tag was just
    /// removed from.
    pub(crate) unsafe fn retire_reader(&self) {
        self.transition(&[Role::Reader], Role::Idle);
        *self.task.get() = None;
    }

    /// Substitutes `to` for `from` if this tag is a reader naming `from`.
    ///
    /// Edge and idle tags are left alone: an edge names a successor, and
    /// moves with its edge list rather than being rewritten.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock of the reader set the tag may be in.
    pub(crate) unsafe fn retarget(&self, from: &Task, to: &Task) {
        if self.role() != Role::Reader {
            return;
        }
        let task = &mut *self.task.get();
        assert_eq!(
            *task,
            Some(NonNull::from(from)),
            "a reader tag being migrated must name the task it is migrated from"
        );
        *task = Some(NonNull::from(to));
    }

    #[track_caller]
    fn transition(&self, from: &[Role], to: Role) {
        let prev = self.role();
        assert!(
            from.contains(&prev),
            "invalid tag role transition {prev:?} -> {to:?} (expected one of {from:?})"
        );
        self.role.store(to as u8, Release);
    }
}

impl Default for DepTag {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DepTag {
    fn drop(&mut self) {
        debug_assert_ne!(
            self.role(),
            Role::Edge,
            "a tag must not be dropped while it is an edge in a task's list"
        );
    }
}

impl fmt::Debug for DepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepTag")
            .field("addr", &format_args!("{:p}", self))
            .field("role", &self.role())
            .finish()
    }
}

// Safety: the task pointer is only accessed under the lock of the list the
// tag is in, and the role is atomic.
unsafe impl Send for DepTag {}
unsafe impl Sync for DepTag {}

unsafe impl Linked<dlist::Links<DepTag>> for DepTag {
    type Handle = NonNull<DepTag>;

    fn into_ptr(handle: NonNull<DepTag>) -> NonNull<DepTag> {
        handle
    }

    unsafe fn from_ptr(ptr: NonNull<DepTag>) -> NonNull<DepTag> {
        ptr
    }

    unsafe fn links(target: NonNull<DepTag>) -> NonNull<dlist::Links<DepTag>> {
        NonNull::new_unchecked(core::ptr::addr_of_mut!((*target.as_ptr()).reader))
    }
}

unsafe impl Linked<slist::Links<DepTag>> for DepTag {
    type Handle = NonNull<DepTag>;

    fn into_ptr(handle: NonNull<DepTag>) -> NonNull<DepTag> {
        handle
    }

    unsafe fn from_ptr(ptr: NonNull<DepTag>) -> NonNull<DepTag> {
        ptr
    }

    unsafe fn links(target: NonNull<DepTag>) -> NonNull<slist::Links<DepTag>> {
        NonNull::new_unchecked(core::ptr::addr_of_mut!((*target.as_ptr()).edge))
    }
}
