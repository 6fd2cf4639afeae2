//! Per-object dependency metadata.
//!
//! Every version of a shared object carries an [`ObjectDeps`]: the last task
//! to write it, and the tasks currently reading it. Issuing an access to the
//! object consults and updates that record, installing edges from earlier
//! tasks to the one being issued (see [`AccessKind`] for the rules).
use crate::{
    access::DepTags,
    error::{fatal_on_drop, Violation},
    tag::{DepTag, Role},
    task::{Registration, Task, TaskId},
};
use alloc::sync::Arc;
use core::{fmt, ptr::NonNull};
use hyphae::DlList;
use rhizome_sync::{Mutex, MutexGuard};

/// How a task accesses an object.
///
/// | kind | on issue | initially ready when | on release |
/// |---|---|---|---|
/// | [`Read`] | wait on the writer, if any; join the readers | no writer | leave the readers, unless a writer has since taken over |
/// | [`Write`] | become the writer | always | stop being the writer |
/// | [`ReadWrite`] | wait on the readers, or on the writer if there are none; become the writer | no writer and no readers | stop being the writer |
///
/// A [`Write`] access never waits: a write-only access always targets a fresh
/// version of the object, which nobody else has touched yet.
///
/// [`Read`]: AccessKind::Read
/// [`Write`]: AccessKind::Write
/// [`ReadWrite`]: AccessKind::ReadWrite
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Read-only access.
    Read,
    /// Write-only access to a fresh version.
    Write,
    /// Read-modify-write access.
    ReadWrite,
}

/// Dependency metadata for one version of a shared object.
///
/// Records hold *non-owning* references to tasks: a task must release every
/// access it issued before it is dropped.
pub struct ObjectDeps {
    state: Mutex<ObjectState>,
}

/// Exclusive access to an object's dependency metadata.
///
/// Returned by [`ObjectDeps::lock`]; the object is unlocked when the guard is
/// dropped.
#[must_use = "if unused, the object will immediately unlock"]
pub struct ObjectGuard<'obj> {
    state: MutexGuard<'obj, ObjectState>,
}

struct ObjectState {
    last_writer: Option<NonNull<Task>>,
    readers: DlList<DepTag>,
}

impl ObjectState {
    fn check_retired(&self) -> Result<(), Violation> {
        if let Some(writer) = self.last_writer {
            // Safety: a recorded writer is alive by contract.
            let writer = unsafe { writer.as_ref() }.id();
            return Err(Violation::OutstandingWriter { writer });
        }
        let readers = self.readers.len();
        if readers > 0 {
            return Err(Violation::OutstandingReaders { readers });
        }
        Ok(())
    }
}

// Safety: the task pointers are only dereferenced under the object's lock,
// and only while the tasks they name are alive.
unsafe impl Send for ObjectState {}

// === impl AccessKind ===

impl AccessKind {
    /// Returns `true` if this access reads the object's current contents.
    #[must_use]
    pub fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Returns `true` if this access produces a new value for the object.
    #[must_use]
    pub fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

// === impl ObjectDeps ===

impl ObjectDeps {
    loom_const_fn! {
        /// Returns metadata for a fresh object version, with no writer and no
        /// readers.
        #[must_use]
        pub fn new() -> Self {
            Self {
                state: Mutex::new(ObjectState {
                    last_writer: None,
                    readers: DlList::new(),
                }),
            }
        }
    }

    /// Locks the metadata.
    pub fn lock(&self) -> ObjectGuard<'_> {
        ObjectGuard {
            state: self.state.lock(),
        }
    }

    /// Returns `true` if any task is currently reading this version.
    ///
    /// Version management uses this to decide whether a write must go to a
    /// fresh version instead.
    #[must_use]
    pub fn has_readers(&self) -> bool {
        self.lock().has_readers()
    }

    /// Returns `true` if a task is recorded as this version's writer.
    #[must_use]
    pub fn has_writer(&self) -> bool {
        self.lock().has_writer()
    }

    /// Returns `true` if a task issuing `kind` access now would be ready,
    /// as far as this object is concerned.
    #[must_use]
    pub fn initially_ready(&self, kind: AccessKind) -> bool {
        let obj = self.lock();
        match kind {
            AccessKind::Read => !obj.has_writer(),
            AccessKind::Write => true,
            AccessKind::ReadWrite => !obj.has_writer() && !obj.has_readers(),
        }
    }

    /// Issues an access of `kind` on behalf of the task being registered.
    ///
    /// Installs the edges the access requires and records the task as a
    /// reader or writer of this version.
    ///
    /// # Safety
    ///
    /// - `tags` must not move, and must stay alive until the access has been
    ///   [released](Self::release) *and* every edge made from them has been
    ///   walked. Tags owned by the task's [`Rewire`](crate::Rewire)
    ///   capability satisfy this.
    /// - `tags` must not be used by any other access.
    /// - The task must release the access before it is dropped.
    pub unsafe fn issue(&self, reg: &Registration<'_>, kind: AccessKind, tags: &DepTags) {
        let task = reg.task();
        let mut obj = self.lock();
        match kind {
            AccessKind::Read => {
                obj.link_writer(task, tags.incoming());
                obj.add_reader(task, tags.reader());
            }
            AccessKind::Write => obj.add_writer(task),
            AccessKind::ReadWrite => {
                if obj.has_readers() {
                    obj.link_readers(task);
                } else {
                    obj.link_writer(task, tags.incoming());
                }
                obj.add_writer(task);
            }
        }
        tracing::trace!(task.id = %task.id(), ?kind, object = ?obj, "issued access");
    }

    /// Releases an access of `kind` previously issued by `task`.
    ///
    /// # Safety
    ///
    /// `tags` must be the tags the access was issued with.
    pub unsafe fn release(&self, task: &Task, kind: AccessKind, tags: &DepTags) {
        let mut obj = self.lock();
        match kind {
            AccessKind::Read => obj.del_reader(task, tags.reader()),
            AccessKind::Write | AccessKind::ReadWrite => obj.del_writer(task),
        }
        tracing::trace!(task.id = %task.id(), ?kind, object = ?obj, "released access");
    }

    /// Checks that no task is recorded against this version any more.
    pub fn check_retired(&self) -> Result<(), Violation> {
        self.lock().check_retired()
    }
}

impl Default for ObjectDeps {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObjectDeps {
    fn drop(&mut self) {
        if let Err(violation) = self.state.get_mut().check_retired() {
            fatal_on_drop(violation);
        }
    }
}

impl fmt::Debug for ObjectDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Some(state) => fmt::Debug::fmt(&ObjectGuard { state }, f),
            None => f.write_str("ObjectDeps(<locked>)"),
        }
    }
}

// === impl ObjectGuard ===

impl ObjectGuard<'_> {
    /// Returns `true` if the reader set is non-empty.
    #[must_use]
    pub fn has_readers(&self) -> bool {
        !self.state.readers.is_empty()
    }

    /// Returns `true` if a writer is recorded.
    #[must_use]
    pub fn has_writer(&self) -> bool {
        self.state.last_writer.is_some()
    }

    /// Returns the recorded writer, if any.
    #[must_use]
    pub fn last_writer(&self) -> Option<NonNull<Task>> {
        self.state.last_writer
    }

    /// Returns the number of recorded readers.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.state.readers.len()
    }

    /// Iterates over the recorded readers, oldest first.
    pub fn readers(&self) -> impl Iterator<Item = NonNull<Task>> + '_ {
        self.state.readers.iter().filter_map(|tag| {
            // Safety: we hold the reader set's lock.
            unsafe { tag.task() }
        })
    }

    /// Appends `task` to the reader set through `tag`.
    ///
    /// # Safety
    ///
    /// `tag` must be idle and must not move until it leaves the reader set.
    /// `task` must stay alive while it is recorded.
    pub unsafe fn add_reader(&mut self, task: &Task, tag: &DepTag) {
        tag.become_reader(task);
        self.state.readers.push_back(NonNull::from(tag));
    }

    /// Clears the reader set and records `task` as the writer.
    ///
    /// # Safety
    ///
    /// `task` must stay alive while it is recorded.
    pub unsafe fn add_writer(&mut self, task: &Task) {
        while let Some(tag) = self.state.readers.pop_front() {
            tag.as_ref().retire_reader();
        }
        self.state.last_writer = Some(NonNull::from(task));
    }

    /// Removes `task`'s reader tag, unless a writer has been installed since
    /// the read was issued.
    ///
    /// Installing a writer takes over the reader set, so a reader that finds
    /// a writer recorded has nothing left to remove.
    ///
    /// # Safety
    ///
    /// `tag` must be the tag `task` was added to the reader set with.
    pub unsafe fn del_reader(&mut self, task: &Task, tag: &DepTag) {
        if self.has_writer() {
            return;
        }
        if self.state.readers.remove(NonNull::from(tag)).is_some() {
            debug_assert_eq!(tag.task(), Some(NonNull::from(task)));
            tag.retire_reader();
        }
    }

    /// Clears the writer, if it is still `task`.
    pub fn del_writer(&mut self, task: &Task) {
        if self.state.last_writer == Some(NonNull::from(task)) {
            self.state.last_writer = None;
        }
    }

    /// Replaces the recorded writer `from` with `to`.
    ///
    /// Used only while migrating a task.
    pub fn replace_writer(&mut self, from: &Task, to: &Task) {
        if self.state.last_writer == Some(NonNull::from(from)) {
            self.state.last_writer = Some(NonNull::from(to));
        }
    }

    /// Replaces `from` with `to` in `tag`, if it is still a reader tag.
    ///
    /// Used only while migrating a task.
    ///
    /// # Safety
    ///
    /// `tag` must be the tag `from` was added to this reader set with.
    pub unsafe fn replace_readers(&mut self, from: &Task, to: &Task, tag: &DepTag) {
        tag.retarget(from, to);
    }

    /// Makes `successor` wait on every current reader, then clears the
    /// reader set.
    ///
    /// Each reader's own tag is moved onto that reader's edge list.
    ///
    /// # Safety
    ///
    /// Every recorded reader must still be alive.
    pub unsafe fn link_readers(&mut self, successor: &Arc<Task>) {
        // Popping detaches each tag before it is relinked as an edge.
        while let Some(tag) = self.state.readers.pop_front() {
            let tag = tag.as_ref();
            let Some(reader) = tag.task() else {
                unreachable!("a reader tag must name its reader");
            };
            reader.as_ref().add_edge(successor, tag);
        }
    }

    /// Makes `successor` wait on the recorded writer, if there is one.
    ///
    /// # Safety
    ///
    /// The recorded writer must still be alive, and `tag` must be idle and
    /// must not move until the edge has been walked.
    pub unsafe fn link_writer(&mut self, successor: &Arc<Task>, tag: &DepTag) {
        if let Some(writer) = self.state.last_writer {
            writer.as_ref().add_edge(successor, tag);
        }
    }

    /// Checks that no task is recorded against this version any more.
    pub fn check_retired(&self) -> Result<(), Violation> {
        self.state.check_retired()
    }

    /// Asserts that every reader tag is in the reader role.
    pub fn assert_valid(&self) {
        self.state.readers.assert_valid();
        for tag in self.state.readers.iter() {
            assert_eq!(tag.role(), Role::Reader, "reader set holds a non-reader tag");
        }
    }
}

impl fmt::Debug for ObjectGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Readers<'a, 'obj>(&'a ObjectGuard<'obj>);
        impl fmt::Debug for Readers<'_, '_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Safety: recorded readers are alive by contract.
                f.debug_list()
                    .entries(self.0.readers().map(|t| unsafe { t.as_ref() }.id()))
                    .finish()
            }
        }

        // Safety: a recorded writer is alive by contract.
        let writer: Option<TaskId> = self
            .state
            .last_writer
            .map(|w| unsafe { w.as_ref() }.id());
        f.debug_struct("ObjectDeps")
            .field("last_writer", &writer)
            .field("readers", &Readers(self))
            .finish()
    }
}
