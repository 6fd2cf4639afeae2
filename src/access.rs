//! Declared accesses: the standard way to issue, release, and migrate a
//! task's object accesses.
use crate::{
    error::{fatal, Violation},
    migrate::Rewire,
    object::{AccessKind, ObjectDeps},
    tag::DepTag,
    task::{Registration, Task},
};
use alloc::{boxed::Box, sync::Arc};
use core::fmt;

/// The pair of tags owned by one declared access.
///
/// - `incoming` is used when the accessing task becomes a successor of the
///   object's last writer.
/// - `reader` records a read-only access in the object's reader set, and is
///   later reused as an edge to whichever read-write access follows.
pub struct DepTags {
    incoming: DepTag,
    reader: DepTag,
}

/// One object access a task declares.
pub struct Access {
    object: Arc<ObjectDeps>,
    kind: AccessKind,
    tags: DepTags,
}

/// The full set of accesses a task declares.
///
/// `Accesses` owns the tags its accesses link into object records and edge
/// lists, so it must outlive them: it is installed as the task's
/// [`Rewire`] capability (with [`Builder::rewire`]), which keeps it alive as
/// long as the task is, and moves it along when the task is migrated.
///
/// [`Builder::rewire`]: crate::task::Builder::rewire
///
/// # Examples
///
/// ```
/// use rhizome::{Access, Accesses, ObjectDeps, Task, TaskGraph};
/// use std::sync::Arc;
///
/// let graph = TaskGraph::new();
/// let object = Arc::new(ObjectDeps::new());
///
/// let write = Accesses::new([Access::write(&object)]);
/// let writer = Task::builder(&graph).rewire(write.clone()).build();
/// assert!(write.issue(&writer), "a write is always ready");
///
/// let read = Accesses::new([Access::read(&object)]);
/// let reader = Task::builder(&graph).rewire(read.clone()).build();
/// assert!(!read.issue(&reader), "the reader waits on the writer");
///
/// let task = graph.get_ready_task().unwrap();
/// assert_eq!(task.id(), writer.id());
/// write.complete(&writer);
///
/// let task = graph.get_ready_task().unwrap();
/// assert_eq!(task.id(), reader.id());
/// read.complete(&reader);
/// ```
pub struct Accesses {
    accesses: Box<[Access]>,
}

// === impl DepTags ===

impl DepTags {
    loom_const_fn! {
        /// Returns a pair of idle tags.
        #[must_use]
        pub fn new() -> Self {
            Self {
                incoming: DepTag::new(),
                reader: DepTag::new(),
            }
        }
    }

    /// Returns the tag used for an edge from the object's last writer.
    #[inline]
    #[must_use]
    pub fn incoming(&self) -> &DepTag {
        &self.incoming
    }

    /// Returns the tag used for reader-set membership.
    #[inline]
    #[must_use]
    pub fn reader(&self) -> &DepTag {
        &self.reader
    }
}

impl Default for DepTags {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DepTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepTags")
            .field("incoming", &self.incoming.role())
            .field("reader", &self.reader.role())
            .finish()
    }
}

// === impl Access ===

impl Access {
    /// Returns an access of `kind` to `object`.
    #[must_use]
    pub fn new(object: &Arc<ObjectDeps>, kind: AccessKind) -> Self {
        Self {
            object: object.clone(),
            kind,
            tags: DepTags::new(),
        }
    }

    /// Returns a read-only access to `object`.
    #[must_use]
    pub fn read(object: &Arc<ObjectDeps>) -> Self {
        Self::new(object, AccessKind::Read)
    }

    /// Returns a write-only access to `object`.
    #[must_use]
    pub fn write(object: &Arc<ObjectDeps>) -> Self {
        Self::new(object, AccessKind::Write)
    }

    /// Returns a read-write access to `object`.
    #[must_use]
    pub fn read_write(object: &Arc<ObjectDeps>) -> Self {
        Self::new(object, AccessKind::ReadWrite)
    }

    /// Returns the object being accessed.
    #[must_use]
    pub fn object(&self) -> &Arc<ObjectDeps> {
        &self.object
    }

    /// Returns the kind of access.
    #[must_use]
    pub fn kind(&self) -> AccessKind {
        self.kind
    }
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Access")
            .field("object", &Arc::as_ptr(&self.object))
            .field("kind", &self.kind)
            .field("tags", &self.tags)
            .finish()
    }
}

// === impl Accesses ===

impl Accesses {
    /// Returns a new set of accesses.
    #[must_use]
    pub fn new(accesses: impl IntoIterator<Item = Access>) -> Arc<Self> {
        Arc::new(Self {
            accesses: accesses.into_iter().collect(),
        })
    }

    /// Iterates over the declared accesses.
    pub fn iter(&self) -> impl Iterator<Item = &Access> + '_ {
        self.accesses.iter()
    }

    /// Returns `true` if a task issuing these accesses now would be ready.
    ///
    /// This is only a snapshot: other tasks may change the objects' records
    /// as soon as it returns.
    #[must_use]
    pub fn initially_ready(&self) -> bool {
        self.accesses
            .iter()
            .all(|access| access.object.initially_ready(access.kind))
    }

    /// Registers `task`, issues every access, and finishes the registration.
    ///
    /// Returns `true` if the task had nothing to wait on, and was queued in
    /// its graph.
    ///
    /// # Panics
    ///
    /// If these accesses are not `task`'s rewire capability.
    pub fn issue(self: &Arc<Self>, task: &Arc<Task>) -> bool {
        let reg = task.register();
        self.issue_into(&reg);
        reg.finish()
    }

    /// Issues every access within an open registration.
    ///
    /// # Panics
    ///
    /// If these accesses are not the registered task's rewire capability, or
    /// have already been issued and not yet released.
    pub fn issue_into(self: &Arc<Self>, reg: &Registration<'_>) {
        self.check_owner(reg.task());
        for access in self.accesses.iter() {
            // Safety: the accesses are the task's capability, so the tags
            // live as long as the task does, and migrate with it.
            unsafe { access.object.issue(reg, access.kind, &access.tags) };
        }
    }

    /// Releases every access on behalf of `task`.
    ///
    /// # Panics
    ///
    /// If these accesses are not `task`'s rewire capability.
    pub fn release(self: &Arc<Self>, task: &Task) {
        self.check_owner(task);
        for access in self.accesses.iter() {
            // Safety: these are the tags the access was issued with.
            unsafe { access.object.release(task, access.kind, &access.tags) };
        }
    }

    /// Releases every access, then wakes `task`'s successors.
    ///
    /// Returns the number of successors that became ready.
    pub fn complete(self: &Arc<Self>, task: &Task) -> usize {
        self.release(task);
        task.wakeup_deps()
    }

    fn check_owner(self: &Arc<Self>, task: &Task) {
        if !task.owns_rewire(Arc::as_ptr(self) as *const ()) {
            fatal(Violation::ForeignAccesses { task: task.id() });
        }
    }
}

impl Rewire for Accesses {
    fn rewire(&self, from: &Task, to: &Task) {
        for access in self.accesses.iter() {
            let mut obj = access.object.lock();
            match access.kind {
                // Safety: `from` issued this access with these tags.
                AccessKind::Read => unsafe { obj.replace_readers(from, to, access.tags.reader()) },
                AccessKind::Write | AccessKind::ReadWrite => obj.replace_writer(from, to),
            }
        }
    }
}

impl fmt::Debug for Accesses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.accesses.iter()).finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::graph::TaskGraph;

    fn task_with(graph: &Arc<TaskGraph>, accesses: &Arc<Accesses>) -> Arc<Task> {
        Task::builder(graph).rewire(accesses.clone()).build()
    }

    #[test]
    fn initially_ready_follows_the_protocol() {
        let _trace = crate::util::trace_init();
        let graph = TaskGraph::new();
        let obj = Arc::new(ObjectDeps::new());

        let read = Accesses::new([Access::read(&obj)]);
        let rw = Accesses::new([Access::read_write(&obj)]);
        let write = Accesses::new([Access::write(&obj)]);
        assert!(read.initially_ready());
        assert!(rw.initially_ready());
        assert!(write.initially_ready());

        let reader = task_with(&graph, &read);
        assert!(read.issue(&reader));
        assert!(read.initially_ready(), "readers do not block readers");
        assert!(!rw.initially_ready(), "readers block read-writes");
        assert!(write.initially_ready(), "nothing blocks a write");

        assert!(graph.get_ready_task().is_some());
        read.complete(&reader);
        obj.check_retired().unwrap();
    }

    #[test]
    fn read_write_waits_on_every_reader() {
        let _trace = crate::util::trace_init();
        let graph = TaskGraph::new();
        let obj = Arc::new(ObjectDeps::new());

        let r1 = Accesses::new([Access::read(&obj)]);
        let r2 = Accesses::new([Access::read(&obj)]);
        let rw = Accesses::new([Access::read_write(&obj)]);
        let (t1, t2, t3) = (
            task_with(&graph, &r1),
            task_with(&graph, &r2),
            task_with(&graph, &rw),
        );
        assert!(r1.issue(&t1));
        assert!(r2.issue(&t2));
        assert!(!rw.issue(&t3));
        assert_eq!(t3.incoming(), 2);
        assert_eq!(t1.successors(), [t3.id()]);
        assert_eq!(t2.successors(), [t3.id()]);
        {
            let obj = obj.lock();
            assert!(!obj.has_readers());
            assert_eq!(obj.last_writer(), Some(core::ptr::NonNull::from(&*t3)));
        }

        // drain the two readers
        assert!(graph.get_ready_task().is_some());
        assert!(graph.get_ready_task().is_some());

        assert_eq!(r1.complete(&t1), 0);
        assert!(graph.is_empty(), "one reader is still running");
        assert_eq!(r2.complete(&t2), 1);

        let ready = graph.get_ready_task().expect("read-write should be ready");
        assert_eq!(ready.id(), t3.id());
        rw.complete(&t3);
        obj.check_retired().unwrap();
    }

    #[test]
    fn write_orphans_nothing_when_readers_are_done() {
        let graph = TaskGraph::new();
        let obj = Arc::new(ObjectDeps::new());
        let w1 = Accesses::new([Access::write(&obj)]);
        let w2 = Accesses::new([Access::write(&obj)]);
        let (t1, t2) = (task_with(&graph, &w1), task_with(&graph, &w2));
        assert!(w1.issue(&t1));
        assert!(w2.issue(&t2), "write-only never waits");
        assert!(graph.get_ready_task().is_some());
        assert!(graph.get_ready_task().is_some());
        // the first writer was superseded and leaves the record alone
        w1.complete(&t1);
        assert!(obj.has_writer());
        w2.complete(&t2);
        assert!(!obj.has_writer());
    }

    #[test]
    #[should_panic(expected = "different rewire capability")]
    fn foreign_accesses_are_fatal() {
        let graph = TaskGraph::new();
        let obj = Arc::new(ObjectDeps::new());
        let accesses = Accesses::new([Access::write(&obj)]);
        let task = Task::new(&graph);
        accesses.issue(&task);
    }
}
