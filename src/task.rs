//! Tasks and their dependency bookkeeping.
//!
//! A [`Task`] counts the edges still pointing at it and owns the list of
//! edges pointing away from it. When the count drops to zero, the task is
//! pushed into the [`TaskGraph`] it was built for. When the task completes,
//! [`Task::wakeup_deps`] walks its outgoing edges, releasing one unit of each
//! successor's count.
use crate::{
    error::{fatal, fatal_on_drop, Violation},
    graph::TaskGraph,
    loom::atomic::{AtomicBool, AtomicUsize, Ordering::*},
    migrate::Rewire,
    tag::DepTag,
};
use alloc::{
    sync::{Arc, Weak},
    vec::Vec,
};
use core::{
    cell::Cell,
    fmt,
    marker::PhantomData,
    ptr::{self, NonNull},
    sync::atomic::AtomicU64,
};
use hyphae::{dlist, slist, Depth, Linked, Ready, SlList};
use rhizome_sync::Mutex;

/// A unit of work whose start is gated on the completion of earlier tasks.
///
/// Tasks are always shared: they are built as `Arc<Task>`, and every edge
/// that makes a task wait holds a strong reference to it. A task that is
/// waiting on predecessors is therefore kept alive by them, and handed to its
/// graph's ready container by value once the last one completes.
pub struct Task {
    /// Links in a [`TaskGraph`]'s ready FIFO.
    ready_links: slist::Links<Task>,
    /// Links in a [`DepthQueue`](crate::DepthQueue) bucket.
    depth_links: dlist::Links<Task>,

    id: TaskId,
    depth: usize,
    /// Edges still pointing at this task, plus one while it is being
    /// registered.
    incoming: AtomicUsize,
    queued: AtomicBool,
    graph: Weak<TaskGraph>,
    inner: Mutex<TaskInner>,
}

/// A process-unique task identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Configures a [`Task`] before it is built.
///
/// Returned by [`Task::builder`].
#[must_use = "a builder does nothing until `build` is called"]
pub struct Builder<'g> {
    graph: &'g Arc<TaskGraph>,
    depth: usize,
    rewire: Option<Arc<dyn Rewire>>,
}

/// The bracket around a task's declarations.
///
/// While a `Registration` is open, the task holds one provisional unit of its
/// own incoming count, so that edges from predecessors which complete
/// mid-registration cannot make it ready early. [`finish`] releases that
/// unit; dropping an unfinished registration finishes it.
///
/// A `Registration` cannot be shared between threads: every declaration of a
/// task is made by the thread that registers it.
///
/// [`finish`]: Registration::finish
#[must_use = "a registration finishes as soon as it is dropped"]
pub struct Registration<'t> {
    task: &'t Arc<Task>,
    finished: bool,
    _not_sync: PhantomData<Cell<()>>,
}

pub(crate) struct TaskInner {
    /// Outgoing edges, in the order they were installed.
    pub(crate) edges: SlList<DepTag>,
    pub(crate) rewire: Option<Arc<dyn Rewire>>,
}

// === impl Task ===

impl Task {
    /// Returns a [`Builder`] for a task that will be queued in `graph` when it
    /// becomes ready.
    pub fn builder(graph: &Arc<TaskGraph>) -> Builder<'_> {
        Builder {
            graph,
            depth: 0,
            rewire: None,
        }
    }

    /// Returns a new task with depth 0 and no rewire capability.
    #[must_use]
    pub fn new(graph: &Arc<TaskGraph>) -> Arc<Self> {
        Self::builder(graph).build()
    }

    /// Returns this task's identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns this task's scheduling depth.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the graph this task is queued in when it becomes ready, if it
    /// still exists.
    #[must_use]
    pub fn graph(&self) -> Option<Arc<TaskGraph>> {
        self.graph.upgrade()
    }

    /// Returns the number of edges (and open registrations) this task is
    /// still waiting on.
    #[must_use]
    pub fn incoming(&self) -> usize {
        self.incoming.load(Acquire)
    }

    /// Returns `true` if this task has nothing left to wait on.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.incoming() == 0
    }

    /// Returns `true` if this task is currently held by a ready container.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.queued.load(Acquire)
    }

    /// Opens this task's registration.
    pub fn register(self: &Arc<Self>) -> Registration<'_> {
        self.add_incoming();
        tracing::trace!(task.id = %self.id, "registration opened");
        Registration {
            task: self,
            finished: false,
            _not_sync: PhantomData,
        }
    }

    /// Installs an edge from `self` to `successor`, through `tag`.
    ///
    /// The successor's incoming count is raised before the edge becomes
    /// visible in this task's list, so the walk that consumes the edge can
    /// never observe the count before it was raised.
    ///
    /// # Safety
    ///
    /// - `tag` must not be in any list, and must not move or be dropped until
    ///   the edge has been walked.
    /// - `self` must not have walked its edges yet.
    pub unsafe fn add_edge(&self, successor: &Arc<Task>, tag: &DepTag) {
        successor.add_incoming();
        let mut inner = self.inner.lock();
        tag.become_edge(successor);
        inner.edges.push_back(NonNull::from(tag));
        tracing::trace!(
            task.id = %self.id,
            successor.id = %successor.id,
            successor.incoming = successor.incoming(),
            "edge installed",
        );
    }

    /// Walks this task's outgoing edges, releasing each successor.
    ///
    /// Every successor whose incoming count reaches zero is pushed into its
    /// graph's ready container, exactly once. Returns the number of
    /// successors that became ready.
    ///
    /// Call this once the task has completed and released its accesses.
    pub fn wakeup_deps(&self) -> usize {
        let mut edges = self.inner.lock().edges.take();
        let mut woken = 0;
        while let Some(tag) = edges.pop_front() {
            // Safety: the edge list was taken from this task, so the tag is
            // now ours, and tags outlive their edges.
            let successor = unsafe { tag.as_ref().take_edge() };
            tracing::trace!(
                task.id = %self.id,
                successor.id = %successor.id,
                "walking edge",
            );
            if successor.del_incoming() {
                successor.enqueue();
                woken += 1;
            }
        }
        tracing::debug!(task.id = %self.id, woken, "woke dependents");
        woken
    }

    /// Returns the identifiers of the tasks currently waiting on this one,
    /// in the order their edges were installed.
    #[must_use]
    pub fn successors(&self) -> Vec<TaskId> {
        let inner = self.inner.lock();
        inner
            .edges
            .iter()
            // Safety: we hold the edge list's lock, and an edge's successor is
            // kept alive by the edge itself.
            .filter_map(|tag| unsafe { tag.task() })
            .map(|task| unsafe { task.as_ref() }.id)
            .collect()
    }

    /// Returns the number of outgoing edges that have not been walked yet.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.lock().edges.len()
    }

    /// Returns `true` if this task holds a rewire capability.
    #[must_use]
    pub fn has_rewire(&self) -> bool {
        self.inner.lock().rewire.is_some()
    }

    /// Returns `true` if `capability` is this task's rewire capability.
    pub(crate) fn owns_rewire(&self, capability: *const ()) -> bool {
        self.inner
            .lock()
            .rewire
            .as_ref()
            .is_some_and(|rewire| ptr::eq(Arc::as_ptr(rewire) as *const (), capability))
    }

    pub(crate) fn lock_inner(&self) -> rhizome_sync::MutexGuard<'_, TaskInner> {
        self.inner.lock()
    }

    fn add_incoming(&self) {
        let prev = self.incoming.fetch_add(1, AcqRel);
        tracing::trace!(task.id = %self.id, incoming = prev + 1, "add incoming");
    }

    /// Releases one unit of the incoming count, returning `true` if it was
    /// the last.
    fn del_incoming(&self) -> bool {
        let prev = self.incoming.fetch_sub(1, AcqRel);
        if prev == 0 {
            fatal(Violation::IncomingUnderflow { task: self.id });
        }
        tracing::trace!(task.id = %self.id, incoming = prev - 1, "del incoming");
        prev == 1
    }

    pub(crate) fn mark_queued(&self) {
        if self.queued.swap(true, AcqRel) {
            fatal(Violation::AlreadyQueued { task: self.id });
        }
    }

    pub(crate) fn mark_dequeued(&self) {
        let was_queued = self.queued.swap(false, AcqRel);
        debug_assert!(was_queued, "task {} dequeued but was never queued", self.id);
    }

    fn enqueue(self: Arc<Self>) {
        match self.graph.upgrade() {
            Some(graph) => graph.add_ready_task(self),
            None => fatal(Violation::GraphDropped { task: self.id }),
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        let edges = self.inner.get_mut().edges.len();
        if edges > 0 {
            fatal_on_drop(Violation::UnwalkedEdges {
                task: self.id,
                edges,
            });
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("incoming", &self.incoming())
            .field("queued", &self.is_queued())
            .finish_non_exhaustive()
    }
}

impl Ready for Task {
    fn is_ready(&self) -> bool {
        Task::is_ready(self)
    }
}

impl Depth for Task {
    fn depth(&self) -> usize {
        self.depth
    }
}

unsafe impl Linked<slist::Links<Task>> for Task {
    type Handle = Arc<Task>;

    fn into_ptr(task: Arc<Task>) -> NonNull<Task> {
        // Safety: `Arc::into_raw` never returns null.
        unsafe { NonNull::new_unchecked(Arc::into_raw(task) as *mut Task) }
    }

    unsafe fn from_ptr(ptr: NonNull<Task>) -> Arc<Task> {
        Arc::from_raw(ptr.as_ptr())
    }

    unsafe fn links(target: NonNull<Task>) -> NonNull<slist::Links<Task>> {
        NonNull::new_unchecked(ptr::addr_of_mut!((*target.as_ptr()).ready_links))
    }
}

unsafe impl Linked<dlist::Links<Task>> for Task {
    type Handle = Arc<Task>;

    fn into_ptr(task: Arc<Task>) -> NonNull<Task> {
        // Safety: `Arc::into_raw` never returns null.
        unsafe { NonNull::new_unchecked(Arc::into_raw(task) as *mut Task) }
    }

    unsafe fn from_ptr(ptr: NonNull<Task>) -> Arc<Task> {
        Arc::from_raw(ptr.as_ptr())
    }

    unsafe fn links(target: NonNull<Task>) -> NonNull<dlist::Links<Task>> {
        NonNull::new_unchecked(ptr::addr_of_mut!((*target.as_ptr()).depth_links))
    }
}

// === impl TaskId ===

impl TaskId {
    fn next() -> Self {
        // Not a loom atomic: ids only need to be unique, and loom atomics
        // cannot live in statics.
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, core::sync::atomic::Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// === impl Builder ===

impl Builder<'_> {
    /// Sets the task's scheduling depth (default 0).
    ///
    /// A [`DepthQueue`](crate::DepthQueue) shards ready tasks by depth.
    pub fn depth(self, depth: usize) -> Self {
        Self { depth, ..self }
    }

    /// Sets the capability that rewires this task's recorded object accesses
    /// during migration.
    ///
    /// To issue and release [`Accesses`](crate::Accesses) for a task, those
    /// same accesses must be its rewire capability.
    pub fn rewire<R: Rewire + 'static>(self, rewire: Arc<R>) -> Self {
        let rewire: Arc<dyn Rewire> = rewire;
        Self {
            rewire: Some(rewire),
            ..self
        }
    }

    /// Builds the task.
    #[must_use]
    pub fn build(self) -> Arc<Task> {
        let task = Arc::new(Task {
            ready_links: slist::Links::new(),
            depth_links: dlist::Links::new(),
            id: TaskId::next(),
            depth: self.depth,
            incoming: AtomicUsize::new(0),
            queued: AtomicBool::new(false),
            graph: Arc::downgrade(self.graph),
            inner: Mutex::new(TaskInner {
                edges: SlList::new(),
                rewire: self.rewire,
            }),
        });
        tracing::trace!(task.id = %task.id, task.depth = task.depth, "task built");
        task
    }
}

impl fmt::Debug for Builder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("depth", &self.depth)
            .field("rewire", &self.rewire.is_some())
            .finish_non_exhaustive()
    }
}

// === impl Registration ===

impl<'t> Registration<'t> {
    /// Returns the task being registered.
    #[must_use]
    pub fn task(&self) -> &'t Arc<Task> {
        self.task
    }

    /// Closes the registration, queuing the task in its graph if nothing is
    /// left to wait on.
    ///
    /// Returns `true` if the task was queued.
    pub fn finish(mut self) -> bool {
        self.finished = true;
        let ready = self.task.del_incoming();
        if ready {
            tracing::debug!(task.id = %self.task.id, "ready at registration");
            self.task.clone().enqueue();
        }
        ready
    }

    /// Closes the registration *without* queuing the task.
    ///
    /// Returns `true` if nothing is left to wait on, in which case the caller
    /// is responsible for running the task. Otherwise the task is queued by
    /// the completion of its last predecessor.
    pub fn finish_inline(mut self) -> bool {
        self.finished = true;
        self.task.del_incoming()
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if !self.finished && self.task.del_incoming() {
            self.task.clone().enqueue();
        }
    }
}

impl fmt::Debug for Registration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("task", &self.task.id)
            .field("finished", &self.finished)
            .finish()
    }
}
