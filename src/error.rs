//! Contract violations.
//!
//! Every rule the dependency tracker relies on is checked, and breaking one is
//! fatal: the graph it protects can no longer be trusted, so there is nothing
//! to recover. [`Violation`] names each rule so that the panic message (and the
//! `tracing` event emitted just before it) says which one was broken.
//!
//! Teardown checks are also exposed as `Result`s, for callers that want to
//! verify a quiescent state without panicking:
//! [`TaskGraph::check_drained`](crate::TaskGraph::check_drained) and
//! [`ObjectDeps::check_retired`](crate::ObjectDeps::check_retired).
use crate::task::TaskId;

/// A broken dependency-tracking contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Violation {
    /// A task graph was torn down while ready tasks were still queued in it.
    #[error("task graph dropped with {pending} ready task(s) still queued")]
    PendingTasks {
        /// The number of tasks left in the graph.
        pending: usize,
    },

    /// An object's metadata was torn down while a writer was still recorded.
    #[error("object dependencies dropped while task {writer} is still its writer")]
    OutstandingWriter {
        /// The task still recorded as the last writer.
        writer: TaskId,
    },

    /// An object's metadata was torn down while readers were still recorded.
    #[error("object dependencies dropped with {readers} reader(s) still recorded")]
    OutstandingReaders {
        /// The number of readers left in the reader set.
        readers: usize,
    },

    /// A task was dropped before its outgoing edges were walked.
    #[error("task {task} dropped with {edges} outgoing edge(s) never woken")]
    UnwalkedEdges {
        /// The task that was dropped.
        task: TaskId,
        /// The number of successors that will never be woken.
        edges: usize,
    },

    /// An incoming-edge counter was decremented below zero.
    #[error("incoming edge counter of task {task} underflowed")]
    IncomingUnderflow {
        /// The task whose counter underflowed.
        task: TaskId,
    },

    /// A task became ready after the graph it belongs to was dropped.
    #[error("task {task} became ready after its task graph was dropped")]
    GraphDropped {
        /// The task that could not be queued.
        task: TaskId,
    },

    /// A task was handed to a ready container while already queued in one.
    #[error("task {task} queued twice")]
    AlreadyQueued {
        /// The task that was queued twice.
        task: TaskId,
    },

    /// A task was handed to a ready container before it was ready.
    #[error("task {task} queued while {incoming} incoming edge(s) remain")]
    QueuedUnready {
        /// The task that was queued early.
        task: TaskId,
        /// Its incoming-edge count at the time.
        incoming: usize,
    },

    /// Migration was attempted from a task without a rewire capability.
    #[error("task {task} has no rewire capability to migrate with")]
    MissingRewire {
        /// The task being migrated from.
        task: TaskId,
    },

    /// Migration would overwrite the destination's own rewire capability.
    #[error("task {task} already has a rewire capability installed")]
    RewireInstalled {
        /// The task being migrated to.
        task: TaskId,
    },

    /// Migration was attempted from a task that still has predecessors.
    #[error("task {task} migrated while {incoming} incoming edge(s) still target it")]
    MigratingUnreadyTask {
        /// The task being migrated from.
        task: TaskId,
        /// Its incoming-edge count at the time.
        incoming: usize,
    },

    /// Migration found edges already recorded on the destination task.
    #[error("task {task} already has outgoing edges; cannot migrate into it")]
    EdgeListNotEmpty {
        /// The task being migrated to.
        task: TaskId,
    },

    /// Accesses were issued or released for a task that does not own them.
    #[error("accesses used with task {task}, which was built with a different rewire capability")]
    ForeignAccesses {
        /// The task the accesses were used with.
        task: TaskId,
    },
}

/// Reports `violation` and panics.
#[cold]
#[track_caller]
pub(crate) fn fatal(violation: Violation) -> ! {
    tracing::error!(%violation, "dependency tracking contract violated");
    panic!("{violation}")
}

/// Like [`fatal`], but only logs if the thread is already unwinding, so that a
/// failing test reports its own panic rather than aborting in a destructor.
#[track_caller]
pub(crate) fn fatal_on_drop(violation: Violation) {
    #[cfg(any(feature = "std", test))]
    if std::thread::panicking() {
        tracing::error!(%violation, "dependency tracking contract violated while unwinding");
        return;
    }
    fatal(violation)
}
