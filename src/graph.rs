//! The ready container of one task-graph generation.
use crate::{
    error::{fatal, fatal_on_drop, Violation},
    loom::atomic::{AtomicUsize, Ordering::*},
    task::Task,
};
use alloc::sync::Arc;
use core::fmt;
use hyphae::SlList;
use rhizome_sync::Mutex;

/// A FIFO of tasks with nothing left to wait on.
///
/// Tasks are pushed by whichever thread releases their last incoming edge (or
/// closes their registration), and popped by workers. Emptiness can be
/// polled without taking the lock.
///
/// Tasks hold only a weak reference to their graph. Dropping a graph that
/// still holds queued tasks is a contract violation.
pub struct TaskGraph {
    ready: Mutex<SlList<Task>>,
    len: AtomicUsize,
}

impl TaskGraph {
    /// Returns a new, empty graph.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: Mutex::new(SlList::new()),
            len: AtomicUsize::new(0),
        })
    }

    /// Appends a ready task to the FIFO.
    ///
    /// # Panics
    ///
    /// If the task still has incoming edges, or is already queued in a ready
    /// container.
    pub fn add_ready_task(&self, task: Arc<Task>) {
        let incoming = task.incoming();
        if incoming != 0 {
            fatal(Violation::QueuedUnready {
                task: task.id(),
                incoming,
            });
        }
        task.mark_queued();
        tracing::debug!(task.id = %task.id(), "task ready");
        let mut ready = self.ready.lock();
        ready.push_back(task);
        self.len.fetch_add(1, Release);
    }

    /// Pops the oldest ready task, if there is one.
    pub fn get_ready_task(&self) -> Option<Arc<Task>> {
        if self.is_empty() {
            return None;
        }
        let task = {
            let mut ready = self.ready.lock();
            let task = ready.pop_front()?;
            self.len.fetch_sub(1, Release);
            task
        };
        task.mark_dequeued();
        Some(task)
    }

    /// Returns `true` if no task was queued when observed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of queued tasks when observed.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Acquire)
    }

    /// Checks that every queued task has been taken out.
    pub fn check_drained(&self) -> Result<(), Violation> {
        match self.len() {
            0 => Ok(()),
            pending => Err(Violation::PendingTasks { pending }),
        }
    }
}

impl Drop for TaskGraph {
    fn drop(&mut self) {
        if let Err(violation) = self.check_drained() {
            fatal_on_drop(violation);
        }
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
