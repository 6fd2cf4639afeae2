//! Ready tasks sharded by scheduling depth.
use crate::{
    error::{fatal, Violation},
    graph::TaskGraph,
    task::Task,
};
use alloc::sync::Arc;
use core::fmt;
use hyphae::hashed::{HashedList, DEFAULT_BUCKETS};

/// A ready container that shards tasks by [`Task::depth`].
///
/// Workers that pass the depth of the task they just ran as a hint tend to
/// pick up work from the same region of the task tree, and rarely contend on
/// the same bucket lock. See [`HashedList`] for how buckets are probed.
pub struct DepthQueue<const SIZE: usize = DEFAULT_BUCKETS> {
    tasks: HashedList<Task, SIZE>,
}

impl<const SIZE: usize> DepthQueue<SIZE> {
    /// Returns a new, empty queue.
    ///
    /// # Panics
    ///
    /// If `SIZE` is zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: HashedList::new(),
        }
    }

    /// Adds a ready task.
    ///
    /// # Panics
    ///
    /// If the task still has incoming edges, or is already queued.
    pub fn push_ready(&self, task: Arc<Task>) {
        let incoming = task.incoming();
        if incoming != 0 {
            fatal(Violation::QueuedUnready {
                task: task.id(),
                incoming,
            });
        }
        task.mark_queued();
        tracing::trace!(task.id = %task.id(), task.depth = task.depth(), "DepthQueue::push_ready");
        self.tasks.push(task);
    }

    /// Moves every task queued in `graph` into this queue, returning how many
    /// were moved.
    pub fn refill_from(&self, graph: &TaskGraph) -> usize {
        let mut moved = 0;
        while let Some(task) = graph.get_ready_task() {
            self.push_ready(task);
            moved += 1;
        }
        if moved > 0 {
            tracing::debug!(moved, "refilled depth queue");
        }
        moved
    }

    /// Takes a ready task, preferring those at `depth_hint` or one level
    /// deeper. A hint of `0` means no preference.
    pub fn get_ready(&self, depth_hint: usize) -> Option<Arc<Task>> {
        let task = self.tasks.get_ready(depth_hint)?;
        task.mark_dequeued();
        Some(task)
    }

    /// Takes a ready task from any depth.
    pub fn get_ready_any(&self) -> Option<Arc<Task>> {
        let task = self.tasks.get_ready_any()?;
        task.mark_dequeued();
        Some(task)
    }

    /// Returns the number of queued tasks when observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no task was queued when observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<const SIZE: usize> Default for DepthQueue<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> fmt::Debug for DepthQueue<SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthQueue")
            .field("tasks", &self.tasks)
            .finish()
    }
}
