//! Moving a task's position in the dependency graph onto another task.
//!
//! A version manager that promotes work from one task to another needs the
//! new task to take over everything the old one was recorded as: the reader
//! and writer positions it holds on objects, and the edges its successors are
//! waiting on. Positions are rewired by a [`Rewire`] capability the old task
//! was built with; edges are transplanted wholesale.
use crate::{
    error::{fatal, Violation},
    task::Task,
};
use core::ptr;

/// A capability that substitutes one task for another in every object
/// record naming it.
///
/// The standard implementation is [`Accesses`](crate::Accesses), which
/// rewires the objects the task declared accesses to.
pub trait Rewire: Send + Sync {
    /// Replaces `from` with `to` wherever `from` is recorded as a reader or
    /// writer.
    ///
    /// Each object must be locked while it is rewritten, and only one object
    /// lock may be held at a time.
    fn rewire(&self, from: &Task, to: &Task);
}

impl Task {
    /// Makes `self` take over `from`'s position in the dependency graph.
    ///
    /// `from`'s rewire capability is run to substitute `self` in the object
    /// records naming `from`; then `from`'s outgoing edges and its capability
    /// are moved onto `self`. Afterwards `from` is recorded nowhere, and
    /// completing `self` wakes the tasks that were waiting on `from`.
    ///
    /// `self` stays locked throughout, so edges installed on it while objects
    /// are being rewired are held back until the transplant is done. Because
    /// of this, `from`'s capability must not visit the same object twice.
    ///
    /// # Panics
    ///
    /// This is a contract violation if:
    ///
    /// - `from` still has incoming edges: its predecessors' edges cannot be
    ///   retargeted;
    /// - `from` has no rewire capability;
    /// - `self` already has a rewire capability, or outgoing edges;
    /// - `from` and `self` are the same task.
    pub fn migrate_from(&self, from: &Task) {
        assert!(
            !ptr::eq(self, from),
            "task {} cannot be migrated onto itself",
            self.id()
        );

        let incoming = from.incoming();
        if incoming != 0 {
            fatal(Violation::MigratingUnreadyTask {
                task: from.id(),
                incoming,
            });
        }

        let mut to_inner = self.lock_inner();
        if to_inner.rewire.is_some() {
            fatal(Violation::RewireInstalled { task: self.id() });
        }
        if !to_inner.edges.is_empty() {
            fatal(Violation::EdgeListNotEmpty { task: self.id() });
        }

        let Some(rewire) = from.lock_inner().rewire.take() else {
            fatal(Violation::MissingRewire { task: from.id() });
        };
        tracing::debug!(from.id = %from.id(), to.id = %self.id(), "migrating task");

        rewire.rewire(from, self);

        let mut edges = from.lock_inner().edges.take();
        to_inner.edges.append(&mut edges);
        to_inner.rewire = Some(rewire);
        tracing::debug!(
            from.id = %from.id(),
            to.id = %self.id(),
            edges = to_inner.edges.len(),
            "migrated task",
        );
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::{graph::TaskGraph, tag::DepTag};
    use alloc::sync::Arc;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder(StdMutex<Vec<(crate::TaskId, crate::TaskId)>>);

    impl Rewire for Recorder {
        fn rewire(&self, from: &Task, to: &Task) {
            self.0.lock().unwrap().push((from.id(), to.id()));
        }
    }

    #[test]
    fn transplants_edges_and_capability() {
        let _trace = crate::util::trace_init();
        let graph = TaskGraph::new();
        let recorder = Arc::new(Recorder::default());
        let old = Task::builder(&graph).rewire(recorder.clone()).build();
        let new = Task::new(&graph);
        let succs = [Task::new(&graph), Task::new(&graph)];
        let tags = [DepTag::new(), DepTag::new()];
        for (succ, tag) in succs.iter().zip(&tags) {
            unsafe { old.add_edge(succ, tag) };
        }

        new.migrate_from(&old);

        assert_eq!(*recorder.0.lock().unwrap(), [(old.id(), new.id())]);
        assert!(!old.has_rewire());
        assert!(new.has_rewire());
        assert_eq!(old.edge_count(), 0);
        assert_eq!(new.successors(), [succs[0].id(), succs[1].id()]);

        assert_eq!(new.wakeup_deps(), 2);
        for succ in &succs {
            let ready = graph.get_ready_task().expect("successor should be ready");
            assert!(Arc::ptr_eq(succ, &ready));
        }
    }

    #[test]
    #[should_panic(expected = "no rewire capability")]
    fn missing_rewire_is_fatal() {
        let graph = TaskGraph::new();
        let (old, new) = (Task::new(&graph), Task::new(&graph));
        new.migrate_from(&old);
    }

    #[test]
    #[should_panic(expected = "already has a rewire capability")]
    fn installed_rewire_is_fatal() {
        let graph = TaskGraph::new();
        let old = Task::builder(&graph)
            .rewire(Arc::new(Recorder::default()))
            .build();
        let new = Task::builder(&graph)
            .rewire(Arc::new(Recorder::default()))
            .build();
        new.migrate_from(&old);
    }

    #[test]
    #[should_panic(expected = "incoming edge(s) still target it")]
    fn unready_source_is_fatal() {
        let graph = TaskGraph::new();
        let old = Task::builder(&graph)
            .rewire(Arc::new(Recorder::default()))
            .build();
        let new = Task::new(&graph);
        let _reg = old.register();
        new.migrate_from(&old);
    }

    #[test]
    #[should_panic(expected = "onto itself")]
    fn self_migration_is_fatal() {
        let graph = TaskGraph::new();
        let task = Task::new(&graph);
        task.migrate_from(&task);
    }
}
