//! Random access programs, executed against a tiny model of shared memory.
//!
//! Every object slot is a chain of versions. A write-only access always starts
//! a new version (the way a renaming version manager would), while reads and
//! read-writes use the slot's current version. Each version is a cell holding
//! the index of the task that last wrote it; a task that reads a version
//! checks that it observes the writer that precedes it in program order.
#![allow(dead_code)]

use proptest::prelude::*;
use rhizome::{Access, AccessKind, Accesses, ObjectDeps, Task, TaskGraph, TaskId};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// One task's declared `(slot, kind)` accesses. Slots are distinct.
pub type Decl = Vec<(usize, AccessKind)>;

pub fn access_kind() -> impl Strategy<Value = AccessKind> {
    prop_oneof![
        3 => Just(AccessKind::Read),
        2 => Just(AccessKind::ReadWrite),
        1 => Just(AccessKind::Write),
    ]
}

/// A program of up to `max_tasks` tasks over `slots` object slots.
pub fn program(slots: usize, max_tasks: usize) -> impl Strategy<Value = Vec<Decl>> {
    let decl = proptest::collection::btree_map(0..slots, access_kind(), 1..=slots.min(3))
        .prop_map(|accesses| accesses.into_iter().collect::<Decl>());
    proptest::collection::vec(decl, 1..=max_tasks)
}

pub struct Planned {
    pub task: Arc<Task>,
    pub accesses: Arc<Accesses>,
    /// `(version, kind, writer expected to be observed)`
    ops: Vec<(usize, AccessKind, Option<usize>)>,
}

pub struct Run {
    pub graph: Arc<TaskGraph>,
    pub planned: Vec<Planned>,
    by_id: HashMap<TaskId, usize>,
    cells: Mutex<Vec<Option<usize>>>,
    order: Mutex<Vec<usize>>,
}

impl Run {
    pub fn plan(program: &[Decl], slots: usize) -> Self {
        let graph = TaskGraph::new();
        let mut versions: Vec<Arc<ObjectDeps>> = Vec::new();
        let mut last_writer: Vec<Option<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        for _ in 0..slots {
            current.push(versions.len());
            versions.push(Arc::new(ObjectDeps::new()));
            last_writer.push(None);
        }

        let mut planned = Vec::with_capacity(program.len());
        let mut by_id = HashMap::new();
        for (idx, decl) in program.iter().enumerate() {
            let mut ops = Vec::new();
            let mut accesses = Vec::new();
            for &(slot, kind) in decl {
                if kind == AccessKind::Write {
                    current[slot] = versions.len();
                    versions.push(Arc::new(ObjectDeps::new()));
                    last_writer.push(None);
                }
                let version = current[slot];
                let expected = last_writer[version];
                if kind.writes() {
                    last_writer[version] = Some(idx);
                }
                ops.push((version, kind, expected));
                accesses.push(Access::new(&versions[version], kind));
            }
            let accesses = Accesses::new(accesses);
            let task = Task::builder(&graph)
                .depth(idx)
                .rewire(accesses.clone())
                .build();
            by_id.insert(task.id(), idx);
            planned.push(Planned {
                task,
                accesses,
                ops,
            });
        }

        Self {
            graph,
            planned,
            by_id,
            cells: Mutex::new(vec![None; versions.len()]),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Issues every task, in program order.
    pub fn issue_all(&self) {
        for planned in &self.planned {
            planned.accesses.issue(&planned.task);
        }
    }

    /// Runs a ready task: checks what it reads, performs its writes, and
    /// completes it.
    pub fn execute(&self, task: &Task) {
        let idx = self.by_id[&task.id()];
        let planned = &self.planned[idx];
        {
            let mut cells = self.cells.lock().unwrap();
            for &(version, kind, expected) in &planned.ops {
                if kind.reads() {
                    assert_eq!(
                        cells[version], expected,
                        "task {idx} read version {version} out of order"
                    );
                }
                if kind.writes() {
                    cells[version] = Some(idx);
                }
            }
            self.order.lock().unwrap().push(idx);
        }
        planned.accesses.complete(task);
    }

    /// Runs tasks from the graph until it is empty.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.graph.get_ready_task() {
            self.execute(&task);
            ran += 1;
        }
        ran
    }

    pub fn executed(&self) -> Vec<usize> {
        self.order.lock().unwrap().clone()
    }

    /// Asserts every task ran exactly once and nothing is left behind.
    pub fn assert_finished(&self) {
        let mut order = self.executed();
        order.sort_unstable();
        assert_eq!(order, (0..self.planned.len()).collect::<Vec<_>>());
        self.graph.check_drained().unwrap();
        for planned in &self.planned {
            assert_eq!(planned.task.incoming(), 0);
            assert_eq!(planned.task.edge_count(), 0);
            for access in planned.accesses.iter() {
                access.object().check_retired().unwrap();
            }
        }
    }
}
