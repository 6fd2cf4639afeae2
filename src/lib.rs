#![cfg_attr(docsrs, doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
//! Dependency tracking for a task-parallel runtime.
//!
//! Tasks declare the objects they read and write. Each object version
//! remembers its last writer and its current readers ([`ObjectDeps`]); issuing
//! a task's accesses installs edges from the tasks it must wait on, and a task
//! whose last incoming edge is released is handed to its [`TaskGraph`].
extern crate alloc;

#[macro_use]
pub(crate) mod util;
pub(crate) mod loom;

pub mod access;
pub mod depth;
pub mod error;
pub mod graph;
pub mod migrate;
pub mod object;
pub mod tag;
pub mod task;

#[doc(inline)]
pub use self::{
    access::{Access, Accesses, DepTags},
    depth::DepthQueue,
    error::Violation,
    graph::TaskGraph,
    migrate::Rewire,
    object::{AccessKind, ObjectDeps, ObjectGuard},
    tag::{DepTag, Role},
    task::{Registration, Task, TaskId},
};
