#![cfg_attr(docsrs, doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs, missing_debug_implementations)]

#[cfg(test)]
extern crate std;

#[macro_use]
pub(crate) mod util;
pub(crate) mod loom;

pub mod mutex;
pub mod spin;

#[doc(inline)]
pub use self::mutex::{Mutex, MutexGuard};
#[doc(inline)]
pub use self::spin::Spinlock;
pub use self::util::Backoff;
