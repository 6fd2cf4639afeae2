#![cfg_attr(docsrs, doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_debug_implementations)]

#[cfg(any(feature = "alloc", test))]
extern crate alloc;
#[cfg(test)]
extern crate std;

#[macro_use]
pub(crate) mod util;
pub(crate) mod loom;

pub mod dlist;
pub mod hashed;
pub mod lf_list;
pub mod slist;

feature! {
    #![any(feature = "alloc", test)]
    pub mod head_list;
    #[doc(inline)]
    pub use head_list::HeadList;
}

#[doc(inline)]
pub use dlist::DlList;
#[doc(inline)]
pub use hashed::HashedList;
#[doc(inline)]
pub use lf_list::LfList;
#[doc(inline)]
pub use slist::SlList;

use core::ptr::NonNull;

/// Trait implemented by types which can be members of an intrusive
/// collection.
///
/// In order to be part of an intrusive collection, a type must contain a
/// `Links` type that stores the pointers to other nodes in that collection.
/// A type may implement `Linked` several times, once per `Links` type it
/// contains, and be a member of one collection of each kind at once.
///
/// # Safety
///
/// This is unsafe to implement because it's the implementation's
/// responsibility to ensure that types implementing this trait are valid
/// intrusive collection nodes. In particular:
///
/// - Implementors **must** be pinned in memory while they are in an intrusive
///   collection: they may not be deallocated or moved.
/// - The type implementing this trait **must not** implement [`Unpin`].
/// - Additional safety requirements for individual methods on this trait are
///   documented on those methods.
pub unsafe trait Linked<L> {
    /// The handle owning nodes in the collection.
    ///
    /// Collections which do not own their elements use a raw pointer type
    /// (such as [`NonNull`]) as their handle.
    type Handle;

    /// Convert a [`Self::Handle`] to a raw pointer to `Self`, taking ownership
    /// of it in the process.
    fn into_ptr(r: Self::Handle) -> NonNull<Self>;

    /// Convert a raw pointer to `Self` into an owning [`Self::Handle`].
    ///
    /// # Safety
    ///
    /// The pointer must have been produced by [`Self::into_ptr`], and must
    /// point to a valid instance of `Self`.
    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle;

    /// Return the links of the node pointed to by `ptr`.
    ///
    /// # Safety
    ///
    /// The pointer must point to a valid instance of `Self`.
    unsafe fn links(ptr: NonNull<Self>) -> NonNull<L>;
}

/// Readiness predicate consulted by the `get_ready` family of removals.
pub trait Ready {
    /// Returns `true` if this element may be handed out.
    fn is_ready(&self) -> bool;
}

/// Scheduling depth used to pick a [`HashedList`] bucket.
pub trait Depth {
    /// Returns this element's depth.
    fn depth(&self) -> usize;
}
