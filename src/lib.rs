#![doc = include_str!("../README.md")]
#![no_std]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(any(feature = "alloc", test))]
extern crate alloc;

pub mod block;
pub mod buffer;
pub mod fallback;
pub mod free_list;
#[cfg(any(feature = "alloc", test))]
pub mod heap;
pub mod null;
pub mod ptr;
#[cfg(feature = "alloc")]
pub mod shared;
#[cfg(any(feature = "alloc", test))]
pub mod stack;
pub mod stats;

#[cfg(feature = "allocator-api2")]
pub mod adapter;

#[cfg(test)]
mod tests;

use thiserror::Error;

#[cfg(feature = "allocator-api2")]
#[doc(inline)]
pub use crate::adapter::Adapter;
#[doc(inline)]
pub use crate::block::{safe_size, ssize_of, Block, RawBlock, Size, Untyped, NO_HINT};
#[doc(inline)]
pub use crate::buffer::{Buffer, BufferError};
#[doc(inline)]
pub use crate::fallback::Fallback;
#[doc(inline)]
pub use crate::free_list::FreeList;
#[cfg(any(feature = "alloc", test))]
#[doc(inline)]
pub use crate::heap::Heap;
#[doc(inline)]
pub use crate::null::Null;
#[doc(inline)]
pub use crate::ptr::{SharedPtr, UniquePtr, WeakPtr};
#[cfg(feature = "alloc")]
#[doc(inline)]
pub use crate::shared::Shared;
#[cfg(any(feature = "alloc", test))]
#[doc(inline)]
pub use crate::stack::{MultiStack, Stack};
#[doc(inline)]
pub use crate::stats::{Record, Stats};

/// The error type for allocation requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The requested size is negative or otherwise unrepresentable.
    #[error("invalid allocation size")]
    InvalidSize,

    /// The allocator has no room left for the request.
    #[error("out of memory")]
    OutOfMemory,

    /// The underlying memory source failed for an unspecified reason.
    #[error("allocation failed")]
    Unknown,
}

/// The contract every allocator in this crate satisfies.
///
/// An allocator hands out [`RawBlock`] descriptions of memory it is
/// later willing to reclaim. The `Default + Clone` supertraits make
/// allocators cheap to embed in composing allocators and ownership
/// primitives; cloning an allocator duplicates (or shares, where the
/// implementation documents it) its internal bookkeeping, but never
/// transfers responsibility for outstanding blocks; those must be
/// returned to the instance that produced them.
///
/// Implementations are single-threaded: no allocator in this crate
/// synchronizes access to its state.
pub trait Allocator: Default + Clone {
    /// Attempts to allocate a block of `size` bytes.
    ///
    /// A request for zero bytes succeeds with the empty block. A
    /// negative request fails with [`AllocError::InvalidSize`]. Any
    /// other successful result describes exactly `size` bytes at a
    /// non-null address.
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError>;

    /// Returns `block` to this allocator and resets it to empty.
    ///
    /// Deallocating the empty block is a safe no-op.
    ///
    /// # Safety
    ///
    /// A non-empty `block` must have been produced by this allocator
    /// (or routed here by an ownership-aware composite such as
    /// [`Fallback`]) and must not have been deallocated already.
    unsafe fn deallocate(&mut self, block: &mut RawBlock);

    /// Returns `true` iff this allocator can correctly deallocate
    /// `block`. Never mutates.
    fn owns(&self, block: &RawBlock) -> bool;
}

/// Derives a provenance tag from an identifying byte string.
///
/// Leaf allocators write such a tag as the [hint](Block::hint) of every
/// block they produce, letting multi-layer allocators route a block
/// back to the layer that owns it. Distinct identifying strings yield
/// distinct tags for any realistic choice of identifier (a UUID string
/// is customary).
#[must_use]
pub const fn provenance_tag(name: &[u8]) -> i64 {
    let mut code: u64 = 0;
    let mut i = 0;
    while i < name.len() && code < i64::MAX as u64 {
        code |= name[i] as u64;
        code <<= 8;
        i += 1;
    }
    code as i64
}
