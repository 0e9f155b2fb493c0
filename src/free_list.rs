//! Bounded free-list caching.
//!
//! A free list sits in front of an inner allocator and retains up to
//! `CAP` recently freed blocks whose sizes fall in `[MIN, MAX]`. A
//! cached block is overlaid with an intrusive node holding the hint of
//! the allocator that originally produced it, so that at teardown every
//! cached block can be routed back to the right layer.

use core::fmt;
use core::ptr;

use crate::{ssize_of, AllocError, Allocator, RawBlock, Size};

/// Intrusive link overlaid at the base of a cached block.
struct Node {
    hint: i64,
    next: *mut Node,
}

/// Caches up to `CAP` freed blocks with sizes in `[MIN, MAX]`.
///
/// In-range requests are satisfied from the cache in LIFO order when
/// possible. On a cache miss, in-range requests are forwarded to the
/// inner allocator at `MAX` bytes (so that the block is re-cacheable
/// later), while out-of-range requests pass through at their true
/// size. Freed in-range blocks are cached while the list has room and
/// are otherwise returned to the inner allocator at their true `MAX`
/// footprint.
///
/// `MIN` and `MAX` must be even, greater than one, and ordered;
/// `MAX` must fit the intrusive node; `CAP` must be positive.
pub struct FreeList<A: Allocator, const MIN: i64, const MAX: i64, const CAP: i64> {
    inner: A,
    head: *mut Node,
    len: i64,
}

impl<A: Allocator, const MIN: i64, const MAX: i64, const CAP: i64> FreeList<A, MIN, MAX, CAP> {
    /// Constructs an empty cache over `A::default()`.
    ///
    /// # Panics
    ///
    /// Panics if the compile-time parameters are invalid.
    #[must_use]
    pub fn new() -> FreeList<A, MIN, MAX, CAP> {
        FreeList::with_inner(A::default())
    }

    /// Constructs an empty cache over `inner`.
    ///
    /// # Panics
    ///
    /// Panics if the compile-time parameters are invalid.
    pub fn with_inner(inner: A) -> FreeList<A, MIN, MAX, CAP> {
        assert!(
            MIN > 1 && MIN % 2 == 0,
            "minimum cached size must be even and greater than one"
        );
        assert!(
            MAX > 1 && MAX % 2 == 0,
            "maximum cached size must be even and greater than one"
        );
        assert!(MIN <= MAX, "cached size range must be ordered");
        assert!(CAP > 0, "cache capacity must be positive");
        assert!(
            MAX >= ssize_of::<Node>(),
            "cached blocks must fit the intrusive node"
        );

        FreeList {
            inner,
            head: ptr::null_mut(),
            len: 0,
        }
    }

    /// Number of blocks currently cached.
    #[must_use]
    pub fn cached(&self) -> i64 {
        self.len
    }

    /// The allocator behind the cache.
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn in_range(size: Size) -> bool {
        size >= MIN && size <= MAX
    }
}

impl<A: Allocator, const MIN: i64, const MAX: i64, const CAP: i64> Allocator
    for FreeList<A, MIN, MAX, CAP>
{
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        if Self::in_range(size) && !self.head.is_null() {
            let node = self.head;
            // SAFETY: head was written by `deallocate` and has been
            // untouched since; the read is unaligned because the inner
            // allocator owes the node no alignment.
            let link = unsafe { node.read_unaligned() };
            self.head = link.next;
            self.len -= 1;
            return Ok(RawBlock::with_hint(size, node.cast(), link.hint));
        }

        let forwarded = if Self::in_range(size) { MAX } else { size };
        let block = self.inner.allocate(forwarded)?;
        Ok(RawBlock::with_hint(size, block.data().cast(), block.hint()))
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        if block.is_empty() {
            return;
        }

        if Self::in_range(block.size()) {
            if self.len < CAP {
                let node = block.data().cast::<Node>();
                // SAFETY: an in-range block has a true footprint of at
                // least MAX bytes, which fits the node.
                unsafe {
                    node.write_unaligned(Node {
                        hint: block.hint(),
                        next: self.head,
                    });
                }
                self.head = node;
                self.len += 1;
                block.clear();
            } else {
                // The cache is full; hand the block back at its true
                // footprint.
                let mut full = RawBlock::with_hint(MAX, block.data(), block.hint());
                block.clear();
                // SAFETY: `full` re-describes the caller's block, which
                // the inner allocator produced at MAX bytes.
                unsafe { self.inner.deallocate(&mut full) };
            }
        } else {
            // Out-of-range blocks were forwarded at their true size,
            // so they return at it too.
            // SAFETY: forwarded per the contract.
            unsafe { self.inner.deallocate(block) };
        }
    }

    fn owns(&self, block: &RawBlock) -> bool {
        Self::in_range(block.size()) || self.inner.owns(block)
    }
}

impl<A: Allocator, const MIN: i64, const MAX: i64, const CAP: i64> Default
    for FreeList<A, MIN, MAX, CAP>
{
    fn default() -> FreeList<A, MIN, MAX, CAP> {
        FreeList::new()
    }
}

impl<A: Allocator, const MIN: i64, const MAX: i64, const CAP: i64> Clone
    for FreeList<A, MIN, MAX, CAP>
{
    /// Clones the inner allocator; the cache itself is not duplicated.
    fn clone(&self) -> FreeList<A, MIN, MAX, CAP> {
        FreeList::with_inner(self.inner.clone())
    }
}

impl<A: Allocator, const MIN: i64, const MAX: i64, const CAP: i64> Drop
    for FreeList<A, MIN, MAX, CAP>
{
    fn drop(&mut self) {
        // Return every cached block to the allocator that produced it,
        // restoring the hint stored in its node.
        while !self.head.is_null() {
            let node = self.head;
            // SAFETY: list nodes are live cached blocks.
            let link = unsafe { node.read_unaligned() };
            self.head = link.next;

            let mut full = RawBlock::with_hint(MAX, node.cast(), link.hint);
            // SAFETY: cached blocks came from the inner allocator at
            // MAX bytes.
            unsafe { self.inner.deallocate(&mut full) };
        }
    }
}

impl<A: Allocator, const MIN: i64, const MAX: i64, const CAP: i64> fmt::Debug
    for FreeList<A, MIN, MAX, CAP>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("min", &MIN)
            .field("max", &MAX)
            .field("capacity", &CAP)
            .field("cached", &self.len)
            .finish()
    }
}
