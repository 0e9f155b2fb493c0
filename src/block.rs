//! Memory block descriptions.
//!
//! A [`Block`] describes a contiguous region that some allocator is
//! willing to reclaim. It is not an owner: lifetime is governed by
//! whichever allocator, buffer, or smart pointer holds it. Two flavors
//! share one definition: `Block<T>` indexes in units of `T`, and
//! [`RawBlock`] (`Block<Untyped>`) indexes in bytes. The flavors have
//! identical layout, and any typed block can be reinterpreted as its
//! byte footprint with [`Block::as_untyped`].

use core::fmt;
use core::mem;
use core::ptr;
use core::slice;

/// Signed size used for every request and block in the crate.
///
/// Sizes are signed so that negative values can flag invalid requests
/// and so that subtractions fail loudly in debug builds instead of
/// wrapping.
pub type Size = i64;

/// Hint of a block whose producing allocator left no provenance tag.
///
/// Owners that see this sentinel fall back to pointer-range checks.
pub const NO_HINT: i64 = i64::MIN;

/// Converts an unsigned in-memory quantity to a signed [`Size`].
///
/// # Panics
///
/// Panics if `n` exceeds `i64::MAX`; in const contexts the panic is a
/// compile error.
#[must_use]
pub const fn safe_size(n: usize) -> Size {
    assert!(n <= i64::MAX as usize, "size overflows the signed range");
    n as Size
}

/// `size_of`, as a signed [`Size`].
#[must_use]
pub const fn ssize_of<T>() -> Size {
    mem::size_of::<T>() as Size
}

/// Element type of the byte-indexed block flavor.
///
/// A single opaque byte. `Block<Untyped>` therefore reuses every
/// generic `Block` operation with byte granularity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Untyped(u8);

impl Untyped {
    /// Wraps a raw byte value.
    #[must_use]
    pub const fn byte(value: u8) -> Untyped {
        Untyped(value)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// The byte-indexed block flavor used throughout the allocator
/// contract.
pub type RawBlock = Block<Untyped>;

/// Description of a contiguous memory region.
///
/// A block is either fully empty (zero size, null data) or fully
/// populated (positive size, non-null data); the constructors
/// normalize any partial pair to empty. The `hint` is an opaque tag
/// written by the producing allocator, preserved by composing
/// allocators, and consulted to route a block back to its owner.
#[derive(PartialEq)]
pub struct Block<T> {
    size: Size,
    data: *mut T,
    hint: i64,
}

impl<T> Block<T> {
    /// The empty block.
    #[must_use]
    pub const fn empty() -> Block<T> {
        Block {
            size: 0,
            data: ptr::null_mut(),
            hint: NO_HINT,
        }
    }

    /// Describes `size` elements starting at `data`.
    ///
    /// A non-positive size or a null pointer normalizes the block to
    /// empty.
    #[must_use]
    pub fn new(size: Size, data: *mut T) -> Block<T> {
        Block::with_hint(size, data, NO_HINT)
    }

    /// Like [`Block::new`], carrying the producing allocator's hint.
    #[must_use]
    pub fn with_hint(size: Size, data: *mut T, hint: i64) -> Block<T> {
        if size <= 0 || data.is_null() {
            return Block {
                size: 0,
                data: ptr::null_mut(),
                hint,
            };
        }
        Block { size, data, hint }
    }

    /// Number of elements described.
    #[inline]
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Pointer to the first element; null iff empty.
    #[inline]
    #[must_use]
    pub fn data(&self) -> *mut T {
        self.data
    }

    /// Provenance tag written by the producing allocator, or
    /// [`NO_HINT`].
    #[inline]
    #[must_use]
    pub fn hint(&self) -> i64 {
        self.hint
    }

    /// Returns `true` iff the block describes no memory.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0 && self.data.is_null()
    }

    /// Resets to the empty block.
    #[inline]
    pub fn clear(&mut self) {
        *self = Block::empty();
    }

    /// Size of the block's byte footprint.
    #[inline]
    #[must_use]
    pub fn byte_size(&self) -> Size {
        self.size * ssize_of::<T>()
    }

    /// Reinterprets the block as its byte footprint.
    ///
    /// The hint is preserved, so the untyped view deallocates through
    /// the same layers as the typed one.
    #[must_use]
    pub fn as_untyped(&self) -> RawBlock {
        Block::with_hint(self.byte_size(), self.data.cast(), self.hint)
    }

    /// Compares two blocks of the same element type.
    ///
    /// Blocks of unequal size are unequal; otherwise elements are
    /// compared pairwise.
    ///
    /// # Safety
    ///
    /// Both blocks must describe initialized memory that is live for
    /// the duration of the call.
    #[must_use]
    pub unsafe fn eq_elems(&self, other: &Block<T>) -> bool
    where
        T: PartialEq,
    {
        if self.is_empty() && other.is_empty() {
            return true;
        }
        if self.size != other.size {
            return false;
        }
        // SAFETY: non-empty blocks of equal size; liveness is the
        // caller's obligation.
        let lhs = unsafe { slice::from_raw_parts(self.data, self.size as usize) };
        let rhs = unsafe { slice::from_raw_parts(other.data, other.size as usize) };
        lhs == rhs
    }

    /// Compares byte footprints across typed and untyped views.
    ///
    /// Equal iff the footprints have the same byte size and identical
    /// contents. `Block<T>` compares equal to its own
    /// [`as_untyped`](Block::as_untyped) view.
    ///
    /// # Safety
    ///
    /// Both blocks must describe initialized memory that is live for
    /// the duration of the call.
    #[must_use]
    pub unsafe fn byte_eq<U>(&self, other: &Block<U>) -> bool {
        let a = self.as_untyped();
        let b = other.as_untyped();
        if a.is_empty() && b.is_empty() {
            return true;
        }
        if a.size != b.size {
            return false;
        }
        // SAFETY: equal-size non-empty footprints; liveness is the
        // caller's obligation.
        let lhs = unsafe { slice::from_raw_parts(a.data.cast::<u8>(), a.size as usize) };
        let rhs = unsafe { slice::from_raw_parts(b.data.cast::<u8>(), b.size as usize) };
        lhs == rhs
    }

    /// Copies up to `n` elements from `src` into this block.
    ///
    /// Copies `min(n, src.size(), self.size())` elements and returns
    /// the count; returns 0 when either block is empty or `n <= 0`.
    ///
    /// # Safety
    ///
    /// Both blocks must describe initialized, non-overlapping memory
    /// that is live for the duration of the call.
    pub unsafe fn copy_from(&self, src: &Block<T>, n: Size) -> Size
    where
        T: Clone,
    {
        if self.is_empty() || src.is_empty() || n <= 0 {
            return 0;
        }
        let count = n.min(src.size).min(self.size) as usize;
        // SAFETY: count is within both blocks; liveness and
        // disjointness are the caller's obligation.
        let from = unsafe { slice::from_raw_parts(src.data, count) };
        let to = unsafe { slice::from_raw_parts_mut(self.data, count) };
        to.clone_from_slice(from);
        count as Size
    }

    /// Writes up to `n` clones of `value` into this block.
    ///
    /// Writes `min(n, self.size())` elements and returns the count.
    ///
    /// # Safety
    ///
    /// The block must describe initialized memory that is live for the
    /// duration of the call.
    pub unsafe fn fill(&self, value: T, n: Size) -> Size
    where
        T: Clone,
    {
        if self.is_empty() || n <= 0 {
            return 0;
        }
        let count = n.min(self.size) as usize;
        // SAFETY: count is within the block.
        let to = unsafe { slice::from_raw_parts_mut(self.data, count) };
        to.fill(value);
        count as Size
    }
}

impl Block<Untyped> {
    /// Lays down whole copies of `value` over the first
    /// `min(n, self.size())` bytes.
    ///
    /// Writes as many complete values as fit and returns their count;
    /// a trailing partial slot is left untouched. Returns 0 for empty
    /// blocks, `n <= 0`, or zero-sized `V`.
    ///
    /// # Safety
    ///
    /// The block must describe memory valid for writes and live for
    /// the duration of the call.
    pub unsafe fn fill_with<V: Copy>(&self, value: V, n: Size) -> Size {
        let width = ssize_of::<V>();
        if self.is_empty() || n <= 0 || width == 0 {
            return 0;
        }
        let count = n.min(self.size) / width;
        let mut at = self.data.cast::<V>();
        for _ in 0..count {
            // SAFETY: count whole values fit in the block; the write is
            // unaligned because byte offsets owe V no alignment.
            unsafe {
                at.write_unaligned(value);
                at = at.add(1);
            }
        }
        count
    }
}

impl<T> Clone for Block<T> {
    #[inline]
    fn clone(&self) -> Block<T> {
        *self
    }
}

impl<T> Copy for Block<T> {}

impl<T> fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("size", &self.size)
            .field("data", &self.data)
            .field("hint", &self.hint)
            .finish()
    }
}
