//! Owning variable-size storage.
//!
//! A [`Buffer`] lifts an allocator-backed block to typed, constructed
//! storage. The optional `STACK` parameter reserves room for that many
//! elements inside the buffer value itself; constructions that fit
//! never touch the allocator. Every slot is initialized exactly once
//! at construction and, for element types with destructors, dropped
//! exactly once when the buffer goes away.

use core::fmt;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};
use core::slice;

use thiserror::Error;

use crate::{safe_size, ssize_of, AllocError, Allocator, Block, RawBlock, Size};

/// The error type for buffer construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The requested length is negative or overflows the byte size.
    #[error("invalid buffer length")]
    InvalidSize,

    /// The backing allocator reported an error.
    #[error("buffer allocation failed: {0}")]
    AllocatorFailure(#[from] AllocError),

    /// Construction failed for an unspecified reason.
    #[error("buffer construction failed")]
    Unknown,
}

/// Owning storage for a run of `T`, backed by `A` or by `STACK`
/// in-place slots.
///
/// Lengths of at most `STACK` elements live inside the buffer value
/// and never call the allocator; larger lengths get one block of
/// `len * size_of::<T>()` bytes. Cloning always duplicates into fresh
/// storage, never aliasing the source. Moving the buffer moves
/// in-place storage with it, which is why [`block`](Buffer::block) and
/// [`data`](Buffer::data) are descriptions valid only until the buffer
/// moves or is dropped.
pub struct Buffer<T, A: Allocator, const STACK: usize = 0> {
    len: Size,
    inline: [MaybeUninit<T>; STACK],
    heap: RawBlock,
    alloc: A,
}

impl<T, A: Allocator, const STACK: usize> Buffer<T, A, STACK> {
    /// The empty buffer; never allocates.
    #[must_use]
    pub fn empty() -> Buffer<T, A, STACK> {
        Buffer::empty_in(A::default())
    }

    /// The empty buffer over `alloc`.
    #[must_use]
    pub fn empty_in(alloc: A) -> Buffer<T, A, STACK> {
        Buffer {
            len: 0,
            inline: Buffer::<T, A, STACK>::uninit_inline(),
            heap: RawBlock::empty(),
            alloc,
        }
    }

    /// Constructs `len` default-valued slots from `A::default()`.
    ///
    /// # Panics
    ///
    /// Panics on construction failure; use
    /// [`try_new`](Buffer::try_new) to handle it.
    #[must_use]
    pub fn new(len: Size) -> Buffer<T, A, STACK>
    where
        T: Default,
    {
        Buffer::new_in(len, A::default())
    }

    /// Fallible form of [`new`](Buffer::new).
    pub fn try_new(len: Size) -> Result<Buffer<T, A, STACK>, BufferError>
    where
        T: Default,
    {
        Buffer::try_new_in(len, A::default())
    }

    /// Constructs `len` default-valued slots from `alloc`.
    ///
    /// # Panics
    ///
    /// Panics on construction failure.
    #[must_use]
    pub fn new_in(len: Size, alloc: A) -> Buffer<T, A, STACK>
    where
        T: Default,
    {
        match Buffer::try_new_in(len, alloc) {
            Ok(buffer) => buffer,
            Err(err) => panic!("buffer construction failed: {err}"),
        }
    }

    /// Fallible form of [`new_in`](Buffer::new_in).
    pub fn try_new_in(len: Size, alloc: A) -> Result<Buffer<T, A, STACK>, BufferError>
    where
        T: Default,
    {
        let mut buffer = Buffer::reserve_in(len, alloc)?;
        let slots: *mut T = buffer.slots_for(len);
        for i in 0..len as usize {
            // SAFETY: `slots` spans `len` uninitialized slots.
            unsafe { slots.add(i).write(T::default()) };
        }
        buffer.len = len;
        Ok(buffer)
    }

    /// Constructs a buffer holding a copy of `src`, from
    /// `A::default()`.
    ///
    /// # Panics
    ///
    /// Panics on construction failure.
    #[must_use]
    pub fn from_slice(src: &[T]) -> Buffer<T, A, STACK>
    where
        T: Clone,
    {
        Buffer::from_slice_in(src, A::default())
    }

    /// Constructs a buffer holding a copy of `src`, from `alloc`.
    ///
    /// # Panics
    ///
    /// Panics on construction failure.
    #[must_use]
    pub fn from_slice_in(src: &[T], alloc: A) -> Buffer<T, A, STACK>
    where
        T: Clone,
    {
        match Buffer::try_from_slice_in(src, alloc) {
            Ok(buffer) => buffer,
            Err(err) => panic!("buffer construction failed: {err}"),
        }
    }

    /// Fallible form of [`from_slice_in`](Buffer::from_slice_in).
    pub fn try_from_slice_in(src: &[T], alloc: A) -> Result<Buffer<T, A, STACK>, BufferError>
    where
        T: Clone,
    {
        let len = safe_size(src.len());
        let mut buffer = Buffer::reserve_in(len, alloc)?;
        let slots: *mut T = buffer.slots_for(len);
        for (i, item) in src.iter().enumerate() {
            // SAFETY: `slots` spans `len` uninitialized slots.
            unsafe { slots.add(i).write(item.clone()) };
        }
        buffer.len = len;
        Ok(buffer)
    }

    /// Number of elements held.
    #[must_use]
    pub fn len(&self) -> Size {
        self.len
    }

    /// Returns `true` iff the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` iff the elements live in the in-place storage.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.len > 0 && self.len as usize <= STACK
    }

    /// Pointer to the first element; null when empty.
    ///
    /// The pointer is a description of the current backing and goes
    /// stale when the buffer moves; writing through it requires
    /// exclusive access to the buffer.
    #[must_use]
    pub fn data(&self) -> *mut T {
        if self.len == 0 {
            ptr::null_mut()
        } else if self.is_inline() {
            self.inline.as_ptr() as *mut T
        } else if mem::size_of::<T>() == 0 {
            NonNull::dangling().as_ptr()
        } else {
            self.heap.data().cast()
        }
    }

    /// The typed block view of the current backing.
    #[must_use]
    pub fn block(&self) -> Block<T> {
        Block::new(self.len, self.data())
    }

    /// Borrows the elements.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: `len` slots are initialized.
        unsafe { slice::from_raw_parts(self.data(), self.len as usize) }
    }

    /// Mutably borrows the elements.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.len == 0 {
            return &mut [];
        }
        let slots = self.slots_for(self.len);
        // SAFETY: `len` slots are initialized and exclusively borrowed.
        unsafe { slice::from_raw_parts_mut(slots, self.len as usize) }
    }

    /// The backing allocator.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Acquires backing for `len` elements without initializing any
    /// slot; `self.len` stays 0 until the caller has filled them.
    fn reserve_in(len: Size, alloc: A) -> Result<Buffer<T, A, STACK>, BufferError> {
        if len < 0 {
            return Err(BufferError::InvalidSize);
        }

        let mut buffer = Buffer::empty_in(alloc);
        if len as usize > STACK && mem::size_of::<T>() > 0 {
            let bytes = len
                .checked_mul(ssize_of::<T>())
                .ok_or(BufferError::InvalidSize)?;
            buffer.heap = buffer.alloc.allocate(bytes)?;
        }
        Ok(buffer)
    }

    /// Pointer to the slot storage that a buffer of length `len` uses.
    fn slots_for(&mut self, len: Size) -> *mut T {
        if len == 0 {
            ptr::null_mut()
        } else if len as usize <= STACK {
            self.inline.as_mut_ptr().cast()
        } else if mem::size_of::<T>() == 0 {
            NonNull::dangling().as_ptr()
        } else {
            self.heap.data().cast()
        }
    }

    fn uninit_inline() -> [MaybeUninit<T>; STACK] {
        // SAFETY: an array of MaybeUninit needs no initialization.
        unsafe { MaybeUninit::<[MaybeUninit<T>; STACK]>::uninit().assume_init() }
    }
}

impl<T: Clone, A: Allocator, const STACK: usize> Clone for Buffer<T, A, STACK> {
    /// Duplicates the elements into fresh backing; never aliases.
    ///
    /// # Panics
    ///
    /// Panics if the duplicate cannot be allocated.
    fn clone(&self) -> Buffer<T, A, STACK> {
        match Buffer::try_from_slice_in(self.as_slice(), self.alloc.clone()) {
            Ok(buffer) => buffer,
            Err(err) => panic!("buffer clone failed: {err}"),
        }
    }
}

impl<T, A: Allocator, const STACK: usize> Drop for Buffer<T, A, STACK> {
    fn drop(&mut self) {
        if self.len > 0 && mem::needs_drop::<T>() {
            let slots = self.slots_for(self.len);
            // SAFETY: `len` slots are initialized and dropped only
            // here.
            unsafe {
                ptr::drop_in_place(ptr::slice_from_raw_parts_mut(slots, self.len as usize));
            }
        }
        if !self.heap.is_empty() {
            let mut heap = self.heap;
            // SAFETY: the block came from `alloc` in `reserve_in`.
            unsafe { self.alloc.deallocate(&mut heap) };
            self.heap.clear();
        }
    }
}

impl<T, A: Allocator, const STACK: usize> Default for Buffer<T, A, STACK> {
    fn default() -> Buffer<T, A, STACK> {
        Buffer::empty()
    }
}

impl<T, A: Allocator, const STACK: usize> fmt::Debug for Buffer<T, A, STACK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("inline", &self.is_inline())
            .finish()
    }
}
