//! Allocator-aware smart pointers.
//!
//! [`UniquePtr`] owns its pointee exclusively; [`SharedPtr`] and
//! [`WeakPtr`] share one through a control block. The control block is
//! a rendezvous, not an owner: both pointer kinds point at it, and it
//! is released only when the last of either kind lets go. All three
//! types return their blocks to the allocator they are parameterized
//! by, and none of them is thread-safe.
//!
//! Shared ownership clones its allocator into every owner, so `A`
//! should be an allocator whose clones reach the same memory (`Heap`,
//! `Shared<..>`). An instance-local allocator such as `Stack` would
//! see the final release arrive at a clone that never produced the
//! block.

use core::any::Any;
use core::cell::Cell;
use core::cmp::Ordering;
use core::fmt;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use crate::{safe_size, ssize_of, AllocError, Allocator, RawBlock, Untyped};

/// Reference-count bookkeeping jointly owned by [`SharedPtr`] and
/// [`WeakPtr`].
///
/// The pointee dies when `strong` reaches zero; the control block
/// itself dies when both counts are zero. Plain `Cell` counters: the
/// pointers are single-threaded like the allocators beneath them.
struct ControlBlock {
    strong: Cell<i64>,
    weak: Cell<i64>,
}

/// Allocates a block for `value` from `alloc` and moves the value in.
///
/// Zero-sized values are placed at a dangling address and never touch
/// the allocator.
fn place<T, A: Allocator>(alloc: &mut A, value: T) -> Result<NonNull<T>, AllocError> {
    if mem::size_of::<T>() == 0 {
        let slot = NonNull::<T>::dangling();
        // SAFETY: any dangling pointer is valid for zero-sized writes.
        unsafe { slot.as_ptr().write(value) };
        return Ok(slot);
    }

    let block = alloc.allocate(ssize_of::<T>())?;
    let slot = block.data().cast::<T>();
    // SAFETY: the block spans a T; alignment is the allocator's
    // published guarantee.
    unsafe { slot.write(value) };
    // SAFETY: a non-empty block has non-null data.
    Ok(unsafe { NonNull::new_unchecked(slot) })
}

/// Runs the pointee's destructor and returns its block to `alloc`.
///
/// # Safety
///
/// `pointee` must have been placed by [`place`] (or an equivalent
/// allocation from `alloc`) and not released since.
unsafe fn release<T: ?Sized, A: Allocator>(alloc: &mut A, pointee: NonNull<T>) {
    // SAFETY: the pointee is live until `drop_in_place` below.
    let size = mem::size_of_val(unsafe { pointee.as_ref() });
    // SAFETY: per this function's contract.
    unsafe { ptr::drop_in_place(pointee.as_ptr()) };
    if size > 0 {
        let mut block = RawBlock::new(safe_size(size), pointee.cast::<Untyped>().as_ptr());
        // SAFETY: the block re-describes the pointee's allocation.
        unsafe { alloc.deallocate(&mut block) };
    }
}

fn new_control<A: Allocator>(alloc: &mut A) -> Result<*mut ControlBlock, AllocError> {
    let block = alloc.allocate(ssize_of::<ControlBlock>())?;
    let control = block.data().cast::<ControlBlock>();
    // SAFETY: the block spans a ControlBlock.
    unsafe {
        control.write(ControlBlock {
            strong: Cell::new(1),
            weak: Cell::new(0),
        });
    }
    Ok(control)
}

/// # Safety
///
/// `control` must come from [`new_control`] on `alloc` and both counts
/// must be zero.
unsafe fn release_control<A: Allocator>(alloc: &mut A, control: *mut ControlBlock) {
    let mut block = RawBlock::new(ssize_of::<ControlBlock>(), control.cast());
    // SAFETY: the block re-describes the control block's allocation.
    unsafe { alloc.deallocate(&mut block) };
}

/// # Safety
///
/// `control` must point at a live control block.
unsafe fn bump_strong(control: *mut ControlBlock) {
    // SAFETY: per this function's contract.
    let counts = unsafe { &*control };
    counts.strong.set(counts.strong.get() + 1);
}

/// # Safety
///
/// `control` must point at a live control block.
unsafe fn bump_weak(control: *mut ControlBlock) {
    // SAFETY: per this function's contract.
    let counts = unsafe { &*control };
    counts.weak.set(counts.weak.get() + 1);
}

/// Exclusive owner of a heap-resident `T`, parameterized by the
/// allocator its block came from.
///
/// Move-only by construction. Dropping (or [`reset`](UniquePtr::reset))
/// runs `T`'s destructor and returns the block to the allocator.
pub struct UniquePtr<T, A: Allocator> {
    pointee: *mut T,
    alloc: A,
}

impl<T, A: Allocator> UniquePtr<T, A> {
    /// The empty pointer.
    #[must_use]
    pub fn null() -> UniquePtr<T, A> {
        UniquePtr {
            pointee: ptr::null_mut(),
            alloc: A::default(),
        }
    }

    /// Places `value` in a block from `A::default()`.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails; use
    /// [`try_new`](UniquePtr::try_new) to handle failure.
    #[must_use]
    pub fn new(value: T) -> UniquePtr<T, A> {
        UniquePtr::new_in(value, A::default())
    }

    /// Fallible form of [`new`](UniquePtr::new).
    pub fn try_new(value: T) -> Result<UniquePtr<T, A>, AllocError> {
        UniquePtr::try_new_in(value, A::default())
    }

    /// Places `value` in a block from `alloc`.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails.
    #[must_use]
    pub fn new_in(value: T, alloc: A) -> UniquePtr<T, A> {
        match UniquePtr::try_new_in(value, alloc) {
            Ok(owner) => owner,
            Err(err) => panic!("unique pointer allocation failed: {err}"),
        }
    }

    /// Fallible form of [`new_in`](UniquePtr::new_in).
    pub fn try_new_in(value: T, mut alloc: A) -> Result<UniquePtr<T, A>, AllocError> {
        let pointee = place(&mut alloc, value)?;
        Ok(UniquePtr {
            pointee: pointee.as_ptr(),
            alloc,
        })
    }

    /// Adopts a raw pointee.
    ///
    /// # Safety
    ///
    /// `pointee` must be null or point at a live `T` in a
    /// `ssize_of::<T>()` block allocated from `alloc`.
    pub unsafe fn from_raw_in(pointee: *mut T, alloc: A) -> UniquePtr<T, A> {
        UniquePtr { pointee, alloc }
    }

    /// The raw pointee; null when empty.
    #[must_use]
    pub fn get(&self) -> *mut T {
        self.pointee
    }

    /// Returns `true` iff the pointer is empty.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.pointee.is_null()
    }

    /// Borrows the pointee, if any.
    #[must_use]
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: a non-null pointee is live by the type's invariant.
        unsafe { self.pointee.as_ref() }
    }

    /// Mutably borrows the pointee, if any.
    #[must_use]
    pub fn as_mut(&mut self) -> Option<&mut T> {
        // SAFETY: as in `as_ref`, plus exclusive access via `&mut
        // self`.
        unsafe { self.pointee.as_mut() }
    }

    /// Destroys the current pointee, if any, leaving the pointer
    /// empty.
    pub fn reset(&mut self) {
        if let Some(pointee) = NonNull::new(self.pointee) {
            // SAFETY: the pointee originates from `alloc` by the
            // type's invariant.
            unsafe { release(&mut self.alloc, pointee) };
            self.pointee = ptr::null_mut();
        }
    }

    /// Destroys the current pointee and adopts `pointee` in its place.
    ///
    /// # Safety
    ///
    /// As for [`from_raw_in`](UniquePtr::from_raw_in).
    pub unsafe fn reset_raw(&mut self, pointee: *mut T) {
        self.reset();
        self.pointee = pointee;
    }

    /// Releases ownership of the pointee without destroying it.
    #[must_use]
    pub fn release(&mut self) -> *mut T {
        mem::replace(&mut self.pointee, ptr::null_mut())
    }
}

impl<T, A: Allocator> Drop for UniquePtr<T, A> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T, A: Allocator> Default for UniquePtr<T, A> {
    fn default() -> UniquePtr<T, A> {
        UniquePtr::null()
    }
}

impl<T, A: Allocator> Deref for UniquePtr<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        self.as_ref().expect("deref of empty UniquePtr")
    }
}

impl<T, A: Allocator> DerefMut for UniquePtr<T, A> {
    fn deref_mut(&mut self) -> &mut T {
        self.as_mut().expect("deref of empty UniquePtr")
    }
}

impl<T, A: Allocator> PartialEq for UniquePtr<T, A> {
    fn eq(&self, other: &UniquePtr<T, A>) -> bool {
        self.pointee == other.pointee
    }
}

impl<T, A: Allocator> Eq for UniquePtr<T, A> {}

impl<T, A: Allocator> PartialOrd for UniquePtr<T, A> {
    fn partial_cmp(&self, other: &UniquePtr<T, A>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, A: Allocator> Ord for UniquePtr<T, A> {
    /// Orders by pointer identity.
    fn cmp(&self, other: &UniquePtr<T, A>) -> Ordering {
        self.pointee.cmp(&other.pointee)
    }
}

impl<T, A: Allocator> fmt::Debug for UniquePtr<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniquePtr")
            .field("pointee", &self.pointee)
            .finish()
    }
}

/// Reference-counted owner of a heap-resident `T`.
///
/// Holds two pointers: the pointee and the control block, each in its
/// own block from `A`. Cloning bumps the use count; the pointee is
/// destroyed exactly when the count reaches zero, and the control
/// block exactly when no [`WeakPtr`] observes it either.
///
/// The aliasing constructor ([`alias`](SharedPtr::alias)) shares a
/// control block while exposing a different pointer, which is how the
/// pointer casts ([`cast`](SharedPtr::cast),
/// [`downcast`](SharedPtr::downcast)) re-type a shared pointee without
/// forging a second control block.
pub struct SharedPtr<T: ?Sized, A: Allocator> {
    pointee: Option<NonNull<T>>,
    control: *mut ControlBlock,
    alloc: A,
}

impl<T, A: Allocator> SharedPtr<T, A> {
    /// The empty pointer, with no control block.
    #[must_use]
    pub fn null() -> SharedPtr<T, A> {
        SharedPtr {
            pointee: None,
            control: ptr::null_mut(),
            alloc: A::default(),
        }
    }

    /// Places `value` in a block from `A::default()`.
    ///
    /// # Panics
    ///
    /// Panics if either allocation fails; use
    /// [`try_new`](SharedPtr::try_new) to handle failure.
    #[must_use]
    pub fn new(value: T) -> SharedPtr<T, A> {
        SharedPtr::new_in(value, A::default())
    }

    /// Fallible form of [`new`](SharedPtr::new).
    pub fn try_new(value: T) -> Result<SharedPtr<T, A>, AllocError> {
        SharedPtr::try_new_in(value, A::default())
    }

    /// Places `value` in a block from `alloc`.
    ///
    /// # Panics
    ///
    /// Panics if either allocation fails.
    #[must_use]
    pub fn new_in(value: T, alloc: A) -> SharedPtr<T, A> {
        match SharedPtr::try_new_in(value, alloc) {
            Ok(shared) => shared,
            Err(err) => panic!("shared pointer allocation failed: {err}"),
        }
    }

    /// Fallible form of [`new_in`](SharedPtr::new_in).
    ///
    /// If the control block cannot be allocated, the already-placed
    /// value is destroyed and its block returned before the error is
    /// reported.
    pub fn try_new_in(value: T, mut alloc: A) -> Result<SharedPtr<T, A>, AllocError> {
        let pointee = place(&mut alloc, value)?;
        match new_control(&mut alloc) {
            Ok(control) => Ok(SharedPtr {
                pointee: Some(pointee),
                control,
                alloc,
            }),
            Err(err) => {
                // SAFETY: `pointee` was just placed from `alloc`.
                unsafe { release(&mut alloc, pointee) };
                Err(err)
            }
        }
    }

    /// Adopts a raw pointee, allocating a fresh control block.
    ///
    /// A null `pointee` yields the empty pointer without touching the
    /// allocator. Control-block exhaustion is reported instead of
    /// leaving a half-owned value behind.
    ///
    /// # Safety
    ///
    /// `pointee` must be null or point at a live `T` in a
    /// `ssize_of::<T>()` block allocated from `alloc`, with no other
    /// owner.
    pub unsafe fn from_raw_in(pointee: *mut T, mut alloc: A) -> Result<SharedPtr<T, A>, AllocError> {
        match NonNull::new(pointee) {
            None => Ok(SharedPtr {
                pointee: None,
                control: ptr::null_mut(),
                alloc,
            }),
            Some(pointee) => {
                let control = new_control(&mut alloc)?;
                Ok(SharedPtr {
                    pointee: Some(pointee),
                    control,
                    alloc,
                })
            }
        }
    }

    /// The raw pointee; null when empty.
    #[must_use]
    pub fn get(&self) -> *mut T {
        self.pointee.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Re-types the pointee via a pointer cast, sharing the control
    /// block.
    ///
    /// This is the one-size-fits-all rendering of static, const, and
    /// reinterpret pointer casts; `U` must fit in the pointee's block.
    #[must_use]
    pub fn cast<U>(&self) -> SharedPtr<U, A> {
        match self.pointee {
            Some(pointee) => SharedPtr::alias(self, pointee.cast::<U>()),
            None => SharedPtr::null(),
        }
    }

    /// Destroys the current pointee reference and adopts `pointee`
    /// with a fresh control block.
    ///
    /// # Safety
    ///
    /// As for [`from_raw_in`](SharedPtr::from_raw_in).
    pub unsafe fn reset_raw(&mut self, pointee: *mut T) -> Result<(), AllocError> {
        self.detach();
        self.pointee = None;
        self.control = ptr::null_mut();
        if let Some(pointee) = NonNull::new(pointee) {
            self.control = new_control(&mut self.alloc)?;
            self.pointee = Some(pointee);
        }
        Ok(())
    }
}

impl<T: ?Sized, A: Allocator> SharedPtr<T, A> {
    /// Aliasing constructor: shares `other`'s control block while
    /// exposing `pointee`.
    ///
    /// The result participates in `other`'s use count and destruction
    /// fate; `pointee` itself is not owned separately. The last owner
    /// releases through the pointer it holds, so `pointee` must cover
    /// the same allocation as `other`'s. This is the door to unsizing
    /// casts:
    ///
    /// ```
    /// use core::any::Any;
    /// use core::ptr::NonNull;
    /// use allockit::{Heap, SharedPtr};
    ///
    /// let shared = SharedPtr::<i32, Heap>::new(7);
    /// let ptr = NonNull::new(shared.get() as *mut dyn Any).unwrap();
    /// let any: SharedPtr<dyn Any, Heap> = SharedPtr::alias(&shared, ptr);
    /// assert_eq!(2, any.use_count());
    /// ```
    #[must_use]
    pub fn alias<U: ?Sized>(other: &SharedPtr<U, A>, pointee: NonNull<T>) -> SharedPtr<T, A> {
        if !other.control.is_null() {
            // SAFETY: a non-null control block is live while `other`
            // co-owns it.
            unsafe { bump_strong(other.control) };
        }
        SharedPtr {
            pointee: Some(pointee),
            control: other.control,
            alloc: other.alloc.clone(),
        }
    }

    /// Number of live owners; 0 for the empty pointer.
    #[must_use]
    pub fn use_count(&self) -> i64 {
        if self.control.is_null() {
            return 0;
        }
        // SAFETY: a non-null control block is live while self co-owns
        // it.
        unsafe { (*self.control).strong.get() }
    }

    /// Number of live weak observers.
    #[must_use]
    pub fn weak_count(&self) -> i64 {
        if self.control.is_null() {
            return 0;
        }
        // SAFETY: as in `use_count`.
        unsafe { (*self.control).weak.get() }
    }

    /// Returns `true` iff the pointer is empty.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.pointee.is_none()
    }

    /// Borrows the pointee, if any.
    #[must_use]
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: a present pointee is live while self owns a use
        // count.
        self.pointee.map(|pointee| unsafe { pointee.as_ref() })
    }

    /// Releases this owner's reference, leaving the pointer empty.
    pub fn reset(&mut self) {
        self.detach();
        self.pointee = None;
        self.control = ptr::null_mut();
    }

    /// Creates a weak observer of the pointee.
    #[must_use]
    pub fn downgrade(&self) -> WeakPtr<T, A> {
        if !self.control.is_null() {
            // SAFETY: a non-null control block is live while self
            // co-owns it.
            unsafe { bump_weak(self.control) };
        }
        WeakPtr {
            pointee: self.pointee,
            control: self.control,
            alloc: self.alloc.clone(),
        }
    }

    /// Drops one use count, destroying the pointee at zero and the
    /// control block when no observers remain. The control block must
    /// outlive the pointee while weak observers exist.
    fn detach(&mut self) {
        if self.control.is_null() {
            return;
        }
        // SAFETY: a non-null control block is live and this owner
        // holds one use count.
        unsafe {
            let strong = (*self.control).strong.get() - 1;
            (*self.control).strong.set(strong);
            if strong == 0 {
                if let Some(pointee) = self.pointee.take() {
                    release(&mut self.alloc, pointee);
                }
                if (*self.control).weak.get() == 0 {
                    release_control(&mut self.alloc, self.control);
                }
            }
        }
    }
}

impl<T: Any, A: Allocator> SharedPtr<T, A> {
    /// Type-erases the pointee for a later
    /// [`downcast`](SharedPtr::downcast).
    #[must_use]
    pub fn to_any(&self) -> SharedPtr<dyn Any, A> {
        match self.pointee {
            // SAFETY: the unsizing cast of a non-null pointer is
            // non-null.
            Some(pointee) => SharedPtr::alias(self, unsafe {
                NonNull::new_unchecked(pointee.as_ptr() as *mut dyn Any)
            }),
            None => SharedPtr {
                pointee: None,
                control: ptr::null_mut(),
                alloc: self.alloc.clone(),
            },
        }
    }
}

impl<A: Allocator> SharedPtr<dyn Any, A> {
    /// Re-types the erased pointee if it is a `U`, sharing the control
    /// block; `None` otherwise.
    #[must_use]
    pub fn downcast<U: Any>(&self) -> Option<SharedPtr<U, A>> {
        let pointee = self.pointee?;
        // SAFETY: the pointee is live while self owns a use count.
        if unsafe { pointee.as_ref() }.is::<U>() {
            Some(SharedPtr::alias(self, pointee.cast::<U>()))
        } else {
            None
        }
    }
}

impl<T: ?Sized, A: Allocator> Clone for SharedPtr<T, A> {
    fn clone(&self) -> SharedPtr<T, A> {
        if !self.control.is_null() {
            // SAFETY: a non-null control block is live while self
            // co-owns it.
            unsafe { bump_strong(self.control) };
        }
        SharedPtr {
            pointee: self.pointee,
            control: self.control,
            alloc: self.alloc.clone(),
        }
    }
}

impl<T: ?Sized, A: Allocator> Drop for SharedPtr<T, A> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T, A: Allocator> Default for SharedPtr<T, A> {
    fn default() -> SharedPtr<T, A> {
        SharedPtr::null()
    }
}

impl<T, A: Allocator> From<UniquePtr<T, A>> for SharedPtr<T, A> {
    /// Consumes the unique owner, allocating a fresh control block.
    ///
    /// # Panics
    ///
    /// Panics if the control block cannot be allocated; the pointee is
    /// destroyed cleanly first.
    fn from(mut unique: UniquePtr<T, A>) -> SharedPtr<T, A> {
        let pointee = unique.release();
        let alloc = mem::take(&mut unique.alloc);
        // SAFETY: `pointee` came out of a UniquePtr over `alloc`.
        match unsafe { SharedPtr::from_raw_in(pointee, alloc) } {
            Ok(shared) => shared,
            Err(err) => {
                // SAFETY: ownership of `pointee` is still ours; hand
                // it back so the value is destroyed, then fail fast.
                unsafe { unique.reset_raw(pointee) };
                drop(unique);
                panic!("control block allocation failed: {err}");
            }
        }
    }
}

impl<T: ?Sized, A: Allocator> Deref for SharedPtr<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        self.as_ref().expect("deref of empty SharedPtr")
    }
}

impl<T: ?Sized, A: Allocator> PartialEq for SharedPtr<T, A> {
    fn eq(&self, other: &SharedPtr<T, A>) -> bool {
        self.addr_key() == other.addr_key()
    }
}

impl<T: ?Sized, A: Allocator> Eq for SharedPtr<T, A> {}

impl<T: ?Sized, A: Allocator> PartialOrd for SharedPtr<T, A> {
    fn partial_cmp(&self, other: &SharedPtr<T, A>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized, A: Allocator> Ord for SharedPtr<T, A> {
    /// Orders by pointee address.
    fn cmp(&self, other: &SharedPtr<T, A>) -> Ordering {
        self.addr_key().cmp(&other.addr_key())
    }
}

impl<T: ?Sized, A: Allocator> SharedPtr<T, A> {
    fn addr_key(&self) -> Option<NonNull<u8>> {
        self.pointee.map(NonNull::cast)
    }
}

impl<T: ?Sized, A: Allocator> fmt::Debug for SharedPtr<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPtr")
            .field("pointee", &self.get_debug_addr())
            .field("use_count", &self.use_count())
            .field("weak_count", &self.weak_count())
            .finish()
    }
}

impl<T: ?Sized, A: Allocator> SharedPtr<T, A> {
    fn get_debug_addr(&self) -> *mut u8 {
        self.addr_key().map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}

/// Non-owning observer of a [`SharedPtr`] pointee.
///
/// Keeps the control block alive, not the pointee. Obtained with
/// [`SharedPtr::downgrade`]; upgraded back with
/// [`lock`](WeakPtr::lock).
pub struct WeakPtr<T: ?Sized, A: Allocator> {
    pointee: Option<NonNull<T>>,
    control: *mut ControlBlock,
    alloc: A,
}

impl<T, A: Allocator> WeakPtr<T, A> {
    /// An observer of nothing.
    #[must_use]
    pub fn null() -> WeakPtr<T, A> {
        WeakPtr {
            pointee: None,
            control: ptr::null_mut(),
            alloc: A::default(),
        }
    }
}

impl<T: ?Sized, A: Allocator> WeakPtr<T, A> {
    /// Number of live owners of the observed pointee.
    #[must_use]
    pub fn use_count(&self) -> i64 {
        if self.control.is_null() {
            return 0;
        }
        // SAFETY: a non-null control block is live while self holds a
        // weak count.
        unsafe { (*self.control).strong.get() }
    }

    /// Returns `true` iff the observed pointee no longer exists.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Attempts to upgrade to an owner.
    ///
    /// Returns the empty [`SharedPtr`] if the pointee has expired;
    /// otherwise bumps the use count and aliases the pointee.
    #[must_use]
    pub fn lock(&self) -> SharedPtr<T, A> {
        if self.control.is_null() || self.expired() {
            return SharedPtr {
                pointee: None,
                control: ptr::null_mut(),
                alloc: self.alloc.clone(),
            };
        }
        // SAFETY: a non-null control block is live while self holds a
        // weak count.
        unsafe { bump_strong(self.control) };
        SharedPtr {
            pointee: self.pointee,
            control: self.control,
            alloc: self.alloc.clone(),
        }
    }

    /// Stops observing, leaving the observer empty.
    pub fn reset(&mut self) {
        self.detach();
        self.pointee = None;
        self.control = ptr::null_mut();
    }

    fn detach(&mut self) {
        if self.control.is_null() {
            return;
        }
        // SAFETY: a non-null control block is live and this observer
        // holds one weak count.
        unsafe {
            let weak = (*self.control).weak.get() - 1;
            (*self.control).weak.set(weak);
            if weak == 0 && (*self.control).strong.get() == 0 {
                release_control(&mut self.alloc, self.control);
            }
        }
    }
}

impl<T: ?Sized, A: Allocator> Clone for WeakPtr<T, A> {
    fn clone(&self) -> WeakPtr<T, A> {
        if !self.control.is_null() {
            // SAFETY: a non-null control block is live while self
            // holds a weak count.
            unsafe { bump_weak(self.control) };
        }
        WeakPtr {
            pointee: self.pointee,
            control: self.control,
            alloc: self.alloc.clone(),
        }
    }
}

impl<T: ?Sized, A: Allocator> Drop for WeakPtr<T, A> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T, A: Allocator> Default for WeakPtr<T, A> {
    fn default() -> WeakPtr<T, A> {
        WeakPtr::null()
    }
}

impl<T: ?Sized, A: Allocator> fmt::Debug for WeakPtr<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPtr")
            .field("use_count", &self.use_count())
            .finish()
    }
}
