//! Bridge into the standard allocator protocol.

use core::alloc::Layout;
use core::cell::RefCell;
use core::fmt;
use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError as HostAllocError, Allocator as HostAllocator};

use crate::{safe_size, Allocator, RawBlock};

/// Presents any allocator in this crate through
/// [`allocator_api2::alloc::Allocator`], for use with standard
/// container types.
///
/// The adapter carries no state beyond the wrapped allocator; the host
/// protocol's `&self` calls are bridged through a `RefCell`, which
/// keeps the adapter single-threaded like everything else here.
///
/// Two caveats carry over from the wrapped contract:
/// - the wrapped allocator must satisfy every requested layout's
///   alignment (the adapter does not check), and
/// - blocks reconstructed on `deallocate` carry no provenance hint, so
///   allocators that route frees by hint should not sit behind an
///   ownership-routing composite when driven through the adapter.
#[derive(Default)]
pub struct Adapter<A: Allocator> {
    inner: RefCell<A>,
}

impl<A: Allocator> Adapter<A> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: A) -> Adapter<A> {
        Adapter {
            inner: RefCell::new(inner),
        }
    }

    /// Unwraps the adapter.
    #[must_use]
    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }
}

unsafe impl<A: Allocator> HostAllocator for Adapter<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, HostAllocError> {
        if layout.size() == 0 {
            // A dangling, well-aligned pointer stands in for zero-size
            // requests, which the wrapped contract answers with the
            // empty block.
            let dangling = sptr::invalid_mut::<u8>(layout.align());
            // SAFETY: alignments are non-zero.
            let data = unsafe { NonNull::new_unchecked(dangling) };
            return Ok(NonNull::slice_from_raw_parts(data, 0));
        }

        let block = self
            .inner
            .borrow_mut()
            .allocate(safe_size(layout.size()))
            .map_err(|_| HostAllocError)?;
        let data = NonNull::new(block.data().cast::<u8>()).ok_or(HostAllocError)?;
        Ok(NonNull::slice_from_raw_parts(data, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        let mut block = RawBlock::new(safe_size(layout.size()), ptr.as_ptr().cast());
        // SAFETY: the caller guarantees `ptr` denotes a block this
        // adapter allocated with `layout`.
        unsafe { self.inner.borrow_mut().deallocate(&mut block) };
    }
}

impl<A: Allocator> Clone for Adapter<A> {
    fn clone(&self) -> Adapter<A> {
        Adapter::new(self.inner.borrow().clone())
    }
}

impl<A: Allocator> fmt::Debug for Adapter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter").finish_non_exhaustive()
    }
}
