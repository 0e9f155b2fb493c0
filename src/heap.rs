//! The global-heap leaf allocator.

use core::alloc::Layout;

use crate::{provenance_tag, AllocError, Allocator, RawBlock, Size};

/// Allocator over the global heap.
///
/// Every non-empty block is tagged with this allocator's provenance
/// hint, so [`owns`](Allocator::owns) can tell heap blocks apart from
/// foreign ones without tracking any state. All heap instances are
/// interchangeable: a block allocated by one `Heap` value may be
/// returned through any other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heap;

impl Heap {
    /// Alignment of every non-empty block returned by [`Heap`].
    pub const ALIGN: usize = 16;

    const TAG: i64 = provenance_tag(b"6f0a9be2-55df-4e33-9c3f-1b2a7c4d8e90");
}

impl Allocator for Heap {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        if size < 0 {
            return Err(AllocError::InvalidSize);
        }
        if size == 0 {
            return Ok(RawBlock::empty());
        }

        let layout = Layout::from_size_align(size as usize, Heap::ALIGN)
            .map_err(|_| AllocError::Unknown)?;

        // SAFETY: the layout has a non-zero size.
        let region = unsafe { alloc::alloc::alloc(layout) };
        if region.is_null() {
            return Err(AllocError::Unknown);
        }

        Ok(RawBlock::with_hint(size, region.cast(), Heap::TAG))
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        if block.is_empty() {
            return;
        }

        let layout = Layout::from_size_align(block.size() as usize, Heap::ALIGN)
            .expect("block size was validated on allocation");

        // SAFETY: per the contract, a non-empty block was produced by
        // `allocate` with this size, so the layout matches.
        unsafe { alloc::alloc::dealloc(block.data().cast(), layout) };
        block.clear();
    }

    fn owns(&self, block: &RawBlock) -> bool {
        !block.data().is_null() && block.hint() == Heap::TAG
    }
}
