//! Bump allocation over fixed-capacity regions.
//!
//! A bump allocator serves requests by advancing an offset through a
//! region of fixed capacity. Allocation and deallocation are O(1), but
//! only the most recent allocation can actually be reclaimed: frees
//! arriving out of LIFO order are accepted and ignored. The region is
//! obtained from the global heap at construction so that the allocator
//! value can move freely without invalidating outstanding blocks.

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

use crate::{safe_size, AllocError, Allocator, RawBlock, Size};

/// LIFO bump allocator over a region of `CAP` bytes.
///
/// `CAP` must be even and greater than one. Request sizes round up to
/// a multiple of `ALIGN` (a power of two), which is also the alignment
/// of every block the allocator returns; the returned block still
/// reports the exact requested size, with the rounding slack implicit.
///
/// Deallocation retreats the bump offset only when the freed block is
/// the most recent allocation. The comparison uses the rounded size,
/// so odd-sized blocks free correctly.
pub struct Stack<const CAP: usize, const ALIGN: usize = 8> {
    base: NonNull<u8>,
    top: usize,
}

impl<const CAP: usize, const ALIGN: usize> Stack<CAP, ALIGN> {
    /// Constructs a `Stack` with an empty region.
    ///
    /// # Panics
    ///
    /// Panics if `CAP` or `ALIGN` is invalid, or if the region cannot
    /// be obtained from the global heap.
    #[must_use]
    pub fn new() -> Stack<CAP, ALIGN> {
        match Stack::try_new() {
            Ok(stack) => stack,
            Err(err) => panic!("stack region allocation failed: {err}"),
        }
    }

    /// Attempts to construct a `Stack`, reporting region exhaustion as
    /// an error.
    ///
    /// # Panics
    ///
    /// Panics if `CAP` is odd or not greater than one, or if `ALIGN`
    /// is not a power of two.
    pub fn try_new() -> Result<Stack<CAP, ALIGN>, AllocError> {
        assert!(
            CAP > 1 && CAP % 2 == 0,
            "stack capacity must be even and greater than one"
        );
        assert!(
            ALIGN.is_power_of_two(),
            "stack alignment must be a power of two"
        );

        // SAFETY: the layout has a non-zero size.
        let region = unsafe { alloc::alloc::alloc(Self::region_layout()) };
        let base = NonNull::new(region).ok_or(AllocError::Unknown)?;

        Ok(Stack { base, top: 0 })
    }

    /// Bytes still available for allocation.
    #[must_use]
    pub fn remaining(&self) -> Size {
        safe_size(CAP - self.top)
    }

    fn region_layout() -> Layout {
        Layout::from_size_align(CAP, ALIGN).expect("stack region layout is valid")
    }

    fn aligned(size: usize) -> usize {
        (size + (ALIGN - 1)) & !(ALIGN - 1)
    }
}

impl<const CAP: usize, const ALIGN: usize> Allocator for Stack<CAP, ALIGN> {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        if size < 0 {
            return Err(AllocError::InvalidSize);
        }
        if size == 0 {
            return Ok(RawBlock::empty());
        }

        let size = size as usize;
        if size > CAP {
            return Err(AllocError::OutOfMemory);
        }
        let aligned = Self::aligned(size);
        if aligned > CAP - self.top {
            return Err(AllocError::OutOfMemory);
        }

        // SAFETY: top + aligned <= CAP keeps the block in the region.
        let data = unsafe { self.base.as_ptr().add(self.top) };
        self.top += aligned;

        Ok(RawBlock::new(safe_size(size), data.cast()))
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        if block.is_empty() {
            return;
        }

        let size = block.size() as usize;
        if size <= CAP {
            let aligned = Self::aligned(size);
            let addr = block.data().cast::<u8>().addr();
            if aligned <= self.top && addr == self.base.as_ptr().addr() + self.top - aligned {
                self.top -= aligned;
            }
        }
        block.clear();
    }

    fn owns(&self, block: &RawBlock) -> bool {
        if block.data().is_null() {
            return false;
        }
        let addr = block.data().cast::<u8>().addr();
        let base = self.base.as_ptr().addr();
        addr >= base && addr < base + CAP
    }
}

impl<const CAP: usize, const ALIGN: usize> Default for Stack<CAP, ALIGN> {
    fn default() -> Stack<CAP, ALIGN> {
        Stack::new()
    }
}

impl<const CAP: usize, const ALIGN: usize> Clone for Stack<CAP, ALIGN> {
    /// Clones to a fresh, empty region.
    ///
    /// Outstanding blocks stay owned by the original instance.
    fn clone(&self) -> Stack<CAP, ALIGN> {
        Stack::new()
    }
}

impl<const CAP: usize, const ALIGN: usize> Drop for Stack<CAP, ALIGN> {
    fn drop(&mut self) {
        // SAFETY: the region was allocated with this layout in
        // `try_new` and is released exactly once.
        unsafe { alloc::alloc::dealloc(self.base.as_ptr(), Self::region_layout()) };
    }
}

impl<const CAP: usize, const ALIGN: usize> fmt::Debug for Stack<CAP, ALIGN> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("capacity", &CAP)
            .field("align", &ALIGN)
            .field("in_use", &self.top)
            .finish()
    }
}

/// First-fit collection of `K` independent bump regions of `CAP` bytes
/// each.
///
/// Allocation is served by the first region with room; deallocation is
/// LIFO per region. `CAP` must additionally be a multiple of `ALIGN`
/// so every region base is aligned. State is instance-local; a
/// process-wide variant composes as
/// [`Shared<MultiStack<...>, ID>`](crate::Shared).
pub struct MultiStack<const K: usize, const CAP: usize, const ALIGN: usize = 8> {
    base: NonNull<u8>,
    tops: [usize; K],
}

impl<const K: usize, const CAP: usize, const ALIGN: usize> MultiStack<K, CAP, ALIGN> {
    /// Constructs a `MultiStack` with `K` empty regions.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid or the backing region
    /// cannot be obtained from the global heap.
    #[must_use]
    pub fn new() -> MultiStack<K, CAP, ALIGN> {
        match MultiStack::try_new() {
            Ok(stacks) => stacks,
            Err(err) => panic!("multi-stack region allocation failed: {err}"),
        }
    }

    /// Attempts to construct a `MultiStack`, reporting region
    /// exhaustion as an error.
    ///
    /// # Panics
    ///
    /// Panics if `K` is zero, `CAP` is odd, not greater than one, or
    /// not a multiple of `ALIGN`, or if `ALIGN` is not a power of two.
    pub fn try_new() -> Result<MultiStack<K, CAP, ALIGN>, AllocError> {
        assert!(K > 0, "stack count must be positive");
        assert!(
            CAP > 1 && CAP % 2 == 0,
            "per-stack capacity must be even and greater than one"
        );
        assert!(
            ALIGN.is_power_of_two(),
            "stack alignment must be a power of two"
        );
        assert!(
            CAP % ALIGN == 0,
            "per-stack capacity must be a multiple of the alignment"
        );

        // SAFETY: the layout has a non-zero size.
        let region = unsafe { alloc::alloc::alloc(Self::region_layout()) };
        let base = NonNull::new(region).ok_or(AllocError::Unknown)?;

        Ok(MultiStack {
            base,
            tops: [0; K],
        })
    }

    fn region_layout() -> Layout {
        Layout::from_size_align(K * CAP, ALIGN).expect("multi-stack region layout is valid")
    }

    fn aligned(size: usize) -> usize {
        (size + (ALIGN - 1)) & !(ALIGN - 1)
    }

    fn region_base(&self, index: usize) -> usize {
        self.base.as_ptr().addr() + index * CAP
    }
}

impl<const K: usize, const CAP: usize, const ALIGN: usize> Allocator for MultiStack<K, CAP, ALIGN> {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        if size < 0 {
            return Err(AllocError::InvalidSize);
        }
        if size == 0 {
            return Ok(RawBlock::empty());
        }

        let size = size as usize;
        if size > CAP {
            return Err(AllocError::OutOfMemory);
        }
        let aligned = Self::aligned(size);

        for (index, top) in self.tops.iter_mut().enumerate() {
            if aligned <= CAP - *top {
                // SAFETY: index * CAP + top + aligned <= K * CAP keeps
                // the block in the backing region.
                let data = unsafe { self.base.as_ptr().add(index * CAP + *top) };
                *top += aligned;
                return Ok(RawBlock::new(safe_size(size), data.cast()));
            }
        }

        Err(AllocError::OutOfMemory)
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        if block.is_empty() {
            return;
        }

        let size = block.size() as usize;
        if size <= CAP {
            let aligned = Self::aligned(size);
            let addr = block.data().cast::<u8>().addr();
            for index in 0..K {
                let top = self.tops[index];
                if aligned <= top && addr == self.region_base(index) + top - aligned {
                    self.tops[index] -= aligned;
                    break;
                }
            }
        }
        block.clear();
    }

    fn owns(&self, block: &RawBlock) -> bool {
        if block.data().is_null() {
            return false;
        }
        let addr = block.data().cast::<u8>().addr();
        let base = self.base.as_ptr().addr();
        addr >= base && addr < base + K * CAP
    }
}

impl<const K: usize, const CAP: usize, const ALIGN: usize> Default for MultiStack<K, CAP, ALIGN> {
    fn default() -> MultiStack<K, CAP, ALIGN> {
        MultiStack::new()
    }
}

impl<const K: usize, const CAP: usize, const ALIGN: usize> Clone for MultiStack<K, CAP, ALIGN> {
    /// Clones to fresh, empty regions.
    fn clone(&self) -> MultiStack<K, CAP, ALIGN> {
        MultiStack::new()
    }
}

impl<const K: usize, const CAP: usize, const ALIGN: usize> Drop for MultiStack<K, CAP, ALIGN> {
    fn drop(&mut self) {
        // SAFETY: the region was allocated with this layout in
        // `try_new` and is released exactly once.
        unsafe { alloc::alloc::dealloc(self.base.as_ptr(), Self::region_layout()) };
    }
}

impl<const K: usize, const CAP: usize, const ALIGN: usize> fmt::Debug for MultiStack<K, CAP, ALIGN> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiStack")
            .field("stacks", &K)
            .field("capacity", &CAP)
            .field("align", &ALIGN)
            .field("tops", &self.tops)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_free_reuses_memory() {
        let mut stack = Stack::<16, 2>::new();

        let b1 = stack.allocate(8).unwrap();
        let mut b1_copy = b1;
        unsafe { stack.deallocate(&mut b1_copy) };
        assert!(b1_copy.is_empty());

        let b2 = stack.allocate(8).unwrap();
        assert_eq!(b1.data(), b2.data());
        assert_eq!(8, b2.size());
    }

    #[test]
    fn odd_sizes_free_at_their_rounded_footprint() {
        let mut stack = Stack::<16, 2>::new();

        let b1 = stack.allocate(3).unwrap();
        let mut freed = b1;
        unsafe { stack.deallocate(&mut freed) };

        let b2 = stack.allocate(3).unwrap();
        assert_eq!(b1.data(), b2.data());
    }

    #[test]
    fn out_of_order_free_is_a_no_op() {
        let mut stack = Stack::<16, 2>::new();

        let mut first = stack.allocate(4).unwrap();
        let _second = stack.allocate(4).unwrap();

        let first_data = first.data();
        unsafe { stack.deallocate(&mut first) };
        assert!(first.is_empty());

        // The offset did not retreat, so the next allocation comes
        // from untouched space.
        let third = stack.allocate(4).unwrap();
        assert_ne!(first_data, third.data());
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let mut stack = Stack::<16, 2>::new();
        assert_eq!(Err(AllocError::OutOfMemory), stack.allocate(17));

        let _b = stack.allocate(16).unwrap();
        assert_eq!(Err(AllocError::OutOfMemory), stack.allocate(1));
    }

    #[test]
    fn clones_do_not_share_regions() {
        let mut stack = Stack::<16, 2>::new();
        let mut copy = stack.clone();

        let b1 = stack.allocate(8).unwrap();
        let b2 = copy.allocate(8).unwrap();
        assert_ne!(b1.data(), b2.data());
        assert!(!stack.owns(&b2));
        assert!(!copy.owns(&b1));
    }

    #[test]
    fn multi_stack_spills_into_later_regions() {
        let mut stacks = MultiStack::<2, 16, 8>::new();

        let b1 = stacks.allocate(16).unwrap();
        let b2 = stacks.allocate(16).unwrap();
        assert_ne!(b1.data(), b2.data());
        assert!(stacks.owns(&b1));
        assert!(stacks.owns(&b2));

        assert_eq!(Err(AllocError::OutOfMemory), stacks.allocate(8));

        let mut freed = b2;
        unsafe { stacks.deallocate(&mut freed) };
        let b3 = stacks.allocate(16).unwrap();
        assert_eq!(b2.data(), b3.data());
    }

    #[test]
    #[should_panic]
    fn odd_capacity_panics() {
        let _ = Stack::<15, 2>::new();
    }

    #[test]
    #[should_panic]
    fn non_power_of_two_alignment_panics() {
        let _ = Stack::<16, 6>::new();
    }

    #[test]
    #[should_panic]
    fn zero_stacks_panics() {
        let _ = MultiStack::<0, 16, 8>::new();
    }
}
