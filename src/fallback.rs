//! Primary/secondary allocator composition.

use core::fmt;

use crate::{AllocError, Allocator, RawBlock, Size};

/// Composes two allocators, retrying the secondary when the primary
/// fails.
///
/// Deallocation is routed by ownership: the primary is asked first,
/// then the secondary. A block owned by neither is a caller error and
/// is dropped silently, though it is still reset to empty so that the
/// free-resets guarantee holds everywhere.
///
/// `owns` is the disjunction of the layers.
#[derive(Clone, Default)]
pub struct Fallback<P: Allocator, S: Allocator> {
    primary: P,
    secondary: S,
}

impl<P: Allocator, S: Allocator> Fallback<P, S> {
    /// Composes `primary` and `secondary`.
    #[must_use]
    pub fn new(primary: P, secondary: S) -> Fallback<P, S> {
        Fallback { primary, secondary }
    }

    /// The layer tried first.
    #[must_use]
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// The layer tried when the primary fails.
    #[must_use]
    pub fn secondary(&self) -> &S {
        &self.secondary
    }
}

impl<P: Allocator, S: Allocator> Allocator for Fallback<P, S> {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        match self.primary.allocate(size) {
            Ok(block) => Ok(block),
            Err(_) => self.secondary.allocate(size),
        }
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        if block.is_empty() {
            return;
        }
        if self.primary.owns(block) {
            // SAFETY: ownership was just established.
            unsafe { self.primary.deallocate(block) };
        } else if self.secondary.owns(block) {
            // SAFETY: ownership was just established.
            unsafe { self.secondary.deallocate(block) };
        } else {
            block.clear();
        }
    }

    fn owns(&self, block: &RawBlock) -> bool {
        self.primary.owns(block) || self.secondary.owns(block)
    }
}

impl<P: Allocator, S: Allocator> fmt::Debug for Fallback<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").finish_non_exhaustive()
    }
}
