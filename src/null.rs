//! The failing terminator allocator.

use crate::{AllocError, Allocator, RawBlock, Size};

/// Allocator that fails every non-trivial request and owns nothing.
///
/// Useful as the last layer of a [`Fallback`](crate::Fallback) chain
/// when exhaustion should surface as an error to the caller instead of
/// reaching a real memory source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Null;

impl Allocator for Null {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        if size < 0 {
            Err(AllocError::InvalidSize)
        } else if size == 0 {
            Ok(RawBlock::empty())
        } else {
            Err(AllocError::OutOfMemory)
        }
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        // Only empty blocks can legally arrive here.
        block.clear();
    }

    fn owns(&self, _block: &RawBlock) -> bool {
        false
    }
}
