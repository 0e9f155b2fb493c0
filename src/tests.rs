extern crate std;

use core::cell::Cell;
use core::ptr::NonNull;
use core::slice;
use std::prelude::rust_2021::*;
use std::rc::Rc;

use quickcheck::{Arbitrary, Gen, QuickCheck};

use crate::buffer::Buffer;
use crate::fallback::Fallback;
use crate::free_list::FreeList;
use crate::heap::Heap;
use crate::null::Null;
use crate::ptr::{SharedPtr, UniquePtr};
#[cfg(feature = "alloc")]
use crate::shared::Shared;
use crate::stack::{MultiStack, Stack};
use crate::stats::Stats;
use crate::{AllocError, Allocator, RawBlock, Size};

/// Heap wrapper counting live blocks, for leak assertions. Clones
/// share the counter, so pointers and composites that clone their
/// allocator still aggregate into one tally.
#[derive(Clone, Debug)]
struct Counting {
    inner: Heap,
    live: Rc<Cell<i64>>,
}

impl Default for Counting {
    fn default() -> Counting {
        Counting {
            inner: Heap,
            live: Rc::new(Cell::new(0)),
        }
    }
}

impl Allocator for Counting {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        let block = self.inner.allocate(size)?;
        if !block.is_empty() {
            self.live.set(self.live.get() + 1);
        }
        Ok(block)
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        if !block.is_empty() {
            self.live.set(self.live.get() - 1);
        }
        unsafe { self.inner.deallocate(block) };
    }

    fn owns(&self, block: &RawBlock) -> bool {
        self.inner.owns(block)
    }
}

/// Bumps its counter once per drop.
#[derive(Clone)]
struct DropTally(Rc<Cell<i64>>);

impl Drop for DropTally {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

/// Checks the universal allocator properties for one allocator.
fn check_contract<A: Allocator>(mut alloc: A, request: Size) {
    // Zero-size round trip, idempotent empty deallocation.
    let mut empty = alloc.allocate(0).unwrap();
    assert!(empty.is_empty());
    unsafe { alloc.deallocate(&mut empty) };
    assert!(empty.is_empty());
    unsafe { alloc.deallocate(&mut empty) };

    // Negative sizes are errors.
    assert!(alloc.allocate(-1).is_err());
    assert!(!alloc.owns(&RawBlock::empty()));

    // Successful allocations have the requested shape and are owned.
    let mut block = alloc.allocate(request).unwrap();
    assert_eq!(request, block.size());
    assert!(!block.data().is_null());
    assert!(alloc.owns(&block));

    // Deallocation resets the block.
    unsafe { alloc.deallocate(&mut block) };
    assert!(block.is_empty());
}

#[test]
fn every_allocator_satisfies_the_contract() {
    check_contract(Heap, 8);
    check_contract(Stack::<64>::new(), 8);
    check_contract(MultiStack::<2, 64>::new(), 8);
    check_contract(Fallback::<Stack<16>, Heap>::default(), 24);
    check_contract(FreeList::<Heap, 16, 32, 2>::new(), 24);
    check_contract(FreeList::<Heap, 16, 32, 2>::new(), 40);
    check_contract(Stats::<Heap, 4>::new(), 8);
    #[cfg(feature = "alloc")]
    check_contract(Shared::<Heap, 900>::new(), 8);
}

#[test]
fn leaf_allocators_report_invalid_size() {
    assert_eq!(Err(AllocError::InvalidSize), Heap.allocate(-1));
    assert_eq!(Err(AllocError::InvalidSize), Stack::<16>::new().allocate(-1));
    assert_eq!(Err(AllocError::InvalidSize), Null.allocate(-1));
}

#[test]
fn null_fails_gracefully() {
    let mut null = Null;
    assert!(null.allocate(0).unwrap().is_empty());
    assert_eq!(Err(AllocError::OutOfMemory), null.allocate(1));
    assert!(!null.owns(&RawBlock::empty()));

    // As a fallback terminator, exhaustion surfaces to the caller
    // instead of reaching a real memory source.
    let mut chain = Fallback::<Stack<16>, Null>::default();
    assert_eq!(Err(AllocError::OutOfMemory), chain.allocate(17));
}

#[test]
fn fallback_falls_through_on_primary_exhaustion() {
    let mut alloc = Fallback::<Stack<16>, Heap>::default();

    let mut block = alloc.allocate(17).unwrap();
    assert_eq!(17, block.size());
    assert!(!alloc.primary().owns(&block));
    assert!(alloc.secondary().owns(&block));
    assert!(alloc.owns(&block));

    unsafe { alloc.deallocate(&mut block) };
    assert!(block.is_empty());
}

#[test]
fn fallback_prefers_the_primary() {
    let mut alloc = Fallback::<Stack<64>, Heap>::default();

    let mut block = alloc.allocate(16).unwrap();
    assert!(alloc.primary().owns(&block));
    assert!(!alloc.secondary().owns(&block));

    unsafe { alloc.deallocate(&mut block) };
}

#[test]
fn fallback_drops_unowned_blocks_silently() {
    let mut foreign = Stack::<16>::new();
    let mut block = foreign.allocate(8).unwrap();

    let mut alloc = Fallback::<Stack<16>, Stack<16>>::default();
    assert!(!alloc.owns(&block));

    unsafe { alloc.deallocate(&mut block) };
    assert!(block.is_empty());
}

#[test]
fn free_list_returns_cached_blocks_to_the_inner_allocator_on_drop() {
    let counter = Counting::default();
    {
        let mut cache = FreeList::<Counting, 16, 32, 4>::with_inner(counter.clone());
        let mut blocks = [
            cache.allocate(16).unwrap(),
            cache.allocate(24).unwrap(),
            cache.allocate(32).unwrap(),
        ];
        for block in &mut blocks {
            unsafe { cache.deallocate(block) };
        }
        assert_eq!(3, cache.cached());
        assert_eq!(3, counter.live.get());
    }
    assert_eq!(0, counter.live.get());
}

#[cfg(feature = "alloc")]
#[test]
fn shared_allocators_with_equal_ids_share_one_backing() {
    let mut first = Shared::<Stack<64>, 901>::new();
    let mut second = Shared::<Stack<64>, 901>::new();

    let mut b1 = first.allocate(8).unwrap();
    let mut b2 = second.allocate(8).unwrap();

    // Consecutive bumps out of the same region.
    assert_eq!(b1.data() as usize + 8, b2.data() as usize);
    assert!(first.owns(&b2));
    assert!(second.owns(&b1));

    unsafe {
        second.deallocate(&mut b2);
        first.deallocate(&mut b1);
    }
}

#[cfg(feature = "alloc")]
#[test]
fn shared_allocators_with_distinct_ids_do_not() {
    let mut first = Shared::<Stack<64>, 902>::new();
    let mut other = Shared::<Stack<64>, 903>::new();

    let mut b1 = first.allocate(8).unwrap();
    let mut b2 = other.allocate(8).unwrap();

    assert!(!first.owns(&b2));
    assert!(!other.owns(&b1));

    unsafe {
        first.deallocate(&mut b1);
        other.deallocate(&mut b2);
    }
}

#[test]
fn unique_pointer_owns_and_destroys_exactly_once() {
    let tally = Rc::new(Cell::new(0));

    let mut owner = UniquePtr::<DropTally, Heap>::new(DropTally(tally.clone()));
    assert!(!owner.is_null());

    owner.reset();
    assert_eq!(1, tally.get());
    assert!(owner.is_null());

    owner.reset();
    assert_eq!(1, tally.get());
}

#[test]
fn unique_pointer_releases_without_destroying() {
    let tally = Rc::new(Cell::new(0));
    let counter = Counting::default();

    let mut owner = UniquePtr::new_in(DropTally(tally.clone()), counter.clone());
    let raw = owner.release();
    assert!(owner.is_null());
    drop(owner);
    assert_eq!(0, tally.get());
    assert_eq!(1, counter.live.get());

    // Re-adopt and let the destructor run.
    let adopted = unsafe { UniquePtr::from_raw_in(raw, counter.clone()) };
    drop(adopted);
    assert_eq!(1, tally.get());
    assert_eq!(0, counter.live.get());
}

#[test]
fn unique_pointer_dereferences_and_compares_by_identity() {
    let one = UniquePtr::<i32, Heap>::new(1);
    let two = UniquePtr::<i32, Heap>::new(2);

    assert_eq!(1, *one);
    assert_ne!(one, two);
    assert_eq!(one, one);

    let null = UniquePtr::<i32, Heap>::null();
    assert!(null.as_ref().is_none());
}

#[test]
fn shared_pointee_lives_until_the_last_owner() {
    let counter = Counting::default();
    let tally = Rc::new(Cell::new(0));
    {
        let sp1 = SharedPtr::new_in(DropTally(tally.clone()), counter.clone());
        let mut sp2 = sp1.clone();
        let sp3 = sp2.clone();
        assert_eq!(3, sp1.use_count());

        sp2.reset();
        assert_eq!(2, sp1.use_count());
        assert_eq!(2, sp3.use_count());
        assert_eq!(0, tally.get());
    }
    assert_eq!(1, tally.get());
    assert_eq!(0, counter.live.get());
}

#[test]
fn weak_observers_do_not_keep_the_pointee_alive() {
    let counter = Counting::default();
    {
        let shared = SharedPtr::new_in(41i32, counter.clone());
        let weak = shared.downgrade();
        assert_eq!(1, shared.weak_count());
        assert!(!weak.expired());

        {
            let locked = weak.lock();
            assert_eq!(2, locked.use_count());
            assert_eq!(41, *locked);
        }
        assert_eq!(1, shared.use_count());

        drop(shared);
        // The pointee is gone, the control block is not.
        assert!(weak.expired());
        assert!(weak.lock().is_null());
        assert_eq!(1, counter.live.get());
    }
    assert_eq!(0, counter.live.get());
}

#[test]
fn aliasing_shares_the_control_block() {
    let shared = SharedPtr::<u32, Heap>::new(77);
    let raw = NonNull::new(shared.get()).unwrap();

    let aliased: SharedPtr<u32, Heap> = SharedPtr::alias(&shared, raw);
    assert_eq!(2, shared.use_count());
    assert_eq!(shared.get(), aliased.get());
    assert_eq!(shared, aliased);
}

#[test]
fn casts_retype_without_forging_control_blocks() {
    let shared = SharedPtr::<u32, Heap>::new(9);

    let as_i32 = shared.cast::<i32>();
    assert_eq!(2, shared.use_count());
    assert_eq!(9, *as_i32);

    let any = shared.to_any();
    assert_eq!(3, shared.use_count());
    assert!(any.downcast::<i64>().is_none());

    let back = any.downcast::<u32>().unwrap();
    assert_eq!(4, shared.use_count());
    assert_eq!(9, *back);
}

#[test]
fn unique_converts_into_shared() {
    let counter = Counting::default();
    let unique = UniquePtr::new_in(13i32, counter.clone());

    let shared: SharedPtr<i32, Counting> = unique.into();
    assert_eq!(1, shared.use_count());
    assert_eq!(13, *shared);

    drop(shared);
    assert_eq!(0, counter.live.get());
}

#[test]
fn buffer_runs_element_destructors_exactly_once() {
    let tally = Rc::new(Cell::new(0));
    let counter = Counting::default();

    let src = [DropTally(tally.clone()), DropTally(tally.clone())];
    let baseline = {
        let buffer = Buffer::<DropTally, Counting>::from_slice_in(&src, counter.clone());
        assert_eq!(2, buffer.len());
        tally.get()
    };
    // The two buffer slots dropped; the source array has not yet.
    assert_eq!(baseline + 2, tally.get());
    assert_eq!(0, counter.live.get());
}

#[test]
fn buffer_in_place_storage_never_touches_the_allocator() {
    let counter = Counting::default();

    let inline = Buffer::<u8, Counting, 8>::from_slice_in(&[1, 2, 3], counter.clone());
    assert!(inline.is_inline());
    assert_eq!(0, counter.live.get());

    let spilled = Buffer::<u8, Counting, 8>::from_slice_in(&[0; 16], counter.clone());
    assert!(!spilled.is_inline());
    assert_eq!(1, counter.live.get());

    drop(spilled);
    drop(inline);
    assert_eq!(0, counter.live.get());
}

enum AllocatorOpTag {
    Allocate,
    Free,
}

#[derive(Clone, Debug)]
enum AllocatorOp {
    /// Allocate a block of arbitrary length (modulo the per-test cap).
    Allocate { len: usize },
    /// Free an existing allocation.
    ///
    /// Given `n` outstanding allocations, the allocation to free is at
    /// index `index % n`.
    Free { index: usize },
}

impl Arbitrary for AllocatorOp {
    fn arbitrary(g: &mut Gen) -> Self {
        match g
            .choose(&[AllocatorOpTag::Allocate, AllocatorOpTag::Free])
            .unwrap()
        {
            AllocatorOpTag::Allocate => AllocatorOp::Allocate {
                len: usize::arbitrary(g),
            },
            AllocatorOpTag::Free => AllocatorOp::Free {
                index: usize::arbitrary(g),
            },
        }
    }
}

/// Runs an op sequence, filling each allocation with a marker byte and
/// verifying the marker survives until the block is freed.
fn blocks_stay_mutually_exclusive<A: Allocator>(
    mut alloc: A,
    ops: Vec<AllocatorOp>,
    max_len: usize,
) -> bool {
    let mut live: Vec<(u8, RawBlock)> = Vec::with_capacity(ops.len());

    for (id, op) in ops.into_iter().enumerate() {
        let marker = (id % 251) as u8;
        match op {
            AllocatorOp::Allocate { len } => {
                let len = (len % max_len) as Size;
                let block = match alloc.allocate(len) {
                    Ok(block) => block,
                    Err(_) => continue,
                };
                if block.is_empty() {
                    continue;
                }

                unsafe {
                    let bytes =
                        slice::from_raw_parts_mut(block.data().cast::<u8>(), block.size() as usize);
                    bytes.fill(marker);
                }
                live.push((marker, block));
            }

            AllocatorOp::Free { index } => {
                if live.is_empty() {
                    continue;
                }
                let index = index % live.len();
                let (marker, mut block) = live.swap_remove(index);

                unsafe {
                    let bytes =
                        slice::from_raw_parts(block.data().cast::<u8>(), block.size() as usize);
                    if bytes.iter().any(|&byte| byte != marker) {
                        return false;
                    }
                    alloc.deallocate(&mut block);
                }
                if !block.is_empty() {
                    return false;
                }
            }
        }
    }

    for (_, mut block) in live {
        unsafe { alloc.deallocate(&mut block) };
    }
    true
}

#[test]
fn free_list_allocations_are_mutually_exclusive() {
    fn prop(ops: Vec<AllocatorOp>) -> bool {
        blocks_stay_mutually_exclusive(FreeList::<Heap, 16, 64, 16>::new(), ops, 96)
    }

    QuickCheck::new().quickcheck(prop as fn(_) -> bool);
}

#[test]
fn multi_stack_allocations_are_mutually_exclusive() {
    fn prop(ops: Vec<AllocatorOp>) -> bool {
        blocks_stay_mutually_exclusive(MultiStack::<4, 256>::new(), ops, 300)
    }

    QuickCheck::new().quickcheck(prop as fn(_) -> bool);
}

#[cfg(feature = "allocator-api2")]
#[test]
fn adapter_bridges_the_host_protocol() {
    use allocator_api2::alloc::Allocator as _;
    use core::alloc::Layout;

    let adapter = crate::adapter::Adapter::new(Heap);
    let layout = Layout::from_size_align(24, 8).unwrap();

    let ptr = adapter.allocate(layout).unwrap();
    assert!(ptr.len() >= 24);
    unsafe { adapter.deallocate(ptr.cast(), layout) };
}

#[test]
fn stats_over_a_stack_composes() {
    let mut alloc = Stats::<Stack<256>, 8>::new();

    let mut block = alloc.allocate(32).unwrap();
    assert!(alloc.owns(&block));
    assert_eq!(1, alloc.len());

    unsafe { alloc.deallocate(&mut block) };
    assert_eq!(2, alloc.len());
}
