//! Process-wide shared allocator instances.
//!
//! This module is the only source of process-wide mutable state in the
//! crate. Each distinct `(A, ID)` type pair names one backing instance
//! of `A` that lives for the rest of the process; every
//! [`Shared<A, ID>`] value is a handle to it. The backing instance is
//! not synchronized: touching the same `(A, ID)` pair from more than
//! one thread violates the crate's single-threaded precondition.

use core::any::TypeId;
use core::fmt;
use core::marker::PhantomData;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use spin::Mutex;
use sptr::Strict;

use crate::{AllocError, Allocator, RawBlock, Size};

/// Backing instances keyed by `(A, ID)`, stored as exposed addresses.
static REGISTRY: Mutex<BTreeMap<(TypeId, i64), usize>> = Mutex::new(BTreeMap::new());

/// Handle to the process-wide instance of `A` named by `(A, ID)`.
///
/// Two `Shared` values allocate from the same backing instance iff
/// their type arguments are identical; a different `ID` names an
/// independent instance of the same allocator type. This is how
/// multiple logical owners cheaply pass around an allocator holding
/// shared state, such as a single process-wide bump region.
///
/// The backing instance is created on first use, lives until process
/// exit, and exposes no operations besides the allocator contract;
/// there is deliberately no reset.
pub struct Shared<A: Allocator + 'static, const ID: i64> {
    _backing: PhantomData<fn() -> A>,
}

impl<A: Allocator + 'static, const ID: i64> Shared<A, ID> {
    /// A handle to the `(A, ID)` backing instance.
    #[must_use]
    pub fn new() -> Shared<A, ID> {
        Shared {
            _backing: PhantomData,
        }
    }

    fn backing() -> *mut A {
        let mut registry = REGISTRY.lock();
        let addr = *registry
            .entry((TypeId::of::<A>(), ID))
            .or_insert_with(|| {
                let leaked: &'static mut A = Box::leak(Box::new(A::default()));
                (leaked as *mut A).expose_addr()
            });
        sptr::from_exposed_addr_mut::<A>(addr)
    }
}

impl<A: Allocator + 'static, const ID: i64> Allocator for Shared<A, ID> {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        // SAFETY: the backing instance is live for the process
        // lifetime; exclusive access is the documented single-thread
        // precondition.
        unsafe { (*Self::backing()).allocate(size) }
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        // SAFETY: as in `allocate`; the block routes to the backing
        // instance that produced it.
        unsafe { (*Self::backing()).deallocate(block) };
    }

    fn owns(&self, block: &RawBlock) -> bool {
        // SAFETY: as in `allocate`.
        unsafe { (*Self::backing()).owns(block) }
    }
}

impl<A: Allocator + 'static, const ID: i64> Default for Shared<A, ID> {
    fn default() -> Shared<A, ID> {
        Shared::new()
    }
}

impl<A: Allocator + 'static, const ID: i64> Clone for Shared<A, ID> {
    fn clone(&self) -> Shared<A, ID> {
        Shared::new()
    }
}

impl<A: Allocator + 'static, const ID: i64> Copy for Shared<A, ID> {}

impl<A: Allocator + 'static, const ID: i64> fmt::Debug for Shared<A, ID> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared").field("id", &ID).finish()
    }
}
