//! Event-recording pass-through allocation.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;

use crate::{ssize_of, AllocError, Allocator, RawBlock, Size};

/// One recorded allocation event.
///
/// Records live in blocks drawn from the wrapped allocator and are
/// linked head to tail in insertion order. The signed delta folds in
/// the record's own footprint: an allocation of `n` bytes records
/// `size_of::<Record>() + n`, a deallocation records
/// `size_of::<Record>() - n`.
pub struct Record {
    record_addr: *mut u8,
    request_addr: *mut u8,
    amount: Size,
    stamp: u64,
    next: *mut Record,
}

impl Record {
    /// Caller-visible address of the request.
    #[must_use]
    pub fn request_addr(&self) -> *mut u8 {
        self.request_addr
    }

    /// Signed size delta of the event, including the record's own
    /// footprint.
    #[must_use]
    pub fn amount(&self) -> Size {
        self.amount
    }

    /// Monotonic stamp; later events carry larger stamps.
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("request_addr", &self.request_addr)
            .field("amount", &self.amount)
            .field("stamp", &self.stamp)
            .finish()
    }
}

/// Pass-through allocator recording the last `N` allocation events.
///
/// The ring holds at most `N` records; once full, the oldest record is
/// relinked as the tail and overwritten in place, so steady-state
/// recording performs no further allocation. The cumulative total
/// keeps growing monotonically regardless.
///
/// Record storage is drawn from the wrapped allocator and must satisfy
/// `Record`'s alignment; every allocator in this crate does at its
/// default alignment. A failed record allocation skips the record
/// silently rather than failing the caller's request.
pub struct Stats<A: Allocator, const N: i64> {
    inner: A,
    head: *mut Record,
    tail: *mut Record,
    len: i64,
    total: Size,
    clock: u64,
}

impl<A: Allocator, const N: i64> Stats<A, N> {
    /// Constructs a recorder over `A::default()`.
    ///
    /// # Panics
    ///
    /// Panics if `N` is not positive.
    #[must_use]
    pub fn new() -> Stats<A, N> {
        Stats::with_inner(A::default())
    }

    /// Constructs a recorder over `inner`.
    ///
    /// # Panics
    ///
    /// Panics if `N` is not positive.
    pub fn with_inner(inner: A) -> Stats<A, N> {
        assert!(N > 0, "record capacity must be positive");

        Stats {
            inner,
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
            len: 0,
            total: 0,
            clock: 0,
        }
    }

    /// The wrapped allocator.
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> i64 {
        self.len
    }

    /// Returns `true` iff no event has been retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Cumulative sum of all recorded deltas. Grows monotonically even
    /// after the ring starts recycling.
    #[must_use]
    pub fn total_allocated(&self) -> Size {
        self.total
    }

    /// Iterates the retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> Records<'_> {
        Records {
            cursor: self.head,
            _stats: PhantomData,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn add_record(&mut self, request: *mut u8, delta: Size, stamp: u64) {
        if self.len >= N {
            // Recycle the oldest record in place and relink it as the
            // new tail.
            // SAFETY: len >= N > 0, so head and tail are live records.
            unsafe {
                let oldest = self.head;
                self.head = (*oldest).next;
                if self.head.is_null() {
                    self.head = oldest;
                } else {
                    (*self.tail).next = oldest;
                }
                self.tail = oldest;
                (*oldest).next = ptr::null_mut();
                (*oldest).request_addr = request;
                (*oldest).amount = ssize_of::<Record>() + delta;
                (*oldest).stamp = stamp;
                self.total += (*oldest).amount;
            }
            return;
        }

        let block = match self.inner.allocate(ssize_of::<Record>()) {
            Ok(block) if !block.is_empty() => block,
            _ => return,
        };

        let record = block.data().cast::<Record>();
        // SAFETY: the block spans a Record and the inner allocator
        // aligns it.
        unsafe {
            record.write(Record {
                record_addr: block.data().cast(),
                request_addr: request,
                amount: ssize_of::<Record>() + delta,
                stamp,
                next: ptr::null_mut(),
            });
            if self.head.is_null() {
                self.head = record;
            } else {
                (*self.tail).next = record;
            }
            self.tail = record;
            self.total += (*record).amount;
        }
        self.len += 1;
    }
}

impl<A: Allocator, const N: i64> Allocator for Stats<A, N> {
    fn allocate(&mut self, size: Size) -> Result<RawBlock, AllocError> {
        let block = self.inner.allocate(size)?;
        if !block.is_empty() {
            let stamp = self.tick();
            self.add_record(block.data().cast(), block.size(), stamp);
        }
        Ok(block)
    }

    unsafe fn deallocate(&mut self, block: &mut RawBlock) {
        let request = block.data().cast::<u8>();
        let size = block.size();
        let was_empty = block.is_empty();

        // SAFETY: forwarded per the contract.
        unsafe { self.inner.deallocate(block) };

        if !was_empty && block.is_empty() {
            let stamp = self.tick();
            self.add_record(request, -size, stamp);
        }
    }

    fn owns(&self, block: &RawBlock) -> bool {
        self.inner.owns(block)
    }
}

impl<A: Allocator, const N: i64> Default for Stats<A, N> {
    fn default() -> Stats<A, N> {
        Stats::new()
    }
}

impl<A: Allocator, const N: i64> Clone for Stats<A, N> {
    /// Clones the inner allocator and replays the retained records
    /// into storage drawn from the clone.
    fn clone(&self) -> Stats<A, N> {
        let mut dup = Stats::with_inner(self.inner.clone());
        for record in self.records() {
            dup.add_record(
                record.request_addr,
                record.amount - ssize_of::<Record>(),
                record.stamp,
            );
        }
        dup.clock = self.clock;
        dup.total = self.total;
        dup
    }
}

impl<A: Allocator, const N: i64> Drop for Stats<A, N> {
    fn drop(&mut self) {
        let mut cursor = self.head;
        while !cursor.is_null() {
            // SAFETY: list nodes are live records allocated from
            // `inner`.
            unsafe {
                let next = (*cursor).next;
                let mut block = RawBlock::new(ssize_of::<Record>(), (*cursor).record_addr.cast());
                self.inner.deallocate(&mut block);
                cursor = next;
            }
        }
    }
}

impl<A: Allocator, const N: i64> fmt::Debug for Stats<A, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stats")
            .field("capacity", &N)
            .field("len", &self.len)
            .field("total_allocated", &self.total)
            .finish()
    }
}

/// Iterator over retained records, oldest first.
///
/// Borrowed from [`Stats::records`].
pub struct Records<'a> {
    cursor: *const Record,
    _stats: PhantomData<&'a Record>,
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<&'a Record> {
        if self.cursor.is_null() {
            return None;
        }
        // SAFETY: the borrow on the owning Stats keeps records alive.
        let record = unsafe { &*self.cursor };
        self.cursor = record.next;
        Some(record)
    }
}

impl fmt::Debug for Records<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn ring_recycles_the_oldest_record() {
        let mut stats = Stats::<Heap, 2>::new();
        let record_size = ssize_of::<Record>();

        let mut b1 = stats.allocate(1).unwrap();
        unsafe { stats.deallocate(&mut b1) };
        let mut b2 = stats.allocate(2).unwrap();
        unsafe { stats.deallocate(&mut b2) };

        assert_eq!(2, stats.len());

        let amounts: alloc::vec::Vec<Size> = stats.records().map(Record::amount).collect();
        assert_eq!(alloc::vec![record_size + 2, record_size - 2], amounts);

        // Four events of |delta| 1, 1, 2, 2 with the record overhead
        // folded into each.
        assert_eq!(4 * record_size, stats.total_allocated());
    }

    #[test]
    fn stamps_are_monotonic() {
        let mut stats = Stats::<Heap, 4>::new();

        let mut b1 = stats.allocate(8).unwrap();
        let mut b2 = stats.allocate(8).unwrap();
        unsafe {
            stats.deallocate(&mut b2);
            stats.deallocate(&mut b1);
        }

        let stamps: alloc::vec::Vec<u64> = stats.records().map(Record::stamp).collect();
        assert_eq!(alloc::vec![1, 2, 3, 4], stamps);
    }

    #[test]
    fn single_record_ring_stays_linked() {
        let mut stats = Stats::<Heap, 1>::new();

        let mut b1 = stats.allocate(4).unwrap();
        unsafe { stats.deallocate(&mut b1) };

        assert_eq!(1, stats.len());
        let record = stats.records().next().unwrap();
        assert_eq!(ssize_of::<Record>() - 4, record.amount());
    }

    #[test]
    fn empty_requests_are_not_recorded() {
        let mut stats = Stats::<Heap, 2>::new();

        let mut empty = stats.allocate(0).unwrap();
        unsafe { stats.deallocate(&mut empty) };

        assert!(stats.is_empty());
        assert_eq!(0, stats.total_allocated());
    }

    #[test]
    fn clone_replays_the_ring() {
        let mut stats = Stats::<Heap, 4>::new();
        let mut b = stats.allocate(8).unwrap();
        unsafe { stats.deallocate(&mut b) };

        let dup = stats.clone();
        assert_eq!(stats.len(), dup.len());
        assert_eq!(stats.total_allocated(), dup.total_allocated());

        let paired = stats.records().zip(dup.records());
        for (original, replayed) in paired {
            assert_eq!(original.amount(), replayed.amount());
            assert_eq!(original.stamp(), replayed.stamp());
        }
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _ = Stats::<Heap, 0>::new();
    }
}
