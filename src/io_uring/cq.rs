use std::{
    ptr::NonNull,
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Release},
    },
};

use super::{io_uring_cqe, layout::RingLayout};

/// Consumes uring completions.
#[derive(Debug)]
pub(crate) struct Cq {
    khead: *const AtomicU32,
    ktail: *const AtomicU32,
    koverflow: *const AtomicU32,
    cqes: *const io_uring_cqe,
    ring_mask: u32,
    ring_entries: u32,
}

#[allow(unsafe_code)]
impl Cq {
    /// # Safety
    ///
    /// `ring` must be a live mapping matching `layout`, and
    /// outlive the returned `Cq`.
    pub(crate) unsafe fn new(ring: NonNull<u8>, layout: &RingLayout) -> Cq {
        let ring = ring.as_ptr();
        let off = &layout.cq_off;
        Cq {
            khead: ring.add(off.head as usize).cast(),
            ktail: ring.add(off.tail as usize).cast(),
            koverflow: ring.add(off.overflow as usize).cast(),
            cqes: ring.add(off.cqes as usize).cast(),
            ring_mask: ring.add(off.ring_mask as usize).cast::<u32>().read(),
            ring_entries: ring
                .add(off.ring_entries as usize)
                .cast::<u32>()
                .read(),
        }
    }

    pub(crate) fn entries(&self) -> u32 {
        self.ring_entries
    }

    // we are the only writer of the head
    fn head(&self) -> u32 {
        unsafe { (*self.khead).load(Acquire) }
    }

    pub(crate) fn ready(&self) -> u32 {
        let tail = unsafe { (*self.ktail).load(Acquire) };
        tail.wrapping_sub(self.head())
    }

    pub(crate) fn overflow(&self) -> u32 {
        unsafe { (*self.koverflow).load(Acquire) }
    }

    pub(crate) fn batch(&self, max: usize) -> Completions<'_> {
        let ready = self.ready() as usize;
        Completions {
            cq: self,
            head: self.head(),
            left: ready.min(max),
        }
    }

    pub(crate) fn peek(&self) -> Option<&io_uring_cqe> {
        self.batch(1).next()
    }

    fn get(&self, index: u32) -> &io_uring_cqe {
        unsafe { &*self.cqes.add((index & self.ring_mask) as usize) }
    }

    pub(crate) fn advance(&mut self, n: u32) {
        debug_assert!(
            n <= self.ready(),
            "advancing the completion queue by {} with only {} ready",
            n,
            self.ready()
        );
        if n == 0 {
            return;
        }
        let head = self.head().wrapping_add(n);
        unsafe { (*self.khead).store(head, Release) }
    }
}

/// The completions buffered in the completion queue, oldest
/// first.
///
/// Yielding a completion does not consume it. Give the slots
/// back with [`Uring::cq_advance`](crate::Uring::cq_advance)
/// once done with them.
#[derive(Debug)]
pub struct Completions<'a> {
    cq: &'a Cq,
    head: u32,
    left: usize,
}

impl<'a> Iterator for Completions<'a> {
    type Item = &'a io_uring_cqe;

    fn next(&mut self) -> Option<&'a io_uring_cqe> {
        if self.left == 0 {
            return None;
        }
        let cqe = self.cq.get(self.head);
        self.head = self.head.wrapping_add(1);
        self.left -= 1;
        Some(cqe)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.left, Some(self.left))
    }
}

impl ExactSizeIterator for Completions<'_> {}
