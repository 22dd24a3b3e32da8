use std::{
    ptr::NonNull,
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Release},
    },
};

use super::{
    flags::{SqFlags, SqeFlags},
    io_uring_sqe,
    layout::RingLayout,
    Op,
};

/// Sprays uring submissions.
///
/// `sqe_tail` counts slots handed out, `tail` counts slots
/// published to the kernel. The two only differ while an
/// [`Sqe`] is alive.
#[derive(Debug)]
pub(crate) struct Sq {
    khead: *const AtomicU32,
    ktail: *const AtomicU32,
    kflags: *const AtomicU32,
    kdropped: *const AtomicU32,
    array: *mut u32,
    sqes: *mut io_uring_sqe,
    ring_mask: u32,
    ring_entries: u32,
    sqe_tail: u32,
    tail: u32,
}

#[allow(unsafe_code)]
impl Sq {
    /// # Safety
    ///
    /// `ring` and `sqes` must be live mappings matching
    /// `layout`, and outlive the returned `Sq`.
    pub(crate) unsafe fn new(
        ring: NonNull<u8>,
        sqes: NonNull<u8>,
        layout: &RingLayout,
    ) -> Sq {
        let ring = ring.as_ptr();
        let off = &layout.sq_off;
        let ktail = ring.add(off.tail as usize).cast::<AtomicU32>();
        let tail = (*ktail).load(Acquire);
        Sq {
            khead: ring.add(off.head as usize).cast(),
            ktail,
            kflags: ring.add(off.flags as usize).cast(),
            kdropped: ring.add(off.dropped as usize).cast(),
            array: ring.add(off.array as usize).cast(),
            sqes: sqes.as_ptr().cast(),
            ring_mask: ring.add(off.ring_mask as usize).cast::<u32>().read(),
            ring_entries: ring
                .add(off.ring_entries as usize)
                .cast::<u32>()
                .read(),
            sqe_tail: tail,
            tail,
        }
    }

    pub(crate) fn entries(&self) -> u32 {
        self.ring_entries
    }

    fn khead(&self) -> u32 {
        unsafe { (*self.khead).load(Acquire) }
    }

    /// Entries published but not yet consumed by the kernel.
    pub(crate) fn ready(&self) -> u32 {
        self.tail.wrapping_sub(self.khead())
    }

    pub(crate) fn space_left(&self) -> u32 {
        self.ring_entries - self.ready()
    }

    pub(crate) fn flags(&self) -> SqFlags {
        SqFlags::from_bits_retain(unsafe { (*self.kflags).load(Acquire) })
    }

    pub(crate) fn dropped(&self) -> u32 {
        unsafe { (*self.kdropped).load(Acquire) }
    }

    /// Hands out the next free slot, zeroed, or `None` if
    /// the kernel hasn't consumed enough of the ring yet.
    pub(crate) fn next_slot(&mut self) -> Option<u32> {
        if self.sqe_tail.wrapping_sub(self.khead()) >= self.ring_entries {
            return None;
        }
        let slot = self.sqe_tail & self.ring_mask;
        self.sqe_tail = self.sqe_tail.wrapping_add(1);
        unsafe {
            self.sqes.add(slot as usize).write(io_uring_sqe::default());
        }
        Some(slot)
    }

    fn unget(&mut self) {
        self.sqe_tail = self.sqe_tail.wrapping_sub(1);
    }

    fn sqe_mut(&mut self, slot: u32) -> &mut io_uring_sqe {
        debug_assert!(slot < self.ring_entries);
        unsafe { &mut *self.sqes.add(slot as usize) }
    }

    fn sqe(&self, slot: u32) -> &io_uring_sqe {
        debug_assert!(slot < self.ring_entries);
        unsafe { &*self.sqes.add(slot as usize) }
    }

    // index first, then the tail with Release, so the kernel
    // never sees a tail covering an unwritten index
    fn push(&mut self, slot: u32) {
        unsafe {
            self.array.add((self.tail & self.ring_mask) as usize).write(slot);
        }
        self.tail = self.tail.wrapping_add(1);
        unsafe { (*self.ktail).store(self.tail, Release) }
    }
}

/// A claimed submission queue slot.
///
/// Fill it in with [`prep`](Sqe::prep) and the other
/// builders, then hand it to the kernel's view of the queue
/// with [`push`](Sqe::push). Nothing is sent to the kernel
/// until the ring is submitted. Dropping an `Sqe` without
/// pushing it returns the slot.
#[derive(Debug)]
pub struct Sqe<'a> {
    sq: &'a mut Sq,
    slot: u32,
    pushed: bool,
}

impl<'a> Sqe<'a> {
    pub(crate) fn new(sq: &'a mut Sq, slot: u32) -> Sqe<'a> {
        Sqe { sq, slot, pushed: false }
    }

    /// Fill in the operation.
    pub fn prep(mut self, op: Op) -> Sqe<'a> {
        op.prepare(self.raw_mut());
        self
    }

    /// Set the tag that comes back on this entry's completion.
    pub fn user_data(mut self, user_data: u64) -> Sqe<'a> {
        self.raw_mut().user_data = user_data;
        self
    }

    /// Set the `IOSQE_*` flags.
    pub fn flags(mut self, flags: SqeFlags) -> Sqe<'a> {
        self.raw_mut().flags = flags.bits();
        self
    }

    /// Run this entry with a personality registered through
    /// [`Uring::register_personality`](crate::Uring::register_personality).
    pub fn personality(mut self, id: u16) -> Sqe<'a> {
        self.raw_mut().personality = id;
        self
    }

    /// The slot index in the SQE array.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// The entry as it will be read by the kernel.
    pub fn raw(&self) -> &io_uring_sqe {
        self.sq.sqe(self.slot)
    }

    /// Direct access to the entry, for fields `Op` doesn't
    /// cover.
    pub fn raw_mut(&mut self) -> &mut io_uring_sqe {
        self.sq.sqe_mut(self.slot)
    }

    /// Publish this entry to the submission queue.
    ///
    /// # Safety
    ///
    /// Every buffer, iovec, timespec or socket address the
    /// entry points to must stay valid, and not be moved, until
    /// its completion has been reaped.
    #[allow(unsafe_code)]
    pub unsafe fn push(mut self) {
        self.pushed = true;
        self.sq.push(self.slot);
    }
}

impl Drop for Sqe<'_> {
    fn drop(&mut self) {
        if !self.pushed {
            self.sq.unget();
        }
    }
}
