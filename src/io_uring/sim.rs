//! An in-process stand-in for the kernel side of io_uring.
//!
//! It lays out rings the way the kernel does, in both the
//! single-mmap and the legacy layout, and runs a handful of
//! operations synchronously when entered. Waits that can't be
//! satisfied fire pending timeouts first, then fail the way a
//! real wait would when its timeout or a signal arrives. A wait
//! that follows a submission returns the submitted count
//! instead of blocking, as the kernel does when a wait is cut
//! short after entries were consumed.
//!
//! With SQPOLL allowed, nothing stands in for the polling
//! thread: tests consume the queue with
//! [`poll_sq`](SimKernel::poll_sq) and drive the shared flags
//! word with [`set_sq_flags`](SimKernel::set_sq_flags).
#![allow(unsafe_code)]

use std::{
    collections::{HashMap, VecDeque},
    io,
    os::unix::io::RawFd,
    ptr::{self, NonNull},
    sync::{
        atomic::{
            AtomicU32,
            Ordering::{Acquire, Release},
        },
        Mutex, MutexGuard,
    },
};

use libc::c_void;

use super::{
    constants::*,
    flags::{EnterFlags, FeatureFlags, SetupFlags, SqFlags},
    io_cqring_offsets, io_sqring_offsets, io_uring_cqe,
    io_uring_params, io_uring_sqe,
    kernel_types::{io_uring_probe, io_uring_probe_op},
    EnterArg, Kernel, Opcode,
};

#[derive(Debug)]
pub(crate) struct SimKernel {
    features: FeatureFlags,
    supported: Vec<u8>,
    probe_error: Option<i32>,
    failing_map: Option<i64>,
    consume_limit: Option<u32>,
    allow_sqpoll: bool,
    keep_overflow: bool,
    personality_id: u32,
    state: Mutex<State>,
}

/// What an `io_uring_enter` was handed as its last arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeenArg {
    None,
    SigMask(usize),
    Ext { sigmask: u64, sigmask_sz: u32, timed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SeenEnter {
    pub(crate) to_submit: u32,
    pub(crate) min_complete: u32,
    pub(crate) flags: EnterFlags,
    pub(crate) arg: SeenArg,
}

impl From<EnterArg<'_>> for SeenArg {
    fn from(arg: EnterArg<'_>) -> SeenArg {
        match arg {
            EnterArg::None => SeenArg::None,
            EnterArg::SigMask(set) => {
                SeenArg::SigMask(ptr::from_ref(set) as usize)
            }
            EnterArg::Ext(ext) => SeenArg::Ext {
                sigmask: ext.sigmask,
                sigmask_sz: ext.sigmask_sz,
                timed: ext.ts != 0,
            },
        }
    }
}

#[derive(Debug, Default)]
struct State {
    next_fd: RawFd,
    rings: HashMap<RawFd, SimRing>,
    // closed rings, kept so stray pointers stay harmless
    #[allow(dead_code)]
    retired: Vec<SimRing>,
    live_maps: usize,
    enter_calls: usize,
    enters: Vec<SeenEnter>,
    registrations: Vec<u32>,
    dontforks: usize,
}

#[derive(Debug)]
struct PendingTimeout {
    user_data: u64,
    count: u32,
    seen: u32,
}

#[derive(Debug)]
struct SimRing {
    sq_off: io_sqring_offsets,
    cq_off: io_cqring_offsets,
    sq_entries: u32,
    cq_entries: u32,
    sq_ring: Vec<u64>,
    cq_ring: Option<Vec<u64>>,
    sqes: Vec<u64>,
    sq_head: u32,
    cq_tail: u32,
    timeouts: Vec<PendingTimeout>,
    keep_overflow: bool,
    backlog: VecDeque<(u64, i32)>,
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

fn zeroed(len: usize) -> Vec<u64> {
    vec![0; (len + 7) / 8]
}

fn offsets(
    single_mmap: bool,
    cq_entries: u32,
) -> (io_sqring_offsets, io_cqring_offsets) {
    if single_mmap {
        // mirrors struct io_rings
        let sq_off = io_sqring_offsets {
            head: 0,
            tail: 64,
            ring_mask: 256,
            ring_entries: 264,
            dropped: 272,
            flags: 276,
            array: 320 + 16 * cq_entries,
            ..Default::default()
        };
        let cq_off = io_cqring_offsets {
            head: 128,
            tail: 192,
            ring_mask: 260,
            ring_entries: 268,
            flags: 280,
            overflow: 284,
            cqes: 320,
            ..Default::default()
        };
        (sq_off, cq_off)
    } else {
        let sq_off = io_sqring_offsets {
            head: 0,
            tail: 64,
            ring_mask: 128,
            ring_entries: 132,
            flags: 136,
            dropped: 140,
            array: 192,
            ..Default::default()
        };
        let cq_off = io_cqring_offsets {
            head: 0,
            tail: 64,
            ring_mask: 128,
            ring_entries: 132,
            overflow: 136,
            flags: 140,
            cqes: 192,
            ..Default::default()
        };
        (sq_off, cq_off)
    }
}

impl SimRing {
    fn sq_base(&mut self) -> *mut u8 {
        self.sq_ring.as_mut_ptr().cast()
    }

    fn cq_base(&mut self) -> *mut u8 {
        match self.cq_ring {
            Some(ref mut cq) => cq.as_mut_ptr().cast(),
            None => self.sq_ring.as_mut_ptr().cast(),
        }
    }

    fn sq_word(&mut self, off: u32) -> &AtomicU32 {
        unsafe { &*self.sq_base().add(off as usize).cast::<AtomicU32>() }
    }

    fn cq_word(&mut self, off: u32) -> &AtomicU32 {
        unsafe { &*self.cq_base().add(off as usize).cast::<AtomicU32>() }
    }

    fn init_constants(&mut self) {
        let (sq, cq) = (self.sq_entries, self.cq_entries);
        let (sq_off, cq_off) = (self.sq_off, self.cq_off);
        self.sq_word(sq_off.ring_mask).store(sq - 1, Release);
        self.sq_word(sq_off.ring_entries).store(sq, Release);
        self.cq_word(cq_off.ring_mask).store(cq - 1, Release);
        self.cq_word(cq_off.ring_entries).store(cq, Release);
    }

    fn cq_ready(&mut self) -> u32 {
        let head = self.cq_word(self.cq_off.head).load(Acquire);
        self.cq_tail.wrapping_sub(head)
    }

    fn set_sq_flag(&mut self, flag: SqFlags, on: bool) {
        let word = self.sq_word(self.sq_off.flags);
        if on {
            word.fetch_or(flag.bits(), Release);
        } else {
            word.fetch_and(!flag.bits(), Release);
        }
    }

    fn write_cqe(&mut self, user_data: u64, res: i32) {
        if self.cq_ready() == self.cq_entries || !self.backlog.is_empty() {
            if self.keep_overflow {
                self.backlog.push_back((user_data, res));
                self.set_sq_flag(SqFlags::CQ_OVERFLOW, true);
            } else {
                self.cq_word(self.cq_off.overflow).fetch_add(1, Release);
            }
            return;
        }
        self.write_cqe_unchecked(user_data, res);
    }

    // moves held-back completions into the ring while it has
    // room, clearing CQ_OVERFLOW once all are through
    fn flush_backlog(&mut self) {
        while self.cq_ready() < self.cq_entries {
            match self.backlog.pop_front() {
                Some((user_data, res)) => {
                    self.write_cqe_unchecked(user_data, res)
                }
                None => break,
            }
        }
        if self.backlog.is_empty() {
            self.set_sq_flag(SqFlags::CQ_OVERFLOW, false);
        }
    }

    fn write_cqe_unchecked(&mut self, user_data: u64, res: i32) {
        let index = (self.cq_tail & (self.cq_entries - 1)) as usize;
        let cqes = self.cq_off.cqes as usize;
        unsafe {
            self.cq_base()
                .add(cqes)
                .cast::<io_uring_cqe>()
                .add(index)
                .write(io_uring_cqe { user_data, res, flags: 0 });
        }
        self.cq_tail = self.cq_tail.wrapping_add(1);
        let tail = self.cq_tail;
        self.cq_word(self.cq_off.tail).store(tail, Release);
    }

    // a regular completion, which also counts towards
    // count-based timeouts
    fn post(&mut self, user_data: u64, res: i32) {
        self.write_cqe(user_data, res);
        let mut fired = vec![];
        self.timeouts.retain_mut(|t| {
            if t.count == 0 {
                return true;
            }
            t.seen += 1;
            if t.seen >= t.count {
                fired.push(t.user_data);
                false
            } else {
                true
            }
        });
        for user_data in fired {
            self.write_cqe(user_data, 0);
        }
    }

    fn fire_oldest_timeout(&mut self) -> bool {
        if self.timeouts.is_empty() {
            return false;
        }
        let timeout = self.timeouts.remove(0);
        self.write_cqe(timeout.user_data, -libc::ETIME);
        true
    }

    fn consume(&mut self, max: u32, supported: &[u8]) -> u32 {
        let tail = self.sq_word(self.sq_off.tail).load(Acquire);
        let n = tail.wrapping_sub(self.sq_head).min(max);
        let mask = self.sq_entries - 1;
        for i in 0..n {
            let pos = (self.sq_head.wrapping_add(i) & mask) as usize;
            let array = self.sq_off.array as usize;
            let slot = unsafe {
                self.sq_base().add(array).cast::<u32>().add(pos).read()
            };
            if slot >= self.sq_entries {
                let dropped = self.sq_off.dropped;
                self.sq_word(dropped).fetch_add(1, Release);
                continue;
            }
            let sqe = unsafe {
                self.sqes
                    .as_ptr()
                    .cast::<io_uring_sqe>()
                    .add(slot as usize)
                    .read()
            };
            self.execute(&sqe, supported);
        }
        self.sq_head = self.sq_head.wrapping_add(n);
        let head = self.sq_head;
        self.sq_word(self.sq_off.head).store(head, Release);
        n
    }

    fn execute(&mut self, sqe: &io_uring_sqe, supported: &[u8]) {
        let user_data = sqe.user_data;
        if !supported.contains(&sqe.opcode) {
            self.post(user_data, -libc::EINVAL);
            return;
        }
        match sqe.opcode() {
            Opcode::Nop => self.post(user_data, 0),
            Opcode::Read => {
                let ret = unsafe {
                    libc::pread(
                        sqe.fd,
                        sqe.addr as *mut c_void,
                        sqe.len as usize,
                        sqe.off as libc::off_t,
                    )
                };
                self.post(user_data, result(ret));
            }
            Opcode::Write => {
                let ret = unsafe {
                    libc::pwrite(
                        sqe.fd,
                        sqe.addr as *const c_void,
                        sqe.len as usize,
                        sqe.off as libc::off_t,
                    )
                };
                self.post(user_data, result(ret));
            }
            Opcode::Timeout => self.timeouts.push(PendingTimeout {
                user_data,
                count: sqe.off as u32,
                seen: 0,
            }),
            Opcode::AsyncCancel => {
                let target = sqe.addr;
                match self.timeouts.iter().position(|t| t.user_data == target) {
                    Some(pos) => {
                        let timeout = self.timeouts.remove(pos);
                        self.post(timeout.user_data, -libc::ECANCELED);
                        self.post(user_data, 0);
                    }
                    None => self.post(user_data, -libc::ENOENT),
                }
            }
            _ => self.post(user_data, -libc::EINVAL),
        }
    }
}

fn result(ret: isize) -> i32 {
    if ret < 0 {
        -io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
    } else {
        ret as i32
    }
}

impl SimKernel {
    pub(crate) fn new() -> SimKernel {
        SimKernel {
            features: FeatureFlags::SINGLE_MMAP
                | FeatureFlags::NODROP
                | FeatureFlags::EXT_ARG,
            supported: [
                Opcode::Nop,
                Opcode::Read,
                Opcode::Write,
                Opcode::Timeout,
                Opcode::AsyncCancel,
            ]
            .iter()
            .map(|&op| u8::from(op))
            .collect(),
            probe_error: None,
            failing_map: None,
            consume_limit: None,
            allow_sqpoll: false,
            keep_overflow: false,
            personality_id: 1,
            state: Mutex::new(State { next_fd: 100, ..State::default() }),
        }
    }

    /// Separate SQ and CQ ring mappings.
    pub(crate) fn legacy(mut self) -> SimKernel {
        self.features.remove(FeatureFlags::SINGLE_MMAP);
        self
    }

    pub(crate) fn without_ext_arg(mut self) -> SimKernel {
        self.features.remove(FeatureFlags::EXT_ARG);
        self
    }

    pub(crate) fn supporting(mut self, ops: &[Opcode]) -> SimKernel {
        self.supported = ops.iter().map(|&op| u8::from(op)).collect();
        self
    }

    pub(crate) fn failing_probe(mut self, code: i32) -> SimKernel {
        self.probe_error = Some(code);
        self
    }

    pub(crate) fn failing_map(mut self, offset: i64) -> SimKernel {
        self.failing_map = Some(offset);
        self
    }

    /// Consume at most `n` entries per enter.
    pub(crate) fn consume_at_most(mut self, n: u32) -> SimKernel {
        self.consume_limit = Some(n);
        self
    }

    /// Accept `SQPOLL` rings instead of refusing them with
    /// `EPERM`.
    pub(crate) fn allowing_sqpoll(mut self) -> SimKernel {
        self.allow_sqpoll = true;
        self
    }

    /// Hold completions back when the queue is full and raise
    /// `CQ_OVERFLOW`, instead of dropping and counting them.
    pub(crate) fn keeping_overflow(mut self) -> SimKernel {
        self.keep_overflow = true;
        self
    }

    pub(crate) fn with_personality_id(mut self, id: u32) -> SimKernel {
        self.personality_id = id;
        self
    }

    /// Consume everything published on `fd`'s submission queue,
    /// the way an awake polling thread would.
    pub(crate) fn poll_sq(&self, fd: RawFd) -> u32 {
        let mut state = self.state();
        let ring = state.rings.get_mut(&fd).expect("live sim ring");
        ring.consume(u32::MAX, &self.supported)
    }

    /// Raise or clear bits in `fd`'s shared SQ flags word.
    pub(crate) fn set_sq_flags(&self, fd: RawFd, flags: SqFlags, on: bool) {
        let mut state = self.state();
        let ring = state.rings.get_mut(&fd).expect("live sim ring");
        ring.set_sq_flag(flags, on);
    }

    pub(crate) fn last_enter(&self) -> Option<SeenEnter> {
        self.state().enters.last().copied()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("sim kernel state poisoned")
    }

    pub(crate) fn live_rings(&self) -> usize {
        self.state().rings.len()
    }

    pub(crate) fn live_maps(&self) -> usize {
        self.state().live_maps
    }

    pub(crate) fn enter_calls(&self) -> usize {
        self.state().enter_calls
    }

    pub(crate) fn registrations(&self) -> Vec<u32> {
        self.state().registrations.clone()
    }

    pub(crate) fn dontforks(&self) -> usize {
        self.state().dontforks
    }
}

unsafe impl Kernel for SimKernel {
    fn setup(
        &self,
        entries: u32,
        params: &mut io_uring_params,
    ) -> io::Result<RawFd> {
        let flags = SetupFlags::from_bits_retain(params.flags);
        if flags.contains(SetupFlags::SQPOLL) && !self.allow_sqpoll {
            return Err(errno(libc::EPERM));
        }
        if entries == 0 {
            return Err(errno(libc::EINVAL));
        }
        let entries = if entries > IORING_MAX_ENTRIES {
            if !flags.contains(SetupFlags::CLAMP) {
                return Err(errno(libc::EINVAL));
            }
            IORING_MAX_ENTRIES
        } else {
            entries
        };
        let sq_entries = entries.next_power_of_two();
        let cq_entries = if flags.contains(SetupFlags::CQSIZE) {
            let cq = params.cq_entries.next_power_of_two();
            if cq < sq_entries {
                return Err(errno(libc::EINVAL));
            }
            cq
        } else {
            2 * sq_entries
        };

        let single_mmap = self.features.contains(FeatureFlags::SINGLE_MMAP);
        let (sq_off, cq_off) = offsets(single_mmap, cq_entries);
        let sq_len = sq_off.array as usize + 4 * sq_entries as usize;
        let cq_len = cq_off.cqes as usize + 16 * cq_entries as usize;

        let (sq_ring, cq_ring) = if single_mmap {
            (zeroed(sq_len.max(cq_len)), None)
        } else {
            (zeroed(sq_len), Some(zeroed(cq_len)))
        };

        let mut ring = SimRing {
            sq_off,
            cq_off,
            sq_entries,
            cq_entries,
            sq_ring,
            cq_ring,
            sqes: zeroed(64 * sq_entries as usize),
            sq_head: 0,
            cq_tail: 0,
            timeouts: vec![],
            keep_overflow: self.keep_overflow,
            backlog: VecDeque::new(),
        };
        ring.init_constants();

        params.sq_entries = sq_entries;
        params.cq_entries = cq_entries;
        params.features = self.features.bits();
        params.sq_off = sq_off;
        params.cq_off = cq_off;

        let mut state = self.state();
        let fd = state.next_fd;
        state.next_fd += 1;
        state.rings.insert(fd, ring);
        Ok(fd)
    }

    fn map(
        &self,
        fd: RawFd,
        offset: i64,
        len: usize,
    ) -> io::Result<NonNull<u8>> {
        if self.failing_map == Some(offset) {
            return Err(errno(libc::ENOMEM));
        }
        let mut guard = self.state();
        let state = &mut *guard;
        let ring = state.rings.get_mut(&fd).ok_or_else(|| errno(libc::EBADF))?;
        let region = match offset {
            IORING_OFF_SQ_RING => &mut ring.sq_ring,
            IORING_OFF_CQ_RING => match ring.cq_ring {
                Some(ref mut cq) => cq,
                None => &mut ring.sq_ring,
            },
            IORING_OFF_SQES => &mut ring.sqes,
            _ => return Err(errno(libc::EINVAL)),
        };
        if len > region.len() * 8 {
            return Err(errno(libc::EINVAL));
        }
        let ptr = NonNull::new(region.as_mut_ptr().cast::<u8>())
            .ok_or_else(|| errno(libc::EFAULT))?;
        state.live_maps += 1;
        Ok(ptr)
    }

    unsafe fn unmap(&self, _ptr: NonNull<u8>, _len: usize) {
        let mut state = self.state();
        state.live_maps = state.live_maps.saturating_sub(1);
    }

    fn enter(
        &self,
        fd: RawFd,
        to_submit: u32,
        min_complete: u32,
        flags: EnterFlags,
        arg: EnterArg<'_>,
    ) -> io::Result<u32> {
        let mut state = self.state();
        state.enter_calls += 1;
        state.enters.push(SeenEnter {
            to_submit,
            min_complete,
            flags,
            arg: SeenArg::from(arg),
        });
        let ring = state.rings.get_mut(&fd).ok_or_else(|| errno(libc::EBADF))?;

        if flags.contains(EnterFlags::SQ_WAKEUP) {
            ring.set_sq_flag(SqFlags::NEED_WAKEUP, false);
        }
        let max = to_submit.min(self.consume_limit.unwrap_or(u32::MAX));
        let consumed = ring.consume(max, &self.supported);
        if !flags.contains(EnterFlags::GETEVENTS) {
            return Ok(consumed);
        }
        ring.flush_backlog();

        while ring.cq_ready() < min_complete {
            if ring.fire_oldest_timeout() {
                continue;
            }
            let timed = flags.contains(EnterFlags::EXT_ARG)
                && matches!(arg, EnterArg::Ext(ext) if ext.ts != 0);
            if consumed > 0 {
                break;
            }
            return Err(errno(if timed { libc::ETIME } else { libc::EINTR }));
        }
        Ok(consumed)
    }

    unsafe fn register(
        &self,
        fd: RawFd,
        opcode: u32,
        arg: *const c_void,
        nr: u32,
    ) -> io::Result<u32> {
        let mut state = self.state();
        if !state.rings.contains_key(&fd) {
            return Err(errno(libc::EBADF));
        }
        state.registrations.push(opcode);
        match opcode {
            IORING_REGISTER_PROBE => {
                if let Some(code) = self.probe_error {
                    return Err(errno(code));
                }
                let last_op = self.supported.iter().copied().max().unwrap_or(0);
                let ops_len = nr.min(u32::from(last_op) + 1);
                let header = arg as *mut io_uring_probe;
                (*header).last_op = last_op;
                (*header).ops_len = ops_len as u8;
                let ops = header.add(1).cast::<io_uring_probe_op>();
                for i in 0..ops_len {
                    let op = &mut *ops.add(i as usize);
                    op.op = i as u8;
                    op.flags = if self.supported.contains(&op.op) {
                        IO_URING_OP_SUPPORTED
                    } else {
                        0
                    };
                }
                Ok(0)
            }
            IORING_REGISTER_PERSONALITY => Ok(self.personality_id),
            _ => Ok(0),
        }
    }

    fn dontfork(&self, _ptr: NonNull<u8>, _len: usize) -> io::Result<()> {
        self.state().dontforks += 1;
        Ok(())
    }

    fn close(&self, fd: RawFd) {
        let mut state = self.state();
        if let Some(ring) = state.rings.remove(&fd) {
            state.retired.push(ring);
        }
    }
}
