#![allow(non_camel_case_types, missing_docs)]

use std::{io, time::Duration};

use super::{flags::SqeFlags, Opcode};

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct io_sqring_offsets {
    pub head: u32,
    pub tail: u32,
    pub ring_mask: u32,
    pub ring_entries: u32,
    pub flags: u32,
    pub dropped: u32,
    pub array: u32,
    pub resv1: u32,
    pub resv2: u64,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct io_cqring_offsets {
    pub head: u32,
    pub tail: u32,
    pub ring_mask: u32,
    pub ring_entries: u32,
    pub overflow: u32,
    pub cqes: u32,
    pub flags: u32,
    pub resv1: u32,
    pub resv2: u64,
}

/// The argument to `io_uring_setup`. The kernel fills in the
/// negotiated sizes, features and ring offsets.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct io_uring_params {
    pub sq_entries: u32,
    pub cq_entries: u32,
    pub flags: u32,
    pub sq_thread_cpu: u32,
    pub sq_thread_idle: u32,
    pub features: u32,
    pub wq_fd: u32,
    pub resv: [u32; 3],
    pub sq_off: io_sqring_offsets,
    pub cq_off: io_cqring_offsets,
}

/// A submission queue entry, laid out exactly as the kernel
/// reads it.
///
/// The operation-specific unions are flattened to the member
/// this crate writes. Use [`Op`](crate::Op) to fill them in
/// rather than poking at the fields directly.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct io_uring_sqe {
    pub opcode: u8,
    pub flags: u8,
    pub ioprio: u16,
    pub fd: i32,
    /// `off` / `addr2`
    pub off: u64,
    /// `addr` / `splice_off_in`
    pub addr: u64,
    pub len: u32,
    /// `rw_flags`, `fsync_flags`, `poll32_events`,
    /// `timeout_flags`, `accept_flags`, `msg_flags`, ...
    pub op_flags: u32,
    pub user_data: u64,
    /// `buf_index` / `buf_group`
    pub buf_index: u16,
    pub personality: u16,
    pub splice_fd_in: i32,
    pub addr3: u64,
    pub pad: u64,
}

impl io_uring_sqe {
    /// The operation this entry will run.
    pub fn opcode(&self) -> Opcode {
        Opcode::from(self.opcode)
    }

    /// The `IOSQE_*` flags of this entry.
    pub fn sqe_flags(&self) -> SqeFlags {
        SqeFlags::from_bits_retain(self.flags)
    }
}

/// A completion queue entry.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct io_uring_cqe {
    pub(crate) user_data: u64,
    pub(crate) res: i32,
    pub(crate) flags: u32,
}

impl io_uring_cqe {
    /// The tag that was set on the submission this
    /// completion belongs to.
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// The raw result: non-negative on success, a negated
    /// errno on failure.
    pub fn result(&self) -> i32 {
        self.res
    }

    /// Operation-specific completion flags.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The result as an `io::Result`, turning a negative
    /// value into the matching OS error.
    pub fn io_result(&self) -> io::Result<u32> {
        if self.res < 0 {
            Err(io::Error::from_raw_os_error(-self.res))
        } else {
            Ok(self.res.unsigned_abs())
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct io_uring_probe_op {
    pub op: u8,
    pub resv: u8,
    pub flags: u16,
    pub resv2: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct io_uring_probe {
    pub last_op: u8,
    pub ops_len: u8,
    pub resv: u16,
    pub resv2: [u32; 3],
    pub ops: [io_uring_probe_op; 0],
}

/// `io_uring_probe` followed by room for every op slot
/// the kernel may fill in.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub(crate) struct io_uring_probe_buf {
    pub(crate) header: io_uring_probe,
    pub(crate) ops: [io_uring_probe_op; PROBE_OPS],
}

pub(crate) const PROBE_OPS: usize = 256;

impl Default for io_uring_probe_buf {
    fn default() -> io_uring_probe_buf {
        io_uring_probe_buf {
            header: io_uring_probe::default(),
            ops: [io_uring_probe_op::default(); PROBE_OPS],
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct io_uring_getevents_arg {
    pub sigmask: u64,
    pub sigmask_sz: u32,
    pub pad: u32,
    pub ts: u64,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct io_uring_files_update {
    pub offset: u32,
    pub resv: u32,
    pub fds: u64,
}

/// `__kernel_timespec`, as taken by timeout operations and
/// timed waits.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl From<Duration> for Timespec {
    fn from(d: Duration) -> Timespec {
        Timespec {
            tv_sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            tv_nsec: i64::from(d.subsec_nanos()),
        }
    }
}

const _: () = {
    use std::mem::size_of;
    assert!(size_of::<io_uring_sqe>() == 64);
    assert!(size_of::<io_uring_cqe>() == 16);
    assert!(size_of::<io_uring_params>() == 120);
    assert!(size_of::<io_uring_probe>() == 16);
    assert!(size_of::<io_uring_probe_op>() == 8);
    assert!(size_of::<io_uring_getevents_arg>() == 24);
    assert!(size_of::<io_uring_files_update>() == 16);
    assert!(size_of::<Timespec>() == 16);
};
