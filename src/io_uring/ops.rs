use std::os::unix::io::RawFd;

use super::{
    flags::{FsyncFlags, TimeoutFlags},
    io_uring_sqe, Timespec,
};

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)*) => {
        /// An `IORING_OP_*` operation code.
        ///
        /// Codes this crate has no name for survive as
        /// `Unknown`, so a probe on a newer kernel still
        /// reports them.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($(#[$doc])* $name,)*
            /// An operation code this crate doesn't name.
            Unknown(u8),
        }

        impl From<u8> for Opcode {
            fn from(code: u8) -> Opcode {
                match code {
                    $($code => Opcode::$name,)*
                    other => Opcode::Unknown(other),
                }
            }
        }

        impl From<Opcode> for u8 {
            fn from(op: Opcode) -> u8 {
                match op {
                    $(Opcode::$name => $code,)*
                    Opcode::Unknown(other) => other,
                }
            }
        }
    };
}

opcodes! {
    /// `IORING_OP_NOP`
    Nop = 0,
    /// `IORING_OP_READV`
    Readv = 1,
    /// `IORING_OP_WRITEV`
    Writev = 2,
    /// `IORING_OP_FSYNC`
    Fsync = 3,
    /// `IORING_OP_READ_FIXED`
    ReadFixed = 4,
    /// `IORING_OP_WRITE_FIXED`
    WriteFixed = 5,
    /// `IORING_OP_POLL_ADD`
    PollAdd = 6,
    /// `IORING_OP_POLL_REMOVE`
    PollRemove = 7,
    /// `IORING_OP_SYNC_FILE_RANGE`
    SyncFileRange = 8,
    /// `IORING_OP_SENDMSG`
    SendMsg = 9,
    /// `IORING_OP_RECVMSG`
    RecvMsg = 10,
    /// `IORING_OP_TIMEOUT`
    Timeout = 11,
    /// `IORING_OP_TIMEOUT_REMOVE`
    TimeoutRemove = 12,
    /// `IORING_OP_ACCEPT`
    Accept = 13,
    /// `IORING_OP_ASYNC_CANCEL`
    AsyncCancel = 14,
    /// `IORING_OP_LINK_TIMEOUT`
    LinkTimeout = 15,
    /// `IORING_OP_CONNECT`
    Connect = 16,
    /// `IORING_OP_FALLOCATE`
    Fallocate = 17,
    /// `IORING_OP_OPENAT`
    OpenAt = 18,
    /// `IORING_OP_CLOSE`
    Close = 19,
    /// `IORING_OP_FILES_UPDATE`
    FilesUpdate = 20,
    /// `IORING_OP_STATX`
    Statx = 21,
    /// `IORING_OP_READ`
    Read = 22,
    /// `IORING_OP_WRITE`
    Write = 23,
    /// `IORING_OP_FADVISE`
    Fadvise = 24,
    /// `IORING_OP_MADVISE`
    Madvise = 25,
    /// `IORING_OP_SEND`
    Send = 26,
    /// `IORING_OP_RECV`
    Recv = 27,
    /// `IORING_OP_OPENAT2`
    OpenAt2 = 28,
    /// `IORING_OP_EPOLL_CTL`
    EpollCtl = 29,
    /// `IORING_OP_SPLICE`
    Splice = 30,
    /// `IORING_OP_PROVIDE_BUFFERS`
    ProvideBuffers = 31,
    /// `IORING_OP_REMOVE_BUFFERS`
    RemoveBuffers = 32,
}

/// An operation to place in a submission queue entry, carrying
/// only the fields that operation reads.
///
/// Pointers in here are handed to the kernel as-is. They must
/// stay valid until the operation's completion is reaped,
/// which is why [`Sqe::push`](crate::Sqe::push) is `unsafe`.
#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum Op {
    /// Does nothing, completes with 0.
    Nop,
    /// `pread(2)` into `buf`.
    Read { fd: RawFd, buf: *mut u8, len: u32, offset: u64 },
    /// `pwrite(2)` from `buf`.
    Write { fd: RawFd, buf: *const u8, len: u32, offset: u64 },
    /// `preadv(2)`.
    Readv {
        fd: RawFd,
        iovecs: *const libc::iovec,
        nr: u32,
        offset: u64,
    },
    /// `pwritev(2)`.
    Writev {
        fd: RawFd,
        iovecs: *const libc::iovec,
        nr: u32,
        offset: u64,
    },
    /// Read into a registered buffer.
    ReadFixed {
        fd: RawFd,
        buf: *mut u8,
        len: u32,
        offset: u64,
        buf_index: u16,
    },
    /// Write from a registered buffer.
    WriteFixed {
        fd: RawFd,
        buf: *const u8,
        len: u32,
        offset: u64,
        buf_index: u16,
    },
    /// `fsync(2)`, or `fdatasync(2)` with `DATASYNC`.
    Fsync { fd: RawFd, flags: FsyncFlags },
    /// One-shot poll for `events` on `fd`.
    PollAdd { fd: RawFd, events: u32 },
    /// Remove the poll tagged `user_data`.
    PollRemove { user_data: u64 },
    /// Completes after `ts` elapses, or after `count` other
    /// completions if `count` is nonzero.
    Timeout { ts: *const Timespec, count: u32, flags: TimeoutFlags },
    /// Remove the timeout tagged `user_data`.
    TimeoutRemove { user_data: u64, flags: TimeoutFlags },
    /// Cancel the previous linked entry if it hasn't
    /// completed within `ts`.
    LinkTimeout { ts: *const Timespec, flags: TimeoutFlags },
    /// Try to cancel the in-flight operation tagged
    /// `user_data`. Completes with `-ENOENT` if nothing by
    /// that tag is in flight, `-EALREADY` if it is already
    /// running.
    AsyncCancel { user_data: u64 },
    /// `accept4(2)`.
    Accept {
        fd: RawFd,
        addr: *mut libc::sockaddr,
        addrlen: *mut libc::socklen_t,
        flags: u32,
    },
    /// `connect(2)`.
    Connect {
        fd: RawFd,
        addr: *const libc::sockaddr,
        addrlen: libc::socklen_t,
    },
    /// `close(2)`.
    Close { fd: RawFd },
    /// `send(2)`.
    Send { fd: RawFd, buf: *const u8, len: u32, flags: u32 },
    /// `recv(2)`.
    Recv { fd: RawFd, buf: *mut u8, len: u32, flags: u32 },
    /// Any opcode, with the common fields set directly. Use
    /// this for operations not modeled above, including ones
    /// only a newer kernel knows.
    Raw {
        opcode: Opcode,
        fd: RawFd,
        addr: u64,
        len: u32,
        offset: u64,
        op_flags: u32,
    },
}

impl Op {
    /// The operation code this writes.
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::Nop => Opcode::Nop,
            Op::Read { .. } => Opcode::Read,
            Op::Write { .. } => Opcode::Write,
            Op::Readv { .. } => Opcode::Readv,
            Op::Writev { .. } => Opcode::Writev,
            Op::ReadFixed { .. } => Opcode::ReadFixed,
            Op::WriteFixed { .. } => Opcode::WriteFixed,
            Op::Fsync { .. } => Opcode::Fsync,
            Op::PollAdd { .. } => Opcode::PollAdd,
            Op::PollRemove { .. } => Opcode::PollRemove,
            Op::Timeout { .. } => Opcode::Timeout,
            Op::TimeoutRemove { .. } => Opcode::TimeoutRemove,
            Op::LinkTimeout { .. } => Opcode::LinkTimeout,
            Op::AsyncCancel { .. } => Opcode::AsyncCancel,
            Op::Accept { .. } => Opcode::Accept,
            Op::Connect { .. } => Opcode::Connect,
            Op::Close { .. } => Opcode::Close,
            Op::Send { .. } => Opcode::Send,
            Op::Recv { .. } => Opcode::Recv,
            Op::Raw { opcode, .. } => *opcode,
        }
    }

    // fills the opcode and operation fields, leaving
    // flags, user_data and personality alone
    pub(crate) fn prepare(self, sqe: &mut io_uring_sqe) {
        sqe.opcode = u8::from(self.opcode());
        let (fd, addr, len, off, op_flags) = match self {
            Op::Nop => (-1, 0, 0, 0, 0),
            Op::Read { fd, buf, len, offset } => {
                (fd, buf as u64, len, offset, 0)
            }
            Op::Write { fd, buf, len, offset } => {
                (fd, buf as u64, len, offset, 0)
            }
            Op::Readv { fd, iovecs, nr, offset }
            | Op::Writev { fd, iovecs, nr, offset } => {
                (fd, iovecs as u64, nr, offset, 0)
            }
            Op::ReadFixed { fd, buf, len, offset, buf_index } => {
                sqe.buf_index = buf_index;
                (fd, buf as u64, len, offset, 0)
            }
            Op::WriteFixed { fd, buf, len, offset, buf_index } => {
                sqe.buf_index = buf_index;
                (fd, buf as u64, len, offset, 0)
            }
            Op::Fsync { fd, flags } => (fd, 0, 0, 0, flags.bits()),
            Op::PollAdd { fd, events } => {
                #[cfg(target_endian = "big")]
                let events = events.rotate_left(16);
                (fd, 0, 0, 0, events)
            }
            Op::PollRemove { user_data } => (-1, user_data, 0, 0, 0),
            Op::Timeout { ts, count, flags } => {
                (-1, ts as u64, 1, u64::from(count), flags.bits())
            }
            Op::TimeoutRemove { user_data, flags } => {
                (-1, user_data, 0, 0, flags.bits())
            }
            Op::LinkTimeout { ts, flags } => {
                (-1, ts as u64, 1, 0, flags.bits())
            }
            Op::AsyncCancel { user_data } => (-1, user_data, 0, 0, 0),
            Op::Accept { fd, addr, addrlen, flags } => {
                (fd, addr as u64, 0, addrlen as u64, flags)
            }
            Op::Connect { fd, addr, addrlen } => {
                (fd, addr as u64, 0, u64::from(addrlen), 0)
            }
            Op::Close { fd } => (fd, 0, 0, 0, 0),
            Op::Send { fd, buf, len, flags } => {
                (fd, buf as u64, len, 0, flags)
            }
            Op::Recv { fd, buf, len, flags } => {
                (fd, buf as u64, len, 0, flags)
            }
            Op::Raw { fd, addr, len, offset, op_flags, .. } => {
                (fd, addr, len, offset, op_flags)
            }
        };
        sqe.fd = fd;
        sqe.addr = addr;
        sqe.len = len;
        sqe.off = off;
        sqe.op_flags = op_flags;
    }
}
