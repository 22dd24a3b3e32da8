use std::{
    io,
    mem::size_of,
    os::unix::io::RawFd,
    ptr::{self, NonNull},
    sync::Arc,
};

use libc::{c_long, c_void, syscall};

use super::{
    constants::KERNEL_SIGSET_SIZE, flags::EnterFlags,
    io_uring_getevents_arg, io_uring_params,
};

/// What to pass as the last two arguments of
/// `io_uring_enter`.
#[derive(Debug, Clone, Copy)]
pub enum EnterArg<'a> {
    /// No signal mask, no timeout.
    None,
    /// Swap in this signal mask while waiting.
    SigMask(&'a libc::sigset_t),
    /// An extended argument. Only valid together with
    /// `EnterFlags::EXT_ARG`.
    Ext(&'a io_uring_getevents_arg),
}

/// The system calls a ring is built from.
///
/// [`Linux`] issues the real ones. The trait is the seam that
/// lets a ring run against something else.
///
/// # Safety
///
/// Rings write through the pointers returned by `map` and
/// read back what the implementation publishes there, so an
/// implementation must return mappings of at least the
/// requested length that stay valid until `unmap`, laid out
/// as described by the offsets it filled in at `setup`.
#[allow(unsafe_code)]
pub unsafe trait Kernel {
    /// `io_uring_setup(2)`.
    fn setup(
        &self,
        entries: u32,
        params: &mut io_uring_params,
    ) -> io::Result<RawFd>;

    /// `mmap(2)` `len` bytes of the ring at `offset`.
    fn map(
        &self,
        fd: RawFd,
        offset: i64,
        len: usize,
    ) -> io::Result<NonNull<u8>>;

    /// `munmap(2)`.
    ///
    /// # Safety
    ///
    /// `ptr` and `len` must come from an earlier `map`, and
    /// nothing may touch the region afterwards.
    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize);

    /// `io_uring_enter(2)`.
    fn enter(
        &self,
        fd: RawFd,
        to_submit: u32,
        min_complete: u32,
        flags: EnterFlags,
        arg: EnterArg<'_>,
    ) -> io::Result<u32>;

    /// `io_uring_register(2)`.
    ///
    /// # Safety
    ///
    /// `arg` must point to whatever `opcode` expects, `nr`
    /// elements long.
    unsafe fn register(
        &self,
        fd: RawFd,
        opcode: u32,
        arg: *const c_void,
        nr: u32,
    ) -> io::Result<u32>;

    /// `madvise(2)` with `MADV_DONTFORK`.
    fn dontfork(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()>;

    /// `close(2)`.
    fn close(&self, fd: RawFd);
}

#[allow(unsafe_code)]
unsafe impl<K: Kernel + ?Sized> Kernel for Arc<K> {
    fn setup(
        &self,
        entries: u32,
        params: &mut io_uring_params,
    ) -> io::Result<RawFd> {
        (**self).setup(entries, params)
    }

    fn map(
        &self,
        fd: RawFd,
        offset: i64,
        len: usize,
    ) -> io::Result<NonNull<u8>> {
        (**self).map(fd, offset, len)
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) {
        (**self).unmap(ptr, len)
    }

    fn enter(
        &self,
        fd: RawFd,
        to_submit: u32,
        min_complete: u32,
        flags: EnterFlags,
        arg: EnterArg<'_>,
    ) -> io::Result<u32> {
        (**self).enter(fd, to_submit, min_complete, flags, arg)
    }

    unsafe fn register(
        &self,
        fd: RawFd,
        opcode: u32,
        arg: *const c_void,
        nr: u32,
    ) -> io::Result<u32> {
        (**self).register(fd, opcode, arg, nr)
    }

    fn dontfork(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        (**self).dontfork(ptr, len)
    }

    fn close(&self, fd: RawFd) {
        (**self).close(fd)
    }
}

/// The running Linux kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct Linux;

fn out_of_range() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        "syscall returned out of range value",
    )
}

fn check(ret: c_long) -> io::Result<u32> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        u32::try_from(ret).map_err(|_| out_of_range())
    }
}

#[allow(unsafe_code)]
unsafe impl Kernel for Linux {
    fn setup(
        &self,
        entries: u32,
        params: &mut io_uring_params,
    ) -> io::Result<RawFd> {
        let params: *mut io_uring_params = params;
        let ret = unsafe {
            syscall(libc::SYS_io_uring_setup, entries as c_long, params)
        };
        RawFd::try_from(check(ret)?).map_err(|_| out_of_range())
    }

    fn map(
        &self,
        fd: RawFd,
        offset: i64,
        len: usize,
    ) -> io::Result<NonNull<u8>> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) {
        libc::munmap(ptr.as_ptr().cast::<c_void>(), len);
    }

    fn enter(
        &self,
        fd: RawFd,
        to_submit: u32,
        min_complete: u32,
        flags: EnterFlags,
        arg: EnterArg<'_>,
    ) -> io::Result<u32> {
        let (arg, argsz) = match arg {
            EnterArg::None => (ptr::null(), KERNEL_SIGSET_SIZE as usize),
            EnterArg::SigMask(set) => (
                ptr::from_ref(set).cast::<c_void>(),
                KERNEL_SIGSET_SIZE as usize,
            ),
            EnterArg::Ext(ext) => (
                ptr::from_ref(ext).cast::<c_void>(),
                size_of::<io_uring_getevents_arg>(),
            ),
        };
        // no EINTR loop here: an interrupted wait is
        // reported to the caller
        let ret = unsafe {
            syscall(
                libc::SYS_io_uring_enter,
                c_long::from(fd),
                to_submit as c_long,
                min_complete as c_long,
                flags.bits() as c_long,
                arg,
                argsz,
            )
        };
        check(ret)
    }

    unsafe fn register(
        &self,
        fd: RawFd,
        opcode: u32,
        arg: *const c_void,
        nr: u32,
    ) -> io::Result<u32> {
        check(syscall(
            libc::SYS_io_uring_register,
            c_long::from(fd),
            opcode as c_long,
            arg,
            nr as c_long,
        ))
    }

    fn dontfork(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        let ret = unsafe {
            libc::madvise(
                ptr.as_ptr().cast::<c_void>(),
                len,
                libc::MADV_DONTFORK,
            )
        };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn close(&self, fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }
}
