use std::{
    io,
    os::unix::io::{AsRawFd, RawFd},
    ptr,
};

use libc::c_void;

use super::{
    constants::*, io_uring_files_update, io_uring_probe_buf,
    kernel_types::PROBE_OPS, Kernel, Probe, Uring,
};
use crate::{Error, Result};

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Registration calls. These don't touch the rings, they
/// change kernel-side state that submissions can refer to.
#[allow(clippy::multiple_inherent_impl)]
impl<K: Kernel> Uring<K> {
    #[allow(unsafe_code)]
    unsafe fn register(
        &self,
        op: &'static str,
        opcode: u32,
        arg: *const c_void,
        nr: u32,
    ) -> Result<u32> {
        log::debug!("io_uring_register({}) on fd {}", op, self.as_raw_fd());
        self.kernel()
            .register(self.as_raw_fd(), opcode, arg, nr)
            .map_err(|source| Error::Register { op, source })
    }

    /// Ask the kernel which operations it supports.
    #[allow(unsafe_code)]
    pub fn probe(&self) -> Result<Probe> {
        let mut buf = Box::<io_uring_probe_buf>::default();
        let raw: *mut io_uring_probe_buf = &mut *buf;
        unsafe {
            self.register(
                "probe",
                IORING_REGISTER_PROBE,
                raw.cast::<c_void>(),
                len_u32(PROBE_OPS),
            )?;
        }
        Ok(Probe::from_raw(&buf))
    }

    /// Register fixed buffers, for use by `ReadFixed` and
    /// `WriteFixed`.
    ///
    /// # Safety
    ///
    /// The memory the iovecs describe must stay valid until
    /// the buffers are unregistered or the ring is dropped.
    #[allow(unsafe_code)]
    pub unsafe fn register_buffers(
        &self,
        iovecs: &[libc::iovec],
    ) -> Result<()> {
        self.register(
            "buffers",
            IORING_REGISTER_BUFFERS,
            iovecs.as_ptr().cast::<c_void>(),
            len_u32(iovecs.len()),
        )?;
        Ok(())
    }

    /// Drop the registered buffers.
    #[allow(unsafe_code)]
    pub fn unregister_buffers(&self) -> Result<()> {
        unsafe {
            self.register(
                "unregister buffers",
                IORING_UNREGISTER_BUFFERS,
                ptr::null(),
                0,
            )?;
        }
        Ok(())
    }

    /// Register a fixed file table, for use with
    /// `SqeFlags::FIXED_FILE`. A `-1` leaves a hole to be
    /// filled by [`register_files_update`](Uring::register_files_update).
    #[allow(unsafe_code)]
    pub fn register_files(&self, fds: &[RawFd]) -> Result<()> {
        unsafe {
            self.register(
                "files",
                IORING_REGISTER_FILES,
                fds.as_ptr().cast::<c_void>(),
                len_u32(fds.len()),
            )?;
        }
        Ok(())
    }

    /// Replace entries of the fixed file table starting at
    /// `offset`. Returns how many were updated.
    #[allow(unsafe_code)]
    pub fn register_files_update(
        &self,
        offset: u32,
        fds: &[RawFd],
    ) -> Result<u32> {
        let update = io_uring_files_update {
            offset,
            resv: 0,
            fds: fds.as_ptr() as u64,
        };
        unsafe {
            self.register(
                "files update",
                IORING_REGISTER_FILES_UPDATE,
                ptr::from_ref(&update).cast::<c_void>(),
                len_u32(fds.len()),
            )
        }
    }

    /// Drop the fixed file table.
    #[allow(unsafe_code)]
    pub fn unregister_files(&self) -> Result<()> {
        unsafe {
            self.register(
                "unregister files",
                IORING_UNREGISTER_FILES,
                ptr::null(),
                0,
            )?;
        }
        Ok(())
    }

    /// Signal `eventfd` whenever a completion is posted.
    #[allow(unsafe_code)]
    pub fn register_eventfd(&self, eventfd: RawFd) -> Result<()> {
        unsafe {
            self.register(
                "eventfd",
                IORING_REGISTER_EVENTFD,
                ptr::from_ref(&eventfd).cast::<c_void>(),
                1,
            )?;
        }
        Ok(())
    }

    /// Signal `eventfd` only for completions of operations
    /// that went async.
    #[allow(unsafe_code)]
    pub fn register_eventfd_async(&self, eventfd: RawFd) -> Result<()> {
        unsafe {
            self.register(
                "eventfd async",
                IORING_REGISTER_EVENTFD_ASYNC,
                ptr::from_ref(&eventfd).cast::<c_void>(),
                1,
            )?;
        }
        Ok(())
    }

    /// Stop signalling the registered eventfd.
    #[allow(unsafe_code)]
    pub fn unregister_eventfd(&self) -> Result<()> {
        unsafe {
            self.register(
                "unregister eventfd",
                IORING_UNREGISTER_EVENTFD,
                ptr::null(),
                0,
            )?;
        }
        Ok(())
    }

    /// Register the current credentials, returning an id to
    /// pass to [`Sqe::personality`](crate::Sqe::personality).
    #[allow(unsafe_code)]
    pub fn register_personality(&self) -> Result<u16> {
        let id = unsafe {
            self.register(
                "personality",
                IORING_REGISTER_PERSONALITY,
                ptr::null(),
                0,
            )?
        };
        u16::try_from(id).map_err(|_| Error::Register {
            op: "personality",
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!("personality id {} does not fit in 16 bits", id),
            ),
        })
    }

    /// Drop a registered personality.
    #[allow(unsafe_code)]
    pub fn unregister_personality(&self, id: u16) -> Result<()> {
        unsafe {
            self.register(
                "unregister personality",
                IORING_UNREGISTER_PERSONALITY,
                ptr::null(),
                u32::from(id),
            )?;
        }
        Ok(())
    }
}
