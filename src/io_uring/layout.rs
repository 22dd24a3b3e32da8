use std::{mem::size_of, os::unix::io::RawFd, ptr::NonNull};

use log::debug;

use super::{
    constants::{IORING_OFF_CQ_RING, IORING_OFF_SQES, IORING_OFF_SQ_RING},
    flags::FeatureFlags,
    io_cqring_offsets, io_sqring_offsets, io_uring_cqe, io_uring_params,
    io_uring_sqe, Kernel,
};
use crate::{Error, Result};

/// Where everything lives, resolved once from what the kernel
/// filled into `io_uring_params`. Nothing after setup looks at
/// which layout the kernel chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RingLayout {
    pub(crate) single_mmap: bool,
    pub(crate) sq_entries: u32,
    pub(crate) cq_entries: u32,
    pub(crate) sq_ring_len: usize,
    pub(crate) cq_ring_len: usize,
    pub(crate) sqes_len: usize,
    pub(crate) sq_off: io_sqring_offsets,
    pub(crate) cq_off: io_cqring_offsets,
}

impl RingLayout {
    pub(crate) fn resolve(params: &io_uring_params) -> RingLayout {
        let single_mmap = FeatureFlags::from_bits_retain(params.features)
            .contains(FeatureFlags::SINGLE_MMAP);

        let mut sq_ring_len = params.sq_off.array as usize
            + params.sq_entries as usize * size_of::<u32>();
        let mut cq_ring_len = params.cq_off.cqes as usize
            + params.cq_entries as usize * size_of::<io_uring_cqe>();
        let sqes_len =
            params.sq_entries as usize * size_of::<io_uring_sqe>();

        if single_mmap {
            let len = sq_ring_len.max(cq_ring_len);
            sq_ring_len = len;
            cq_ring_len = len;
        }

        RingLayout {
            single_mmap,
            sq_entries: params.sq_entries,
            cq_entries: params.cq_entries,
            sq_ring_len,
            cq_ring_len,
            sqes_len,
            sq_off: params.sq_off,
            cq_off: params.cq_off,
        }
    }

    /// Maps the SQ ring, the CQ ring (legacy layout only) and
    /// the SQE array, in that order.
    pub(crate) fn map<K: Kernel>(
        &self,
        guard: &mut SetupGuard<'_, K>,
    ) -> Result<RingPointers> {
        let sq_ring =
            guard.map(IORING_OFF_SQ_RING, self.sq_ring_len, "sq ring")?;
        let cq_ring = if self.single_mmap {
            sq_ring
        } else {
            guard.map(IORING_OFF_CQ_RING, self.cq_ring_len, "cq ring")?
        };
        let sqes = guard.map(IORING_OFF_SQES, self.sqes_len, "sqes")?;

        debug!(
            "mapped io_uring fd {} with {} layout: sq {} entries, \
             cq {} entries",
            guard.fd,
            if self.single_mmap { "single-mmap" } else { "legacy" },
            self.sq_entries,
            self.cq_entries,
        );

        Ok(RingPointers { sq_ring, cq_ring, sqes })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RingPointers {
    pub(crate) sq_ring: NonNull<u8>,
    pub(crate) cq_ring: NonNull<u8>,
    pub(crate) sqes: NonNull<u8>,
}

/// One `mmap`ed region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Region {
    pub(crate) ptr: NonNull<u8>,
    pub(crate) len: usize,
}

/// Unmaps everything mapped so far, in reverse order, and
/// closes the ring fd, unless setup got far enough to
/// `disarm` it.
pub(crate) struct SetupGuard<'k, K: Kernel> {
    kernel: &'k K,
    fd: RawFd,
    regions: Vec<Region>,
    armed: bool,
}

impl<'k, K: Kernel> SetupGuard<'k, K> {
    pub(crate) fn new(kernel: &'k K, fd: RawFd) -> SetupGuard<'k, K> {
        SetupGuard { kernel, fd, regions: Vec::with_capacity(3), armed: true }
    }

    fn map(
        &mut self,
        offset: i64,
        len: usize,
        region: &'static str,
    ) -> Result<NonNull<u8>> {
        let ptr = self
            .kernel
            .map(self.fd, offset, len)
            .map_err(|source| Error::Map { region, source })?;
        self.regions.push(Region { ptr, len });
        Ok(ptr)
    }

    pub(crate) fn disarm(mut self) -> (RawFd, Vec<Region>) {
        self.armed = false;
        (self.fd, std::mem::take(&mut self.regions))
    }
}

impl<K: Kernel> Drop for SetupGuard<'_, K> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!("tearing down partially set up io_uring fd {}", self.fd);
        for region in self.regions.drain(..).rev() {
            unsafe {
                self.kernel.unmap(region.ptr, region.len);
            }
        }
        self.kernel.close(self.fd);
    }
}
