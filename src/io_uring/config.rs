use std::time::Duration;

use log::debug;

use super::{
    constants::IORING_MAX_ENTRIES,
    cq::Cq,
    flags::SetupFlags,
    io_uring_params,
    layout::{RingLayout, SetupGuard},
    sq::Sq,
    Kernel, Linux, Uring,
};
use crate::{Error, Result};

/// Configuration for the underlying `io_uring` system.
#[derive(Clone, Debug, Copy)]
pub struct Config {
    /// The number of entries in the submission queue. The
    /// kernel rounds this up to a power of two.
    pub depth: u32,
    /// The number of entries in the completion queue. By
    /// default, the kernel will choose a completion queue
    /// that is 2x the submission queue's size.
    pub cq_depth: Option<u32>,
    /// Enable `SQPOLL` mode, which spawns a kernel
    /// thread that polls for submissions without
    /// needing to block as often to submit.
    ///
    /// This is a privileged operation on older kernels, and
    /// will cause `start` to fail if run by a
    /// non-privileged user.
    pub sq_poll: bool,
    /// Specify a particular CPU to pin the
    /// `SQPOLL` thread onto.
    pub sq_poll_affinity: Option<u32>,
    /// How long the `SQPOLL` thread spins before going idle.
    pub sq_poll_idle: Option<Duration>,
    /// Busy-poll for completions instead of relying on
    /// interrupts. Only works for `O_DIRECT` files on
    /// devices that support polling.
    pub io_poll: bool,
    /// Clamp `depth` and `cq_depth` to the kernel maximum
    /// instead of failing.
    pub clamp: bool,
    /// Log the ring's call counters when it is dropped.
    pub print_profile_on_drop: bool,
    /// setting `raw_params` overrides everything else
    /// except `depth`
    pub raw_params: Option<io_uring_params>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            depth: 256,
            cq_depth: None,
            sq_poll: false,
            sq_poll_affinity: None,
            sq_poll_idle: None,
            io_poll: false,
            clamp: false,
            print_profile_on_drop: false,
            raw_params: None,
        }
    }
}

impl Config {
    fn params(&self) -> io_uring_params {
        if let Some(params) = self.raw_params {
            return params;
        }

        let mut params = io_uring_params::default();
        let mut flags = SetupFlags::empty();

        if let Some(cq_depth) = self.cq_depth {
            flags |= SetupFlags::CQSIZE;
            params.cq_entries = cq_depth;
        }
        if self.sq_poll {
            flags |= SetupFlags::SQPOLL;
            if let Some(cpu) = self.sq_poll_affinity {
                flags |= SetupFlags::SQ_AFF;
                params.sq_thread_cpu = cpu;
            }
            if let Some(idle) = self.sq_poll_idle {
                params.sq_thread_idle =
                    u32::try_from(idle.as_millis()).unwrap_or(u32::MAX);
            }
        }
        if self.io_poll {
            flags |= SetupFlags::IOPOLL;
        }
        if self.clamp {
            flags |= SetupFlags::CLAMP;
        }

        params.flags = flags.bits();
        params
    }

    /// Start the ring on the running kernel.
    pub fn start(self) -> Result<Uring> {
        self.start_with(Linux)
    }

    /// Start the ring on the given [`Kernel`].
    #[allow(unsafe_code)]
    pub fn start_with<K: Kernel>(self, kernel: K) -> Result<Uring<K>> {
        let mut params = self.params();
        let clamp = SetupFlags::from_bits_retain(params.flags)
            .contains(SetupFlags::CLAMP);
        if self.depth == 0 || (self.depth > IORING_MAX_ENTRIES && !clamp) {
            return Err(Error::InvalidEntries(self.depth));
        }

        let fd = kernel.setup(self.depth, &mut params).map_err(Error::setup)?;
        let mut guard = SetupGuard::new(&kernel, fd);

        let layout = RingLayout::resolve(&params);
        let pointers = layout.map(&mut guard)?;

        // the mappings now belong to the regions the ring
        // unmaps on drop
        let (sq, cq) = unsafe {
            (
                Sq::new(pointers.sq_ring, pointers.sqes, &layout),
                Cq::new(pointers.cq_ring, &layout),
            )
        };
        let (fd, regions) = guard.disarm();

        debug!(
            "started io_uring fd {}: {} sq entries, {} cq entries, \
             features {:?}",
            fd, layout.sq_entries, layout.cq_entries, params.features,
        );

        Ok(Uring::new(kernel, self, &params, fd, regions, sq, cq))
    }
}
