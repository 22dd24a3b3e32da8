use std::{
    io,
    os::unix::io::{AsRawFd, RawFd},
    ptr,
    sync::atomic::{fence, Ordering::SeqCst},
    time::Duration,
};

use log::{debug, trace, warn};

use super::{
    constants::{KERNEL_SIGSET_SIZE, LIBURING_UDATA_TIMEOUT},
    cq::{Completions, Cq},
    flags::{EnterFlags, FeatureFlags, SetupFlags, SqFlags, TimeoutFlags},
    io_uring_cqe, io_uring_getevents_arg, io_uring_params,
    layout::Region,
    sq::{Sq, Sqe},
    Config, EnterArg, Kernel, Linux, Op, Timespec,
};
use crate::{Error, Metrics, Result};

/// Nice bindings for the shiny new linux IO system.
///
/// A `Uring` owns the ring fd and its shared mappings, and
/// tears them down when dropped. All ring manipulation takes
/// `&mut self`: one ring is driven from one thread at a time.
#[derive(Debug)]
pub struct Uring<K: Kernel = Linux> {
    sq: Sq,
    cq: Cq,
    regions: Vec<Region>,
    ring_fd: RawFd,
    flags: SetupFlags,
    features: FeatureFlags,
    config: Config,
    metrics: Metrics,
    seen_dropped: u32,
    seen_overflow: u32,
    kernel: K,
}

#[allow(unsafe_code)]
unsafe impl<K: Kernel + Send> Send for Uring<K> {}

impl<K: Kernel> Drop for Uring<K> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        if self.config.print_profile_on_drop {
            self.metrics.print_profile();
        }
        debug!("closing io_uring fd {}", self.ring_fd);
        for region in self.regions.drain(..).rev() {
            unsafe {
                self.kernel.unmap(region.ptr, region.len);
            }
        }
        self.kernel.close(self.ring_fd);
    }
}

impl<K: Kernel> AsRawFd for Uring<K> {
    fn as_raw_fd(&self) -> RawFd {
        self.ring_fd
    }
}

impl<K: Kernel> Uring<K> {
    pub(crate) fn new(
        kernel: K,
        config: Config,
        params: &io_uring_params,
        ring_fd: RawFd,
        regions: Vec<Region>,
        sq: Sq,
        cq: Cq,
    ) -> Uring<K> {
        Uring {
            sq,
            cq,
            regions,
            ring_fd,
            flags: SetupFlags::from_bits_retain(params.flags),
            features: FeatureFlags::from_bits_retain(params.features),
            config,
            metrics: Metrics::default(),
            seen_dropped: 0,
            seen_overflow: 0,
            kernel,
        }
    }

    /// Unmap the rings and close the fd. Same as dropping.
    pub fn exit(self) {}

    /// The setup flags the ring was created with.
    pub fn setup_flags(&self) -> SetupFlags {
        self.flags
    }

    /// The features the kernel reported.
    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    /// The negotiated submission queue size.
    pub fn sq_entries(&self) -> u32 {
        self.sq.entries()
    }

    /// The negotiated completion queue size.
    pub fn cq_entries(&self) -> u32 {
        self.cq.entries()
    }

    /// This ring's call counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub(crate) fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Claim a free submission queue entry, or `None` if the
    /// kernel hasn't caught up with the ones already pushed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rill::Op;
    ///
    /// let mut ring = rill::new()?;
    /// let sqe = ring.get_sqe().expect("fresh ring has room");
    /// unsafe { sqe.prep(Op::Nop).user_data(1).push() };
    /// ring.submit_and_wait(1)?;
    /// assert_eq!(ring.wait_cqe()?.user_data(), 1);
    /// ring.cqe_seen();
    /// # Ok::<(), rill::Error>(())
    /// ```
    pub fn get_sqe(&mut self) -> Option<Sqe<'_>> {
        let slot = self.sq.next_slot()?;
        Some(Sqe::new(&mut self.sq, slot))
    }

    /// Entries pushed but not yet consumed by the kernel.
    pub fn sq_ready(&self) -> u32 {
        self.sq.ready()
    }

    /// Entries that can be pushed before the queue is full.
    pub fn sq_space_left(&self) -> u32 {
        self.sq.space_left()
    }

    /// Entries the kernel dropped as invalid.
    pub fn sq_dropped(&self) -> u32 {
        self.sq.dropped()
    }

    /// Completions waiting to be reaped.
    pub fn cq_ready(&self) -> u32 {
        self.cq.ready()
    }

    /// Completions the kernel could not post because the
    /// completion queue was full.
    pub fn cq_overflow(&self) -> u32 {
        self.cq.overflow()
    }

    /// Up to `max` buffered completions, oldest first. Does
    /// not consume them.
    pub fn peek_batch(&self, max: usize) -> Completions<'_> {
        self.cq.batch(max)
    }

    /// Every buffered completion, oldest first. Does not
    /// consume them.
    pub fn completions(&self) -> Completions<'_> {
        self.cq.batch(usize::MAX)
    }

    /// Hand `n` completions back to the kernel.
    pub fn cq_advance(&mut self, n: u32) {
        self.cq.advance(n);
        self.metrics.bump_reaped(u64::from(n));
    }

    /// Hand the oldest completion back to the kernel.
    pub fn cqe_seen(&mut self) {
        self.cq_advance(1);
    }

    fn sq_needs_wakeup(&self) -> bool {
        // pairs with the kernel setting NEED_WAKEUP after
        // it last looked at the tail
        fence(SeqCst);
        self.sq.flags().contains(SqFlags::NEED_WAKEUP)
    }

    fn cq_needs_flush(&self) -> bool {
        self.sq.flags().contains(SqFlags::CQ_OVERFLOW)
    }

    // without SQPOLL we always have to enter to submit
    fn sq_needs_enter(&self, flags: &mut EnterFlags) -> bool {
        if !self.flags.contains(SetupFlags::SQPOLL) {
            return true;
        }
        if self.sq_needs_wakeup() {
            *flags |= EnterFlags::SQ_WAKEUP;
            return true;
        }
        false
    }

    fn enter(
        &mut self,
        to_submit: u32,
        min_complete: u32,
        flags: EnterFlags,
        arg: EnterArg<'_>,
    ) -> Result<u32> {
        trace!(
            "io_uring_enter fd {} to_submit {} min_complete {} flags {:?}",
            self.ring_fd,
            to_submit,
            min_complete,
            flags
        );
        self.metrics.bump_enter_calls(1);
        let res = self.kernel.enter(
            self.ring_fd,
            to_submit,
            min_complete,
            flags,
            arg,
        );

        let dropped = self.sq.dropped();
        if dropped != self.seen_dropped {
            warn!(
                "kernel dropped {} invalid submissions on io_uring fd {}",
                dropped.wrapping_sub(self.seen_dropped),
                self.ring_fd
            );
            self.seen_dropped = dropped;
        }
        let overflow = self.cq.overflow();
        if overflow != self.seen_overflow {
            warn!(
                "completion queue of io_uring fd {} overflowed, {} \
                 completions lost",
                self.ring_fd,
                overflow.wrapping_sub(self.seen_overflow)
            );
            self.seen_overflow = overflow;
        }

        let consumed = res.map_err(Error::enter)?;
        self.metrics.bump_submitted(u64::from(consumed));
        Ok(consumed)
    }

    /// Submit everything pushed so far without waiting.
    /// Returns how many entries the kernel consumed.
    pub fn submit(&mut self) -> Result<u32> {
        self.submit_and_wait(0)
    }

    /// Submit everything pushed so far, and wait until at
    /// least `wait_nr` completions are available.
    ///
    /// Returns how many entries the kernel consumed, which may
    /// be fewer than were pushed. The rest stay queued for the
    /// next submit.
    pub fn submit_and_wait(&mut self, wait_nr: u32) -> Result<u32> {
        let to_submit = self.sq.ready();
        let mut flags = EnterFlags::empty();

        let cq_needs_flush = self.cq_needs_flush();
        let need_enter = (to_submit > 0 && self.sq_needs_enter(&mut flags))
            || wait_nr > 0
            || cq_needs_flush;

        if !need_enter {
            // with SQPOLL the kernel thread picks these up
            return Ok(to_submit);
        }

        if wait_nr > 0
            || self.flags.contains(SetupFlags::IOPOLL)
            || cq_needs_flush
        {
            flags |= EnterFlags::GETEVENTS;
        }

        self.enter(to_submit, wait_nr, flags, EnterArg::None)
    }

    // Consumes our own timeout completions from the head of
    // the queue, returning how many completions are left.
    fn skip_internal_timeouts(&mut self) -> Result<u32> {
        loop {
            let (user_data, res) = match self.cq.peek() {
                Some(cqe) => (cqe.user_data, cqe.res),
                None => return Ok(0),
            };
            if user_data != LIBURING_UDATA_TIMEOUT {
                return Ok(self.cq.ready());
            }
            self.cq_advance(1);
            if res == -libc::ETIME {
                return Err(Error::TimedOut);
            }
            if res < 0 {
                return Err(Error::Enter(io::Error::from_raw_os_error(-res)));
            }
        }
    }

    /// The oldest completion, if there is one. Does not
    /// consume it.
    ///
    /// Fails with [`Error::TimedOut`] if the head of the queue
    /// is a timeout left behind by an earlier timed wait (see
    /// [`wait_cqes`](Uring::wait_cqes)). That completion is
    /// consumed, so the next call looks past it.
    pub fn peek_cqe(&mut self) -> Result<Option<&io_uring_cqe>> {
        self.skip_internal_timeouts()?;
        Ok(self.cq.peek())
    }

    /// Wait for a completion and return the oldest one. Does
    /// not consume it.
    pub fn wait_cqe(&mut self) -> Result<&io_uring_cqe> {
        self.wait_cqes(1, None, None)
    }

    /// Wait until at least `wait_nr` completions are
    /// available and return the oldest one.
    pub fn wait_cqe_nr(&mut self, wait_nr: u32) -> Result<&io_uring_cqe> {
        self.wait_cqes(wait_nr, None, None)
    }

    /// Like [`wait_cqe`](Uring::wait_cqe), giving up with
    /// [`Error::TimedOut`] after `timeout`.
    pub fn wait_cqe_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<&io_uring_cqe> {
        self.wait_cqes(1, Some(timeout), None)
    }

    /// Wait until at least `wait_nr` completions are
    /// available, or `timeout` elapses, with `sigmask` as the
    /// signal mask while blocked. Returns the oldest
    /// completion without consuming it.
    ///
    /// On kernels without `IORING_FEAT_EXT_ARG` a timeout is
    /// implemented by queueing a timeout entry tagged
    /// [`LIBURING_UDATA_TIMEOUT`], which also submits
    /// everything pushed so far. Its completion is consumed
    /// here and never returned. The timeout counts `wait_nr`
    /// completions, so when the wait ends some other way it
    /// stays armed. If it later expires, the next `peek_cqe` or
    /// `wait_*` call to reach its completion fails once with
    /// [`Error::TimedOut`], even if that call has no timeout of
    /// its own.
    pub fn wait_cqes(
        &mut self,
        wait_nr: u32,
        timeout: Option<Duration>,
        sigmask: Option<&libc::sigset_t>,
    ) -> Result<&io_uring_cqe> {
        let wait_nr = wait_nr.max(1);

        let available = self.skip_internal_timeouts()?;
        if available >= wait_nr && !self.cq_needs_flush() {
            self.metrics.bump_fast_path_waits(1);
            return self.head_cqe();
        }
        self.metrics.bump_blocking_waits(1);

        // must outlive the enter that submits the timeout
        let ts = timeout.map(Timespec::from);
        let mut to_submit = 0;
        let mut ext_arg = None;
        if let Some(ts) = &ts {
            if self.features.contains(FeatureFlags::EXT_ARG) {
                ext_arg = Some(io_uring_getevents_arg {
                    sigmask: sigmask
                        .map_or(0, |set| ptr::from_ref(set) as u64),
                    sigmask_sz: KERNEL_SIGSET_SIZE,
                    pad: 0,
                    ts: ptr::from_ref(ts) as u64,
                });
            } else {
                self.queue_internal_timeout(ts, wait_nr)?;
                to_submit = self.sq.ready();
            }
        }

        let (arg, ext_flag) = match (&ext_arg, sigmask) {
            (Some(ext), _) => (EnterArg::Ext(ext), EnterFlags::EXT_ARG),
            (None, Some(set)) => (EnterArg::SigMask(set), EnterFlags::empty()),
            (None, None) => (EnterArg::None, EnterFlags::empty()),
        };

        loop {
            let available = self.skip_internal_timeouts()?;
            let mut flags = EnterFlags::empty();
            let mut need_enter = false;

            if wait_nr > available || self.cq_needs_flush() {
                flags |= EnterFlags::GETEVENTS | ext_flag;
                need_enter = true;
            }
            if to_submit > 0 && self.sq_needs_enter(&mut flags) {
                need_enter = true;
            }
            if !need_enter {
                break;
            }

            let consumed = self.enter(to_submit, wait_nr, flags, arg)?;
            to_submit -= consumed.min(to_submit);

            if available > 0 {
                break;
            }
        }

        self.head_cqe()
    }

    fn head_cqe(&self) -> Result<&io_uring_cqe> {
        self.cq.peek().ok_or_else(|| {
            Error::Enter(io::Error::from_raw_os_error(libc::EAGAIN))
        })
    }

    #[allow(unsafe_code)]
    fn queue_internal_timeout(
        &mut self,
        ts: &Timespec,
        wait_nr: u32,
    ) -> Result<()> {
        if self.sq.space_left() == 0 {
            self.submit()?;
        }
        let sqe = self.get_sqe().ok_or(Error::SubmissionQueueFull)?;
        let op = Op::Timeout {
            ts,
            count: wait_nr,
            flags: TimeoutFlags::empty(),
        };
        // the kernel copies the timespec when it consumes
        // the entry in the enter that follows
        unsafe { sqe.prep(op).user_data(LIBURING_UDATA_TIMEOUT).push() };
        Ok(())
    }

    /// Advise the kernel not to share the ring mappings with
    /// forked children.
    pub fn dontfork(&self) -> io::Result<()> {
        for region in &self.regions {
            self.kernel.dontfork(region.ptr, region.len)?;
        }
        Ok(())
    }
}
