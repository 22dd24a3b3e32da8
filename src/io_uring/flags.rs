bitflags::bitflags! {
    /// `IORING_SETUP_*` flags passed to, and echoed back by,
    /// `io_uring_setup`.
    #[repr(transparent)]
    #[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct SetupFlags: u32 {
        /// `IORING_SETUP_IOPOLL`
        const IOPOLL = 1 << 0;
        /// `IORING_SETUP_SQPOLL`
        const SQPOLL = 1 << 1;
        /// `IORING_SETUP_SQ_AFF`
        const SQ_AFF = 1 << 2;
        /// `IORING_SETUP_CQSIZE`
        const CQSIZE = 1 << 3;
        /// `IORING_SETUP_CLAMP`
        const CLAMP = 1 << 4;
        /// `IORING_SETUP_ATTACH_WQ`
        const ATTACH_WQ = 1 << 5;
        /// `IORING_SETUP_R_DISABLED`
        const R_DISABLED = 1 << 6;

        // newer kernels may hand back bits we don't name
        const _ = !0;
    }
}

bitflags::bitflags! {
    /// `IORING_FEAT_*` flags reported by the kernel at setup.
    #[repr(transparent)]
    #[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct FeatureFlags: u32 {
        /// `IORING_FEAT_SINGLE_MMAP`: the SQ and CQ rings share
        /// one mapping.
        const SINGLE_MMAP = 1 << 0;
        /// `IORING_FEAT_NODROP`
        const NODROP = 1 << 1;
        /// `IORING_FEAT_SUBMIT_STABLE`
        const SUBMIT_STABLE = 1 << 2;
        /// `IORING_FEAT_RW_CUR_POS`
        const RW_CUR_POS = 1 << 3;
        /// `IORING_FEAT_CUR_PERSONALITY`
        const CUR_PERSONALITY = 1 << 4;
        /// `IORING_FEAT_FAST_POLL`
        const FAST_POLL = 1 << 5;
        /// `IORING_FEAT_POLL_32BITS`
        const POLL_32BITS = 1 << 6;
        /// `IORING_FEAT_SQPOLL_NONFIXED`
        const SQPOLL_NONFIXED = 1 << 7;
        /// `IORING_FEAT_EXT_ARG`: `io_uring_enter` accepts an
        /// `io_uring_getevents_arg` carrying a timeout.
        const EXT_ARG = 1 << 8;
        /// `IORING_FEAT_NATIVE_WORKERS`
        const NATIVE_WORKERS = 1 << 9;
        /// `IORING_FEAT_RSRC_TAGS`
        const RSRC_TAGS = 1 << 10;

        const _ = !0;
    }
}

bitflags::bitflags! {
    /// `IORING_ENTER_*` flags for `io_uring_enter`.
    #[repr(transparent)]
    #[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct EnterFlags: u32 {
        /// `IORING_ENTER_GETEVENTS`
        const GETEVENTS = 1 << 0;
        /// `IORING_ENTER_SQ_WAKEUP`
        const SQ_WAKEUP = 1 << 1;
        /// `IORING_ENTER_SQ_WAIT`
        const SQ_WAIT = 1 << 2;
        /// `IORING_ENTER_EXT_ARG`
        const EXT_ARG = 1 << 3;
    }
}

bitflags::bitflags! {
    /// `IOSQE_*` per-entry flags.
    #[repr(transparent)]
    #[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct SqeFlags: u8 {
        /// `IOSQE_FIXED_FILE`: `fd` is an index into the
        /// registered file table.
        const FIXED_FILE = 1 << 0;
        /// `IOSQE_IO_DRAIN`: wait for everything submitted
        /// before this entry to complete before starting it.
        const IO_DRAIN = 1 << 1;
        /// `IOSQE_IO_LINK`: the next entry waits for this one.
        const IO_LINK = 1 << 2;
        /// `IOSQE_IO_HARDLINK`: like `IO_LINK`, but the chain
        /// survives a failure of this entry.
        const IO_HARDLINK = 1 << 3;
        /// `IOSQE_ASYNC`
        const ASYNC = 1 << 4;
        /// `IOSQE_BUFFER_SELECT`
        const BUFFER_SELECT = 1 << 5;
    }
}

bitflags::bitflags! {
    /// `IORING_SQ_*` flags the kernel sets in the SQ ring.
    #[repr(transparent)]
    #[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct SqFlags: u32 {
        /// `IORING_SQ_NEED_WAKEUP`: the SQPOLL thread went idle.
        const NEED_WAKEUP = 1 << 0;
        /// `IORING_SQ_CQ_OVERFLOW`: completions are backlogged
        /// in the kernel.
        const CQ_OVERFLOW = 1 << 1;

        const _ = !0;
    }
}

bitflags::bitflags! {
    /// `IORING_FSYNC_*` flags.
    #[repr(transparent)]
    #[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct FsyncFlags: u32 {
        /// `IORING_FSYNC_DATASYNC`
        const DATASYNC = 1 << 0;
    }
}

bitflags::bitflags! {
    /// `IORING_TIMEOUT_*` flags.
    #[repr(transparent)]
    #[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct TimeoutFlags: u32 {
        /// `IORING_TIMEOUT_ABS`
        const ABS = 1 << 0;
    }
}
