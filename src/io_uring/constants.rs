// mmap offsets
pub(crate) const IORING_OFF_SQ_RING: i64 = 0;
pub(crate) const IORING_OFF_CQ_RING: i64 = 0x0800_0000;
pub(crate) const IORING_OFF_SQES: i64 = 0x1000_0000;

pub(crate) const IORING_MAX_ENTRIES: u32 = 32768;

// io_uring_register opcodes
pub(crate) const IORING_REGISTER_BUFFERS: u32 = 0;
pub(crate) const IORING_UNREGISTER_BUFFERS: u32 = 1;
pub(crate) const IORING_REGISTER_FILES: u32 = 2;
pub(crate) const IORING_UNREGISTER_FILES: u32 = 3;
pub(crate) const IORING_REGISTER_EVENTFD: u32 = 4;
pub(crate) const IORING_UNREGISTER_EVENTFD: u32 = 5;
pub(crate) const IORING_REGISTER_FILES_UPDATE: u32 = 6;
pub(crate) const IORING_REGISTER_EVENTFD_ASYNC: u32 = 7;
pub(crate) const IORING_REGISTER_PROBE: u32 = 8;
pub(crate) const IORING_REGISTER_PERSONALITY: u32 = 9;
pub(crate) const IORING_UNREGISTER_PERSONALITY: u32 = 10;

pub(crate) const IO_URING_OP_SUPPORTED: u16 = 1;

// the kernel wants _NSIG / 8, not size_of::<sigset_t>()
pub(crate) const KERNEL_SIGSET_SIZE: u32 = 8;

/// The `user_data` value this crate reserves for the internal
/// timeout it queues when waiting with a timeout on kernels
/// without `IORING_FEAT_EXT_ARG`. Completions carrying this
/// tag are consumed by the waiting functions and never
/// returned to the caller from them.
pub const LIBURING_UDATA_TIMEOUT: u64 = u64::MAX;
