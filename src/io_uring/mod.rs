mod config;
mod constants;
mod cq;
mod flags;
mod kernel_types;
mod layout;
mod ops;
mod probe;
mod register;
mod sq;
mod syscall;
mod uring;

#[cfg(test)]
mod sim;


pub use self::{
    config::Config,
    constants::LIBURING_UDATA_TIMEOUT,
    cq::Completions,
    flags::{
        EnterFlags, FeatureFlags, FsyncFlags, SetupFlags, SqFlags, SqeFlags,
        TimeoutFlags,
    },
    kernel_types::{
        io_cqring_offsets, io_sqring_offsets, io_uring_cqe,
        io_uring_getevents_arg, io_uring_params, io_uring_sqe, Timespec,
    },
    ops::{Op, Opcode},
    probe::Probe,
    sq::Sqe,
    syscall::{EnterArg, Kernel, Linux},
    uring::Uring,
};

pub(crate) use self::kernel_types::{
    io_uring_files_update, io_uring_probe_buf,
};

use crate::Result;

/// Ask `kernel` which operations it supports, through a
/// short-lived two-entry ring that is torn down again whatever
/// the outcome.
pub fn probe_with<K: Kernel>(kernel: K) -> Result<Probe> {
    let ring = Config { depth: 2, ..Config::default() }.start_with(kernel)?;
    ring.probe()
}
