use std::io;

use thiserror::Error;

/// Everything that can go wrong while talking to the ring.
///
/// Failures of the operations themselves are not in here.
/// Those come back in [`Cqe::result`](crate::Cqe::result).
#[derive(Debug, Error)]
pub enum Error {
    /// The requested number of entries is zero, or above the
    /// kernel maximum and `clamp` was not requested.
    #[error("invalid number of ring entries: {0}")]
    InvalidEntries(u32),
    /// `io_uring_setup` failed.
    #[error("failed to set up io_uring: {0}")]
    Setup(#[source] io::Error),
    /// `io_uring_setup` failed with `ENOMEM`.
    #[error(
        "not enough lockable memory to set up io_uring. You probably \
         need to raise the memlock rlimit, which often defaults to a \
         pretty low number"
    )]
    Memlock,
    /// Mapping one of the shared regions failed.
    #[error("failed to mmap the {region}: {source}")]
    Map {
        /// Which region was being mapped.
        region: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// `io_uring_enter` failed with something other than
    /// `EINTR` or `ETIME`.
    #[error("failed to enter io_uring: {0}")]
    Enter(#[source] io::Error),
    /// A signal arrived before enough completions did.
    #[error("interrupted while waiting for completions")]
    Interrupted,
    /// The wait timeout elapsed before enough completions arrived.
    #[error("timed out waiting for completions")]
    TimedOut,
    /// An `io_uring_register` call failed.
    #[error("io_uring_register({op}) failed: {source}")]
    Register {
        /// The registration operation that failed.
        op: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The library needed a submission slot for its own use
    /// (a wait timeout on older kernels) and none was free.
    #[error("no free submission queue entry")]
    SubmissionQueueFull,
}

/// A `Result` with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn setup(err: io::Error) -> Error {
        if err.raw_os_error() == Some(libc::ENOMEM) {
            Error::Memlock
        } else {
            Error::Setup(err)
        }
    }

    pub(crate) fn enter(err: io::Error) -> Error {
        match err.raw_os_error() {
            Some(libc::EINTR) => Error::Interrupted,
            Some(libc::ETIME) => Error::TimedOut,
            _ => Error::Enter(err),
        }
    }

    /// The raw OS error code behind this error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Setup(e) | Error::Enter(e) => e.raw_os_error(),
            Error::Map { source, .. } | Error::Register { source, .. } => {
                source.raw_os_error()
            }
            Error::Memlock => Some(libc::ENOMEM),
            Error::Interrupted => Some(libc::EINTR),
            Error::TimedOut => Some(libc::ETIME),
            Error::InvalidEntries(_) => Some(libc::EINVAL),
            Error::SubmissionQueueFull => Some(libc::EBUSY),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::Setup(e) | Error::Enter(e) => e,
            Error::Map { source, .. } | Error::Register { source, .. } => source,
            e => match e.raw_os_error() {
                Some(errno) if !matches!(e, Error::Memlock) => {
                    io::Error::from_raw_os_error(errno)
                }
                _ => io::Error::new(io::ErrorKind::Other, e),
            },
        }
    }
}
