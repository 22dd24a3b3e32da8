#[cfg(not(feature = "no_metrics"))]
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Call counters for one ring.
///
/// With the `no_metrics` feature enabled these compile down to
/// nothing and every accessor returns 0.
#[derive(Debug, Default)]
#[cfg_attr(feature = "no_metrics", allow(missing_copy_implementations))]
pub struct Metrics {
    #[cfg(not(feature = "no_metrics"))]
    enter_calls: AtomicU64,
    #[cfg(not(feature = "no_metrics"))]
    submitted: AtomicU64,
    #[cfg(not(feature = "no_metrics"))]
    blocking_waits: AtomicU64,
    #[cfg(not(feature = "no_metrics"))]
    fast_path_waits: AtomicU64,
    #[cfg(not(feature = "no_metrics"))]
    reaped: AtomicU64,
}

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident, $bump:ident;)*) => {
        impl Metrics {
            $(
                $(#[$doc])*
                pub fn $name(&self) -> u64 {
                    #[cfg(not(feature = "no_metrics"))]
                    {
                        self.$name.load(Relaxed)
                    }
                    #[cfg(feature = "no_metrics")]
                    {
                        0
                    }
                }

                #[inline]
                #[allow(unused_variables)]
                pub(crate) fn $bump(&self, n: u64) {
                    #[cfg(not(feature = "no_metrics"))]
                    self.$name.fetch_add(n, Relaxed);
                }
            )*
        }
    };
}

counters! {
    /// `io_uring_enter` calls made.
    enter_calls, bump_enter_calls;
    /// Entries the kernel reported as consumed.
    submitted, bump_submitted;
    /// Waits that had to enter the kernel.
    blocking_waits, bump_blocking_waits;
    /// Waits satisfied from the completion queue without a
    /// syscall.
    fast_path_waits, bump_fast_path_waits;
    /// Completions handed back to the kernel.
    reaped, bump_reaped;
}

impl Metrics {
    /// Log a summary of the counters at `info` level.
    pub fn print_profile(&self) {
        log::info!(
            "io_uring profile: {} enter calls, {} submitted, \
             {} blocking waits, {} fast path waits, {} reaped",
            self.enter_calls(),
            self.submitted(),
            self.blocking_waits(),
            self.fast_path_waits(),
            self.reaped(),
        );
    }
}
