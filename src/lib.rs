//! A small stream of uring. The io_uring ring protocol, with the
//! rings laid bare: claim a submission slot, fill it in, push it,
//! submit, then reap completions straight out of the shared
//! completion queue.
//!
//! # Examples
//!
//! ```no_run
//! use std::{fs::File, os::unix::io::AsRawFd};
//!
//! use rill::Op;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // start the ring
//!     let mut ring = rill::new()?;
//!
//!     let file = File::open("Cargo.toml")?;
//!     let mut buf = vec![0_u8; 4096];
//!
//!     let sqe = ring.get_sqe().expect("fresh ring has room");
//!     let read = Op::Read {
//!         fd: file.as_raw_fd(),
//!         buf: buf.as_mut_ptr(),
//!         len: buf.len() as u32,
//!         offset: 0,
//!     };
//!     // `buf` and `file` outlive the completion below
//!     unsafe { sqe.prep(read).user_data(42).push() };
//!
//!     ring.submit_and_wait(1)?;
//!
//!     let cqe = ring.wait_cqe()?;
//!     assert_eq!(cqe.user_data(), 42);
//!     let n = cqe.io_result()?;
//!     ring.cqe_seen();
//!
//!     println!("read {} bytes", n);
//!     Ok(())
//! }
//! ```
#![cfg_attr(test, deny(warnings))]
#![deny(
    missing_docs,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_qualifications
)]
#![deny(
    // over time, consider enabling the following commented-out lints:
    // clippy::missing_const_for_fn,
    // clippy::missing_docs_in_private_items,
    // clippy::module_name_repetitions,
    // clippy::multiple_crate_versions,
    // clippy::unimplemented,
    // clippy::wildcard_enum_match_arm,
    // clippy::else_if_without_else,
    // clippy::float_arithmetic,
    // clippy::indexing_slicing,
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::checked_conversions,
    clippy::decimal_literal_representation,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_into_iter_loop,
    clippy::explicit_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::get_unwrap,
    clippy::if_not_else,
    clippy::inline_always,
    clippy::invalid_upcast_comparisons,
    clippy::items_after_statements,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::maybe_infinite_iter,
    clippy::mem_forget,
    clippy::multiple_inherent_impl,
    clippy::mut_mut,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_pass_by_value,
    clippy::non_ascii_literal,
    clippy::path_buf_push_overwrite,
    clippy::print_stdout,
    clippy::redundant_closure_for_method_calls,
    clippy::shadow_reuse,
    clippy::shadow_same,
    clippy::shadow_unrelated,
    clippy::single_match_else,
    clippy::string_add,
    clippy::string_add_assign,
    clippy::type_repetition_in_bounds,
    clippy::unicode_not_nfc,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding,
    clippy::wildcard_dependencies,
)]

mod error;
mod metrics;

#[cfg(target_os = "linux")]
mod io_uring;

pub use error::{Error, Result};
pub use metrics::Metrics;

#[cfg(target_os = "linux")]
pub use io_uring::{
    io_cqring_offsets, io_sqring_offsets, io_uring_cqe as Cqe,
    io_uring_getevents_arg, io_uring_params, io_uring_sqe as RawSqe,
    probe_with, Completions, Config, EnterArg, EnterFlags, FeatureFlags,
    FsyncFlags, Kernel, Linux, Op, Opcode, Probe, SetupFlags, SqFlags,
    Sqe, SqeFlags, TimeoutFlags, Timespec, Uring, LIBURING_UDATA_TIMEOUT,
};

/// Create a new IO system.
#[cfg(target_os = "linux")]
pub fn new() -> Result<Uring> {
    Config::default().start()
}

/// Ask the running kernel which operations it supports.
#[cfg(target_os = "linux")]
pub fn probe() -> Result<Probe> {
    probe_with(Linux)
}
