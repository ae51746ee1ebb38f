//! Multithreaded tracee control for `ptrace(2)`-based debuggers.
//!
//! A process under ptrace is not one tracee but many: every thread stops,
//! steps, and resumes independently, while software breakpoints patch
//! memory that all of them share. This crate keeps that coherent. A
//! [`Session`] owns a table of known threads with their cached register
//! banks and a table of software breakpoints with their original and
//! patched instruction words, and its verbs sequence the delicate parts:
//! [`Session::wait_all`] brings every thread to a stop and restores
//! original instructions so the stopped process reads as un-instrumented,
//! and [`Session::continue_all`] steps threads off the traps they are
//! parked on, re-patches, and only then lets the process run.
//!
//! Launching and symbolicating tracees is left to the caller, as is
//! consuming thread lifecycle events: waits report ptrace-event-stops
//! verbatim, and the caller pairs them with [`trace::event_msg`] to keep
//! the thread table current.

#[macro_use]
pub mod error;

pub mod breakpoints;
pub mod session;
pub mod threads;
pub mod trace;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "x86_64")]
pub mod x86;

/// The architecture module for the compilation target.
#[cfg(target_arch = "aarch64")]
pub use aarch64 as arch;

/// The architecture module for the compilation target.
#[cfg(target_arch = "x86_64")]
pub use x86 as arch;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use breakpoints::{Breakpoint, BreakpointTable};

#[doc(inline)]
pub use session::{Session, ThreadStatus};

#[doc(inline)]
pub use threads::{RegisterCell, ThreadTable};

#[doc(inline)]
pub use trace::{Options, Pid, Registers, Signal, WaitStatus, LIFECYCLE_OPTIONS};
