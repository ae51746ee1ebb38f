//! Typed facade over the `ptrace(2)` and `waitpid(2)` requests the control
//! loop needs, in one-to-one correspondence with the kernel interface.

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::wait::{self, WaitPidFlag};

use crate::error::{Error, Result, ResultExt};

pub use nix::sys::ptrace::Options;
pub use nix::sys::signal::Signal;
pub use nix::sys::wait::WaitStatus;
pub use nix::unistd::Pid;

/// Register state of a tracee thread.
#[cfg(target_arch = "x86_64")]
pub type Registers = libc::user_regs_struct;

/// Register state of a tracee thread.
#[cfg(target_arch = "aarch64")]
pub type Registers = crate::aarch64::user_pt_regs;

/// Linux constant defined in `include/uapi/linux/elf.h`.
#[cfg(target_arch = "aarch64")]
const NT_PRSTATUS: i32 = 0x1;

/// Options that keep the control loop informed of every thread lifecycle
/// event: fork, vfork, clone, exec, and exit.
///
/// **NOTE:** these are always set, even if unset in the value passed to
/// [`set_options`].
pub const LIFECYCLE_OPTIONS: Options = Options::empty()
    .union(Options::PTRACE_O_TRACEFORK)
    .union(Options::PTRACE_O_TRACEVFORK)
    .union(Options::PTRACE_O_TRACECLONE)
    .union(Options::PTRACE_O_TRACEEXEC)
    .union(Options::PTRACE_O_TRACEEXIT);

/// Request tracing of the calling process by its parent.
pub fn trace_me() -> Result<()> {
    Ok(ptrace::traceme()?)
}

/// Attach to a running process. This will deliver a `SIGSTOP`.
///
/// **Warning:** the tracee may not be considered stopped until it has been
/// seen to stop via a wait.
pub fn attach(pid: Pid) -> Result<()> {
    ptrace::attach(pid).map_err(|source| Error::Attach { pid, source })
}

/// Detach from a stopped thread, optionally delivering `signal` on resume.
pub fn detach(pid: Pid, signal: impl Into<Option<Signal>>) -> Result<()> {
    ptrace::detach(pid, signal).died_if_esrch(pid)?;

    Ok(())
}

/// Set trace options on a stopped thread. [`LIFECYCLE_OPTIONS`] are always
/// included.
pub fn set_options(pid: Pid, options: Options) -> Result<()> {
    ptrace::setoptions(pid, options | LIFECYCLE_OPTIONS).died_if_esrch(pid)?;

    Ok(())
}

/// Read one word of tracee memory.
///
/// A successful read can legitimately return the all-ones word: `nix`
/// performs the clear-`errno`-then-peek dance internally, so failure is
/// reported via `Err` and never via a sentinel value.
pub fn peek_data(pid: Pid, addr: u64) -> Result<u64> {
    let word = ptrace::read(pid, addr as ptrace::AddressType).died_if_esrch(pid)?;

    Ok(word as u64)
}

/// Write one word of tracee memory.
pub fn poke_data(pid: Pid, addr: u64, word: u64) -> Result<()> {
    // SAFETY: `word` is data written into the tracee's address space; it is
    // never dereferenced on the tracer side.
    unsafe { ptrace::write(pid, addr as ptrace::AddressType, word as *mut libc::c_void) }
        .died_if_esrch(pid)?;

    Ok(())
}

/// Read one word of the tracee's virtual `user` area.
pub fn peek_user(pid: Pid, offset: u64) -> Result<u64> {
    let word = ptrace::read_user(pid, offset as ptrace::AddressType).died_if_esrch(pid)?;

    Ok(word as u64)
}

/// Write one word of the tracee's virtual `user` area.
pub fn poke_user(pid: Pid, offset: u64, word: u64) -> Result<()> {
    // SAFETY: `word` is data written into the tracee's `user` area; it is
    // never dereferenced on the tracer side.
    unsafe { ptrace::write_user(pid, offset as ptrace::AddressType, word as *mut libc::c_void) }
        .died_if_esrch(pid)?;

    Ok(())
}

/// Read the auxiliary message of the most recent ptrace-event-stop, e.g.
/// the tid of a newly cloned thread.
pub fn event_msg(pid: Pid) -> Result<u64> {
    let data = ptrace::getevent(pid).died_if_esrch(pid)?;

    Ok(data as u64)
}

/// Execute one instruction of a stopped thread.
pub fn single_step(tid: Pid) -> Result<()> {
    ptrace::step(tid, None).died_if_esrch(tid)?;

    Ok(())
}

/// Resume a stopped thread.
pub fn resume(tid: Pid) -> Result<()> {
    ptrace::cont(tid, None).died_if_esrch(tid)?;

    Ok(())
}

#[cfg(target_arch = "x86_64")]
pub fn registers(tid: Pid) -> Result<Registers> {
    Ok(ptrace::getregs(tid).died_if_esrch(tid)?)
}

#[cfg(target_arch = "aarch64")]
pub fn registers(tid: Pid) -> Result<Registers> {
    let mut data = std::mem::MaybeUninit::uninit();
    let mut rv = libc::iovec {
        iov_base: &mut data as *mut _ as *mut libc::c_void,
        iov_len: std::mem::size_of::<Registers>(),
    };

    let res = unsafe {
        libc::ptrace(
            crate::aarch64::PTRACE_GETREGSET,
            tid.as_raw(),
            NT_PRSTATUS,
            &mut rv as *mut _ as *mut libc::c_void,
        )
    };

    Errno::result(res).map(drop).died_if_esrch(tid)?;

    Ok(unsafe { data.assume_init() })
}

#[cfg(target_arch = "x86_64")]
pub fn set_registers(tid: Pid, regs: &Registers) -> Result<()> {
    Ok(ptrace::setregs(tid, *regs).died_if_esrch(tid)?)
}

#[cfg(target_arch = "aarch64")]
pub fn set_registers(tid: Pid, regs: &Registers) -> Result<()> {
    let mut rv = libc::iovec {
        iov_base: regs as *const _ as *const libc::c_void as *mut libc::c_void,
        iov_len: std::mem::size_of::<Registers>(),
    };

    let res = unsafe {
        libc::ptrace(
            crate::aarch64::PTRACE_SETREGSET,
            tid.as_raw(),
            NT_PRSTATUS,
            &mut rv as *mut _ as *mut libc::c_void,
        )
    };

    Errno::result(res).map(drop).died_if_esrch(tid)?;

    Ok(())
}

/// Block until any thread of any tracee stops, and return its wait status.
pub fn wait_any() -> Result<(Pid, WaitStatus)> {
    let status = wait::waitpid(None::<Pid>, Some(WaitPidFlag::__WALL))
        .map_err(|source| Error::Wait { source })?;

    match status.pid() {
        Some(tid) => Ok((tid, status)),
        None => internal_error!("blocking wait returned a status without a pid"),
    }
}

/// Block until the specific thread `tid` stops.
pub fn wait_thread(tid: Pid) -> Result<WaitStatus> {
    wait::waitpid(tid, Some(WaitPidFlag::__WALL)).map_err(|source| Error::Wait { source })
}

/// Collect a pending stop of any tracee thread without blocking.
///
/// Returns `Ok(None)` when no thread has a pending status, or when there
/// are no children left to wait on.
pub fn poll_any() -> Result<Option<(Pid, WaitStatus)>> {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::__WALL;

    match wait::waitpid(None::<Pid>, Some(flags)) {
        Ok(WaitStatus::StillAlive) => Ok(None),
        Ok(status) => match status.pid() {
            Some(tid) => Ok(Some((tid, status))),
            None => internal_error!("nonblocking wait returned a status without a pid"),
        },
        Err(Errno::ECHILD) => Ok(None),
        Err(source) => Err(Error::Wait { source }),
    }
}

/// Deliver the thread-directed stop signal to `tid` of thread group `pid`.
pub fn interrupt(pid: Pid, tid: Pid) -> Result<()> {
    // `nix` has no wrapper for `tgkill`; issue the raw syscall.
    let res = unsafe {
        libc::syscall(
            libc::SYS_tgkill,
            pid.as_raw(),
            tid.as_raw(),
            libc::SIGSTOP,
        )
    };

    Errno::result(res).map(drop).died_if_esrch(tid)?;

    Ok(())
}
