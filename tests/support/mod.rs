#![allow(dead_code)]

use std::process::{Child, Command};
use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use herd::{trace, Pid, Session, Signal, WaitStatus};

/// Kills and reaps the child on drop, so a failing test does not leak it.
pub struct ChildGuard(pub Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// A child that blocks in a sleep syscall.
pub fn sleeper() -> Command {
    let mut cmd = Command::new("sleep");
    cmd.arg("60");
    cmd
}

/// A child that busy-loops in userspace. Safe to single-step indefinitely.
pub fn spinner() -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "while :; do :; done"]);
    cmd
}

/// Spawn `cmd`, attach, wait for the attach-stop, set lifecycle options,
/// and register the main thread.
pub fn attach_session(cmd: &mut Command) -> Result<(ChildGuard, Session)> {
    let child = cmd.spawn()?;
    let pid = Pid::from_raw(child.id() as i32);
    let guard = ChildGuard(child);

    // Let the exec complete, so we attach to the target program rather
    // than the pre-exec child.
    sleep(Duration::from_millis(200));

    trace::attach(pid)?;
    let status = trace::wait_thread(pid)?;
    assert!(
        matches!(status, WaitStatus::Stopped(_, Signal::SIGSTOP)),
        "unexpected attach stop: {status:?}"
    );
    trace::set_options(pid, trace::LIFECYCLE_OPTIONS)?;

    let mut session = Session::new(pid);
    session.register_thread(pid)?;

    Ok((guard, session))
}

/// The cached instruction pointer of a registered thread.
pub fn current_ip(session: &Session, tid: Pid) -> u64 {
    let regs = session.threads().get(tid).expect("registered thread");
    herd::arch::instruction_pointer(&regs.borrow())
}

/// The address reported as the stop IP after the software trap at `addr`
/// fires.
#[cfg(target_arch = "x86_64")]
pub fn trap_stop_ip(addr: u64) -> u64 {
    // `int3` is executed, so the reported IP is one past the trap byte.
    addr + 1
}

/// The address reported as the stop IP after the software trap at `addr`
/// fires.
#[cfg(target_arch = "aarch64")]
pub fn trap_stop_ip(addr: u64) -> u64 {
    // `BRK` does not advance the PC.
    addr
}
