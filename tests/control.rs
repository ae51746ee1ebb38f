use anyhow::Result;
use ntest::timeout;
use pretty_assertions::assert_eq;

use herd::{trace, Signal, WaitStatus};

mod support;
use support::*;

// One test per binary for anything calling `wait_all`: its seed wait takes
// any child of the whole test process, so concurrent tests in the same
// binary could steal each other's stops.
#[test]
#[timeout(10000)]
fn test_continue_and_wait_lifecycle() -> Result<()> {
    let (_guard, mut session) = attach_session(&mut sleeper())?;
    let pid = session.pid();

    let regs = session.register_thread(pid)?;

    session.continue_all()?;

    // A running thread does not answer register reads.
    assert!(trace::registers(pid).is_err());

    nix::sys::signal::kill(pid, Signal::SIGSTOP)?;
    let report = session.wait_all()?;

    // The seed stop leads the report.
    assert_eq!(report[0].tid, pid);
    assert!(matches!(
        report[0].status,
        WaitStatus::Stopped(_, Signal::SIGSTOP)
    ));

    // The thread is stopped again, and its cached bank matches the kernel.
    let kernel = trace::registers(pid)?;
    assert_eq!(
        herd::arch::instruction_pointer(&regs.borrow()),
        herd::arch::instruction_pointer(&kernel)
    );

    // Teardown releases the tracee.
    session.detach_all()?;
    assert!(session.threads().is_empty());
    assert!(trace::registers(pid).is_err());

    Ok(())
}
