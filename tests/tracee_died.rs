use anyhow::Result;
use ntest::timeout;

use herd::{trace, WaitStatus};

mod support;
use support::*;

#[test]
#[timeout(10000)]
fn test_requests_after_sigkill_report_a_dead_tracee() -> Result<()> {
    let (mut guard, mut session) = attach_session(&mut sleeper())?;
    let tid = session.pid();

    guard.0.kill()?;

    // Consume statuses until the kill is final; with exit tracing on, an
    // event-exit stop may arrive before the termination status.
    loop {
        match trace::wait_thread(tid) {
            Ok(WaitStatus::Signaled(..)) => break,
            Ok(_) => {
                let _ = trace::resume(tid);
            }
            Err(_) => break,
        }
    }

    let err = session.step(tid).unwrap_err();
    assert!(err.tracee_died());

    let err = trace::registers(tid).unwrap_err();
    assert!(err.tracee_died());

    Ok(())
}
