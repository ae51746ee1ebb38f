use anyhow::Result;
use ntest::timeout;
use pretty_assertions::assert_eq;

use herd::{trace, Error, Pid, Session};

mod support;
use support::*;

#[test]
#[timeout(20000)]
fn test_step_until_exhausts_its_budget_without_error() -> Result<()> {
    let (_guard, mut session) = attach_session(&mut spinner())?;
    let tid = session.pid();

    // An address the loop never reaches.
    session.step_until(tid, 0x1, Some(50))?;

    Ok(())
}

#[test]
#[timeout(5000)]
fn test_step_until_with_a_zero_budget_does_not_step() -> Result<()> {
    let (_guard, mut session) = attach_session(&mut spinner())?;
    let tid = session.pid();
    let ip = current_ip(&session, tid);

    session.step_until(tid, 0x1, Some(0))?;

    assert_eq!(current_ip(&session, tid), ip);

    Ok(())
}

#[test]
#[timeout(60000)]
fn test_step_until_reaches_a_revisited_address() -> Result<()> {
    let (_guard, mut session) = attach_session(&mut spinner())?;
    let tid = session.pid();

    // Walk into the loop, then pick the address we are at; the loop will
    // come back around to it.
    session.step_until(tid, 0x1, Some(200))?;
    let target = current_ip(&session, tid);

    session.step_until(tid, target, Some(100_000))?;

    assert_eq!(current_ip(&session, tid), target);

    Ok(())
}

#[test]
#[timeout(5000)]
fn test_step_until_requires_a_registered_thread() {
    let tid = Pid::from_raw(999_999);
    let mut session = Session::new(tid);

    let err = session.step_until(tid, 0x1000, Some(1)).unwrap_err();

    assert!(matches!(err, Error::UnknownThread { .. }));
}

#[cfg(target_arch = "x86_64")]
#[test]
#[timeout(10000)]
fn test_register_edits_are_flushed_before_stepping() -> Result<()> {
    let (_guard, mut session) = attach_session(&mut spinner())?;
    let tid = session.pid();

    let regs = session.register_thread(tid)?;
    regs.borrow_mut().r15 = 0x1DEA;

    session.step(tid)?;
    trace::wait_thread(tid)?;

    assert_eq!(trace::registers(tid)?.r15, 0x1DEA);

    Ok(())
}
