//! The debug session: the control loop that coordinates stop, step, and
//! continue across every thread of the tracee.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::arch;
use crate::breakpoints::BreakpointTable;
use crate::error::{Error, Result};
use crate::threads::{RegisterCell, ThreadTable};
use crate::trace::{self, Pid, Signal, WaitStatus};

/// One stopped thread observed during a wait cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ThreadStatus {
    pub tid: Pid,
    pub status: WaitStatus,
}

/// A debug session over one traced process.
///
/// The session owns the thread and breakpoint tables and is the sole issuer
/// of ptrace requests, so the multithreaded tracee can be treated as a
/// single debuggee: [`wait_all`](Session::wait_all) leaves every thread
/// stopped with original instructions in place, and
/// [`continue_all`](Session::continue_all) re-instruments the process
/// before any thread runs again.
///
/// Sessions are single-threaded by construction; register handles are
/// `!Send` and all verbs take the session by reference.
pub struct Session {
    pid: Pid,
    threads: ThreadTable,
    breakpoints: BreakpointTable,
}

impl Session {
    /// Create a session over the process `pid`. Threads are not discovered
    /// automatically; the caller registers them as the kernel reports them.
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            threads: ThreadTable::new(),
            breakpoints: BreakpointTable::new(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    /// Register `tid`, returning a handle to its cached register bank.
    ///
    /// The thread must already be ptrace-stopped; its registers are read
    /// from the kernel on first registration.
    pub fn register_thread(&mut self, tid: Pid) -> Result<RegisterCell> {
        self.threads.register(tid)
    }

    pub fn unregister_thread(&mut self, tid: Pid) {
        self.threads.unregister(tid);
    }

    pub fn clear_threads(&mut self) {
        self.threads.clear();
    }

    /// Install (or re-enable) a software breakpoint at `address`.
    pub fn set_breakpoint(&mut self, address: u64) -> Result<()> {
        self.breakpoints.install(self.pid, address)
    }

    /// Disable the breakpoint at `address`. See
    /// [`BreakpointTable::disable`] for what this leaves in tracee memory.
    pub fn disable_breakpoint(&mut self, address: u64) -> Result<()> {
        self.breakpoints.disable(self.pid, address)
    }

    pub fn remove_breakpoint(&mut self, address: u64) {
        self.breakpoints.remove(address);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Resume every thread of the tracee.
    ///
    /// In order: flush every cached register bank, step any thread parked
    /// on an enabled breakpoint off of it, re-patch every enabled
    /// breakpoint, and continue every thread. No thread is resumed before
    /// the process is fully re-instrumented.
    ///
    /// Flush and resume failures are logged per thread; a step-over failure
    /// aborts the operation.
    pub fn continue_all(&mut self) -> Result<()> {
        self.flush_registers();

        // Threads stopped on one of our traps must execute the restored
        // original instruction before the traps go back in.
        let mut parked = Vec::new();
        for (tid, regs) in self.threads.iter() {
            let ip = arch::instruction_pointer(&regs.borrow());
            if self.breakpoints.enabled_at(ip) {
                parked.push((tid, ip));
            }
        }

        for (tid, ip) in parked {
            debug!(tid = tid.as_raw(), ip, "stepping thread off breakpoint");
            self.step_off_breakpoint(tid)?;
        }

        for bp in self.breakpoints.iter() {
            if !bp.enabled() {
                continue;
            }
            if let Err(err) = trace::poke_data(self.pid, bp.address(), bp.patched()) {
                warn!(address = bp.address(), %err, "failed to re-arm breakpoint");
            }
        }

        for (tid, _) in self.threads.iter() {
            if let Err(err) = trace::resume(tid) {
                warn!(tid = tid.as_raw(), %err, "failed to resume thread");
            }
        }

        Ok(())
    }

    fn step_off_breakpoint(&self, tid: Pid) -> Result<()> {
        trace::single_step(tid)?;
        let status = trace::wait_thread(tid)?;

        // A sibling's stop signal can race the step and consume it: the
        // wait then reports delivery of the thread-stop signal instead of
        // the trap. Step once more.
        if matches!(status, WaitStatus::Stopped(_, Signal::SIGSTOP)) {
            trace::single_step(tid)?;
            trace::wait_thread(tid)?;
        }

        Ok(())
    }

    /// Block until the tracee stops, then bring the whole process to a
    /// coherent stop.
    ///
    /// In order: block-wait for any thread (the seed of the report), stop
    /// every sibling that is still running, drain pending stops, refresh
    /// every cached register bank, and restore the original instruction of
    /// every enabled breakpoint.
    ///
    /// The report lists every thread the kernel reported stopped during
    /// this call, seed first, remainder in unspecified order.
    pub fn wait_all(&mut self) -> Result<Vec<ThreadStatus>> {
        let (seed, status) = trace::wait_any()?;
        let mut report = vec![ThreadStatus { tid: seed, status }];

        // Freeze the siblings. A successful register read proves a thread
        // is already stopped; otherwise it is running and gets the
        // thread-directed stop signal.
        for (tid, regs) in self.threads.iter() {
            if tid == seed {
                continue;
            }

            match trace::registers(tid) {
                Ok(fresh) => *regs.borrow_mut() = fresh,
                Err(_) => {
                    if let Err(err) = trace::interrupt(self.pid, tid) {
                        warn!(tid = tid.as_raw(), %err, "failed to interrupt running thread");
                        continue;
                    }

                    match trace::wait_thread(tid) {
                        Ok(status) => report.push(ThreadStatus { tid, status }),
                        Err(err) => {
                            warn!(tid = tid.as_raw(), %err, "failed to wait for interrupted thread")
                        }
                    }
                }
            }
        }

        // Collect any stops that were already pending.
        while let Some((tid, status)) = trace::poll_any()? {
            report.push(ThreadStatus { tid, status });
        }

        // With the whole process stopped, make every cached bank current.
        for (tid, regs) in self.threads.iter() {
            match trace::registers(tid) {
                Ok(fresh) => *regs.borrow_mut() = fresh,
                Err(err) => warn!(tid = tid.as_raw(), %err, "failed to refresh registers"),
            }
        }

        // Leave the stopped tracee clean: every enabled breakpoint address
        // reads as its original instruction, and a later continue can step
        // threads off their traps.
        for bp in self.breakpoints.iter() {
            if !bp.enabled() {
                continue;
            }
            if let Err(err) = trace::poke_data(self.pid, bp.address(), bp.original()) {
                warn!(address = bp.address(), %err, "failed to restore original instruction");
            }
        }

        Ok(report)
    }

    /// Flush every cached register bank and single-step `tid`.
    ///
    /// Breakpoints are neither restored nor re-patched here; the preceding
    /// [`wait_all`](Session::wait_all) already left the tracee clean.
    pub fn step(&mut self, tid: Pid) -> Result<()> {
        self.flush_registers();
        trace::single_step(tid)
    }

    /// Single-step `tid` until its instruction pointer reaches `target`,
    /// for at most `max_steps` steps (`None` means unbounded).
    ///
    /// Stops that leave the instruction pointer in place — a hardware
    /// breakpoint re-reporting the same address — do not count toward the
    /// budget. Exhausting the budget is not an error.
    pub fn step_until(&mut self, tid: Pid, target: u64, max_steps: Option<usize>) -> Result<()> {
        self.flush_registers();

        let regs = match self.threads.get(tid) {
            Some(regs) => Rc::clone(regs),
            None => return Err(Error::UnknownThread { tid }),
        };

        let mut steps = 0;

        loop {
            if let Some(max) = max_steps {
                if steps >= max {
                    return Ok(());
                }
            }

            trace::single_step(tid)?;
            trace::wait_thread(tid)?;

            let previous = arch::instruction_pointer(&regs.borrow());
            let fresh = trace::registers(tid)?;
            *regs.borrow_mut() = fresh;
            let ip = arch::instruction_pointer(&regs.borrow());

            if ip == target {
                return Ok(());
            }

            if ip == previous {
                continue;
            }

            steps += 1;
        }
    }

    /// Tear the session down: restore every enabled breakpoint's original
    /// instruction, detach from every registered thread, and clear both
    /// tables. Per-thread failures are logged.
    pub fn detach_all(&mut self) -> Result<()> {
        for bp in self.breakpoints.iter() {
            if !bp.enabled() {
                continue;
            }
            if let Err(err) = trace::poke_data(self.pid, bp.address(), bp.original()) {
                warn!(address = bp.address(), %err, "failed to restore original instruction");
            }
        }

        for (tid, _) in self.threads.iter() {
            if let Err(err) = trace::detach(tid, None) {
                warn!(tid = tid.as_raw(), %err, "failed to detach thread");
            }
        }

        self.threads.clear();
        self.breakpoints.clear();

        Ok(())
    }

    // Commit front-end register edits before any thread makes progress.
    fn flush_registers(&self) {
        for (tid, regs) in self.threads.iter() {
            if let Err(err) = trace::set_registers(tid, &regs.borrow()) {
                warn!(tid = tid.as_raw(), %err, "failed to flush registers");
            }
        }
    }
}
