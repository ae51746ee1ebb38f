//! Software breakpoints: instruction words patched with the architecture's
//! trap opcode, keyed by tracee virtual address.

use std::collections::HashMap;

use tracing::info;

use crate::arch;
use crate::error::Result;
use crate::trace::{self, Pid};

/// One software breakpoint.
///
/// `original` is captured once, when the record is first created, and never
/// re-read from memory that may already carry the trap byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Breakpoint {
    address: u64,
    original: u64,
    patched: u64,
    enabled: bool,
}

impl Breakpoint {
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The instruction word at `address` without the trap installed.
    pub fn original(&self) -> u64 {
        self.original
    }

    /// The instruction word at `address` with the trap installed.
    pub fn patched(&self) -> u64 {
        self.patched
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// All software breakpoints of the session, keyed by address.
///
/// While the tracee runs, every enabled breakpoint's address holds the
/// patched word; while it is stopped after a wait, every enabled
/// breakpoint's address holds the original word.
#[derive(Default)]
pub struct BreakpointTable {
    breakpoints: HashMap<u64, Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch a breakpoint into the tracee at `address` and record it.
    ///
    /// Re-installing at a known address re-patches the memory and re-enables
    /// the existing record; the recorded original word is left untouched, as
    /// the word now in memory may already be patched.
    pub fn install(&mut self, pid: Pid, address: u64) -> Result<()> {
        let word = trace::peek_data(pid, address)?;
        let patched = arch::install_patch(word);

        trace::poke_data(pid, address, patched)?;

        if let Some(bp) = self.breakpoints.get_mut(&address) {
            bp.enabled = true;
            return Ok(());
        }

        info!(address, "installing breakpoint");

        let bp = Breakpoint { address, original: word, patched, enabled: true };
        self.breakpoints.insert(address, bp);

        Ok(())
    }

    /// Disable the breakpoint at `address`, if present.
    ///
    /// The patched word is written back and the trap byte stays in tracee
    /// memory; the cleared enabled flag alone exempts the address from
    /// step-over, re-arm, and restore.
    pub fn disable(&mut self, pid: Pid, address: u64) -> Result<()> {
        if let Some(bp) = self.breakpoints.get_mut(&address) {
            bp.enabled = false;
            trace::poke_data(pid, address, bp.patched)?;
        }

        Ok(())
    }

    /// Drop the record for `address`. Tracee memory is not touched.
    pub fn remove(&mut self, address: u64) {
        if self.breakpoints.remove(&address).is_some() {
            info!(address, "removed breakpoint");
        }
    }

    /// Drop every record. Tracee memory is not touched.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    pub fn get(&self, address: u64) -> Option<&Breakpoint> {
        self.breakpoints.get(&address)
    }

    /// True iff an enabled breakpoint exists at `address`.
    pub fn enabled_at(&self, address: u64) -> bool {
        self.breakpoints.get(&address).map_or(false, |bp| bp.enabled)
    }

    /// Visit each record exactly once, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
