use crate::trace::Registers;

/// The single-byte trap opcode (`int3`).
pub const BREAKPOINT: u8 = 0xCC;

pub fn instruction_pointer(regs: &Registers) -> u64 {
    regs.rip
}

pub fn set_instruction_pointer(regs: &mut Registers, ip: u64) {
    regs.rip = ip;
}

/// Substitute the trap opcode for the leading byte of an instruction word.
///
/// Deterministic in `word` alone, so re-applying it after a step-over
/// reproduces the same patched word.
pub fn install_patch(word: u64) -> u64 {
    (word & !0xFF) | u64::from(BREAKPOINT)
}

/// Debug registers are used to control and query processor debug operations and state.
/// Accessing them directly is a privileged operation, but a tracee's debug registers are
/// accessible via the `PEEKUSER` and `POKEUSER` requests, at the offsets computed by
/// [`DebugRegister::user_offset()`].
///
/// See: Intel SDM, Vol. 3, 17.2
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebugRegister {
    /// Debug address register 0.
    Dr0 = 0,

    /// Debug address register 1.
    Dr1,

    /// Debug address register 2.
    Dr2,

    /// Debug address register 3.
    Dr3,

    /// Reserved. Use causes invalid opcode exception.
    Dr4,

    /// Reserved. Use causes invalid opcode exception.
    Dr5,

    /// Debug status register.
    Dr6,

    /// Debug control register.
    Dr7,
}

impl DebugRegister {
    /// Return the offset of this register in the virtual `user` struct.
    pub fn user_offset(self) -> u64 {
        let base = memoffset::offset_of!(libc::user, u_debugreg) as u64;
        base + 8 * u64::from(self)
    }
}

impl From<DebugRegister> for u64 {
    fn from(dr: DebugRegister) -> u64 {
        dr as u64
    }
}
