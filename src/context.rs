use core::fmt;

/// Saved user-level execution context at the moment of a trap.
///
/// Only the registers this crate manipulates are modelled: the program
/// counter, the user stack pointer and the two argument/return-value
/// registers of the calling convention. The dispatch layer owns the full
/// frame and mirrors these fields in and out around each syscall.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TrapContext {
    /// Program counter of the trapping instruction.
    pub pc: usize,
    /// User stack pointer.
    pub sp: usize,
    /// First argument register, doubling as the syscall return-value slot.
    pub a0: usize,
    /// Second argument register.
    pub a1: usize,
}

impl TrapContext {
    /// The context a forked child first resumes with: identical to the
    /// parent's saved context, except the return-value slot reads zero
    /// and the program counter has been advanced past the trapping
    /// instruction, matching normal instruction-continuation semantics.
    pub fn forked_child(&self) -> Self {
        Self {
            pc: self.pc + 4,
            a0: 0,
            ..*self
        }
    }
}

impl fmt::Debug for TrapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrapContext {{ pc: {:#x}, sp: {:#x}, a0: {:#x}, a1: {:#x} }}",
            self.pc, self.sp, self.a0, self.a1
        )
    }
}
