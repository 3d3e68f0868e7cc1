//! Architecture-specific call-site patching.
//!
//! The machine dispatch is the tool's single extension point: a new
//! architecture adds a branch that (a) verifies the call-site instruction,
//! (b) patches it to an architecture-appropriate no-op/return sequence of
//! the same byte length, and (c) neutralizes the relocation by setting the
//! appropriate "no-op relocation" type constant. [`Patcher`] is that branch,
//! reified as a trait so `x86_64` is a single implementation rather than the
//! only arm of a `match`.

pub mod x86_64;

use crate::error::Result;
use crate::header::elf::ElfMachine;

/// What kind of control-transfer instruction preceded a probe-stub
/// relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSiteKind {
    /// A `call` to the probe stub; falls through to the instruction after
    /// the displacement once neutralized.
    Call,
    /// A tail `jmp` to the probe stub; since the jump would never have
    /// returned, the neutralized site must itself return.
    TailCall,
}

/// A per-architecture capability set for neutralizing a probe call site.
/// One implementation (`x86_64`) exists in v1; the machine dispatch is the
/// extension point for future architectures.
pub trait Patcher {
    /// Inspect the byte immediately preceding `offset` in `text` and
    /// classify it, or fail if it is neither a call nor a tail jump to the
    /// probe stub.
    fn verify_call_site(&self, text: &[u8], offset: u64, probe: &str) -> Result<CallSiteKind>;

    /// Overwrite `text[offset-1..offset+4]` with this architecture's
    /// no-op/return encoding for `kind`, of the same byte length as the
    /// original instruction.
    fn patch_to_nop(&self, text: &mut [u8], offset: u64, kind: CallSiteKind);

    /// The relocation type that marks a neutralized relocation entry
    /// (`R_X86_64_NONE` on x86-64).
    fn neutralize_relocation_type(&self) -> u32;
}

/// Resolve the [`Patcher`] for `machine`, or fail fatally for any machine
/// with no registered implementation.
pub fn patcher_for(machine: ElfMachine) -> Result<Box<dyn Patcher>> {
    match machine {
        ElfMachine::X86_64 => Ok(Box::new(x86_64::X86_64Patcher)),
        other => Err(crate::error::Error::UnsupportedMachine(match other {
            ElfMachine::None => 0,
            ElfMachine::I386 => 3,
            ElfMachine::Arm => 40,
            ElfMachine::AArch64 => 183,
            ElfMachine::X86_64 => unreachable!(),
            ElfMachine::Other(v) => v,
        })),
    }
}
