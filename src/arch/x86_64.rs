//! The x86-64 call-site patcher — the only [`super::Patcher`] in v1.

use super::{CallSiteKind, Patcher};
use crate::error::{Error, Result};

/// `call rel32`
const OPC_CALL: u8 = 0xe8;
/// `jmp rel32`
const OPC_JMP: u8 = 0xe9;
/// The no-op this tool fills patched call sites with.
const NOP: u8 = 0x90;
/// `ret`, substituted for the first patched byte of a neutralized tail call
/// so the enclosing function's control-flow contract is preserved.
const RET: u8 = 0xc3;

/// x86-64's implementation of the probe-site patcher.
pub struct X86_64Patcher;

impl Patcher for X86_64Patcher {
    fn verify_call_site(&self, text: &[u8], offset: u64, probe: &str) -> Result<CallSiteKind> {
        let off = offset as usize;
        let opcode = *text.get(off.wrapping_sub(1)).ok_or_else(|| Error::UnexpectedOpcode {
            probe: probe.to_string(),
            offset,
            opcode: 0,
        })?;
        let displacement = text.get(off..off + 4).ok_or_else(|| Error::UnexpectedOpcode {
            probe: probe.to_string(),
            offset,
            opcode,
        })?;

        // A former call/tail-call site, after this tool has already run,
        // has opcode NOP or RET and an all-NOP displacement. Recognize that
        // shape before the opcode check below would otherwise report it as
        // a generic "unexpected opcode".
        if matches!(opcode, NOP | RET) && displacement == [NOP, NOP, NOP, NOP] {
            return Err(Error::AlreadyPatched {
                probe: probe.to_string(),
                offset,
            });
        }

        let kind = match opcode {
            OPC_CALL => CallSiteKind::Call,
            OPC_JMP => CallSiteKind::TailCall,
            other => {
                return Err(Error::UnexpectedOpcode {
                    probe: probe.to_string(),
                    offset,
                    opcode: other,
                })
            }
        };

        if displacement != [0, 0, 0, 0] {
            return Err(Error::NonZeroDisplacement {
                probe: probe.to_string(),
                offset,
            });
        }

        Ok(kind)
    }

    fn patch_to_nop(&self, text: &mut [u8], offset: u64, kind: CallSiteKind) {
        let offset = offset as usize;
        text[offset - 1..offset + 4].fill(NOP);
        if kind == CallSiteKind::TailCall {
            text[offset - 1] = RET;
        }
    }

    fn neutralize_relocation_type(&self) -> u32 {
        crate::header::relocation::R_X86_64_NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_with_call(opcode: u8) -> Vec<u8> {
        // ... 55 48 89 e5 <opcode> 00 00 00 00 5d c3 ...
        vec![0x55, 0x48, 0x89, 0xe5, opcode, 0x00, 0x00, 0x00, 0x00, 0x5d, 0xc3]
    }

    #[test]
    fn patches_call_to_five_nops() {
        let patcher = X86_64Patcher;
        let mut text = text_with_call(OPC_CALL);
        let offset = 5u64; // first zero byte, immediately after the E8 opcode
        let kind = patcher.verify_call_site(&text, offset, "foo").unwrap();
        assert_eq!(kind, CallSiteKind::Call);
        patcher.patch_to_nop(&mut text, offset, kind);
        assert_eq!(&text[4..9], &[NOP, NOP, NOP, NOP, NOP]);
        // Bytes outside the patched window are untouched.
        assert_eq!(&text[0..4], &[0x55, 0x48, 0x89, 0xe5]);
        assert_eq!(&text[9..], &[0x5d, 0xc3]);
    }

    #[test]
    fn patches_tail_jmp_to_ret_then_four_nops() {
        let patcher = X86_64Patcher;
        let mut text = text_with_call(OPC_JMP);
        let offset = 5u64;
        let kind = patcher.verify_call_site(&text, offset, "foo").unwrap();
        assert_eq!(kind, CallSiteKind::TailCall);
        patcher.patch_to_nop(&mut text, offset, kind);
        assert_eq!(&text[4..9], &[RET, NOP, NOP, NOP, NOP]);
    }

    #[test]
    fn rejects_unexpected_opcode() {
        let patcher = X86_64Patcher;
        let text = text_with_call(0x90);
        assert!(matches!(
            patcher.verify_call_site(&text, 5, "foo"),
            Err(Error::UnexpectedOpcode { .. })
        ));
    }

    #[test]
    fn rejects_nonzero_displacement() {
        let patcher = X86_64Patcher;
        let mut text = text_with_call(OPC_CALL);
        text[8] = 0x01; // displacement no longer all-zero
        assert!(matches!(
            patcher.verify_call_site(&text, 5, "foo"),
            Err(Error::NonZeroDisplacement { .. })
        ));
    }

    #[test]
    fn detects_already_patched_site() {
        let patcher = X86_64Patcher;
        let text = vec![NOP, NOP, NOP, NOP, NOP, NOP];
        assert!(matches!(
            patcher.verify_call_site(&text, 5, "foo"),
            Err(Error::AlreadyPatched { .. })
        ));
    }
}
