//! x86-32/64 instruction decoder
//!
//! Table-driven, one instruction at a time. Covers the subset of the ISA
//! that shows up in Windows kernel drivers talking to hardware: general
//! data movement, integer arithmetic/logic, short control flow, and port
//! I/O. Anything outside that subset decodes to [`Instruction::Unknown`]
//! rather than failing the whole decode — a driver binary contains plenty
//! of instructions irrelevant to its hardware-facing behavior, and the
//! semantic classifier downstream only cares about the ones that matter.

mod decode;
mod instruction;
mod operand;
mod register;

pub use decode::Decoder;
pub use instruction::{ConditionCode, Instruction};
pub use operand::{Operand, OperandKind};
pub use register::Register;

use crate::alloc::vec::Vec;

/// Instruction prefix bits, as consumed by the decoder. Segment override
/// prefixes are recognized and skipped but leave no trace here — nothing
/// downstream needs to know which segment register was overridden.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Prefixes(pub u8);

impl Prefixes {
    pub const REP: u8 = 0x01;
    pub const REPNE: u8 = 0x02;
    pub const LOCK: u8 = 0x04;
    pub const OPSIZE: u8 = 0x08;
    pub const ADDRSIZE: u8 = 0x10;

    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn has_rep(self) -> bool {
        self.has(Self::REP)
    }
}

/// A fully decoded instruction: address, raw length, opcode, operands, and
/// whatever prefix/condition-code state the opcode needed.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub address: u64,
    pub length: u8,
    pub instruction: Instruction,
    pub operands: Vec<Operand>,
    pub prefixes: Prefixes,
    pub cc: Option<ConditionCode>,
}

impl DecodedInstruction {
    /// `true` for RET, JMP, and HLT — the instructions after which a basic
    /// block cannot fall through to the next one in program order.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.instruction,
            Instruction::Ret | Instruction::Jmp | Instruction::Hlt
        )
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(self.instruction, Instruction::Jcc)
    }

    pub fn is_call(&self) -> bool {
        matches!(self.instruction, Instruction::Call)
    }

    /// The absolute branch target for JMP/JCC/CALL/LOOP — operand 0 is
    /// always the relative-offset-resolved-to-absolute target for these.
    pub fn branch_target(&self) -> Option<u64> {
        match self.instruction {
            Instruction::Jmp | Instruction::Jcc | Instruction::Call | Instruction::Loop => {
                match self.operands.first() {
                    Some(Operand {
                        kind: OperandKind::Rel,
                        imm,
                        ..
                    }) => Some(*imm as u64),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The address immediately after this instruction.
    pub fn next_address(&self) -> u64 {
        self.address + self.length as u64
    }
}
