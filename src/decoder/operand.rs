//! Decoded operands
//!
//! A single tagged struct rather than a Rust enum-with-payload: every
//! variant shares the same handful of fields (the original C decoder does
//! the same with a flat struct), and the decoder's ModR/M routine fills in
//! whichever fields the addressing mode needs before tagging the result.

use super::register::Register;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// A register operand.
    Reg,
    /// `[base + index*scale + disp]`.
    Mem,
    /// An immediate constant.
    Imm,
    /// A branch target, already resolved to an absolute address.
    Rel,
}

impl Default for OperandKind {
    fn default() -> Self {
        OperandKind::None
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    /// Operand size in bytes: 1, 2, or 4.
    pub size: u8,
    /// Register operand, or a memory operand's base register.
    pub reg: Option<Register>,
    /// Memory operand's index register.
    pub index: Option<Register>,
    /// Memory operand's scale factor: 1, 2, 4, or 8.
    pub scale: u8,
    /// Memory operand's displacement.
    pub disp: i32,
    /// Immediate value, or a relative operand's resolved absolute target.
    pub imm: i64,
}

impl Operand {
    pub fn none() -> Self {
        Operand::default()
    }

    pub fn reg(reg: Register, size: u8) -> Self {
        Operand {
            kind: OperandKind::Reg,
            size,
            reg: Some(reg),
            ..Operand::default()
        }
    }

    pub fn imm(value: i64, size: u8) -> Self {
        Operand {
            kind: OperandKind::Imm,
            size,
            imm: value,
            ..Operand::default()
        }
    }

    pub fn rel(target: u64) -> Self {
        Operand {
            kind: OperandKind::Rel,
            imm: target as i64,
            ..Operand::default()
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == OperandKind::None
    }
}
