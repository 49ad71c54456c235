//! Register encodings
//!
//! x86's register numbering reuses the same 3-bit encoding (0-7) across the
//! 8-, 16-, and 32-bit register files; which file applies is determined by
//! operand size, not by the encoding itself. [`Register`] stores the bare
//! encoding and defers naming to [`Register::name`], which takes the size.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Register(pub u8);

impl Register {
    pub const EAX: Register = Register(0);
    pub const ECX: Register = Register(1);
    pub const EDX: Register = Register(2);
    pub const EBX: Register = Register(3);
    pub const ESP: Register = Register(4);
    pub const EBP: Register = Register(5);
    pub const ESI: Register = Register(6);
    pub const EDI: Register = Register(7);

    /// Name this register's encoding at the given operand size (1, 2, or 4
    /// bytes). Unrecognized sizes fall back to the 32-bit name.
    pub fn name(self, size: u8) -> &'static str {
        const NAMES32: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];
        const NAMES16: [&str; 8] = ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];
        const NAMES8: [&str; 8] = ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"];
        let idx = (self.0 & 7) as usize;
        match size {
            1 => NAMES8[idx],
            2 => NAMES16[idx],
            _ => NAMES32[idx],
        }
    }
}
