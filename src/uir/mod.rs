//! Universal Intermediate Representation
//!
//! Platform-neutral lift target for the x86 decoder's output. The one
//! mapping that matters for driver extraction: `IN`/`OUT` become
//! [`Opcode::PortIn`]/[`Opcode::PortOut`] with the port number preserved as
//! an operand — everything downstream that cares about hardware I/O reads
//! straight off that, rather than re-deriving it from raw x86 mnemonics.
//!
//! Lifting a flat instruction stream into a [`Function`] of [`Block`]s is a
//! three-pass algorithm: collect branch targets, build blocks while lifting
//! each instruction, then link fall-through/branch edges between blocks by
//! address. [`lift`] takes decoder output directly rather than going through
//! an intermediate exchange type — there is only one x86 input
//! representation in this crate, so duplicating it to decouple the lifter
//! from the decoder buys nothing.

use crate::alloc::vec::Vec;
use crate::decoder::{ConditionCode, DecodedInstruction, Instruction, Operand, OperandKind, Register};

/// A UIR operation. Anything the decoder couldn't classify, or that has no
/// bearing on hardware behavior, lifts to [`Opcode::Nop`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    Nop,

    Mov,
    Load,
    Store,
    Push,
    Pop,
    Lea,
    Movzx,
    Movsx,

    Add,
    Sub,
    Mul,
    Imul,
    Div,
    Idiv,
    Neg,
    Inc,
    Dec,

    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sar,

    Cmp,
    Test,

    Jmp,
    Jcc,
    Call,
    Ret,

    /// `dest = port_read(src1.port, size)` — the signal driver extraction
    /// exists to find.
    PortIn,
    /// `port_write(dest.port, src1, size)`.
    PortOut,

    Cli,
    Sti,
    Hlt,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Mov => "mov",
            Load => "load",
            Store => "store",
            Push => "push",
            Pop => "pop",
            Lea => "lea",
            Movzx => "movzx",
            Movsx => "movsx",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Imul => "imul",
            Div => "div",
            Idiv => "idiv",
            Neg => "neg",
            Inc => "inc",
            Dec => "dec",
            And => "and",
            Or => "or",
            Xor => "xor",
            Not => "not",
            Shl => "shl",
            Shr => "shr",
            Sar => "sar",
            Cmp => "cmp",
            Test => "test",
            Jmp => "jmp",
            Jcc => "jcc",
            Call => "call",
            Ret => "ret",
            PortIn => "port_in",
            PortOut => "port_out",
            Cli => "cli",
            Sti => "sti",
            Hlt => "hlt",
        }
    }
}

/// A UIR operand. The disp field doubles as a memory operand's displacement
/// and, for [`Opcode::PortIn`]/[`Opcode::PortOut`]'s immediate-port form,
/// would be redundant with `imm` — port numbers travel through `imm` like
/// any other immediate, keeping one meaning per field.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct UirOperand {
    pub kind: OperandKind,
    pub size: u8,
    pub reg: Option<Register>,
    pub index: Option<Register>,
    pub scale: u8,
    pub disp: i32,
    pub imm: i64,
}

impl UirOperand {
    pub fn none() -> Self {
        UirOperand::default()
    }

    fn from_x86(op: &Operand) -> Self {
        match op.kind {
            OperandKind::None => UirOperand::none(),
            OperandKind::Reg => UirOperand {
                kind: OperandKind::Reg,
                size: op.size,
                reg: op.reg,
                ..UirOperand::default()
            },
            OperandKind::Mem => UirOperand {
                kind: OperandKind::Mem,
                size: op.size,
                reg: op.reg,
                index: op.index,
                scale: op.scale,
                disp: op.disp,
                ..UirOperand::default()
            },
            OperandKind::Imm => UirOperand {
                kind: OperandKind::Imm,
                size: op.size,
                imm: op.imm,
                ..UirOperand::default()
            },
            OperandKind::Rel => UirOperand {
                kind: OperandKind::Rel,
                imm: op.imm,
                ..UirOperand::default()
            },
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == OperandKind::None
    }
}

fn operand_at(operands: &[Operand], idx: usize) -> Operand {
    operands.get(idx).copied().unwrap_or_default()
}

/// One lifted instruction.
#[derive(Debug, Clone)]
pub struct UirInstruction {
    pub opcode: Opcode,
    pub dest: UirOperand,
    pub src1: UirOperand,
    pub src2: UirOperand,
    pub size: u8,
    pub original_address: u64,
    pub cc: Option<ConditionCode>,
}

impl UirInstruction {
    fn new(opcode: Opcode, original_address: u64) -> Self {
        UirInstruction {
            opcode,
            dest: UirOperand::none(),
            src1: UirOperand::none(),
            src2: UirOperand::none(),
            size: 0,
            original_address,
            cc: None,
        }
    }
}

/// A basic block: a straight-line run of instructions with at most one
/// fall-through successor and one branch successor, both given as indices
/// into the owning [`Function`]'s block array.
#[derive(Debug, Clone)]
pub struct Block {
    pub address: u64,
    pub instructions: Vec<UirInstruction>,
    pub fall_through: Option<usize>,
    pub branch_target: Option<usize>,
    pub is_entry: bool,
}

impl Block {
    fn new(address: u64) -> Self {
        Block {
            address,
            instructions: Vec::new(),
            fall_through: None,
            branch_target: None,
            is_entry: false,
        }
    }

    /// The instruction a fall-through/branch-target decision is made from.
    /// Lifting never produces an empty block, so this only panics on a
    /// caller-constructed empty `Block`.
    fn last(&self) -> &UirInstruction {
        self.instructions.last().expect("block has no instructions")
    }
}

/// A lifted function: its basic blocks plus the port-I/O summary the
/// semantic classifier reads first.
#[derive(Debug, Clone)]
pub struct Function {
    pub blocks: Vec<Block>,
    pub entry_address: u64,
    pub ports_read: Vec<u16>,
    pub ports_written: Vec<u16>,
    pub has_port_io: bool,
    pub uses_dx_register_port: bool,
}

/// Inserts `port` into `ports` in sorted position, deduplicating. Keeps the
/// function's `ports_read`/`ports_written` sorted and duplicate-free without
/// a separate sort pass after lifting.
fn add_port(ports: &mut Vec<u16>, port: u16) {
    if let Err(i) = ports.binary_search(&port) {
        ports.insert(i, port);
    }
}

/// Lift one x86 instruction. `func`'s port-I/O summary fields are updated in
/// place for `IN`/`OUT`.
fn lift_one(x86: &DecodedInstruction, func: &mut Function) -> UirInstruction {
    let mut uir = UirInstruction::new(Opcode::Nop, x86.address);
    let op0 = operand_at(&x86.operands, 0);
    let op1 = operand_at(&x86.operands, 1);

    match x86.instruction {
        Instruction::In => {
            uir.opcode = Opcode::PortIn;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
            func.has_port_io = true;
            if op1.kind == OperandKind::Reg {
                func.uses_dx_register_port = true;
            }
        }
        Instruction::Out => {
            uir.opcode = Opcode::PortOut;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op1.size;
            func.has_port_io = true;
            if op0.kind == OperandKind::Reg {
                func.uses_dx_register_port = true;
            }
        }

        Instruction::Mov => {
            if op0.kind == OperandKind::Reg && op1.kind == OperandKind::Mem {
                uir.opcode = Opcode::Load;
            } else if op0.kind == OperandKind::Mem {
                uir.opcode = Opcode::Store;
            } else {
                uir.opcode = Opcode::Mov;
            }
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Movzx => {
            uir.opcode = Opcode::Movzx;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Movsx => {
            uir.opcode = Opcode::Movsx;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Lea => {
            uir.opcode = Opcode::Lea;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Push => {
            uir.opcode = Opcode::Push;
            uir.src1 = UirOperand::from_x86(&op0);
            uir.size = 4;
        }
        Instruction::Pop => {
            uir.opcode = Opcode::Pop;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = 4;
        }
        Instruction::Xchg => {
            // Collapsed to MOV: a driver's port-I/O behavior never hinges on
            // XCHG's atomicity, only on the values it moves.
            uir.opcode = Opcode::Mov;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }

        Instruction::Add => {
            uir.opcode = Opcode::Add;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Sub => {
            uir.opcode = Opcode::Sub;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Mul => {
            uir.opcode = Opcode::Mul;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = op0.size;
        }
        Instruction::Imul => {
            uir.opcode = Opcode::Imul;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Div => {
            uir.opcode = Opcode::Div;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = op0.size;
        }
        Instruction::Idiv => {
            uir.opcode = Opcode::Idiv;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = op0.size;
        }
        Instruction::Neg => {
            uir.opcode = Opcode::Neg;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = op0.size;
        }
        Instruction::Inc => {
            uir.opcode = Opcode::Inc;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = op0.size;
        }
        Instruction::Dec => {
            uir.opcode = Opcode::Dec;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = op0.size;
        }

        Instruction::And => {
            uir.opcode = Opcode::And;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Or => {
            uir.opcode = Opcode::Or;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Xor => {
            uir.opcode = Opcode::Xor;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Not => {
            uir.opcode = Opcode::Not;
            uir.dest = UirOperand::from_x86(&op0);
            uir.size = op0.size;
        }
        Instruction::Shl | Instruction::Rol => {
            uir.opcode = Opcode::Shl;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Shr | Instruction::Ror => {
            uir.opcode = Opcode::Shr;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Sar => {
            uir.opcode = Opcode::Sar;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }

        Instruction::Cmp => {
            uir.opcode = Opcode::Cmp;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }
        Instruction::Test => {
            uir.opcode = Opcode::Test;
            uir.dest = UirOperand::from_x86(&op0);
            uir.src1 = UirOperand::from_x86(&op1);
            uir.size = op0.size;
        }

        Instruction::Jmp => {
            uir.opcode = Opcode::Jmp;
            uir.dest = UirOperand::from_x86(&op0);
        }
        Instruction::Jcc => {
            uir.opcode = Opcode::Jcc;
            uir.cc = x86.cc;
            uir.dest = UirOperand::from_x86(&op0);
        }
        Instruction::Call => {
            uir.opcode = Opcode::Call;
            uir.dest = UirOperand::from_x86(&op0);
        }
        Instruction::Ret => {
            uir.opcode = Opcode::Ret;
        }

        Instruction::Cli => uir.opcode = Opcode::Cli,
        Instruction::Sti => uir.opcode = Opcode::Sti,
        Instruction::Hlt => uir.opcode = Opcode::Hlt,
        Instruction::Nop => uir.opcode = Opcode::Nop,

        // Everything not otherwise modeled (string ops, SETcc, flag twiddling
        // with no hardware-facing side effect) lifts to NOP; the semantic
        // classifier only ever looks at calls and port I/O.
        _ => uir.opcode = Opcode::Nop,
    }

    uir
}

/// Lift a flat decoded instruction stream into a [`Function`] of basic
/// blocks. Returns `None` for an empty stream.
pub fn lift(insts: &[DecodedInstruction], entry_address: u64) -> Option<Function> {
    if insts.is_empty() {
        return None;
    }

    let mut func = Function {
        blocks: Vec::new(),
        entry_address,
        ports_read: Vec::new(),
        ports_written: Vec::new(),
        has_port_io: false,
        uses_dx_register_port: false,
    };

    // Pass 1: collect branch targets. The entry address always starts a
    // block; so does the instruction right after any JMP/JCC/LOOP/RET/HLT
    // and any address a branch targets directly.
    let mut targets: Vec<u64> = Vec::new();
    let mut add_target = |targets: &mut Vec<u64>, addr: u64| {
        if !targets.contains(&addr) {
            targets.push(addr);
        }
    };
    add_target(&mut targets, entry_address);

    for (i, x) in insts.iter().enumerate() {
        let is_branch = matches!(
            x.instruction,
            Instruction::Jmp | Instruction::Jcc | Instruction::Loop
        );
        if is_branch {
            if let Some(op) = x.operands.first() {
                if matches!(op.kind, OperandKind::Rel | OperandKind::Imm) {
                    add_target(&mut targets, op.imm as u64);
                }
            }
            if let Some(next) = insts.get(i + 1) {
                add_target(&mut targets, next.address);
            }
        }
        if matches!(x.instruction, Instruction::Ret | Instruction::Hlt) {
            if let Some(next) = insts.get(i + 1) {
                add_target(&mut targets, next.address);
            }
        }
    }

    // Pass 2: build blocks, splitting at every target address, lifting each
    // instruction as its block is assembled.
    for x in insts {
        let need_new_block = func.blocks.is_empty() || targets.contains(&x.address);
        if need_new_block {
            let mut block = Block::new(x.address);
            if x.address == entry_address {
                block.is_entry = true;
            }
            func.blocks.push(block);
        }

        let uir_ins = lift_one(x, &mut func);

        if uir_ins.opcode == Opcode::PortIn && uir_ins.src1.kind == OperandKind::Imm {
            add_port(&mut func.ports_read, uir_ins.src1.imm as u16);
        }
        if uir_ins.opcode == Opcode::PortOut && uir_ins.dest.kind == OperandKind::Imm {
            add_port(&mut func.ports_written, uir_ins.dest.imm as u16);
        }

        func.blocks
            .last_mut()
            .expect("just pushed or already present")
            .instructions
            .push(uir_ins);
    }

    // Pass 3: link fall-through and branch edges. `last` is each block's own
    // final instruction — not, as a stray read of the first instruction in
    // the whole stream would give you, an answer that's the same for every
    // block regardless of how it actually ends.
    let block_count = func.blocks.len();
    for b in 0..block_count {
        if func.blocks[b].instructions.is_empty() {
            continue;
        }
        let last_opcode = func.blocks[b].last().opcode;
        let last_dest_imm = func.blocks[b].last().dest.imm as u64;

        if last_opcode != Opcode::Jmp && last_opcode != Opcode::Ret {
            if b + 1 < block_count {
                func.blocks[b].fall_through = Some(b + 1);
            }
        }

        if last_opcode == Opcode::Jcc || last_opcode == Opcode::Jmp {
            let target_idx = func.blocks.iter().position(|blk| blk.address == last_dest_imm);
            func.blocks[b].branch_target = target_idx;

            if last_opcode == Opcode::Jcc && b + 1 < block_count {
                func.blocks[b].fall_through = Some(b + 1);
            }
            if last_opcode == Opcode::Jmp {
                func.blocks[b].fall_through = None;
            }
        }
    }

    Some(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;

    fn lift_code(code: &[u8], base: u64) -> Function {
        let mut dec = Decoder::new(code, base);
        let insts = dec.decode_range();
        lift(&insts, base).expect("nonempty input lifts")
    }

    #[test]
    fn in_out_set_port_io_summary() {
        // IN AL, 0x60 ; OUT 0x61, AL ; RET
        let code = [0xE4, 0x60, 0xE6, 0x61, 0xC3];
        let func = lift_code(&code, 0);
        assert!(func.has_port_io);
        assert!(!func.uses_dx_register_port);
        assert_eq!(func.ports_read.as_slice(), [0x60u16].as_slice());
        assert_eq!(func.ports_written.as_slice(), [0x61u16].as_slice());
    }

    #[test]
    fn dx_port_is_flagged() {
        // IN AL, DX ; RET
        let code = [0xEC, 0xC3];
        let func = lift_code(&code, 0);
        assert!(func.uses_dx_register_port);
        assert!(func.ports_read.is_empty());
    }

    #[test]
    fn conditional_branch_splits_into_three_blocks() {
        // CMP EAX, 0 ; JE +1 ; NOP ; NOP ; RET
        let code = [0x83, 0xF8, 0x00, 0x74, 0x01, 0x90, 0x90, 0xC3];
        let func = lift_code(&code, 0x1000);
        assert_eq!(func.blocks.len(), 3);
        assert!(func.blocks[0].is_entry);
        assert_eq!(func.blocks[0].last().opcode, Opcode::Jcc);
        assert_eq!(func.blocks[0].fall_through, Some(1));
        assert!(func.blocks[0].branch_target.is_some());
    }

    #[test]
    fn unconditional_jump_has_no_fall_through() {
        // JMP +0 (to next instruction) ; RET
        let code = [0xEB, 0x00, 0xC3];
        let func = lift_code(&code, 0);
        assert_eq!(func.blocks[0].last().opcode, Opcode::Jmp);
        assert_eq!(func.blocks[0].fall_through, None);
        assert_eq!(func.blocks[0].branch_target, Some(1));
    }

    #[test]
    fn mov_reg_mem_becomes_load() {
        // MOV EAX, [EBX] ; RET
        let code = [0x8B, 0x03, 0xC3];
        let func = lift_code(&code, 0);
        assert_eq!(func.blocks[0].instructions[0].opcode, Opcode::Load);
    }

    #[test]
    fn mov_mem_reg_becomes_store() {
        // MOV [EBX], EAX ; RET
        let code = [0x89, 0x03, 0xC3];
        let func = lift_code(&code, 0);
        assert_eq!(func.blocks[0].instructions[0].opcode, Opcode::Store);
    }
}
