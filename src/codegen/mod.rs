//! Forth vocabulary source generator
//!
//! Renders the functions the semantic pass kept as a Forth vocabulary
//! source file, following the catalog-header-then-vocabulary-body pattern:
//! a structured comment block with `REQUIRES:` dependency lines, a
//! `VOCABULARY`/`DEFINITIONS`/`HEX` preamble, register offset constants, a
//! base variable with `-REG`/`@`/`!` accessors, one word per kept function,
//! and a `FORTH DEFINITIONS`/`DECIMAL` footer to leave the dictionary in a
//! clean state for whatever's compiled next.

use crate::alloc::format;
use crate::alloc::string::String;
use crate::alloc::vec::Vec;
use core::fmt::Write;

/// A named vocabulary this module's words build on, and the specific words
/// from it actually used — rendered as a `REQUIRES:` catalog line.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub vocab_name: String,
    pub words_used: Vec<String>,
}

/// Catalog metadata and naming options for one generated module.
#[derive(Debug, Clone)]
pub struct CodegenOpts {
    pub vocab_name: String,
    pub category: String,
    pub source_type: String,
    pub source_binary: String,
    pub vendor_id: String,
    pub device_id: String,
    pub ports_desc: String,
    pub mmio_desc: String,
    pub confidence: String,
    pub requires: Vec<Dependency>,
}

impl Default for CodegenOpts {
    fn default() -> Self {
        CodegenOpts {
            vocab_name: String::new(),
            category: String::from("unknown"),
            source_type: String::from("extracted"),
            source_binary: String::from("none"),
            vendor_id: String::from("none"),
            device_id: String::from("none"),
            ports_desc: String::from("none"),
            mmio_desc: String::from("none"),
            confidence: String::from("low"),
            requires: Vec::new(),
        }
    }
}

/// A single port access lifted out of a function's UIR.
#[derive(Debug, Clone)]
pub struct PortOp {
    pub port_offset: u16,
    pub size: u8,
    pub is_write: bool,
}

/// One function worth emitting as a Forth word.
#[derive(Debug, Clone)]
pub struct GenFunction {
    pub name: String,
    pub address: u64,
    pub port_ops: Vec<PortOp>,
}

/// Everything [`generate`] needs to render one module.
#[derive(Debug, Clone)]
pub struct CodegenInput {
    pub opts: CodegenOpts,
    pub functions: Vec<GenFunction>,
    /// Unique register offsets across all functions, in emission order.
    pub port_offsets: Vec<u16>,
}

pub(crate) fn read_word_for_size(size: u8) -> &'static str {
    match size {
        1 => "C@-PORT",
        2 => "W@-PORT",
        4 => "@-PORT",
        _ => "C@-PORT",
    }
}

pub(crate) fn write_word_for_size(size: u8) -> &'static str {
    match size {
        1 => "C!-PORT",
        2 => "W!-PORT",
        4 => "!-PORT",
        _ => "C!-PORT",
    }
}

fn emit_catalog_header(out: &mut String, opts: &CodegenOpts) {
    out.push_str("\\ ====================================================================\n");
    let _ = writeln!(out, "\\ CATALOG: {}", opts.vocab_name);
    let _ = writeln!(out, "\\ CATEGORY: {}", opts.category);
    let _ = writeln!(out, "\\ SOURCE: {}", opts.source_type);
    let _ = writeln!(out, "\\ SOURCE-BINARY: {}", opts.source_binary);
    let _ = writeln!(out, "\\ VENDOR-ID: {}", opts.vendor_id);
    let _ = writeln!(out, "\\ DEVICE-ID: {}", opts.device_id);
    let _ = writeln!(out, "\\ PORTS: {}", opts.ports_desc);
    let _ = writeln!(out, "\\ MMIO: {}", opts.mmio_desc);
    let _ = writeln!(out, "\\ CONFIDENCE: {}", opts.confidence);

    for dep in &opts.requires {
        let _ = write!(out, "\\ REQUIRES: {} ( ", dep.vocab_name);
        for (i, w) in dep.words_used.iter().enumerate() {
            if i != 0 {
                out.push(' ');
            }
            out.push_str(w);
        }
        out.push_str(" )\n");
    }

    out.push_str("\\ ====================================================================\n\n");
}

fn emit_vocabulary_preamble(out: &mut String, name: &str) {
    let _ = writeln!(out, "VOCABULARY {}", name);
    let _ = writeln!(out, "{} DEFINITIONS", name);
    out.push_str("HEX\n\n");
}

fn emit_register_constants(out: &mut String, offsets: &[u16]) {
    if offsets.is_empty() {
        return;
    }
    out.push_str("\\ ---- Register Offsets (extracted from driver) ----\n");
    for offset in offsets {
        let _ = writeln!(out, "{:02X} CONSTANT REG-{:02X}", offset, offset);
    }
    out.push('\n');
}

fn emit_base_accessors(out: &mut String, name: &str) {
    out.push_str("\\ ---- Hardware Base ----\n");
    let _ = writeln!(out, "VARIABLE {}-BASE\n", name);
    let _ = writeln!(out, ": {}-REG  ( offset -- port )  {}-BASE @ + ;", name, name);
    let _ = writeln!(out, ": {}@     ( offset -- byte )  {}-REG C@-PORT ;", name, name);
    let _ = writeln!(out, ": {}!     ( byte offset -- )  {}-REG C!-PORT ;\n", name, name);
}

fn emit_function(out: &mut String, func: &GenFunction, vocab_name: &str) {
    if func.port_ops.is_empty() {
        let _ = writeln!(out, ": {}  ( -- )  \\ extracted from {:#X}", func.name, func.address);
        out.push_str(";\n\n");
        return;
    }

    if func.port_ops.len() == 1 {
        let op = &func.port_ops[0];
        if op.is_write {
            let _ = writeln!(out, ": {}  ( value -- )", func.name);
            let _ = writeln!(
                out,
                "    {:02X} {}-REG {}",
                op.port_offset,
                vocab_name,
                write_word_for_size(op.size)
            );
        } else {
            let _ = writeln!(out, ": {}  ( -- value )", func.name);
            let _ = writeln!(
                out,
                "    {:02X} {}-REG {}",
                op.port_offset,
                vocab_name,
                read_word_for_size(op.size)
            );
        }
        out.push_str(";\n\n");
        return;
    }

    let _ = writeln!(
        out,
        ": {}  ( -- )  \\ {} port operations",
        func.name,
        func.port_ops.len()
    );
    for op in &func.port_ops {
        let word = if op.is_write {
            write_word_for_size(op.size)
        } else {
            read_word_for_size(op.size)
        };
        let _ = writeln!(out, "    {:02X} {}-REG {}", op.port_offset, vocab_name, word);
    }
    out.push_str(";\n\n");
}

fn emit_footer(out: &mut String) {
    out.push_str("FORTH DEFINITIONS\n");
    out.push_str("DECIMAL\n");
}

/// Render a complete Forth vocabulary source file for one extracted module.
pub fn generate(input: &CodegenInput) -> String {
    let mut out = String::new();

    emit_catalog_header(&mut out, &input.opts);
    emit_vocabulary_preamble(&mut out, &input.opts.vocab_name);
    emit_register_constants(&mut out, &input.port_offsets);

    let has_ports = !input.port_offsets.is_empty()
        || input.functions.iter().any(|f| !f.port_ops.is_empty());
    if has_ports {
        emit_base_accessors(&mut out, &input.opts.vocab_name);
    }

    if !input.functions.is_empty() {
        out.push_str("\\ ---- Extracted Functions ----\n");
        for func in &input.functions {
            emit_function(&mut out, func, &input.opts.vocab_name);
        }
    }

    emit_footer(&mut out);
    out
}

/// Build a port range description like `0x3F8-0x3FF`, or `0x3F8` for a
/// single register.
pub fn port_range_desc(base_port: u16, register_count: usize) -> String {
    if register_count <= 1 {
        format!("{:#X}", base_port)
    } else {
        format!("{:#X}-{:#X}", base_port, base_port as usize + register_count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_opts() -> CodegenOpts {
        CodegenOpts {
            vocab_name: String::from("SERIAL-16550"),
            category: String::from("serial"),
            ..CodegenOpts::default()
        }
    }

    #[test]
    fn catalog_header_carries_metadata() {
        let input = CodegenInput {
            opts: minimal_opts(),
            functions: Vec::new(),
            port_offsets: Vec::new(),
        };
        let out = generate(&input);
        assert!(out.contains("\\ CATALOG: SERIAL-16550"));
        assert!(out.contains("\\ CATEGORY: serial"));
        assert!(out.contains("\\ CONFIDENCE: low"));
        assert!(out.contains("VOCABULARY SERIAL-16550"));
        assert!(out.contains("SERIAL-16550 DEFINITIONS"));
        assert!(out.contains("HEX"));
        assert!(out.contains("FORTH DEFINITIONS"));
        assert!(out.contains("DECIMAL"));
    }

    #[test]
    fn requires_line_lists_words_used() {
        let mut opts = minimal_opts();
        opts.requires.push(Dependency {
            vocab_name: String::from("HARDWARE"),
            words_used: alloc::vec![String::from("C@-PORT"), String::from("C!-PORT")],
        });
        let input = CodegenInput {
            opts,
            functions: Vec::new(),
            port_offsets: Vec::new(),
        };
        let out = generate(&input);
        assert!(out.contains("\\ REQUIRES: HARDWARE ( C@-PORT C!-PORT )"));
    }

    #[test]
    fn single_read_port_op_emits_simple_word() {
        let input = CodegenInput {
            opts: minimal_opts(),
            functions: alloc::vec![GenFunction {
                name: String::from("SERIAL-16550-READ-LSR"),
                address: 0x1000,
                port_ops: alloc::vec![PortOp {
                    port_offset: 0x05,
                    size: 1,
                    is_write: false,
                }],
            }],
            port_offsets: alloc::vec![0x05],
        };
        let out = generate(&input);
        assert!(out.contains("05 CONSTANT REG-05"));
        assert!(out.contains("VARIABLE SERIAL-16550-BASE"));
        assert!(out.contains(": SERIAL-16550-READ-LSR  ( -- value )"));
        assert!(out.contains("05 SERIAL-16550-REG C@-PORT"));
    }

    #[test]
    fn single_write_port_op_emits_simple_word() {
        let input = CodegenInput {
            opts: minimal_opts(),
            functions: alloc::vec![GenFunction {
                name: String::from("SERIAL-16550-WRITE-THR"),
                address: 0x1010,
                port_ops: alloc::vec![PortOp {
                    port_offset: 0x00,
                    size: 1,
                    is_write: true,
                }],
            }],
            port_offsets: alloc::vec![0x00],
        };
        let out = generate(&input);
        assert!(out.contains(": SERIAL-16550-WRITE-THR  ( value -- )"));
        assert!(out.contains("00 SERIAL-16550-REG C!-PORT"));
    }

    #[test]
    fn multi_port_op_function_emits_sequential_accesses() {
        let input = CodegenInput {
            opts: minimal_opts(),
            functions: alloc::vec![GenFunction {
                name: String::from("SERIAL-16550-INIT"),
                address: 0x1020,
                port_ops: alloc::vec![
                    PortOp { port_offset: 0x03, size: 1, is_write: true },
                    PortOp { port_offset: 0x00, size: 1, is_write: true },
                    PortOp { port_offset: 0x01, size: 1, is_write: true },
                ],
            }],
            port_offsets: alloc::vec![0x00, 0x01, 0x03],
        };
        let out = generate(&input);
        assert!(out.contains(": SERIAL-16550-INIT  ( -- )  \\ 3 port operations"));
    }

    #[test]
    fn function_with_no_port_ops_emits_stub() {
        let input = CodegenInput {
            opts: minimal_opts(),
            functions: alloc::vec![GenFunction {
                name: String::from("SERIAL-16550-NOOP"),
                address: 0x2000,
                port_ops: Vec::new(),
            }],
            port_offsets: Vec::new(),
        };
        let out = generate(&input);
        assert!(out.contains(": SERIAL-16550-NOOP  ( -- )  \\ extracted from 0x2000"));
        assert!(!out.contains("VARIABLE SERIAL-16550-BASE"));
    }

    #[test]
    fn port_range_desc_single_register() {
        assert_eq!(port_range_desc(0x3F8, 1), "0x3F8");
    }

    #[test]
    fn port_range_desc_multiple_registers() {
        assert_eq!(port_range_desc(0x3F8, 8), "0x3F8-0x3FF");
    }
}
