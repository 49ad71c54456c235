//! End-to-end orchestration.
//!
//! Everything above this module operates on one stage's worth of data at a
//! time; [`translate`] is the one place that wires all five together: parse
//! the PE, decode its code section, lift to UIR, classify imports and
//! functions, and render the surviving ones as a Forth vocabulary. A caller
//! that wants finer control (a custom report, a different codegen target)
//! can call the stage modules directly instead — this is a convenience, not
//! the only path through the crate.

use crate::alloc::string::String;
use crate::alloc::vec::Vec;
use crate::codegen::{self, CodegenInput, CodegenOpts, Dependency, GenFunction, PortOp};
use crate::decoder::{Decoder, OperandKind};
use crate::error::{self, Error};
use crate::options::ParseMode;
use crate::pe::export::ExportAddress;
use crate::pe::{self, PE};
use crate::semantic::{self, AnalyzedFunction, ClassifiedImport};
use crate::uir::{self, Function as UirFunction, Opcode};

use log::info;

/// Catalog metadata the pipeline can't derive from the binary itself, plus
/// how to treat a malformed import/export table entry.
#[derive(Debug, Clone)]
pub struct TranslateOpts {
    pub vocab_name: String,
    pub category: String,
    pub confidence: String,
    /// `Strict` (the default) rejects the whole image on a malformed import
    /// or export entry; `Permissive` logs a warning and extracts whatever
    /// imports/exports do resolve.
    pub parse_mode: ParseMode,
}

impl Default for TranslateOpts {
    fn default() -> Self {
        TranslateOpts {
            vocab_name: String::from("EXTRACTED"),
            category: String::from("unknown"),
            confidence: String::from("low"),
            parse_mode: ParseMode::Strict,
        }
    }
}

/// What one `translate` call produces: the classification results, for a
/// caller that wants to build its own report, plus the rendered source.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub classified_imports: Vec<ClassifiedImport>,
    pub analyzed_functions: Vec<AnalyzedFunction>,
    pub source: String,
}

/// Pull the `PortIn`/`PortOut` operations out of a lifted function's blocks,
/// in program order, for handing to the code generator. Only the
/// immediate-port form is captured — DX-register ports have no fixed offset
/// to emit a `CONSTANT` for.
fn port_ops_of(func: &UirFunction) -> Vec<PortOp> {
    let mut ops = Vec::new();
    for block in &func.blocks {
        for inst in &block.instructions {
            match inst.opcode {
                Opcode::PortIn if inst.src1.kind == OperandKind::Imm => {
                    ops.push(PortOp {
                        port_offset: inst.src1.imm as u16,
                        size: inst.size,
                        is_write: false,
                    });
                }
                Opcode::PortOut if inst.dest.kind == OperandKind::Imm => {
                    ops.push(PortOp {
                        port_offset: inst.dest.imm as u16,
                        size: inst.size,
                        is_write: true,
                    });
                }
                _ => {}
            }
        }
    }
    ops
}

/// Run a PE image through the whole extraction pipeline and render a Forth
/// vocabulary source module for whatever hardware-relevant functions it
/// found.
pub fn translate(bytes: &[u8], opts: &TranslateOpts) -> error::Result<PipelineOutput> {
    let pe_opts = pe::options::ParseOptions {
        parse_mode: opts.parse_mode,
        ..pe::options::ParseOptions::default()
    };
    let pe = PE::parse_with_opts(bytes, &pe_opts)?;

    let code_section = pe
        .code_section()
        .ok_or_else(|| Error::Malformed(String::from("no section carries executable code")))?;
    let code_bytes = pe
        .section_bytes(code_section)
        .ok_or_else(|| Error::Malformed(String::from("code section's raw data is out of range")))?;

    let base_address = pe.image_base as u64 + code_section.virtual_address as u64;
    let mut decoder = Decoder::new(code_bytes, base_address);
    let insts = decoder.decode_range();

    let entry_address = pe.image_base as u64 + pe.entry as u64;
    let func = uir::lift(&insts, entry_address)
        .ok_or_else(|| Error::Malformed(String::from("code section decoded to nothing")))?;

    info!(
        "lifted {} block(s) from entry {:#x}, has_port_io={}",
        func.blocks.len(),
        entry_address,
        func.has_port_io
    );

    let classified_imports = semantic::classify_imports(&pe.imports);

    let export_name_for = |addr: u64| -> Option<String> {
        pe.exports.iter().find_map(|e| match e.address {
            ExportAddress::Rva(rva) if pe.image_base as u64 + rva as u64 == addr => e.name.clone(),
            _ => None,
        })
    };
    let analyzed = semantic::analyze_functions(&[(entry_address, &func)], &export_name_for);

    let ops = port_ops_of(&func);

    // The HARDWARE vocabulary words this module's kept functions actually
    // call, in the order they first appear — not the imported API names,
    // since a function can use port I/O without importing a wrapper for it.
    let mut hardware_words: Vec<String> = Vec::new();
    for op in &ops {
        let word = if op.is_write {
            codegen::write_word_for_size(op.size)
        } else {
            codegen::read_word_for_size(op.size)
        };
        if !hardware_words.iter().any(|w| w == word) {
            hardware_words.push(String::from(word));
        }
    }
    let mut requires = Vec::new();
    if !hardware_words.is_empty() {
        requires.push(Dependency {
            vocab_name: String::from("HARDWARE"),
            words_used: hardware_words,
        });
    }

    let gen_functions: Vec<GenFunction> = analyzed
        .iter()
        .filter(|f| f.is_hardware)
        .map(|f| GenFunction {
            name: f.name.clone(),
            address: f.address,
            port_ops: ops.clone(),
        })
        .collect();

    let mut port_offsets: Vec<u16> = Vec::new();
    for gf in &gen_functions {
        for op in &gf.port_ops {
            if !port_offsets.contains(&op.port_offset) {
                port_offsets.push(op.port_offset);
            }
        }
    }
    port_offsets.sort_unstable();

    let ports_desc = match port_offsets.first() {
        Some(&min_port) => codegen::port_range_desc(min_port, port_offsets.len()),
        None => String::from("none"),
    };

    let codegen_opts = CodegenOpts {
        vocab_name: opts.vocab_name.clone(),
        category: opts.category.clone(),
        source_binary: pe
            .name
            .clone()
            .unwrap_or_else(|| String::from("extracted.sys")),
        confidence: opts.confidence.clone(),
        requires,
        ports_desc,
        ..CodegenOpts::default()
    };

    let source = codegen::generate(&CodegenInput {
        opts: codegen_opts,
        functions: gen_functions,
        port_offsets,
    });

    Ok(PipelineOutput {
        classified_imports,
        analyzed_functions: analyzed,
        source,
    })
}

/// Render [`semantic::report`] for a completed pipeline run — a convenience
/// for callers that want both the generated source and a human-readable
/// summary without re-running classification themselves.
pub fn report(output: &PipelineOutput) -> String {
    semantic::report(&output.classified_imports, &output.analyzed_functions)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds the minimal PE32 fixture common to these tests: MZ/PE headers,
    /// one `.text` section (CODE|EXECUTE), optionally one import descriptor
    /// for `ntoskrnl.exe!READ_PORT_UCHAR`.
    fn build_pe32(code: &[u8], with_import: bool) -> Vec<u8> {
        const FILE_ALIGN: u32 = 0x200;
        const SECTION_ALIGN: u32 = 0x1000;
        const IMAGE_BASE: u32 = 0x10000;
        const TEXT_RVA: u32 = 0x1000;

        let headers_size = FILE_ALIGN as usize; // headers occupy the first file-aligned chunk
        let mut text_raw = code.to_vec();
        while text_raw.len() % FILE_ALIGN as usize != 0 {
            text_raw.push(0x90);
        }
        if text_raw.is_empty() {
            text_raw = alloc::vec![0u8; FILE_ALIGN as usize];
        }

        // Import directory layout, placed right after the code if requested:
        // one descriptor + null terminator, one ILT/IAT entry + null, a DLL
        // name string, and a hint/name entry.
        let import_rva = TEXT_RVA + text_raw.len() as u32;
        let mut import_blob: Vec<u8> = Vec::new();
        let mut import_table_rva = 0u32;
        if with_import {
            import_table_rva = import_rva;
            let descriptor_size = 20u32;
            let ilt_rva = import_rva + descriptor_size * 2; // after 1 descriptor + null terminator
            let iat_rva = ilt_rva + 4 * 2; // after 1 ILT entry + null
            let dll_name_rva = iat_rva + 4 * 2;
            let dll_name = b"ntoskrnl.exe\0";
            let hint_name_rva = dll_name_rva + dll_name.len() as u32;

            // descriptor
            import_blob.extend_from_slice(&ilt_rva.to_le_bytes());
            import_blob.extend_from_slice(&0u32.to_le_bytes());
            import_blob.extend_from_slice(&0u32.to_le_bytes());
            import_blob.extend_from_slice(&dll_name_rva.to_le_bytes());
            import_blob.extend_from_slice(&iat_rva.to_le_bytes());
            // null descriptor
            import_blob.extend_from_slice(&[0u8; 20]);
            // ILT: one entry pointing at hint/name, then null
            import_blob.extend_from_slice(&hint_name_rva.to_le_bytes());
            import_blob.extend_from_slice(&0u32.to_le_bytes());
            // IAT: same shape
            import_blob.extend_from_slice(&hint_name_rva.to_le_bytes());
            import_blob.extend_from_slice(&0u32.to_le_bytes());
            // DLL name
            import_blob.extend_from_slice(dll_name);
            // hint/name: 2-byte hint then NUL-terminated name
            import_blob.extend_from_slice(&0u16.to_le_bytes());
            import_blob.extend_from_slice(b"READ_PORT_UCHAR\0");

            while import_blob.len() % FILE_ALIGN as usize != 0 {
                import_blob.push(0);
            }
        }

        let sections_raw_size = text_raw.len() + import_blob.len();
        let total_size = headers_size + sections_raw_size;
        let mut buf = alloc::vec![0u8; total_size];

        // DOS header
        buf[0] = b'M';
        buf[1] = b'Z';
        let e_lfanew: u32 = 0x40;
        buf[0x3c..0x40].copy_from_slice(&e_lfanew.to_le_bytes());

        let mut off = e_lfanew as usize;
        buf[off..off + 4].copy_from_slice(b"PE\0\0");
        off += 4;

        // COFF header
        let number_of_sections: u16 = if with_import { 2 } else { 1 };
        buf[off..off + 2].copy_from_slice(&0x14cu16.to_le_bytes()); // i386
        off += 2;
        buf[off..off + 2].copy_from_slice(&number_of_sections.to_le_bytes());
        off += 2;
        off += 4; // time_date_stamp
        off += 4; // pointer_to_symbol_table
        off += 4; // number_of_symbols
        let size_of_optional_header: u16 = 224; // PE32 standard size
        buf[off..off + 2].copy_from_slice(&size_of_optional_header.to_le_bytes());
        off += 2;
        off += 2; // characteristics

        let optional_header_start = off;
        // Optional header: magic (PE32)
        buf[off..off + 2].copy_from_slice(&0x10bu16.to_le_bytes());
        off += 2;
        off += 2; // linker version
        off += 4; // size_of_code
        off += 4; // size_of_initialized_data
        off += 4; // size_of_uninitialized_data
        let address_of_entry_point: u32 = TEXT_RVA;
        buf[off..off + 4].copy_from_slice(&address_of_entry_point.to_le_bytes());
        off += 4;
        off += 4; // base_of_code
        off += 4; // base_of_data (PE32 only)
        buf[off..off + 4].copy_from_slice(&IMAGE_BASE.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&SECTION_ALIGN.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&FILE_ALIGN.to_le_bytes());
        off += 4;
        off += 2 + 2; // major/minor os version
        off += 2 + 2; // major/minor image version
        off += 2 + 2; // major/minor subsystem version
        off += 4; // win32_version_value
        let size_of_image: u32 = SECTION_ALIGN * (number_of_sections as u32 + 1);
        buf[off..off + 4].copy_from_slice(&size_of_image.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&(headers_size as u32).to_le_bytes());
        off += 4;
        off += 4; // checksum
        off += 2; // subsystem
        off += 2; // dll_characteristics
        off += 4 * 4; // stack/heap reserve+commit
        off += 4; // loader_flags
        let number_of_rva_and_sizes: u32 = 16;
        buf[off..off + 4].copy_from_slice(&number_of_rva_and_sizes.to_le_bytes());
        off += 4;

        // Data directories: export (0), import (1), ... 16 entries of 8 bytes.
        let data_dir_start = off;
        if with_import {
            let import_dir_off = data_dir_start + 1 * 8;
            buf[import_dir_off..import_dir_off + 4].copy_from_slice(&import_table_rva.to_le_bytes());
            buf[import_dir_off + 4..import_dir_off + 8]
                .copy_from_slice(&(import_blob.len() as u32).to_le_bytes());
        }
        off = data_dir_start + 16 * 8;
        assert_eq!(off - optional_header_start, size_of_optional_header as usize);

        // Section headers
        let mut text_header = [0u8; 40];
        text_header[0..5].copy_from_slice(b".text");
        text_header[8..12].copy_from_slice(&(text_raw.len() as u32).to_le_bytes()); // virtual_size
        text_header[12..16].copy_from_slice(&TEXT_RVA.to_le_bytes());
        text_header[16..20].copy_from_slice(&(text_raw.len() as u32).to_le_bytes()); // size_of_raw_data
        text_header[20..24].copy_from_slice(&(headers_size as u32).to_le_bytes());
        const CODE: u32 = 0x0000_0020;
        const EXECUTE: u32 = 0x2000_0000;
        const READ: u32 = 0x4000_0000;
        text_header[36..40].copy_from_slice(&(CODE | EXECUTE | READ).to_le_bytes());
        buf[off..off + 40].copy_from_slice(&text_header);
        off += 40;

        let text_file_off = headers_size;
        if with_import {
            let mut rdata_header = [0u8; 40];
            rdata_header[0..6].copy_from_slice(b".rdata");
            rdata_header[8..12].copy_from_slice(&(import_blob.len() as u32).to_le_bytes());
            rdata_header[12..16].copy_from_slice(&import_rva.to_le_bytes());
            rdata_header[16..20].copy_from_slice(&(import_blob.len() as u32).to_le_bytes());
            let rdata_file_off = text_file_off + text_raw.len();
            rdata_header[20..24].copy_from_slice(&(rdata_file_off as u32).to_le_bytes());
            rdata_header[36..40].copy_from_slice(&READ.to_le_bytes());
            buf[off..off + 40].copy_from_slice(&rdata_header);

            buf[rdata_file_off..rdata_file_off + import_blob.len()].copy_from_slice(&import_blob);
        }

        buf[text_file_off..text_file_off + text_raw.len()].copy_from_slice(&text_raw);
        buf
    }

    #[test]
    fn full_pipeline_over_driver_fixture() {
        // IN AL, 0x60 ; OUT 0x61, AL ; RET
        let code = [0xE4, 0x60, 0xE6, 0x61, 0xC3];
        let bytes = build_pe32(&code, true);

        let opts = TranslateOpts {
            vocab_name: String::from("PIPELINE-TEST"),
            category: String::from("unknown"),
            confidence: String::from("low"),
            parse_mode: ParseMode::Strict,
        };
        let output = translate(&bytes, &opts).expect("pipeline succeeds over the fixture");

        assert!(output.source.contains("CATALOG:"));
        assert!(output.source.contains("VOCABULARY PIPELINE-TEST"));
        assert!(output.source.contains("HEX"));
        assert!(output
            .source
            .contains("REQUIRES: HARDWARE ( C@-PORT C!-PORT )"));
        assert!(output.source.contains("VARIABLE"));
        assert!(output.source.contains("60 CONSTANT REG-60"));
        assert!(output.source.contains("61 CONSTANT REG-61"));
        assert!(output.source.trim_end().ends_with("FORTH DEFINITIONS\nDECIMAL"));

        assert_eq!(output.classified_imports.len(), 1);
        assert!(output.classified_imports[0].category.is_hardware());
        assert!(output.analyzed_functions[0].is_hardware);
    }

    #[test]
    fn pipeline_without_imports_still_emits_ports() {
        // A function can use port I/O without the binary importing a
        // hardware-API wrapper for it; REQUIRES is driven by what the
        // lifted function actually does, not by the import table.
        let code = [0xE4, 0x60, 0xC3];
        let bytes = build_pe32(&code, false);
        let output = translate(&bytes, &TranslateOpts::default())
            .expect("pipeline succeeds without an import table");
        assert!(output.classified_imports.is_empty());
        assert!(output.source.contains("60 CONSTANT REG-60"));
        assert!(output.source.contains("REQUIRES: HARDWARE ( C@-PORT )"));
    }
}
