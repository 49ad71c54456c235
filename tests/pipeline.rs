//! Black-box exercise of the public extraction pipeline, built the way an
//! external caller would use this crate: construct a PE image, call
//! [`driver_extract::pipeline::translate`], and inspect what comes back.

use driver_extract::pipeline::{translate, TranslateOpts};

/// Smallest PE32 that `PE::parse` accepts: MZ/PE headers and one `.text`
/// section, no imports. Large enough to drive the pipeline end to end
/// without an import table — a driver can talk to hardware through inline
/// `IN`/`OUT` without ever importing a `READ_PORT_*` wrapper for it.
fn minimal_pe32(code: &[u8]) -> Vec<u8> {
    const FILE_ALIGN: u32 = 0x200;
    const SECTION_ALIGN: u32 = 0x1000;
    const IMAGE_BASE: u32 = 0x10000;
    const TEXT_RVA: u32 = 0x1000;

    let headers_size = FILE_ALIGN as usize;
    let mut text_raw = code.to_vec();
    while text_raw.len() % FILE_ALIGN as usize != 0 {
        text_raw.push(0x90);
    }
    if text_raw.is_empty() {
        text_raw = vec![0u8; FILE_ALIGN as usize];
    }

    let total_size = headers_size + text_raw.len();
    let mut buf = vec![0u8; total_size];

    buf[0] = b'M';
    buf[1] = b'Z';
    let e_lfanew: u32 = 0x40;
    buf[0x3c..0x40].copy_from_slice(&e_lfanew.to_le_bytes());

    let mut off = e_lfanew as usize;
    buf[off..off + 4].copy_from_slice(b"PE\0\0");
    off += 4;

    buf[off..off + 2].copy_from_slice(&0x14cu16.to_le_bytes()); // i386
    off += 2;
    buf[off..off + 2].copy_from_slice(&1u16.to_le_bytes()); // number_of_sections
    off += 2;
    off += 4 + 4 + 4; // timestamp, symtab ptr, symbol count
    let size_of_optional_header: u16 = 224;
    buf[off..off + 2].copy_from_slice(&size_of_optional_header.to_le_bytes());
    off += 2;
    off += 2; // characteristics

    let optional_header_start = off;
    buf[off..off + 2].copy_from_slice(&0x10bu16.to_le_bytes()); // PE32 magic
    off += 2;
    off += 2; // linker version
    off += 4 + 4 + 4; // code/init-data/uninit-data sizes
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
    off += 2 * 6; // os/image/subsystem versions
    off += 4; // win32_version_value
    let size_of_image: u32 = SECTION_ALIGN * 2;
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

    off += 16 * 8; // data directories, all zeroed
    assert_eq!(off - optional_header_start, size_of_optional_header as usize);

    let mut text_header = [0u8; 40];
    text_header[0..5].copy_from_slice(b".text");
    text_header[8..12].copy_from_slice(&(text_raw.len() as u32).to_le_bytes());
    text_header[12..16].copy_from_slice(&TEXT_RVA.to_le_bytes());
    text_header[16..20].copy_from_slice(&(text_raw.len() as u32).to_le_bytes());
    text_header[20..24].copy_from_slice(&(headers_size as u32).to_le_bytes());
    const CODE: u32 = 0x0000_0020;
    const EXECUTE: u32 = 0x2000_0000;
    const READ: u32 = 0x4000_0000;
    text_header[36..40].copy_from_slice(&(CODE | EXECUTE | READ).to_le_bytes());
    buf[off..off + 40].copy_from_slice(&text_header);

    buf[headers_size..headers_size + text_raw.len()].copy_from_slice(&text_raw);
    buf
}

#[test]
fn translate_emits_a_forth_vocabulary_for_a_port_io_function() {
    let _ = stderrlog::new().verbosity(log::LevelFilter::Debug).init();

    // IN AL, 0x60 ; RET
    let bytes = minimal_pe32(&[0xE4, 0x60, 0xC3]);
    let output = translate(&bytes, &TranslateOpts::default())
        .expect("a minimal one-section PE32 is a valid input");

    assert!(output.source.contains("CATALOG: EXTRACTED"));
    assert!(output.source.contains("60 CONSTANT REG-60"));
    assert!(output.analyzed_functions[0].is_hardware);
}

#[test]
fn translate_rejects_a_truncated_dos_header() {
    let err = translate(&[0u8; 2], &TranslateOpts::default()).unwrap_err();
    assert!(matches!(
        err,
        driver_extract::error::Error::Malformed(_) | driver_extract::error::Error::Scroll(_)
    ));
}
