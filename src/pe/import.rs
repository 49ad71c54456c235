//! Import directory table
//!
//! Walks the import descriptor array and, for each DLL, its import lookup
//! table, producing a flat list of `(dll, function, IAT slot)` triples. This
//! is the raw material the semantic classifier matches against its API
//! table.

use crate::alloc::format;
use crate::alloc::string::{String, ToString};
use crate::alloc::vec::Vec;
use crate::error;
use crate::options::Permissive;
use crate::pe::section_table::SectionTable;
use scroll::Pread;

/// `IMAGE_IMPORT_DESCRIPTOR`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pread)]
pub struct ImportDirectoryEntry {
    pub import_lookup_table_rva: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub import_address_table_rva: u32,
}

pub const SIZEOF_IMPORT_DIRECTORY_ENTRY: usize = 20;

impl ImportDirectoryEntry {
    pub fn is_null(&self) -> bool {
        self.import_lookup_table_rva == 0
            && self.time_date_stamp == 0
            && self.forwarder_chain == 0
            && self.name_rva == 0
            && self.import_address_table_rva == 0
    }
}

/// Top bit of a 32-bit import lookup table entry marks an ordinal import.
pub const IMPORT_ORDINAL_FLAG_32: u32 = 0x8000_0000;
/// Top bit of a 64-bit import lookup table entry marks an ordinal import.
pub const IMPORT_ORDINAL_FLAG_64: u64 = 0x8000_0000_0000_0000;

/// Stops walking the descriptor array after this many entries, even without
/// a null terminator, to bound work on a malformed or hostile image.
pub const MAX_IMPORT_DESCRIPTORS: usize = 1000;
/// Stops collecting imported symbols after this many entries total.
pub const MAX_IMPORTED_SYMBOLS: usize = 10_000;

/// A single imported symbol: which DLL it comes from, its name (or a
/// synthesized `ORDINAL <n>` name for ordinal-only imports), and the RVA of
/// its IAT slot.
#[derive(Debug, Clone)]
pub struct Import {
    pub dll_name: String,
    pub func_name: String,
    pub ordinal: Option<u16>,
    pub iat_rva: u32,
}

fn rva_to_offset(rva: u32, sections: &[SectionTable]) -> error::Result<usize> {
    sections
        .iter()
        .find_map(|s| s.rva_to_file_offset(rva))
        .ok_or(error::Error::Malformed(format!(
            "RVA {:#x} does not fall within any section",
            rva
        )))
}

fn read_cstr_at(bytes: &[u8], offset: usize) -> error::Result<String> {
    let raw: &str = bytes.pread(offset)?;
    Ok(raw.to_string())
}

/// Parse the import directory table into a flat list of imports.
///
/// `is_64` selects 32- or 64-bit import lookup table entry width. Under
/// `permissive`, a descriptor whose name RVA is unresolvable keeps a
/// placeholder DLL name rather than aborting, and a descriptor whose import
/// lookup table RVA is unresolvable is skipped entirely; in strict mode both
/// cases propagate the error.
pub fn parse(
    bytes: &[u8],
    import_table_rva: u32,
    sections: &[SectionTable],
    is_64: bool,
    permissive: bool,
) -> error::Result<Vec<Import>> {
    let mut imports = Vec::new();
    let mut descriptor_offset = rva_to_offset(import_table_rva, sections)?;

    for _ in 0..MAX_IMPORT_DESCRIPTORS {
        if imports.len() >= MAX_IMPORTED_SYMBOLS {
            break;
        }
        let descriptor: ImportDirectoryEntry = bytes.gread_with(&mut descriptor_offset, scroll::LE)?;
        if descriptor.is_null() {
            break;
        }

        let dll_name = rva_to_offset(descriptor.name_rva, sections)
            .and_then(|off| read_cstr_at(bytes, off))
            .or_permissive_and_value(
                permissive,
                "import descriptor name RVA unresolvable",
                String::from("UNKNOWN_DLL"),
            )?;

        let ilt_rva = if descriptor.import_lookup_table_rva != 0 {
            descriptor.import_lookup_table_rva
        } else {
            descriptor.import_address_table_rva
        };
        let mut entry_offset = match rva_to_offset(ilt_rva, sections) {
            Ok(off) => off,
            Err(e) if permissive => {
                #[cfg(feature = "log")]
                log::warn!("import lookup table RVA unresolvable: {e}, skipping {dll_name}'s imports");
                continue;
            }
            Err(e) => return Err(e),
        };
        let iat_rva_base = descriptor.import_address_table_rva;
        let entry_size: usize = if is_64 { 8 } else { 4 };
        let mut index: u32 = 0;

        loop {
            if imports.len() >= MAX_IMPORTED_SYMBOLS {
                break;
            }
            let iat_rva = iat_rva_base + index * entry_size as u32;
            index += 1;

            if is_64 {
                let raw: u64 = bytes.gread_with(&mut entry_offset, scroll::LE)?;
                if raw == 0 {
                    break;
                }
                if raw & IMPORT_ORDINAL_FLAG_64 != 0 {
                    let ordinal = (raw & 0xffff) as u16;
                    imports.push(Import {
                        dll_name: dll_name.clone(),
                        func_name: format!("ORDINAL {}", ordinal),
                        ordinal: Some(ordinal),
                        iat_rva,
                    });
                } else {
                    let hint_name_rva = (raw & 0x7fff_ffff) as u32;
                    let func_name = rva_to_offset(hint_name_rva, sections)
                        .and_then(|off| read_cstr_at(bytes, off + 2))
                        .or_permissive_and_then(
                            permissive,
                            "import hint/name RVA unresolvable",
                            || format!("UNKNOWN_IMPORT_{:#x}", iat_rva),
                        )?;
                    imports.push(Import {
                        dll_name: dll_name.clone(),
                        func_name,
                        ordinal: None,
                        iat_rva,
                    });
                }
            } else {
                let raw: u32 = bytes.gread_with(&mut entry_offset, scroll::LE)?;
                if raw == 0 {
                    break;
                }
                if raw & IMPORT_ORDINAL_FLAG_32 != 0 {
                    let ordinal = (raw & 0xffff) as u16;
                    imports.push(Import {
                        dll_name: dll_name.clone(),
                        func_name: format!("ORDINAL {}", ordinal),
                        ordinal: Some(ordinal),
                        iat_rva,
                    });
                } else {
                    let hint_name_rva = raw & 0x7fff_ffff;
                    let func_name = rva_to_offset(hint_name_rva, sections)
                        .and_then(|off| read_cstr_at(bytes, off + 2))
                        .or_permissive_and_then(
                            permissive,
                            "import hint/name RVA unresolvable",
                            || format!("UNKNOWN_IMPORT_{:#x}", iat_rva),
                        )?;
                    imports.push(Import {
                        dll_name: dll_name.clone(),
                        func_name,
                        ordinal: None,
                        iat_rva,
                    });
                }
            }
        }
    }

    Ok(imports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_descriptor_is_null() {
        let d = ImportDirectoryEntry::default();
        assert!(d.is_null());
    }

    #[test]
    fn nonnull_descriptor_is_not_null() {
        let d = ImportDirectoryEntry {
            name_rva: 0x1000,
            ..Default::default()
        };
        assert!(!d.is_null());
    }

    /// One descriptor with an unresolvable name RVA, one ordinal-only IAT
    /// entry, then the null terminator descriptor.
    fn bad_name_rva_fixture() -> (Vec<u8>, Vec<SectionTable>) {
        let mut bytes = alloc::vec![0u8; 48];
        // descriptor at rva 0x1000 (file offset 0)
        bytes[0..4].copy_from_slice(&0u32.to_le_bytes()); // import_lookup_table_rva: use IAT
        bytes[4..8].copy_from_slice(&0u32.to_le_bytes()); // time_date_stamp
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes()); // forwarder_chain
        bytes[12..16].copy_from_slice(&0xffff_ffffu32.to_le_bytes()); // name_rva: out of range
        bytes[16..20].copy_from_slice(&0x1028u32.to_le_bytes()); // import_address_table_rva
                                                                  // bytes[20..40] stays zero: null terminator descriptor
        bytes[40..44].copy_from_slice(&(IMPORT_ORDINAL_FLAG_32 | 5).to_le_bytes()); // ordinal 5
        bytes[44..48].copy_from_slice(&0u32.to_le_bytes()); // end of IAT

        let section = SectionTable {
            virtual_address: 0x1000,
            virtual_size: 0x100,
            size_of_raw_data: 0x100,
            pointer_to_raw_data: 0,
            ..Default::default()
        };
        (bytes, alloc::vec![section])
    }

    #[test]
    fn strict_mode_aborts_on_unresolvable_name_rva() {
        let (bytes, sections) = bad_name_rva_fixture();
        let err = parse(&bytes, 0x1000, &sections, false, false).unwrap_err();
        assert!(matches!(err, error::Error::Malformed(_)));
    }

    #[test]
    fn permissive_mode_substitutes_placeholder_name() {
        let (bytes, sections) = bad_name_rva_fixture();
        let imports = parse(&bytes, 0x1000, &sections, false, true)
            .expect("permissive mode recovers from the bad name RVA");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].dll_name, "UNKNOWN_DLL");
        assert_eq!(imports[0].ordinal, Some(5));
    }
}
