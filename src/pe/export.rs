//! Export directory table
//!
//! Only the name/ordinal/address arrays are walked; forwarder RVAs (an
//! export whose "address" actually points at a `DLL.Function` string inside
//! the export section) are recorded as such but not followed, since driver
//! export forwarding plays no role in hardware-facing behavior.

use crate::alloc::collections::BTreeMap;
use crate::alloc::format;
use crate::alloc::string::{String, ToString};
use crate::alloc::vec::Vec;
use crate::error;
use crate::options::Permissive;
use crate::pe::section_table::SectionTable;
use scroll::Pread;

/// `IMAGE_EXPORT_DIRECTORY`
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread)]
pub struct ExportDirectoryTable {
    pub export_flags: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name_rva: u32,
    pub ordinal_base: u32,
    pub address_table_entries: u32,
    pub number_of_name_pointers: u32,
    pub export_address_table_rva: u32,
    pub name_pointer_rva: u32,
    pub ordinal_table_rva: u32,
}

pub const SIZEOF_EXPORT_DIRECTORY_TABLE: usize = 40;

/// Bounds the name/ordinal/address table walks against a malformed or
/// hostile export directory.
pub const MAX_EXPORTS: usize = 10_000;

#[derive(Debug, Clone)]
pub enum ExportAddress {
    Rva(u32),
    /// address fell inside the export directory itself: it's a forwarder string RVA
    Forwarder(u32),
}

#[derive(Debug, Clone)]
pub struct Export {
    pub name: Option<String>,
    pub ordinal: u16,
    pub address: ExportAddress,
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

/// Parse the export directory at `export_table_rva`/`export_table_size` (the
/// data directory entry) into the module name and its ordered exports.
///
/// Under `permissive`, a module name RVA or an individual named export's name
/// RVA that resolves out of range is logged and treated as absent rather than
/// aborting the whole parse; in strict mode both cases propagate the error.
pub fn parse(
    bytes: &[u8],
    export_table_rva: u32,
    export_table_size: u32,
    sections: &[SectionTable],
    permissive: bool,
) -> error::Result<(Option<String>, Vec<Export>)> {
    let mut offset = rva_to_offset(export_table_rva, sections)?;
    let directory: ExportDirectoryTable = bytes.gread_with(&mut offset, scroll::LE)?;

    let name = if directory.name_rva != 0 {
        rva_to_offset(directory.name_rva, sections)
            .and_then(|off| {
                let raw: &str = bytes.pread(off)?;
                Ok(raw.to_string())
            })
            .map(Some)
            .or_permissive_and_default(permissive, "export directory name RVA unresolvable")?
    } else {
        None
    };

    let num_names = directory.number_of_name_pointers as usize;
    let num_funcs = directory.address_table_entries as usize;
    if num_names > MAX_EXPORTS || num_funcs > MAX_EXPORTS {
        return Err(error::Error::Malformed(format!(
            "export directory declares too many entries (names {}, functions {})",
            num_names, num_funcs
        )));
    }

    let mut address_table = Vec::with_capacity(num_funcs);
    if num_funcs > 0 {
        let mut addr_offset = rva_to_offset(directory.export_address_table_rva, sections)?;
        for _ in 0..num_funcs {
            let rva: u32 = bytes.gread_with(&mut addr_offset, scroll::LE)?;
            let in_directory =
                rva >= export_table_rva && rva < export_table_rva + export_table_size;
            address_table.push(if in_directory {
                ExportAddress::Forwarder(rva)
            } else {
                ExportAddress::Rva(rva)
            });
        }
    }

    let mut exports = Vec::with_capacity(num_funcs);
    let mut named = alloc_names(bytes, &directory, num_names, sections, permissive)?;

    for (i, address) in address_table.into_iter().enumerate() {
        let ordinal = directory.ordinal_base as u16 + i as u16;
        let name = named.remove(&(i as u16));
        exports.push(Export {
            name,
            ordinal,
            address,
        });
    }

    Ok((name, exports))
}

/// Build a map from export-address-table index (not ordinal) to name, by
/// walking the parallel name-pointer and ordinal tables.
fn alloc_names(
    bytes: &[u8],
    directory: &ExportDirectoryTable,
    num_names: usize,
    sections: &[SectionTable],
    permissive: bool,
) -> error::Result<BTreeMap<u16, String>> {
    let mut names = BTreeMap::new();
    if num_names == 0 {
        return Ok(names);
    }
    let mut name_ptr_offset = rva_to_offset(directory.name_pointer_rva, sections)?;
    let mut ordinal_offset = rva_to_offset(directory.ordinal_table_rva, sections)?;
    for _ in 0..num_names {
        let name_rva: u32 = bytes.gread_with(&mut name_ptr_offset, scroll::LE)?;
        let address_table_index: u16 = bytes.gread_with(&mut ordinal_offset, scroll::LE)?;
        let resolved = rva_to_offset(name_rva, sections).and_then(|off| {
            let raw: &str = bytes.pread(off)?;
            Ok(raw.to_string())
        });
        match resolved {
            Ok(name) => {
                names.insert(address_table_index, name);
            }
            Err(e) if permissive => {
                #[cfg(feature = "log")]
                log::warn!("export name RVA {name_rva:#x} unresolvable: {e}, leaving this export unnamed");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(names)
}
