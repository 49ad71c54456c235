//! A PE32 and PE32+ parser, pared down to what the extraction pipeline
//! needs: headers, sections, imports, and exports. RVA resolution is a
//! linear scan over the section table, mirroring how the Windows loader
//! itself maps a section's virtual range back to its file contents.

use crate::alloc::vec::Vec;

pub mod characteristic;
pub mod data_directories;
pub mod export;
pub mod header;
pub mod import;
pub mod optional_header;
pub mod options;
pub mod section_table;

use crate::container;
use crate::error;

use log::debug;

#[derive(Debug)]
/// An analyzed PE32/PE32+ binary: the subset of its structure the rest of
/// the pipeline needs in order to decode and lift its code.
pub struct PE<'a> {
    pub header: header::Header,
    pub sections: Vec<section_table::SectionTable>,
    /// Whether this image declares itself a DLL (most `.sys` drivers do not).
    pub is_lib: bool,
    /// Whether this is a PE32+ (64-bit) image.
    pub is_64: bool,
    /// Entry point, as an RVA.
    pub entry: usize,
    /// Preferred load address.
    pub image_base: usize,
    /// The module's own export name, if it exports anything.
    pub name: Option<alloc::string::String>,
    pub exports: Vec<export::Export>,
    pub imports: Vec<import::Import>,
    bytes: &'a [u8],
}

impl<'a> PE<'a> {
    pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
        Self::parse_with_opts(bytes, &options::ParseOptions::default())
    }

    pub fn parse_with_opts(bytes: &'a [u8], opts: &options::ParseOptions) -> error::Result<Self> {
        let header = header::Header::parse(bytes)?;
        debug!("{:#?}", header);

        let mut offset = header.dos_header.pe_pointer as usize
            + header::SIZEOF_PE_MAGIC
            + header::SIZEOF_COFF_HEADER
            + header.coff_header.size_of_optional_header as usize;
        let nsections = header.coff_header.number_of_sections as usize;
        let mut sections = Vec::with_capacity(nsections);
        for i in 0..nsections {
            let section = section_table::SectionTable::parse(bytes, &mut offset, 0)?;
            debug!("({}) {:#?}", i, section);
            sections.push(section);
        }

        let is_lib = characteristic::is_dll(header.coff_header.characteristics);

        let mut entry = 0;
        let mut image_base = 0;
        let mut is_64 = false;
        let mut name = None;
        let mut exports = Vec::new();
        let mut imports = Vec::new();

        if let Some(optional_header) = &header.optional_header {
            entry = optional_header.standard_fields.address_of_entry_point as usize;
            image_base = optional_header.windows_fields.image_base as usize;
            is_64 = optional_header.container()? == container::Container::Big;
            debug!(
                "entry {:#x} image_base {:#x} is_64: {}",
                entry, image_base, is_64
            );

            if opts.resolve_rva {
                let permissive = opts.parse_mode.is_permissive();

                if let Some(export_table) = *optional_header.data_directories.get_export_table() {
                    let (n, exp) = export::parse(
                        bytes,
                        export_table.virtual_address,
                        export_table.size,
                        &sections,
                        permissive,
                    )?;
                    debug!("exports: {:#?}", exp);
                    name = n;
                    exports = exp;
                }

                if let Some(import_table) = *optional_header.data_directories.get_import_table() {
                    imports = import::parse(
                        bytes,
                        import_table.virtual_address,
                        &sections,
                        is_64,
                        permissive,
                    )?;
                    debug!("imports: {:#?}", imports);
                }
            }
        }

        Ok(PE {
            header,
            sections,
            is_lib,
            is_64,
            entry,
            image_base,
            name,
            exports,
            imports,
            bytes,
        })
    }

    /// The section whose virtual range contains `rva`, if any.
    pub fn section_for_rva(&self, rva: u32) -> Option<&section_table::SectionTable> {
        self.sections
            .iter()
            .find(|s| s.rva_to_file_offset(rva).is_some())
    }

    /// Resolve an RVA to a file offset via a linear scan of the section table.
    pub fn rva_to_file_offset(&self, rva: u32) -> Option<usize> {
        self.sections.iter().find_map(|s| s.rva_to_file_offset(rva))
    }

    /// Find the first section flagged as containing executable code — the
    /// natural entry point for the decoder, since drivers keep their real
    /// instruction stream there.
    pub fn code_section(&self) -> Option<&section_table::SectionTable> {
        self.sections.iter().find(|s| s.is_code())
    }

    /// The raw bytes of a section, sliced out of the file.
    pub fn section_bytes(&self, section: &section_table::SectionTable) -> Option<&'a [u8]> {
        let start = section.pointer_to_raw_data as usize;
        let end = start.checked_add(section.size_of_raw_data as usize)?;
        self.bytes.get(start..end)
    }

    /// Find an import by (dll, function) name, case-insensitively on the DLL
    /// name the way the Windows loader treats it.
    pub fn find_import(&self, dll_name: &str, func_name: &str) -> Option<&import::Import> {
        self.imports.iter().find(|i| {
            i.dll_name.eq_ignore_ascii_case(dll_name) && i.func_name == func_name
        })
    }
}
