use crate::container;
use crate::error;

use super::data_directories;
use scroll::Pread;

/// Standard fields magic number for 32-bit binary (`PE32`)
pub const MAGIC_32: u16 = 0x10b;
/// Standard fields magic number for 64-bit binary (`PE32+`)
pub const MAGIC_64: u16 = 0x20b;

/// Fields common to `PE32` and `PE32+`, widened to 64 bits for the optional
/// `base_of_data` field which only exists in `PE32`.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct StandardFields {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u64,
    pub size_of_initialized_data: u64,
    pub size_of_uninitialized_data: u64,
    pub address_of_entry_point: u64,
    pub base_of_code: u64,
    /// absent in `PE32+`
    pub base_of_data: u32,
}

/// Fields that differ in width between `PE32` and `PE32+`, widened to 64 bits.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct WindowsFields {
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub struct OptionalHeader {
    pub standard_fields: StandardFields,
    pub windows_fields: WindowsFields,
    pub data_directories: data_directories::DataDirectories,
}

impl OptionalHeader {
    /// The container width implied by the standard fields' magic number.
    pub fn container(&self) -> error::Result<container::Container> {
        match self.standard_fields.magic {
            MAGIC_32 => Ok(container::Container::Little),
            MAGIC_64 => Ok(container::Container::Big),
            magic => Err(error::Error::BadMagic(magic as u64)),
        }
    }

    pub fn parse(bytes: &[u8], offset: &mut usize) -> error::Result<Self> {
        let magic: u16 = bytes.pread_with(*offset, scroll::LE)?;

        let magic_field = bytes.gread_with::<u16>(offset, scroll::LE)?;
        let major_linker_version = bytes.gread_with(offset, scroll::LE)?;
        let minor_linker_version = bytes.gread_with(offset, scroll::LE)?;
        let size_of_code: u32 = bytes.gread_with(offset, scroll::LE)?;
        let size_of_initialized_data: u32 = bytes.gread_with(offset, scroll::LE)?;
        let size_of_uninitialized_data: u32 = bytes.gread_with(offset, scroll::LE)?;
        let address_of_entry_point: u32 = bytes.gread_with(offset, scroll::LE)?;
        let base_of_code: u32 = bytes.gread_with(offset, scroll::LE)?;
        // `base_of_data` exists only in PE32; PE32+ goes straight to `image_base`.
        let base_of_data: u32 = if magic == MAGIC_32 {
            bytes.gread_with(offset, scroll::LE)?
        } else {
            0
        };

        let standard_fields = StandardFields {
            magic: magic_field,
            major_linker_version,
            minor_linker_version,
            size_of_code: size_of_code as u64,
            size_of_initialized_data: size_of_initialized_data as u64,
            size_of_uninitialized_data: size_of_uninitialized_data as u64,
            address_of_entry_point: address_of_entry_point as u64,
            base_of_code: base_of_code as u64,
            base_of_data,
        };

        let image_base: u64 = match magic {
            MAGIC_32 => bytes.gread_with::<u32>(offset, scroll::LE)? as u64,
            MAGIC_64 => bytes.gread_with::<u64>(offset, scroll::LE)?,
            _ => return Err(error::Error::BadMagic(magic as u64)),
        };
        let section_alignment = bytes.gread_with(offset, scroll::LE)?;
        let file_alignment = bytes.gread_with(offset, scroll::LE)?;
        let major_operating_system_version = bytes.gread_with(offset, scroll::LE)?;
        let minor_operating_system_version = bytes.gread_with(offset, scroll::LE)?;
        let major_image_version = bytes.gread_with(offset, scroll::LE)?;
        let minor_image_version = bytes.gread_with(offset, scroll::LE)?;
        let major_subsystem_version = bytes.gread_with(offset, scroll::LE)?;
        let minor_subsystem_version = bytes.gread_with(offset, scroll::LE)?;
        let win32_version_value = bytes.gread_with(offset, scroll::LE)?;
        let size_of_image = bytes.gread_with(offset, scroll::LE)?;
        let size_of_headers = bytes.gread_with(offset, scroll::LE)?;
        let check_sum = bytes.gread_with(offset, scroll::LE)?;
        let subsystem = bytes.gread_with(offset, scroll::LE)?;
        let dll_characteristics = bytes.gread_with(offset, scroll::LE)?;
        let (size_of_stack_reserve, size_of_stack_commit, size_of_heap_reserve, size_of_heap_commit): (
            u64,
            u64,
            u64,
            u64,
        ) = if magic == MAGIC_32 {
            (
                bytes.gread_with::<u32>(offset, scroll::LE)? as u64,
                bytes.gread_with::<u32>(offset, scroll::LE)? as u64,
                bytes.gread_with::<u32>(offset, scroll::LE)? as u64,
                bytes.gread_with::<u32>(offset, scroll::LE)? as u64,
            )
        } else {
            (
                bytes.gread_with::<u64>(offset, scroll::LE)?,
                bytes.gread_with::<u64>(offset, scroll::LE)?,
                bytes.gread_with::<u64>(offset, scroll::LE)?,
                bytes.gread_with::<u64>(offset, scroll::LE)?,
            )
        };
        let loader_flags = bytes.gread_with(offset, scroll::LE)?;
        let number_of_rva_and_sizes: u32 = bytes.gread_with(offset, scroll::LE)?;

        let windows_fields = WindowsFields {
            image_base,
            section_alignment,
            file_alignment,
            major_operating_system_version,
            minor_operating_system_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            win32_version_value,
            size_of_image,
            size_of_headers,
            check_sum,
            subsystem,
            dll_characteristics,
            size_of_stack_reserve,
            size_of_stack_commit,
            size_of_heap_reserve,
            size_of_heap_commit,
            loader_flags,
            number_of_rva_and_sizes,
        };

        let data_directories = data_directories::DataDirectories::parse(
            bytes,
            windows_fields.number_of_rva_and_sizes as usize,
            offset,
        )?;

        Ok(OptionalHeader {
            standard_fields,
            windows_fields,
            data_directories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_from_magic() {
        let mut oh = OptionalHeader {
            standard_fields: StandardFields::default(),
            windows_fields: WindowsFields::default(),
            data_directories: data_directories::DataDirectories::default(),
        };
        oh.standard_fields.magic = MAGIC_32;
        assert_eq!(oh.container().unwrap(), container::Container::Little);
        oh.standard_fields.magic = MAGIC_64;
        assert_eq!(oh.container().unwrap(), container::Container::Big);
        oh.standard_fields.magic = 0xdead;
        assert!(oh.container().is_err());
    }
}
