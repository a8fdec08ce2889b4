//! PE file access for loading .NET modules.
//!
//! [`File`] wraps a data source (a memory-mapped file or an in-memory buffer) together with
//! the `goblin` view of its PE headers. The loader uses it to locate the CLI header, the
//! metadata root and the sections that hold method bodies, field data and resources.
//!
//! - [`io`] - little-endian read/write primitives
//! - [`parser`] - a bounds-checked cursor used by every decoder

pub mod io;
pub mod parser;

pub(crate) mod memory;
pub(crate) mod physical;

use std::path::Path;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};
use goblin::pe::{
    data_directories::DataDirectoryType, optional_header::OptionalHeader,
    section_table::SectionTable, PE,
};
use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;

/// Backend trait for file data sources.
///
/// All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

#[self_referencing]
/// A loaded PE file with a CLI runtime header.
pub struct File {
    /// The underlying data source (memory or file).
    data: Box<dyn Backend>,
    /// The parsed PE structure, referencing the data.
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Loads and memory-maps a PE file from the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is not a PE file, or has no CLI header.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::from_backend(Box::new(input))
    }

    /// Loads a PE file from a memory buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty, not a PE file, or has no CLI header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::from_backend(Box::new(input))
    }

    /// Parses the PE headers of an already opened data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is empty, not a PE file, or has no CLI header.
    pub fn from_backend(data: Box<dyn Backend>) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        File::try_new(data, |data| match PE::parse(data.data()) {
            Ok(pe) => match pe.header.optional_header {
                Some(optional_header) => {
                    if optional_header
                        .data_directories
                        .get_clr_runtime_header()
                        .is_none()
                    {
                        Err(malformed_error!(
                            "File does not have a CLR runtime header directory"
                        ))
                    } else {
                        Ok(pe)
                    }
                }
                None => Err(malformed_error!("File does not have an OptionalHeader")),
            },
            Err(error) => Err(GoblinErr(error)),
        })
    }

    /// Returns the total size of the loaded file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns `true` if the file has a length of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw bytes of the whole file
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.borrow_data().data()
    }

    /// Returns a bounds-checked slice of the file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.borrow_data().data_slice(offset, len)
    }

    /// The optional header; its presence is checked at load time.
    fn optional_header(&self) -> Result<OptionalHeader> {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .ok_or_else(|| malformed_error!("File does not have an OptionalHeader"))
        })
    }

    /// RVA and size of the CLI runtime header.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing.
    pub fn clr(&self) -> Result<(u32, u32)> {
        let optional_header = self.optional_header()?;
        let Some(clr_dir) = optional_header.data_directories.get_clr_runtime_header() else {
            return Err(malformed_error!("File does not have a CLR runtime header"));
        };

        Ok((clr_dir.virtual_address, clr_dir.size))
    }

    /// RVA and size of a data directory, if present and non-empty
    #[must_use]
    pub fn data_directory(&self, dir_type: DataDirectoryType) -> Option<(u32, u32)> {
        let optional_header = self.optional_header().ok()?;
        let found = optional_header
            .data_directories
            .dirs()
            .find(|(directory_type, directory)| {
                *directory_type == dir_type && directory.virtual_address != 0 && directory.size != 0
            })
            .map(|(_, directory)| (directory.virtual_address, directory.size));
        found
    }

    /// Copies of the section headers
    #[must_use]
    pub fn sections(&self) -> Vec<SectionTable> {
        self.with_pe(|pe| pe.sections.clone())
    }

    /// Returns true for PE32+ images
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.with_pe(|pe| pe.is_64)
    }

    /// COFF machine type
    #[must_use]
    pub fn machine(&self) -> u16 {
        self.with_pe(|pe| pe.header.coff_header.machine)
    }

    /// COFF characteristics
    #[must_use]
    pub fn characteristics(&self) -> u16 {
        self.with_pe(|pe| pe.header.coff_header.characteristics)
    }

    /// Windows-specific optional header fields: (subsystem, subsystem version, file alignment,
    /// section alignment, dll characteristics).
    ///
    /// # Errors
    ///
    /// Returns an error if the optional header is missing.
    pub fn windows_fields(&self) -> Result<(u16, (u16, u16), u32, u32, u16)> {
        let fields = self.optional_header()?.windows_fields;
        Ok((
            fields.subsystem,
            (fields.major_subsystem_version, fields.minor_subsystem_version),
            fields.file_alignment,
            fields.section_alignment,
            fields.dll_characteristics,
        ))
    }

    /// Converts a relative virtual address to a file offset.
    ///
    /// # Errors
    ///
    /// Returns an error if no section contains `rva`.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.with_pe(|pe| {
            for section in &pe.sections {
                let Some(section_max) = section.virtual_address.checked_add(section.virtual_size)
                else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        section.virtual_size
                    ));
                };

                if section.virtual_address <= rva && section_max > rva {
                    return Ok((rva - section.virtual_address) as usize
                        + section.pointer_to_raw_data as usize);
                }
            }

            Err(malformed_error!(
                "RVA could not be converted to offset - {}",
                rva
            ))
        })
    }
}
