//! PE images as metadata sources.
//!
//! [`PeImage`] locates the CLI header and the metadata root of a loaded [`File`] and serves
//! the section content the metadata graph resolves raw data references against.
//! [`ImageInfo`] is the header information the loader retains per graph for the image
//! writer and PDB collaborators.

use std::fmt;

use bitflags::bitflags;
use goblin::pe::data_directories::DataDirectoryType;

use crate::{
    file::{parser::Parser, File},
    metadata::sections::ImageSections,
    Error::OutOfBounds,
    Result,
};

bitflags! {
    /// `Flags` of the CLI header (II.25.3.3.1)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ComImageFlags: u32 {
        /// The image contains IL only
        const IL_ONLY = 0x0000_0001;
        /// The image may only be loaded into a 32-bit process
        const REQUIRES_32BIT = 0x0000_0002;
        /// The image carries a strong name signature
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The entry point token is a native RVA
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// The image prefers running as a 32-bit process
        const PREFERS_32BIT = 0x0002_0000;
    }
}

/// The CLI header (II.25.3.3)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliHeader {
    /// Runtime major version
    pub major_runtime_version: u16,
    /// Runtime minor version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub metadata_rva: u32,
    /// Size of the metadata root
    pub metadata_size: u32,
    /// Image flags
    pub flags: ComImageFlags,
    /// Entry point token or native RVA
    pub entry_point_token: u32,
    /// RVA of the resources directory
    pub resources_rva: u32,
    /// Size of the resources directory
    pub resources_size: u32,
    /// RVA of the strong name signature
    pub strong_name_rva: u32,
    /// Size of the strong name signature
    pub strong_name_size: u32,
    /// RVA of the vtable fixups
    pub vtable_fixups_rva: u32,
    /// Size of the vtable fixups
    pub vtable_fixups_size: u32,
}

impl CliHeader {
    /// Size of the header on disk
    pub const SIZE: usize = 72;

    /// Parse the header
    ///
    /// # Errors
    /// Returns an error if the data is too short or the header size field is wrong
    pub fn read(data: &[u8]) -> Result<CliHeader> {
        if data.len() < Self::SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);
        let cb = parser.read_le::<u32>()?;
        if cb as usize != Self::SIZE {
            return Err(malformed_error!(
                "Invalid CLI header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        let metadata_rva = parser.read_le::<u32>()?;
        let metadata_size = parser.read_le::<u32>()?;
        if metadata_rva == 0 || metadata_size == 0 {
            return Err(malformed_error!("CLI header has no metadata directory"));
        }

        let flags = ComImageFlags::from_bits_retain(parser.read_le::<u32>()?);
        let entry_point_token = parser.read_le::<u32>()?;
        let resources_rva = parser.read_le::<u32>()?;
        let resources_size = parser.read_le::<u32>()?;
        let strong_name_rva = parser.read_le::<u32>()?;
        let strong_name_size = parser.read_le::<u32>()?;
        // Code manager table, reserved
        parser.advance_by(8)?;
        let vtable_fixups_rva = parser.read_le::<u32>()?;
        let vtable_fixups_size = parser.read_le::<u32>()?;

        Ok(CliHeader {
            major_runtime_version,
            minor_runtime_version,
            metadata_rva,
            metadata_size,
            flags,
            entry_point_token,
            resources_rva,
            resources_size,
            strong_name_rva,
            strong_name_size,
            vtable_fixups_rva,
            vtable_fixups_size,
        })
    }
}

/// PE header values the image writer needs to reproduce the input's shape
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeHeaders {
    /// COFF machine
    pub machine: u16,
    /// COFF characteristics
    pub characteristics: u16,
    /// PE32+ image
    pub pe32_plus: bool,
    /// Windows subsystem
    pub subsystem: u16,
    /// Subsystem major and minor version
    pub subsystem_version: (u16, u16),
    /// File alignment
    pub file_alignment: u32,
    /// Section alignment
    pub section_alignment: u32,
    /// DLL characteristics, including the high-entropy VA bit
    pub dll_characteristics: u16,
}

/// Image information retained per loaded graph
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageInfo {
    /// The sanitized resource the graph was loaded from
    pub resource: String,
    /// PE headers; `None` for a bare metadata root
    pub pe: Option<PeHeaders>,
    /// The CLI header; `None` for a bare metadata root
    pub cli: Option<CliHeader>,
    /// The raw debug directory entries
    pub debug_directory: Vec<u8>,
}

/// A PE image with a CLI header
pub struct PeImage {
    file: File,
    cli: CliHeader,
}

impl PeImage {
    /// Locate the CLI header of `file`
    ///
    /// # Errors
    /// Returns an error if the header is missing or malformed
    pub fn new(file: File) -> Result<PeImage> {
        let (rva, size) = file.clr()?;
        let offset = file.rva_to_offset(rva)?;
        let cli = CliHeader::read(file.data_slice(offset, (size as usize).max(CliHeader::SIZE))?)?;
        Ok(PeImage { file, cli })
    }

    /// The CLI header
    #[must_use]
    pub fn cli(&self) -> &CliHeader {
        &self.cli
    }

    /// The metadata root
    ///
    /// # Errors
    /// Returns an error if the metadata directory lies outside of the file
    pub fn metadata(&self) -> Result<&[u8]> {
        self.directory(self.cli.metadata_rva, self.cli.metadata_size)
    }

    fn directory(&self, rva: u32, size: u32) -> Result<&[u8]> {
        let offset = self.file.rva_to_offset(rva)?;
        self.file.data_slice(offset, size as usize)
    }

    /// The retained header information
    ///
    /// # Errors
    /// Returns an error if the optional header is missing
    pub fn info(&self, resource: &str) -> Result<ImageInfo> {
        let (subsystem, subsystem_version, file_alignment, section_alignment, dll) =
            self.file.windows_fields()?;

        let debug_directory = match self.file.data_directory(DataDirectoryType::DebugTable) {
            Some((rva, size)) => self.directory(rva, size)?.to_vec(),
            None => Vec::new(),
        };

        Ok(ImageInfo {
            resource: resource.to_string(),
            pe: Some(PeHeaders {
                machine: self.file.machine(),
                characteristics: self.file.characteristics(),
                pe32_plus: self.file.is_pe32_plus(),
                subsystem,
                subsystem_version,
                file_alignment,
                section_alignment,
                dll_characteristics: dll,
            }),
            cli: Some(self.cli.clone()),
            debug_directory,
        })
    }
}

impl fmt::Debug for PeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeImage")
            .field("len", &self.file.len())
            .field("cli", &self.cli)
            .finish()
    }
}

impl ImageSections for PeImage {
    fn data_at_rva(&self, rva: u32) -> Result<&[u8]> {
        for section in self.file.sections() {
            let start = section.virtual_address;
            let raw_size = section.size_of_raw_data;
            if rva < start || rva - start >= raw_size {
                continue;
            }

            let offset = section.pointer_to_raw_data as usize + (rva - start) as usize;
            let end = (section.pointer_to_raw_data as usize + raw_size as usize).min(self.file.len());
            if offset >= end {
                break;
            }
            return self.file.data_slice(offset, end - offset);
        }

        Err(malformed_error!("RVA 0x{:08x} is not backed by file data", rva))
    }

    fn resources(&self) -> Result<&[u8]> {
        if self.cli.resources_rva == 0 {
            return Err(malformed_error!("Image has no resources directory"));
        }
        self.directory(self.cli.resources_rva, self.cli.resources_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::io::push_le;

    fn header(flags: u32) -> Vec<u8> {
        let mut data = Vec::new();
        push_le(&mut data, 72_u32);
        push_le(&mut data, 2_u16);
        push_le(&mut data, 5_u16);
        push_le(&mut data, 0x2050_u32);
        push_le(&mut data, 0x400_u32);
        push_le(&mut data, flags);
        push_le(&mut data, 0x0600_0001_u32);
        push_le(&mut data, 0x2500_u32);
        push_le(&mut data, 0x10_u32);
        data.resize(72, 0);
        data
    }

    #[test]
    fn cli_header_fields() {
        let cli = CliHeader::read(&header(0x0000_0009)).unwrap();
        assert_eq!(cli.major_runtime_version, 2);
        assert_eq!(cli.metadata_rva, 0x2050);
        assert_eq!(cli.metadata_size, 0x400);
        assert!(cli.flags.contains(ComImageFlags::IL_ONLY));
        assert!(cli.flags.contains(ComImageFlags::STRONG_NAME_SIGNED));
        assert_eq!(cli.entry_point_token, 0x0600_0001);
        assert_eq!(cli.resources_size, 0x10);
    }

    #[test]
    fn cli_header_errors() {
        assert!(matches!(CliHeader::read(&[0; 16]), Err(OutOfBounds)));

        let mut data = header(1);
        data[0] = 64;
        assert!(CliHeader::read(&data).is_err());

        let mut data = header(1);
        data[8..12].copy_from_slice(&[0; 4]);
        assert!(CliHeader::read(&data).is_err());
    }
}
