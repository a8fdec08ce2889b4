//! The output file: the merged metadata root and section parts behind a small header.
//!
//! Layout, all integers little-endian:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0  | 4 | magic `CILM` |
//! | 4  | 2 | format version |
//! | 6  | 2 | flags, bit 0 = high-entropy VA |
//! | 8  | 4 | subsystem version, major and minor `u16` |
//! | 12 | 4 | file alignment |
//! | 16 | 4 | RVA of the text part |
//! | 20 | 16 | lengths of metadata, text, resources and debug directory |
//!
//! The four blocks follow the header in that order.

use std::path::Path;

use cilmerge::{metadata::sections::SectionParts, Error};

pub const MAGIC: &[u8; 4] = b"CILM";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 36;

const HIGH_ENTROPY_VA: u16 = 0x0001;

/// Image options handed through to whatever writes the final PE file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    pub subsystem_version: (u16, u16),
    pub file_alignment: u32,
    pub high_entropy_va: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        ImageOptions {
            subsystem_version: (4, 0),
            file_alignment: 512,
            high_entropy_va: false,
        }
    }
}

/// Parse a `major.minor` subsystem version
pub fn parse_subsystem_version(text: &str) -> cilmerge::Result<(u16, u16)> {
    let invalid = || Error::Configuration(format!("invalid subsystem version '{text}'"));
    let (major, minor) = text.trim().split_once('.').ok_or_else(invalid)?;
    Ok((
        major.parse().map_err(|_| invalid())?,
        minor.parse().map_err(|_| invalid())?,
    ))
}

/// Check that a file alignment is a power of two between 512 and 64K
pub fn check_alignment(alignment: u32) -> cilmerge::Result<u32> {
    if alignment.is_power_of_two() && (512..=0x1_0000).contains(&alignment) {
        Ok(alignment)
    } else {
        Err(Error::Configuration(format!(
            "file alignment {alignment} is not a power of two between 512 and 65536"
        )))
    }
}

fn block_len(block: &[u8]) -> cilmerge::Result<u32> {
    u32::try_from(block.len())
        .map_err(|_| Error::Configuration(format!("output block of {} bytes", block.len())))
}

/// Lay out the container
pub fn encode(
    image: &ImageOptions,
    metadata: &[u8],
    sections: &SectionParts,
    debug_directory: &[u8],
) -> cilmerge::Result<Vec<u8>> {
    let blocks = [
        metadata,
        sections.text.as_slice(),
        sections.resources.as_slice(),
        debug_directory,
    ];

    let mut out = Vec::with_capacity(HEADER_SIZE + blocks.iter().map(|b| b.len()).sum::<usize>());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    let flags = if image.high_entropy_va { HIGH_ENTROPY_VA } else { 0 };
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&image.subsystem_version.0.to_le_bytes());
    out.extend_from_slice(&image.subsystem_version.1.to_le_bytes());
    out.extend_from_slice(&image.file_alignment.to_le_bytes());
    out.extend_from_slice(&sections.text_rva.to_le_bytes());
    for block in blocks {
        out.extend_from_slice(&block_len(block)?.to_le_bytes());
    }
    for block in blocks {
        out.extend_from_slice(block);
    }
    Ok(out)
}

/// Write `data` to `path`, mapping failures to the target access error
pub fn write_file(path: &Path, data: &[u8]) -> cilmerge::Result<()> {
    std::fs::write(path, data).map_err(|source| Error::TargetAccess {
        path: path.to_path_buf(),
        source,
    })
}
