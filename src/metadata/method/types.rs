//! Header and section flags of method bodies (ECMA-335 II.25.4).

use bitflags::bitflags;

/// Mask of the header format bits
pub const METHOD_BODY_FORMAT_MASK: u8 = 0x03;

/// Header size of a fat body, in 4-byte units, as stored in the top nibble of the flags
pub const FAT_HEADER_DWORDS: u16 = 3;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method body header flags
    pub struct MethodBodyFlags: u16 {
        /// Tiny header: one byte, code size in the upper six bits
        const TINY_FORMAT = 0x2;
        /// Fat header: twelve bytes
        const FAT_FORMAT = 0x3;
        /// Data sections follow the code
        const MORE_SECTS = 0x8;
        /// Locals are zero-initialized
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method data section flags
    pub struct SectionFlags: u8 {
        /// Exception handling clauses
        const EHTABLE = 0x1;
        /// Reserved, never emitted
        const OPT_ILTABLE = 0x2;
        /// 24-byte clauses and a 24-bit section size
        const FAT_FORMAT = 0x40;
        /// Another section follows
        const MORE_SECTS = 0x80;
    }
}
