//! Exception handling clauses of method bodies.

use bitflags::bitflags;

use crate::{
    metadata::tables::{RemapIndices, TableIndex},
    Result,
};

bitflags! {
    /// The kind of an exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u32 {
        /// A typed catch clause; `class_token` names the caught type
        const EXCEPTION = 0x0000;
        /// A filter clause; `filter_offset` locates the filter code
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause, run only when an exception leaves the try block
        const FAULT = 0x0004;
    }
}

/// One exception handling clause; offsets and lengths are in bytes of the method's code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Caught type of a typed catch clause
    pub class_token: Option<TableIndex>,
    /// Start of the filter code of a filter clause
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// Whether every offset fits 16 bits and every length fits 8 bits
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= 0xFFFF
            && self.handler_offset <= 0xFFFF
            && self.try_length <= 0xFF
            && self.handler_length <= 0xFF
    }

    /// The value of the clause's last field: class token or filter offset
    #[must_use]
    pub fn class_or_filter(&self) -> u32 {
        if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            self.filter_offset
        } else {
            self.class_token.map_or(0, |index| index.token().value())
        }
    }

    /// Exclusive end of the protected block
    #[must_use]
    pub fn try_end(&self) -> u32 {
        self.try_offset + self.try_length
    }

    /// Exclusive end of the handler
    #[must_use]
    pub fn handler_end(&self) -> u32 {
        self.handler_offset + self.handler_length
    }
}

impl RemapIndices for ExceptionHandler {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        if let Some(index) = &mut self.class_token {
            f(index)?;
        }
        Ok(())
    }
}
