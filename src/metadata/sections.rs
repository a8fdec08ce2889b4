//! Content that lives outside of the metadata tables.
//!
//! Method bodies and field initial data are addressed by RVA, embedded manifest resources
//! by an offset into the CLI resources directory. On read an [`ImageSections`]
//! implementation resolves those addresses; on write a [`SectionPartBuilder`] lays the
//! content out and hands back the addresses the table rows store.

use std::fmt;

use widestring::U16Str;

use crate::{
    file::io::{align_to, push_le, read_le},
    metadata::{method::MethodBody, streams::UserStringsBuilder},
    Result,
};

/// Access to the section content of an image.
pub trait ImageSections: Send + Sync + fmt::Debug {
    /// The bytes from `rva` up to the end of the section containing it.
    ///
    /// # Errors
    /// Returns an error if no section contains `rva`
    fn data_at_rva(&self, rva: u32) -> Result<&[u8]>;

    /// The CLI resources directory.
    ///
    /// # Errors
    /// Returns an error if the image has no resources directory
    fn resources(&self) -> Result<&[u8]>;

    /// The embedded resource at `offset` of the resources directory, without its length
    /// prefix.
    ///
    /// # Errors
    /// Returns an error if the resource does not fit the directory
    fn resource(&self, offset: u32) -> Result<&[u8]> {
        let resources = self.resources()?;
        let start = offset as usize;
        let Some(prefix) = resources.get(start..) else {
            return Err(malformed_error!("Resource offset {} is out of range", offset));
        };

        let length = read_le::<u32>(prefix)? as usize;
        prefix
            .get(4..4 + length)
            .ok_or_else(|| malformed_error!("Resource at offset {} is truncated", offset))
    }
}

/// Section content produced while a module is serialized.
///
/// `text` is meant to be placed at `text_rva`; method bodies and field data RVAs point
/// into it. `resources` is the CLI resources directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionParts {
    /// RVA of the first byte of `text`
    pub text_rva: u32,
    /// Method bodies and field initial data
    pub text: Vec<u8>,
    /// Length-prefixed embedded resources
    pub resources: Vec<u8>,
}

impl ImageSections for SectionParts {
    fn data_at_rva(&self, rva: u32) -> Result<&[u8]> {
        rva.checked_sub(self.text_rva)
            .and_then(|offset| self.text.get(offset as usize..))
            .filter(|data| !data.is_empty())
            .ok_or_else(|| malformed_error!("RVA 0x{:08x} is outside of the text part", rva))
    }

    fn resources(&self) -> Result<&[u8]> {
        Ok(&self.resources)
    }
}

/// Lays out raw-data content for the output image.
#[derive(Debug, Clone)]
pub struct SectionPartBuilder {
    parts: SectionParts,
}

impl SectionPartBuilder {
    /// A builder placing its text part at `text_rva`
    #[must_use]
    pub fn new(text_rva: u32) -> Self {
        SectionPartBuilder {
            parts: SectionParts {
                text_rva,
                ..SectionParts::default()
            },
        }
    }

    fn rva(&self) -> Result<u32> {
        u32::try_from(self.parts.text.len())
            .ok()
            .and_then(|offset| self.parts.text_rva.checked_add(offset))
            .ok_or_else(|| malformed_error!("Text part exceeds the address space"))
    }

    /// Append a method body; fat bodies are 4-byte aligned. Returns the body's RVA.
    ///
    /// # Errors
    /// Returns an error if the body cannot be encoded
    pub fn add_method_body(
        &mut self,
        body: &MethodBody,
        user_strings: &mut UserStringsBuilder,
    ) -> Result<u32> {
        let bytes = body.encode(&mut |value: &U16Str| {
            user_strings.intern_units(value.as_slice().to_vec())
        })?;

        if !body.is_tiny() {
            align_to(&mut self.parts.text, 4);
        }
        let rva = self.rva()?;
        self.parts.text.extend_from_slice(&bytes);
        Ok(rva)
    }

    /// Append field initial data, 8-byte aligned. Returns its RVA.
    ///
    /// # Errors
    /// Returns an error if the text part outgrows the address space
    pub fn add_field_data(&mut self, data: &[u8]) -> Result<u32> {
        align_to(&mut self.parts.text, 8);
        let rva = self.rva()?;
        self.parts.text.extend_from_slice(data);
        Ok(rva)
    }

    /// Append an embedded resource with its length prefix, 8-byte aligned. Returns its
    /// offset into the resources directory.
    ///
    /// # Errors
    /// Returns an error if the resource or the directory is too large
    pub fn add_resource(&mut self, data: &[u8]) -> Result<u32> {
        align_to(&mut self.parts.resources, 8);
        let offset = u32::try_from(self.parts.resources.len())
            .map_err(|_| malformed_error!("Resources directory is too large"))?;
        let length = u32::try_from(data.len())
            .map_err(|_| malformed_error!("Resource of {} bytes is too large", data.len()))?;
        push_le(&mut self.parts.resources, length);
        self.parts.resources.extend_from_slice(data);
        Ok(offset)
    }

    /// The finished parts
    #[must_use]
    pub fn finish(self) -> SectionParts {
        self.parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Instruction, OpCode};

    fn ret_body(max_stack: u16) -> MethodBody {
        MethodBody {
            max_stack,
            init_locals: false,
            local_var_sig: None,
            instructions: vec![Instruction::simple(OpCode::Ret)],
            exception_handlers: Vec::new(),
        }
    }

    #[test]
    fn layout_and_alignment() {
        let mut builder = SectionPartBuilder::new(0x2050);
        let mut user_strings = UserStringsBuilder::new();

        let tiny = builder
            .add_method_body(&ret_body(8), &mut user_strings)
            .unwrap();
        assert_eq!(tiny, 0x2050);

        let fat = builder
            .add_method_body(&ret_body(16), &mut user_strings)
            .unwrap();
        assert_eq!(fat, 0x2054);

        let field = builder.add_field_data(&[1, 2, 3]).unwrap();
        assert_eq!(field, 0x2068);

        let first = builder.add_resource(b"abc").unwrap();
        let second = builder.add_resource(b"de").unwrap();
        assert_eq!((first, second), (0, 8));

        let parts = builder.finish();
        assert_eq!(parts.data_at_rva(0x2068).unwrap(), &[1, 2, 3]);
        assert_eq!(parts.resource(8).unwrap(), b"de");
        assert_eq!(parts.resource(0).unwrap(), b"abc");
        assert!(parts.data_at_rva(0x1000).is_err());
        assert!(parts.data_at_rva(0x206B).is_err());
        assert!(parts.resource(64).is_err());
    }

    #[test]
    fn bodies_read_back() {
        let mut builder = SectionPartBuilder::new(0x1000);
        let mut user_strings = UserStringsBuilder::new();
        let body = ret_body(16);
        let rva = builder.add_method_body(&body, &mut user_strings).unwrap();

        let parts = builder.finish();
        let parsed = MethodBody::parse(parts.data_at_rva(rva).unwrap(), &mut |_| {
            Err(malformed_error!("no strings"))
        })
        .unwrap();
        assert_eq!(parsed, body);
    }
}
