//! Declarative security permission sets of the `DeclSecurity` table.
//!
//! Two encodings exist. The legacy one is a UTF-16 XML document, kept verbatim. The binary
//! one starts with `.`, followed by a compressed attribute count; each attribute carries its
//! assembly-qualified type name, the byte length of its argument block, and a compressed
//! count of named arguments encoded exactly like custom attribute named arguments.

use crate::{
    file::{io::write_ser_string, parser::Parser},
    metadata::customattributes::{
        read_named_arguments, write_count, write_named_arguments, CaNamedArgument,
        NoTypeResolver,
    },
    Result,
};

/// Leading byte of the binary permission set format
pub const PERMISSION_SET_BINARY: u8 = b'.';

/// One permission attribute of a binary permission set
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityAttribute {
    /// Assembly-qualified attribute type name
    pub type_name: String,
    /// Property and field assignments
    pub named_args: Vec<CaNamedArgument>,
}

/// A decoded permission set
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionSet {
    /// The binary `.` format
    Attributes(Vec<SecurityAttribute>),
    /// Anything else, normally a UTF-16 XML document
    Xml(Vec<u8>),
}

impl PermissionSet {
    /// Visit the attribute type names of a binary permission set
    pub fn for_each_type_name_mut(&mut self, f: &mut dyn FnMut(&mut String)) {
        if let PermissionSet::Attributes(attributes) = self {
            for attribute in attributes {
                f(&mut attribute.type_name);
            }
        }
    }
}

/// Parse a permission set blob.
///
/// # Errors
/// Returns an error for a malformed binary permission set, including one whose named
/// arguments use enum types
pub fn parse_permission_set(data: &[u8]) -> Result<PermissionSet> {
    if data.first() != Some(&PERMISSION_SET_BINARY) {
        return Ok(PermissionSet::Xml(data.to_vec()));
    }

    let mut parser = Parser::new(data);
    parser.advance_by(1)?;
    let count = parser.read_compressed_uint()?;
    let mut attributes = Vec::new();
    for _ in 0..count {
        let type_name = parser
            .read_ser_string()?
            .ok_or_else(|| malformed_error!("Security attribute without a type name"))?;
        let block_length = parser.read_compressed_uint()? as usize;
        let block = parser.read_bytes(block_length)?;

        let mut block_parser = Parser::new(block);
        let arg_count = block_parser.read_compressed_uint()?;
        let named_args = read_named_arguments(&mut block_parser, arg_count, &NoTypeResolver)?;
        if block_parser.has_more_data() {
            return Err(malformed_error!(
                "Security attribute {} has {} trailing bytes",
                type_name,
                block_parser.remaining()
            ));
        }

        attributes.push(SecurityAttribute {
            type_name,
            named_args,
        });
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "Permission set has {} trailing bytes",
            parser.remaining()
        ));
    }

    Ok(PermissionSet::Attributes(attributes))
}

/// Encode a permission set blob.
///
/// # Errors
/// Returns an error if a named argument cannot be encoded
pub fn encode_permission_set(set: &PermissionSet) -> Result<Vec<u8>> {
    let attributes = match set {
        PermissionSet::Xml(bytes) => return Ok(bytes.clone()),
        PermissionSet::Attributes(attributes) => attributes,
    };

    let mut out = vec![PERMISSION_SET_BINARY];
    write_count(&mut out, attributes.len())?;
    for attribute in attributes {
        write_ser_string(&mut out, Some(&attribute.type_name))?;

        let mut block = Vec::new();
        write_count(&mut block, attribute.named_args.len())?;
        write_named_arguments(&mut block, &attribute.named_args)?;

        write_count(&mut out, block.len())?;
        out.extend_from_slice(&block);
    }
    Ok(out)
}
