//! Signature parsing and encoding for .NET metadata.
//!
//! Signatures encode type information, method parameters, generic instantiations and
//! calling conventions in a compact binary format stored in the `#Blob` heap.
//!
//! - **Method signatures** - `MethodDef`, `MemberRef`, `StandAloneSig` and function pointers
//! - **Field signatures** - `Field` and field `MemberRef` rows
//! - **Property signatures** - `Property` rows
//! - **Local variable signatures** - `StandAloneSig` rows referenced by method bodies
//! - **Type specifications** - `TypeSpec` rows
//! - **Method specifications** - `MethodSpec` rows
//!
//! Every parsed signature re-encodes to the bytes it was parsed from, and every embedded
//! table index is reachable through [`crate::metadata::tables::RemapIndices`].
//!
//! # Examples
//!
//! ```rust
//! use cilmerge::metadata::signatures::{parse_method_signature, encode_method_signature};
//!
//! let signature_data = &[0x20, 0x01, 0x01, 0x0E];
//! let method_sig = parse_method_signature(signature_data)?;
//! assert_eq!(method_sig.to_string(), "instance void(string)");
//! assert_eq!(encode_method_signature(&method_sig)?, signature_data);
//! # Ok::<(), cilmerge::Error>(())
//! ```
//!
//! ```rust
//! use cilmerge::metadata::signatures::parse_local_var_signature;
//!
//! let locals_data = &[0x07, 0x02, 0x08, 0x0E];
//! let locals_sig = parse_local_var_signature(locals_data)?;
//! assert_eq!(locals_sig.locals.len(), 2);
//! # Ok::<(), cilmerge::Error>(())
//! ```
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.2 - Blobs and Signatures

mod encoders;
mod parser;
mod types;

pub use encoders::*;
pub use parser::*;
pub use types::*;

use crate::Result;

/// Parse a method signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Parse a field signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Parse a property signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}

/// Parse a local variable signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Parse a type specification from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_type_spec_signature(data: &[u8]) -> Result<TypeSignature> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Parse a generic method instantiation from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}
