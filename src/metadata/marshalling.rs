//! Native marshalling descriptors of the `FieldMarshal` table.
//!
//! A descriptor starts with a native type byte (ECMA-335 II.23.4 plus the `CoreCLR`
//! extensions) followed by optional parameters whose presence depends on that type.
//! Optional parameters are positional: a later one can only be present when every earlier
//! one is, and the decoded form records exactly which were present so that encoding
//! reproduces the original bytes.
//!
//! # Examples
//!
//! ```rust
//! use cilmerge::metadata::marshalling::{
//!     encode_marshalling_descriptor, parse_marshalling_descriptor, MarshallingInfo, NATIVE_TYPE,
//! };
//!
//! let bytes = [NATIVE_TYPE::ARRAY, NATIVE_TYPE::I4, 0x03];
//! let info = parse_marshalling_descriptor(&bytes)?;
//! assert_eq!(
//!     info,
//!     MarshallingInfo::Array {
//!         element: Some(NATIVE_TYPE::I4),
//!         param_index: Some(3),
//!         size: None,
//!         flags: None,
//!     }
//! );
//! assert_eq!(encode_marshalling_descriptor(&info)?, bytes);
//! # Ok::<(), cilmerge::Error>(())
//! ```

use crate::{
    file::{io::write_compressed_uint, parser::Parser},
    Result,
};

#[allow(non_snake_case)]
/// Native type constants as defined in ECMA-335 II.23.4 and `CoreCLR` extensions.
pub mod NATIVE_TYPE {
    /// End marker
    pub const END: u8 = 0x00;
    /// `void`
    pub const VOID: u8 = 0x01;
    /// 4-byte boolean
    pub const BOOLEAN: u8 = 0x02;
    /// Signed 8-bit integer
    pub const I1: u8 = 0x03;
    /// Unsigned 8-bit integer
    pub const U1: u8 = 0x04;
    /// Signed 16-bit integer
    pub const I2: u8 = 0x05;
    /// Unsigned 16-bit integer
    pub const U2: u8 = 0x06;
    /// Signed 32-bit integer
    pub const I4: u8 = 0x07;
    /// Unsigned 32-bit integer
    pub const U4: u8 = 0x08;
    /// Signed 64-bit integer
    pub const I8: u8 = 0x09;
    /// Unsigned 64-bit integer
    pub const U8: u8 = 0x0a;
    /// 32-bit float
    pub const R4: u8 = 0x0b;
    /// 64-bit float
    pub const R8: u8 = 0x0c;
    /// Platform character
    pub const SYSCHAR: u8 = 0x0d;
    /// COM `VARIANT`
    pub const VARIANT: u8 = 0x0e;
    /// COM `CURRENCY`
    pub const CURRENCY: u8 = 0x0f;
    /// Raw pointer
    pub const PTR: u8 = 0x10;
    /// COM `DECIMAL`
    pub const DECIMAL: u8 = 0x11;
    /// COM `DATE`
    pub const DATE: u8 = 0x12;
    /// `BSTR`
    pub const BSTR: u8 = 0x13;
    /// ANSI string pointer
    pub const LPSTR: u8 = 0x14;
    /// Wide string pointer
    pub const LPWSTR: u8 = 0x15;
    /// Platform string pointer
    pub const LPTSTR: u8 = 0x16;
    /// Inline fixed-length string
    pub const FIXEDSYSSTRING: u8 = 0x17;
    /// Object reference
    pub const OBJECTREF: u8 = 0x18;
    /// `IUnknown` pointer
    pub const IUNKNOWN: u8 = 0x19;
    /// `IDispatch` pointer
    pub const IDISPATCH: u8 = 0x1a;
    /// Native structure
    pub const STRUCT: u8 = 0x1b;
    /// COM interface pointer
    pub const INTERFACE: u8 = 0x1c;
    /// COM `SAFEARRAY`
    pub const SAFEARRAY: u8 = 0x1d;
    /// Inline fixed-length array
    pub const FIXEDARRAY: u8 = 0x1e;
    /// Platform signed integer
    pub const INT: u8 = 0x1f;
    /// Platform unsigned integer
    pub const UINT: u8 = 0x20;
    /// Nested structure
    pub const NESTEDSTRUCT: u8 = 0x21;
    /// Inline string
    pub const BYVALSTR: u8 = 0x22;
    /// ANSI `BSTR`
    pub const ANSIBSTR: u8 = 0x23;
    /// Platform `BSTR`
    pub const TBSTR: u8 = 0x24;
    /// `VARIANT_BOOL`
    pub const VARIANTBOOL: u8 = 0x25;
    /// Function pointer
    pub const FUNC: u8 = 0x26;
    /// Any type, decided at runtime
    pub const ASANY: u8 = 0x28;
    /// Variable-length array
    pub const ARRAY: u8 = 0x2a;
    /// Pointer to a structure
    pub const LPSTRUCT: u8 = 0x2b;
    /// Custom marshaler
    pub const CUSTOMMARSHALER: u8 = 0x2c;
    /// `HRESULT`
    pub const ERROR: u8 = 0x2d;
    /// `IInspectable` pointer
    pub const IINSPECTABLE: u8 = 0x2e;
    /// WinRT `HSTRING`
    pub const HSTRING: u8 = 0x2f;
    /// UTF-8 string pointer
    pub const LPUTF8STR: u8 = 0x30;
    /// One past the highest native type
    pub const MAX: u8 = 0x50;
}

/// A decoded marshalling descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshallingInfo {
    /// A native type without parameters
    Simple(u8),
    /// `FIXEDSYSSTRING` with its optional inline length
    FixedSysString {
        /// Length in characters
        size: Option<u32>,
    },
    /// `FIXEDARRAY` with its optional length and element type
    FixedArray {
        /// Element count
        size: Option<u32>,
        /// Native element type
        element: Option<u8>,
    },
    /// `ARRAY` with its optional positional parameters
    Array {
        /// Native element type
        element: Option<u8>,
        /// Index of the parameter that carries the element count
        param_index: Option<u32>,
        /// Fixed element count
        size: Option<u32>,
        /// Which of the size parameters were specified in source
        flags: Option<u32>,
    },
    /// `SAFEARRAY` with its optional variant type and user-defined element type name
    SafeArray {
        /// `VARTYPE` of the elements
        variant_type: Option<u32>,
        /// Element type name for `VT_RECORD` style arrays
        user_defined_type: Option<String>,
    },
    /// `CUSTOMMARSHALER` with its four strings
    CustomMarshaler {
        /// Marshaler GUID, normally empty
        guid: String,
        /// Native type name, normally empty
        native_type_name: String,
        /// Managed marshaler type name
        marshaler_type: String,
        /// Cookie passed to the marshaler
        cookie: String,
    },
    /// `IUNKNOWN`, `IDISPATCH`, `INTERFACE` or `IINSPECTABLE` with an optional IID parameter
    Interface {
        /// The interface native type
        native_type: u8,
        /// Index of the parameter carrying the interface IID
        iid_param_index: Option<u32>,
    },
}

impl MarshallingInfo {
    /// The leading native type byte
    #[must_use]
    pub fn native_type(&self) -> u8 {
        match self {
            MarshallingInfo::Simple(native_type)
            | MarshallingInfo::Interface { native_type, .. } => *native_type,
            MarshallingInfo::FixedSysString { .. } => NATIVE_TYPE::FIXEDSYSSTRING,
            MarshallingInfo::FixedArray { .. } => NATIVE_TYPE::FIXEDARRAY,
            MarshallingInfo::Array { .. } => NATIVE_TYPE::ARRAY,
            MarshallingInfo::SafeArray { .. } => NATIVE_TYPE::SAFEARRAY,
            MarshallingInfo::CustomMarshaler { .. } => NATIVE_TYPE::CUSTOMMARSHALER,
        }
    }
}

fn optional_uint(parser: &mut Parser<'_>) -> Result<Option<u32>> {
    if parser.has_more_data() {
        Ok(Some(parser.read_compressed_uint()?))
    } else {
        Ok(None)
    }
}

fn optional_byte(parser: &mut Parser<'_>) -> Result<Option<u8>> {
    if parser.has_more_data() {
        Ok(Some(parser.read_le::<u8>()?))
    } else {
        Ok(None)
    }
}

fn counted_string(parser: &mut Parser<'_>) -> Result<String> {
    let length = parser.read_compressed_uint()? as usize;
    let bytes = parser.read_bytes(length)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| malformed_error!("Invalid UTF-8 in marshalling descriptor: {}", e))
}

/// Parse a marshalling descriptor blob.
///
/// # Errors
/// Returns an error for an empty blob, an unknown native type or trailing bytes
pub fn parse_marshalling_descriptor(data: &[u8]) -> Result<MarshallingInfo> {
    let mut parser = Parser::new(data);
    let native_type = parser.read_le::<u8>()?;
    if native_type == NATIVE_TYPE::END || native_type >= NATIVE_TYPE::MAX {
        return Err(malformed_error!("Invalid native type 0x{:02x}", native_type));
    }

    let info = match native_type {
        NATIVE_TYPE::FIXEDSYSSTRING => MarshallingInfo::FixedSysString {
            size: optional_uint(&mut parser)?,
        },
        NATIVE_TYPE::FIXEDARRAY => {
            let size = optional_uint(&mut parser)?;
            let element = if size.is_some() {
                optional_byte(&mut parser)?
            } else {
                None
            };
            MarshallingInfo::FixedArray { size, element }
        }
        NATIVE_TYPE::ARRAY => {
            let element = optional_byte(&mut parser)?;
            let param_index = optional_uint(&mut parser)?;
            let size = optional_uint(&mut parser)?;
            let flags = optional_uint(&mut parser)?;
            MarshallingInfo::Array {
                element,
                param_index,
                size,
                flags,
            }
        }
        NATIVE_TYPE::SAFEARRAY => {
            let variant_type = optional_uint(&mut parser)?;
            let user_defined_type = if parser.has_more_data() {
                Some(counted_string(&mut parser)?)
            } else {
                None
            };
            MarshallingInfo::SafeArray {
                variant_type,
                user_defined_type,
            }
        }
        NATIVE_TYPE::CUSTOMMARSHALER => MarshallingInfo::CustomMarshaler {
            guid: counted_string(&mut parser)?,
            native_type_name: counted_string(&mut parser)?,
            marshaler_type: counted_string(&mut parser)?,
            cookie: counted_string(&mut parser)?,
        },
        NATIVE_TYPE::IUNKNOWN
        | NATIVE_TYPE::IDISPATCH
        | NATIVE_TYPE::INTERFACE
        | NATIVE_TYPE::IINSPECTABLE => MarshallingInfo::Interface {
            native_type,
            iid_param_index: optional_uint(&mut parser)?,
        },
        simple => MarshallingInfo::Simple(simple),
    };

    if parser.has_more_data() {
        return Err(malformed_error!(
            "Marshalling descriptor 0x{:02x} has {} trailing bytes",
            native_type,
            parser.remaining()
        ));
    }

    Ok(info)
}

fn write_counted_string(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let length = u32::try_from(value.len())
        .map_err(|_| malformed_error!("Marshalling string too long"))?;
    write_compressed_uint(out, length)?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Positional parameters: once one is absent, none after it may be present.
fn check_positional(present: &[bool]) -> Result<()> {
    if let Some(gap) = present.iter().position(|p| !p) {
        if present[gap..].iter().any(|p| *p) {
            return Err(malformed_error!(
                "Marshalling parameter {} is present after an absent one",
                gap + 1
            ));
        }
    }
    Ok(())
}

/// Encode a marshalling descriptor.
///
/// # Errors
/// Returns an error if an optional parameter is present after an absent one, or a value
/// does not fit a compressed integer
pub fn encode_marshalling_descriptor(info: &MarshallingInfo) -> Result<Vec<u8>> {
    let mut out = vec![info.native_type()];
    match info {
        MarshallingInfo::Simple(_) => {}
        MarshallingInfo::FixedSysString { size } => {
            if let Some(size) = size {
                write_compressed_uint(&mut out, *size)?;
            }
        }
        MarshallingInfo::FixedArray { size, element } => {
            check_positional(&[size.is_some(), element.is_some()])?;
            if let Some(size) = size {
                write_compressed_uint(&mut out, *size)?;
            }
            if let Some(element) = element {
                out.push(*element);
            }
        }
        MarshallingInfo::Array {
            element,
            param_index,
            size,
            flags,
        } => {
            check_positional(&[
                element.is_some(),
                param_index.is_some(),
                size.is_some(),
                flags.is_some(),
            ])?;
            if let Some(element) = element {
                out.push(*element);
            }
            for value in [param_index, size, flags].into_iter().flatten() {
                write_compressed_uint(&mut out, *value)?;
            }
        }
        MarshallingInfo::SafeArray {
            variant_type,
            user_defined_type,
        } => {
            check_positional(&[variant_type.is_some(), user_defined_type.is_some()])?;
            if let Some(variant_type) = variant_type {
                write_compressed_uint(&mut out, *variant_type)?;
            }
            if let Some(name) = user_defined_type {
                write_counted_string(&mut out, name)?;
            }
        }
        MarshallingInfo::CustomMarshaler {
            guid,
            native_type_name,
            marshaler_type,
            cookie,
        } => {
            for value in [guid, native_type_name, marshaler_type, cookie] {
                write_counted_string(&mut out, value)?;
            }
        }
        MarshallingInfo::Interface {
            iid_param_index, ..
        } => {
            if let Some(index) = iid_param_index {
                write_compressed_uint(&mut out, *index)?;
            }
        }
    }
    Ok(out)
}
