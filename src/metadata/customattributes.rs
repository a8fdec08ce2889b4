//! Custom attribute value blobs (ECMA-335 II.23.3).
//!
//! A value blob starts with the prolog `0x0001`, carries the constructor's fixed arguments
//! in the order of the constructor signature, then a `u16` count of named arguments. The
//! fixed arguments are not self-describing, so parsing needs the constructor parameter
//! types plus a [`CaTypeResolver`] that can tell enums and `System.Type` apart from other
//! classes.
//!
//! Named security attributes (`DeclSecurity` blobs) reuse the named argument codec.

use crate::{
    file::{
        io::{push_le, write_compressed_uint, write_ser_string},
        parser::Parser,
    },
    metadata::{
        signatures::{TypeSignature, ELEMENT_TYPE},
        tables::TableIndex,
    },
    Result,
};

/// Custom attribute blob prolog
pub const CUSTOM_ATTRIBUTE_PROLOG: u16 = 0x0001;

/// The type of a custom attribute argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaElemType {
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `int8`
    I1,
    /// `uint8`
    U1,
    /// `int16`
    I2,
    /// `uint16`
    U2,
    /// `int32`
    I4,
    /// `uint32`
    U4,
    /// `int64`
    I8,
    /// `uint64`
    U8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `string`
    String,
    /// `System.Type`, stored as a type name string
    Type,
    /// `object`; the value carries its own type tag
    Object,
    /// Single-dimensional array
    SzArray(Box<CaElemType>),
    /// Enum value stored as its underlying integer
    Enum {
        /// Assembly-qualified enum name; required wherever the tag is written out
        type_name: Option<String>,
        /// The underlying integer type
        underlying: Box<CaElemType>,
    },
}

/// A custom attribute argument value
#[derive(Debug, Clone, PartialEq)]
pub enum CaValue {
    /// `bool`
    Boolean(bool),
    /// `char`
    Char(u16),
    /// `int8`
    I1(i8),
    /// `uint8`
    U1(u8),
    /// `int16`
    I2(i16),
    /// `uint16`
    U2(u16),
    /// `int32`
    I4(i32),
    /// `uint32`
    U4(u32),
    /// `int64`
    I8(i64),
    /// `uint64`
    U8(u64),
    /// `float32`
    R4(f32),
    /// `float64`
    R8(f64),
    /// A string, `None` for null
    String(Option<String>),
    /// A type name, `None` for null
    Type(Option<String>),
    /// A value stored under an `object` slot together with its actual type
    Boxed(Box<CaArgument>),
    /// Array elements, `None` for a null array
    Array(Option<Vec<CaValue>>),
}

/// A typed argument
#[derive(Debug, Clone, PartialEq)]
pub struct CaArgument {
    /// Declared argument type
    pub ty: CaElemType,
    /// The value
    pub value: CaValue,
}

/// A named field or property assignment
#[derive(Debug, Clone, PartialEq)]
pub struct CaNamedArgument {
    /// `true` for a field, `false` for a property
    pub is_field: bool,
    /// Member type
    pub ty: CaElemType,
    /// Member name
    pub name: String,
    /// Assigned value
    pub value: CaValue,
}

/// A decoded custom attribute value blob
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeValue {
    /// Constructor arguments
    pub fixed_args: Vec<CaArgument>,
    /// Field and property assignments
    pub named_args: Vec<CaNamedArgument>,
}

impl CustomAttributeValue {
    /// Visit every type name embedded in the value: `System.Type` arguments and the
    /// enum names carried by tags.
    pub fn for_each_type_name_mut(&mut self, f: &mut dyn FnMut(&mut String)) {
        for arg in &mut self.fixed_args {
            visit_argument(&mut arg.ty, &mut arg.value, f);
        }
        for arg in &mut self.named_args {
            visit_argument(&mut arg.ty, &mut arg.value, f);
        }
    }
}

fn visit_type(ty: &mut CaElemType, f: &mut dyn FnMut(&mut String)) {
    match ty {
        CaElemType::Enum {
            type_name: Some(name),
            ..
        } => f(name),
        CaElemType::SzArray(inner) => visit_type(inner, f),
        _ => {}
    }
}

fn visit_value(value: &mut CaValue, f: &mut dyn FnMut(&mut String)) {
    match value {
        CaValue::Type(Some(name)) => f(name),
        CaValue::Boxed(inner) => visit_argument(&mut inner.ty, &mut inner.value, f),
        CaValue::Array(Some(values)) => {
            for value in values {
                visit_value(value, f);
            }
        }
        _ => {}
    }
}

fn visit_argument(ty: &mut CaElemType, value: &mut CaValue, f: &mut dyn FnMut(&mut String)) {
    visit_type(ty, f);
    visit_value(value, f);
}

/// Resolves the classes that appear in constructor signatures and enum tags
pub trait CaTypeResolver {
    /// Underlying integer type when `index` names an enum
    fn enum_underlying(&self, index: TableIndex) -> Option<CaElemType>;

    /// Whether `index` names `System.Type`
    fn is_system_type(&self, index: TableIndex) -> bool;

    /// Underlying integer type of the enum with the given (possibly assembly-qualified) name
    fn enum_by_name(&self, name: &str) -> Option<CaElemType>;
}

/// A resolver that knows no enums; only self-describing blobs parse with it
pub struct NoTypeResolver;

impl CaTypeResolver for NoTypeResolver {
    fn enum_underlying(&self, _index: TableIndex) -> Option<CaElemType> {
        None
    }

    fn is_system_type(&self, _index: TableIndex) -> bool {
        false
    }

    fn enum_by_name(&self, _name: &str) -> Option<CaElemType> {
        None
    }
}

/// Map a primitive signature element to the argument type it stands for
#[must_use]
pub fn primitive_elem_type(signature: &TypeSignature) -> Option<CaElemType> {
    Some(match signature {
        TypeSignature::Boolean => CaElemType::Boolean,
        TypeSignature::Char => CaElemType::Char,
        TypeSignature::I1 => CaElemType::I1,
        TypeSignature::U1 => CaElemType::U1,
        TypeSignature::I2 => CaElemType::I2,
        TypeSignature::U2 => CaElemType::U2,
        TypeSignature::I4 => CaElemType::I4,
        TypeSignature::U4 => CaElemType::U4,
        TypeSignature::I8 => CaElemType::I8,
        TypeSignature::U8 => CaElemType::U8,
        TypeSignature::R4 => CaElemType::R4,
        TypeSignature::R8 => CaElemType::R8,
        _ => return None,
    })
}

fn param_type(signature: &TypeSignature, resolver: &dyn CaTypeResolver) -> Result<CaElemType> {
    if let Some(primitive) = primitive_elem_type(signature) {
        return Ok(primitive);
    }

    match signature {
        TypeSignature::String => Ok(CaElemType::String),
        TypeSignature::Object => Ok(CaElemType::Object),
        TypeSignature::SzArray(inner) => {
            Ok(CaElemType::SzArray(Box::new(param_type(inner, resolver)?)))
        }
        TypeSignature::Modified(_, inner) => param_type(inner, resolver),
        TypeSignature::Class(index) | TypeSignature::ValueType(index) => {
            if resolver.is_system_type(*index) {
                Ok(CaElemType::Type)
            } else if let Some(underlying) = resolver.enum_underlying(*index) {
                Ok(CaElemType::Enum {
                    type_name: None,
                    underlying: Box::new(underlying),
                })
            } else {
                Err(malformed_error!(
                    "Attribute parameter type {} cannot be resolved",
                    signature
                ))
            }
        }
        other => Err(malformed_error!(
            "Type {} cannot appear in a custom attribute",
            other
        )),
    }
}

/// Parse a custom attribute value blob.
///
/// `params` are the constructor's parameter types.
///
/// # Errors
/// Returns an error for a bad prolog, a parameter type the resolver cannot classify,
/// truncated data or trailing bytes
pub fn parse_custom_attribute(
    data: &[u8],
    params: &[TypeSignature],
    resolver: &dyn CaTypeResolver,
) -> Result<CustomAttributeValue> {
    let mut parser = Parser::new(data);
    let prolog = parser.read_le::<u16>()?;
    if prolog != CUSTOM_ATTRIBUTE_PROLOG {
        return Err(malformed_error!(
            "Invalid custom attribute prolog 0x{:04x}",
            prolog
        ));
    }

    let mut fixed_args = Vec::with_capacity(params.len());
    for param in params {
        let ty = param_type(param, resolver)?;
        let value = read_value(&mut parser, &ty, resolver)?;
        fixed_args.push(CaArgument { ty, value });
    }

    let count = parser.read_le::<u16>()?;
    let named_args = read_named_arguments(&mut parser, u32::from(count), resolver)?;

    if parser.has_more_data() {
        return Err(malformed_error!(
            "Custom attribute has {} trailing bytes",
            parser.remaining()
        ));
    }

    Ok(CustomAttributeValue {
        fixed_args,
        named_args,
    })
}

/// Read `count` named arguments.
///
/// # Errors
/// Returns an error if an argument is malformed or names an enum the resolver cannot find
pub fn read_named_arguments(
    parser: &mut Parser<'_>,
    count: u32,
    resolver: &dyn CaTypeResolver,
) -> Result<Vec<CaNamedArgument>> {
    let mut named_args = Vec::new();
    for _ in 0..count {
        let is_field = match parser.read_le::<u8>()? {
            ELEMENT_TYPE::FIELD => true,
            ELEMENT_TYPE::PROPERTY => false,
            other => {
                return Err(malformed_error!(
                    "Invalid named argument kind 0x{:02x}",
                    other
                ))
            }
        };
        let ty = read_type_tag(parser, resolver)?;
        let name = parser
            .read_ser_string()?
            .ok_or_else(|| malformed_error!("Named argument without a name"))?;
        let value = read_value(parser, &ty, resolver)?;
        named_args.push(CaNamedArgument {
            is_field,
            ty,
            name,
            value,
        });
    }
    Ok(named_args)
}

fn read_type_tag(parser: &mut Parser<'_>, resolver: &dyn CaTypeResolver) -> Result<CaElemType> {
    let tag = parser.read_le::<u8>()?;
    Ok(match tag {
        ELEMENT_TYPE::BOOLEAN => CaElemType::Boolean,
        ELEMENT_TYPE::CHAR => CaElemType::Char,
        ELEMENT_TYPE::I1 => CaElemType::I1,
        ELEMENT_TYPE::U1 => CaElemType::U1,
        ELEMENT_TYPE::I2 => CaElemType::I2,
        ELEMENT_TYPE::U2 => CaElemType::U2,
        ELEMENT_TYPE::I4 => CaElemType::I4,
        ELEMENT_TYPE::U4 => CaElemType::U4,
        ELEMENT_TYPE::I8 => CaElemType::I8,
        ELEMENT_TYPE::U8 => CaElemType::U8,
        ELEMENT_TYPE::R4 => CaElemType::R4,
        ELEMENT_TYPE::R8 => CaElemType::R8,
        ELEMENT_TYPE::STRING => CaElemType::String,
        ELEMENT_TYPE::TYPE => CaElemType::Type,
        ELEMENT_TYPE::BOXED => CaElemType::Object,
        ELEMENT_TYPE::SZARRAY => CaElemType::SzArray(Box::new(read_type_tag(parser, resolver)?)),
        ELEMENT_TYPE::ENUM => {
            let name = parser
                .read_ser_string()?
                .ok_or_else(|| malformed_error!("Enum tag without a type name"))?;
            let underlying = resolver
                .enum_by_name(&name)
                .ok_or_else(|| malformed_error!("Enum {} cannot be resolved", name))?;
            CaElemType::Enum {
                type_name: Some(name),
                underlying: Box::new(underlying),
            }
        }
        other => {
            return Err(malformed_error!(
                "Invalid custom attribute type tag 0x{:02x}",
                other
            ))
        }
    })
}

fn read_value(
    parser: &mut Parser<'_>,
    ty: &CaElemType,
    resolver: &dyn CaTypeResolver,
) -> Result<CaValue> {
    Ok(match ty {
        CaElemType::Boolean => CaValue::Boolean(parser.read_le::<u8>()? != 0),
        CaElemType::Char => CaValue::Char(parser.read_le::<u16>()?),
        CaElemType::I1 => CaValue::I1(parser.read_le::<i8>()?),
        CaElemType::U1 => CaValue::U1(parser.read_le::<u8>()?),
        CaElemType::I2 => CaValue::I2(parser.read_le::<i16>()?),
        CaElemType::U2 => CaValue::U2(parser.read_le::<u16>()?),
        CaElemType::I4 => CaValue::I4(parser.read_le::<i32>()?),
        CaElemType::U4 => CaValue::U4(parser.read_le::<u32>()?),
        CaElemType::I8 => CaValue::I8(parser.read_le::<i64>()?),
        CaElemType::U8 => CaValue::U8(parser.read_le::<u64>()?),
        CaElemType::R4 => CaValue::R4(parser.read_le::<f32>()?),
        CaElemType::R8 => CaValue::R8(parser.read_le::<f64>()?),
        CaElemType::String => CaValue::String(parser.read_ser_string()?),
        CaElemType::Type => CaValue::Type(parser.read_ser_string()?),
        CaElemType::Object => {
            let ty = read_type_tag(parser, resolver)?;
            let value = read_value(parser, &ty, resolver)?;
            CaValue::Boxed(Box::new(CaArgument { ty, value }))
        }
        CaElemType::SzArray(element) => {
            let count = parser.read_le::<u32>()?;
            if count == u32::MAX {
                CaValue::Array(None)
            } else {
                if count as usize > parser.remaining() {
                    return Err(malformed_error!(
                        "Array of {} elements exceeds the remaining {} bytes",
                        count,
                        parser.remaining()
                    ));
                }
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(read_value(parser, element, resolver)?);
                }
                CaValue::Array(Some(values))
            }
        }
        CaElemType::Enum { underlying, .. } => read_value(parser, underlying, resolver)?,
    })
}

/// Encode a custom attribute value blob.
///
/// # Errors
/// Returns an error if a value does not match its declared type or an enum tag has no name
pub fn encode_custom_attribute(value: &CustomAttributeValue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    push_le(&mut out, CUSTOM_ATTRIBUTE_PROLOG);
    for arg in &value.fixed_args {
        write_value(&mut out, &arg.ty, &arg.value)?;
    }

    let count = u16::try_from(value.named_args.len())
        .map_err(|_| malformed_error!("Too many named arguments"))?;
    push_le(&mut out, count);
    write_named_arguments(&mut out, &value.named_args)?;
    Ok(out)
}

/// Write named arguments without a count.
///
/// # Errors
/// Returns an error if a value does not match its declared type
pub fn write_named_arguments(out: &mut Vec<u8>, args: &[CaNamedArgument]) -> Result<()> {
    for arg in args {
        out.push(if arg.is_field {
            ELEMENT_TYPE::FIELD
        } else {
            ELEMENT_TYPE::PROPERTY
        });
        write_type_tag(out, &arg.ty)?;
        write_ser_string(out, Some(&arg.name))?;
        write_value(out, &arg.ty, &arg.value)?;
    }
    Ok(())
}

fn write_type_tag(out: &mut Vec<u8>, ty: &CaElemType) -> Result<()> {
    let tag = match ty {
        CaElemType::Boolean => ELEMENT_TYPE::BOOLEAN,
        CaElemType::Char => ELEMENT_TYPE::CHAR,
        CaElemType::I1 => ELEMENT_TYPE::I1,
        CaElemType::U1 => ELEMENT_TYPE::U1,
        CaElemType::I2 => ELEMENT_TYPE::I2,
        CaElemType::U2 => ELEMENT_TYPE::U2,
        CaElemType::I4 => ELEMENT_TYPE::I4,
        CaElemType::U4 => ELEMENT_TYPE::U4,
        CaElemType::I8 => ELEMENT_TYPE::I8,
        CaElemType::U8 => ELEMENT_TYPE::U8,
        CaElemType::R4 => ELEMENT_TYPE::R4,
        CaElemType::R8 => ELEMENT_TYPE::R8,
        CaElemType::String => ELEMENT_TYPE::STRING,
        CaElemType::Type => ELEMENT_TYPE::TYPE,
        CaElemType::Object => ELEMENT_TYPE::BOXED,
        CaElemType::SzArray(element) => {
            out.push(ELEMENT_TYPE::SZARRAY);
            return write_type_tag(out, element);
        }
        CaElemType::Enum { type_name, .. } => {
            let name = type_name
                .as_deref()
                .ok_or_else(|| malformed_error!("Enum tag requires a type name"))?;
            out.push(ELEMENT_TYPE::ENUM);
            return write_ser_string(out, Some(name));
        }
    };
    out.push(tag);
    Ok(())
}

fn write_value(out: &mut Vec<u8>, ty: &CaElemType, value: &CaValue) -> Result<()> {
    match (ty, value) {
        (CaElemType::Enum { underlying, .. }, value) => write_value(out, underlying, value)?,
        (CaElemType::Boolean, CaValue::Boolean(v)) => out.push(u8::from(*v)),
        (CaElemType::Char, CaValue::Char(v)) | (CaElemType::U2, CaValue::U2(v)) => {
            push_le(out, *v);
        }
        (CaElemType::I1, CaValue::I1(v)) => push_le(out, *v),
        (CaElemType::U1, CaValue::U1(v)) => out.push(*v),
        (CaElemType::I2, CaValue::I2(v)) => push_le(out, *v),
        (CaElemType::I4, CaValue::I4(v)) => push_le(out, *v),
        (CaElemType::U4, CaValue::U4(v)) => push_le(out, *v),
        (CaElemType::I8, CaValue::I8(v)) => push_le(out, *v),
        (CaElemType::U8, CaValue::U8(v)) => push_le(out, *v),
        (CaElemType::R4, CaValue::R4(v)) => push_le(out, *v),
        (CaElemType::R8, CaValue::R8(v)) => push_le(out, *v),
        (CaElemType::String, CaValue::String(v)) | (CaElemType::Type, CaValue::Type(v)) => {
            write_ser_string(out, v.as_deref())?;
        }
        (CaElemType::Object, CaValue::Boxed(inner)) => {
            write_type_tag(out, &inner.ty)?;
            write_value(out, &inner.ty, &inner.value)?;
        }
        (CaElemType::SzArray(_), CaValue::Array(None)) => push_le(out, u32::MAX),
        (CaElemType::SzArray(element), CaValue::Array(Some(values))) => {
            let count = u32::try_from(values.len())
                .map_err(|_| malformed_error!("Attribute array too long"))?;
            push_le(out, count);
            for value in values {
                write_value(out, element, value)?;
            }
        }
        (ty, value) => {
            return Err(malformed_error!(
                "Value {:?} does not match attribute type {:?}",
                value,
                ty
            ))
        }
    }
    Ok(())
}

/// Encode a compressed `u32` count, used by security blobs.
pub(crate) fn write_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| malformed_error!("Count {} too large", count))?;
    write_compressed_uint(out, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::TableId;

    struct OneEnum;

    impl CaTypeResolver for OneEnum {
        fn enum_underlying(&self, index: TableIndex) -> Option<CaElemType> {
            (index == TableIndex::new(TableId::TYPE_REF, 0)).then_some(CaElemType::I4)
        }

        fn is_system_type(&self, index: TableIndex) -> bool {
            index == TableIndex::new(TableId::TYPE_REF, 1)
        }

        fn enum_by_name(&self, name: &str) -> Option<CaElemType> {
            name.starts_with("System.AttributeTargets").then_some(CaElemType::I4)
        }
    }

    #[test]
    fn fixed_and_named() {
        let mut blob = vec![0x01, 0x00];
        blob.extend_from_slice(&[0x04, b'T', b'e', b's', b't']);
        blob.extend_from_slice(&5_i32.to_le_bytes());
        blob.extend_from_slice(&[0x01, 0x00]);
        blob.extend_from_slice(&[0x54, 0x02, 0x07]);
        blob.extend_from_slice(b"Enabled");
        blob.push(1);

        let params = [
            TypeSignature::String,
            TypeSignature::ValueType(TableIndex::new(TableId::TYPE_REF, 0)),
        ];
        let value = parse_custom_attribute(&blob, &params, &OneEnum).unwrap();
        assert_eq!(value.fixed_args.len(), 2);
        assert_eq!(value.fixed_args[0].value, CaValue::String(Some("Test".into())));
        assert_eq!(value.fixed_args[1].value, CaValue::I4(5));
        assert_eq!(value.named_args[0].name, "Enabled");
        assert!(!value.named_args[0].is_field);
        assert_eq!(encode_custom_attribute(&value).unwrap(), blob);
    }

    #[test]
    fn unknown_class_fails() {
        let blob = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let params = [TypeSignature::Class(TableIndex::new(TableId::TYPE_REF, 7))];
        assert!(parse_custom_attribute(&blob, &params, &OneEnum).is_err());
        assert!(parse_custom_attribute(&[0x02, 0x00, 0x00, 0x00], &[], &OneEnum).is_err());
    }

    #[test]
    fn boxed_arrays_and_type_names() {
        let mut blob = vec![0x01, 0x00];
        // object slot holding an enum
        blob.extend_from_slice(&[0x55, 0x17]);
        blob.extend_from_slice(b"System.AttributeTargets");
        blob.extend_from_slice(&4_i32.to_le_bytes());
        // System.Type
        blob.extend_from_slice(&[0x05]);
        blob.extend_from_slice(b"A.Foo");
        // null array
        blob.extend_from_slice(&u32::MAX.to_le_bytes());
        blob.extend_from_slice(&[0x00, 0x00]);

        let params = [
            TypeSignature::Object,
            TypeSignature::Class(TableIndex::new(TableId::TYPE_REF, 1)),
            TypeSignature::SzArray(Box::new(TypeSignature::I4)),
        ];
        let mut value = parse_custom_attribute(&blob, &params, &OneEnum).unwrap();
        assert_eq!(value.fixed_args[2].value, CaValue::Array(None));
        assert_eq!(encode_custom_attribute(&value).unwrap(), blob);

        let mut names = Vec::new();
        value.for_each_type_name_mut(&mut |name| {
            names.push(name.clone());
            if name == "A.Foo" {
                *name = "B.Foo".to_string();
            }
        });
        assert_eq!(names, ["System.AttributeTargets", "A.Foo"]);
        assert_eq!(
            value.fixed_args[1].value,
            CaValue::Type(Some("B.Foo".into()))
        );
    }
}
