//! Values of the `Constant` table.
//!
//! A constant blob has no self-describing header; its interpretation is fixed by the
//! element type held in the row's `Type` column.

use widestring::U16String;

use crate::{
    file::{io::push_le, parser::Parser},
    metadata::signatures::ELEMENT_TYPE,
    Result,
};

/// A decoded constant value
#[derive(Debug, Clone)]
pub enum ConstantValue {
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
    /// A UTF-16 string; kept as code units so unpaired surrogates survive
    String(U16String),
    /// The null reference
    Null,
}

impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantValue::R4(left), ConstantValue::R4(right)) => left.to_bits() == right.to_bits(),
            (ConstantValue::R8(left), ConstantValue::R8(right)) => left.to_bits() == right.to_bits(),
            (ConstantValue::Boolean(left), ConstantValue::Boolean(right)) => left == right,
            (ConstantValue::Char(left), ConstantValue::Char(right))
            | (ConstantValue::U2(left), ConstantValue::U2(right)) => left == right,
            (ConstantValue::I1(left), ConstantValue::I1(right)) => left == right,
            (ConstantValue::U1(left), ConstantValue::U1(right)) => left == right,
            (ConstantValue::I2(left), ConstantValue::I2(right)) => left == right,
            (ConstantValue::I4(left), ConstantValue::I4(right)) => left == right,
            (ConstantValue::U4(left), ConstantValue::U4(right)) => left == right,
            (ConstantValue::I8(left), ConstantValue::I8(right)) => left == right,
            (ConstantValue::U8(left), ConstantValue::U8(right)) => left == right,
            (ConstantValue::String(left), ConstantValue::String(right)) => left == right,
            (ConstantValue::Null, ConstantValue::Null) => true,
            _ => false,
        }
    }
}

impl ConstantValue {
    /// The element type written into the `Constant.Type` column
    #[must_use]
    pub fn element_type(&self) -> u8 {
        match self {
            ConstantValue::Boolean(_) => ELEMENT_TYPE::BOOLEAN,
            ConstantValue::Char(_) => ELEMENT_TYPE::CHAR,
            ConstantValue::I1(_) => ELEMENT_TYPE::I1,
            ConstantValue::U1(_) => ELEMENT_TYPE::U1,
            ConstantValue::I2(_) => ELEMENT_TYPE::I2,
            ConstantValue::U2(_) => ELEMENT_TYPE::U2,
            ConstantValue::I4(_) => ELEMENT_TYPE::I4,
            ConstantValue::U4(_) => ELEMENT_TYPE::U4,
            ConstantValue::I8(_) => ELEMENT_TYPE::I8,
            ConstantValue::U8(_) => ELEMENT_TYPE::U8,
            ConstantValue::R4(_) => ELEMENT_TYPE::R4,
            ConstantValue::R8(_) => ELEMENT_TYPE::R8,
            ConstantValue::String(_) => ELEMENT_TYPE::STRING,
            ConstantValue::Null => ELEMENT_TYPE::CLASS,
        }
    }
}

/// Decode a constant blob of the given element type.
///
/// # Errors
/// Returns an error if the blob does not have the size the element type requires or the
/// element type cannot hold a constant
pub fn parse_constant(element_type: u8, data: &[u8]) -> Result<ConstantValue> {
    let mut parser = Parser::new(data);
    let value = match element_type {
        ELEMENT_TYPE::BOOLEAN => ConstantValue::Boolean(parser.read_le::<u8>()? != 0),
        ELEMENT_TYPE::CHAR => ConstantValue::Char(parser.read_le::<u16>()?),
        ELEMENT_TYPE::I1 => ConstantValue::I1(parser.read_le::<i8>()?),
        ELEMENT_TYPE::U1 => ConstantValue::U1(parser.read_le::<u8>()?),
        ELEMENT_TYPE::I2 => ConstantValue::I2(parser.read_le::<i16>()?),
        ELEMENT_TYPE::U2 => ConstantValue::U2(parser.read_le::<u16>()?),
        ELEMENT_TYPE::I4 => ConstantValue::I4(parser.read_le::<i32>()?),
        ELEMENT_TYPE::U4 => ConstantValue::U4(parser.read_le::<u32>()?),
        ELEMENT_TYPE::I8 => ConstantValue::I8(parser.read_le::<i64>()?),
        ELEMENT_TYPE::U8 => ConstantValue::U8(parser.read_le::<u64>()?),
        ELEMENT_TYPE::R4 => ConstantValue::R4(parser.read_le::<f32>()?),
        ELEMENT_TYPE::R8 => ConstantValue::R8(parser.read_le::<f64>()?),
        ELEMENT_TYPE::STRING => {
            if data.len() % 2 != 0 {
                return Err(malformed_error!(
                    "String constant has odd length {}",
                    data.len()
                ));
            }
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            return Ok(ConstantValue::String(U16String::from_vec(units)));
        }
        ELEMENT_TYPE::CLASS => {
            if parser.read_le::<u32>()? != 0 {
                return Err(malformed_error!("Class constant is not null"));
            }
            ConstantValue::Null
        }
        other => {
            return Err(malformed_error!(
                "Element type 0x{:02x} cannot hold a constant",
                other
            ))
        }
    };

    if parser.has_more_data() {
        return Err(malformed_error!(
            "Constant of element type 0x{:02x} has {} trailing bytes",
            element_type,
            parser.remaining()
        ));
    }

    Ok(value)
}

/// Encode a constant into its blob
#[must_use]
pub fn encode_constant(value: &ConstantValue) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        ConstantValue::Boolean(value) => out.push(u8::from(*value)),
        ConstantValue::Char(value) | ConstantValue::U2(value) => push_le(&mut out, *value),
        ConstantValue::I1(value) => push_le(&mut out, *value),
        ConstantValue::U1(value) => out.push(*value),
        ConstantValue::I2(value) => push_le(&mut out, *value),
        ConstantValue::I4(value) => push_le(&mut out, *value),
        ConstantValue::U4(value) => push_le(&mut out, *value),
        ConstantValue::I8(value) => push_le(&mut out, *value),
        ConstantValue::U8(value) => push_le(&mut out, *value),
        ConstantValue::R4(value) => push_le(&mut out, *value),
        ConstantValue::R8(value) => push_le(&mut out, *value),
        ConstantValue::String(value) => {
            for unit in value.as_slice() {
                push_le(&mut out, *unit);
            }
        }
        ConstantValue::Null => push_le(&mut out, 0_u32),
    }
    out
}
