//! Encoding and decoding of CIL instruction streams.
//!
//! `ldstr` operands are `#US` heap tokens (`0x70` table byte) on disk; the codec resolves
//! them through caller-supplied callbacks so that the in-memory form carries the string
//! itself, which keeps instructions independent of any particular heap layout.

use widestring::{U16Str, U16String};

use crate::{
    assembly::{Instruction, OpCode, Operand, OperandType, EXTENDED_PREFIX},
    file::{io::push_le, parser::Parser},
    metadata::{tables::TableIndex, token::Token},
    Result,
};

/// Table byte of a `#US` heap token
pub const USER_STRING_TOKEN: u32 = 0x7000_0000;

/// Decode one instruction at the parser's position.
///
/// `strings` resolves a `#US` heap offset to its string.
///
/// # Errors
/// Returns an error for reserved opcodes, truncated operands or null table tokens
pub fn decode_instruction(
    parser: &mut Parser<'_>,
    strings: &mut dyn FnMut(u32) -> Result<U16String>,
) -> Result<Instruction> {
    let start = parser.pos();
    let first_byte = parser.read_le::<u8>()?;
    let opcode = if first_byte == EXTENDED_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        OpCode::from_extended(second_byte).ok_or_else(|| {
            malformed_error!("Invalid opcode FE {:02X} at offset {}", second_byte, start)
        })?
    } else {
        OpCode::from_byte(first_byte).ok_or_else(|| {
            malformed_error!("Invalid opcode {:02X} at offset {}", first_byte, start)
        })?
    };

    let operand = match opcode.operand_type() {
        OperandType::None => Operand::None,
        OperandType::ShortBranchTarget => Operand::Branch(i32::from(parser.read_le::<i8>()?)),
        OperandType::BranchTarget => Operand::Branch(parser.read_le::<i32>()?),
        OperandType::ShortInt8 => Operand::Int8(parser.read_le::<i8>()?),
        OperandType::UInt8 => Operand::UInt8(parser.read_le::<u8>()?),
        OperandType::UInt16 => Operand::UInt16(parser.read_le::<u16>()?),
        OperandType::Int32 => Operand::Int32(parser.read_le::<i32>()?),
        OperandType::Int64 => Operand::Int64(parser.read_le::<i64>()?),
        OperandType::Float32 => Operand::Float32(parser.read_le::<f32>()?),
        OperandType::Float64 => Operand::Float64(parser.read_le::<f64>()?),
        OperandType::String => {
            let token = parser.read_le::<u32>()?;
            if token & 0xFF00_0000 != USER_STRING_TOKEN {
                return Err(malformed_error!(
                    "ldstr at offset {} has non-string token 0x{:08x}",
                    start,
                    token
                ));
            }
            Operand::String(strings(token & 0x00FF_FFFF)?)
        }
        OperandType::Field
        | OperandType::Method
        | OperandType::Type
        | OperandType::Token
        | OperandType::Signature => {
            let token = Token::new(parser.read_le::<u32>()?);
            let index = TableIndex::from_token(token)?.ok_or_else(|| {
                malformed_error!("{} at offset {} has a null token", opcode.name(), start)
            })?;
            Operand::Token(index)
        }
        OperandType::Switch => {
            let count = parser.read_le::<u32>()? as usize;
            if count > parser.remaining() / 4 {
                return Err(malformed_error!(
                    "switch at offset {} declares {} targets but only {} bytes remain",
                    start,
                    count,
                    parser.remaining()
                ));
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(parser.read_le::<i32>()?);
            }
            Operand::Switch(targets)
        }
    };

    Ok(Instruction { opcode, operand })
}

/// Decode one instruction from the start of `data`, returning it with the number of bytes
/// consumed.
///
/// # Errors
/// See [`decode_instruction`]
pub fn decode(
    data: &[u8],
    strings: &mut dyn FnMut(u32) -> Result<U16String>,
) -> Result<(Instruction, usize)> {
    let mut parser = Parser::new(data);
    let instruction = decode_instruction(&mut parser, strings)?;
    Ok((instruction, parser.pos()))
}

/// Decode a whole instruction stream.
///
/// # Errors
/// Returns an error if any instruction is malformed or the last one is truncated
pub fn decode_stream(
    code: &[u8],
    strings: &mut dyn FnMut(u32) -> Result<U16String>,
) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser, strings)?);
    }
    Ok(instructions)
}

/// Encode one instruction.
///
/// `strings` interns a string into the `#US` heap and returns its offset.
///
/// # Errors
/// Returns an error if the operand does not match the opcode or a string cannot be interned
pub fn encode_instruction(
    out: &mut Vec<u8>,
    instruction: &Instruction,
    strings: &mut dyn FnMut(&U16Str) -> Result<u32>,
) -> Result<()> {
    instruction.check()?;

    let code = instruction.opcode.code();
    if code > 0xFF {
        out.push(EXTENDED_PREFIX);
    }
    out.push((code & 0xFF) as u8);

    match &instruction.operand {
        Operand::None => {}
        Operand::Int8(value) => push_le(out, *value),
        Operand::UInt8(value) => out.push(*value),
        Operand::UInt16(value) => push_le(out, *value),
        Operand::Int32(value) => push_le(out, *value),
        Operand::Int64(value) => push_le(out, *value),
        Operand::Float32(value) => push_le(out, *value),
        Operand::Float64(value) => push_le(out, *value),
        Operand::Branch(offset) => {
            if instruction.opcode.operand_type() == OperandType::ShortBranchTarget {
                let short = i8::try_from(*offset).map_err(|_| {
                    malformed_error!(
                        "Offset {} does not fit {}",
                        offset,
                        instruction.opcode.name()
                    )
                })?;
                push_le(out, short);
            } else {
                push_le(out, *offset);
            }
        }
        Operand::String(value) => {
            let offset = strings(value)?;
            if offset > 0x00FF_FFFF {
                return Err(malformed_error!("#US offset 0x{:x} exceeds 24 bits", offset));
            }
            push_le(out, USER_STRING_TOKEN | offset);
        }
        Operand::Token(index) => push_le(out, index.token().value()),
        Operand::Switch(targets) => {
            let count = u32::try_from(targets.len())
                .map_err(|_| malformed_error!("switch has too many targets"))?;
            push_le(out, count);
            for target in targets {
                push_le(out, *target);
            }
        }
    }
    Ok(())
}

/// Encode a whole instruction stream.
///
/// # Errors
/// See [`encode_instruction`]
pub fn encode_stream(
    instructions: &[Instruction],
    strings: &mut dyn FnMut(&U16Str) -> Result<u32>,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(instructions.iter().map(Instruction::size).sum());
    for instruction in instructions {
        encode_instruction(&mut out, instruction, strings)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::TableId;

    fn no_strings(offset: u32) -> Result<U16String> {
        Err(malformed_error!("unexpected string {}", offset))
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let (instruction, consumed) = decode(&[0xFE, 0x01, 0x2A], &mut no_strings).unwrap();
        assert_eq!(instruction, Instruction::simple(OpCode::Ceq));
        assert_eq!(consumed, 2);

        let (instruction, consumed) = decode(&[0x1F, 0xFF], &mut no_strings).unwrap();
        assert_eq!(instruction.operand, Operand::Int8(-1));
        assert_eq!(consumed, instruction.size());
    }

    #[test]
    fn tokens_and_strings() {
        let call = Instruction::new(
            OpCode::Call,
            Operand::Token(TableIndex::new(TableId::MEMBER_REF, 4)),
        )
        .unwrap();
        let ldstr =
            Instruction::new(OpCode::Ldstr, Operand::String(U16String::from_str("ok"))).unwrap();

        let mut interned = Vec::new();
        let bytes = encode_stream(&[call.clone(), ldstr.clone()], &mut |s: &U16Str| {
            interned.push(s.to_ustring());
            Ok(1)
        })
        .unwrap();
        assert_eq!(bytes, [0x28, 0x05, 0x00, 0x00, 0x0A, 0x72, 0x01, 0x00, 0x00, 0x70]);

        let decoded = decode_stream(&bytes, &mut |offset| {
            assert_eq!(offset, 1);
            Ok(interned[0].clone())
        })
        .unwrap();
        assert_eq!(decoded, [call, ldstr]);
    }

    #[test]
    fn switch_sizes_round_trip() {
        for targets in [vec![], vec![7], vec![-3, 0, 12]] {
            let switch = Instruction::new(OpCode::Switch, Operand::Switch(targets.clone())).unwrap();
            let bytes = encode_stream(std::slice::from_ref(&switch), &mut |_| Ok(0)).unwrap();
            assert_eq!(bytes.len(), switch.size());
            let (decoded, consumed) = decode(&bytes, &mut no_strings).unwrap();
            assert_eq!(decoded, switch);
            assert_eq!(consumed, 5 + 4 * targets.len());
        }
    }

    #[test]
    fn malformed_streams() {
        assert!(decode_stream(&[0x24], &mut no_strings).is_err());
        assert!(decode_stream(&[0xFE, 0x08], &mut no_strings).is_err());
        assert!(decode_stream(&[0x20, 0x01], &mut no_strings).is_err());
        assert!(decode_stream(&[0x28, 0x00, 0x00, 0x00, 0x06], &mut no_strings).is_err());
        assert!(decode_stream(&[0x45, 0xFF, 0xFF, 0xFF, 0x0F], &mut no_strings).is_err());
        assert!(decode_stream(&[0x72, 0x01, 0x00, 0x00, 0x06], &mut no_strings).is_err());
    }
}
