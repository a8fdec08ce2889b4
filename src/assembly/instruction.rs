//! In-memory CIL instructions.

use std::fmt;

use widestring::U16String;

use crate::{
    assembly::{OpCode, OperandType},
    metadata::tables::{RemapIndices, TableIndex},
    Result,
};

/// The operand of an instruction
#[derive(Debug, Clone)]
pub enum Operand {
    /// No operand
    None,
    /// 1-byte signed immediate
    Int8(i8),
    /// 1-byte unsigned immediate
    UInt8(u8),
    /// 2-byte unsigned immediate
    UInt16(u16),
    /// 4-byte signed immediate
    Int32(i32),
    /// 8-byte signed immediate
    Int64(i64),
    /// 4-byte float
    Float32(f32),
    /// 8-byte float
    Float64(f64),
    /// Branch offset relative to the end of the instruction
    Branch(i32),
    /// A `#US` string, kept as UTF-16 code units
    String(U16String),
    /// A metadata table token
    Token(TableIndex),
    /// Switch offsets relative to the end of the instruction
    Switch(Vec<i32>),
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::None, Operand::None) => true,
            (Operand::Int8(left), Operand::Int8(right)) => left == right,
            (Operand::UInt8(left), Operand::UInt8(right)) => left == right,
            (Operand::UInt16(left), Operand::UInt16(right)) => left == right,
            (Operand::Int32(left), Operand::Int32(right))
            | (Operand::Branch(left), Operand::Branch(right)) => left == right,
            (Operand::Int64(left), Operand::Int64(right)) => left == right,
            (Operand::Float32(left), Operand::Float32(right)) => left.to_bits() == right.to_bits(),
            (Operand::Float64(left), Operand::Float64(right)) => left.to_bits() == right.to_bits(),
            (Operand::String(left), Operand::String(right)) => left == right,
            (Operand::Token(left), Operand::Token(right)) => left == right,
            (Operand::Switch(left), Operand::Switch(right)) => left == right,
            _ => false,
        }
    }
}

/// One instruction: an opcode and its operand.
///
/// Operand-less instructions are plain values; `Instruction::simple(OpCode::Nop)` is the
/// same value everywhere it occurs.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, matching the opcode's operand class
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction, checking that the operand fits the opcode.
    ///
    /// # Errors
    /// Returns an error if the operand does not match the opcode's operand class
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Instruction> {
        let instruction = Instruction { opcode, operand };
        instruction.check()?;
        Ok(instruction)
    }

    /// An instruction without operand
    #[must_use]
    pub const fn simple(opcode: OpCode) -> Instruction {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// A branch with a relative offset
    #[must_use]
    pub const fn branch(opcode: OpCode, offset: i32) -> Instruction {
        Instruction {
            opcode,
            operand: Operand::Branch(offset),
        }
    }

    /// Verify that the operand matches the opcode.
    ///
    /// # Errors
    /// Returns an error describing the mismatch, including short branch offsets that do
    /// not fit a signed byte
    pub fn check(&self) -> Result<()> {
        let fits = match (self.opcode.operand_type(), &self.operand) {
            (OperandType::None, Operand::None)
            | (OperandType::ShortInt8, Operand::Int8(_))
            | (OperandType::UInt8, Operand::UInt8(_))
            | (OperandType::UInt16, Operand::UInt16(_))
            | (OperandType::Int32, Operand::Int32(_))
            | (OperandType::Int64, Operand::Int64(_))
            | (OperandType::Float32, Operand::Float32(_))
            | (OperandType::Float64, Operand::Float64(_))
            | (OperandType::BranchTarget, Operand::Branch(_))
            | (OperandType::String, Operand::String(_))
            | (OperandType::Switch, Operand::Switch(_)) => true,
            (OperandType::ShortBranchTarget, Operand::Branch(offset)) => {
                i8::try_from(*offset).is_ok()
            }
            (operand_type, Operand::Token(_)) => operand_type.is_table_token(),
            _ => false,
        };

        if fits {
            Ok(())
        } else {
            Err(malformed_error!(
                "Operand {:?} does not fit {}",
                self.operand,
                self.opcode.name()
            ))
        }
    }

    /// Total encoded size: code, fixed operand and the dynamic switch table
    #[must_use]
    pub fn size(&self) -> usize {
        let operand = match self.opcode.operand_type().fixed_size() {
            Some(size) => size,
            None => match &self.operand {
                Operand::Switch(targets) => 4 + 4 * targets.len(),
                _ => 4,
            },
        };
        self.opcode.code_size() + operand
    }

    /// Whether the operand is a branch offset or a switch table
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.operand, Operand::Branch(_) | Operand::Switch(_))
    }

    /// Relative branch offsets of this instruction, empty for non-branches
    #[must_use]
    pub fn branch_offsets(&self) -> Vec<i32> {
        match &self.operand {
            Operand::Branch(offset) => vec![*offset],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }
}

impl RemapIndices for Instruction {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        if let Operand::Token(index) = &mut self.operand {
            f(index)?;
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(value) => write!(f, " {value}"),
            Operand::UInt8(value) => write!(f, " {value}"),
            Operand::UInt16(value) => write!(f, " {value}"),
            Operand::Int32(value) => write!(f, " {value}"),
            Operand::Int64(value) => write!(f, " {value}"),
            Operand::Float32(value) => write!(f, " {value}"),
            Operand::Float64(value) => write!(f, " {value}"),
            Operand::Branch(offset) => write!(f, " {offset:+}"),
            Operand::String(value) => write!(f, " \"{}\"", value.to_string_lossy()),
            Operand::Token(index) => write!(f, " {index}"),
            Operand::Switch(targets) => {
                write!(f, " (")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{target:+}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::TableId;

    #[test]
    fn sizes() {
        assert_eq!(Instruction::simple(OpCode::Nop).size(), 1);
        assert_eq!(Instruction::simple(OpCode::Ceq).size(), 2);
        assert_eq!(Instruction::branch(OpCode::BrS, 3).size(), 2);
        assert_eq!(Instruction::branch(OpCode::Br, 3).size(), 5);
        let switch = Instruction::new(OpCode::Switch, Operand::Switch(vec![1, 2, 3])).unwrap();
        assert_eq!(switch.size(), 17);
        let empty = Instruction::new(OpCode::Switch, Operand::Switch(Vec::new())).unwrap();
        assert_eq!(empty.size(), 5);
        assert_eq!(
            Instruction::new(OpCode::Ldloc, Operand::UInt16(300)).unwrap().size(),
            4
        );
    }

    #[test]
    fn operand_checks() {
        assert!(Instruction::new(OpCode::Nop, Operand::Int32(1)).is_err());
        assert!(Instruction::new(OpCode::BrS, Operand::Branch(200)).is_err());
        assert!(Instruction::new(OpCode::Call, Operand::Token(TableIndex::new(TableId::METHOD_DEF, 0))).is_ok());
        assert!(Instruction::new(OpCode::LdcI4, Operand::Token(TableIndex::new(TableId::METHOD_DEF, 0))).is_err());
    }

    #[test]
    fn display() {
        let ldstr = Instruction::new(OpCode::Ldstr, Operand::String(U16String::from_str("hi"))).unwrap();
        assert_eq!(ldstr.to_string(), "ldstr \"hi\"");
        assert_eq!(Instruction::branch(OpCode::BrS, -2).to_string(), "br.s -2");
    }
}
