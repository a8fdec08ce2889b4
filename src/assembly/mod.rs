//! The opcode catalog and the IL instruction stream codec.
//!
//! # Key Types
//! - [`OpCode`] - the catalog of CIL opcodes with their codes and operand classes
//! - [`Instruction`] / [`Operand`] - one decoded instruction
//! - [`LabelMap`] - instruction offsets, used to move between byte offsets and indices
//!
//! # Main Functions
//! - [`decode`] / [`decode_stream`] - bytes to instructions
//! - [`encode_instruction`] / [`encode_stream`] - instructions to bytes
//! - [`Instruction::size`] - encoded size without encoding
//! - [`resolve_targets`] / [`apply_targets`] - branch editing through instruction indices
//!
//! # Example
//! ```rust
//! use cilmerge::assembly::{decode_stream, encode_stream, OpCode};
//!
//! let code = [0x00, 0x2B, 0x00, 0x2A]; // nop; br.s +0; ret
//! let instructions = decode_stream(&code, &mut |_| unreachable!())?;
//! assert_eq!(instructions[1].opcode, OpCode::BrS);
//! assert_eq!(instructions.iter().map(|i| i.size()).sum::<usize>(), code.len());
//! assert_eq!(encode_stream(&instructions, &mut |_| unreachable!())?, code);
//! # Ok::<(), cilmerge::Error>(())
//! ```

mod branches;
mod codec;
mod instruction;
mod opcodes;

pub use branches::{apply_targets, resolve_targets, widen_branches, LabelMap};
pub use codec::{
    decode, decode_instruction, decode_stream, encode_instruction, encode_stream,
    USER_STRING_TOKEN,
};
pub use instruction::{Instruction, Operand};
pub use opcodes::{OpCode, OperandType, EXTENDED_PREFIX};
