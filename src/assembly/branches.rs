//! Branch targets as instruction indices.
//!
//! On disk a branch stores an offset relative to the end of the instruction. Any edit that
//! changes instruction sizes invalidates those offsets, so edits go through instruction
//! indices: resolve every target to the index of the instruction it lands on, edit, then
//! re-apply the targets against the new layout.

use crate::{
    assembly::{Instruction, Operand},
    Result,
};

/// Byte offset of every instruction of a stream, plus the end of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    offsets: Vec<u32>,
}

impl LabelMap {
    /// Lay out `instructions` from offset 0
    #[must_use]
    pub fn new(instructions: &[Instruction]) -> Self {
        let mut offsets = Vec::with_capacity(instructions.len() + 1);
        let mut offset = 0_u32;
        for instruction in instructions {
            offsets.push(offset);
            offset += instruction.size() as u32;
        }
        offsets.push(offset);
        LabelMap { offsets }
    }

    /// Offset of the instruction at `index`; `index == len` yields the end of the stream
    #[must_use]
    pub fn offset(&self, index: usize) -> Option<u32> {
        self.offsets.get(index).copied()
    }

    /// Index of the instruction starting exactly at `offset`; the end offset yields `len`
    #[must_use]
    pub fn index_at(&self, offset: u32) -> Option<usize> {
        self.offsets.binary_search(&offset).ok()
    }

    /// Total byte size of the stream
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Returns true for an empty stream
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve the branch targets of every instruction to instruction indices.
///
/// Non-branch instructions get an empty list.
///
/// # Errors
/// Returns an error if a target does not land on an instruction boundary
pub fn resolve_targets(instructions: &[Instruction]) -> Result<Vec<Vec<usize>>> {
    let labels = LabelMap::new(instructions);
    instructions
        .iter()
        .enumerate()
        .map(|(index, instruction)| {
            let next = i64::from(labels.offsets[index + 1]);
            instruction
                .branch_offsets()
                .into_iter()
                .map(|relative| {
                    let target = next + i64::from(relative);
                    u32::try_from(target)
                        .ok()
                        .and_then(|target| labels.index_at(target))
                        .ok_or_else(|| {
                            malformed_error!(
                                "{} at instruction {} targets offset {} which is not an instruction",
                                instruction.opcode.name(),
                                index,
                                target
                            )
                        })
                })
                .collect()
        })
        .collect()
}

/// Rewrite branch operands so every instruction jumps to the given instruction indices
/// under the current layout.
///
/// # Errors
/// Returns an error if a target index is out of range, the number of targets does not
/// match the operand, or a short branch can no longer reach its target
pub fn apply_targets(instructions: &mut [Instruction], targets: &[Vec<usize>]) -> Result<()> {
    let labels = LabelMap::new(instructions);
    for (index, instruction) in instructions.iter_mut().enumerate() {
        let Some(wanted) = targets.get(index) else {
            continue;
        };
        let next = i64::from(labels.offsets[index + 1]);
        let mut relative = Vec::with_capacity(wanted.len());
        for target in wanted {
            let offset = labels
                .offset(*target)
                .ok_or_else(|| malformed_error!("Branch target {} out of range", target))?;
            let delta = i32::try_from(i64::from(offset) - next)
                .map_err(|_| malformed_error!("Branch distance overflows"))?;
            relative.push(delta);
        }

        let is_branch = instruction.is_branch();
        match &mut instruction.operand {
            Operand::Branch(offset) if relative.len() == 1 => *offset = relative[0],
            Operand::Switch(offsets) if offsets.len() == relative.len() => *offsets = relative,
            _ if relative.is_empty() && !is_branch => {}
            _ => {
                return Err(malformed_error!(
                    "Instruction {} ({}) cannot take {} targets",
                    index,
                    instruction.opcode.name(),
                    relative.len()
                ))
            }
        }
        instruction.check()?;
    }
    Ok(())
}

/// Replace every short branch by its long form, keeping the targets.
///
/// # Errors
/// Returns an error if a branch target is not an instruction boundary
pub fn widen_branches(instructions: &mut [Instruction]) -> Result<()> {
    let targets = resolve_targets(instructions)?;
    for instruction in instructions.iter_mut() {
        if let Some(long) = instruction.opcode.long_form() {
            instruction.opcode = long;
        }
    }
    apply_targets(instructions, &targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OpCode;

    fn forward_branch_body() -> Vec<Instruction> {
        vec![
            Instruction::branch(OpCode::BrS, 2),
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Ret),
        ]
    }

    #[test]
    fn label_map() {
        let labels = LabelMap::new(&forward_branch_body());
        assert_eq!(labels.len(), 4);
        assert_eq!(labels.offset(3), Some(4));
        assert_eq!(labels.code_size(), 5);
        assert_eq!(labels.index_at(5), Some(4));
        assert_eq!(labels.index_at(1), None);
    }

    #[test]
    fn targets_survive_widening() {
        let mut body = forward_branch_body();
        assert_eq!(resolve_targets(&body).unwrap()[0], [3]);

        widen_branches(&mut body).unwrap();
        assert_eq!(body[0], Instruction::branch(OpCode::Br, 2));
        assert_eq!(resolve_targets(&body).unwrap()[0], [3]);
    }

    #[test]
    fn switch_targets() {
        let mut body = vec![
            Instruction::new(OpCode::Switch, Operand::Switch(vec![0, 1])).unwrap(),
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Ret),
        ];
        let targets = resolve_targets(&body).unwrap();
        assert_eq!(targets[0], [1, 2]);

        body.insert(1, Instruction::simple(OpCode::Nop));
        let shifted = vec![vec![2, 3], vec![], vec![], vec![]];
        apply_targets(&mut body, &shifted).unwrap();
        assert_eq!(body[0].operand, Operand::Switch(vec![1, 2]));
    }

    #[test]
    fn misaligned_target() {
        let body = vec![
            Instruction::branch(OpCode::BrS, 1),
            Instruction::new(OpCode::LdcI4, Operand::Int32(0)).unwrap(),
        ];
        assert!(resolve_targets(&body).is_err());
    }
}
