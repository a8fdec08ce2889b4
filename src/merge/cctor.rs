//! Splicing of static constructors.
//!
//! When several inputs contribute a `.cctor` to the same target type, their bodies run one
//! after the other in input order. Every `ret` of a body that is not the last one becomes a
//! `br` to the first instruction of the next body, branches are widened and locals of later
//! bodies are shifted past the locals of earlier ones.

use crate::{
    assembly::{apply_targets, resolve_targets, Instruction, LabelMap, OpCode, Operand},
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
    Error, Result,
};

/// An exception clause with its boundaries as global instruction indices
struct PendingClause {
    clause: ExceptionHandler,
    try_start: usize,
    try_end: usize,
    handler_start: usize,
    handler_end: usize,
    filter: Option<usize>,
}

fn local_slot(instruction: &Instruction) -> Option<(OpCode, u32)> {
    let slot = match (&instruction.opcode, &instruction.operand) {
        (OpCode::Ldloc0, _) => (OpCode::Ldloc, 0),
        (OpCode::Ldloc1, _) => (OpCode::Ldloc, 1),
        (OpCode::Ldloc2, _) => (OpCode::Ldloc, 2),
        (OpCode::Ldloc3, _) => (OpCode::Ldloc, 3),
        (OpCode::Stloc0, _) => (OpCode::Stloc, 0),
        (OpCode::Stloc1, _) => (OpCode::Stloc, 1),
        (OpCode::Stloc2, _) => (OpCode::Stloc, 2),
        (OpCode::Stloc3, _) => (OpCode::Stloc, 3),
        (OpCode::LdlocS, Operand::UInt8(slot)) => (OpCode::Ldloc, u32::from(*slot)),
        (OpCode::LdlocaS, Operand::UInt8(slot)) => (OpCode::Ldloca, u32::from(*slot)),
        (OpCode::StlocS, Operand::UInt8(slot)) => (OpCode::Stloc, u32::from(*slot)),
        (OpCode::Ldloc | OpCode::Ldloca | OpCode::Stloc, Operand::UInt16(slot)) => {
            (instruction.opcode, u32::from(*slot))
        }
        _ => return None,
    };
    Some(slot)
}

/// Rewrite a local variable access to address slot `slot + base`
fn shift_local(instruction: &Instruction, base: u32) -> Result<Instruction> {
    if base == 0 {
        return Ok(instruction.clone());
    }
    let Some((opcode, slot)) = local_slot(instruction) else {
        return Ok(instruction.clone());
    };

    let shifted = u16::try_from(slot + base)
        .map_err(|_| malformed_error!("Local variable {} out of range", slot + base))?;
    Instruction::new(opcode, Operand::UInt16(shifted))
}

fn global_index(labels: &LabelMap, start: usize, offset: u32) -> Result<usize> {
    labels
        .index_at(offset)
        .map(|index| start + index)
        .ok_or_else(|| malformed_error!("Exception clause boundary {} is not an instruction", offset))
}

/// Concatenate static constructor bodies.
///
/// `local_counts[k]` is the number of locals of `bodies[k]`; locals of later bodies are
/// renumbered to follow them. The result has no local signature; the caller attaches the
/// concatenated one.
///
/// # Errors
/// Returns an error for a branch into the middle of an instruction, an exception clause
/// boundary that is not an instruction, or more than 65535 locals in total
pub fn splice_bodies(bodies: &[MethodBody], local_counts: &[u16]) -> Result<MethodBody> {
    if bodies.len() != local_counts.len() {
        return Err(Error::Configuration(format!(
            "{} bodies with {} local counts",
            bodies.len(),
            local_counts.len()
        )));
    }

    let mut starts = Vec::with_capacity(bodies.len() + 1);
    let mut total = 0;
    for body in bodies {
        starts.push(total);
        total += body.instructions.len();
    }
    starts.push(total);

    let mut instructions = Vec::with_capacity(total);
    let mut targets = Vec::with_capacity(total);
    let mut pending = Vec::new();
    let mut base = 0_u32;

    for (position, body) in bodies.iter().enumerate() {
        let start = starts[position];
        let last = position + 1 == bodies.len();
        let labels = LabelMap::new(&body.instructions);
        let local_targets = resolve_targets(&body.instructions)?;

        for (index, instruction) in body.instructions.iter().enumerate() {
            if instruction.opcode == OpCode::Ret && !last {
                instructions.push(Instruction::branch(OpCode::Br, 0));
                targets.push(vec![starts[position + 1]]);
                continue;
            }

            let mut copied = shift_local(instruction, base)?;
            if let Some(long) = copied.opcode.long_form() {
                copied.opcode = long;
            }
            instructions.push(copied);
            targets.push(local_targets[index].iter().map(|target| start + target).collect());
        }

        for clause in &body.exception_handlers {
            let filter = if clause.flags.contains(ExceptionHandlerFlags::FILTER) {
                Some(global_index(&labels, start, clause.filter_offset)?)
            } else {
                None
            };
            pending.push(PendingClause {
                clause: clause.clone(),
                try_start: global_index(&labels, start, clause.try_offset)?,
                try_end: global_index(&labels, start, clause.try_end())?,
                handler_start: global_index(&labels, start, clause.handler_offset)?,
                handler_end: global_index(&labels, start, clause.handler_end())?,
                filter,
            });
        }

        base += u32::from(local_counts[position]);
    }

    apply_targets(&mut instructions, &targets)?;

    let labels = LabelMap::new(&instructions);
    let offset = |index: usize| {
        labels
            .offset(index)
            .ok_or_else(|| malformed_error!("Instruction {} out of range", index))
    };
    let mut exception_handlers = Vec::with_capacity(pending.len());
    for entry in pending {
        let mut clause = entry.clause;
        clause.try_offset = offset(entry.try_start)?;
        clause.try_length = offset(entry.try_end)? - clause.try_offset;
        clause.handler_offset = offset(entry.handler_start)?;
        clause.handler_length = offset(entry.handler_end)? - clause.handler_offset;
        if let Some(filter) = entry.filter {
            clause.filter_offset = offset(filter)?;
        }
        exception_handlers.push(clause);
    }

    Ok(MethodBody {
        max_stack: bodies.iter().map(|body| body.max_stack).max().unwrap_or(8),
        init_locals: bodies.iter().any(|body| body.init_locals),
        local_var_sig: None,
        instructions,
        exception_handlers,
    })
}
