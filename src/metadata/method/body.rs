//! Method body headers, code and exception sections (ECMA-335 II.25.4).
//!
//! A body is either tiny (a single header byte, code shorter than 64 bytes, no locals, no
//! exception clauses, an implicit max stack of 8) or fat (a 12-byte header followed by the
//! code and, when `MORE_SECTS` is set, 4-byte aligned data sections holding the exception
//! clauses). Writing picks the smallest forms that represent the body exactly.

use widestring::{U16Str, U16String};

use crate::{
    assembly::{decode_stream, encode_stream, Instruction},
    file::{
        io::{align_to, push_le},
        parser::Parser,
    },
    metadata::{
        method::{
            ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags,
            FAT_HEADER_DWORDS, METHOD_BODY_FORMAT_MASK,
        },
        tables::{RemapIndices, TableIndex},
        token::Token,
    },
    Result,
};

/// Max stack implied by a tiny header
pub const TINY_MAX_STACK: u16 = 8;

const SMALL_CLAUSE_SIZE: usize = 12;
const FAT_CLAUSE_SIZE: usize = 24;

/// A decoded method body
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Whether locals are zero-initialized
    pub init_locals: bool,
    /// The `StandAloneSig` row holding the local variable signature
    pub local_var_sig: Option<TableIndex>,
    /// The code
    pub instructions: Vec<Instruction>,
    /// Exception handling clauses
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Encoded size of the code
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.instructions.iter().map(Instruction::size).sum()
    }

    /// Whether the body is written with a tiny header
    #[must_use]
    pub fn is_tiny(&self) -> bool {
        self.code_size() < 64
            && self.max_stack == TINY_MAX_STACK
            && self.local_var_sig.is_none()
            && self.exception_handlers.is_empty()
            && !self.init_locals
    }

    /// Parse a body starting at the first byte of its header.
    ///
    /// `data` may extend past the end of the body. `strings` resolves `ldstr` operands.
    ///
    /// # Errors
    /// Returns an error for an unknown header format, data that ends inside the body, or
    /// malformed code
    pub fn parse(
        data: &[u8],
        strings: &mut dyn FnMut(u32) -> Result<U16String>,
    ) -> Result<MethodBody> {
        let mut parser = Parser::new(data);
        let first_byte = parser.peek_byte()?;

        match u16::from(first_byte & METHOD_BODY_FORMAT_MASK) {
            format if format == MethodBodyFlags::TINY_FORMAT.bits() => {
                parser.advance_by(1)?;
                let code = parser.read_bytes(usize::from(first_byte >> 2))?;
                Ok(MethodBody {
                    max_stack: TINY_MAX_STACK,
                    init_locals: false,
                    local_var_sig: None,
                    instructions: decode_stream(code, strings)?,
                    exception_handlers: Vec::new(),
                })
            }
            format if format == MethodBodyFlags::FAT_FORMAT.bits() => {
                let flags_and_size = parser.read_le::<u16>()?;
                let flags = MethodBodyFlags::from_bits_truncate(flags_and_size & 0x0FFF);
                let header_size = usize::from(flags_and_size >> 12) * 4;
                if header_size < 12 {
                    return Err(malformed_error!(
                        "Fat method header declares {} bytes",
                        header_size
                    ));
                }
                let max_stack = parser.read_le::<u16>()?;
                let code_size = parser.read_le::<u32>()? as usize;
                let local_var_sig = TableIndex::from_token(Token::new(parser.read_le::<u32>()?))?;

                parser.seek(header_size)?;
                let code = parser.read_bytes(code_size)?;
                let instructions = decode_stream(code, strings)?;

                let exception_handlers = if flags.contains(MethodBodyFlags::MORE_SECTS) {
                    parser.align(4)?;
                    parse_sections(&mut parser)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    max_stack,
                    init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
                    local_var_sig,
                    instructions,
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "Method header 0x{:02x} is neither tiny nor fat",
                first_byte
            )),
        }
    }

    /// Encode the body.
    ///
    /// `strings` interns `ldstr` operands into `#US`. The result starts with the header;
    /// fat bodies must be placed at a 4-byte aligned address.
    ///
    /// # Errors
    /// Returns an error if an instruction cannot be encoded
    pub fn encode(&self, strings: &mut dyn FnMut(&U16Str) -> Result<u32>) -> Result<Vec<u8>> {
        let code = encode_stream(&self.instructions, strings)?;

        if self.is_tiny() {
            let mut out = Vec::with_capacity(code.len() + 1);
            out.push(((code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
            out.extend_from_slice(&code);
            return Ok(out);
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }

        let code_size = u32::try_from(code.len())
            .map_err(|_| malformed_error!("Method code of {} bytes is too large", code.len()))?;

        let mut out = Vec::with_capacity(12 + code.len());
        push_le(&mut out, flags.bits() | (FAT_HEADER_DWORDS << 12));
        push_le(&mut out, self.max_stack);
        push_le(&mut out, code_size);
        push_le(
            &mut out,
            self.local_var_sig.map_or(0, |index| index.token().value()),
        );
        out.extend_from_slice(&code);

        if !self.exception_handlers.is_empty() {
            align_to(&mut out, 4);
            encode_section(&mut out, &self.exception_handlers)?;
        }
        Ok(out)
    }
}

fn read_clause(parser: &mut Parser<'_>, fat: bool) -> Result<ExceptionHandler> {
    let (flags, try_offset, try_length, handler_offset, handler_length) = if fat {
        (
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
        )
    } else {
        (
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
        )
    };
    let flags = ExceptionHandlerFlags::from_bits_truncate(flags);
    let last = parser.read_le::<u32>()?;

    let (class_token, filter_offset) = if flags.contains(ExceptionHandlerFlags::FILTER) {
        (None, last)
    } else if flags.intersects(ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT) {
        (None, 0)
    } else {
        (TableIndex::from_token(Token::new(last))?, 0)
    };

    Ok(ExceptionHandler {
        flags,
        try_offset,
        try_length,
        handler_offset,
        handler_length,
        class_token,
        filter_offset,
    })
}

fn parse_sections(parser: &mut Parser<'_>) -> Result<Vec<ExceptionHandler>> {
    let mut handlers = Vec::new();
    loop {
        let kind = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
        let fat = kind.contains(SectionFlags::FAT_FORMAT);
        let size = if fat {
            let low = u32::from(parser.read_le::<u16>()?);
            let high = u32::from(parser.read_le::<u8>()?);
            (low | (high << 16)) as usize
        } else {
            let size = usize::from(parser.read_le::<u8>()?);
            parser.advance_by(2)?;
            size
        };
        if size < 4 {
            return Err(malformed_error!("Method data section of {} bytes", size));
        }

        let clause_size = if fat { FAT_CLAUSE_SIZE } else { SMALL_CLAUSE_SIZE };
        if kind.contains(SectionFlags::EHTABLE) {
            for _ in 0..(size - 4) / clause_size {
                handlers.push(read_clause(parser, fat)?);
            }
        } else {
            parser.advance_by(size - 4)?;
        }

        if !kind.contains(SectionFlags::MORE_SECTS) {
            return Ok(handlers);
        }
        parser.align(4)?;
    }
}

fn encode_section(out: &mut Vec<u8>, handlers: &[ExceptionHandler]) -> Result<()> {
    let small_size = 4 + handlers.len() * SMALL_CLAUSE_SIZE;
    if small_size <= 0xFF && handlers.iter().all(ExceptionHandler::fits_small) {
        out.push(SectionFlags::EHTABLE.bits());
        out.push(small_size as u8);
        push_le(out, 0_u16);
        for handler in handlers {
            push_le(out, handler.flags.bits() as u16);
            push_le(out, handler.try_offset as u16);
            out.push(handler.try_length as u8);
            push_le(out, handler.handler_offset as u16);
            out.push(handler.handler_length as u8);
            push_le(out, handler.class_or_filter());
        }
        return Ok(());
    }

    let fat_size = 4 + handlers.len() * FAT_CLAUSE_SIZE;
    if fat_size > 0x00FF_FFFF {
        return Err(malformed_error!("{} exception clauses are too many", handlers.len()));
    }
    out.push((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
    push_le(out, (fat_size & 0xFFFF) as u16);
    out.push((fat_size >> 16) as u8);
    for handler in handlers {
        push_le(out, handler.flags.bits());
        push_le(out, handler.try_offset);
        push_le(out, handler.try_length);
        push_le(out, handler.handler_offset);
        push_le(out, handler.handler_length);
        push_le(out, handler.class_or_filter());
    }
    Ok(())
}

impl RemapIndices for MethodBody {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        if let Some(index) = &mut self.local_var_sig {
            f(index)?;
        }
        for instruction in &mut self.instructions {
            instruction.remap_indices(f)?;
        }
        for handler in &mut self.exception_handlers {
            handler.remap_indices(f)?;
        }
        Ok(())
    }
}
