//! The CIL opcode catalog (ECMA-335 Partition III).
//!
//! Each [`OpCode`] carries its 1- or 2-byte code, its mnemonic and the class of its operand.
//! Two-byte codes share the `0xFE` lead byte and are stored as `0xFE00 | second_byte`.

use std::sync::OnceLock;

/// Lead byte of the two-byte opcodes
pub const EXTENDED_PREFIX: u8 = 0xFE;

/// The operand class of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    None,
    /// 1-byte signed branch offset
    ShortBranchTarget,
    /// 4-byte signed branch offset
    BranchTarget,
    /// 1-byte signed immediate
    ShortInt8,
    /// 1-byte unsigned immediate (short argument/local numbers, alignment)
    UInt8,
    /// 2-byte unsigned immediate (argument/local numbers)
    UInt16,
    /// 4-byte signed immediate
    Int32,
    /// 8-byte signed immediate
    Int64,
    /// 4-byte float
    Float32,
    /// 8-byte float
    Float64,
    /// `#US` heap token
    String,
    /// Field token
    Field,
    /// Method token
    Method,
    /// Type token
    Type,
    /// Field, method or type token (`ldtoken`)
    Token,
    /// Stand-alone signature token (`calli`)
    Signature,
    /// Count followed by that many 4-byte branch offsets
    Switch,
}

impl OperandType {
    /// Operand size in bytes, `None` for the dynamically sized switch table
    #[must_use]
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::ShortBranchTarget | OperandType::ShortInt8 | OperandType::UInt8 => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::BranchTarget
            | OperandType::Int32
            | OperandType::Float32
            | OperandType::String
            | OperandType::Field
            | OperandType::Method
            | OperandType::Type
            | OperandType::Token
            | OperandType::Signature => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }

    /// Whether the operand is a metadata table token
    #[must_use]
    pub fn is_table_token(self) -> bool {
        matches!(
            self,
            OperandType::Field
                | OperandType::Method
                | OperandType::Type
                | OperandType::Token
                | OperandType::Signature
        )
    }
}

macro_rules! define_opcodes {
    ($($variant:ident = $code:expr, $name:expr, $operand:ident;)*) => {
        /// A CIL opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[allow(missing_docs)]
        pub enum OpCode {
            $($variant,)*
        }

        impl OpCode {
            /// Every opcode, in code order
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant),*];

            /// The code; two-byte opcodes are `0xFE00 | second_byte`
            #[must_use]
            pub fn code(self) -> u16 {
                match self {
                    $(OpCode::$variant => $code,)*
                }
            }

            /// The mnemonic
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $name,)*
                }
            }

            /// The operand class
            #[must_use]
            pub fn operand_type(self) -> OperandType {
                match self {
                    $(OpCode::$variant => OperandType::$operand,)*
                }
            }
        }
    };
}

define_opcodes! {
    Nop = 0x00, "nop", None;
    Break = 0x01, "break", None;
    Ldarg0 = 0x02, "ldarg.0", None;
    Ldarg1 = 0x03, "ldarg.1", None;
    Ldarg2 = 0x04, "ldarg.2", None;
    Ldarg3 = 0x05, "ldarg.3", None;
    Ldloc0 = 0x06, "ldloc.0", None;
    Ldloc1 = 0x07, "ldloc.1", None;
    Ldloc2 = 0x08, "ldloc.2", None;
    Ldloc3 = 0x09, "ldloc.3", None;
    Stloc0 = 0x0A, "stloc.0", None;
    Stloc1 = 0x0B, "stloc.1", None;
    Stloc2 = 0x0C, "stloc.2", None;
    Stloc3 = 0x0D, "stloc.3", None;
    LdargS = 0x0E, "ldarg.s", UInt8;
    LdargaS = 0x0F, "ldarga.s", UInt8;
    StargS = 0x10, "starg.s", UInt8;
    LdlocS = 0x11, "ldloc.s", UInt8;
    LdlocaS = 0x12, "ldloca.s", UInt8;
    StlocS = 0x13, "stloc.s", UInt8;
    Ldnull = 0x14, "ldnull", None;
    LdcI4M1 = 0x15, "ldc.i4.m1", None;
    LdcI40 = 0x16, "ldc.i4.0", None;
    LdcI41 = 0x17, "ldc.i4.1", None;
    LdcI42 = 0x18, "ldc.i4.2", None;
    LdcI43 = 0x19, "ldc.i4.3", None;
    LdcI44 = 0x1A, "ldc.i4.4", None;
    LdcI45 = 0x1B, "ldc.i4.5", None;
    LdcI46 = 0x1C, "ldc.i4.6", None;
    LdcI47 = 0x1D, "ldc.i4.7", None;
    LdcI48 = 0x1E, "ldc.i4.8", None;
    LdcI4S = 0x1F, "ldc.i4.s", ShortInt8;
    LdcI4 = 0x20, "ldc.i4", Int32;
    LdcI8 = 0x21, "ldc.i8", Int64;
    LdcR4 = 0x22, "ldc.r4", Float32;
    LdcR8 = 0x23, "ldc.r8", Float64;
    Dup = 0x25, "dup", None;
    Pop = 0x26, "pop", None;
    Jmp = 0x27, "jmp", Method;
    Call = 0x28, "call", Method;
    Calli = 0x29, "calli", Signature;
    Ret = 0x2A, "ret", None;
    BrS = 0x2B, "br.s", ShortBranchTarget;
    BrfalseS = 0x2C, "brfalse.s", ShortBranchTarget;
    BrtrueS = 0x2D, "brtrue.s", ShortBranchTarget;
    BeqS = 0x2E, "beq.s", ShortBranchTarget;
    BgeS = 0x2F, "bge.s", ShortBranchTarget;
    BgtS = 0x30, "bgt.s", ShortBranchTarget;
    BleS = 0x31, "ble.s", ShortBranchTarget;
    BltS = 0x32, "blt.s", ShortBranchTarget;
    BneUnS = 0x33, "bne.un.s", ShortBranchTarget;
    BgeUnS = 0x34, "bge.un.s", ShortBranchTarget;
    BgtUnS = 0x35, "bgt.un.s", ShortBranchTarget;
    BleUnS = 0x36, "ble.un.s", ShortBranchTarget;
    BltUnS = 0x37, "blt.un.s", ShortBranchTarget;
    Br = 0x38, "br", BranchTarget;
    Brfalse = 0x39, "brfalse", BranchTarget;
    Brtrue = 0x3A, "brtrue", BranchTarget;
    Beq = 0x3B, "beq", BranchTarget;
    Bge = 0x3C, "bge", BranchTarget;
    Bgt = 0x3D, "bgt", BranchTarget;
    Ble = 0x3E, "ble", BranchTarget;
    Blt = 0x3F, "blt", BranchTarget;
    BneUn = 0x40, "bne.un", BranchTarget;
    BgeUn = 0x41, "bge.un", BranchTarget;
    BgtUn = 0x42, "bgt.un", BranchTarget;
    BleUn = 0x43, "ble.un", BranchTarget;
    BltUn = 0x44, "blt.un", BranchTarget;
    Switch = 0x45, "switch", Switch;
    LdindI1 = 0x46, "ldind.i1", None;
    LdindU1 = 0x47, "ldind.u1", None;
    LdindI2 = 0x48, "ldind.i2", None;
    LdindU2 = 0x49, "ldind.u2", None;
    LdindI4 = 0x4A, "ldind.i4", None;
    LdindU4 = 0x4B, "ldind.u4", None;
    LdindI8 = 0x4C, "ldind.i8", None;
    LdindI = 0x4D, "ldind.i", None;
    LdindR4 = 0x4E, "ldind.r4", None;
    LdindR8 = 0x4F, "ldind.r8", None;
    LdindRef = 0x50, "ldind.ref", None;
    StindRef = 0x51, "stind.ref", None;
    StindI1 = 0x52, "stind.i1", None;
    StindI2 = 0x53, "stind.i2", None;
    StindI4 = 0x54, "stind.i4", None;
    StindI8 = 0x55, "stind.i8", None;
    StindR4 = 0x56, "stind.r4", None;
    StindR8 = 0x57, "stind.r8", None;
    Add = 0x58, "add", None;
    Sub = 0x59, "sub", None;
    Mul = 0x5A, "mul", None;
    Div = 0x5B, "div", None;
    DivUn = 0x5C, "div.un", None;
    Rem = 0x5D, "rem", None;
    RemUn = 0x5E, "rem.un", None;
    And = 0x5F, "and", None;
    Or = 0x60, "or", None;
    Xor = 0x61, "xor", None;
    Shl = 0x62, "shl", None;
    Shr = 0x63, "shr", None;
    ShrUn = 0x64, "shr.un", None;
    Neg = 0x65, "neg", None;
    Not = 0x66, "not", None;
    ConvI1 = 0x67, "conv.i1", None;
    ConvI2 = 0x68, "conv.i2", None;
    ConvI4 = 0x69, "conv.i4", None;
    ConvI8 = 0x6A, "conv.i8", None;
    ConvR4 = 0x6B, "conv.r4", None;
    ConvR8 = 0x6C, "conv.r8", None;
    ConvU4 = 0x6D, "conv.u4", None;
    ConvU8 = 0x6E, "conv.u8", None;
    Callvirt = 0x6F, "callvirt", Method;
    Cpobj = 0x70, "cpobj", Type;
    Ldobj = 0x71, "ldobj", Type;
    Ldstr = 0x72, "ldstr", String;
    Newobj = 0x73, "newobj", Method;
    Castclass = 0x74, "castclass", Type;
    Isinst = 0x75, "isinst", Type;
    ConvRUn = 0x76, "conv.r.un", None;
    Unbox = 0x79, "unbox", Type;
    Throw = 0x7A, "throw", None;
    Ldfld = 0x7B, "ldfld", Field;
    Ldflda = 0x7C, "ldflda", Field;
    Stfld = 0x7D, "stfld", Field;
    Ldsfld = 0x7E, "ldsfld", Field;
    Ldsflda = 0x7F, "ldsflda", Field;
    Stsfld = 0x80, "stsfld", Field;
    Stobj = 0x81, "stobj", Type;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", None;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", None;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", None;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", None;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", None;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", None;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", None;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", None;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", None;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", None;
    Box = 0x8C, "box", Type;
    Newarr = 0x8D, "newarr", Type;
    Ldlen = 0x8E, "ldlen", None;
    Ldelema = 0x8F, "ldelema", Type;
    LdelemI1 = 0x90, "ldelem.i1", None;
    LdelemU1 = 0x91, "ldelem.u1", None;
    LdelemI2 = 0x92, "ldelem.i2", None;
    LdelemU2 = 0x93, "ldelem.u2", None;
    LdelemI4 = 0x94, "ldelem.i4", None;
    LdelemU4 = 0x95, "ldelem.u4", None;
    LdelemI8 = 0x96, "ldelem.i8", None;
    LdelemI = 0x97, "ldelem.i", None;
    LdelemR4 = 0x98, "ldelem.r4", None;
    LdelemR8 = 0x99, "ldelem.r8", None;
    LdelemRef = 0x9A, "ldelem.ref", None;
    StelemI = 0x9B, "stelem.i", None;
    StelemI1 = 0x9C, "stelem.i1", None;
    StelemI2 = 0x9D, "stelem.i2", None;
    StelemI4 = 0x9E, "stelem.i4", None;
    StelemI8 = 0x9F, "stelem.i8", None;
    StelemR4 = 0xA0, "stelem.r4", None;
    StelemR8 = 0xA1, "stelem.r8", None;
    StelemRef = 0xA2, "stelem.ref", None;
    Ldelem = 0xA3, "ldelem", Type;
    Stelem = 0xA4, "stelem", Type;
    UnboxAny = 0xA5, "unbox.any", Type;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", None;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", None;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", None;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", None;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", None;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", None;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", None;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", None;
    Refanyval = 0xC2, "refanyval", Type;
    Ckfinite = 0xC3, "ckfinite", None;
    Mkrefany = 0xC6, "mkrefany", Type;
    Ldtoken = 0xD0, "ldtoken", Token;
    ConvU2 = 0xD1, "conv.u2", None;
    ConvU1 = 0xD2, "conv.u1", None;
    ConvI = 0xD3, "conv.i", None;
    ConvOvfI = 0xD4, "conv.ovf.i", None;
    ConvOvfU = 0xD5, "conv.ovf.u", None;
    AddOvf = 0xD6, "add.ovf", None;
    AddOvfUn = 0xD7, "add.ovf.un", None;
    MulOvf = 0xD8, "mul.ovf", None;
    MulOvfUn = 0xD9, "mul.ovf.un", None;
    SubOvf = 0xDA, "sub.ovf", None;
    SubOvfUn = 0xDB, "sub.ovf.un", None;
    Endfinally = 0xDC, "endfinally", None;
    Leave = 0xDD, "leave", BranchTarget;
    LeaveS = 0xDE, "leave.s", ShortBranchTarget;
    StindI = 0xDF, "stind.i", None;
    ConvU = 0xE0, "conv.u", None;
    Arglist = 0xFE00, "arglist", None;
    Ceq = 0xFE01, "ceq", None;
    Cgt = 0xFE02, "cgt", None;
    CgtUn = 0xFE03, "cgt.un", None;
    Clt = 0xFE04, "clt", None;
    CltUn = 0xFE05, "clt.un", None;
    Ldftn = 0xFE06, "ldftn", Method;
    Ldvirtftn = 0xFE07, "ldvirtftn", Method;
    Ldarg = 0xFE09, "ldarg", UInt16;
    Ldarga = 0xFE0A, "ldarga", UInt16;
    Starg = 0xFE0B, "starg", UInt16;
    Ldloc = 0xFE0C, "ldloc", UInt16;
    Ldloca = 0xFE0D, "ldloca", UInt16;
    Stloc = 0xFE0E, "stloc", UInt16;
    Localloc = 0xFE0F, "localloc", None;
    Endfilter = 0xFE11, "endfilter", None;
    Unaligned = 0xFE12, "unaligned.", UInt8;
    Volatile = 0xFE13, "volatile.", None;
    Tail = 0xFE14, "tail.", None;
    Initobj = 0xFE15, "initobj", Type;
    Constrained = 0xFE16, "constrained.", Type;
    Cpblk = 0xFE17, "cpblk", None;
    Initblk = 0xFE18, "initblk", None;
    No = 0xFE19, "no.", UInt8;
    Rethrow = 0xFE1A, "rethrow", None;
    Sizeof = 0xFE1C, "sizeof", Type;
    Refanytype = 0xFE1D, "refanytype", None;
    Readonly = 0xFE1E, "readonly.", None;
}

struct Lookup {
    single: [Option<OpCode>; 256],
    extended: [Option<OpCode>; 256],
}

fn lookup() -> &'static Lookup {
    static LOOKUP: OnceLock<Lookup> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        let mut table = Lookup {
            single: [None; 256],
            extended: [None; 256],
        };
        for opcode in OpCode::ALL {
            let code = opcode.code();
            let slot = (code & 0xFF) as usize;
            if code > 0xFF {
                table.extended[slot] = Some(*opcode);
            } else {
                table.single[slot] = Some(*opcode);
            }
        }
        table
    })
}

impl OpCode {
    /// Look up a single-byte opcode
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        lookup().single[byte as usize]
    }

    /// Look up a `0xFE`-prefixed opcode by its second byte
    #[must_use]
    pub fn from_extended(byte: u8) -> Option<OpCode> {
        lookup().extended[byte as usize]
    }

    /// Look up an opcode by its full code
    #[must_use]
    pub fn from_code(code: u16) -> Option<OpCode> {
        match code {
            0..=0xFF => OpCode::from_byte(code as u8),
            0xFE00..=0xFEFF => OpCode::from_extended((code & 0xFF) as u8),
            _ => None,
        }
    }

    /// Size of the code itself, 1 or 2 bytes
    #[must_use]
    pub fn code_size(self) -> usize {
        if self.code() > 0xFF {
            2
        } else {
            1
        }
    }

    /// The 4-byte form of a short branch
    #[must_use]
    pub fn long_form(self) -> Option<OpCode> {
        Some(match self {
            OpCode::BrS => OpCode::Br,
            OpCode::BrfalseS => OpCode::Brfalse,
            OpCode::BrtrueS => OpCode::Brtrue,
            OpCode::BeqS => OpCode::Beq,
            OpCode::BgeS => OpCode::Bge,
            OpCode::BgtS => OpCode::Bgt,
            OpCode::BleS => OpCode::Ble,
            OpCode::BltS => OpCode::Blt,
            OpCode::BneUnS => OpCode::BneUn,
            OpCode::BgeUnS => OpCode::BgeUn,
            OpCode::BgtUnS => OpCode::BgtUn,
            OpCode::BleUnS => OpCode::BleUn,
            OpCode::BltUnS => OpCode::BltUn,
            OpCode::LeaveS => OpCode::Leave,
            _ => return None,
        })
    }

    /// Whether control never falls through to the next instruction
    #[must_use]
    pub fn ends_flow(self) -> bool {
        matches!(
            self,
            OpCode::Br
                | OpCode::BrS
                | OpCode::Leave
                | OpCode::LeaveS
                | OpCode::Ret
                | OpCode::Throw
                | OpCode::Rethrow
                | OpCode::Jmp
                | OpCode::Endfinally
                | OpCode::Endfilter
        )
    }
}
