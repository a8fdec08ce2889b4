use std::fmt;

use crate::{
    metadata::tables::{RemapIndices, TableIndex},
    Result,
};

#[allow(non_snake_case, dead_code, missing_docs)]
/// Bytes that encode the element types of a signature
pub mod ELEMENT_TYPE {
    // Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDefOrRefOrSpecEncoded
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDefOrRefOrSpecEncoded
    pub const CLASS: u8 = 0x12;
    // Generic parameter of a type, followed by its number
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 ... loCount lo1 ...
    pub const ARRAY: u8 = 0x14;
    // Followed by (CLASS|VALUETYPE) type arg-count arg-1 ... arg-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter of a method, followed by its number
    pub const MVAR: u8 = 0x1e;
    // Required modifier, followed by TypeDefOrRefOrSpecEncoded
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier, followed by TypeDefOrRefOrSpecEncoded
    pub const CMOD_OPT: u8 = 0x20;
    // Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    pub const MODIFIER: u8 = 0x40;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
    // Used in custom attributes to specify a System.Type argument
    pub const TYPE: u8 = 0x50;
    // Used in custom attributes to specify a boxed object
    pub const BOXED: u8 = 0x51;
    // Used in custom attributes to indicate a field
    pub const FIELD: u8 = 0x53;
    // Used in custom attributes to indicate a property
    pub const PROPERTY: u8 = 0x54;
    // Used in custom attributes to specify an enum
    pub const ENUM: u8 = 0x55;
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Leading bytes of the non-method signature kinds
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const METHOD_SPEC: u8 = 0x0A;
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Flag bits of a method signature's leading byte
pub mod CALLING_CONVENTION {
    pub const KIND_MASK: u8 = 0x0F;
    pub const GENERIC: u8 = 0x10;
    pub const HASTHIS: u8 = 0x20;
    pub const EXPLICITTHIS: u8 = 0x40;
}

/// A custom modifier applied to the type that follows it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomModifier {
    /// `modreq` if true, `modopt` otherwise
    pub required: bool,
    /// The modifier type (TypeDef, TypeRef or TypeSpec)
    pub modifier: TableIndex,
}

/// Shape of a general (multi-dimensional) array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArrayShape {
    /// Number of dimensions
    pub rank: u32,
    /// Sizes of the leading dimensions; may be shorter than `rank`
    pub sizes: Vec<u32>,
    /// Lower bounds of the leading dimensions; may be shorter than `rank`
    pub lower_bounds: Vec<i32>,
}

/// A type inside a signature (ECMA-335 II.23.2.12).
///
/// Custom modifiers, `pinned` and `byref` wrap the type they apply to, so a parsed
/// signature keeps the exact order of its prefixes and re-encodes to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// An unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// A managed reference
    ByRef(Box<TypeSignature>),
    /// A value type
    ValueType(TableIndex),
    /// A reference type
    Class(TableIndex),
    /// Generic parameter of the enclosing type
    Var(u32),
    /// A general array
    Array(Box<TypeSignature>, ArrayShape),
    /// An instantiated generic type
    GenericInst {
        /// `valuetype` if true, `class` otherwise
        is_value_type: bool,
        /// The generic type definition
        generic: TableIndex,
        /// Type arguments
        args: Vec<TypeSignature>,
    },
    /// System.TypedReference
    TypedByRef,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// System.Object
    Object,
    /// Single dimension array with 0 lower bound
    SzArray(Box<TypeSignature>),
    /// Generic parameter of the enclosing method
    MVar(u32),
    /// A type with a custom modifier
    Modified(CustomModifier, Box<TypeSignature>),
    /// A pinned local
    Pinned(Box<TypeSignature>),
    /// Implemented within the CLI
    Internal,
}

impl TypeSignature {
    /// Size in bytes of a primitive value of this type, used to size field initial data
    #[must_use]
    pub fn primitive_size(&self) -> Option<u32> {
        match self {
            TypeSignature::Boolean | TypeSignature::I1 | TypeSignature::U1 => Some(1),
            TypeSignature::Char | TypeSignature::I2 | TypeSignature::U2 => Some(2),
            TypeSignature::I4 | TypeSignature::U4 | TypeSignature::R4 => Some(4),
            TypeSignature::I8 | TypeSignature::U8 | TypeSignature::R8 => Some(8),
            TypeSignature::Modified(_, inner) => inner.primitive_size(),
            _ => None,
        }
    }

    /// The type stripped of custom modifiers
    #[must_use]
    pub fn unmodified(&self) -> &TypeSignature {
        match self {
            TypeSignature::Modified(_, inner) => inner.unmodified(),
            other => other,
        }
    }
}

impl RemapIndices for TypeSignature {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        match self {
            TypeSignature::ValueType(index) | TypeSignature::Class(index) => f(index),
            TypeSignature::Ptr(inner)
            | TypeSignature::ByRef(inner)
            | TypeSignature::SzArray(inner)
            | TypeSignature::Pinned(inner)
            | TypeSignature::Array(inner, _) => inner.remap_indices(f),
            TypeSignature::GenericInst { generic, args, .. } => {
                f(generic)?;
                args.iter_mut().try_for_each(|arg| arg.remap_indices(f))
            }
            TypeSignature::FnPtr(method) => method.remap_indices(f),
            TypeSignature::Modified(modifier, inner) => {
                f(&mut modifier.modifier)?;
                inner.remap_indices(f)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Void => write!(f, "void"),
            TypeSignature::Boolean => write!(f, "bool"),
            TypeSignature::Char => write!(f, "char"),
            TypeSignature::I1 => write!(f, "int8"),
            TypeSignature::U1 => write!(f, "uint8"),
            TypeSignature::I2 => write!(f, "int16"),
            TypeSignature::U2 => write!(f, "uint16"),
            TypeSignature::I4 => write!(f, "int32"),
            TypeSignature::U4 => write!(f, "uint32"),
            TypeSignature::I8 => write!(f, "int64"),
            TypeSignature::U8 => write!(f, "uint64"),
            TypeSignature::R4 => write!(f, "float32"),
            TypeSignature::R8 => write!(f, "float64"),
            TypeSignature::String => write!(f, "string"),
            TypeSignature::Ptr(inner) => write!(f, "{inner}*"),
            TypeSignature::ByRef(inner) => write!(f, "{inner}&"),
            TypeSignature::ValueType(index) => write!(f, "valuetype {index}"),
            TypeSignature::Class(index) => write!(f, "class {index}"),
            TypeSignature::Var(number) => write!(f, "!{number}"),
            TypeSignature::MVar(number) => write!(f, "!!{number}"),
            TypeSignature::Array(inner, shape) => {
                write!(f, "{inner}[")?;
                for dimension in 0..shape.rank as usize {
                    if dimension > 0 {
                        write!(f, ",")?;
                    }
                    let lower = shape.lower_bounds.get(dimension);
                    let size = shape.sizes.get(dimension);
                    match (lower, size) {
                        (Some(lower), Some(size)) => {
                            write!(f, "{lower}...{}", i64::from(*lower) + i64::from(*size) - 1)?;
                        }
                        (Some(lower), None) => write!(f, "{lower}...")?,
                        (None, Some(size)) => write!(f, "{size}")?,
                        (None, None) => {}
                    }
                }
                write!(f, "]")
            }
            TypeSignature::GenericInst {
                is_value_type,
                generic,
                args,
            } => {
                let kind = if *is_value_type { "valuetype" } else { "class" };
                write!(f, "{kind} {generic}<")?;
                for (position, arg) in args.iter().enumerate() {
                    if position > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeSignature::TypedByRef => write!(f, "typedref"),
            TypeSignature::I => write!(f, "native int"),
            TypeSignature::U => write!(f, "native uint"),
            TypeSignature::FnPtr(method) => write!(f, "method {method}"),
            TypeSignature::Object => write!(f, "object"),
            TypeSignature::SzArray(inner) => write!(f, "{inner}[]"),
            TypeSignature::Modified(modifier, inner) => {
                let kind = if modifier.required { "modreq" } else { "modopt" };
                write!(f, "{inner} {kind}({})", modifier.modifier)
            }
            TypeSignature::Pinned(inner) => write!(f, "{inner} pinned"),
            TypeSignature::Internal => write!(f, "internal"),
        }
    }
}

/// The calling convention kind of a method signature (low nibble of its leading byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// Managed default
    #[default]
    Default,
    /// Unmanaged cdecl
    C,
    /// Unmanaged stdcall
    StdCall,
    /// Unmanaged thiscall
    ThisCall,
    /// Unmanaged fastcall
    FastCall,
    /// Managed vararg
    VarArg,
    /// Unmanaged, convention given by modifiers
    Unmanaged,
}

impl CallingConvention {
    /// Decode the low nibble of a method signature's leading byte
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0x0 => CallingConvention::Default,
            0x1 => CallingConvention::C,
            0x2 => CallingConvention::StdCall,
            0x3 => CallingConvention::ThisCall,
            0x4 => CallingConvention::FastCall,
            0x5 => CallingConvention::VarArg,
            0x9 => CallingConvention::Unmanaged,
            _ => return None,
        })
    }

    /// The low nibble written for this convention
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            CallingConvention::Default => 0x0,
            CallingConvention::C => 0x1,
            CallingConvention::StdCall => 0x2,
            CallingConvention::ThisCall => 0x3,
            CallingConvention::FastCall => 0x4,
            CallingConvention::VarArg => 0x5,
            CallingConvention::Unmanaged => 0x9,
        }
    }
}

/// A method signature (II.23.2.1, II.23.2.2, II.23.2.3)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethod {
    /// The method takes a `this` pointer
    pub has_this: bool,
    /// The `this` pointer is an explicit first parameter
    pub explicit_this: bool,
    /// Calling convention kind
    pub calling_convention: CallingConvention,
    /// Number of generic parameters; non-zero marks the signature as generic
    pub generic_param_count: u32,
    /// Return type
    pub return_type: TypeSignature,
    /// Declared parameters
    pub params: Vec<TypeSignature>,
    /// Extra arguments after the sentinel of a vararg call site
    pub varargs: Vec<TypeSignature>,
}

impl Default for TypeSignature {
    fn default() -> Self {
        TypeSignature::Void
    }
}

impl RemapIndices for SignatureMethod {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        self.return_type.remap_indices(f)?;
        self.params
            .iter_mut()
            .chain(self.varargs.iter_mut())
            .try_for_each(|param| param.remap_indices(f))
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            write!(f, "instance ")?;
        }
        if self.explicit_this {
            write!(f, "explicit ")?;
        }
        write!(f, "{}", self.return_type)?;
        if self.generic_param_count > 0 {
            write!(f, "<{}>", self.generic_param_count)?;
        }
        write!(f, "(")?;
        for (position, param) in self.params.iter().enumerate() {
            if position > 0 {
                write!(f, ",")?;
            }
            write!(f, "{param}")?;
        }
        if self.calling_convention == CallingConvention::VarArg {
            write!(f, ",...")?;
            for param in &self.varargs {
                write!(f, ",{param}")?;
            }
        }
        write!(f, ")")
    }
}

/// A field signature (II.23.2.4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureField {
    /// The field type, including custom modifiers
    pub field_type: TypeSignature,
}

impl RemapIndices for SignatureField {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        self.field_type.remap_indices(f)
    }
}

impl fmt::Display for SignatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}", self.field_type)
    }
}

/// A property signature (II.23.2.5)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureProperty {
    /// The property is an instance property
    pub has_this: bool,
    /// The property type, including custom modifiers
    pub property_type: TypeSignature,
    /// Indexer parameters
    pub params: Vec<TypeSignature>,
}

impl RemapIndices for SignatureProperty {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        self.property_type.remap_indices(f)?;
        self.params
            .iter_mut()
            .try_for_each(|param| param.remap_indices(f))
    }
}

/// A local variable signature (II.23.2.6)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureLocalVariables {
    /// The local variable types, including `pinned` and `byref`
    pub locals: Vec<TypeSignature>,
}

impl RemapIndices for SignatureLocalVariables {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        self.locals
            .iter_mut()
            .try_for_each(|local| local.remap_indices(f))
    }
}

/// A generic method instantiation (II.23.2.15)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethodSpec {
    /// The type arguments
    pub generic_args: Vec<TypeSignature>,
}

impl RemapIndices for SignatureMethodSpec {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        self.generic_args
            .iter_mut()
            .try_for_each(|arg| arg.remap_indices(f))
    }
}
