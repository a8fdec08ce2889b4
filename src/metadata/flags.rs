//! Attribute flags stored in the `Flags` columns of the metadata tables.
//!
//! Flag words with embedded multi-bit fields (visibility, layout, code type) are given as
//! constant modules with their masks, since those fields are compared rather than tested
//! bit by bit. Plain bit sets are [`bitflags`] types.

use bitflags::bitflags;

#[allow(non_snake_case)]
/// Flags of the `TypeDef.Flags` column (II.23.1.15)
pub mod TypeAttributes {
    /// Mask of the visibility field
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Top-level type, not visible outside the assembly
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Top-level type, visible outside the assembly
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested type with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested type with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Nested type with family visibility
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    /// Nested type with assembly visibility
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    /// Nested type with family-and-assembly visibility
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x0000_0006;
    /// Nested type with family-or-assembly visibility
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x0000_0007;

    /// Mask of the layout field
    pub const LAYOUT_MASK: u32 = 0x0000_0018;
    /// Mask of the class semantics field
    pub const CLASS_SEMANTICS_MASK: u32 = 0x0000_0020;
    /// The type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// The type is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// The type is sealed
    pub const SEALED: u32 = 0x0000_0100;
    /// The name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// The runtime checks the name encoding
    pub const RT_SPECIAL_NAME: u32 = 0x0000_0800;
    /// Type initialization may run before the first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// Flags of the `MethodDef.Flags` column (II.23.1.10)
pub mod MethodAttributes {
    /// Mask of the member access field
    pub const MEMBER_ACCESS_MASK: u32 = 0x0007;
    /// Accessible only within the assembly
    pub const ASSEMBLY: u32 = 0x0003;
    /// Accessible everywhere
    pub const PUBLIC: u32 = 0x0006;
    /// Static member
    pub const STATIC: u32 = 0x0010;
    /// Virtual method
    pub const VIRTUAL: u32 = 0x0040;
    /// Abstract method without a body
    pub const ABSTRACT: u32 = 0x0400;
    /// The name is special
    pub const SPECIAL_NAME: u32 = 0x0800;
    /// Implemented through platform invoke
    pub const PINVOKE_IMPL: u32 = 0x2000;
    /// The runtime checks the name encoding
    pub const RT_SPECIAL_NAME: u32 = 0x1000;
}

#[allow(non_snake_case)]
/// Flags of the `MethodDef.ImplFlags` column (II.23.1.11)
pub mod MethodImplAttributes {
    /// Mask of the code type field
    pub const CODE_TYPE_MASK: u32 = 0x0003;
    /// The body is IL
    pub const IL: u32 = 0x0000;
    /// The body is native code
    pub const NATIVE: u32 = 0x0001;
    /// The body is provided by the runtime
    pub const RUNTIME: u32 = 0x0003;
    /// The body is unmanaged
    pub const UNMANAGED: u32 = 0x0004;
    /// Implemented internally by the runtime
    pub const INTERNAL_CALL: u32 = 0x1000;
}

#[allow(non_snake_case)]
/// Flags of the `Field.Flags` column (II.23.1.5)
pub mod FieldAttributes {
    /// Mask of the member access field
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Static field
    pub const STATIC: u32 = 0x0010;
    /// Compile-time constant
    pub const LITERAL: u32 = 0x0040;
    /// The runtime checks the name encoding
    pub const RT_SPECIAL_NAME: u32 = 0x0400;
    /// The field has marshalling information
    pub const HAS_FIELD_MARSHAL: u32 = 0x1000;
    /// The field has a default value
    pub const HAS_DEFAULT: u32 = 0x8000;
    /// The field has an RVA
    pub const HAS_FIELD_RVA: u32 = 0x0100;
}

bitflags! {
    /// Flags of the `Param.Flags` column (II.23.1.13)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamAttributes: u32 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// The parameter has a default value
        const HAS_DEFAULT = 0x1000;
        /// The parameter has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// Flags of the `Assembly.Flags` and `AssemblyRef.Flags` columns (II.23.1.2)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AssemblyFlags: u32 {
        /// The public key column holds the full key, not its token
        const PUBLIC_KEY = 0x0001;
        /// The reference may bind to a different assembly at run time
        const RETARGETABLE = 0x0100;
        /// The JIT optimizer is disabled
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        /// JIT tracking is enabled
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

bitflags! {
    /// Flags of the `ManifestResource.Flags` column (II.23.1.9)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ManifestResourceAttributes: u32 {
        /// The resource is exported
        const PUBLIC = 0x0001;
        /// The resource is private to the assembly
        const PRIVATE = 0x0002;
    }
}

/// Whether a `TypeDef.Flags` value denotes a nested type
#[must_use]
pub fn is_nested_visibility(flags: u32) -> bool {
    flags & TypeAttributes::VISIBILITY_MASK >= TypeAttributes::NESTED_PUBLIC
}

/// The flags with the type made invisible outside of its assembly
#[must_use]
pub fn internalized(flags: u32) -> u32 {
    let visibility = match flags & TypeAttributes::VISIBILITY_MASK {
        TypeAttributes::PUBLIC => TypeAttributes::NOT_PUBLIC,
        TypeAttributes::NESTED_PUBLIC | TypeAttributes::NESTED_FAM_OR_ASSEM => {
            TypeAttributes::NESTED_ASSEMBLY
        }
        TypeAttributes::NESTED_FAMILY => TypeAttributes::NESTED_FAM_AND_ASSEM,
        other => other,
    };
    (flags & !TypeAttributes::VISIBILITY_MASK) | visibility
}
