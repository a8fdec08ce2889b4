//! Table kinds of the `#~` stream.
//!
//! A [`TableId`] is the bit position of a table in the present-tables bitmask. The 45 fixed
//! kinds of ECMA-335 II.22 occupy `0x00..=0x2C`; every value from [`TableId::FIXED_COUNT`] up to
//! 63 is an extension kind that only exists once a schema registers it.

use std::fmt;

macro_rules! define_table_ids {
    ($($name:ident = $value:expr, $display:expr;)*) => {
        impl TableId {
            $(
                #[doc = concat!("The `", $display, "` table")]
                pub const $name: TableId = TableId($value);
            )*

            /// All fixed table kinds in ascending order
            pub const FIXED: &'static [TableId] = &[$(TableId::$name),*];

            /// Display name of a fixed table kind, `None` for extension kinds
            #[must_use]
            pub fn fixed_name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some($display),)*
                    _ => None,
                }
            }
        }
    };
}

/// Identifier of a metadata table; the value is the table's bit in the present-tables mask.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TableId(u8);

define_table_ids! {
    MODULE = 0x00, "Module";
    TYPE_REF = 0x01, "TypeRef";
    TYPE_DEF = 0x02, "TypeDef";
    FIELD_PTR = 0x03, "FieldPtr";
    FIELD = 0x04, "Field";
    METHOD_PTR = 0x05, "MethodPtr";
    METHOD_DEF = 0x06, "MethodDef";
    PARAM_PTR = 0x07, "ParamPtr";
    PARAM = 0x08, "Param";
    INTERFACE_IMPL = 0x09, "InterfaceImpl";
    MEMBER_REF = 0x0A, "MemberRef";
    CONSTANT = 0x0B, "Constant";
    CUSTOM_ATTRIBUTE = 0x0C, "CustomAttribute";
    FIELD_MARSHAL = 0x0D, "FieldMarshal";
    DECL_SECURITY = 0x0E, "DeclSecurity";
    CLASS_LAYOUT = 0x0F, "ClassLayout";
    FIELD_LAYOUT = 0x10, "FieldLayout";
    STANDALONE_SIG = 0x11, "StandAloneSig";
    EVENT_MAP = 0x12, "EventMap";
    EVENT_PTR = 0x13, "EventPtr";
    EVENT = 0x14, "Event";
    PROPERTY_MAP = 0x15, "PropertyMap";
    PROPERTY_PTR = 0x16, "PropertyPtr";
    PROPERTY = 0x17, "Property";
    METHOD_SEMANTICS = 0x18, "MethodSemantics";
    METHOD_IMPL = 0x19, "MethodImpl";
    MODULE_REF = 0x1A, "ModuleRef";
    TYPE_SPEC = 0x1B, "TypeSpec";
    IMPL_MAP = 0x1C, "ImplMap";
    FIELD_RVA = 0x1D, "FieldRVA";
    ENC_LOG = 0x1E, "EncLog";
    ENC_MAP = 0x1F, "EncMap";
    ASSEMBLY = 0x20, "Assembly";
    ASSEMBLY_PROCESSOR = 0x21, "AssemblyProcessor";
    ASSEMBLY_OS = 0x22, "AssemblyOS";
    ASSEMBLY_REF = 0x23, "AssemblyRef";
    ASSEMBLY_REF_PROCESSOR = 0x24, "AssemblyRefProcessor";
    ASSEMBLY_REF_OS = 0x25, "AssemblyRefOS";
    FILE = 0x26, "File";
    EXPORTED_TYPE = 0x27, "ExportedType";
    MANIFEST_RESOURCE = 0x28, "ManifestResource";
    NESTED_CLASS = 0x29, "NestedClass";
    GENERIC_PARAM = 0x2A, "GenericParam";
    METHOD_SPEC = 0x2B, "MethodSpec";
    GENERIC_PARAM_CONSTRAINT = 0x2C, "GenericParamConstraint";
}

impl TableId {
    /// Number of fixed table kinds; the first extension kind has this value.
    pub const FIXED_COUNT: u8 = 0x2D;

    /// Largest value a table kind can take (the bitmask is 64 bits wide)
    pub const MAX: u8 = 63;

    /// Create a table kind from its bit position.
    ///
    /// # Errors
    /// Returns an error if `value` does not fit into the 64-bit table mask.
    pub fn new(value: u8) -> crate::Result<TableId> {
        if value > Self::MAX {
            return Err(malformed_error!("Table kind {} exceeds the table mask", value));
        }

        Ok(TableId(value))
    }

    /// Create an extension kind.
    ///
    /// # Errors
    /// Returns an error if `value` is a fixed kind or does not fit into the table mask.
    pub fn extension(value: u8) -> crate::Result<TableId> {
        if value < Self::FIXED_COUNT {
            return Err(malformed_error!(
                "Table kind 0x{:02x} is reserved for a fixed table",
                value
            ));
        }

        Self::new(value)
    }

    /// The raw table kind value
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Position in per-table arrays
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The bit of this table in the present/sorted masks
    #[must_use]
    pub fn bit(self) -> u64 {
        1_u64 << self.0
    }

    /// Returns true for user-registered table kinds beyond the fixed set
    #[must_use]
    pub fn is_extension(self) -> bool {
        self.0 >= Self::FIXED_COUNT
    }

    /// Iterate over every possible table kind, fixed and extension, in ascending order
    pub fn all() -> impl Iterator<Item = TableId> {
        (0..=Self::MAX).map(TableId)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fixed_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Extension(0x{:02x})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_kinds_are_dense() {
        assert_eq!(TableId::FIXED.len(), TableId::FIXED_COUNT as usize);
        for (position, id) in TableId::FIXED.iter().enumerate() {
            assert_eq!(id.index(), position);
            assert!(!id.is_extension());
        }
    }

    #[test]
    fn names_and_bits() {
        assert_eq!(TableId::GENERIC_PARAM_CONSTRAINT.value(), 0x2C);
        assert_eq!(TableId::TYPE_DEF.to_string(), "TypeDef");
        assert_eq!(TableId::METHOD_DEF.bit(), 0x40);

        let extension = TableId::extension(0x30).unwrap();
        assert!(extension.is_extension());
        assert_eq!(extension.to_string(), "Extension(0x30)");
        assert!(TableId::extension(0x02).is_err());
        assert!(TableId::new(64).is_err());
    }
}
