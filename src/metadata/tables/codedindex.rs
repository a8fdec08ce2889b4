//! Coded indices (ECMA-335 II.24.2.6).
//!
//! A coded index references a row in one of a closed set of tables. The low bits of the
//! encoded value hold a tag selecting the table, the remaining bits hold the one-based row.
//! Encoding a table outside the set fails with [`crate::Error::InvalidCodedIndex`] and
//! decoding an unused tag is a format error.

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::tables::{TableId, TableIndex},
    Error, Result,
};

/// The coded index kinds of the `#~` stream.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef`, `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param`, `Property`
    HasConstant,
    /// Every table that can carry a custom attribute
    HasCustomAttribute,
    /// `Field`, `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef`, `Assembly`
    HasDeclSecurity,
    /// `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef`, `TypeSpec`
    MemberRefParent,
    /// `Event`, `Property`
    HasSemantics,
    /// `MethodDef`, `MemberRef`
    MethodDefOrRef,
    /// `Field`, `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef`, `ExportedType`
    Implementation,
    /// `MethodDef`, `MemberRef` at tags 2 and 3; tags 0, 1 and 4 are unused
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef`, `TypeRef`
    ResolutionScope,
    /// `TypeDef`, `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// The tag slots of this kind; `None` marks a tag value without a table.
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TYPE_DEF),
                Some(TableId::TYPE_REF),
                Some(TableId::TYPE_SPEC),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::FIELD),
                Some(TableId::PARAM),
                Some(TableId::PROPERTY),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::METHOD_DEF),
                Some(TableId::FIELD),
                Some(TableId::TYPE_REF),
                Some(TableId::TYPE_DEF),
                Some(TableId::PARAM),
                Some(TableId::INTERFACE_IMPL),
                Some(TableId::MEMBER_REF),
                Some(TableId::MODULE),
                // Listed as 'Permission' in the standard, which is the DeclSecurity table
                Some(TableId::DECL_SECURITY),
                Some(TableId::PROPERTY),
                Some(TableId::EVENT),
                Some(TableId::STANDALONE_SIG),
                Some(TableId::MODULE_REF),
                Some(TableId::TYPE_SPEC),
                Some(TableId::ASSEMBLY),
                Some(TableId::ASSEMBLY_REF),
                Some(TableId::FILE),
                Some(TableId::EXPORTED_TYPE),
                Some(TableId::MANIFEST_RESOURCE),
                Some(TableId::GENERIC_PARAM),
                Some(TableId::GENERIC_PARAM_CONSTRAINT),
                Some(TableId::METHOD_SPEC),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::FIELD), Some(TableId::PARAM)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TYPE_DEF),
                Some(TableId::METHOD_DEF),
                Some(TableId::ASSEMBLY),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TYPE_DEF),
                Some(TableId::TYPE_REF),
                Some(TableId::MODULE_REF),
                Some(TableId::METHOD_DEF),
                Some(TableId::TYPE_SPEC),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::EVENT), Some(TableId::PROPERTY)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::METHOD_DEF), Some(TableId::MEMBER_REF)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::FIELD), Some(TableId::METHOD_DEF)],
            CodedIndexType::Implementation => &[
                Some(TableId::FILE),
                Some(TableId::ASSEMBLY_REF),
                Some(TableId::EXPORTED_TYPE),
            ],
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::METHOD_DEF),
                Some(TableId::MEMBER_REF),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::MODULE),
                Some(TableId::MODULE_REF),
                Some(TableId::ASSEMBLY_REF),
                Some(TableId::TYPE_REF),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TYPE_DEF), Some(TableId::METHOD_DEF)],
        }
    }

    /// Number of low bits used by the tag
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let slots = self.tables().len() as u32;
        u32::BITS - (slots - 1).leading_zeros()
    }

    /// Returns true if `table` is one of the permitted targets
    #[must_use]
    pub fn accepts(&self, table: TableId) -> bool {
        self.tables().contains(&Some(table))
    }

    /// The permitted target tables, without unused tag slots
    pub fn targets(&self) -> impl Iterator<Item = TableId> {
        self.tables().iter().flatten().copied()
    }

    /// Encode a nullable table index into its coded value.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCodedIndex`] if the table is not permitted by this kind, or
    /// the row does not fit beside the tag.
    pub fn encode(&self, index: Option<TableIndex>) -> Result<u32> {
        let Some(index) = index else {
            return Ok(0);
        };

        let invalid = Error::InvalidCodedIndex {
            coded: *self,
            table: index.table,
        };
        let Some(tag) = self
            .tables()
            .iter()
            .position(|slot| *slot == Some(index.table))
        else {
            return Err(invalid);
        };

        let bits = self.tag_bits();
        match index.row.checked_add(1) {
            Some(row) if row <= u32::MAX >> bits => Ok((row << bits) | tag as u32),
            _ => Err(invalid),
        }
    }

    /// Decode a coded value; a zero row yields `None`.
    ///
    /// # Errors
    /// Returns an error if the tag does not select a table.
    pub fn decode(&self, value: u32) -> Result<Option<TableIndex>> {
        if value == 0 {
            return Ok(None);
        }

        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;

        let Some(Some(table)) = self.tables().get(tag) else {
            return Err(malformed_error!(
                "Coded index {:?} value 0x{:x} has unused tag {}",
                self,
                value,
                tag
            ));
        };

        if row == 0 {
            return Ok(None);
        }

        Ok(Some(TableIndex::new(*table, row - 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tag_widths() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
    }

    #[test]
    fn permitted_pairs_roundtrip() {
        for kind in CodedIndexType::iter() {
            for table in kind.targets() {
                for row in [0_u32, 1, 0x3FFF, 0x1_0000] {
                    let index = TableIndex::new(table, row);
                    let encoded = kind.encode(Some(index)).unwrap();
                    assert_eq!(kind.decode(encoded).unwrap(), Some(index), "{kind:?}");
                }
            }
        }
    }

    #[test]
    fn rejects_foreign_tables() {
        let result = CodedIndexType::TypeDefOrRef.encode(Some(TableIndex::new(TableId::FIELD, 0)));
        assert!(matches!(
            result,
            Err(Error::InvalidCodedIndex {
                coded: CodedIndexType::TypeDefOrRef,
                table: TableId::FIELD
            })
        ));

        // Tag 0 of CustomAttributeType is unused
        let result = CodedIndexType::CustomAttributeType
            .encode(Some(TableIndex::new(TableId::TYPE_DEF, 0)));
        assert!(result.is_err());
        assert!(CodedIndexType::CustomAttributeType.decode((1 << 3) | 0).is_err());
        assert!(CodedIndexType::TypeDefOrRef.decode((1 << 2) | 3).is_err());
    }

    #[test]
    fn rows_must_fit_beside_the_tag() {
        let kind = CodedIndexType::HasCustomAttribute;
        let largest = u32::MAX >> kind.tag_bits();
        let index = TableIndex::new(TableId::METHOD_DEF, largest - 1);
        let encoded = kind.encode(Some(index)).unwrap();
        assert_eq!(kind.decode(encoded).unwrap(), Some(index));

        for row in [largest, u32::MAX] {
            assert!(matches!(
                kind.encode(Some(TableIndex::new(TableId::METHOD_DEF, row))),
                Err(Error::InvalidCodedIndex {
                    coded: CodedIndexType::HasCustomAttribute,
                    table: TableId::METHOD_DEF
                })
            ));
        }
    }

    #[test]
    fn custom_attribute_type_tags() {
        let method = TableIndex::new(TableId::METHOD_DEF, 0);
        assert_eq!(
            CodedIndexType::CustomAttributeType.encode(Some(method)).unwrap(),
            (1 << 3) | 2
        );
        let member = TableIndex::new(TableId::MEMBER_REF, 9);
        assert_eq!(
            CodedIndexType::CustomAttributeType.encode(Some(member)).unwrap(),
            (10 << 3) | 3
        );
    }

    #[test]
    fn null_values() {
        assert_eq!(CodedIndexType::HasConstant.encode(None).unwrap(), 0);
        assert_eq!(CodedIndexType::HasConstant.decode(0).unwrap(), None);
        // Row 0 with a valid tag is null as well
        assert_eq!(CodedIndexType::HasConstant.decode(1).unwrap(), None);
    }
}
