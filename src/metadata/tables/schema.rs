//! The table schema registry.
//!
//! A [`SchemaRegistry`] maps every table kind to a [`TableDescriptor`]: its ordered columns,
//! an optional row ordering (present iff the table must be sorted on disk) and whether exact
//! duplicate rows may be removed when sorting. [`SchemaRegistry::canonical`] holds the 45
//! fixed ECMA-335 tables; extension tables are added with [`SchemaRegistry::with_extensions`].

use std::{
    cmp::Ordering,
    collections::BTreeSet,
    sync::{Arc, OnceLock},
};

use crate::{
    metadata::tables::{
        BlobKind, Cell, CodedIndexType, ColumnCodec, ColumnDescriptor, HeapKind, RawDataKind, Row,
        TableId,
    },
    Error, Result,
};

/// Key columns a sorted table is ordered by, most significant first.
///
/// Index cells compare by their encoded value (the coded value for coded indices, the
/// one-based row for simple indices), numeric cells by value; this matches the on-disk
/// ordering rules of ECMA-335 II.22.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOrdering {
    /// Column positions of the sort key
    pub keys: Vec<usize>,
}

/// The schema of one table kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    /// The table kind
    pub id: TableId,
    /// Display name
    pub name: &'static str,
    /// Columns in on-disk order
    pub columns: Vec<ColumnDescriptor>,
    /// Present iff the table must be sorted
    pub ordering: Option<RowOrdering>,
    /// Whether exact duplicate rows may be dropped when the table is sorted
    pub dedup: bool,
}

impl TableDescriptor {
    /// Create an unsorted table descriptor
    #[must_use]
    pub fn new(id: TableId, name: &'static str, columns: Vec<ColumnDescriptor>) -> Self {
        TableDescriptor {
            id,
            name,
            columns,
            ordering: None,
            dedup: false,
        }
    }

    /// Mark the table as sorted by the given key columns
    #[must_use]
    pub fn sorted_by(mut self, keys: &[usize]) -> Self {
        self.ordering = Some(RowOrdering {
            keys: keys.to_vec(),
        });
        self
    }

    /// Allow exact duplicate rows to be removed when sorting
    #[must_use]
    pub fn deduplicated(mut self) -> Self {
        self.dedup = true;
        self
    }

    /// Returns true if the table must be sorted on disk
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.ordering.is_some()
    }

    /// A row of default cells
    #[must_use]
    pub fn empty_row(&self) -> Vec<Cell> {
        self.columns
            .iter()
            .map(|column| column.codec.default_cell())
            .collect()
    }

    /// A raw row of zero values
    #[must_use]
    pub fn empty_raw_row(&self) -> Vec<u32> {
        vec![0; self.columns.len()]
    }

    /// Validate a full set of cells for this table.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRow`] on a column count or cell kind mismatch.
    pub fn check_cells(&self, cells: &[Cell]) -> Result<()> {
        if cells.len() != self.columns.len() {
            return Err(Error::InvalidRow {
                table: self.id,
                message: format!(
                    "expected {} cells, got {}",
                    self.columns.len(),
                    cells.len()
                ),
            });
        }

        for (column, cell) in self.columns.iter().zip(cells) {
            column.codec.check(cell).map_err(|message| Error::InvalidRow {
                table: self.id,
                message: format!("{}: {message}", column.name),
            })?;
        }

        Ok(())
    }

    /// The sort key of a row; empty for unsorted tables.
    ///
    /// # Errors
    /// Returns an error if a key cell cannot be encoded.
    pub fn sort_key(&self, row: &Row) -> Result<Vec<u64>> {
        let Some(ordering) = &self.ordering else {
            return Ok(Vec::new());
        };

        ordering
            .keys
            .iter()
            .map(|&column| {
                let codec = self
                    .columns
                    .get(column)
                    .map(|descriptor| descriptor.codec)
                    .ok_or_else(|| Error::InvalidRow {
                        table: self.id,
                        message: format!("sort key column {column} does not exist"),
                    })?;

                Ok(match (codec, row.cell(column)?) {
                    (ColumnCodec::CodedIndex(coded), Cell::Index(index)) => {
                        u64::from(coded.encode(*index)?)
                    }
                    (_, Cell::Index(index)) => index.map_or(0, |index| u64::from(index.one_based())),
                    (_, Cell::Int(value)) => u64::from(*value),
                    (_, _) => 0,
                })
            })
            .collect()
    }

    /// Compare two rows by the declared ordering.
    ///
    /// # Errors
    /// Returns an error if a key cell cannot be encoded.
    pub fn compare(&self, left: &Row, right: &Row) -> Result<Ordering> {
        Ok(self.sort_key(left)?.cmp(&self.sort_key(right)?))
    }

    /// The tables referenced by this table's key columns
    fn key_targets(&self) -> Vec<TableId> {
        let Some(ordering) = &self.ordering else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        for column in ordering
            .keys
            .iter()
            .filter_map(|&key| self.columns.get(key))
        {
            match column.codec {
                ColumnCodec::TableIndex(table) => targets.push(table),
                ColumnCodec::CodedIndex(coded) => targets.extend(coded.targets()),
                _ => {}
            }
        }
        targets
    }
}

/// Catalog of table descriptors keyed by table kind.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: Vec<Option<TableDescriptor>>,
}

impl SchemaRegistry {
    /// A registry holding exactly the given descriptors.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateTable`] if two descriptors name the same table kind.
    pub fn new(descriptors: Vec<TableDescriptor>) -> Result<SchemaRegistry> {
        let mut tables = vec![None; 64];
        for descriptor in descriptors {
            let slot = &mut tables[descriptor.id.index()];
            if slot.is_some() {
                return Err(Error::DuplicateTable(descriptor.id));
            }
            *slot = Some(descriptor);
        }

        Ok(SchemaRegistry { tables })
    }

    /// The shared registry of the 45 fixed tables
    #[must_use]
    pub fn canonical() -> Arc<SchemaRegistry> {
        static CANONICAL: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();
        CANONICAL
            .get_or_init(|| {
                let tables = canonical_descriptors().into_iter().fold(
                    vec![None; 64],
                    |mut tables, descriptor| {
                        let position = descriptor.id.index();
                        tables[position] = Some(descriptor);
                        tables
                    },
                );
                Arc::new(SchemaRegistry { tables })
            })
            .clone()
    }

    /// The canonical registry augmented with `extensions`.
    ///
    /// An extension descriptor for a fixed table kind replaces the canonical descriptor of
    /// that kind; this is the only way a fixed table's schema changes.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateTable`] if `extensions` names a table kind twice.
    pub fn with_extensions(extensions: Vec<TableDescriptor>) -> Result<SchemaRegistry> {
        let mut registry = (*Self::canonical()).clone();
        let mut seen = BTreeSet::new();
        for descriptor in extensions {
            if !seen.insert(descriptor.id) {
                return Err(Error::DuplicateTable(descriptor.id));
            }
            let position = descriptor.id.index();
            registry.tables[position] = Some(descriptor);
        }

        Ok(registry)
    }

    /// The descriptor of a table kind, if registered
    #[must_use]
    pub fn get(&self, id: TableId) -> Option<&TableDescriptor> {
        self.tables.get(id.index()).and_then(Option::as_ref)
    }

    /// The descriptor of a table kind.
    ///
    /// # Errors
    /// Returns [`Error::MissingSchema`] if the kind is not registered.
    pub fn descriptor(&self, id: TableId) -> Result<&TableDescriptor> {
        self.get(id).ok_or(Error::MissingSchema(id.value()))
    }

    /// All registered descriptors in ascending table kind order
    pub fn iter(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter().flatten()
    }

    /// The sorted tables, ordered so that a table comes after every sorted table its key
    /// columns reference.
    #[must_use]
    pub fn sort_order(&self) -> Vec<TableId> {
        let sorted: Vec<&TableDescriptor> = self.iter().filter(|d| d.is_sorted()).collect();
        let mut pending: BTreeSet<TableId> = sorted.iter().map(|d| d.id).collect();
        let mut order = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = sorted
                .iter()
                .filter(|d| pending.contains(&d.id))
                .find(|d| {
                    d.key_targets()
                        .iter()
                        .all(|target| *target == d.id || !pending.contains(target))
                })
                .map(|d| d.id);

            // A reference cycle between key columns falls back to kind order
            let next = match ready {
                Some(id) => id,
                None => match pending.iter().next() {
                    Some(id) => *id,
                    None => break,
                },
            };

            pending.remove(&next);
            order.push(next);
        }

        order
    }

    /// Names of the custom string heaps referenced by any column
    #[must_use]
    pub fn custom_heaps(&self) -> Vec<&'static str> {
        let mut heaps: Vec<&'static str> = self
            .iter()
            .flat_map(|d| d.columns.iter())
            .filter_map(|column| match column.codec {
                ColumnCodec::String(HeapKind::Custom(name)) => Some(name),
                _ => None,
            })
            .collect();
        heaps.sort_unstable();
        heaps.dedup();
        heaps
    }

    /// The sorted-tables mask written into the `#~` header
    #[must_use]
    pub fn sorted_mask(&self) -> u64 {
        self.iter()
            .filter(|d| d.is_sorted())
            .fold(0, |mask, d| mask | d.id.bit())
    }
}

const fn col(name: &'static str, codec: ColumnCodec) -> ColumnDescriptor {
    ColumnDescriptor::new(name, codec)
}

const STRING: ColumnCodec = ColumnCodec::String(HeapKind::Strings);

const fn coded(kind: CodedIndexType) -> ColumnCodec {
    ColumnCodec::CodedIndex(kind)
}

const fn index(table: TableId) -> ColumnCodec {
    ColumnCodec::TableIndex(table)
}

const fn list(table: TableId) -> ColumnCodec {
    ColumnCodec::TableList(table)
}

const fn blob(kind: BlobKind) -> ColumnCodec {
    ColumnCodec::Blob(kind)
}

#[allow(clippy::too_many_lines)]
fn canonical_descriptors() -> Vec<TableDescriptor> {
    use ColumnCodec::{Guid, RawData, U16, U32, U32As16, U8};

    vec![
        TableDescriptor::new(
            TableId::MODULE,
            "Module",
            vec![
                col("Generation", U32As16),
                col("Name", STRING),
                col("Mvid", Guid),
                col("EncId", Guid),
                col("EncBaseId", Guid),
            ],
        ),
        TableDescriptor::new(
            TableId::TYPE_REF,
            "TypeRef",
            vec![
                col("ResolutionScope", coded(CodedIndexType::ResolutionScope)),
                col("TypeName", STRING),
                col("TypeNamespace", STRING),
            ],
        ),
        TableDescriptor::new(
            TableId::TYPE_DEF,
            "TypeDef",
            vec![
                col("Flags", U32),
                col("TypeName", STRING),
                col("TypeNamespace", STRING),
                col("Extends", coded(CodedIndexType::TypeDefOrRef)),
                col("FieldList", list(TableId::FIELD)),
                col("MethodList", list(TableId::METHOD_DEF)),
            ],
        ),
        TableDescriptor::new(
            TableId::FIELD_PTR,
            "FieldPtr",
            vec![col("Field", index(TableId::FIELD))],
        ),
        TableDescriptor::new(
            TableId::FIELD,
            "Field",
            vec![
                col("Flags", U16),
                col("Name", STRING),
                col("Signature", blob(BlobKind::FieldSig)),
            ],
        ),
        TableDescriptor::new(
            TableId::METHOD_PTR,
            "MethodPtr",
            vec![col("Method", index(TableId::METHOD_DEF))],
        ),
        TableDescriptor::new(
            TableId::METHOD_DEF,
            "MethodDef",
            vec![
                col("RVA", RawData(RawDataKind::MethodBody)),
                col("ImplFlags", U16),
                col("Flags", U16),
                col("Name", STRING),
                col("Signature", blob(BlobKind::MethodSig)),
                col("ParamList", list(TableId::PARAM)),
            ],
        ),
        TableDescriptor::new(
            TableId::PARAM_PTR,
            "ParamPtr",
            vec![col("Param", index(TableId::PARAM))],
        ),
        TableDescriptor::new(
            TableId::PARAM,
            "Param",
            vec![
                col("Flags", U16),
                col("Sequence", U16),
                col("Name", STRING),
            ],
        ),
        TableDescriptor::new(
            TableId::INTERFACE_IMPL,
            "InterfaceImpl",
            vec![
                col("Class", index(TableId::TYPE_DEF)),
                col("Interface", coded(CodedIndexType::TypeDefOrRef)),
            ],
        )
        .sorted_by(&[0, 1])
        .deduplicated(),
        TableDescriptor::new(
            TableId::MEMBER_REF,
            "MemberRef",
            vec![
                col("Class", coded(CodedIndexType::MemberRefParent)),
                col("Name", STRING),
                col("Signature", blob(BlobKind::MemberRefSig)),
            ],
        ),
        TableDescriptor::new(
            TableId::CONSTANT,
            "Constant",
            vec![
                col("Type", U8),
                col("Padding", U8),
                col("Parent", coded(CodedIndexType::HasConstant)),
                col(
                    "Value",
                    blob(BlobKind::Constant {
                        element_type_column: 0,
                    }),
                ),
            ],
        )
        .sorted_by(&[2]),
        TableDescriptor::new(
            TableId::CUSTOM_ATTRIBUTE,
            "CustomAttribute",
            vec![
                col("Parent", coded(CodedIndexType::HasCustomAttribute)),
                col("Type", coded(CodedIndexType::CustomAttributeType)),
                col("Value", blob(BlobKind::CustomAttribute)),
            ],
        )
        .sorted_by(&[0]),
        TableDescriptor::new(
            TableId::FIELD_MARSHAL,
            "FieldMarshal",
            vec![
                col("Parent", coded(CodedIndexType::HasFieldMarshal)),
                col("NativeType", blob(BlobKind::Marshal)),
            ],
        )
        .sorted_by(&[0]),
        TableDescriptor::new(
            TableId::DECL_SECURITY,
            "DeclSecurity",
            vec![
                col("Action", U16),
                col("Parent", coded(CodedIndexType::HasDeclSecurity)),
                col("PermissionSet", blob(BlobKind::Security)),
            ],
        )
        .sorted_by(&[1]),
        TableDescriptor::new(
            TableId::CLASS_LAYOUT,
            "ClassLayout",
            vec![
                col("PackingSize", U16),
                col("ClassSize", U32),
                col("Parent", index(TableId::TYPE_DEF)),
            ],
        )
        .sorted_by(&[2]),
        TableDescriptor::new(
            TableId::FIELD_LAYOUT,
            "FieldLayout",
            vec![col("Offset", U32), col("Field", index(TableId::FIELD))],
        )
        .sorted_by(&[1]),
        TableDescriptor::new(
            TableId::STANDALONE_SIG,
            "StandAloneSig",
            vec![col("Signature", blob(BlobKind::StandAloneSig))],
        ),
        TableDescriptor::new(
            TableId::EVENT_MAP,
            "EventMap",
            vec![
                col("Parent", index(TableId::TYPE_DEF)),
                col("EventList", list(TableId::EVENT)),
            ],
        ),
        TableDescriptor::new(
            TableId::EVENT_PTR,
            "EventPtr",
            vec![col("Event", index(TableId::EVENT))],
        ),
        TableDescriptor::new(
            TableId::EVENT,
            "Event",
            vec![
                col("EventFlags", U16),
                col("Name", STRING),
                col("EventType", coded(CodedIndexType::TypeDefOrRef)),
            ],
        ),
        TableDescriptor::new(
            TableId::PROPERTY_MAP,
            "PropertyMap",
            vec![
                col("Parent", index(TableId::TYPE_DEF)),
                col("PropertyList", list(TableId::PROPERTY)),
            ],
        ),
        TableDescriptor::new(
            TableId::PROPERTY_PTR,
            "PropertyPtr",
            vec![col("Property", index(TableId::PROPERTY))],
        ),
        TableDescriptor::new(
            TableId::PROPERTY,
            "Property",
            vec![
                col("Flags", U16),
                col("Name", STRING),
                col("Type", blob(BlobKind::PropertySig)),
            ],
        ),
        TableDescriptor::new(
            TableId::METHOD_SEMANTICS,
            "MethodSemantics",
            vec![
                col("Semantics", U16),
                col("Method", index(TableId::METHOD_DEF)),
                col("Association", coded(CodedIndexType::HasSemantics)),
            ],
        )
        .sorted_by(&[2])
        .deduplicated(),
        TableDescriptor::new(
            TableId::METHOD_IMPL,
            "MethodImpl",
            vec![
                col("Class", index(TableId::TYPE_DEF)),
                col("MethodBody", coded(CodedIndexType::MethodDefOrRef)),
                col("MethodDeclaration", coded(CodedIndexType::MethodDefOrRef)),
            ],
        )
        .sorted_by(&[0])
        .deduplicated(),
        TableDescriptor::new(TableId::MODULE_REF, "ModuleRef", vec![col("Name", STRING)]),
        TableDescriptor::new(
            TableId::TYPE_SPEC,
            "TypeSpec",
            vec![col("Signature", blob(BlobKind::TypeSpec))],
        ),
        TableDescriptor::new(
            TableId::IMPL_MAP,
            "ImplMap",
            vec![
                col("MappingFlags", U16),
                col("MemberForwarded", coded(CodedIndexType::MemberForwarded)),
                col("ImportName", STRING),
                col("ImportScope", index(TableId::MODULE_REF)),
            ],
        )
        .sorted_by(&[1]),
        TableDescriptor::new(
            TableId::FIELD_RVA,
            "FieldRVA",
            vec![
                col("RVA", RawData(RawDataKind::FieldData)),
                col("Field", index(TableId::FIELD)),
            ],
        )
        .sorted_by(&[1]),
        TableDescriptor::new(
            TableId::ENC_LOG,
            "EncLog",
            vec![col("Token", U32), col("FuncCode", U32)],
        ),
        TableDescriptor::new(TableId::ENC_MAP, "EncMap", vec![col("Token", U32)]),
        TableDescriptor::new(
            TableId::ASSEMBLY,
            "Assembly",
            vec![
                col("HashAlgId", U32),
                col("MajorVersion", U32As16),
                col("MinorVersion", U32As16),
                col("BuildNumber", U32As16),
                col("RevisionNumber", U32As16),
                col("Flags", U32),
                col("PublicKey", blob(BlobKind::Bytes)),
                col("Name", STRING),
                col("Culture", STRING),
            ],
        ),
        TableDescriptor::new(
            TableId::ASSEMBLY_PROCESSOR,
            "AssemblyProcessor",
            vec![col("Processor", U32)],
        ),
        TableDescriptor::new(
            TableId::ASSEMBLY_OS,
            "AssemblyOS",
            vec![
                col("OSPlatformID", U32),
                col("OSMajorVersion", U32),
                col("OSMinorVersion", U32),
            ],
        ),
        TableDescriptor::new(
            TableId::ASSEMBLY_REF,
            "AssemblyRef",
            vec![
                col("MajorVersion", U32As16),
                col("MinorVersion", U32As16),
                col("BuildNumber", U32As16),
                col("RevisionNumber", U32As16),
                col("Flags", U32),
                col("PublicKeyOrToken", blob(BlobKind::Bytes)),
                col("Name", STRING),
                col("Culture", STRING),
                col("HashValue", blob(BlobKind::Bytes)),
            ],
        ),
        TableDescriptor::new(
            TableId::ASSEMBLY_REF_PROCESSOR,
            "AssemblyRefProcessor",
            vec![
                col("Processor", U32),
                col("AssemblyRef", index(TableId::ASSEMBLY_REF)),
            ],
        ),
        TableDescriptor::new(
            TableId::ASSEMBLY_REF_OS,
            "AssemblyRefOS",
            vec![
                col("OSPlatformId", U32),
                col("OSMajorVersion", U32),
                col("OSMinorVersion", U32),
                col("AssemblyRef", index(TableId::ASSEMBLY_REF)),
            ],
        ),
        TableDescriptor::new(
            TableId::FILE,
            "File",
            vec![
                col("Flags", U32),
                col("Name", STRING),
                col("HashValue", blob(BlobKind::Bytes)),
            ],
        ),
        TableDescriptor::new(
            TableId::EXPORTED_TYPE,
            "ExportedType",
            vec![
                col("Flags", U32),
                col("TypeDefId", U32),
                col("TypeName", STRING),
                col("TypeNamespace", STRING),
                col("Implementation", coded(CodedIndexType::Implementation)),
            ],
        ),
        TableDescriptor::new(
            TableId::MANIFEST_RESOURCE,
            "ManifestResource",
            vec![
                col("Offset", RawData(RawDataKind::ManifestResource)),
                col("Flags", U32),
                col("Name", STRING),
                col("Implementation", coded(CodedIndexType::Implementation)),
            ],
        ),
        TableDescriptor::new(
            TableId::NESTED_CLASS,
            "NestedClass",
            vec![
                col("NestedClass", index(TableId::TYPE_DEF)),
                col("EnclosingClass", index(TableId::TYPE_DEF)),
            ],
        )
        .sorted_by(&[0])
        .deduplicated(),
        TableDescriptor::new(
            TableId::GENERIC_PARAM,
            "GenericParam",
            vec![
                col("Number", U16),
                col("Flags", U16),
                col("Owner", coded(CodedIndexType::TypeOrMethodDef)),
                col("Name", STRING),
            ],
        )
        .sorted_by(&[2, 0]),
        TableDescriptor::new(
            TableId::METHOD_SPEC,
            "MethodSpec",
            vec![
                col("Method", coded(CodedIndexType::MethodDefOrRef)),
                col("Instantiation", blob(BlobKind::MethodSpec)),
            ],
        ),
        TableDescriptor::new(
            TableId::GENERIC_PARAM_CONSTRAINT,
            "GenericParamConstraint",
            vec![
                col("Owner", index(TableId::GENERIC_PARAM)),
                col("Constraint", coded(CodedIndexType::TypeDefOrRef)),
            ],
        )
        .sorted_by(&[0])
        .deduplicated(),
    ]
}
