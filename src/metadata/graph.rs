//! The metadata graph of one module.
//!
//! A [`CilMetadata`] owns the typed tables of a module together with what is needed to
//! finish its resolution: the `#US` heap for `ldstr` operands and the image sections that
//! hold method bodies, field data and embedded resources.
//!
//! Loading is split the same way the table engine is: [`CilMetadata::read`] decodes every
//! row, and [`CilMetadata::resolve_all`] then dereferences raw data, parses custom
//! attribute values (which need the constructor signatures and enum definitions of the
//! module) and validates every cross reference.

use std::{collections::HashMap, sync::Arc};

use crate::{
    metadata::{
        customattributes::{
            encode_custom_attribute, parse_custom_attribute, primitive_elem_type, CaElemType,
            CaTypeResolver,
        },
        flags::{FieldAttributes, MethodImplAttributes},
        method::MethodBody,
        root::{Root, DEFAULT_VERSION},
        sections::{ImageSections, SectionPartBuilder, SectionParts},
        signatures::TypeSignature,
        streams::{HeapBuilders, HeapReaders, UserStrings},
        tables::{
            columns::{
                assembly, classlayout, customattribute, field, fieldrva, manifestresource,
                memberref, methoddef, module, nestedclass, typedef, typeref,
            },
            is_large_stream, write_tables, Blob, Cell, Permutation, RawData, RawTables,
            SchemaRegistry, TableId, TableIndex, Tables,
        },
        typename::TypeNameSpec,
    },
    Error, Result,
};

const MAX_NESTING: usize = 64;

/// Options of [`CilMetadata::serialize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Drop exact duplicate rows of tables that permit it while sorting
    pub dedup: bool,
    /// Runtime version string; the graph's own version if `None`
    pub version: Option<String>,
    /// RVA the text part of the section content is placed at
    pub text_rva: u32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            dedup: false,
            version: None,
            text_rva: 0x2000,
        }
    }
}

/// The output of [`CilMetadata::serialize`]
#[derive(Debug, Clone)]
pub struct SerializedModule {
    /// The metadata root with all streams
    pub metadata: Vec<u8>,
    /// Method bodies, field data and resources referenced by the tables
    pub sections: SectionParts,
    /// How sorting moved rows; references held outside the graph must be mapped through it
    pub permutation: Permutation,
}

/// The tables of one module and the state needed to resolve them
#[derive(Debug, Clone)]
pub struct CilMetadata {
    tables: Tables,
    version: String,
    user_strings: Vec<u8>,
    sections: Option<Arc<dyn ImageSections>>,
    resolved: bool,
}

impl Default for CilMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl CilMetadata {
    /// An empty graph following the canonical schema
    #[must_use]
    pub fn new() -> Self {
        Self::from_tables(Tables::default())
    }

    /// A graph over already built tables; nothing is left to resolve
    #[must_use]
    pub fn from_tables(tables: Tables) -> Self {
        CilMetadata {
            tables,
            version: DEFAULT_VERSION.to_string(),
            user_strings: Vec::new(),
            sections: None,
            resolved: true,
        }
    }

    /// Parse a metadata root.
    ///
    /// `sections` resolves raw data references during [`CilMetadata::resolve_all`]; without
    /// it they stay [`RawData::Unresolved`].
    ///
    /// # Errors
    /// Returns a format error for a malformed root, heap or table stream
    pub fn read(
        data: &[u8],
        schema: Arc<SchemaRegistry>,
        sections: Option<Arc<dyn ImageSections>>,
    ) -> Result<CilMetadata> {
        let root = Root::read(data)?;
        let tables_stream = root
            .stream_data(data, &["#~", "#-"])
            .ok_or_else(|| malformed_error!("Metadata root has no tables stream"))?;

        let mut heaps = HeapReaders::new(
            root.stream_data(data, &["#Strings"]),
            root.stream_data(data, &["#Blob"]),
            root.stream_data(data, &["#GUID"]),
        )?;

        let mut custom_heaps = Vec::new();
        for name in schema.custom_heaps() {
            let size = root.stream(&[name]).map_or(0, |header| header.size as usize);
            custom_heaps.push((name, is_large_stream(size)));
            if let Some(stream) = root.stream_data(data, &[name]) {
                heaps.add_custom(name, stream)?;
            }
        }

        let raw = RawTables::read(tables_stream, &schema, custom_heaps)?;
        let tables = raw.resolve(&heaps, schema)?;
        log::debug!(
            "Read metadata {} with {} tables",
            root.version,
            raw.header.table_count()
        );

        Ok(CilMetadata {
            tables,
            version: root.version.clone(),
            user_strings: root
                .stream_data(data, &["#US"])
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            sections,
            resolved: false,
        })
    }

    /// The tables
    #[must_use]
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// The tables, for editing
    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }

    /// The schema registry the tables follow
    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        self.tables.schema()
    }

    /// The runtime version string of the metadata root
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Replace the runtime version string
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Whether [`CilMetadata::resolve_all`] has completed
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Resolve raw data references, parse custom attribute values and validate every
    /// reference. Running it again is a no-op.
    ///
    /// # Errors
    /// Returns a format error for an unreadable method body or resource, or a dangling
    /// reference
    pub fn resolve_all(&mut self) -> Result<()> {
        if self.resolved {
            return Ok(());
        }

        self.resolve_raw_data()?;
        self.resolve_custom_attributes()?;
        self.tables.validate()?;
        self.resolved = true;
        Ok(())
    }

    fn resolve_raw_data(&mut self) -> Result<()> {
        let Some(sections) = self.sections.clone() else {
            log::debug!("No image sections, raw data references stay unresolved");
            return Ok(());
        };

        let user_strings = if self.user_strings.is_empty() {
            None
        } else {
            Some(UserStrings::from(&self.user_strings)?)
        };

        let mut updates = Vec::new();
        for (index, row) in self.tables.table(TableId::METHOD_DEF).iter() {
            let RawData::Unresolved(rva) = row.raw_data(methoddef::RVA)? else {
                continue;
            };
            let impl_flags = row.int(methoddef::IMPL_FLAGS)?;
            if impl_flags & MethodImplAttributes::CODE_TYPE_MASK != MethodImplAttributes::IL {
                continue;
            }

            let data = sections.data_at_rva(*rva)?;
            let body = MethodBody::parse(data, &mut |offset| match &user_strings {
                Some(heap) => heap.get(offset as usize),
                None => Err(malformed_error!("ldstr 0x{:x} without a #US heap", offset)),
            })
            .map_err(|error| {
                malformed_error!("Body of MethodDef row {}: {}", index.row + 1, error)
            })?;
            updates.push((
                index,
                methoddef::RVA,
                Cell::RawData(RawData::MethodBody(Box::new(body))),
            ));
        }

        for (index, row) in self.tables.table(TableId::FIELD_RVA).iter() {
            let RawData::Unresolved(rva) = row.raw_data(fieldrva::RVA)? else {
                continue;
            };
            let Some(target) = row.index(fieldrva::FIELD)? else {
                continue;
            };

            match self.field_data_size(target)? {
                Some(size) => {
                    let data = sections.data_at_rva(*rva)?;
                    let bytes = data.get(..size as usize).ok_or_else(|| {
                        malformed_error!(
                            "Data of field {} at RVA 0x{:08x} is truncated",
                            target,
                            rva
                        )
                    })?;
                    updates.push((
                        index,
                        fieldrva::RVA,
                        Cell::RawData(RawData::FieldData(bytes.to_vec())),
                    ));
                }
                None => log::debug!(
                    "Data size of field {} is unknown, its RVA stays unresolved",
                    target
                ),
            }
        }

        for (index, row) in self.tables.table(TableId::MANIFEST_RESOURCE).iter() {
            if row.index(manifestresource::IMPLEMENTATION)?.is_some() {
                continue;
            }
            let RawData::Unresolved(offset) = row.raw_data(manifestresource::OFFSET)? else {
                continue;
            };
            let bytes = sections.resource(*offset)?.to_vec();
            updates.push((
                index,
                manifestresource::OFFSET,
                Cell::RawData(RawData::Resource(bytes)),
            ));
        }

        for (index, column, cell) in updates {
            self.tables.set(index, column, cell)?;
        }
        Ok(())
    }

    /// Byte size of a field's initial data: the size of a primitive type, or the class
    /// size of an in-module value type with explicit layout
    fn field_data_size(&self, target: TableIndex) -> Result<Option<u32>> {
        let Blob::Field(signature) = self.tables.row(target)?.blob(field::SIGNATURE)? else {
            return Ok(None);
        };

        let field_type = signature.field_type.unmodified();
        if let Some(size) = field_type.primitive_size() {
            return Ok(Some(size));
        }

        match field_type {
            TypeSignature::ValueType(index) if index.table == TableId::TYPE_DEF => {
                self.class_size(*index)
            }
            _ => Ok(None),
        }
    }

    fn class_size(&self, type_def: TableIndex) -> Result<Option<u32>> {
        for (_, row) in self.tables.table(TableId::CLASS_LAYOUT).iter() {
            if row.index(classlayout::PARENT)? == Some(type_def) {
                let size = row.int(classlayout::CLASS_SIZE)?;
                return Ok((size > 0).then_some(size));
            }
        }
        Ok(None)
    }

    fn resolve_custom_attributes(&mut self) -> Result<()> {
        let updates = {
            let resolver = GraphTypeResolver { graph: self };
            let mut updates = Vec::new();
            for (index, row) in self.tables.table(TableId::CUSTOM_ATTRIBUTE).iter() {
                let Blob::Bytes(bytes) = row.blob(customattribute::VALUE)? else {
                    continue;
                };
                let Some(constructor) = row.index(customattribute::TYPE)? else {
                    continue;
                };
                let Some(params) = self.method_params(constructor)? else {
                    continue;
                };

                match parse_custom_attribute(bytes, &params, &resolver) {
                    Ok(value) if encode_custom_attribute(&value).is_ok_and(|e| e == *bytes) => {
                        updates.push((index, Cell::Blob(Blob::CustomAttribute(value))));
                    }
                    Ok(_) => log::debug!(
                        "Custom attribute row {} does not re-encode identically, kept as bytes",
                        index.row + 1
                    ),
                    Err(error) => log::debug!(
                        "Custom attribute row {} kept as bytes: {}",
                        index.row + 1,
                        error
                    ),
                }
            }
            updates
        };

        for (index, cell) in updates {
            self.tables.set(index, customattribute::VALUE, cell)?;
        }
        Ok(())
    }

    /// Parameter types of a `MethodDef` or `MemberRef` with a method signature
    ///
    /// # Errors
    /// Returns an error if the row does not exist
    pub fn method_params(&self, method: TableIndex) -> Result<Option<Vec<TypeSignature>>> {
        let blob = match method.table {
            TableId::METHOD_DEF => self.tables.row(method)?.blob(methoddef::SIGNATURE)?,
            TableId::MEMBER_REF => self.tables.row(method)?.blob(memberref::SIGNATURE)?,
            _ => return Ok(None),
        };

        match blob {
            Blob::Method(signature) => Ok(Some(signature.params.clone())),
            _ => Ok(None),
        }
    }

    /// Nested type to enclosing type, from the `NestedClass` table
    ///
    /// # Errors
    /// Returns an error if a `NestedClass` row has null references
    pub fn nesting(&self) -> Result<HashMap<TableIndex, TableIndex>> {
        let mut nesting = HashMap::new();
        for (_, row) in self.tables.table(TableId::NESTED_CLASS).iter() {
            match (
                row.index(nestedclass::NESTED_CLASS)?,
                row.index(nestedclass::ENCLOSING_CLASS)?,
            ) {
                (Some(nested), Some(enclosing)) => {
                    nesting.insert(nested, enclosing);
                }
                _ => return Err(malformed_error!("NestedClass row with a null reference")),
            }
        }
        Ok(nesting)
    }

    /// The reflection-style full name of a `TypeDef` or `TypeRef`, nested types joined
    /// with `+`.
    ///
    /// # Errors
    /// Returns an error if `index` names another table or the nesting is cyclic
    pub fn full_name(&self, index: TableIndex) -> Result<String> {
        self.full_name_with(index, &self.nesting()?)
    }

    /// Like [`CilMetadata::full_name`], with a precomputed [`CilMetadata::nesting`] map
    ///
    /// # Errors
    /// Returns an error if `index` names another table or the nesting is cyclic
    pub fn full_name_with(
        &self,
        index: TableIndex,
        nesting: &HashMap<TableIndex, TableIndex>,
    ) -> Result<String> {
        let mut parts = Vec::new();
        let mut current = index;
        loop {
            if parts.len() > MAX_NESTING {
                return Err(Error::RecursionLimit(MAX_NESTING));
            }

            let row = self.tables.row(current)?;
            let (namespace, name, outer) = match current.table {
                TableId::TYPE_DEF => (
                    row.string(typedef::TYPE_NAMESPACE)?,
                    row.string(typedef::TYPE_NAME)?,
                    nesting.get(&current).copied(),
                ),
                TableId::TYPE_REF => (
                    row.string(typeref::TYPE_NAMESPACE)?,
                    row.string(typeref::TYPE_NAME)?,
                    row.index(typeref::RESOLUTION_SCOPE)?
                        .filter(|scope| scope.table == TableId::TYPE_REF),
                ),
                _ => {
                    return Err(malformed_error!(
                        "{} is neither a type definition nor a type reference",
                        current
                    ))
                }
            };

            parts.push(if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{namespace}.{name}")
            });

            match outer {
                Some(outer) => current = outer,
                None => break,
            }
        }

        parts.reverse();
        Ok(parts.join("+"))
    }

    /// The `TypeDef` whose member list contains a `Field` or `MethodDef` row
    ///
    /// # Errors
    /// Returns an error if a `TypeDef` list column is malformed
    pub fn declaring_type(&self, member: TableIndex) -> Result<Option<TableIndex>> {
        let column = match member.table {
            TableId::FIELD => typedef::FIELD_LIST,
            TableId::METHOD_DEF => typedef::METHOD_LIST,
            _ => return Ok(None),
        };

        for (index, _) in self.tables.table(TableId::TYPE_DEF).iter() {
            let (start, end) = self.tables.list_range(index, column)?;
            if (start..end).contains(&member.row) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// The name of the module
    ///
    /// # Errors
    /// Returns an error if the graph has no `Module` row
    pub fn module_name(&self) -> Result<&str> {
        self.tables
            .row(TableIndex::new(TableId::MODULE, 0))?
            .string(module::NAME)
    }

    /// The simple name of the assembly, if the module carries an `Assembly` row
    ///
    /// # Errors
    /// Returns an error if the row is malformed
    pub fn assembly_name(&self) -> Result<Option<&str>> {
        match self.tables.table(TableId::ASSEMBLY).get(0) {
            Some(row) => Ok(Some(row.string(assembly::NAME)?)),
            None => Ok(None),
        }
    }

    /// The `TypeDef` with the given reflection-style full name
    ///
    /// # Errors
    /// Returns an error if the type names cannot be computed
    pub fn find_type(&self, full_name: &str) -> Result<Option<TableIndex>> {
        let nesting = self.nesting()?;
        for (index, _) in self.tables.table(TableId::TYPE_DEF).iter() {
            if self.full_name_with(index, &nesting)? == full_name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// The underlying integer type of an in-module enum
    fn enum_underlying(&self, type_def: TableIndex) -> Option<CaElemType> {
        let row = self.tables.row(type_def).ok()?;
        let base = row.index(typedef::EXTENDS).ok()??;
        if self.full_name(base).ok()? != "System.Enum" {
            return None;
        }

        let (start, end) = self.tables.list_range(type_def, typedef::FIELD_LIST).ok()?;
        (start..end).find_map(|position| {
            let field_row = self.tables.row(TableIndex::new(TableId::FIELD, position)).ok()?;
            if field_row.int(field::FLAGS).ok()? & FieldAttributes::STATIC != 0 {
                return None;
            }
            match field_row.blob(field::SIGNATURE).ok()? {
                Blob::Field(signature) => primitive_elem_type(signature.field_type.unmodified()),
                _ => None,
            }
        })
    }

    /// Serialize the graph into a metadata root and its section content.
    ///
    /// Tables that must be sorted are sorted first, which rewrites references inside the
    /// graph; the returned permutation describes the moves.
    ///
    /// # Errors
    /// Returns an error if a row does not fit its schema or a heap overflows
    pub fn serialize(&mut self, options: &WriteOptions) -> Result<SerializedModule> {
        let permutation = self.tables.reorder_sorted(options.dedup)?;

        let mut heaps = HeapBuilders::new();
        let mut sections = SectionPartBuilder::new(options.text_rva);
        let tables = write_tables(&self.tables, &mut heaps, &mut sections)?;

        let HeapBuilders {
            strings,
            blob,
            guid,
            user_strings,
            custom,
        } = heaps;
        let mut streams = vec![
            ("#~", tables),
            ("#Strings", strings.finish()),
            ("#US", user_strings.finish()),
            ("#GUID", guid.finish()),
            ("#Blob", blob.finish()),
        ];
        for (name, builder) in custom {
            streams.push((name, builder.finish()));
        }

        let version = options.version.as_deref().unwrap_or(&self.version);
        let metadata = Root::write(version, &streams)?;
        log::debug!("Serialized metadata root of {} bytes", metadata.len());

        Ok(SerializedModule {
            metadata,
            sections: sections.finish(),
            permutation,
        })
    }
}

struct GraphTypeResolver<'a> {
    graph: &'a CilMetadata,
}

impl CaTypeResolver for GraphTypeResolver<'_> {
    fn enum_underlying(&self, index: TableIndex) -> Option<CaElemType> {
        match index.table {
            TableId::TYPE_DEF => self.graph.enum_underlying(index),
            _ => None,
        }
    }

    fn is_system_type(&self, index: TableIndex) -> bool {
        self.graph
            .full_name(index)
            .is_ok_and(|name| name == "System.Type")
    }

    fn enum_by_name(&self, name: &str) -> Option<CaElemType> {
        let spec = TypeNameSpec::parse(name).ok()?;
        let index = self.graph.find_type(&spec.name).ok()??;
        self.graph.enum_underlying(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode, Operand},
        metadata::{
            customattributes::{CaArgument, CaValue},
            signatures::SignatureMethod,
            tables::columns::constant,
        },
        test::builders::GraphBuilder,
    };
    use widestring::U16String;

    fn hello_body() -> MethodBody {
        MethodBody {
            max_stack: 8,
            init_locals: false,
            local_var_sig: None,
            instructions: vec![
                Instruction {
                    opcode: OpCode::Ldstr,
                    operand: Operand::String(U16String::from_str("hello")),
                },
                Instruction::simple(OpCode::Pop),
                Instruction::simple(OpCode::Ret),
            ],
            exception_handlers: Vec::new(),
        }
    }

    fn reread(graph: &mut CilMetadata) -> CilMetadata {
        let module = graph.serialize(&WriteOptions::default()).unwrap();
        let sections: Arc<dyn ImageSections> = Arc::new(module.sections);
        let mut read = CilMetadata::read(
            &module.metadata,
            graph.schema().clone(),
            Some(sections),
        )
        .unwrap();
        read.resolve_all().unwrap();
        read
    }

    #[test]
    fn round_trip_with_raw_data() {
        let mut builder = GraphBuilder::new("Test");
        let class = builder.class("N", "C");
        let method = builder.static_method(class, "Run", hello_body());
        let data_field = builder.field_with(
            class,
            FieldAttributes::STATIC | FieldAttributes::HAS_FIELD_RVA,
            "Data",
            TypeSignature::I8,
        );
        builder.field_rva(data_field, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        builder.resource("Embedded.bin", vec![0xCA, 0xFE]);
        let mut graph = builder.build();

        let read = reread(&mut graph);
        assert_eq!(read.tables(), graph.tables());

        let body = read
            .tables()
            .row(method)
            .unwrap()
            .raw_data(methoddef::RVA)
            .unwrap();
        match body {
            RawData::MethodBody(body) => assert_eq!(**body, hello_body()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn custom_attributes_are_parsed() {
        let mut builder = GraphBuilder::new("Test");
        let system = builder.assembly_ref("mscorlib");
        let attribute = builder.type_ref(Some(system), "System", "ObsoleteAttribute");
        let constructor = builder.member_ref(
            attribute,
            ".ctor",
            Blob::Method(SignatureMethod {
                has_this: true,
                params: vec![TypeSignature::String],
                ..SignatureMethod::default()
            }),
        );
        let class = builder.class("N", "C");
        let mut blob = vec![0x01, 0x00, 0x03, b'o', b'l', b'd', 0x00, 0x00];
        builder.custom_attribute(class, constructor, blob.clone());
        let mut graph = builder.build();

        let read = reread(&mut graph);
        let row = read
            .tables()
            .row(TableIndex::new(TableId::CUSTOM_ATTRIBUTE, 0))
            .unwrap();
        match row.blob(customattribute::VALUE).unwrap() {
            Blob::CustomAttribute(value) => assert_eq!(
                value.fixed_args,
                vec![CaArgument {
                    ty: CaElemType::String,
                    value: CaValue::String(Some("old".to_string())),
                }]
            ),
            other => panic!("unexpected {other:?}"),
        }

        // Trailing bytes do not parse and stay raw
        blob.push(0xFF);
        graph
            .tables_mut()
            .set(
                TableIndex::new(TableId::CUSTOM_ATTRIBUTE, 0),
                customattribute::VALUE,
                Cell::Blob(Blob::Bytes(blob.clone())),
            )
            .unwrap();
        let read = reread(&mut graph);
        let row = read
            .tables()
            .row(TableIndex::new(TableId::CUSTOM_ATTRIBUTE, 0))
            .unwrap();
        assert_eq!(row.blob(customattribute::VALUE).unwrap(), &Blob::Bytes(blob));
    }

    #[test]
    fn enums_resolve_through_value_field() {
        let mut builder = GraphBuilder::new("Test");
        let system = builder.assembly_ref("mscorlib");
        let enum_base = builder.type_ref(Some(system), "System", "Enum");
        let color = builder.class_with(0x101, "N", "Color", Some(enum_base));
        builder.field_with(color, 0x0606, "value__", TypeSignature::U2);
        builder.field_with(
            color,
            FieldAttributes::STATIC | FieldAttributes::LITERAL,
            "Red",
            TypeSignature::ValueType(color),
        );
        let graph = builder.build();

        let resolver = GraphTypeResolver { graph: &graph };
        assert_eq!(resolver.enum_underlying(color), Some(CaElemType::U2));
        assert_eq!(resolver.enum_by_name("N.Color, Test"), Some(CaElemType::U2));
        assert_eq!(resolver.enum_underlying(enum_base), None);
        assert!(!resolver.is_system_type(enum_base));
    }

    #[test]
    fn names_and_owners() {
        let mut builder = GraphBuilder::new("Test");
        let outer = builder.class("N", "Outer");
        let first = builder.field(outer, "a");
        let inner = builder.class("", "Inner");
        builder.nested(inner, outer);
        let second = builder.field(inner, "b");
        let graph = builder.build();

        assert_eq!(graph.full_name(inner).unwrap(), "N.Outer+Inner");
        assert_eq!(graph.find_type("N.Outer+Inner").unwrap(), Some(inner));
        assert_eq!(graph.declaring_type(first).unwrap(), Some(outer));
        assert_eq!(graph.declaring_type(second).unwrap(), Some(inner));
        assert_eq!(graph.module_name().unwrap(), "Test.dll");
        assert_eq!(graph.assembly_name().unwrap(), Some("Test"));
    }

    #[test]
    fn unresolved_without_sections() {
        let mut builder = GraphBuilder::new("Test");
        let class = builder.class("N", "C");
        builder.static_method(class, "Run", hello_body());
        let field_index = builder.field(class, "Answer");
        builder.constant(field_index, crate::metadata::constant::ConstantValue::I4(42));
        let mut graph = builder.build();

        let module = graph.serialize(&WriteOptions::default()).unwrap();
        let mut read = CilMetadata::read(&module.metadata, graph.schema().clone(), None).unwrap();
        assert!(!read.is_resolved());
        read.resolve_all().unwrap();
        assert!(read.is_resolved());

        let method = read
            .tables()
            .row(TableIndex::new(TableId::METHOD_DEF, 0))
            .unwrap();
        assert_eq!(
            method.raw_data(methoddef::RVA).unwrap(),
            &RawData::Unresolved(0x2000)
        );
        let constant_row = read
            .tables()
            .row(TableIndex::new(TableId::CONSTANT, 0))
            .unwrap();
        assert_eq!(constant_row.index(constant::PARENT).unwrap(), Some(field_index));
    }

    #[test]
    fn field_data_sizes() {
        let mut builder = GraphBuilder::new("Test");
        let blob = builder.class_with(0x0113, "", "Blob16", None);
        builder.class_layout(blob, 1, 16);
        let class = builder.class("N", "C");
        let sized = builder.field_with(class, 0x0113, "Sized", TypeSignature::ValueType(blob));
        let unsized_field = builder.field_with(
            class,
            0x0113,
            "Unknown",
            TypeSignature::SzArray(Box::new(TypeSignature::U1)),
        );
        let graph = builder.build();

        assert_eq!(graph.field_data_size(sized).unwrap(), Some(16));
        assert_eq!(graph.field_data_size(unsized_field).unwrap(), None);
    }
}
