//! A builder for small in-memory metadata graphs.
//!
//! Rows go straight into [`Tables`], so list columns must be built in order: fields and
//! methods always belong to the most recently added class.

use crate::metadata::{
    constant::ConstantValue,
    flags::{MethodAttributes, TypeAttributes},
    graph::CilMetadata,
    method::MethodBody,
    signatures::{SignatureField, SignatureMethod, TypeSignature},
    tables::{Blob, Cell, RawData, TableId, TableIndex, Tables},
};

pub struct GraphBuilder {
    tables: Tables,
    current: Option<TableIndex>,
}

impl GraphBuilder {
    /// A module `{name}.dll` of the assembly `name` with its `<Module>` type
    pub fn new(name: &str) -> Self {
        let mut tables = Tables::default();
        tables
            .push(
                TableId::MODULE,
                vec![
                    Cell::Int(0),
                    Cell::str(&format!("{name}.dll")),
                    Cell::Guid(Some(uguid::guid!("01234567-89ab-cdef-0123-456789abcdef"))),
                    Cell::Guid(None),
                    Cell::Guid(None),
                ],
            )
            .unwrap();
        tables
            .push(
                TableId::ASSEMBLY,
                vec![
                    Cell::Int(0x8004),
                    Cell::Int(1),
                    Cell::Int(0),
                    Cell::Int(0),
                    Cell::Int(0),
                    Cell::Int(0),
                    Cell::Blob(Blob::Bytes(Vec::new())),
                    Cell::str(name),
                    Cell::str(""),
                ],
            )
            .unwrap();

        let mut builder = GraphBuilder {
            tables,
            current: None,
        };
        builder.class_with(0, "", "<Module>", None);
        builder
    }

    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }

    pub fn class(&mut self, namespace: &str, name: &str) -> TableIndex {
        self.class_with(TypeAttributes::PUBLIC, namespace, name, None)
    }

    pub fn class_with(
        &mut self,
        flags: u32,
        namespace: &str,
        name: &str,
        extends: Option<TableIndex>,
    ) -> TableIndex {
        let fields = self.tables.len(TableId::FIELD) as u32;
        let methods = self.tables.len(TableId::METHOD_DEF) as u32;
        let index = self
            .tables
            .push(
                TableId::TYPE_DEF,
                vec![
                    Cell::Int(flags),
                    Cell::str(name),
                    Cell::str(namespace),
                    Cell::Index(extends),
                    Cell::list(TableId::FIELD, fields),
                    Cell::list(TableId::METHOD_DEF, methods),
                ],
            )
            .unwrap();
        self.current = Some(index);
        index
    }

    fn check_owner(&self, owner: TableIndex) {
        assert_eq!(
            self.current,
            Some(owner),
            "members must be added to the most recent class"
        );
    }

    pub fn field(&mut self, owner: TableIndex, name: &str) -> TableIndex {
        self.field_with(owner, 0x0006, name, TypeSignature::I4)
    }

    pub fn field_with(
        &mut self,
        owner: TableIndex,
        flags: u32,
        name: &str,
        field_type: TypeSignature,
    ) -> TableIndex {
        self.check_owner(owner);
        self.tables
            .push(
                TableId::FIELD,
                vec![
                    Cell::Int(flags),
                    Cell::str(name),
                    Cell::Blob(Blob::Field(SignatureField { field_type })),
                ],
            )
            .unwrap()
    }

    /// An instance method returning void
    pub fn method(&mut self, owner: TableIndex, name: &str, body: MethodBody) -> TableIndex {
        let signature = SignatureMethod {
            has_this: true,
            ..SignatureMethod::default()
        };
        self.method_with(owner, MethodAttributes::PUBLIC, name, signature, Some(body))
    }

    /// A static method returning void
    pub fn static_method(&mut self, owner: TableIndex, name: &str, body: MethodBody) -> TableIndex {
        self.method_with(
            owner,
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            name,
            SignatureMethod::default(),
            Some(body),
        )
    }

    pub fn cctor(&mut self, owner: TableIndex, body: MethodBody) -> TableIndex {
        self.method_with(
            owner,
            MethodAttributes::STATIC
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME,
            ".cctor",
            SignatureMethod::default(),
            Some(body),
        )
    }

    pub fn method_with(
        &mut self,
        owner: TableIndex,
        flags: u32,
        name: &str,
        signature: SignatureMethod,
        body: Option<MethodBody>,
    ) -> TableIndex {
        self.check_owner(owner);
        let params = self.tables.len(TableId::PARAM) as u32;
        let rva = match body {
            Some(body) => RawData::MethodBody(Box::new(body)),
            None => RawData::None,
        };
        self.tables
            .push(
                TableId::METHOD_DEF,
                vec![
                    Cell::RawData(rva),
                    Cell::Int(0),
                    Cell::Int(flags),
                    Cell::str(name),
                    Cell::Blob(Blob::Method(signature)),
                    Cell::list(TableId::PARAM, params),
                ],
            )
            .unwrap()
    }

    pub fn assembly_ref(&mut self, name: &str) -> TableIndex {
        self.tables
            .push(
                TableId::ASSEMBLY_REF,
                vec![
                    Cell::Int(4),
                    Cell::Int(0),
                    Cell::Int(0),
                    Cell::Int(0),
                    Cell::Int(0),
                    Cell::Blob(Blob::Bytes(Vec::new())),
                    Cell::str(name),
                    Cell::str(""),
                    Cell::Blob(Blob::Bytes(Vec::new())),
                ],
            )
            .unwrap()
    }

    pub fn module_ref(&mut self, name: &str) -> TableIndex {
        self.tables
            .push(TableId::MODULE_REF, vec![Cell::str(name)])
            .unwrap()
    }

    pub fn type_ref(&mut self, scope: Option<TableIndex>, namespace: &str, name: &str) -> TableIndex {
        self.tables
            .push(
                TableId::TYPE_REF,
                vec![Cell::Index(scope), Cell::str(name), Cell::str(namespace)],
            )
            .unwrap()
    }

    pub fn type_spec(&mut self, signature: TypeSignature) -> TableIndex {
        self.tables
            .push(TableId::TYPE_SPEC, vec![Cell::Blob(Blob::TypeSpec(signature))])
            .unwrap()
    }

    pub fn member_ref(&mut self, class: TableIndex, name: &str, signature: Blob) -> TableIndex {
        self.tables
            .push(
                TableId::MEMBER_REF,
                vec![Cell::index(class), Cell::str(name), Cell::Blob(signature)],
            )
            .unwrap()
    }

    pub fn nested(&mut self, nested: TableIndex, enclosing: TableIndex) -> TableIndex {
        self.tables
            .push(
                TableId::NESTED_CLASS,
                vec![Cell::index(nested), Cell::index(enclosing)],
            )
            .unwrap()
    }

    pub fn custom_attribute(
        &mut self,
        parent: TableIndex,
        constructor: TableIndex,
        value: Vec<u8>,
    ) -> TableIndex {
        self.tables
            .push(
                TableId::CUSTOM_ATTRIBUTE,
                vec![
                    Cell::index(parent),
                    Cell::index(constructor),
                    Cell::Blob(Blob::Bytes(value)),
                ],
            )
            .unwrap()
    }

    pub fn constant(&mut self, parent: TableIndex, value: ConstantValue) -> TableIndex {
        let element_type = value.element_type();
        self.tables
            .push(
                TableId::CONSTANT,
                vec![
                    Cell::Int(u32::from(element_type)),
                    Cell::Int(0),
                    Cell::index(parent),
                    Cell::Blob(Blob::Constant(value)),
                ],
            )
            .unwrap()
    }

    pub fn class_layout(&mut self, parent: TableIndex, packing: u32, size: u32) -> TableIndex {
        self.tables
            .push(
                TableId::CLASS_LAYOUT,
                vec![Cell::Int(packing), Cell::Int(size), Cell::index(parent)],
            )
            .unwrap()
    }

    pub fn field_rva(&mut self, field: TableIndex, data: Vec<u8>) -> TableIndex {
        self.tables
            .push(
                TableId::FIELD_RVA,
                vec![Cell::RawData(RawData::FieldData(data)), Cell::index(field)],
            )
            .unwrap()
    }

    pub fn resource(&mut self, name: &str, data: Vec<u8>) -> TableIndex {
        self.tables
            .push(
                TableId::MANIFEST_RESOURCE,
                vec![
                    Cell::RawData(RawData::Resource(data)),
                    Cell::Int(1),
                    Cell::str(name),
                    Cell::Index(None),
                ],
            )
            .unwrap()
    }

    pub fn generic_param(&mut self, owner: TableIndex, number: u32, name: &str) -> TableIndex {
        self.tables
            .push(
                TableId::GENERIC_PARAM,
                vec![
                    Cell::Int(number),
                    Cell::Int(0),
                    Cell::index(owner),
                    Cell::str(name),
                ],
            )
            .unwrap()
    }

    pub fn build(self) -> CilMetadata {
        CilMetadata::from_tables(self.tables)
    }
}
