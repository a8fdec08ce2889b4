//! Shared helpers for the integration tests: a small module builder over the public table
//! API and method body shorthands.

#![allow(dead_code)]

use cilmerge::{
    assembly::{Instruction, OpCode},
    metadata::{
        flags::{MethodAttributes, TypeAttributes},
        graph::{CilMetadata, WriteOptions},
        method::MethodBody,
        sections::ImageSections,
        signatures::{SignatureField, SignatureMethod, TypeSignature},
        tables::{Blob, Cell, RawData, TableId, TableIndex, Tables},
    },
};
use std::sync::Arc;

/// Builds one module. Fields and methods belong to the most recently added class.
pub struct ModuleBuilder {
    tables: Tables,
}

impl ModuleBuilder {
    /// The module `{name}.dll` of the assembly `name`, with its `<Module>` type
    pub fn new(name: &str) -> Self {
        let mut tables = Tables::default();
        tables
            .push(
                TableId::MODULE,
                vec![
                    Cell::Int(0),
                    Cell::str(&format!("{name}.dll")),
                    Cell::Guid(Some(uguid::guid!("6f1d8c21-3b7e-4f0a-9d52-8a1c0e7b4d93"))),
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

        let mut builder = ModuleBuilder { tables };
        builder.class_with(0, "", "<Module>");
        builder
    }

    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }

    pub fn class(&mut self, namespace: &str, name: &str) -> TableIndex {
        self.class_with(TypeAttributes::PUBLIC, namespace, name)
    }

    pub fn class_with(&mut self, flags: u32, namespace: &str, name: &str) -> TableIndex {
        let fields = self.tables.len(TableId::FIELD) as u32;
        let methods = self.tables.len(TableId::METHOD_DEF) as u32;
        self.tables
            .push(
                TableId::TYPE_DEF,
                vec![
                    Cell::Int(flags),
                    Cell::str(name),
                    Cell::str(namespace),
                    Cell::Index(None),
                    Cell::list(TableId::FIELD, fields),
                    Cell::list(TableId::METHOD_DEF, methods),
                ],
            )
            .unwrap()
    }

    pub fn field(&mut self, name: &str) -> TableIndex {
        self.tables
            .push(
                TableId::FIELD,
                vec![
                    Cell::Int(0x0006),
                    Cell::str(name),
                    Cell::Blob(Blob::Field(SignatureField {
                        field_type: TypeSignature::I4,
                    })),
                ],
            )
            .unwrap()
    }

    pub fn static_method(&mut self, name: &str, body: MethodBody) -> TableIndex {
        self.method_with(
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            name,
            body,
        )
    }

    pub fn cctor(&mut self, body: MethodBody) -> TableIndex {
        self.method_with(
            MethodAttributes::STATIC
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME,
            ".cctor",
            body,
        )
    }

    fn method_with(&mut self, flags: u32, name: &str, body: MethodBody) -> TableIndex {
        let params = self.tables.len(TableId::PARAM) as u32;
        self.tables
            .push(
                TableId::METHOD_DEF,
                vec![
                    Cell::RawData(RawData::MethodBody(Box::new(body))),
                    Cell::Int(0),
                    Cell::Int(flags),
                    Cell::str(name),
                    Cell::Blob(Blob::Method(SignatureMethod::default())),
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
                    Cell::Int(1),
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

    pub fn type_ref(&mut self, scope: TableIndex, namespace: &str, name: &str) -> TableIndex {
        self.tables
            .push(
                TableId::TYPE_REF,
                vec![Cell::index(scope), Cell::str(name), Cell::str(namespace)],
            )
            .unwrap()
    }

    pub fn build(self) -> CilMetadata {
        CilMetadata::from_tables(self.tables)
    }
}

pub fn body(instructions: Vec<Instruction>) -> MethodBody {
    MethodBody {
        max_stack: 8,
        init_locals: false,
        local_var_sig: None,
        instructions,
        exception_handlers: Vec::new(),
    }
}

/// `nop; ret`
pub fn trivial_body() -> MethodBody {
    body(vec![
        Instruction::simple(OpCode::Nop),
        Instruction::simple(OpCode::Ret),
    ])
}

/// Serialize `graph` and read the result back with every raw data reference resolved
pub fn reread(graph: &mut CilMetadata) -> CilMetadata {
    let module = graph.serialize(&WriteOptions::default()).unwrap();
    let sections: Arc<dyn ImageSections> = Arc::new(module.sections);
    let mut read =
        CilMetadata::read(&module.metadata, graph.schema().clone(), Some(sections)).unwrap();
    read.resolve_all().unwrap();
    read
}

/// Full names of every type definition, in table order
pub fn type_names(graph: &CilMetadata) -> Vec<String> {
    graph
        .tables()
        .table(TableId::TYPE_DEF)
        .iter()
        .map(|(index, _)| graph.full_name(index).unwrap())
        .collect()
}
