//! Benchmarks for the table engine.
//!
//! Measures the three expensive steps of writing and reading a module:
//! - Sorting tables and rewriting the references into them
//! - Serializing a graph into a metadata root
//! - Reading a metadata root and resolving its rows

extern crate cilmerge;

use cilmerge::{
    assembly::{Instruction, OpCode, Operand},
    metadata::{
        graph::{CilMetadata, WriteOptions},
        method::MethodBody,
        sections::ImageSections,
        signatures::{SignatureField, SignatureMethod, TypeSignature},
        tables::{Blob, Cell, RawData, TableId, TableIndex, Tables},
    },
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::{hint::black_box, sync::Arc};

/// A module with `types` classes of four fields and four methods each, plus one generic
/// parameter per class pushed in reverse owner order so sorting has work to do.
fn build_graph(types: u32) -> CilMetadata {
    let mut tables = Tables::default();
    tables
        .push(
            TableId::MODULE,
            vec![
                Cell::Int(0),
                Cell::str("Bench.dll"),
                Cell::Guid(None),
                Cell::Guid(None),
                Cell::Guid(None),
            ],
        )
        .unwrap();
    push_type(&mut tables, "", "<Module>", 0);

    let mut owners = Vec::with_capacity(types as usize);
    for index in 0..types {
        owners.push(push_type(&mut tables, "Bench", &format!("Type{index}"), 0x0000_0001));
        for field in 0..4 {
            tables
                .push(
                    TableId::FIELD,
                    vec![
                        Cell::Int(0x0006),
                        Cell::str(&format!("field{field}")),
                        Cell::Blob(Blob::Field(SignatureField {
                            field_type: TypeSignature::I4,
                        })),
                    ],
                )
                .unwrap();
        }
        for method in 0..4 {
            let body = MethodBody {
                max_stack: 8,
                init_locals: false,
                local_var_sig: None,
                instructions: vec![
                    Instruction::new(OpCode::LdcI4, Operand::Int32(method)).unwrap(),
                    Instruction::simple(OpCode::Pop),
                    Instruction::simple(OpCode::Ret),
                ],
                exception_handlers: Vec::new(),
            };
            let params = tables.len(TableId::PARAM) as u32;
            tables
                .push(
                    TableId::METHOD_DEF,
                    vec![
                        Cell::RawData(RawData::MethodBody(Box::new(body))),
                        Cell::Int(0),
                        Cell::Int(0x0016),
                        Cell::str(&format!("Method{method}")),
                        Cell::Blob(Blob::Method(SignatureMethod::default())),
                        Cell::list(TableId::PARAM, params),
                    ],
                )
                .unwrap();
        }
    }

    for owner in owners.into_iter().rev() {
        tables
            .push(
                TableId::GENERIC_PARAM,
                vec![
                    Cell::Int(0),
                    Cell::Int(0),
                    Cell::index(owner),
                    Cell::str("T"),
                ],
            )
            .unwrap();
    }

    CilMetadata::from_tables(tables)
}

fn push_type(tables: &mut Tables, namespace: &str, name: &str, flags: u32) -> TableIndex {
    let fields = tables.len(TableId::FIELD) as u32;
    let methods = tables.len(TableId::METHOD_DEF) as u32;
    tables
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

/// Benchmark sorting 1000 generic parameters into owner order.
fn bench_reorder_sorted(c: &mut Criterion) {
    let graph = build_graph(1000);

    c.bench_function("tables_reorder_sorted_1000", |b| {
        b.iter_batched(
            || graph.tables().clone(),
            |mut tables| black_box(tables.reorder_sorted(false).unwrap()),
            criterion::BatchSize::LargeInput,
        );
    });
}

/// Benchmark serializing 1000 types, 4000 fields and 4000 method bodies.
fn bench_serialize(c: &mut Criterion) {
    let graph = build_graph(1000);

    c.bench_function("tables_serialize_1000_types", |b| {
        b.iter_batched(
            || graph.clone(),
            |mut graph| black_box(graph.serialize(&WriteOptions::default()).unwrap()),
            criterion::BatchSize::LargeInput,
        );
    });
}

/// Benchmark reading the same module back, with and without resolving raw data.
fn bench_read(c: &mut Criterion) {
    let mut graph = build_graph(1000);
    let module = graph.serialize(&WriteOptions::default()).unwrap();
    let schema = graph.schema().clone();
    let sections: Arc<dyn ImageSections> = Arc::new(module.sections);

    c.bench_function("tables_read_1000_types", |b| {
        b.iter(|| {
            let read = CilMetadata::read(black_box(&module.metadata), schema.clone(), None);
            black_box(read.unwrap())
        });
    });
    c.bench_function("tables_read_and_resolve_1000_types", |b| {
        b.iter(|| {
            let mut read = CilMetadata::read(
                black_box(&module.metadata),
                schema.clone(),
                Some(sections.clone()),
            )
            .unwrap();
            read.resolve_all().unwrap();
            black_box(read)
        });
    });
}

criterion_group!(benches, bench_reorder_sorted, bench_serialize, bench_read);
criterion_main!(benches);
