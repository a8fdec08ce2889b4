//! End-to-end merges of synthetic modules.

mod common;

use std::sync::Mutex;

use cilmerge::{
    assembly::{resolve_targets, Instruction, LabelMap, OpCode, Operand},
    collaborators::{DebugInput, MergedFunction, PdbWriter},
    loader::MemoryResolver,
    merge::{compile_patterns, parse_rename_mapping, splice_bodies, TokenRemapper},
    metadata::{
        flags::TypeAttributes,
        graph::WriteOptions,
        signatures::{SignatureField, TypeSignature},
        tables::{
            columns::{field, methoddef, module, typedef},
            Blob, Cell, RawData, TableId, TableIndex,
        },
    },
    prelude::*,
};

use common::{type_names, ModuleBuilder};

fn field_names(graph: &CilMetadata) -> Vec<String> {
    graph
        .tables()
        .table(TableId::FIELD)
        .iter()
        .map(|(_, row)| row.string(field::NAME).unwrap().to_string())
        .collect()
}

fn method_names(graph: &CilMetadata) -> Vec<String> {
    graph
        .tables()
        .table(TableId::METHOD_DEF)
        .iter()
        .map(|(_, row)| row.string(methoddef::NAME).unwrap().to_string())
        .collect()
}

/// `N.C` with the given fields and static methods
fn module_with_c(assembly: &str, fields: &[&str], methods: &[&str]) -> CilMetadata {
    let mut builder = ModuleBuilder::new(assembly);
    builder.class("N", "C");
    for name in fields {
        builder.field(name);
    }
    for name in methods {
        builder.static_method(name, common::trivial_body());
    }
    builder.build()
}

fn merge_default(inputs: &[&CilMetadata], options: &MergeOptions) -> Result<MergeResult> {
    merge(inputs, options, &Collaborators::default())
}

#[test]
fn a_single_input_is_reproduced() {
    let mut builder = ModuleBuilder::new("Solo");
    let system = builder.assembly_ref("mscorlib");
    let console = builder.type_ref(system, "System", "Console");
    let write_line = builder
        .tables_mut()
        .push(
            TableId::MEMBER_REF,
            vec![
                Cell::index(console),
                Cell::str("WriteLine"),
                Cell::Blob(Blob::Method(Default::default())),
            ],
        )
        .unwrap();
    builder.class("Solo", "Program");
    builder.field("count");
    builder.static_method(
        "Main",
        common::body(vec![
            Instruction::new(OpCode::Call, Operand::Token(write_line)).unwrap(),
            Instruction::simple(OpCode::Ret),
        ]),
    );
    builder.class("Solo", "Helper");
    builder.static_method("Help", common::trivial_body());
    let solo = builder.build();

    let result = merge_default(&[&solo], &MergeOptions::default()).unwrap();
    assert!(result.warnings.is_empty());
    assert!(result.type_renames[0].is_empty());
    assert_eq!(type_names(&result.target), type_names(&solo));
    for table in [
        TableId::TYPE_DEF,
        TableId::FIELD,
        TableId::METHOD_DEF,
        TableId::TYPE_REF,
        TableId::MEMBER_REF,
        TableId::ASSEMBLY_REF,
    ] {
        assert_eq!(
            result.target.tables().table(table).rows(),
            solo.tables().table(table).rows(),
            "{table}"
        );
    }
    assert_eq!(result.target.module_name().unwrap(), "Solo.dll");
    assert_eq!(result.target.assembly_name().unwrap(), Some("Solo"));
    assert_eq!(result.functions.len(), 2);
}

#[test]
fn duplicate_types_fail_by_default() {
    let first = module_with_c("A", &["a"], &["M"]);
    let second = module_with_c("B", &["b"], &["N"]);

    let error = merge_default(&[&first, &second], &MergeOptions::default()).unwrap_err();
    assert!(matches!(&error, Error::DuplicateType(name) if name == "N.C"));
    assert_eq!(error.exit_code(), ExitCode::DuplicateTypeName);
}

#[test]
fn union_merges_duplicate_types_into_one() {
    let first = module_with_c("A", &["a", "shared"], &["M"]);
    let second = module_with_c("B", &["shared", "b"], &["N"]);

    let result = merge_default(&[&first, &second], &MergeOptions::default().union(true)).unwrap();
    let target = &result.target;
    assert_eq!(type_names(target), ["<Module>", "N.C"]);

    let c = target.find_type("N.C").unwrap().unwrap();
    let (start, end) = target.tables().list_range(c, typedef::FIELD_LIST).unwrap();
    assert_eq!((start, end), (0, 3));
    assert_eq!(field_names(target), ["a", "shared", "b"]);
    assert_eq!(method_names(target), ["M", "N"]);

    // Both copies of the shared field are the one target row
    let shared = result
        .remapper
        .remap(0, TableIndex::new(TableId::FIELD, 1))
        .unwrap();
    assert_eq!(
        result.remapper.remap(1, TableIndex::new(TableId::FIELD, 0)),
        Some(shared)
    );
}

#[test]
fn auto_rename_appends_a_counter() {
    let first = module_with_c("A", &[], &[]);
    let second = module_with_c("B", &[], &[]);
    let third = module_with_c("C", &[], &[]);

    let options = MergeOptions::default().duplicates(DuplicatePolicy::AutoRename);
    let result = merge_default(&[&first, &second, &third], &options).unwrap();
    assert_eq!(
        type_names(&result.target),
        ["<Module>", "N.C", "N.C_2", "N.C_3"]
    );
    assert!(result.type_renames[0].is_empty());
    assert_eq!(result.type_renames[1]["N.C"], "N.C_2");
    assert_eq!(result.type_renames[2]["N.C"], "N.C_3");
}

#[test]
fn explicit_renames_take_precedence() {
    let first = module_with_c("A", &[], &[]);
    let second = module_with_c("B", &[], &[]);

    let renames = parse_rename_mapping("# second copy\nN.C = N.SecondC\n").unwrap();
    let options = MergeOptions::default()
        .duplicates(DuplicatePolicy::AutoRename)
        .renames(renames);
    let result = merge_default(&[&first, &second], &options).unwrap();
    assert_eq!(type_names(&result.target), ["<Module>", "N.C", "N.SecondC"]);
}

#[test]
fn static_constructor_branches_are_fixed_up() {
    let with_skip = |skipped: usize| {
        let mut instructions = vec![Instruction::branch(OpCode::BrS, skipped as i32)];
        instructions.extend(std::iter::repeat(Instruction::simple(OpCode::Nop)).take(skipped));
        instructions.push(Instruction::simple(OpCode::Ret));
        common::body(instructions)
    };
    let (first_skip, second_skip) = (3, 5);
    let first = with_skip(first_skip);
    let second = with_skip(second_skip);

    let merged = splice_bodies(&[first.clone(), second.clone()], &[0, 0]).unwrap();
    let instructions = &merged.instructions;
    let targets = resolve_targets(instructions).unwrap();

    // The first return now jumps to the start of the second body
    let first_ret = first_skip + 1;
    let second_start = first_ret + 1;
    assert_eq!(instructions[first_ret].opcode, OpCode::Br);
    assert_eq!(targets[first_ret], vec![second_start]);

    // Both skips still land on their body's last instruction
    assert!(instructions[0].is_branch());
    assert_eq!(targets[0], vec![first_ret]);
    assert!(instructions[second_start].is_branch());
    assert_eq!(targets[second_start], vec![second_start + second_skip + 1]);
    assert_eq!(instructions.last().unwrap().opcode, OpCode::Ret);
    assert_eq!(instructions.len(), first.instructions.len() + second.instructions.len());

    let size: usize = instructions.iter().map(Instruction::size).sum();
    assert_eq!(LabelMap::new(instructions).code_size() as usize, size);
    assert_eq!(merged.code_size(), size);
}

#[test]
fn unioned_static_constructors_run_in_input_order() {
    let mut builder = ModuleBuilder::new("A");
    builder.class("N", "C");
    builder.field("first");
    builder.cctor(common::trivial_body());
    let first = builder.build();

    let mut builder = ModuleBuilder::new("B");
    builder.class("N", "C");
    builder.field("second");
    builder.cctor(common::body(vec![
        Instruction::simple(OpCode::Nop),
        Instruction::simple(OpCode::Nop),
        Instruction::simple(OpCode::Ret),
    ]));
    let second = builder.build();

    let result = merge_default(&[&first, &second], &MergeOptions::default().union(true)).unwrap();
    assert_eq!(method_names(&result.target), [".cctor"]);
    let row = result
        .target
        .tables()
        .row(TableIndex::new(TableId::METHOD_DEF, 0))
        .unwrap();
    let RawData::MethodBody(body) = row.raw_data(methoddef::RVA).unwrap() else {
        panic!("spliced body missing");
    };
    let opcodes: Vec<OpCode> = body.instructions.iter().map(|i| i.opcode).collect();
    assert_eq!(
        opcodes,
        [OpCode::Nop, OpCode::Br, OpCode::Nop, OpCode::Nop, OpCode::Ret]
    );
}

#[test]
fn secondary_types_can_be_internalized() {
    let first = module_with_c("A", &[], &[]);
    let mut builder = ModuleBuilder::new("B");
    builder.class("B", "Internal");
    builder.class("B", "KeptPublic");
    let second = builder.build();

    let patterns = compile_patterns("KeptPublic$\n").unwrap();
    let options = MergeOptions::default()
        .internalize(true)
        .internalize_exclude(patterns);
    let result = merge_default(&[&first, &second], &options).unwrap();
    let target = &result.target;

    let flags_of = |name: &str| {
        let index = target.find_type(name).unwrap().unwrap();
        target.tables().row(index).unwrap().int(typedef::FLAGS).unwrap()
    };
    assert_eq!(flags_of("N.C") & TypeAttributes::PUBLIC, TypeAttributes::PUBLIC);
    assert_eq!(flags_of("B.Internal") & TypeAttributes::PUBLIC, 0);
    assert_eq!(flags_of("B.KeptPublic") & TypeAttributes::PUBLIC, TypeAttributes::PUBLIC);
}

#[test]
fn identity_overrides_apply_to_the_target() {
    let first = module_with_c("A", &[], &[]);
    let options = MergeOptions::default()
        .target_assembly_name("Merged")
        .target_module_name("Merged.dll")
        .version("2.1.0.7".parse().unwrap());
    let result = merge_default(&[&first], &options).unwrap();

    assert_eq!(result.target.assembly_name().unwrap(), Some("Merged"));
    let module_row = result
        .target
        .tables()
        .row(TableIndex::new(TableId::MODULE, 0))
        .unwrap();
    assert_eq!(module_row.string(module::NAME).unwrap(), "Merged.dll");
}

#[test]
fn empty_input_lists_are_rejected() {
    let error = merge_default(&[], &MergeOptions::default()).unwrap_err();
    assert!(matches!(error, Error::NoInputs));
    assert_eq!(error.exit_code(), ExitCode::NoInputAssembly);
}

#[test]
fn merged_graphs_serialize() {
    let first = module_with_c("A", &["a"], &["M"]);
    let second = module_with_c("B", &["b"], &["N"]);
    let mut result =
        merge_default(&[&first, &second], &MergeOptions::default().union(true)).unwrap();

    let read = common::reread(&mut result.target);
    assert_eq!(read.tables(), result.target.tables());
    assert_eq!(method_names(&read), ["M", "N"]);
}

#[derive(Default)]
struct RecordingPdb {
    seen: Mutex<Vec<(MergedFunction, Option<TableIndex>)>>,
}

impl PdbWriter for RecordingPdb {
    fn write(
        &self,
        remapper: &TokenRemapper,
        inputs: &[DebugInput],
        functions: &[MergedFunction],
    ) -> Result<Vec<u8>> {
        let mut seen = self.seen.lock().unwrap();
        for function in functions {
            seen.push((*function, remapper.remap(function.input, function.original)));
        }
        Ok(vec![inputs.len() as u8])
    }
}

#[test]
fn debug_writers_see_every_function_with_its_new_token() {
    let first = module_with_c("A", &[], &["M"]);
    let second = module_with_c("B", &[], &["N"]);
    let result = merge_default(&[&first, &second], &MergeOptions::default().union(true)).unwrap();

    let pdb = RecordingPdb::default();
    let inputs = vec![DebugInput::default(), DebugInput::default()];
    assert_eq!(result.debug_directory(&pdb, &inputs).unwrap(), vec![2]);

    let seen = pdb.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for (function, remapped) in seen.iter() {
        assert_eq!(*remapped, Some(function.merged));
        assert_eq!(function.original, TableIndex::new(TableId::METHOD_DEF, 0));
    }
}

#[test]
fn loaded_closures_merge_into_one_module() {
    let mut builder = ModuleBuilder::new("App");
    let lib = builder.assembly_ref("Lib");
    let helper = builder.type_ref(lib, "Lib", "Helper");
    builder
        .tables_mut()
        .push(
            TableId::MEMBER_REF,
            vec![
                Cell::index(helper),
                Cell::str("Count"),
                Cell::Blob(Blob::Field(SignatureField {
                    field_type: TypeSignature::I4,
                })),
            ],
        )
        .unwrap();
    builder.class("App", "Program");
    let mut app = builder.build();

    let mut builder = ModuleBuilder::new("Lib");
    builder.class("Lib", "Helper");
    builder.field("Count");
    let mut lib_graph = builder.build();

    let resolver = MemoryResolver::new();
    let options = WriteOptions::default();
    resolver
        .insert("App.dll", app.serialize(&options).unwrap().metadata)
        .unwrap();
    resolver
        .insert("Lib.dll", lib_graph.serialize(&options).unwrap().metadata)
        .unwrap();

    let loader = ConcurrentLoader::new(resolver, LoaderOptions::default().parallel(true));
    let graphs = loader.load_closure(&["App.dll".to_string()]).unwrap();
    assert_eq!(
        graphs.iter().map(LoadedGraph::resource).collect::<Vec<_>>(),
        ["App.dll", "Lib.dll"]
    );

    let guards = graphs
        .iter()
        .map(LoadedGraph::read)
        .collect::<Result<Vec<_>>>()
        .unwrap();
    let inputs: Vec<&CilMetadata> = guards.iter().map(|guard| &**guard).collect();
    let result = merge_default(&inputs, &MergeOptions::default()).unwrap();

    let tables = result.target.tables();
    assert_eq!(tables.len(TableId::ASSEMBLY_REF), 0);
    assert_eq!(tables.len(TableId::TYPE_REF), 0);
    assert_eq!(tables.len(TableId::MEMBER_REF), 0);
    assert_eq!(
        type_names(&result.target),
        ["<Module>", "App.Program", "Lib.Helper"]
    );
    assert!(result.warnings.is_empty());
}

#[test]
fn unresolved_member_references_are_kept_with_a_warning() {
    let mut builder = ModuleBuilder::new("App");
    let lib = builder.assembly_ref("Lib");
    let helper = builder.type_ref(lib, "Lib", "Helper");
    builder
        .tables_mut()
        .push(
            TableId::MEMBER_REF,
            vec![
                Cell::index(helper),
                Cell::str("Missing"),
                Cell::Blob(Blob::Field(SignatureField {
                    field_type: TypeSignature::I4,
                })),
            ],
        )
        .unwrap();
    let app = builder.build();
    let mut builder = ModuleBuilder::new("Lib");
    builder.class("Lib", "Helper");
    let lib = builder.build();

    let result = merge_default(&[&app, &lib], &MergeOptions::default()).unwrap();
    assert_eq!(result.target.tables().len(TableId::MEMBER_REF), 1);
    assert!(result.warnings.iter().any(|warning| matches!(
        warning,
        MergeWarning::UnresolvedMemberReference { member, .. } if member == "Lib.Helper::Missing"
    )));
}

fn holder_with_field_signature(signature: Vec<u8>) -> CilMetadata {
    let mut builder = ModuleBuilder::new("App");
    let lib = builder.assembly_ref("Lib");
    let corlib = builder.assembly_ref("mscorlib");
    builder.type_ref(lib, "Lib", "Helper");
    builder.type_ref(corlib, "System", "Object");
    builder.class("App", "Holder");
    builder
        .tables_mut()
        .push(
            TableId::FIELD,
            vec![
                Cell::Int(6),
                Cell::str("h"),
                Cell::Blob(Blob::Bytes(signature)),
            ],
        )
        .unwrap();
    common::reread(&mut builder.build())
}

#[test]
fn non_minimal_signatures_keep_their_type_references() {
    // CLASS with the TypeRef[0] token written as a two byte compressed integer
    let app = holder_with_field_signature(vec![0x06, 0x12, 0x80, 0x05]);
    let mut builder = ModuleBuilder::new("Lib");
    builder.class("Lib", "Helper");
    let lib = builder.build();

    let result = merge_default(&[&app, &lib], &MergeOptions::default()).unwrap();
    let helper = result.target.find_type("Lib.Helper").unwrap().unwrap();
    let tables = result.target.tables();
    let (_, row) = tables
        .table(TableId::FIELD)
        .iter()
        .find(|(_, row)| row.string(field::NAME).unwrap() == "h")
        .unwrap();
    assert_eq!(
        row.blob(field::SIGNATURE).unwrap(),
        &Blob::Field(SignatureField {
            field_type: TypeSignature::Class(helper),
        })
    );
}

#[test]
fn unparsable_signatures_fail_the_merge() {
    let app = holder_with_field_signature(vec![0x06, 0x12]);
    let mut builder = ModuleBuilder::new("Lib");
    builder.class("Lib", "Helper");
    let lib = builder.build();

    let error = merge_default(&[&app, &lib], &MergeOptions::default()).unwrap_err();
    assert_eq!(error.exit_code(), ExitCode::MalformedInput);
}

#[test]
fn bare_roots_with_method_bodies_cannot_be_merged() {
    let read_bare = |namespace: &str| {
        let mut builder = ModuleBuilder::new(namespace);
        builder.class(namespace, "Program");
        builder.static_method("Run", common::trivial_body());
        let mut built = builder.build();
        let module = built.serialize(&WriteOptions::default()).unwrap();
        let mut graph = CilMetadata::read(&module.metadata, built.schema().clone(), None).unwrap();
        graph.resolve_all().unwrap();
        graph
    };
    let first = read_bare("First");
    let second = read_bare("Second");

    let error = merge_default(&[&first, &second], &MergeOptions::default()).unwrap_err();
    assert!(
        matches!(
            &error,
            Error::UnresolvedRawData { input: 0, index, column: "RVA", .. }
                if *index == TableIndex::new(TableId::METHOD_DEF, 0)
        ),
        "{error}"
    );
    assert_eq!(error.exit_code(), ExitCode::UnsupportedLayout);
}
