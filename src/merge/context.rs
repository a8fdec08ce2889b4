//! State threaded through every merge phase.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::{
    collaborators::Collaborators,
    merge::{policy, CctorSplice, MergeOptions, MergeWarning},
    metadata::{
        constant::encode_constant,
        customattributes::encode_custom_attribute,
        graph::CilMetadata,
        marshalling::encode_marshalling_descriptor,
        security::encode_permission_set,
        signatures::{
            encode_field_signature, encode_local_var_signature, encode_method_signature,
            encode_method_spec_signature, encode_property_signature, encode_typespec_signature,
        },
        tables::{
            columns::manifestresource, Blob, Cell, ColumnCodec, RawData, RawDataKind,
            RemapIndices, Row, TableId, TableIndex, Tables,
        },
    },
    Error, Result,
};

/// Names of one input, computed once before the merge starts
#[derive(Debug, Clone, Default)]
pub(crate) struct InputInfo {
    /// Nested type to enclosing type
    pub nesting: HashMap<TableIndex, TableIndex>,
    /// Full name of every `TypeDef` row, by position
    pub type_names: Vec<String>,
    /// `TypeDef` by full name
    pub types_by_name: HashMap<String, TableIndex>,
    /// Simple assembly name, if the input is an assembly
    pub assembly: Option<String>,
    /// Module name
    pub module: String,
}

impl InputInfo {
    fn build(graph: &CilMetadata) -> Result<InputInfo> {
        let nesting = graph.nesting()?;
        let mut type_names = Vec::with_capacity(graph.tables().len(TableId::TYPE_DEF));
        let mut types_by_name = HashMap::new();
        for (index, _) in graph.tables().table(TableId::TYPE_DEF).iter() {
            let name = graph.full_name_with(index, &nesting)?;
            types_by_name.entry(name.clone()).or_insert(index);
            type_names.push(name);
        }

        Ok(InputInfo {
            nesting,
            type_names,
            types_by_name,
            assembly: graph.assembly_name()?.map(str::to_string),
            module: graph.module_name()?.to_string(),
        })
    }
}

/// Reject content of an input that cannot be translated into the target: raw data that
/// still holds an address of the input's own image, and signatures kept as unparsed bytes,
/// whose embedded indices would otherwise be copied untranslated
fn check_input(input: usize, graph: &CilMetadata) -> Result<()> {
    let tables = graph.tables();
    for table in tables.present() {
        let descriptor = tables.descriptor(table.id())?;
        for (index, row) in table.iter() {
            for (column, cell) in descriptor.columns.iter().zip(row.cells()) {
                match (column.codec, cell) {
                    // Offsets of linked resources point into another file and are kept as is
                    (ColumnCodec::RawData(RawDataKind::ManifestResource), _)
                        if row.index(manifestresource::IMPLEMENTATION)?.is_some() => {}
                    (ColumnCodec::RawData(_), Cell::RawData(RawData::Unresolved(address))) => {
                        return Err(Error::UnresolvedRawData {
                            input,
                            index,
                            column: column.name,
                            address: *address,
                        });
                    }
                    (ColumnCodec::Blob(kind), Cell::Blob(Blob::Bytes(bytes)))
                        if kind.is_signature() && !bytes.is_empty() =>
                    {
                        return Err(malformed_error!(
                            "{} of {} in input {} is a signature that could not be parsed",
                            column.name,
                            index,
                            input
                        ));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// The merge mapping: source index of an input to target index, and back
#[derive(Debug, Default)]
pub(crate) struct IndexMaps {
    forward: Vec<HashMap<TableIndex, TableIndex>>,
    origins: HashMap<TableIndex, (usize, TableIndex)>,
    secondary: HashSet<(usize, TableIndex)>,
}

impl IndexMaps {
    fn new(inputs: usize) -> Self {
        IndexMaps {
            forward: vec![HashMap::new(); inputs],
            ..IndexMaps::default()
        }
    }

    /// Map a source row onto the target row created for it
    pub fn record(&mut self, input: usize, source: TableIndex, target: TableIndex) {
        self.forward[input].insert(source, target);
        self.origins.entry(target).or_insert((input, source));
    }

    /// Map a source row onto a target row created for another source row; the source row
    /// contributes nothing of its own to the target
    pub fn record_secondary(&mut self, input: usize, source: TableIndex, target: TableIndex) {
        self.forward[input].insert(source, target);
        self.secondary.insert((input, source));
    }

    pub fn get(&self, input: usize, source: TableIndex) -> Option<TableIndex> {
        self.forward[input].get(&source).copied()
    }

    pub fn map(&self, input: usize, source: TableIndex) -> Result<TableIndex> {
        self.get(input, source)
            .ok_or(Error::UnmappedIndex { input, index: source })
    }

    pub fn is_secondary(&self, input: usize, source: TableIndex) -> bool {
        self.secondary.contains(&(input, source))
    }

    /// The input and source row a target row was created from
    pub fn origin(&self, target: TableIndex) -> Option<(usize, TableIndex)> {
        self.origins.get(&target).copied()
    }

    /// Rewrite every index embedded in `value` into the target index space
    pub fn translate(&self, input: usize, value: &mut dyn RemapIndices) -> Result<()> {
        value.remap_indices(&mut |index| {
            *index = self.map(input, *index)?;
            Ok(())
        })
    }

    /// The cells of a source row translated into the target index space
    pub fn translate_row(&self, input: usize, row: &Row) -> Result<Vec<Cell>> {
        let mut cells = row.cells().to_vec();
        for cell in &mut cells {
            self.translate(input, cell)?;
        }
        Ok(cells)
    }

    pub fn into_forward(self) -> Vec<HashMap<TableIndex, TableIndex>> {
        self.forward
    }
}

/// One type of the target together with every source definition merged into it
#[derive(Debug, Clone)]
pub(crate) struct TargetType {
    /// Namespace in the target
    pub namespace: String,
    /// Name in the target
    pub name: String,
    /// The definitions, in input order; the first one supplies flags and base type
    pub sources: Vec<(usize, TableIndex)>,
}

/// Everything a merge phase reads or writes
pub(crate) struct MergeContext<'a> {
    pub inputs: &'a [&'a CilMetadata],
    pub info: Vec<InputInfo>,
    pub options: &'a MergeOptions,
    pub collaborators: &'a Collaborators,
    pub target: Tables,
    pub maps: IndexMaps,
    pub types: Vec<TargetType>,
    pub splices: Vec<CctorSplice>,
    pub warnings: Vec<MergeWarning>,
    pub type_renames: Vec<HashMap<String, String>>,
    /// Lower-cased assembly name of every input
    pub merged_assemblies: HashMap<String, usize>,
    /// Lower-cased module name of every input
    pub merged_modules: HashMap<String, usize>,
    /// Display name serialized type names of merged types are qualified with
    pub target_assembly: Option<String>,
}

impl<'a> MergeContext<'a> {
    pub fn new(
        inputs: &'a [&'a CilMetadata],
        options: &'a MergeOptions,
        collaborators: &'a Collaborators,
    ) -> Result<MergeContext<'a>> {
        let Some(primary) = inputs.first() else {
            return Err(Error::NoInputs);
        };

        let prepare = |(input, graph): (usize, &&CilMetadata)| {
            check_input(input, graph)?;
            InputInfo::build(graph)
        };
        let info = if options.parallel {
            inputs
                .par_iter()
                .enumerate()
                .map(prepare)
                .collect::<Result<Vec<_>>>()?
        } else {
            inputs
                .iter()
                .enumerate()
                .map(prepare)
                .collect::<Result<Vec<_>>>()?
        };

        let target_assembly = policy::target_display_name(primary, options, collaborators)?;

        let mut merged_assemblies = HashMap::new();
        let mut merged_modules = HashMap::new();
        for (position, input) in info.iter().enumerate() {
            if let Some(assembly) = &input.assembly {
                merged_assemblies
                    .entry(assembly.to_lowercase())
                    .or_insert(position);
            }
            merged_modules
                .entry(input.module.to_lowercase())
                .or_insert(position);
        }

        Ok(MergeContext {
            inputs,
            info,
            options,
            collaborators,
            target: Tables::new(primary.schema().clone()),
            maps: IndexMaps::new(inputs.len()),
            types: Vec::new(),
            splices: Vec::new(),
            warnings: Vec::new(),
            type_renames: vec![HashMap::new(); inputs.len()],
            merged_assemblies,
            merged_modules,
            target_assembly,
        })
    }

    /// The tables of input `input`
    pub fn source(&self, input: usize) -> &'a Tables {
        self.inputs[input].tables()
    }

    /// Report a soft mismatch
    pub fn warn(&mut self, warning: MergeWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// The input an assembly name refers to, if it is one of the merged inputs
    pub fn merged_assembly(&self, name: &str) -> Option<usize> {
        self.merged_assemblies.get(&name.to_lowercase()).copied()
    }

    /// The input a module name refers to, if it is one of the merged inputs
    pub fn merged_module(&self, name: &str) -> Option<usize> {
        self.merged_modules.get(&name.to_lowercase()).copied()
    }
}

/// A byte key identifying a blob value, for deduplicating rows
pub(crate) fn blob_key(blob: &Blob) -> Result<Vec<u8>> {
    let (tag, bytes) = match blob {
        Blob::Bytes(bytes) => (0, bytes.clone()),
        Blob::Method(signature) => (1, encode_method_signature(signature)?),
        Blob::Field(signature) => (2, encode_field_signature(signature)?),
        Blob::Property(signature) => (3, encode_property_signature(signature)?),
        Blob::Locals(signature) => (4, encode_local_var_signature(signature)?),
        Blob::TypeSpec(signature) => (5, encode_typespec_signature(signature)?),
        Blob::MethodSpec(signature) => (6, encode_method_spec_signature(signature)?),
        Blob::CustomAttribute(value) => (7, encode_custom_attribute(value)?),
        Blob::Marshal(info) => (8, encode_marshalling_descriptor(info)?),
        Blob::Security(set) => (9, encode_permission_set(set)?),
        Blob::Constant(value) => (10, encode_constant(value)),
    };

    let mut key = Vec::with_capacity(bytes.len() + 1);
    key.push(tag);
    key.extend_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::signatures::{SignatureField, TypeSignature},
        test::builders::GraphBuilder,
    };

    #[test]
    fn input_names() {
        let mut builder = GraphBuilder::new("Lib");
        let outer = builder.class("N", "Outer");
        let inner = builder.class("", "Inner");
        builder.nested(inner, outer);
        let graph = builder.build();

        let info = InputInfo::build(&graph).unwrap();
        assert_eq!(info.type_names, ["<Module>", "N.Outer", "N.Outer+Inner"]);
        assert_eq!(info.types_by_name["N.Outer+Inner"], inner);
        assert_eq!(info.assembly.as_deref(), Some("Lib"));
        assert_eq!(info.module, "Lib.dll");
    }

    #[test]
    fn maps_and_translation() {
        let mut maps = IndexMaps::new(2);
        let source = TableIndex::new(TableId::TYPE_REF, 0);
        let target = TableIndex::new(TableId::TYPE_DEF, 5);
        maps.record(1, source, target);
        maps.record_secondary(0, TableIndex::new(TableId::TYPE_DEF, 1), target);

        assert_eq!(maps.origin(target), Some((1, source)));
        assert!(maps.is_secondary(0, TableIndex::new(TableId::TYPE_DEF, 1)));

        let mut blob = Blob::Field(SignatureField {
            field_type: TypeSignature::Class(source),
        });
        maps.translate(1, &mut blob).unwrap();
        assert_eq!(
            blob,
            Blob::Field(SignatureField {
                field_type: TypeSignature::Class(target)
            })
        );
        assert!(matches!(
            maps.translate(0, &mut blob),
            Err(Error::UnmappedIndex { input: 0, .. })
        ));
    }

    #[test]
    fn blob_keys_distinguish_kinds() {
        let bytes = blob_key(&Blob::Bytes(vec![6, 8])).unwrap();
        let field = blob_key(&Blob::Field(SignatureField {
            field_type: TypeSignature::I4,
        }))
        .unwrap();
        assert_eq!(&bytes[1..], &field[1..]);
        assert_ne!(bytes, field);
    }
}
