//! Resolution scopes and type references.
//!
//! References into a merged input become references to the merged definition. Everything
//! else is deduplicated across inputs.

use std::collections::HashMap;

use crate::{
    merge::{
        context::{blob_key, MergeContext},
        MergeWarning,
    },
    metadata::tables::{
        columns::{assemblyref, moduleref, typeref, typespec},
        Cell, RemapIndices, TableId, TableIndex,
    },
    Error, Result,
};

const MAX_DEPTH: usize = 64;

/// The target `TypeDef` a `TypeRef` of `input` names, if its resolution scope is one of the
/// merged inputs and that input defines the type
pub(crate) fn resolve_type_ref(
    ctx: &MergeContext<'_>,
    input: usize,
    reference: TableIndex,
) -> Result<Option<TableIndex>> {
    let Some(owner) = scope_owner(ctx, input, reference)? else {
        return Ok(None);
    };

    let name = ctx.inputs[input].full_name_with(reference, &ctx.info[input].nesting)?;
    Ok(ctx.info[owner]
        .types_by_name
        .get(&name)
        .and_then(|definition| ctx.maps.get(owner, *definition)))
}

/// The merged input the outermost resolution scope of `reference` points at
fn scope_owner(ctx: &MergeContext<'_>, input: usize, reference: TableIndex) -> Result<Option<usize>> {
    let source = ctx.source(input);
    let mut scope = source.row(reference)?.index(typeref::RESOLUTION_SCOPE)?;
    let mut depth = 0;
    while let Some(outer) = scope.filter(|scope| scope.table == TableId::TYPE_REF) {
        depth += 1;
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }
        scope = source.row(outer)?.index(typeref::RESOLUTION_SCOPE)?;
    }

    Ok(match scope {
        Some(scope) if scope.table == TableId::ASSEMBLY_REF => {
            ctx.merged_assembly(source.row(scope)?.string(assemblyref::NAME)?)
        }
        Some(scope) if scope.table == TableId::MODULE_REF => {
            ctx.merged_module(source.row(scope)?.string(moduleref::NAME)?)
        }
        Some(scope) if scope.table == TableId::MODULE => Some(input),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AssemblyIdentity {
    name: String,
    culture: String,
    token: Vec<u8>,
}

fn version_of(cells: &[Cell]) -> [u32; 4] {
    let mut version = [0; 4];
    for (part, cell) in version.iter_mut().zip(&cells[assemblyref::MAJOR_VERSION..]) {
        if let Cell::Int(value) = cell {
            *part = *value;
        }
    }
    version
}

/// `AssemblyRef` rows not naming a merged input, one per identity; the highest referenced
/// version wins
pub(crate) fn merge_assembly_refs(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut identities: HashMap<AssemblyIdentity, TableIndex> = HashMap::new();

    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::ASSEMBLY_REF).iter() {
            let name = row.string(assemblyref::NAME)?;
            if ctx.merged_assembly(name).is_some() {
                continue;
            }

            let identity = AssemblyIdentity {
                name: name.to_lowercase(),
                culture: row.string(assemblyref::CULTURE)?.to_string(),
                token: blob_key(row.blob(assemblyref::PUBLIC_KEY_OR_TOKEN)?)?,
            };
            let cells = ctx.maps.translate_row(input, row)?;

            match identities.get(&identity).copied() {
                Some(existing) => {
                    let current = version_of(ctx.target.row(existing)?.cells());
                    if version_of(&cells) > current {
                        log::debug!("Raising reference to {} to a newer version", name);
                        for column in assemblyref::MAJOR_VERSION..=assemblyref::REVISION_NUMBER {
                            ctx.target.set(existing, column, cells[column].clone())?;
                        }
                    }
                    ctx.maps.record(input, index, existing);
                }
                None => {
                    let target = ctx.target.push(TableId::ASSEMBLY_REF, cells)?;
                    ctx.maps.record(input, index, target);
                    identities.insert(identity, target);
                }
            }
        }
    }
    Ok(())
}

/// `ModuleRef` rows not naming a merged input, one per case-insensitive name
pub(crate) fn merge_module_refs(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut names: HashMap<String, TableIndex> = HashMap::new();

    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::MODULE_REF).iter() {
            let name = row.string(moduleref::NAME)?;
            if ctx.merged_module(name).is_some() {
                continue;
            }

            let key = name.to_lowercase();
            let target = match names.get(&key) {
                Some(existing) => *existing,
                None => {
                    let target = ctx.target.push(TableId::MODULE_REF, row.cells().to_vec())?;
                    names.insert(key, target);
                    target
                }
            };
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// Merges `TypeRef` and `TypeSpec` rows, following nested scopes recursively
struct TypeMerger<'c, 'a> {
    ctx: &'c mut MergeContext<'a>,
    references: HashMap<(Option<TableIndex>, String, String), TableIndex>,
    specs: HashMap<Vec<u8>, TableIndex>,
}

impl TypeMerger<'_, '_> {
    fn type_index(&mut self, input: usize, index: TableIndex, depth: usize) -> Result<TableIndex> {
        match index.table {
            TableId::TYPE_REF => self.type_ref(input, index, depth),
            TableId::TYPE_SPEC => self.type_spec(input, index, depth),
            _ => self.ctx.maps.map(input, index),
        }
    }

    fn type_ref(&mut self, input: usize, index: TableIndex, depth: usize) -> Result<TableIndex> {
        if let Some(target) = self.ctx.maps.get(input, index) {
            return Ok(target);
        }
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }

        if let Some(definition) = resolve_type_ref(self.ctx, input, index)? {
            self.ctx.maps.record(input, index, definition);
            return Ok(definition);
        }

        let row = self.ctx.source(input).row(index)?;
        let scope = match row.index(typeref::RESOLUTION_SCOPE)? {
            Some(scope) if scope.table == TableId::TYPE_REF => {
                let outer = self.type_ref(input, scope, depth + 1)?;
                if outer.table != TableId::TYPE_REF {
                    return Err(malformed_error!(
                        "nested type {} of input {} is missing from the definition of {}",
                        row.string(typeref::TYPE_NAME)?,
                        input,
                        outer
                    ));
                }
                Some(outer)
            }
            Some(scope) => Some(self.scope(input, index, scope)?),
            None => None,
        };

        let key = (
            scope,
            row.string(typeref::TYPE_NAMESPACE)?.to_string(),
            row.string(typeref::TYPE_NAME)?.to_string(),
        );
        let target = match self.references.get(&key) {
            Some(existing) => *existing,
            None => {
                let mut cells = row.cells().to_vec();
                cells[typeref::RESOLUTION_SCOPE] = Cell::Index(scope);
                let target = self.ctx.target.push(TableId::TYPE_REF, cells)?;
                self.references.insert(key, target);
                target
            }
        };
        self.ctx.maps.record(input, index, target);
        Ok(target)
    }

    /// The target resolution scope; a reference into a merged input that does not define the
    /// type falls back to the original reference
    fn scope(&mut self, input: usize, reference: TableIndex, scope: TableIndex) -> Result<TableIndex> {
        if let Some(target) = self.ctx.maps.get(input, scope) {
            return Ok(target);
        }

        let type_name = self.ctx.inputs[input].full_name_with(reference, &self.ctx.info[input].nesting)?;
        self.ctx.warn(MergeWarning::UnresolvedTypeReference { input, type_name });

        let cells = self.ctx.source(input).row(scope)?.cells().to_vec();
        let target = self.ctx.target.push(scope.table, cells)?;
        self.ctx.maps.record(input, scope, target);
        Ok(target)
    }

    fn type_spec(&mut self, input: usize, index: TableIndex, depth: usize) -> Result<TableIndex> {
        if let Some(target) = self.ctx.maps.get(input, index) {
            return Ok(target);
        }
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }

        let mut signature = self.ctx.source(input).row(index)?.blob(typespec::SIGNATURE)?.clone();
        signature.remap_indices(&mut |embedded| {
            *embedded = self.type_index(input, *embedded, depth + 1)?;
            Ok(())
        })?;

        let key = blob_key(&signature)?;
        let target = match self.specs.get(&key) {
            Some(existing) => *existing,
            None => {
                let target = self
                    .ctx
                    .target
                    .push(TableId::TYPE_SPEC, vec![Cell::Blob(signature)])?;
                self.specs.insert(key, target);
                target
            }
        };
        self.ctx.maps.record(input, index, target);
        Ok(target)
    }
}

/// `TypeRef` and `TypeSpec` rows of every input
pub(crate) fn merge_type_references(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut merger = TypeMerger {
        ctx,
        references: HashMap::new(),
        specs: HashMap::new(),
    };

    for input in 0..merger.ctx.inputs.len() {
        for row in 0..merger.ctx.source(input).len(TableId::TYPE_REF) {
            merger.type_ref(input, TableIndex::new(TableId::TYPE_REF, row as u32), 0)?;
        }
    }
    for input in 0..merger.ctx.inputs.len() {
        for row in 0..merger.ctx.source(input).len(TableId::TYPE_SPEC) {
            merger.type_spec(input, TableIndex::new(TableId::TYPE_SPEC, row as u32), 0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::Collaborators,
        merge::{types, MergeOptions},
        metadata::signatures::TypeSignature,
        test::builders::GraphBuilder,
    };

    fn prepare(ctx: &mut MergeContext<'_>) {
        types::merge_module_and_assembly(ctx).unwrap();
        types::plan_types(ctx).unwrap();
        types::emit_types(ctx).unwrap();
        merge_assembly_refs(ctx).unwrap();
        merge_module_refs(ctx).unwrap();
        merge_type_references(ctx).unwrap();
    }

    #[test]
    fn references_into_merged_inputs_become_definitions() {
        let mut builder = GraphBuilder::new("App");
        let lib = builder.assembly_ref("Lib");
        let corlib = builder.assembly_ref("mscorlib");
        let helper = builder.type_ref(Some(lib), "Lib", "Helper");
        let missing = builder.type_ref(Some(lib), "Lib", "Missing");
        let object = builder.type_ref(Some(corlib), "System", "Object");
        let spec = builder.type_spec(TypeSignature::SzArray(Box::new(TypeSignature::Class(helper))));
        let app = builder.build();

        let mut builder = GraphBuilder::new("Lib");
        let definition = builder.class("Lib", "Helper");
        let corlib_again = builder.assembly_ref("mscorlib");
        builder.type_ref(Some(corlib_again), "System", "Object");
        let lib_graph = builder.build();

        let options = MergeOptions::default();
        let collaborators = Collaborators::default();
        let inputs = [&app, &lib_graph];
        let mut ctx = MergeContext::new(&inputs, &options, &collaborators).unwrap();
        prepare(&mut ctx);

        let target_helper = ctx.maps.get(1, definition).unwrap();
        assert_eq!(ctx.maps.get(0, helper), Some(target_helper));
        assert_eq!(
            ctx.maps.get(1, TableIndex::new(TableId::TYPE_REF, 0)),
            ctx.maps.get(0, object)
        );

        // mscorlib once, the Lib reference only for the unresolved type
        assert_eq!(ctx.target.len(TableId::ASSEMBLY_REF), 2);
        assert_eq!(ctx.target.len(TableId::TYPE_REF), 2);
        assert!(ctx.maps.get(0, missing).is_some());
        assert!(matches!(
            ctx.warnings.as_slice(),
            [MergeWarning::UnresolvedTypeReference { input: 0, type_name }] if type_name == "Lib.Missing"
        ));

        let target_spec = ctx.maps.get(0, spec).unwrap();
        let row = ctx.target.row(target_spec).unwrap();
        assert_eq!(
            row.cells()[0],
            Cell::Blob(crate::metadata::tables::Blob::TypeSpec(TypeSignature::SzArray(Box::new(
                TypeSignature::Class(target_helper)
            ))))
        );
    }

    #[test]
    fn assembly_references_keep_the_highest_version() {
        let mut builder = GraphBuilder::new("A");
        let old = builder.assembly_ref("Dep");
        let first = builder.build();

        let mut builder = GraphBuilder::new("B");
        let new = builder.assembly_ref("Dep");
        builder
            .tables_mut()
            .set(new, assemblyref::MAJOR_VERSION, Cell::Int(7))
            .unwrap();
        let module = builder.module_ref("native.dll");
        let second = builder.build();

        let options = MergeOptions::default();
        let collaborators = Collaborators::default();
        let inputs = [&first, &second];
        let mut ctx = MergeContext::new(&inputs, &options, &collaborators).unwrap();
        prepare(&mut ctx);

        let target = ctx.maps.get(0, old).unwrap();
        assert_eq!(ctx.maps.get(1, new), Some(target));
        assert_eq!(
            ctx.target.row(target).unwrap().int(assemblyref::MAJOR_VERSION).unwrap(),
            7
        );
        assert!(ctx.maps.get(1, module).is_some());
    }
}
