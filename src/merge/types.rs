//! The structural skeleton of the target: module and assembly rows, type definitions with
//! their contiguous field, method and parameter runs, nesting and generic parameters.

use std::collections::HashMap;

use crate::{
    merge::{
        context::{blob_key, MergeContext, TargetType},
        references::resolve_type_ref,
        CctorSplice, DuplicatePolicy,
    },
    metadata::{
        flags::{MethodAttributes, TypeAttributes},
        tables::{
            columns::{field, genericparam, methoddef, nestedclass, typedef},
            Blob, Cell, RemapIndices, TableId, TableIndex,
        },
        typename::split_full_name,
    },
    Error, Result,
};

const MODULE_TYPE: u32 = 0;

/// The `Module` row of the primary input, and its `Assembly` row if it has one. The rows
/// of every other input map onto them.
pub(crate) fn merge_module_and_assembly(ctx: &mut MergeContext<'_>) -> Result<()> {
    let module = TableIndex::new(TableId::MODULE, 0);
    let assembly = TableIndex::new(TableId::ASSEMBLY, 0);

    let primary = ctx.source(0);
    let module_row = primary.row(module)?.cells().to_vec();
    let target_module = ctx.target.push(TableId::MODULE, module_row)?;

    let target_assembly = match primary.table(TableId::ASSEMBLY).get(0) {
        Some(row) => Some(ctx.target.push(TableId::ASSEMBLY, row.cells().to_vec())?),
        None => None,
    };

    for input in 0..ctx.inputs.len() {
        if ctx.source(input).len(TableId::MODULE) > 0 {
            ctx.maps.record(input, module, target_module);
        }
        if let Some(target_assembly) = target_assembly {
            if ctx.source(input).len(TableId::ASSEMBLY) > 0 {
                ctx.maps.record(input, assembly, target_assembly);
            }
        }
    }
    Ok(())
}

fn is_cctor(flags: u32, name: &str) -> bool {
    name == ".cctor"
        && flags & MethodAttributes::STATIC != 0
        && flags & MethodAttributes::RT_SPECIAL_NAME != 0
}

fn is_visible(flags: u32) -> bool {
    matches!(
        flags & TypeAttributes::VISIBILITY_MASK,
        TypeAttributes::PUBLIC
            | TypeAttributes::NESTED_PUBLIC
            | TypeAttributes::NESTED_FAMILY
            | TypeAttributes::NESTED_FAM_OR_ASSEM
    )
}

fn join_name(prefix: Option<&str>, namespace: &str, name: &str) -> String {
    match (prefix, namespace.is_empty()) {
        (Some(prefix), true) => format!("{prefix}+{name}"),
        (Some(prefix), false) => format!("{prefix}+{namespace}.{name}"),
        (None, true) => name.to_string(),
        (None, false) => format!("{namespace}.{name}"),
    }
}

/// Decides the target type of every source `TypeDef`
struct TypePlanner<'c, 'a> {
    ctx: &'c mut MergeContext<'a>,
    by_name: HashMap<String, usize>,
    keys: Vec<HashMap<TableIndex, String>>,
    generic_counts: Vec<HashMap<TableIndex, u32>>,
}

impl TypePlanner<'_, '_> {
    fn place(&mut self, input: usize, index: TableIndex, depth: usize) -> Result<String> {
        if let Some(key) = self.keys[input].get(&index) {
            return Ok(key.clone());
        }
        if depth > 64 {
            return Err(Error::RecursionLimit(64));
        }

        let row = self.ctx.source(input).row(index)?;
        let flags = row.int(typedef::FLAGS)?;
        let namespace = row.string(typedef::TYPE_NAMESPACE)?;
        let name = row.string(typedef::TYPE_NAME)?;

        let prefix = match self.ctx.info[input].nesting.get(&index).copied() {
            Some(enclosing) => Some(self.place(input, enclosing, depth + 1)?),
            None => None,
        };
        let key = join_name(prefix.as_deref(), namespace, name);

        let (key, namespace, name) = match self.by_name.get(&key).copied() {
            None => (key, namespace.to_string(), name.to_string()),
            Some(existing) => {
                let union = index.row == MODULE_TYPE
                    || self.ctx.options.duplicates == DuplicatePolicy::Union;
                if union {
                    self.union(input, index, existing, &key)?;
                    self.finish(input, index, key.clone());
                    return Ok(key);
                }
                self.rename(input, &key, flags, prefix.as_deref(), namespace, name)?
            }
        };

        let position = self.ctx.types.len();
        self.ctx.types.push(TargetType {
            namespace,
            name,
            sources: vec![(input, index)],
        });
        self.by_name.insert(key.clone(), position);
        self.ctx
            .maps
            .record(input, index, TableIndex::new(TableId::TYPE_DEF, position as u32));
        self.finish(input, index, key.clone());
        Ok(key)
    }

    fn finish(&mut self, input: usize, index: TableIndex, key: String) {
        let original = &self.ctx.info[input].type_names[index.row as usize];
        if *original != key {
            log::debug!("{} of input {} becomes {}", original, input, key);
            self.ctx.type_renames[input].insert(original.clone(), key.clone());
        }
        self.keys[input].insert(index, key);
    }

    fn union(&mut self, input: usize, index: TableIndex, existing: usize, key: &str) -> Result<()> {
        let (first_input, first) = self.ctx.types[existing].sources[0];
        let expected = self.generic_counts[first_input].get(&first).copied().unwrap_or(0);
        let found = self.generic_counts[input].get(&index).copied().unwrap_or(0);
        if expected != found {
            return Err(Error::GenericParameterMismatch(key.to_string()));
        }

        self.ctx.types[existing].sources.push((input, index));
        self.ctx.maps.record_secondary(
            input,
            index,
            TableIndex::new(TableId::TYPE_DEF, existing as u32),
        );
        Ok(())
    }

    /// A new name for a duplicate: the explicit mapping first, then `_<n>` for hidden types
    /// or when automatic renaming is selected
    fn rename(
        &self,
        input: usize,
        key: &str,
        flags: u32,
        prefix: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> Result<(String, String, String)> {
        if let Some(renamed) = self.ctx.options.renames.get(key) {
            let (namespace, name) = match prefix {
                Some(_) => (namespace, renamed.rsplit('+').next().unwrap_or(renamed)),
                None => split_full_name(renamed),
            };
            let new_key = join_name(prefix, namespace, name);
            if self.by_name.contains_key(&new_key) {
                return Err(Error::DuplicateType(new_key));
            }
            return Ok((new_key, namespace.to_string(), name.to_string()));
        }

        if is_visible(flags) && self.ctx.options.duplicates == DuplicatePolicy::Error {
            return Err(Error::DuplicateType(key.to_string()));
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{name}_{suffix}");
            let new_key = join_name(prefix, namespace, &candidate);
            if !self.by_name.contains_key(&new_key) {
                log::debug!("Renaming duplicate {} of input {} to {}", key, input, new_key);
                return Ok((new_key, namespace.to_string(), candidate));
            }
            suffix += 1;
        }
    }
}

/// Assign every source type to a target type, applying the duplicate policy
pub(crate) fn plan_types(ctx: &mut MergeContext<'_>) -> Result<()> {
    let inputs = ctx.inputs.len();
    let mut generic_counts = vec![HashMap::new(); inputs];
    for (input, counts) in generic_counts.iter_mut().enumerate() {
        for (_, row) in ctx.source(input).table(TableId::GENERIC_PARAM).iter() {
            if let Some(owner) = row.index(genericparam::OWNER)? {
                *counts.entry(owner).or_insert(0_u32) += 1;
            }
        }
    }

    let mut planner = TypePlanner {
        ctx,
        by_name: HashMap::new(),
        keys: vec![HashMap::new(); inputs],
        generic_counts,
    };
    for input in 0..inputs {
        for position in 0..planner.ctx.source(input).len(TableId::TYPE_DEF) {
            planner.place(input, TableIndex::new(TableId::TYPE_DEF, position as u32), 0)?;
        }
    }
    Ok(())
}

/// Compares member signatures of different inputs without a complete mapping: type
/// definitions compare by their target row, external references by name
struct SignatureKeys {
    names: HashMap<String, u32>,
}

impl SignatureKeys {
    fn key(&mut self, ctx: &MergeContext<'_>, input: usize, blob: &Blob) -> Result<Vec<u8>> {
        let mut comparable = blob.clone();
        comparable.remap_indices(&mut |index| {
            if let Some(target) = match index.table {
                TableId::TYPE_DEF => ctx.maps.get(input, *index),
                TableId::TYPE_REF => resolve_type_ref(ctx, input, *index)?,
                _ => None,
            } {
                *index = target;
                return Ok(());
            }

            let name = match index.table {
                TableId::TYPE_REF => format!(
                    "ref:{}",
                    ctx.inputs[input].full_name_with(*index, &ctx.info[input].nesting)?
                ),
                _ => format!("{}:{}:{}", input, index.table, index.row),
            };
            let next = self.names.len() as u32;
            let id = *self.names.entry(name).or_insert(next);
            *index = TableIndex::new(TableId::TYPE_SPEC, id);
            Ok(())
        })?;
        blob_key(&comparable)
    }
}

/// Push the `TypeDef`, `Field`, `MethodDef` and `Param` rows of every target type
pub(crate) fn emit_types(ctx: &mut MergeContext<'_>) -> Result<()> {
    let types = std::mem::take(&mut ctx.types);
    let mut keys = SignatureKeys {
        names: HashMap::new(),
    };

    for ty in &types {
        let (first_input, first) = ty.sources[0];
        let mut cells = ctx.source(first_input).row(first)?.cells().to_vec();
        cells[typedef::TYPE_NAME] = Cell::str(&ty.name);
        cells[typedef::TYPE_NAMESPACE] = Cell::str(&ty.namespace);
        cells[typedef::FIELD_LIST] = Cell::list(TableId::FIELD, ctx.target.len(TableId::FIELD) as u32);
        cells[typedef::METHOD_LIST] =
            Cell::list(TableId::METHOD_DEF, ctx.target.len(TableId::METHOD_DEF) as u32);
        let target_type = ctx.target.push(TableId::TYPE_DEF, cells)?;

        let unioned = ty.sources.len() > 1;
        emit_fields(ctx, ty, unioned, &mut keys)?;
        emit_methods(ctx, ty, target_type, unioned, &mut keys)?;
    }

    ctx.types = types;
    Ok(())
}

fn emit_fields(
    ctx: &mut MergeContext<'_>,
    ty: &TargetType,
    unioned: bool,
    keys: &mut SignatureKeys,
) -> Result<()> {
    let mut seen: HashMap<(String, Vec<u8>), TableIndex> = HashMap::new();

    for &(input, source_type) in &ty.sources {
        let source = ctx.source(input);
        let (start, end) = source.list_range(source_type, typedef::FIELD_LIST)?;
        for position in start..end {
            let index = TableIndex::new(TableId::FIELD, position);
            let row = source.row(index)?;

            let key = if unioned {
                let key = (
                    row.string(field::NAME)?.to_string(),
                    keys.key(ctx, input, row.blob(field::SIGNATURE)?)?,
                );
                if let Some(existing) = seen.get(&key) {
                    ctx.maps.record_secondary(input, index, *existing);
                    continue;
                }
                Some(key)
            } else {
                None
            };

            let target = ctx.target.push(TableId::FIELD, row.cells().to_vec())?;
            ctx.maps.record(input, index, target);
            if let Some(key) = key {
                seen.insert(key, target);
            }
        }
    }
    Ok(())
}

fn emit_methods(
    ctx: &mut MergeContext<'_>,
    ty: &TargetType,
    target_type: TableIndex,
    unioned: bool,
    keys: &mut SignatureKeys,
) -> Result<()> {
    let mut seen: HashMap<(String, Vec<u8>), TableIndex> = HashMap::new();
    let mut cctor: Option<CctorSplice> = None;

    for &(input, source_type) in &ty.sources {
        let source = ctx.source(input);
        let (start, end) = source.list_range(source_type, typedef::METHOD_LIST)?;
        for position in start..end {
            let index = TableIndex::new(TableId::METHOD_DEF, position);
            let row = source.row(index)?;
            let flags = row.int(methoddef::FLAGS)?;
            let name = row.string(methoddef::NAME)?;

            if is_cctor(flags, name) {
                if let Some(splice) = &mut cctor {
                    log::debug!(
                        "Deferring static constructor of input {} into {}",
                        input,
                        target_type
                    );
                    ctx.maps.record_secondary(input, index, splice.target);
                    splice.sources.push((input, index));
                    continue;
                }
            }

            let key = if unioned {
                let key = (
                    name.to_string(),
                    keys.key(ctx, input, row.blob(methoddef::SIGNATURE)?)?,
                );
                if let Some(existing) = seen.get(&key).copied() {
                    map_secondary_params(ctx, input, index, existing)?;
                    ctx.maps.record_secondary(input, index, existing);
                    continue;
                }
                Some(key)
            } else {
                None
            };

            let mut cells = row.cells().to_vec();
            cells[methoddef::PARAM_LIST] =
                Cell::list(TableId::PARAM, ctx.target.len(TableId::PARAM) as u32);
            let target = ctx.target.push(TableId::METHOD_DEF, cells)?;
            ctx.maps.record(input, index, target);

            let (param_start, param_end) = source.list_range(index, methoddef::PARAM_LIST)?;
            for param in param_start..param_end {
                let param = TableIndex::new(TableId::PARAM, param);
                let copied = ctx.target.push(TableId::PARAM, source.row(param)?.cells().to_vec())?;
                ctx.maps.record(input, param, copied);
            }

            if is_cctor(flags, name) {
                cctor = Some(CctorSplice {
                    target,
                    sources: vec![(input, index)],
                });
            }
            if let Some(key) = key {
                seen.insert(key, target);
            }
        }
    }

    if let Some(splice) = cctor.filter(|splice| splice.sources.len() > 1) {
        ctx.splices.push(splice);
    }
    Ok(())
}

/// Parameters of a duplicate method map onto the parameters of the method it duplicates
fn map_secondary_params(
    ctx: &mut MergeContext<'_>,
    input: usize,
    method: TableIndex,
    existing: TableIndex,
) -> Result<()> {
    let (start, end) = ctx.source(input).list_range(method, methoddef::PARAM_LIST)?;
    let (target_start, target_end) = ctx.target.list_range(existing, methoddef::PARAM_LIST)?;
    for offset in 0..end - start {
        let param = TableIndex::new(TableId::PARAM, start + offset);
        if target_start + offset < target_end {
            let target = TableIndex::new(TableId::PARAM, target_start + offset);
            ctx.maps.record_secondary(input, param, target);
        }
    }
    Ok(())
}

/// `NestedClass` rows of every primary definition
pub(crate) fn merge_nested_classes(ctx: &mut MergeContext<'_>) -> Result<()> {
    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::NESTED_CLASS).iter() {
            let Some(nested) = row.index(nestedclass::NESTED_CLASS)? else {
                continue;
            };
            if ctx.maps.is_secondary(input, nested) {
                continue;
            }
            let cells = ctx.maps.translate_row(input, row)?;
            let target = ctx.target.push(TableId::NESTED_CLASS, cells)?;
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// `GenericParam` rows; parameters of unioned types and duplicate methods map onto the
/// same-numbered parameter of the definition they were merged into
pub(crate) fn merge_generic_params(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut created: HashMap<(TableIndex, u32), TableIndex> = HashMap::new();

    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::GENERIC_PARAM).iter() {
            let Some(owner) = row.index(genericparam::OWNER)? else {
                return Err(malformed_error!("GenericParam row {} has no owner", index.row + 1));
            };
            let number = row.int(genericparam::NUMBER)?;
            let target_owner = ctx.maps.map(input, owner)?;

            if ctx.maps.is_secondary(input, owner) {
                if let Some(existing) = created.get(&(target_owner, number)) {
                    ctx.maps.record_secondary(input, index, *existing);
                    continue;
                }
            }

            let cells = ctx.maps.translate_row(input, row)?;
            let target = ctx.target.push(TableId::GENERIC_PARAM, cells)?;
            ctx.maps.record(input, index, target);
            created.insert((target_owner, number), target);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::Collaborators,
        merge::MergeOptions,
        metadata::{graph::CilMetadata, signatures::TypeSignature},
        test::builders::GraphBuilder,
    };

    fn library(name: &str, field: &str) -> CilMetadata {
        let mut builder = GraphBuilder::new(name);
        let class = builder.class("N", "C");
        builder.field(class, field);
        let hidden = builder.class_with(0, "N", "Hidden", None);
        builder.field(hidden, "state");
        builder.build()
    }

    fn plan(inputs: &[&CilMetadata], options: &MergeOptions) -> Result<Vec<TargetType>> {
        let collaborators = Collaborators::default();
        let mut ctx = MergeContext::new(inputs, options, &collaborators)?;
        plan_types(&mut ctx)?;
        Ok(ctx.types)
    }

    #[test]
    fn duplicates_follow_the_policy() {
        let first = library("A", "x");
        let second = library("B", "y");
        let inputs = [&first, &second];

        assert!(matches!(
            plan(&inputs, &MergeOptions::default()),
            Err(Error::DuplicateType(name)) if name == "N.C"
        ));

        let renamed = plan(
            &inputs,
            &MergeOptions::default().duplicates(DuplicatePolicy::AutoRename),
        )
        .unwrap();
        let names: Vec<String> = renamed
            .iter()
            .map(|ty| join_name(None, &ty.namespace, &ty.name))
            .collect();
        assert_eq!(names, ["<Module>", "N.C", "N.Hidden", "N.C_2", "N.Hidden_2"]);

        let unioned = plan(&inputs, &MergeOptions::default().union(true)).unwrap();
        assert_eq!(unioned.len(), 3);
        assert_eq!(unioned[1].sources.len(), 2);
        assert_eq!(unioned[0].sources.len(), 2);
    }

    #[test]
    fn explicit_renames() {
        let first = library("A", "x");
        let second = library("B", "y");
        let mut renames = HashMap::new();
        renames.insert("N.C".to_string(), "M.Renamed".to_string());
        let options = MergeOptions::default().renames(renames);

        let collaborators = Collaborators::default();
        let inputs = [&first, &second];
        let mut ctx = MergeContext::new(&inputs, &options, &collaborators).unwrap();
        plan_types(&mut ctx).unwrap();
        assert_eq!(ctx.types[3].namespace, "M");
        assert_eq!(ctx.types[3].name, "Renamed");
        assert_eq!(ctx.type_renames[1]["N.C"], "M.Renamed");
        // Hidden duplicates are always renamed
        assert_eq!(ctx.type_renames[1]["N.Hidden"], "N.Hidden_2");
        assert!(ctx.type_renames[0].is_empty());

        let mut colliding = HashMap::new();
        colliding.insert("N.C".to_string(), "N.Hidden".to_string());
        assert!(matches!(
            plan(&inputs, &MergeOptions::default().renames(colliding)),
            Err(Error::DuplicateType(_))
        ));
    }

    #[test]
    fn union_requires_equal_generic_arity() {
        let mut builder = GraphBuilder::new("A");
        let class = builder.class("N", "G");
        builder.generic_param(class, 0, "T");
        let first = builder.build();

        let mut builder = GraphBuilder::new("B");
        builder.class("N", "G");
        let second = builder.build();

        assert!(matches!(
            plan(&[&first, &second], &MergeOptions::default().union(true)),
            Err(Error::GenericParameterMismatch(name)) if name == "N.G"
        ));
    }

    #[test]
    fn union_emits_each_member_once() {
        let mut builder = GraphBuilder::new("A");
        let class = builder.class("N", "C");
        builder.field(class, "shared");
        builder.field(class, "first");
        let first = builder.build();

        let mut builder = GraphBuilder::new("B");
        let class = builder.class("N", "C");
        builder.field(class, "shared");
        builder.field_with(class, 6, "typed", TypeSignature::String);
        let second = builder.build();

        let options = MergeOptions::default().union(true);
        let collaborators = Collaborators::default();
        let inputs = [&first, &second];
        let mut ctx = MergeContext::new(&inputs, &options, &collaborators).unwrap();
        plan_types(&mut ctx).unwrap();
        emit_types(&mut ctx).unwrap();

        let names: Vec<&str> = ctx
            .target
            .table(TableId::FIELD)
            .rows()
            .iter()
            .map(|row| row.string(field::NAME).unwrap())
            .collect();
        assert_eq!(names, ["shared", "first", "typed"]);
        assert_eq!(
            ctx.maps.get(1, TableIndex::new(TableId::FIELD, 0)),
            Some(TableIndex::new(TableId::FIELD, 0))
        );
        assert!(ctx.maps.is_secondary(1, TableIndex::new(TableId::FIELD, 0)));
    }
}
