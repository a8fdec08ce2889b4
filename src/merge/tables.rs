//! Every table not handled by an earlier phase: rows owned by definitions, attributes,
//! manifest rows and schema extension tables.

use std::collections::HashMap;

use crate::{
    merge::{
        context::{blob_key, MergeContext},
        MergeWarning,
    },
    metadata::{
        tables::{
            columns::{
                classlayout, constant, customattribute, declsecurity, eventmap, exportedtype,
                fieldlayout, fieldmarshal, fieldrva, file, genericparamconstraint, implmap,
                manifestresource, methodsemantics, propertymap,
            },
            Blob, Cell, TableId, TableIndex,
        },
        typename::TypeNameSpec,
    },
    Result,
};

/// Tables copied row by row; rows whose owner was merged into another definition are
/// dropped with it
const OWNED_TABLES: &[(TableId, Option<usize>)] = &[
    (TableId::INTERFACE_IMPL, None),
    (TableId::METHOD_SEMANTICS, Some(methodsemantics::ASSOCIATION)),
    (TableId::METHOD_IMPL, None),
    (TableId::CONSTANT, Some(constant::PARENT)),
    (TableId::FIELD_MARSHAL, Some(fieldmarshal::PARENT)),
    (TableId::CLASS_LAYOUT, Some(classlayout::PARENT)),
    (TableId::FIELD_LAYOUT, Some(fieldlayout::FIELD)),
    (TableId::IMPL_MAP, Some(implmap::MEMBER_FORWARDED)),
    (TableId::FIELD_RVA, Some(fieldrva::FIELD)),
    (TableId::GENERIC_PARAM_CONSTRAINT, Some(genericparamconstraint::OWNER)),
];

pub(crate) fn merge_remaining_tables(ctx: &mut MergeContext<'_>) -> Result<()> {
    merge_member_lists(ctx, TableId::EVENT_MAP, eventmap::EVENT_LIST, TableId::EVENT)?;
    merge_member_lists(ctx, TableId::PROPERTY_MAP, propertymap::PROPERTY_LIST, TableId::PROPERTY)?;

    for &(table, owner) in OWNED_TABLES {
        copy_rows(ctx, table, owner)?;
    }

    merge_security(ctx)?;
    merge_files(ctx)?;
    merge_exported_types(ctx)?;
    merge_resources(ctx)?;
    merge_custom_attributes(ctx)?;
    merge_extension_tables(ctx)
}

fn copy_rows(ctx: &mut MergeContext<'_>, table: TableId, owner: Option<usize>) -> Result<()> {
    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(table).iter() {
            if let Some(column) = owner {
                if let Some(owner) = row.index(column)? {
                    if ctx.maps.is_secondary(input, owner) {
                        continue;
                    }
                }
            }
            let cells = ctx.maps.translate_row(input, row)?;
            let target = ctx.target.push(table, cells)?;
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// Events or properties of every target type, kept contiguous behind one map row per type.
/// Within unioned types a second member of the same name is merged into the first.
fn merge_member_lists(
    ctx: &mut MergeContext<'_>,
    map_table: TableId,
    list_column: usize,
    member_table: TableId,
) -> Result<()> {
    // Both map tables are (Parent, List) and both member tables are (Flags, Name, ...)
    const PARENT: usize = 0;
    const NAME: usize = 1;

    let mut maps_by_owner = Vec::with_capacity(ctx.inputs.len());
    for input in 0..ctx.inputs.len() {
        let mut owners = HashMap::new();
        for (index, row) in ctx.source(input).table(map_table).iter() {
            if let Some(owner) = row.index(PARENT)? {
                owners.insert(owner, index);
            }
        }
        maps_by_owner.push(owners);
    }

    let types = std::mem::take(&mut ctx.types);
    for (position, ty) in types.iter().enumerate() {
        let start = ctx.target.len(member_table) as u32;
        let mut names: HashMap<String, TableIndex> = HashMap::new();

        for &(input, source_type) in &ty.sources {
            let Some(map_row) = maps_by_owner[input].get(&source_type).copied() else {
                continue;
            };
            let source = ctx.source(input);
            let (first, end) = source.list_range(map_row, list_column)?;
            for member in first..end {
                let index = TableIndex::new(member_table, member);
                let row = source.row(index)?;
                let name = row.string(NAME)?;
                if let Some(existing) = names.get(name) {
                    ctx.maps.record_secondary(input, index, *existing);
                    continue;
                }

                let cells = ctx.maps.translate_row(input, row)?;
                let target = ctx.target.push(member_table, cells)?;
                ctx.maps.record(input, index, target);
                names.insert(name.to_string(), target);
            }
        }

        if ctx.target.len(member_table) as u32 > start {
            ctx.target.push(
                map_table,
                vec![
                    Cell::index(TableIndex::new(TableId::TYPE_DEF, position as u32)),
                    Cell::list(member_table, start),
                ],
            )?;
        }
    }
    ctx.types = types;
    Ok(())
}

/// Rewrite a serialized type name of `input` that names a merged or renamed type
pub(crate) fn rewrite_type_name(ctx: &MergeContext<'_>, input: usize, text: &mut String) {
    let Ok(mut spec) = TypeNameSpec::parse(text) else {
        return;
    };

    let target = ctx.target_assembly.as_ref();
    let mut changed = false;
    spec.rewrite(&mut |name, assembly| {
        let owner = match assembly.as_deref() {
            Some(qualified) => ctx.merged_assembly(qualified.split(',').next().unwrap_or(qualified).trim()),
            None => Some(input),
        };
        let Some(owner) = owner else {
            return;
        };

        if let Some(renamed) = ctx.type_renames[owner].get(name.as_str()) {
            name.clone_from(renamed);
            changed = true;
        }
        if let Some(target) = target.filter(|_| assembly.is_some()) {
            if assembly.as_deref() != Some(target.as_str()) {
                *assembly = Some(target.clone());
                changed = true;
            }
        }
    });

    if changed {
        *text = spec.to_string();
    }
}

fn rewrite_blob(ctx: &MergeContext<'_>, input: usize, cell: &mut Cell) {
    match cell {
        Cell::Blob(Blob::CustomAttribute(value)) => {
            value.for_each_type_name_mut(&mut |name| rewrite_type_name(ctx, input, name));
        }
        Cell::Blob(Blob::Security(set)) => {
            set.for_each_type_name_mut(&mut |name| rewrite_type_name(ctx, input, name));
        }
        _ => {}
    }
}

/// Whether a row attached to `parent` of `input` is dropped as an assembly-level attribute
/// of a secondary input
fn skips_assembly_attribute(ctx: &MergeContext<'_>, input: usize, parent: TableIndex) -> bool {
    parent.table == TableId::ASSEMBLY && input != 0 && !ctx.options.copy_attributes
}

fn merge_security(ctx: &mut MergeContext<'_>) -> Result<()> {
    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::DECL_SECURITY).iter() {
            let Some(parent) = row.index(declsecurity::PARENT)? else {
                continue;
            };
            if skips_assembly_attribute(ctx, input, parent) || ctx.maps.is_secondary(input, parent) {
                continue;
            }

            let mut cells = ctx.maps.translate_row(input, row)?;
            rewrite_blob(ctx, input, &mut cells[declsecurity::PERMISSION_SET]);
            let target = ctx.target.push(TableId::DECL_SECURITY, cells)?;
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// `File` rows, except the modules that were merged
fn merge_files(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut names: HashMap<String, TableIndex> = HashMap::new();
    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::FILE).iter() {
            let name = row.string(file::NAME)?;
            if ctx.merged_module(name).is_some() {
                log::debug!("Dropping file entry {} of input {}", name, input);
                continue;
            }

            let key = name.to_lowercase();
            let target = match names.get(&key) {
                Some(existing) => *existing,
                None => {
                    let target = ctx.target.push(TableId::FILE, row.cells().to_vec())?;
                    names.insert(key, target);
                    target
                }
            };
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// `ExportedType` rows whose implementation survived; forwarders into merged inputs are
/// dropped since the type is now defined by the target
fn merge_exported_types(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut seen: HashMap<(String, String, Option<TableIndex>), TableIndex> = HashMap::new();
    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::EXPORTED_TYPE).iter() {
            let implementation = row.index(exportedtype::IMPLEMENTATION)?;
            if implementation.is_some_and(|implementation| ctx.maps.get(input, implementation).is_none()) {
                continue;
            }

            let cells = ctx.maps.translate_row(input, row)?;
            let key = (
                row.string(exportedtype::TYPE_NAMESPACE)?.to_string(),
                row.string(exportedtype::TYPE_NAME)?.to_string(),
                match &cells[exportedtype::IMPLEMENTATION] {
                    Cell::Index(implementation) => *implementation,
                    _ => None,
                },
            );
            let target = match seen.get(&key) {
                Some(existing) => *existing,
                None => {
                    let target = ctx.target.push(TableId::EXPORTED_TYPE, cells)?;
                    seen.insert(key, target);
                    target
                }
            };
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// `ManifestResource` rows; a second resource of the same name is reported and dropped
/// unless duplicates are allowed
fn merge_resources(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut names: HashMap<String, TableIndex> = HashMap::new();
    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::MANIFEST_RESOURCE).iter() {
            let implementation = row.index(manifestresource::IMPLEMENTATION)?;
            if implementation.is_some_and(|implementation| ctx.maps.get(input, implementation).is_none()) {
                continue;
            }

            let name = row.string(manifestresource::NAME)?;
            if let Some(existing) = names.get(name).copied() {
                if !ctx.options.allow_duplicate_resources {
                    ctx.warn(MergeWarning::DuplicateResource {
                        input,
                        name: name.to_string(),
                    });
                    ctx.maps.record_secondary(input, index, existing);
                    continue;
                }
            }

            let cells = ctx.maps.translate_row(input, row)?;
            let target = ctx.target.push(TableId::MANIFEST_RESOURCE, cells)?;
            ctx.maps.record(input, index, target);
            names.entry(name.to_string()).or_insert(target);
        }
    }
    Ok(())
}

/// `CustomAttribute` rows, one per parent, constructor and value
fn merge_custom_attributes(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut seen: HashMap<(TableIndex, Option<TableIndex>, Vec<u8>), TableIndex> = HashMap::new();

    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::CUSTOM_ATTRIBUTE).iter() {
            let Some(parent) = row.index(customattribute::PARENT)? else {
                continue;
            };
            if skips_assembly_attribute(ctx, input, parent) {
                continue;
            }
            // Parents dropped by the merge take their attributes with them
            let Some(target_parent) = ctx.maps.get(input, parent) else {
                continue;
            };

            let mut cells = row.cells().to_vec();
            cells[customattribute::PARENT] = Cell::index(target_parent);
            ctx.maps.translate(input, &mut cells[customattribute::TYPE])?;
            rewrite_blob(ctx, input, &mut cells[customattribute::VALUE]);

            let constructor = match &cells[customattribute::TYPE] {
                Cell::Index(constructor) => *constructor,
                _ => None,
            };
            let value = match &cells[customattribute::VALUE] {
                Cell::Blob(blob) => blob_key(blob)?,
                _ => Vec::new(),
            };
            let key = (target_parent, constructor, value);
            let target = match seen.get(&key) {
                Some(existing) => *existing,
                None => {
                    let target = ctx.target.push(TableId::CUSTOM_ATTRIBUTE, cells)?;
                    seen.insert(key, target);
                    target
                }
            };
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// Rows of registered extension tables, copied from every input that knows the table
fn merge_extension_tables(ctx: &mut MergeContext<'_>) -> Result<()> {
    let extensions: Vec<TableId> = ctx
        .target
        .schema()
        .iter()
        .map(|descriptor| descriptor.id)
        .filter(|id| id.is_extension())
        .collect();

    for table in extensions {
        for input in 0..ctx.inputs.len() {
            if ctx.source(input).schema().get(table).is_none() {
                continue;
            }
            for (index, row) in ctx.source(input).table(table).iter() {
                let cells = ctx.maps.translate_row(input, row)?;
                let target = ctx.target.push(table, cells)?;
                ctx.maps.record(input, index, target);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::{Collaborators, Crypto, DefaultCrypto, SigningKey},
        merge::{context::MergeContext, MergeOptions, Version},
        test::builders::GraphBuilder,
    };

    #[test]
    fn type_names_follow_renames_and_the_target_assembly() {
        let first = GraphBuilder::new("App").build();
        let second = GraphBuilder::new("Lib").build();
        let options = MergeOptions::default().target_assembly_name("Merged");
        let collaborators = Collaborators::default();
        let inputs = [&first, &second];
        let mut ctx = MergeContext::new(&inputs, &options, &collaborators).unwrap();
        ctx.type_renames[1].insert("N.C".to_string(), "N.C_2".to_string());

        let mut qualified = "N.C, Lib, Version=1.0.0.0".to_string();
        rewrite_type_name(&ctx, 0, &mut qualified);
        assert_eq!(
            qualified,
            "N.C_2, Merged, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );

        let mut local = "N.C".to_string();
        rewrite_type_name(&ctx, 1, &mut local);
        assert_eq!(local, "N.C_2");

        let mut external = "System.String, mscorlib".to_string();
        rewrite_type_name(&ctx, 1, &mut external);
        assert_eq!(external, "System.String, mscorlib");
    }

    #[test]
    fn type_names_carry_the_overridden_identity() {
        let first = GraphBuilder::new("App").build();
        let second = GraphBuilder::new("Lib").build();
        // A full public key starts with CALG_RSA_SIGN
        let public_key = vec![0x00, 0x24, 0, 0, 0x04, 0x80, 0, 0, 0x14, 0, 0, 0, 1, 2, 3, 4];
        let options = MergeOptions::default()
            .version(Version([2, 1, 0, 7]))
            .key(SigningKey::File(public_key.clone()));
        let collaborators = Collaborators::default();
        let inputs = [&first, &second];
        let ctx = MergeContext::new(&inputs, &options, &collaborators).unwrap();

        let token: String = DefaultCrypto
            .compute_public_key_token(&public_key)
            .unwrap()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        let mut name = "Lib.Thing, Lib".to_string();
        rewrite_type_name(&ctx, 1, &mut name);
        assert_eq!(
            name,
            format!("Lib.Thing, App, Version=2.1.0.7, Culture=neutral, PublicKeyToken={token}")
        );
    }
}
