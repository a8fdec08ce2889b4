//! Whole-target policies applied once every table is merged.

use crate::{
    collaborators::Collaborators,
    loader::{parse_resource, AssemblyName, LoaderOptions},
    merge::{context::MergeContext, MergeOptions, MergeWarning},
    metadata::{
        flags::{internalized, AssemblyFlags},
        graph::CilMetadata,
        tables::{
            columns::{assembly, assemblyref, module, typedef},
            Blob, Cell, TableId, TableIndex,
        },
    },
    Result,
};

pub(crate) fn apply(ctx: &mut MergeContext<'_>) -> Result<()> {
    if ctx.options.internalize {
        internalize(ctx)?;
    }
    if ctx.options.fix_retargetable {
        fix_retargetable(ctx)?;
    }
    apply_identity(ctx)
}

/// Whether the type `name` of the assembly `assembly` is internalized
fn selected(ctx: &MergeContext<'_>, assembly: Option<&str>, name: &str) -> bool {
    let qualified = format!("[{}]{}", assembly.unwrap_or_default(), name);
    let matches = |patterns: &[regex::Regex]| {
        patterns
            .iter()
            .any(|pattern| pattern.is_match(name) || pattern.is_match(&qualified))
    };

    let options = ctx.options;
    (options.internalize_include.is_empty() || matches(&options.internalize_include))
        && !matches(&options.internalize_exclude)
}

/// Make the public types of every secondary input internal
fn internalize(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut count = 0;
    for position in 1..ctx.target.len(TableId::TYPE_DEF) {
        let index = TableIndex::new(TableId::TYPE_DEF, position as u32);
        let Some((input, source)) = ctx.maps.origin(index) else {
            continue;
        };
        if input == 0 {
            continue;
        }

        let original = &ctx.info[input].type_names[source.row as usize];
        let name = ctx.type_renames[input].get(original).unwrap_or(original);
        if !selected(ctx, ctx.info[input].assembly.as_deref(), name) {
            log::debug!("{} stays visible", name);
            continue;
        }

        let flags = ctx.target.row(index)?.int(typedef::FLAGS)?;
        let hidden = internalized(flags);
        if hidden != flags {
            ctx.target.set(index, typedef::FLAGS, Cell::Int(hidden))?;
            count += 1;
        }
    }
    log::info!("Internalized {} types", count);
    Ok(())
}

/// Point retargetable references at the assembly the resolver finds for them
fn fix_retargetable(ctx: &mut MergeContext<'_>) -> Result<()> {
    let collaborators = ctx.collaborators;
    let resolver = collaborators.resolver.as_ref();

    for position in 0..ctx.target.len(TableId::ASSEMBLY_REF) {
        let index = TableIndex::new(TableId::ASSEMBLY_REF, position as u32);
        let name = AssemblyName::from_assembly_ref(ctx.target.row(index)?)?;
        if !name.is_retargetable() {
            continue;
        }

        let found = resolver
            .assembly_reference_candidates("", &name, &ctx.options.search_directories)
            .into_iter()
            .map(|candidate| resolver.sanitize(&candidate))
            .find(|candidate| resolver.is_valid(candidate));
        let Some(resource) = found else {
            ctx.warn(MergeWarning::UnresolvedRetargetable {
                assembly: name.to_string(),
            });
            continue;
        };

        let (graph, _) = parse_resource(&resource, resolver.open_stream(&resource)?, &LoaderOptions::default())?;
        let Some(definition) = graph.tables().table(TableId::ASSEMBLY).get(0) else {
            ctx.warn(MergeWarning::UnresolvedRetargetable {
                assembly: name.to_string(),
            });
            continue;
        };

        let token = match definition.blob(assembly::PUBLIC_KEY)? {
            Blob::Bytes(key) if !key.is_empty() => collaborators.crypto.compute_public_key_token(key)?,
            _ => Vec::new(),
        };
        for (from, to) in [
            (assembly::MAJOR_VERSION, assemblyref::MAJOR_VERSION),
            (assembly::MINOR_VERSION, assemblyref::MINOR_VERSION),
            (assembly::BUILD_NUMBER, assemblyref::BUILD_NUMBER),
            (assembly::REVISION_NUMBER, assemblyref::REVISION_NUMBER),
        ] {
            ctx.target.set(index, to, Cell::Int(definition.int(from)?))?;
        }
        ctx.target
            .set(index, assemblyref::PUBLIC_KEY_OR_TOKEN, Cell::Blob(Blob::Bytes(token)))?;
        let flags = name.flags - AssemblyFlags::RETARGETABLE - AssemblyFlags::PUBLIC_KEY;
        ctx.target.set(index, assemblyref::FLAGS, Cell::Int(flags.bits()))?;

        log::info!("Retargeted {} to {}", name, resource);
    }
    Ok(())
}

/// Display name of the merged assembly once the identity overrides are applied, or the
/// override name alone when the primary input is not an assembly
pub(crate) fn target_display_name(
    primary: &CilMetadata,
    options: &MergeOptions,
    collaborators: &Collaborators,
) -> Result<Option<String>> {
    let Some(definition) = primary.tables().table(TableId::ASSEMBLY).get(0) else {
        return Ok(options.target_assembly_name.clone());
    };

    let mut version = [0_u16; 4];
    for (slot, column) in version.iter_mut().zip([
        assembly::MAJOR_VERSION,
        assembly::MINOR_VERSION,
        assembly::BUILD_NUMBER,
        assembly::REVISION_NUMBER,
    ]) {
        *slot = (definition.int(column)? & 0xFFFF) as u16;
    }
    if let Some(overridden) = options.version {
        version = overridden.0;
    }

    let public_key = match &options.key {
        Some(key) => collaborators.crypto.create_public_key_from_signing_key(key)?,
        None => match definition.blob(assembly::PUBLIC_KEY)? {
            Blob::Bytes(key) => key.clone(),
            _ => Vec::new(),
        },
    };
    let token = if public_key.is_empty() {
        Vec::new()
    } else {
        collaborators.crypto.compute_public_key_token(&public_key)?
    };

    let name = AssemblyName {
        name: match &options.target_assembly_name {
            Some(name) => name.clone(),
            None => definition.string(assembly::NAME)?.to_string(),
        },
        version,
        culture: definition.string(assembly::CULTURE)?.to_string(),
        public_key_or_token: token,
        flags: AssemblyFlags::empty(),
    };
    Ok(Some(name.to_string()))
}

/// Target names, version, strong-name key and hash algorithm overrides
fn apply_identity(ctx: &mut MergeContext<'_>) -> Result<()> {
    let options = ctx.options;
    let module_row = TableIndex::new(TableId::MODULE, 0);
    if let Some(name) = &options.target_module_name {
        ctx.target.set(module_row, module::NAME, Cell::str(name))?;
    }

    let assembly_row = TableIndex::new(TableId::ASSEMBLY, 0);
    if ctx.target.len(TableId::ASSEMBLY) == 0 {
        if options.target_assembly_name.is_some() || options.version.is_some() || options.key.is_some() {
            log::warn!("The primary input is not an assembly; assembly overrides are ignored");
        }
        return Ok(());
    }

    if let Some(name) = &options.target_assembly_name {
        ctx.target.set(assembly_row, assembly::NAME, Cell::str(name))?;
    }
    if let Some(version) = options.version {
        for (column, part) in [
            assembly::MAJOR_VERSION,
            assembly::MINOR_VERSION,
            assembly::BUILD_NUMBER,
            assembly::REVISION_NUMBER,
        ]
        .into_iter()
        .zip(version.0)
        {
            ctx.target.set(assembly_row, column, Cell::Int(u32::from(part)))?;
        }
    }
    if let Some(algorithm) = options.hash_algorithm {
        ctx.target
            .set(assembly_row, assembly::HASH_ALG_ID, Cell::Int(algorithm.id()))?;
    }
    if let Some(key) = &options.key {
        let public_key = ctx.collaborators.crypto.create_public_key_from_signing_key(key)?;
        let flags = AssemblyFlags::from_bits_retain(ctx.target.row(assembly_row)?.int(assembly::FLAGS)?)
            | AssemblyFlags::PUBLIC_KEY;
        ctx.target
            .set(assembly_row, assembly::PUBLIC_KEY, Cell::Blob(Blob::Bytes(public_key)))?;
        ctx.target.set(assembly_row, assembly::FLAGS, Cell::Int(flags.bits()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        collaborators::{Collaborators, Crypto, DefaultCrypto, HashAlgorithm, SigningKey},
        loader::MemoryResolver,
        merge::{compile_patterns, merge, MergeOptions, MergeWarning, Version},
        metadata::{
            flags::{AssemblyFlags, TypeAttributes},
            graph::{CilMetadata, WriteOptions},
            tables::{
                columns::{assembly, assemblyref, module, typedef},
                Blob, Cell, TableId, TableIndex,
            },
        },
        test::builders::GraphBuilder,
        Error,
    };

    fn flags_of(graph: &CilMetadata, name: &str) -> u32 {
        let index = graph.find_type(name).unwrap().unwrap();
        graph.tables().row(index).unwrap().int(typedef::FLAGS).unwrap()
    }

    fn pair() -> (CilMetadata, CilMetadata) {
        let mut builder = GraphBuilder::new("App");
        builder.class("App", "Program");
        let app = builder.build();

        let mut builder = GraphBuilder::new("Lib");
        builder.class("Lib", "Keep");
        builder.class("Lib", "Hide");
        (app, builder.build())
    }

    #[test]
    fn internalize_secondary_inputs() {
        let (app, lib) = pair();
        let options = MergeOptions::default()
            .internalize(true)
            .internalize_exclude(compile_patterns("^\\[Lib\\]Lib\\.Keep$").unwrap());
        let result = merge(&[&app, &lib], &options, &Collaborators::default()).unwrap();

        let visibility = |name| flags_of(&result.target, name) & TypeAttributes::VISIBILITY_MASK;
        assert_eq!(visibility("App.Program"), TypeAttributes::PUBLIC);
        assert_eq!(visibility("Lib.Keep"), TypeAttributes::PUBLIC);
        assert_eq!(visibility("Lib.Hide"), TypeAttributes::NOT_PUBLIC);

        let without = merge(&[&app, &lib], &MergeOptions::default(), &Collaborators::default()).unwrap();
        assert_eq!(
            flags_of(&without.target, "Lib.Hide") & TypeAttributes::VISIBILITY_MASK,
            TypeAttributes::PUBLIC
        );
    }

    #[test]
    fn identity_overrides() {
        let (app, lib) = pair();
        let options = MergeOptions::default()
            .target_assembly_name("Merged")
            .target_module_name("Merged.dll")
            .version("2.1".parse::<Version>().unwrap())
            .hash_algorithm(HashAlgorithm::Md5);
        let result = merge(&[&app, &lib], &options, &Collaborators::default()).unwrap();

        let tables = result.target.tables();
        let row = tables.row(TableIndex::new(TableId::ASSEMBLY, 0)).unwrap();
        assert_eq!(row.string(assembly::NAME).unwrap(), "Merged");
        assert_eq!(row.int(assembly::MAJOR_VERSION).unwrap(), 2);
        assert_eq!(row.int(assembly::MINOR_VERSION).unwrap(), 1);
        assert_eq!(row.int(assembly::HASH_ALG_ID).unwrap(), 0x8003);
        assert_eq!(
            tables
                .row(TableIndex::new(TableId::MODULE, 0))
                .unwrap()
                .string(module::NAME)
                .unwrap(),
            "Merged.dll"
        );
    }

    #[test]
    fn unusable_keys_fail() {
        let (app, lib) = pair();
        let options = MergeOptions::default().key(SigningKey::File(vec![1, 2, 3]));
        assert!(matches!(
            merge(&[&app, &lib], &options, &Collaborators::default()),
            Err(Error::KeyError(_))
        ));

        let options = MergeOptions::default().key(SigningKey::Container("box".to_string()));
        assert!(matches!(
            merge(&[&app, &lib], &options, &Collaborators::default()),
            Err(Error::KeyContainerUnsupported(_))
        ));
    }

    #[test]
    fn retargetable_references_follow_the_resolver() {
        let key = vec![0x24, 0, 0, 0, 4, 0x80, 0, 0, 0x94, 0, 0, 0, 6, 2, 0, 0];
        let mut builder = GraphBuilder::new("System.Runtime");
        builder
            .tables_mut()
            .set(TableIndex::new(TableId::ASSEMBLY, 0), assembly::MAJOR_VERSION, Cell::Int(8))
            .unwrap();
        builder
            .tables_mut()
            .set(
                TableIndex::new(TableId::ASSEMBLY, 0),
                assembly::PUBLIC_KEY,
                Cell::Blob(Blob::Bytes(key.clone())),
            )
            .unwrap();
        let mut framework = builder.build();
        let framework_bytes = framework.serialize(&WriteOptions::default()).unwrap().metadata;

        let mut builder = GraphBuilder::new("App");
        for name in ["System.Runtime", "Portable.Missing"] {
            let reference = builder.assembly_ref(name);
            builder
                .tables_mut()
                .set(
                    reference,
                    assemblyref::FLAGS,
                    Cell::Int(AssemblyFlags::RETARGETABLE.bits()),
                )
                .unwrap();
        }
        let app = builder.build();

        let resolver = MemoryResolver::new();
        resolver.insert("System.Runtime.dll", framework_bytes).unwrap();
        let collaborators = Collaborators {
            resolver: Box::new(resolver),
            ..Collaborators::default()
        };
        let result = merge(&[&app], &MergeOptions::default().fix_retargetable(true), &collaborators).unwrap();

        let tables = result.target.tables();
        let fixed = tables.row(TableIndex::new(TableId::ASSEMBLY_REF, 0)).unwrap();
        assert_eq!(fixed.int(assemblyref::MAJOR_VERSION).unwrap(), 8);
        assert_eq!(fixed.int(assemblyref::FLAGS).unwrap(), 0);
        assert_eq!(
            fixed.blob(assemblyref::PUBLIC_KEY_OR_TOKEN).unwrap(),
            &Blob::Bytes(DefaultCrypto.compute_public_key_token(&key).unwrap())
        );
        assert!(matches!(
            result.warnings.as_slice(),
            [MergeWarning::UnresolvedRetargetable { assembly }] if assembly.starts_with("Portable.Missing")
        ));
    }
}
