//! One merge run: options, loading, merging and writing the output.

use std::{path::PathBuf, time::Instant};

use cilmerge::{
    collaborators::{parse_hash_algorithm, DebugInput},
    merge::{compile_patterns, parse_rename_mapping},
    metadata::graph::WriteOptions,
    prelude::*,
};
use serde::Serialize;

use crate::{
    app::Cli,
    container::{self, ImageOptions},
    inputs,
    output::{print_output, Align, TabWriter},
};

/// Translate the command line into merge options
pub fn merge_options(cli: &Cli) -> cilmerge::Result<MergeOptions> {
    let mut options = MergeOptions::default()
        .internalize(cli.internalize)
        .copy_attributes(cli.copy_attrs)
        .allow_duplicate_resources(cli.allow_dup_resources)
        .closed(cli.closed)
        .parallel(cli.parallel)
        .fix_retargetable(cli.fix_retargetable)
        .debug_info(!cli.no_debug)
        .xml_docs(cli.xmldocs);

    if cli.union {
        options = options.union(true);
    }
    if let Some(policy) = &cli.duplicates {
        let policy = policy
            .parse::<DuplicatePolicy>()
            .map_err(|_| Error::Configuration(format!("unknown duplicate policy '{policy}'")))?;
        options = options.duplicates(policy);
    }
    if let Some(path) = &cli.rename_file {
        options = options.renames(parse_rename_mapping(&inputs::read_text(path)?)?);
    }
    if let Some(path) = &cli.internalize_include {
        options = options.internalize_include(compile_patterns(&inputs::read_text(path)?)?);
    }
    if let Some(path) = &cli.internalize_exclude {
        options = options.internalize_exclude(compile_patterns(&inputs::read_text(path)?)?);
    }

    if let Some(path) = &cli.keyfile {
        options = options.key(SigningKey::File(inputs::read_bytes(path)?));
    }
    if let Some(name) = &cli.key_container {
        options = options.key(SigningKey::Container(name.clone()));
    }
    if let Some(name) = &cli.hash_algorithm {
        options = options.hash_algorithm(parse_hash_algorithm(name)?);
    }

    if let Some(name) = &cli.target_assembly {
        options = options.target_assembly_name(name.clone());
    }
    if let Some(name) = &cli.target_module {
        options = options.target_module_name(name.clone());
    }
    if let Some(version) = &cli.assembly_version {
        options = options.version(version.parse()?);
    }
    for directory in &cli.search_directories {
        options = options.search_directory(directory.clone());
    }
    Ok(options)
}

fn image_options(cli: &Cli) -> cilmerge::Result<ImageOptions> {
    let mut image = ImageOptions {
        file_alignment: container::check_alignment(cli.align)?,
        high_entropy_va: cli.high_entropy_va,
        ..ImageOptions::default()
    };
    if let Some(version) = &cli.subsystem_version {
        image.subsystem_version = container::parse_subsystem_version(version)?;
    }
    Ok(image)
}

fn loader_options(cli: &Cli) -> LoaderOptions {
    cli.search_directories.iter().fold(
        LoaderOptions::default()
            .parallel(cli.parallel)
            .require_il_only(true),
        |options, directory| options.search_directory(directory.clone()),
    )
}

fn load(cli: &Cli, resources: &[String]) -> cilmerge::Result<(Vec<LoadedGraph>, Vec<DebugInput>)> {
    let options = loader_options(cli);
    if cli.parallel {
        let loader = ConcurrentLoader::new(FileSystemResolver, options);
        load_with(&loader, resources, cli.closed)
    } else {
        let loader = LocalLoader::new(FileSystemResolver, options);
        load_with(&loader, resources, cli.closed)
    }
}

fn load_with<L: MetadataLoader>(
    loader: &L,
    resources: &[String],
    closed: bool,
) -> cilmerge::Result<(Vec<LoadedGraph>, Vec<DebugInput>)> {
    let graphs = if closed {
        loader.load_closure(resources)?
    } else {
        loader.load_all(resources)?
    };
    let debug_inputs: Vec<DebugInput> = graphs
        .iter()
        .map(|graph| DebugInput {
            resource: graph.resource().to_string(),
            debug_directory: loader
                .image_info(graph.id())
                .map(|info| info.debug_directory.clone())
                .unwrap_or_default(),
        })
        .collect();
    Ok((graphs, debug_inputs))
}

#[derive(Debug, Serialize)]
struct Phase {
    name: &'static str,
    millis: f64,
}

#[derive(Debug, Serialize)]
struct Summary {
    output: PathBuf,
    inputs: Vec<String>,
    types: usize,
    methods: usize,
    warnings: Vec<String>,
    bytes: usize,
    phases: Vec<Phase>,
}

/// Merge the inputs named on the command line and write the output
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let started = Instant::now();
    let options = merge_options(cli)?;
    let image = image_options(cli)?;

    let paths = inputs::expand(&cli.inputs, cli.wildcards)?;
    if paths.is_empty() {
        return Err(Error::NoInputs.into());
    }
    let resources: Vec<String> = paths
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();

    let (graphs, debug_inputs) = load(cli, &resources)?;
    let guards = graphs
        .iter()
        .map(LoadedGraph::read)
        .collect::<cilmerge::Result<Vec<_>>>()?;
    let graph_refs: Vec<&CilMetadata> = guards.iter().map(|guard| &**guard).collect();

    let collaborators = Collaborators::default();
    let mut result = merge(&graph_refs, &options, &collaborators)?;
    drop(guards);

    let debug_directory = if options.debug_info {
        result.debug_directory(collaborators.pdb.as_ref(), &debug_inputs)?
    } else {
        Vec::new()
    };

    if options.xml_docs {
        let loaded: Vec<String> = graphs.iter().map(|g| g.resource().to_string()).collect();
        if let Some(documentation) =
            result.xml_documentation(collaborators.xml_doc.as_ref(), &loaded)?
        {
            container::write_file(&cli.output.with_extension("xml"), documentation.as_bytes())?;
        }
    }

    let write_start = Instant::now();
    let module = result.target.serialize(&WriteOptions::default())?;
    let data = container::encode(&image, &module.metadata, &module.sections, &debug_directory)?;
    container::write_file(&cli.output, &data)?;
    result.phase_times.push(("write", write_start.elapsed()));
    log::info!(
        "Wrote {} ({} bytes) in {:.2?}",
        cli.output.display(),
        data.len(),
        started.elapsed()
    );

    let tables = result.target.tables();
    let summary = Summary {
        output: cli.output.clone(),
        inputs: graphs.iter().map(|g| g.resource().to_string()).collect(),
        types: tables.len(TableId::TYPE_DEF),
        methods: tables.len(TableId::METHOD_DEF),
        warnings: result.warnings.iter().map(ToString::to_string).collect(),
        bytes: data.len(),
        phases: result
            .phase_times
            .iter()
            .map(|(name, elapsed)| Phase {
                name: *name,
                millis: elapsed.as_secs_f64() * 1000.0,
            })
            .collect(),
    };

    print_output(&summary, cli.json, |summary| {
        println!(
            "Merged {} inputs into {}: {} types, {} methods, {} warnings",
            summary.inputs.len(),
            summary.output.display(),
            summary.types,
            summary.methods,
            summary.warnings.len()
        );
        let mut writer = TabWriter::new(vec![("Phase", Align::Left), ("Elapsed", Align::Right)])
            .indent("  ");
        for phase in &summary.phases {
            writer.row(vec![phase.name.to_string(), format!("{:.2} ms", phase.millis)]);
        }
        writer.print();
    })
}
