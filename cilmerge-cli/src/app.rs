use std::path::PathBuf;

use clap::Parser;

/// cilmerge - merge several .NET assemblies into a single module
#[derive(Debug, Parser)]
#[command(name = "cilmerge", version, about, long_about = None)]
pub struct Cli {
    /// Input assemblies; the first one is the primary assembly.
    #[arg(value_name = "INPUTS")]
    pub inputs: Vec<PathBuf>,

    /// Path of the merged output.
    #[arg(short, long = "out", value_name = "FILE")]
    pub output: PathBuf,

    /// Strong-name the output with the key pair or public key in this file.
    #[arg(long, value_name = "FILE", conflicts_with = "key_container")]
    pub keyfile: Option<PathBuf>,

    /// Strong-name the output with a key from the named key container.
    #[arg(long, value_name = "NAME")]
    pub key_container: Option<String>,

    /// Hash algorithm of the output assembly: sha1, md5 or none.
    #[arg(long, value_name = "NAME")]
    pub hash_algorithm: Option<String>,

    /// Treat same-named types of different inputs as one type.
    #[arg(long, conflicts_with = "duplicates")]
    pub union: bool,

    /// Handling of duplicate visible types: error, auto-rename or union.
    #[arg(long, value_name = "POLICY")]
    pub duplicates: Option<String>,

    /// File of `old=new` lines naming duplicate types explicitly.
    #[arg(long, value_name = "FILE")]
    pub rename_file: Option<PathBuf>,

    /// Make the types of every input but the primary one internal.
    #[arg(long)]
    pub internalize: bool,

    /// Only internalize types matching a regular expression of this file.
    #[arg(long, value_name = "FILE", requires = "internalize")]
    pub internalize_include: Option<PathBuf>,

    /// Never internalize types matching a regular expression of this file.
    #[arg(long, value_name = "FILE", requires = "internalize")]
    pub internalize_exclude: Option<PathBuf>,

    /// Copy the assembly-level attributes of every input.
    #[arg(long)]
    pub copy_attrs: bool,

    /// Keep every copy of same-named embedded resources.
    #[arg(long)]
    pub allow_dup_resources: bool,

    /// Also merge every assembly the inputs reference that can be found.
    #[arg(long)]
    pub closed: bool,

    /// Load inputs in parallel.
    #[arg(long)]
    pub parallel: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit the run summary as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// Name of the output assembly.
    #[arg(long, value_name = "NAME")]
    pub target_assembly: Option<String>,

    /// Name of the output module.
    #[arg(long, value_name = "NAME")]
    pub target_module: Option<String>,

    /// Version of the output assembly, as major.minor.build.revision.
    #[arg(long = "ver", id = "assembly_version", value_name = "VERSION")]
    pub assembly_version: Option<String>,

    /// Do not produce debug information.
    #[arg(long)]
    pub no_debug: bool,

    /// Merge the XML documentation files of the inputs.
    #[arg(long)]
    pub xmldocs: bool,

    /// PE subsystem version of the output, as major.minor.
    #[arg(long, value_name = "VERSION")]
    pub subsystem_version: Option<String>,

    /// File alignment of the output image.
    #[arg(long, value_name = "BYTES", default_value_t = 512)]
    pub align: u32,

    /// Mark the output image as high-entropy-VA compatible.
    #[arg(long)]
    pub high_entropy_va: bool,

    /// Expand `*` and `?` in input file names.
    #[arg(long)]
    pub wildcards: bool,

    /// Point retargetable references at the framework assemblies of the search directories.
    #[arg(long)]
    pub fix_retargetable: bool,

    /// Directory searched for referenced assemblies; may be repeated.
    #[arg(long = "lib", value_name = "DIR")]
    pub search_directories: Vec<PathBuf>,
}
