//! Resolution of resources to parsed metadata graphs.
//!
//! A loader turns a textual resource identifier into a [`LoadedGraph`], parsing each
//! resource at most once. Two variants share the [`MetadataLoader`] contract:
//!
//! - [`LocalLoader`] - a single cache map without locking, for single-threaded tools
//! - [`ConcurrentLoader`] - a [`dashmap`] cache with one once-cell per resource and a lock
//!   per graph around the resolve step; [`MetadataLoader::load_all`] fans out with [`rayon`]
//!
//! Resources are either PE images with a CLI header or bare metadata roots (`BSJB`). Next
//! to the graph, the loader retains an [`ImageInfo`] record for every graph, keyed by its
//! [`GraphId`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cilmerge::loader::{FileSystemResolver, LoaderOptions, LocalLoader, MetadataLoader};
//!
//! let loader = LocalLoader::new(FileSystemResolver, LoaderOptions::default().require_il_only(true));
//! let graph = loader.load_and_resolve("App.exe")?;
//! println!("{}", graph.read()?.module_name()?);
//! # Ok::<(), cilmerge::Error>(())
//! ```

mod concurrent;
mod image;
mod local;
mod resolver;

use std::{
    collections::HashSet,
    fmt,
    path::PathBuf,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

pub use concurrent::ConcurrentLoader;
pub use image::{CliHeader, ComImageFlags, ImageInfo, PeHeaders, PeImage};
pub use local::LocalLoader;
pub use resolver::{
    AssemblyName, FileSystemResolver, MemoryResolver, ResourceResolver, ResourceStream,
};

use crate::{
    file::File,
    metadata::{
        graph::CilMetadata,
        root::CIL_HEADER_MAGIC,
        sections::ImageSections,
        tables::{columns::moduleref, SchemaRegistry, TableId},
    },
    Error, Result,
};

/// Stable handle of a graph within one loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId(pub usize);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

/// Options of the loaders
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Load independent resources on the rayon pool
    pub parallel: bool,
    /// Reject PE images without the IL-only flag
    pub require_il_only: bool,
    /// Extra directories searched for referenced assemblies
    pub search_directories: Vec<PathBuf>,
    /// The schema every graph is read with
    pub schema: Arc<SchemaRegistry>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            parallel: false,
            require_il_only: false,
            search_directories: Vec::new(),
            schema: SchemaRegistry::canonical(),
        }
    }
}

impl LoaderOptions {
    /// Enable or disable the parallel fan-out
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Require IL-only images
    #[must_use]
    pub fn require_il_only(mut self, required: bool) -> Self {
        self.require_il_only = required;
        self
    }

    /// Add a directory searched for referenced assemblies
    #[must_use]
    pub fn search_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.search_directories.push(directory.into());
        self
    }

    /// Read graphs with a schema that includes extension tables
    #[must_use]
    pub fn schema(mut self, schema: Arc<SchemaRegistry>) -> Self {
        self.schema = schema;
        self
    }
}

/// A graph owned by a loader
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    id: GraphId,
    resource: Arc<str>,
    graph: Arc<RwLock<CilMetadata>>,
}

impl LoadedGraph {
    /// The graph's handle
    #[must_use]
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// The sanitized resource the graph was loaded from
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Shared access to the graph
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if a writer panicked
    pub fn read(&self) -> Result<RwLockReadGuard<'_, CilMetadata>> {
        read_lock!(self.graph)
    }

    /// Exclusive access to the graph
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if a writer panicked
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, CilMetadata>> {
        write_lock!(self.graph)
    }

    /// Run [`CilMetadata::resolve_all`] under the graph's write lock
    ///
    /// # Errors
    /// Returns the resolution error
    pub fn resolve(&self) -> Result<()> {
        let mut graph = self.write()?;
        if graph.is_resolved() {
            return Ok(());
        }
        log::debug!("Resolving {} ({})", self.resource, self.id);
        graph.resolve_all()
    }
}

/// The loader contract shared by both cache variants
pub trait MetadataLoader {
    /// The graph of `resource`, parsing it on first request
    ///
    /// # Errors
    /// Returns an I/O error if the resource cannot be read, a format error if it does not
    /// parse, and [`Error::NotIlOnly`] if IL-only images are required and it is not one
    fn resolve(&self, resource: &str) -> Result<LoadedGraph>;

    /// The retained image information of a graph
    fn image_info(&self, id: GraphId) -> Option<Arc<ImageInfo>>;

    /// The resource resolver
    fn resolver(&self) -> &dyn ResourceResolver;

    /// The loader options
    fn options(&self) -> &LoaderOptions;

    /// Like [`MetadataLoader::resolve`], with every cross reference resolved and validated
    ///
    /// # Errors
    /// Returns the load error or the resolution error
    fn load_and_resolve(&self, resource: &str) -> Result<LoadedGraph> {
        let graph = self.resolve(resource)?;
        graph.resolve()?;
        Ok(graph)
    }

    /// Load and resolve several resources; results are in input order
    ///
    /// # Errors
    /// Returns the first error in input order
    fn load_all(&self, resources: &[String]) -> Result<Vec<LoadedGraph>> {
        resources
            .iter()
            .map(|resource| self.load_and_resolve(resource))
            .collect()
    }

    /// Load `roots` and every module and assembly they reference that the resolver can
    /// find, transitively. Roots come first, in order; discovered graphs follow in the
    /// order they were found.
    ///
    /// # Errors
    /// Returns the error of a root, or of a discovered resource that exists but does not
    /// parse as a managed module
    fn load_closure(&self, roots: &[String]) -> Result<Vec<LoadedGraph>> {
        let mut graphs = self.load_all(roots)?;
        let mut seen: HashSet<String> = graphs
            .iter()
            .map(|graph| graph.resource().to_string())
            .collect();

        let mut next = 0;
        while next < graphs.len() {
            let referrer = graphs[next].resource().to_string();
            let candidates = reference_candidates(self, &graphs[next], &referrer)?;
            next += 1;

            for (reference, resources) in candidates {
                let Some(resource) = resources
                    .iter()
                    .map(|resource| self.resolver().sanitize(resource))
                    .find(|resource| self.resolver().is_valid(resource))
                else {
                    log::debug!("{} references {} which was not found", referrer, reference);
                    continue;
                };
                if !seen.insert(resource.clone()) {
                    continue;
                }

                log::debug!("{} pulls in {}", referrer, resource);
                graphs.push(self.load_and_resolve(&resource)?);
            }
        }

        Ok(graphs)
    }
}

fn reference_candidates<L: MetadataLoader + ?Sized>(
    loader: &L,
    graph: &LoadedGraph,
    referrer: &str,
) -> Result<Vec<(String, Vec<String>)>> {
    let graph = graph.read()?;
    let tables = graph.tables();
    let mut candidates = Vec::new();

    for (_, row) in tables.table(TableId::MODULE_REF).iter() {
        let name = row.string(moduleref::NAME)?;
        candidates.push((
            name.to_string(),
            loader.resolver().module_reference_candidates(referrer, name),
        ));
    }
    for (_, row) in tables.table(TableId::ASSEMBLY_REF).iter() {
        let name = AssemblyName::from_assembly_ref(row)?;
        let resources = loader.resolver().assembly_reference_candidates(
            referrer,
            &name,
            &loader.options().search_directories,
        );
        candidates.push((name.to_string(), resources));
    }
    Ok(candidates)
}

/// Parse an opened resource into a graph and its image information
pub(crate) fn parse_resource(
    resource: &str,
    stream: ResourceStream,
    options: &LoaderOptions,
) -> Result<(CilMetadata, ImageInfo)> {
    let data = stream.data();
    if data.len() >= 4 && data[..4] == CIL_HEADER_MAGIC.to_le_bytes() {
        log::debug!("{} is a bare metadata root", resource);
        let graph = CilMetadata::read(data, options.schema.clone(), None)?;
        let info = ImageInfo {
            resource: resource.to_string(),
            ..ImageInfo::default()
        };
        return Ok((graph, info));
    }

    let image = Arc::new(PeImage::new(File::from_backend(stream.into_backend())?)?);
    if options.require_il_only && !image.cli().flags.contains(ComImageFlags::IL_ONLY) {
        return Err(Error::NotIlOnly(resource.to_string()));
    }

    let info = image.info(resource)?;
    let sections: Arc<dyn ImageSections> = image.clone();
    let graph = CilMetadata::read(image.metadata()?, options.schema.clone(), Some(sections))?;
    Ok((graph, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::graph::WriteOptions, test::builders::GraphBuilder};

    pub(crate) fn module_bytes(name: &str, references: &[&str]) -> Vec<u8> {
        let mut builder = GraphBuilder::new(name);
        for reference in references {
            builder.assembly_ref(reference);
        }
        let mut graph = builder.build();
        graph.serialize(&WriteOptions::default()).unwrap().metadata
    }

    #[test]
    fn bare_roots_and_bad_data() {
        let options = LoaderOptions::default();
        let (graph, info) = parse_resource(
            "a.dll",
            ResourceStream::from_bytes(module_bytes("A", &[])),
            &options,
        )
        .unwrap();
        assert_eq!(graph.module_name().unwrap(), "A.dll");
        assert_eq!(info.resource, "a.dll");
        assert!(info.pe.is_none());

        assert!(parse_resource("b.dll", ResourceStream::from_bytes(vec![0x4D, 0x5A, 0, 0]), &options).is_err());
        assert!(matches!(
            parse_resource("c.dll", ResourceStream::from_bytes(Vec::new()), &options),
            Err(Error::Empty)
        ));
    }

    #[test]
    fn closure_follows_references() {
        let resolver = MemoryResolver::new();
        resolver.insert("App.dll", module_bytes("App", &["Lib", "mscorlib"])).unwrap();
        resolver.insert("Lib.dll", module_bytes("Lib", &["Base"])).unwrap();
        resolver.insert("Base.dll", module_bytes("Base", &["Lib"])).unwrap();

        let loader = LocalLoader::new(resolver, LoaderOptions::default());
        let graphs = loader.load_closure(&["App.dll".to_string()]).unwrap();
        let resources: Vec<&str> = graphs.iter().map(LoadedGraph::resource).collect();
        assert_eq!(resources, vec!["App.dll", "Lib.dll", "Base.dll"]);
        assert!(graphs.iter().all(|graph| graph.read().unwrap().is_resolved()));
    }
}
