use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::{
    loader::{
        parse_resource, GraphId, ImageInfo, LoadedGraph, LoaderOptions, MetadataLoader,
        ResourceResolver,
    },
    metadata::graph::CilMetadata,
    Result,
};

/// One cache entry: the graph once parsed, and the gate the parsing caller holds
#[derive(Default)]
struct Slot {
    graph: OnceLock<LoadedGraph>,
    gate: Mutex<()>,
}

/// A thread-safe loader.
///
/// Each resource key owns a slot; the first caller to reach an empty slot parses the
/// resource while later callers for the same key wait on the slot's gate. Different keys
/// never wait on each other.
pub struct ConcurrentLoader<R: ResourceResolver> {
    resolver: R,
    options: LoaderOptions,
    cache: DashMap<String, Arc<Slot>>,
    graphs: boxcar::Vec<Arc<RwLock<CilMetadata>>>,
    images: SkipMap<GraphId, Arc<ImageInfo>>,
}

impl<R: ResourceResolver> ConcurrentLoader<R> {
    /// A loader with an empty cache
    pub fn new(resolver: R, options: LoaderOptions) -> Self {
        ConcurrentLoader {
            resolver,
            options,
            cache: DashMap::new(),
            graphs: boxcar::Vec::new(),
            images: SkipMap::new(),
        }
    }

    /// Number of parsed graphs
    pub fn len(&self) -> usize {
        self.graphs.count()
    }

    /// Whether nothing has been parsed yet
    pub fn is_empty(&self) -> bool {
        self.graphs.count() == 0
    }

    /// The graph with handle `id`
    pub fn graph(&self, id: GraphId) -> Option<Arc<RwLock<CilMetadata>>> {
        self.graphs.get(id.0).cloned()
    }

    fn parse(&self, key: &str) -> Result<LoadedGraph> {
        let stream = self.resolver.open_stream(key)?;
        let (graph, info) = parse_resource(key, stream, &self.options)?;

        let graph = Arc::new(RwLock::new(graph));
        let id = GraphId(self.graphs.push(graph.clone()));
        self.images.insert(id, Arc::new(info));
        log::debug!("Loaded {} as {}", key, id);

        Ok(LoadedGraph {
            id,
            resource: key.into(),
            graph,
        })
    }
}

impl<R: ResourceResolver> MetadataLoader for ConcurrentLoader<R> {
    fn resolve(&self, resource: &str) -> Result<LoadedGraph> {
        let key = self.resolver.sanitize(resource);
        let slot = self.cache.entry(key.clone()).or_default().value().clone();
        if let Some(graph) = slot.graph.get() {
            return Ok(graph.clone());
        }

        let _gate = lock!(slot.gate)?;
        if let Some(graph) = slot.graph.get() {
            return Ok(graph.clone());
        }

        let graph = self.parse(&key)?;
        Ok(slot.graph.get_or_init(|| graph).clone())
    }

    fn image_info(&self, id: GraphId) -> Option<Arc<ImageInfo>> {
        self.images.get(&id).map(|entry| entry.value().clone())
    }

    fn resolver(&self) -> &dyn ResourceResolver {
        &self.resolver
    }

    fn options(&self) -> &LoaderOptions {
        &self.options
    }

    fn load_all(&self, resources: &[String]) -> Result<Vec<LoadedGraph>> {
        if !self.options.parallel {
            return resources
                .iter()
                .map(|resource| self.load_and_resolve(resource))
                .collect();
        }

        resources
            .par_iter()
            .map(|resource| self.load_and_resolve(resource))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{tests::module_bytes, MemoryResolver};

    #[test]
    fn concurrent_callers_share_one_parse() {
        let resolver = MemoryResolver::new();
        resolver.insert("a.dll", module_bytes("A", &[])).unwrap();
        resolver.insert("b.dll", module_bytes("B", &[])).unwrap();
        let loader = ConcurrentLoader::new(resolver, LoaderOptions::default());

        let ids: Vec<GraphId> = (0..32)
            .into_par_iter()
            .map(|n| {
                let resource = if n % 2 == 0 { "a.dll" } else { "b.dll" };
                loader.load_and_resolve(resource).unwrap().id()
            })
            .collect();

        assert_eq!(loader.len(), 2);
        assert_eq!(loader.resolver.open_count(), 2);
        assert!(ids.iter().all(|id| id.0 < 2));
        assert_ne!(ids[0], ids[1]);
        for id in [GraphId(0), GraphId(1)] {
            assert!(loader.image_info(id).is_some());
            assert!(loader.graph(id).is_some());
        }
    }

    #[test]
    fn parallel_results_keep_input_order() {
        let resolver = MemoryResolver::new();
        let names: Vec<String> = (0..8).map(|n| format!("m{n}.dll")).collect();
        for (n, name) in names.iter().enumerate() {
            resolver
                .insert(name.clone(), module_bytes(&format!("M{n}"), &[]))
                .unwrap();
        }
        let loader = ConcurrentLoader::new(resolver, LoaderOptions::default().parallel(true));

        let graphs = loader.load_all(&names).unwrap();
        for (n, graph) in graphs.iter().enumerate() {
            assert_eq!(graph.resource(), names[n]);
            assert_eq!(graph.read().unwrap().module_name().unwrap(), format!("M{n}.dll"));
        }

        let mut missing = names.clone();
        missing.insert(3, "gone.dll".to_string());
        assert!(loader.load_all(&missing).is_err());
    }
}
